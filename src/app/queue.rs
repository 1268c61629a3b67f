//! The per-scrape task queue: a bounded FIFO shared by that scrape's worker
//! set, with drain detection over the in-flight count. A bare "queue empty"
//! check races against a worker that is about to enqueue children, so the
//! queue only reports drained when it is empty and nothing is in flight.
use std::collections::VecDeque;

use thiserror::Error;
use tokio::sync::{Mutex, Notify};

use crate::app::plugin::Task;

#[derive(Debug, Error)]
#[error("task cap of {0} exceeded")]
pub struct TaskCapExceeded(pub usize);

struct State {
    queue: VecDeque<Task>,
    inflight: usize,
    pushed: usize,
    closed: bool,
}

pub struct TaskQueue {
    state: Mutex<State>,
    notify: Notify,
    cap: usize,
}

impl TaskQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                inflight: 0,
                pushed: 0,
                closed: false,
            }),
            notify: Notify::new(),
            cap,
        }
    }

    /// Enqueue a fresh task. Counts against the scrape-lifetime cap; pushes
    /// to a closed queue are dropped.
    pub async fn push(&self, task: Task) -> Result<(), TaskCapExceeded> {
        {
            let mut s = self.state.lock().await;
            if s.closed {
                return Ok(());
            }
            if s.pushed >= self.cap {
                return Err(TaskCapExceeded(self.cap));
            }
            s.pushed += 1;
            s.queue.push_back(task);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Put a task back at the tail after a failed or rate-limited attempt.
    /// Requeues do not count against the lifetime cap; the retry budget
    /// bounds them separately.
    pub async fn requeue(&self, task: Task) {
        {
            let mut s = self.state.lock().await;
            if s.closed {
                return;
            }
            s.queue.push_back(task);
        }
        self.notify.notify_one();
    }

    /// Pop the next task, waiting while the queue is empty but other workers
    /// still hold tasks that may produce children. Returns `None` once the
    /// queue has drained or been closed.
    pub async fn pop(&self) -> Option<Task> {
        let mut notified = std::pin::pin!(self.notify.notified());
        loop {
            notified.as_mut().enable();
            {
                let mut s = self.state.lock().await;
                if let Some(task) = s.queue.pop_front() {
                    s.inflight += 1;
                    return Some(task);
                }
                if s.closed {
                    return None;
                }
                if s.inflight == 0 {
                    s.closed = true;
                    drop(s);
                    self.notify.notify_waiters();
                    return None;
                }
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }

    /// Marks one popped task finished. The final call closes the queue and
    /// releases every waiting worker.
    pub async fn task_done(&self) {
        let drained = {
            let mut s = self.state.lock().await;
            s.inflight = s.inflight.saturating_sub(1);
            if s.queue.is_empty() && s.inflight == 0 && !s.closed {
                s.closed = true;
                true
            } else {
                false
            }
        };
        if drained {
            self.notify.notify_waiters();
        } else {
            // a waiter may be able to take the slot we just released
            self.notify.notify_one();
        }
    }

    /// Abort: discard pending tasks and wake all workers. In-flight tasks
    /// finish on their own.
    pub async fn close(&self) {
        {
            let mut s = self.state.lock().await;
            s.closed = true;
            s.queue.clear();
        }
        self.notify.notify_waiters();
    }

    /// Total tasks ever enqueued through `push`.
    pub async fn total_pushed(&self) -> usize {
        self.state.lock().await.pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn pops_in_fifo_order() {
        let q = TaskQueue::new(10);
        q.push(Task::new("a")).await.unwrap();
        q.push(Task::new("b")).await.unwrap();
        assert_eq!(q.pop().await.unwrap().url, "a");
        assert_eq!(q.pop().await.unwrap().url, "b");
    }

    #[tokio::test]
    async fn empty_queue_with_no_inflight_drains_immediately() {
        let q = TaskQueue::new(10);
        assert!(q.pop().await.is_none());
    }

    #[tokio::test]
    async fn waiting_pop_sees_children_of_inflight_task() {
        let q = Arc::new(TaskQueue::new(10));
        q.push(Task::new("parent")).await.unwrap();

        let parent = q.pop().await.unwrap();
        assert_eq!(parent.url, "parent");

        // second worker blocks: queue empty but the parent is in flight
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.pop().await })
        };

        q.push(Task::new("child")).await.unwrap();
        q.task_done().await;

        let child = waiter.await.unwrap().unwrap();
        assert_eq!(child.url, "child");

        q.task_done().await;
        assert!(q.pop().await.is_none());
    }

    #[tokio::test]
    async fn last_task_done_releases_all_waiters() {
        let q = Arc::new(TaskQueue::new(10));
        q.push(Task::new("only")).await.unwrap();
        let _task = q.pop().await.unwrap();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let q = q.clone();
                tokio::spawn(async move { q.pop().await })
            })
            .collect();

        q.task_done().await;
        for w in waiters {
            assert!(w.await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn cap_rejects_and_requeue_bypasses_it() {
        let q = TaskQueue::new(2);
        q.push(Task::new("a")).await.unwrap();
        q.push(Task::new("b")).await.unwrap();
        assert!(q.push(Task::new("c")).await.is_err());

        let a = q.pop().await.unwrap();
        q.requeue(a).await;
        assert_eq!(q.total_pushed().await, 2);
    }

    #[tokio::test]
    async fn close_discards_pending_tasks() {
        let q = TaskQueue::new(10);
        q.push(Task::new("a")).await.unwrap();
        q.push(Task::new("b")).await.unwrap();
        q.close().await;
        assert!(q.pop().await.is_none());
    }
}
