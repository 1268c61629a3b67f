//! `Clock` implementation backed by the system time.
use chrono::{DateTime, Utc};

use crate::ports::clock::Clock;

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
