//! Handler output datums. Post is the only recognized kind today; the tag
//! exists so the write path can reject anything it does not understand.
use serde::{Deserialize, Serialize};

use super::model::PostDraft;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Fact {
    Post(PostDraft),
}
