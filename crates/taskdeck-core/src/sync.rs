use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOp {
    Create,
    Update,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOp::Create => f.write_str("create"),
            SyncOp::Update => f.write_str("update"),
        }
    }
}

/// Outcome of remote work, posted after the local state has already moved.
///
/// `seq` is the dispatch order of the call. Outcomes can arrive in any
/// order, so only the outcome of the most recently dispatched call for a
/// task decides whether that task counts as synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SyncEvent {
    Synced {
        id: u64,
        op: SyncOp,
        seq: u64,
    },
    Failed {
        id: u64,
        op: SyncOp,
        seq: u64,
        error: String,
    },
    FetchFailed {
        error: String,
    },
}

impl SyncEvent {
    pub fn task_id(&self) -> Option<u64> {
        match self {
            SyncEvent::Synced { id, .. } | SyncEvent::Failed { id, .. } => Some(*id),
            SyncEvent::FetchFailed { .. } => None,
        }
    }

    pub fn seq(&self) -> Option<u64> {
        match self {
            SyncEvent::Synced { seq, .. } | SyncEvent::Failed { seq, .. } => Some(*seq),
            SyncEvent::FetchFailed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, SyncEvent::Synced { .. })
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Synced { id, op, .. } => write!(f, "task {id}: remote {op} ok"),
            SyncEvent::Failed { id, op, error, .. } => {
                write!(f, "task {id}: remote {op} failed: {error}")
            }
            SyncEvent::FetchFailed { error } => write!(f, "failed to fetch tasks: {error}"),
        }
    }
}
