//! ChangeEvent: describes one mutation observed by `Database`.
//!
//! Every event carries the caller's context verbatim. WIPE events carry no
//! record type and no record.

use serde_json::Value;

use crate::types::{Context, Record};

/// What kind of mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    Wipe,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Wipe => "WIPE",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change event delivered to every registered listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A record was inserted.
    Create {
        record_type: String,
        record: Record,
        context: Context,
    },
    /// A record was upserted, or a caller reported an edited snapshot.
    Update {
        record_type: String,
        record: Record,
        context: Context,
    },
    /// A record is about to be removed. `record` holds only its primary key.
    Delete {
        record_type: String,
        record: Record,
        context: Context,
    },
    /// Every record of every type was removed.
    Wipe { context: Context },
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Create { .. } => ChangeKind::Create,
            Self::Update { .. } => ChangeKind::Update,
            Self::Delete { .. } => ChangeKind::Delete,
            Self::Wipe { .. } => ChangeKind::Wipe,
        }
    }

    /// The affected record type; `None` for WIPE.
    pub fn record_type(&self) -> Option<&str> {
        match self {
            Self::Create { record_type, .. }
            | Self::Update { record_type, .. }
            | Self::Delete { record_type, .. } => Some(record_type),
            Self::Wipe { .. } => None,
        }
    }

    /// The affected record; `None` for WIPE.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Create { record, .. } | Self::Update { record, .. } | Self::Delete { record, .. } => {
                Some(record)
            }
            Self::Wipe { .. } => None,
        }
    }

    /// The caller context the mutation was made with.
    pub fn context(&self) -> &[Value] {
        match self {
            Self::Create { context, .. }
            | Self::Update { context, .. }
            | Self::Delete { context, .. }
            | Self::Wipe { context } => context,
        }
    }
}
