pub mod error;
pub mod types;

pub mod database;
pub mod query;
pub mod reactive;
pub mod schema;
pub mod settings;
pub mod storage;

pub use database::Database;
#[cfg(feature = "sqlite")]
pub use database::SqliteDatabase;
pub use error::{HarkDbError, Result};
pub use reactive::{ChangeEvent, ChangeKind, ListenerId};
pub use settings::Settings;
pub use types::{AsRecord, DatabaseOptions, Record};
