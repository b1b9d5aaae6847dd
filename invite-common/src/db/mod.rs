//! Database models and queries

pub mod codes;
pub mod entries;
pub mod events;
pub mod init;
pub mod models;

pub use entries::SqliteEntryStore;
pub use events::{event_exists, load_event, upsert_event};
pub use init::*;
pub use models::*;
