pub mod models;
pub mod queries;
pub mod retry;
pub mod sqlite;

pub use models::{CommittedCopy, IncomingRecord, NewIncoming, NewOutcoming, OutcomingRecord, Page};
pub use sqlite::Database;
