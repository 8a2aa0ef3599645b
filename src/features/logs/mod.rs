pub mod handler;
pub mod models;
pub mod predicate;
pub mod query;
pub mod repository;
pub mod storage;

pub use handler::create_logs_router;
pub use models::{LogEntry, LogPage};
pub use repository::LogRepository;
pub use storage::LogStorage;
