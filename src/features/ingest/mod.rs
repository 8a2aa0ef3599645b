pub mod handler;
pub mod pipeline;
pub mod record_parser;
pub mod rules;
pub mod tailer;

pub use handler::create_ingest_router;
pub use pipeline::{BATCH_SIZE, IngestReport, ingest_reader};
pub use rules::FilterRules;
pub use tailer::FileTailer;
