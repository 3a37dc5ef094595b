pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod reference;
pub mod sink;
pub mod validation;

#[cfg(test)]
pub mod tests;

pub use config::Config;
pub use db::connection;
pub use db::SqlReferenceStore;
pub use models::{NormalizedShare, RawShareEvent};
pub use pipeline::{BatchingConsumer, ShareNormalizer};
pub use sink::{ClickhouseShareSink, ShareSink};
