pub mod consumer;
pub mod dead_letter;
pub mod names;
pub mod normalizer;
pub mod runner;

pub use consumer::{BatchingConsumer, ConsumerError, ConsumerState, ConsumerStats};
pub use dead_letter::{DeadLetterSink, LogDeadLetters, MemoryDeadLetters};
pub use normalizer::{NormalizeError, ShareNormalizer};
pub use runner::{run_partitions, total_stats, PartitionWorkers, PipelineContext};
