//! Job coordination: Analyzer and Query state machines persisted through
//! the coordination store, the per-analyzer worker loop, and the boundary
//! that launches one worker process per indexing job.

pub mod analyzer;
pub mod error;
pub mod query;
pub mod spawn;
pub mod worker;

pub use analyzer::{Analyzer, AnalyzerResult, AnalyzerStatus};
pub use error::{JobError, JobFatal};
pub use query::{Query, QueryStatus};
pub use spawn::{NoopSpawner, ProcessSpawner, WorkerSpawner};
pub use worker::{Worker, WorkerConfig};
