//! Change-monitoring pipeline.
//!
//! - `diff`: stored snapshot + fresh observations -> changes + next snapshot
//! - `circuit_breaker`: page-count guard run before diffing
//! - `report`: changes -> labeled text sections
//! - `batch`: sections -> size-bounded messages
//! - `dispatch`: paced delivery of messages
//! - `commit`: persistence with one rebase-and-retry
//! - `monitor`: one worker per domain, all domains in parallel

pub mod batch;
pub mod circuit_breaker;
pub mod commit;
pub mod diff;
pub mod dispatch;
pub mod monitor;
pub mod report;

pub use batch::{Batcher, Message};
pub use circuit_breaker::CircuitBreaker;
pub use commit::StateCommitter;
pub use diff::{DiffEngine, DiffOutcome, DiffResult, calculate_diff};
pub use dispatch::{DispatchReport, Dispatcher};
pub use monitor::{CommitStatus, DispatchStatus, DomainOutcome, Monitor, RunSummary};
pub use report::{ChangeSummary, ReportSection, assemble};
