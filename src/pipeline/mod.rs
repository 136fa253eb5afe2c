//! Pipeline driver and its collaborators

mod context;
mod driver;
mod outcome;

pub use context::PipelineContext;
pub use driver::Pipeline;
pub use outcome::{ErrorKind, Outcome, RecordOutcome, RunSummary, SourceReport};
