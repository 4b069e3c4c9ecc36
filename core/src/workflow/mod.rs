// core/src/workflow/mod.rs

//! A small step-pipeline runtime. Each engine operation is a `Pipeline` over its own context
//! struct; the `Registry` dispatches a context to the pipeline registered for its type.

pub mod context;
pub mod control;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use context::Shared;
pub use control::{Flow, Outcome};
pub use error::WorkflowError;
pub use pipeline::{Handler, Pipeline};
pub use registry::Registry;
