// core/src/workflow/control.rs

//! Flow signals returned by step handlers and the outcome of a whole run.

/// Returned by a handler to either carry on or halt the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  Continue,
  /// Halt now. Remaining handlers of this step and all later steps are not run.
  Stop,
}

/// Outcome of a pipeline run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  Completed,
  /// A handler returned `Flow::Stop`.
  Stopped,
}
