// core/src/workflow/pipeline.rs

//! `Pipeline<T, E>`: an ordered list of named steps, each with `before`, `on` and `after`
//! handlers operating on a `Shared<T>` context and failing with `E`.

use crate::workflow::context::Shared;
use crate::workflow::control::{Flow, Outcome};
use crate::workflow::error::WorkflowError;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{event, instrument, span, Instrument, Level};

/// A boxed asynchronous step handler.
pub type Handler<T, E> =
  Box<dyn Fn(Shared<T>) -> Pin<Box<dyn Future<Output = Result<Flow, E>> + Send>> + Send + Sync>;

/// Evaluated under a short read lock before a step runs; `true` skips the step.
pub type SkipCondition<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

pub struct Step<T: 'static + Send + Sync> {
  pub name: String,
  /// Failures of an optional step are logged and swallowed; the run moves on to the next step.
  pub optional: bool,
  pub skip_if: Option<SkipCondition<T>>,
}

impl<T: 'static + Send + Sync> std::fmt::Debug for Step<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Step")
      .field("name", &self.name)
      .field("optional", &self.optional)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}

#[derive(Clone, Copy, Debug)]
enum Phase {
  Before,
  On,
  After,
}

impl Phase {
  fn as_str(self) -> &'static str {
    match self {
      Phase::Before => "before",
      Phase::On => "on",
      Phase::After => "after",
    }
  }
}

pub struct Pipeline<T, E>
where
  T: 'static + Send + Sync,
  E: std::error::Error + From<WorkflowError> + Send + Sync + 'static,
{
  name: &'static str,
  steps: Vec<Step<T>>,
  before: HashMap<String, Vec<Handler<T, E>>>,
  on: HashMap<String, Vec<Handler<T, E>>>,
  after: HashMap<String, Vec<Handler<T, E>>>,
}

impl<T, E> Pipeline<T, E>
where
  T: 'static + Send + Sync,
  E: std::error::Error + From<WorkflowError> + Send + Sync + 'static,
{
  /// Creates a pipeline from `(step name, optional)` pairs, in execution order.
  pub fn new(name: &'static str, steps: &[(&str, bool)]) -> Self {
    Self {
      name,
      steps: steps
        .iter()
        .map(|(step_name, optional)| Step {
          name: (*step_name).to_string(),
          optional: *optional,
          skip_if: None,
        })
        .collect(),
      before: HashMap::new(),
      on: HashMap::new(),
      after: HashMap::new(),
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  /// Pipelines are assembled once at engine construction from fixed step names, so an
  /// unknown name is a wiring bug and panics.
  fn step_mut(&mut self, step_name: &str) -> &mut Step<T> {
    let pipeline = self.name;
    self
      .steps
      .iter_mut()
      .find(|s| s.name == step_name)
      .unwrap_or_else(|| panic!("pipeline '{}': step '{}' is not defined", pipeline, step_name))
  }

  pub fn skip_if(&mut self, step_name: &str, condition: impl Fn(&T) -> bool + Send + Sync + 'static) {
    self.step_mut(step_name).skip_if = Some(Arc::new(condition));
  }

  pub fn before<F, UserErr>(&mut self, step_name: &str, handler_fn: impl Fn(Shared<T>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<Flow, UserErr>> + Send + 'static,
    UserErr: Into<E> + Send + Sync + 'static,
  {
    let handler = self.wrap(step_name, handler_fn);
    self.before.entry(step_name.to_string()).or_default().push(handler);
  }

  pub fn on<F, UserErr>(&mut self, step_name: &str, handler_fn: impl Fn(Shared<T>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<Flow, UserErr>> + Send + 'static,
    UserErr: Into<E> + Send + Sync + 'static,
  {
    let handler = self.wrap(step_name, handler_fn);
    self.on.entry(step_name.to_string()).or_default().push(handler);
  }

  pub fn after<F, UserErr>(&mut self, step_name: &str, handler_fn: impl Fn(Shared<T>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<Flow, UserErr>> + Send + 'static,
    UserErr: Into<E> + Send + Sync + 'static,
  {
    let handler = self.wrap(step_name, handler_fn);
    self.after.entry(step_name.to_string()).or_default().push(handler);
  }

  fn wrap<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(Shared<T>) -> F + Send + Sync + 'static,
  ) -> Handler<T, E>
  where
    F: Future<Output = Result<Flow, UserErr>> + Send + 'static,
    UserErr: Into<E> + Send + Sync + 'static,
  {
    self.step_mut(step_name);
    Box::new(move |ctx| {
      let fut = handler_fn(ctx);
      Box::pin(async move { fut.await.map_err(Into::into) })
    })
  }

  /// Runs every step in order against `ctx`.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(pipeline = self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx: Shared<T>) -> Result<Outcome, E> {
    event!(Level::DEBUG, "Pipeline run starting.");

    for (step_idx, step) in self.steps.iter().enumerate() {
      let step_name = step.name.as_str();

      if let Some(skip) = &step.skip_if {
        let skipped = {
          let guard = ctx.read();
          skip(&*guard)
        };
        if skipped {
          event!(Level::DEBUG, step = step_name, "Step skipped by condition.");
          continue;
        }
      }

      let has_handlers = [&self.before, &self.on, &self.after]
        .iter()
        .any(|phase| phase.get(step_name).map_or(false, |v| !v.is_empty()));
      if !has_handlers {
        if step.optional {
          event!(Level::DEBUG, step = step_name, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(Level::ERROR, step = step_name, "Required step has no handlers.");
        return Err(E::from(WorkflowError::HandlerMissing {
          step_name: step.name.clone(),
        }));
      }

      let step_span = span!(Level::INFO, "pipeline_step", step = step_name, step_index = step_idx);
      let step_result = self.run_step(step_name, ctx.clone()).instrument(step_span).await;

      match step_result {
        Ok(Flow::Continue) => {}
        Ok(Flow::Stop) => {
          event!(Level::INFO, step = step_name, "Pipeline stopped by a handler.");
          return Ok(Outcome::Stopped);
        }
        Err(e) if step.optional => {
          event!(Level::WARN, step = step_name, error = %e, "Optional step failed, continuing.");
        }
        Err(e) => return Err(e),
      }
    }

    event!(Level::DEBUG, "Pipeline run completed.");
    Ok(Outcome::Completed)
  }

  async fn run_step(&self, step_name: &str, ctx: Shared<T>) -> Result<Flow, E> {
    for (phase, table) in [(Phase::Before, &self.before), (Phase::On, &self.on), (Phase::After, &self.after)] {
      let Some(handlers) = table.get(step_name) else {
        continue;
      };
      for (handler_idx, handler) in handlers.iter().enumerate() {
        let handler_span = span!(Level::DEBUG, "step_handler", phase = phase.as_str(), handler_index = handler_idx);
        match handler(ctx.clone()).instrument(handler_span).await {
          Ok(Flow::Continue) => {}
          Ok(Flow::Stop) => return Ok(Flow::Stop),
          Err(e) => {
            event!(Level::ERROR, step = step_name, phase = phase.as_str(), error = %e, "Handler failed.");
            return Err(e);
          }
        }
      }
    }
    Ok(Flow::Continue)
  }
}
