// core/src/workflow/registry.rs

//! `Registry<E>`: pipelines keyed by the type of context they run on, so callers dispatch
//! with nothing more than a `Shared<T>`.

use crate::workflow::context::Shared;
use crate::workflow::control::Outcome;
use crate::workflow::error::WorkflowError;
use crate::workflow::pipeline::Pipeline;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, Level};

#[async_trait]
trait ErasedRunner<E>: Send + Sync
where
  E: std::error::Error + From<WorkflowError> + Send + Sync + 'static,
{
  fn pipeline_name(&self) -> &'static str;

  /// `ctx` must box a `Shared<T>` for the runner's `T`.
  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<Outcome, E>;
}

struct TypedRunner<T, E>
where
  T: 'static + Send + Sync,
  E: std::error::Error + From<WorkflowError> + Send + Sync + 'static,
{
  pipeline: Pipeline<T, E>,
}

#[async_trait]
impl<T, E> ErasedRunner<E> for TypedRunner<T, E>
where
  T: 'static + Send + Sync,
  E: std::error::Error + From<WorkflowError> + Send + Sync + 'static,
{
  fn pipeline_name(&self) -> &'static str {
    self.pipeline.name()
  }

  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<Outcome, E> {
    let typed = ctx.downcast::<Shared<T>>().map_err(|_| {
      E::from(WorkflowError::TypeMismatch {
        expected_type: std::any::type_name::<Shared<T>>().to_string(),
      })
    })?;
    self.pipeline.run(*typed).await
  }
}

pub struct Registry<E>
where
  E: std::error::Error + From<WorkflowError> + Send + Sync + 'static,
{
  runners: RwLock<HashMap<TypeId, Arc<dyn ErasedRunner<E>>>>,
}

impl<E> Registry<E>
where
  E: std::error::Error + From<WorkflowError> + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      runners: RwLock::new(HashMap::new()),
    }
  }

  /// Registers `pipeline` as the one that runs for contexts of type `T`, replacing any earlier one.
  pub fn register<T>(&self, pipeline: Pipeline<T, E>)
  where
    T: 'static + Send + Sync,
  {
    event!(Level::DEBUG, pipeline = pipeline.name(), context_type = %std::any::type_name::<T>(), "Registering pipeline.");
    self
      .runners
      .write()
      .insert(TypeId::of::<T>(), Arc::new(TypedRunner { pipeline }));
  }

  pub fn is_registered<T: 'static>(&self) -> bool {
    self.runners.read().contains_key(&TypeId::of::<T>())
  }

  pub async fn run<T>(&self, ctx: Shared<T>) -> Result<Outcome, E>
  where
    T: 'static + Send + Sync,
  {
    let runner = self.runners.read().get(&TypeId::of::<T>()).cloned();
    let runner = runner.ok_or_else(|| {
      let context_type = std::any::type_name::<T>();
      event!(Level::ERROR, context_type, "No pipeline registered.");
      E::from(WorkflowError::NotRegistered {
        context_type: context_type.to_string(),
      })
    })?;
    event!(Level::DEBUG, pipeline = runner.pipeline_name(), "Dispatching context.");
    runner.run_erased(Box::new(ctx)).await
  }
}

impl<E> Default for Registry<E>
where
  E: std::error::Error + From<WorkflowError> + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}
