// core/src/workflow/context.rs

//! Shared, lockable state handed to every step of a pipeline run.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Shared ownership of a pipeline's context with interior mutability.
///
/// Every handler of a run receives a clone pointing at the same data. The guards are
/// blocking `parking_lot` guards and are `!Send`: take what you need inside a block
/// and let the guard drop before the next `.await`.
#[derive(Debug)]
pub struct Shared<T: Send + Sync + 'static>(Arc<RwLock<T>>);

impl<T: Send + Sync + 'static> Shared<T> {
  pub fn new(data: T) -> Self {
    Shared(Arc::new(RwLock::new(data)))
  }

  pub fn read(&self) -> RwLockReadGuard<'_, T> {
    self.0.read()
  }

  pub fn write(&self) -> RwLockWriteGuard<'_, T> {
    self.0.write()
  }

  /// Clones a projection of the context out from under a short read lock.
  pub fn snapshot<U>(&self, f: impl FnOnce(&T) -> U) -> U {
    let guard = self.0.read();
    f(&*guard)
  }

  /// Applies `f` under a short write lock.
  pub fn update<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
    let mut guard = self.0.write();
    f(&mut *guard)
  }

  /// Recovers the inner value when this is the last handle, otherwise clones it.
  pub fn into_inner(self) -> T
  where
    T: Clone,
  {
    match Arc::try_unwrap(self.0) {
      Ok(lock) => lock.into_inner(),
      Err(shared) => shared.read().clone(),
    }
  }
}

impl<T: Send + Sync + 'static> Clone for Shared<T> {
  fn clone(&self) -> Self {
    Shared(Arc::clone(&self.0))
  }
}

impl<T: Send + Sync + 'static + Default> Default for Shared<T> {
  fn default() -> Self {
    Self::new(Default::default())
  }
}
