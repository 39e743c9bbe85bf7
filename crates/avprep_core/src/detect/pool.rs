//! Pool of face models shared by concurrent clip tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{DetectError, FaceModel, FaceModelFactory};

/// Hands out models to clip tasks and takes them back afterwards.
///
/// A model whose call fails with a stream error is dropped instead of
/// returned, so the next checkout creates a fresh one.
pub struct ModelPool {
    factory: Arc<dyn FaceModelFactory>,
    idle: Mutex<Vec<Box<dyn FaceModel>>>,
    created: AtomicUsize,
    discarded: AtomicUsize,
}

impl ModelPool {
    pub fn new(factory: Arc<dyn FaceModelFactory>) -> Self {
        Self {
            factory,
            idle: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
        }
    }

    fn create(&self) -> Result<Box<dyn FaceModel>, DetectError> {
        let model = self.factory.create()?;
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("[Detect] Started {} instance #{}", self.factory.name(), n);
        Ok(model)
    }

    /// Make sure at least one model can be started.
    ///
    /// The model is kept idle for the first clip.
    pub fn warm_up(&self) -> Result<(), DetectError> {
        if self.idle() > 0 {
            return Ok(());
        }
        let model = self.create()?;
        self.idle.lock().push(model);
        Ok(())
    }

    /// Run `f` with a checked-out model.
    pub fn with_model<T>(
        &self,
        f: impl FnOnce(&mut dyn FaceModel) -> Result<T, DetectError>,
    ) -> Result<T, DetectError> {
        let pooled = self.idle.lock().pop();
        let mut model = match pooled {
            Some(model) => model,
            None => self.create()?,
        };

        match f(model.as_mut()) {
            Ok(value) => {
                self.idle.lock().push(model);
                Ok(value)
            }
            Err(e) if e.breaks_model() => {
                self.discarded.fetch_add(1, Ordering::SeqCst);
                tracing::warn!("[Detect] Discarding model after error: {}", e);
                Err(e)
            }
            Err(e) => {
                self.idle.lock().push(model);
                Err(e)
            }
        }
    }

    /// Models created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Models dropped after an error.
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }

    /// Models currently waiting for work.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}
