//! Single-entry model cache keyed by [`ModelIdentity`].

use tracing::{debug, info};

use crate::error::Result;
use crate::types::ModelIdentity;

/// Holds at most one constructed model.
///
/// A lookup with a different identity drops the cached model and builds a new
/// one; there is no eviction otherwise. The cache is not synchronised:
/// callers sharing it across threads must wrap it in a mutex.
#[derive(Debug)]
pub struct ModelCache<M> {
    entry: Option<CacheEntry<M>>,
}

#[derive(Debug)]
struct CacheEntry<M> {
    identity: ModelIdentity,
    model: M,
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<M> ModelCache<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the model for `identity`, running `construct` only when the
    /// cache is empty or holds a different identity.
    ///
    /// If `construct` fails the cache is left empty.
    pub fn acquire<F>(&mut self, identity: &ModelIdentity, construct: F) -> Result<&mut M>
    where
        F: FnOnce(&ModelIdentity) -> Result<M>,
    {
        let entry = match self.entry.take() {
            Some(entry) if entry.identity == *identity => {
                debug!(checkpoint = %identity.checkpoint.display(), "model cache hit");
                entry
            }
            previous => {
                if let Some(stale) = &previous {
                    info!(
                        previous = %stale.identity.checkpoint.display(),
                        previous_device = %stale.identity.device,
                        "model identity changed; rebuilding"
                    );
                }
                drop(previous);
                info!(
                    checkpoint = %identity.checkpoint.display(),
                    device = %identity.device,
                    "constructing model"
                );
                CacheEntry {
                    identity: identity.clone(),
                    model: construct(identity)?,
                }
            }
        };
        Ok(&mut self.entry.insert(entry).model)
    }

    pub fn identity(&self) -> Option<&ModelIdentity> {
        self.entry.as_ref().map(|entry| &entry.identity)
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}
