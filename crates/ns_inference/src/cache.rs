//! Process-lifetime memoization of loaded models.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use ns_core::{LoadedModel, ModelChoice, ModelLoader, Result};

type Slot = Arc<Mutex<Option<LoadedModel>>>;

/// Wraps a loader so each model is materialized at most once.
///
/// The outer map lock is held only to find a key's slot. Loading happens
/// under that slot's own lock, so concurrent first requests for one model
/// wait for a single load while other models stay available. Nothing is
/// ever evicted, and a failed load leaves the slot empty.
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    slots: Mutex<HashMap<ModelChoice, Slot>>,
}

impl fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCache")
            .field("loader", &"<dyn ModelLoader>")
            .field("loaded", &self.loaded())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, choice: ModelChoice) -> Slot {
        lock(&self.slots).entry(choice).or_default().clone()
    }

    /// Models that have finished loading.
    pub fn loaded(&self) -> Vec<ModelChoice> {
        let slots = lock(&self.slots);
        let mut loaded: Vec<ModelChoice> = slots
            .iter()
            .filter(|(_, slot)| slot.try_lock().map(|s| s.is_some()).unwrap_or(false))
            .map(|(choice, _)| *choice)
            .collect();
        loaded.sort_by_key(|choice| choice.id());
        loaded
    }

    pub fn is_loaded(&self, choice: ModelChoice) -> bool {
        self.loaded().contains(&choice)
    }
}

impl ModelLoader for ModelCache {
    fn load(&self, choice: ModelChoice) -> Result<LoadedModel> {
        let slot = self.slot(choice);
        let mut guard = lock(&*slot);
        if let Some(loaded) = guard.as_ref() {
            tracing::debug!("Model cache hit for {}", choice);
            return Ok(loaded.clone());
        }

        tracing::info!("📥 Loading model {} (first run may take a minute)", choice.id());
        let loaded = self.loader.load(choice)?;
        tracing::info!("🧠 Model {} ready", choice.id());
        *guard = Some(loaded.clone());
        Ok(loaded)
    }
}
