//! Path-keyed effect sharing.
//!
//! Materials hold an `Rc<E>`; the cache keeps one more. When a material releases the last
//! outstanding handle the entry is evicted and ownership returns to the caller, which destroys
//! the backend resources with its device.

use std::collections::HashMap;
use std::rc::Rc;

use fcs_core::EngineError;

#[derive(Debug)]
pub struct EffectCache<E> {
    entries: HashMap<String, Rc<E>>,
}

impl<E> Default for EffectCache<E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<E> EffectCache<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached effect for `key`, creating it on first use.
    pub fn acquire<F>(&mut self, key: &str, create: F) -> Result<Rc<E>, EngineError>
    where
        F: FnOnce() -> Result<E, EngineError>,
    {
        if let Some(e) = self.entries.get(key) {
            tracing::trace!(key, refs = Rc::strong_count(e), "effect cache hit");
            return Ok(Rc::clone(e));
        }
        let effect = Rc::new(create()?);
        self.entries.insert(key.to_string(), Rc::clone(&effect));
        tracing::debug!(key, "effect created");
        Ok(effect)
    }

    /// Gives back one handle. Returns the effect when it was the last one so the caller can
    /// destroy it.
    pub fn release(&mut self, key: &str, effect: Rc<E>) -> Option<E> {
        let Some(cached) = self.entries.get(key) else {
            tracing::warn!(key, "releasing an effect the cache does not know");
            return None;
        };
        if !Rc::ptr_eq(cached, &effect) {
            tracing::warn!(key, "released effect does not match the cached instance");
            return None;
        }
        drop(effect);

        if self.entries.get(key).map(Rc::strong_count) != Some(1) {
            return None;
        }
        let cached = self.entries.remove(key)?;
        tracing::debug!(key, "effect evicted");
        Rc::try_unwrap(cached).ok()
    }

    /// Outstanding material handles for `key` (the cache's own handle is not counted).
    pub fn ref_count(&self, key: &str) -> usize {
        self.entries
            .get(key)
            .map_or(0, |e| Rc::strong_count(e).saturating_sub(1))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts every entry nobody else holds and returns them for destruction.
    pub fn drain_unused(&mut self) -> Vec<E> {
        let unused: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| Rc::strong_count(e) == 1)
            .map(|(k, _)| k.clone())
            .collect();
        unused
            .into_iter()
            .filter_map(|k| self.entries.remove(&k))
            .filter_map(|e| Rc::try_unwrap(e).ok())
            .collect()
    }
}
