//! Material creation with effects shared per container key.

use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use fcs_core::{EngineError, PipelineConfig};
use fcs_runtime::container::Container;
use fcs_runtime::effect_cache::EffectCache;
use fcs_runtime::packer::WriterCache;

use crate::device::GlDevice;
use crate::effect::GlEffect;
use crate::material::GlMaterial;

pub struct GlShaderFactory<D> {
    gl: Rc<D>,
    effects: EffectCache<GlEffect>,
    writers: WriterCache,
    default_threads: [u32; 3],
}

impl<D> fmt::Debug for GlShaderFactory<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlShaderFactory")
            .field("effects", &self.effects.len())
            .field("writers", &self.writers.len())
            .finish()
    }
}

impl<D: GlDevice> GlShaderFactory<D> {
    pub fn new(gl: Rc<D>, config: &PipelineConfig) -> Self {
        Self {
            gl,
            effects: EffectCache::new(),
            writers: WriterCache::new(),
            default_threads: config.default_thread_group,
        }
    }

    /// Loads `path` (once per path) and returns a fresh material over the shared effect.
    pub fn create_material(&mut self, path: impl AsRef<Path>) -> Result<Rc<RefCell<GlMaterial>>, EngineError> {
        let path = path.as_ref();
        let key = path.to_string_lossy().into_owned();
        let gl = Rc::clone(&self.gl);
        let effect = self
            .effects
            .acquire(&key, || GlEffect::new(gl.as_ref(), &Container::load(path)?))?;
        self.instantiate(key, effect)
    }

    /// Same as [`Self::create_material`] for an in-memory container, cached under `key`.
    pub fn create_material_from_bytes(
        &mut self,
        key: &str,
        bytes: &[u8],
    ) -> Result<Rc<RefCell<GlMaterial>>, EngineError> {
        let gl = Rc::clone(&self.gl);
        let effect = self
            .effects
            .acquire(key, || GlEffect::new(gl.as_ref(), &Container::from_bytes(key, bytes)?))?;
        self.instantiate(key.to_string(), effect)
    }

    fn instantiate(
        &mut self,
        key: String,
        effect: Rc<GlEffect>,
    ) -> Result<Rc<RefCell<GlMaterial>>, EngineError> {
        let writer = match effect.vertex_layout() {
            Some(layout) => match self.writers.get_or_create(layout) {
                Ok(w) => Some(w),
                Err(e) => {
                    self.release_effect(&key, effect);
                    return Err(e);
                }
            },
            None => None,
        };
        tracing::debug!(%key, refs = self.effects.ref_count(&key), "material created");
        Ok(Rc::new(RefCell::new(GlMaterial::new(
            key,
            effect,
            writer,
            self.default_threads,
        ))))
    }

    /// Destroys a material's device objects and drops its effect reference. The last reference
    /// deletes the programs.
    pub fn release_material(&mut self, material: Rc<RefCell<GlMaterial>>) -> Result<(), EngineError> {
        let material = Rc::try_unwrap(material)
            .map_err(|_| EngineError::state("material is still in use (bound to a batch?)"))?
            .into_inner();
        let (key, effect) = material.destroy(self.gl.as_ref());
        self.release_effect(&key, effect);
        Ok(())
    }

    fn release_effect(&mut self, key: &str, effect: Rc<GlEffect>) {
        if let Some(last) = self.effects.release(key, effect) {
            last.destroy(self.gl.as_ref());
        }
    }

    /// Live materials over the effect cached under `key`.
    pub fn ref_count(&self, key: &str) -> usize {
        self.effects.ref_count(key)
    }

    pub fn cached_effects(&self) -> usize {
        self.effects.len()
    }

    /// Destroys every effect no material references anymore.
    pub fn dispose(&mut self) {
        for effect in self.effects.drain_unused() {
            effect.destroy(self.gl.as_ref());
        }
        if !self.effects.is_empty() {
            tracing::warn!(remaining = self.effects.len(), "factory disposed with live materials");
        }
    }
}
