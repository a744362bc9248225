//! Material creation with effects shared per container key.

use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use fcs_core::{EngineError, PipelineConfig};
use fcs_runtime::container::Container;
use fcs_runtime::effect_cache::EffectCache;
use fcs_runtime::packer::WriterCache;

use crate::device::D3D11Device;
use crate::effect::D3D11Effect;
use crate::material::D3D11Material;

pub struct D3D11ShaderFactory<D> {
    device: Rc<D>,
    effects: EffectCache<D3D11Effect>,
    writers: WriterCache,
    default_threads: [u32; 3],
}

impl<D> fmt::Debug for D3D11ShaderFactory<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("D3D11ShaderFactory")
            .field("effects", &self.effects.len())
            .field("writers", &self.writers.len())
            .finish()
    }
}

impl<D: D3D11Device> D3D11ShaderFactory<D> {
    pub fn new(device: Rc<D>, config: &PipelineConfig) -> Self {
        Self {
            device,
            effects: EffectCache::new(),
            writers: WriterCache::new(),
            default_threads: config.default_thread_group,
        }
    }

    pub fn create_material(&mut self, path: impl AsRef<Path>) -> Result<Rc<RefCell<D3D11Material>>, EngineError> {
        let path = path.as_ref();
        let key = path.to_string_lossy().into_owned();
        let device = Rc::clone(&self.device);
        let effect = self
            .effects
            .acquire(&key, || D3D11Effect::new(device.as_ref(), &Container::load(path)?))?;
        self.instantiate(key, effect)
    }

    pub fn create_material_from_bytes(
        &mut self,
        key: &str,
        bytes: &[u8],
    ) -> Result<Rc<RefCell<D3D11Material>>, EngineError> {
        let device = Rc::clone(&self.device);
        let effect = self
            .effects
            .acquire(key, || D3D11Effect::new(device.as_ref(), &Container::from_bytes(key, bytes)?))?;
        self.instantiate(key.to_string(), effect)
    }

    fn instantiate(
        &mut self,
        key: String,
        effect: Rc<D3D11Effect>,
    ) -> Result<Rc<RefCell<D3D11Material>>, EngineError> {
        let writer = match effect.vertex_layout().map(|l| self.writers.get_or_create(l)).transpose() {
            Ok(w) => w,
            Err(e) => {
                self.release_effect(&key, effect);
                return Err(e);
            }
        };
        let material = match D3D11Material::new(
            self.device.as_ref(),
            key.clone(),
            Rc::clone(&effect),
            writer,
            self.default_threads,
        ) {
            Ok(m) => m,
            Err(e) => {
                self.release_effect(&key, effect);
                return Err(e);
            }
        };
        tracing::debug!(%key, refs = self.effects.ref_count(&key), "material created");
        Ok(Rc::new(RefCell::new(material)))
    }

    /// Releases a material's device objects and drops its effect reference. The last reference
    /// releases the shaders.
    pub fn release_material(&mut self, material: Rc<RefCell<D3D11Material>>) -> Result<(), EngineError> {
        let material = Rc::try_unwrap(material)
            .map_err(|_| EngineError::state("material is still in use (bound to a batch?)"))?
            .into_inner();
        let (key, effect) = material.destroy(self.device.as_ref());
        self.release_effect(&key, effect);
        Ok(())
    }

    fn release_effect(&mut self, key: &str, effect: Rc<D3D11Effect>) {
        if let Some(last) = self.effects.release(key, effect) {
            last.destroy(self.device.as_ref());
        }
    }

    pub fn ref_count(&self, key: &str) -> usize {
        self.effects.ref_count(key)
    }

    pub fn cached_effects(&self) -> usize {
        self.effects.len()
    }

    pub fn dispose(&mut self) {
        for effect in self.effects.drain_unused() {
            effect.destroy(self.device.as_ref());
        }
        if !self.effects.is_empty() {
            tracing::warn!(remaining = self.effects.len(), "factory disposed with live materials");
        }
    }
}
