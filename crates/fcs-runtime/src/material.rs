//! Backend-independent half of a material: constant buffer mirrors, dirty tracking, named
//! parameters, compute dispatch sizing, auxiliary textures.
//!
//! Backends wrap a `MaterialCore` and push dirty slots to the device on sync.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use fcs_core::EngineError;

use crate::container::Metadata;
use crate::geometry::Color;

/// Location of a named variable inside a constant buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub slot: u32,
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Matrix([f32; 16]),
    /// Written as a normalized vec4.
    Color(Color),
}

impl ParamValue {
    fn write_into(&self, f: impl FnOnce(&[u8]) -> Result<(), EngineError>) -> Result<(), EngineError> {
        match self {
            ParamValue::Float(v) => f(bytemuck::bytes_of(v)),
            ParamValue::Vec2(v) => f(bytemuck::bytes_of(v)),
            ParamValue::Vec3(v) => f(bytemuck::bytes_of(v)),
            ParamValue::Vec4(v) => f(bytemuck::bytes_of(v)),
            ParamValue::Matrix(v) => f(bytemuck::bytes_of(v)),
            ParamValue::Color(c) => f(bytemuck::bytes_of(&c.to_vec4())),
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v)
    }
}
impl From<[f32; 2]> for ParamValue {
    fn from(v: [f32; 2]) -> Self {
        ParamValue::Vec2(v)
    }
}
impl From<[f32; 3]> for ParamValue {
    fn from(v: [f32; 3]) -> Self {
        ParamValue::Vec3(v)
    }
}
impl From<[f32; 4]> for ParamValue {
    fn from(v: [f32; 4]) -> Self {
        ParamValue::Vec4(v)
    }
}
impl From<[f32; 16]> for ParamValue {
    fn from(v: [f32; 16]) -> Self {
        ParamValue::Matrix(v)
    }
}
impl From<Color> for ParamValue {
    fn from(c: Color) -> Self {
        ParamValue::Color(c)
    }
}

/// Compute thread-group size (threads per group per axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadGroup {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl ThreadGroup {
    pub fn from_array([x, y, z]: [u32; 3]) -> Self {
        Self { x, y, z }
    }

    /// Groups needed to cover `width × height × depth` (`depth` absent → one group).
    pub fn groups_for(&self, width: u32, height: u32, depth: Option<u32>) -> [u32; 3] {
        [
            width.div_ceil(self.x.max(1)),
            height.div_ceil(self.y.max(1)),
            depth.map_or(1, |d| d.div_ceil(self.z.max(1))),
        ]
    }
}

/// Size of the compute output image a material currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowExtent {
    pub width: u32,
    pub height: u32,
}

/// Outcome of [`MaterialCore::plan_shadow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowPlan {
    Reuse,
    Recreate(ShadowExtent),
}

#[derive(Debug)]
pub struct MaterialCore<T> {
    mirrors: BTreeMap<u32, Vec<u8>>,
    dirty: BTreeSet<u32>,
    params: HashMap<String, Parameter>,
    threads: ThreadGroup,
    groups: [u32; 3],
    shadow: Option<ShadowExtent>,
    textures: Vec<Option<T>>,
}

impl<T> MaterialCore<T> {
    /// Zeroed mirrors for every declared buffer, all marked dirty so the first sync creates and
    /// fills the device buffers.
    pub fn new(meta: &Metadata, default_threads: [u32; 3]) -> Self {
        let mut mirrors = BTreeMap::new();
        let mut params = HashMap::new();
        for b in &meta.buffers {
            mirrors.insert(b.slot, vec![0u8; b.total_size]);
            for (name, v) in &b.variables {
                params.insert(
                    name.clone(),
                    Parameter {
                        slot: b.slot,
                        offset: v.offset,
                        size: v.size,
                    },
                );
            }
        }
        let dirty = mirrors.keys().copied().collect();
        let textures = std::iter::repeat_with(|| None)
            .take(meta.texture_slot_count())
            .collect();

        Self {
            mirrors,
            dirty,
            params,
            threads: ThreadGroup::from_array(meta.thread_group(default_threads)),
            groups: [1, 1, 1],
            shadow: None,
            textures,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<Parameter> {
        self.params.get(name).copied()
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Writes a typed value at the parameter's offset.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<(), EngineError> {
        let p = self
            .parameter(name)
            .ok_or_else(|| EngineError::UnknownParameter(name.to_string()))?;
        let value: ParamValue = value.into();
        value.write_into(|bytes| self.internal_update(p.slot, p.offset, bytes))
    }

    pub fn set_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        let p = self
            .parameter(name)
            .ok_or_else(|| EngineError::UnknownParameter(name.to_string()))?;
        self.internal_update(p.slot, p.offset, bytes)
    }

    /// Bounds-checked copy into a slot's mirror. Marks the slot dirty.
    pub fn internal_update(&mut self, slot: u32, offset: usize, bytes: &[u8]) -> Result<(), EngineError> {
        let mirror = self
            .mirrors
            .get_mut(&slot)
            .ok_or_else(|| EngineError::other(format!("no constant buffer bound at slot {slot}")))?;
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= mirror.len())
            .ok_or(EngineError::ParameterBounds {
                slot,
                offset,
                size: bytes.len(),
                capacity: mirror.len(),
            })?;
        mirror[offset..end].copy_from_slice(bytes);
        self.dirty.insert(slot);
        Ok(())
    }

    /// Replaces a whole slot. The length must match the declared size.
    pub fn update_buffer(&mut self, slot: u32, bytes: &[u8]) -> Result<(), EngineError> {
        let len = self
            .mirrors
            .get(&slot)
            .map(Vec::len)
            .ok_or_else(|| EngineError::other(format!("no constant buffer bound at slot {slot}")))?;
        if bytes.len() != len {
            return Err(EngineError::ParameterBounds {
                slot,
                offset: 0,
                size: bytes.len(),
                capacity: len,
            });
        }
        self.internal_update(slot, 0, bytes)
    }

    pub fn mirror(&self, slot: u32) -> Option<&[u8]> {
        self.mirrors.get(&slot).map(Vec::as_slice)
    }

    pub fn slots(&self) -> impl Iterator<Item = u32> + '_ {
        self.mirrors.keys().copied()
    }

    pub fn is_dirty(&self, slot: u32) -> bool {
        self.dirty.contains(&slot)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Drains the dirty set in slot order.
    pub fn take_dirty(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    /// Marks every slot dirty again (e.g. after device buffers were recreated).
    pub fn mark_all_dirty(&mut self) {
        self.dirty = self.mirrors.keys().copied().collect();
    }

    pub fn thread_group(&self) -> ThreadGroup {
        self.threads
    }

    /// Groups for the most recent Shadow size.
    pub fn dispatch_groups(&self) -> [u32; 3] {
        self.groups
    }

    pub fn shadow_extent(&self) -> Option<ShadowExtent> {
        self.shadow
    }

    /// Decides whether the Shadow must be recreated for an input of `width × height`.
    /// On `Recreate` the extent and group counts are already updated.
    pub fn plan_shadow(&mut self, width: u32, height: u32, depth: Option<u32>) -> ShadowPlan {
        let wanted = ShadowExtent { width, height };
        if self.shadow == Some(wanted) {
            return ShadowPlan::Reuse;
        }
        self.shadow = Some(wanted);
        self.groups = self.threads.groups_for(width, height, depth);
        ShadowPlan::Recreate(wanted)
    }

    pub fn clear_shadow(&mut self) {
        self.shadow = None;
    }

    /// Binds an auxiliary texture to `slot` (slot 0 is the draw's own texture).
    pub fn set_texture(&mut self, slot: usize, texture: Option<T>) {
        if slot >= self.textures.len() {
            self.textures.resize_with(slot + 1, || None);
        }
        self.textures[slot] = texture;
    }

    pub fn texture(&self, slot: usize) -> Option<&T> {
        self.textures.get(slot).and_then(Option::as_ref)
    }

    /// `(slot, texture)` for every bound auxiliary texture, slot 1 and up.
    pub fn auxiliary_textures(&self) -> impl Iterator<Item = (usize, &T)> {
        self.textures
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, t)| t.as_ref().map(|t| (i, t)))
    }

    pub fn texture_slot_count(&self) -> usize {
        self.textures.len()
    }
}
