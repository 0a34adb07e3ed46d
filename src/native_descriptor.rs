// src/native_descriptor.rs
//! Descriptor exchange with the native plugin.
//!
//! The plugin reads and writes the SDK's own instance descriptor record, whose
//! layout belongs to the SDK build it was compiled against. A [`Descriptor`]
//! never crosses the boundary. The plugin is handed a [`NativeDescriptor`]
//! buffer with room for any SDK record, and a [`DescriptorLayout`] copies the
//! fields it knows the offsets of in or out of it. Unmapped bytes round-trip
//! untouched.

use std::ffi::c_void;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::Descriptor;
use crate::context::Context;
use crate::ensure;
use crate::error::Result;

/// Bytes reserved for one SDK descriptor record.
pub const NATIVE_DESCRIPTOR_CAPACITY: usize = 4096;

/// Opaque, 16-byte aligned storage the plugin fills with its descriptor record.
#[repr(C, align(16))]
#[derive(Clone)]
pub struct NativeDescriptor {
    bytes: [u8; NATIVE_DESCRIPTOR_CAPACITY],
}

impl NativeDescriptor {
    pub fn zeroed() -> Self {
        Self {
            bytes: [0; NATIVE_DESCRIPTOR_CAPACITY],
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.bytes.as_ptr().cast()
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.bytes.as_mut_ptr().cast()
    }
}

impl Default for NativeDescriptor {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for NativeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeDescriptor")
            .field("capacity", &NATIVE_DESCRIPTOR_CAPACITY)
            .finish()
    }
}

/// [`Descriptor`] fields that can be mapped onto the native record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorField {
    Enable,
    Simulate,
    GravityDir,
    MassScale,
    Damping,
    Stiffness,
    RootStiffness,
    InertiaScale,
    Wind,
    WindNoise,
    Width,
    WidthRootScale,
    WidthTipScale,
    Density,
    LengthScale,
    ClumpScale,
    WaveScale,
    WaveFrequency,
    RootColor,
    TipColor,
}

enum FieldSlot<'a> {
    /// One-byte C++ `bool`.
    Flag(&'a mut bool),
    /// Packed native-endian `f32`s.
    Floats(&'a mut [f32]),
}

impl DescriptorField {
    /// Bytes the field occupies in the native record.
    pub fn width(self) -> usize {
        match self {
            Self::Enable | Self::Simulate => 1,
            Self::GravityDir | Self::Wind => 12,
            Self::RootColor | Self::TipColor => 16,
            _ => 4,
        }
    }

    fn slot(self, desc: &mut Descriptor) -> FieldSlot<'_> {
        use std::slice::from_mut;
        match self {
            Self::Enable => FieldSlot::Flag(&mut desc.enable),
            Self::Simulate => FieldSlot::Flag(&mut desc.simulate),
            Self::GravityDir => FieldSlot::Floats(&mut desc.gravity_dir[..]),
            Self::MassScale => FieldSlot::Floats(from_mut(&mut desc.mass_scale)),
            Self::Damping => FieldSlot::Floats(from_mut(&mut desc.damping)),
            Self::Stiffness => FieldSlot::Floats(from_mut(&mut desc.stiffness)),
            Self::RootStiffness => FieldSlot::Floats(from_mut(&mut desc.root_stiffness)),
            Self::InertiaScale => FieldSlot::Floats(from_mut(&mut desc.inertia_scale)),
            Self::Wind => FieldSlot::Floats(&mut desc.wind[..]),
            Self::WindNoise => FieldSlot::Floats(from_mut(&mut desc.wind_noise)),
            Self::Width => FieldSlot::Floats(from_mut(&mut desc.width)),
            Self::WidthRootScale => FieldSlot::Floats(from_mut(&mut desc.width_root_scale)),
            Self::WidthTipScale => FieldSlot::Floats(from_mut(&mut desc.width_tip_scale)),
            Self::Density => FieldSlot::Floats(from_mut(&mut desc.density)),
            Self::LengthScale => FieldSlot::Floats(from_mut(&mut desc.length_scale)),
            Self::ClumpScale => FieldSlot::Floats(from_mut(&mut desc.clump_scale)),
            Self::WaveScale => FieldSlot::Floats(from_mut(&mut desc.wave_scale)),
            Self::WaveFrequency => FieldSlot::Floats(from_mut(&mut desc.wave_frequency)),
            Self::RootColor => FieldSlot::Floats(&mut desc.root_color[..]),
            Self::TipColor => FieldSlot::Floats(&mut desc.tip_color[..]),
        }
    }
}

/// Where one field sits in the native record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOffset {
    pub field: DescriptorField,
    pub offset: usize,
}

#[derive(Deserialize)]
struct RawLayout {
    size: usize,
    #[serde(default)]
    fields: Vec<FieldOffset>,
}

/// Byte offsets of the mapped fields inside one SDK build's descriptor record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorLayout {
    size: usize,
    fields: Vec<FieldOffset>,
}

impl Default for DescriptorLayout {
    fn default() -> Self {
        Self::opaque()
    }
}

impl DescriptorLayout {
    /// Maps nothing: decoding yields the base descriptor and encoding leaves
    /// the plugin's record as it was.
    pub fn opaque() -> Self {
        Self {
            size: NATIVE_DESCRIPTOR_CAPACITY,
            fields: Vec::new(),
        }
    }

    /// Fails when the record does not fit the reserved buffer or a field runs
    /// past the end of the record.
    pub fn new(size: usize, fields: Vec<FieldOffset>) -> Result<Self> {
        ensure!(size > 0, "descriptor record size must be positive");
        ensure!(
            size <= NATIVE_DESCRIPTOR_CAPACITY,
            "descriptor record of {} bytes exceeds the {} reserved",
            size,
            NATIVE_DESCRIPTOR_CAPACITY
        );
        for FieldOffset { field, offset } in &fields {
            let end = offset.saturating_add(field.width());
            ensure!(
                end <= size,
                "{:?} at offset {} runs past the {}-byte record",
                field,
                offset,
                size
            );
        }
        Ok(Self { size, fields })
    }

    /// Parses `{"size": .., "fields": [{"field": "stiffness", "offset": ..}]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawLayout = serde_json::from_str(json).context("parsing descriptor layout")?;
        Self::new(raw.size, raw.fields)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> &[FieldOffset] {
        &self.fields
    }

    /// `base` with every mapped field overwritten from `native`.
    pub fn decode(&self, native: &NativeDescriptor, mut base: Descriptor) -> Descriptor {
        for FieldOffset { field, offset } in &self.fields {
            let Some(src) = native.bytes.get(*offset..offset.saturating_add(field.width())) else {
                continue;
            };
            match field.slot(&mut base) {
                FieldSlot::Flag(flag) => *flag = src[0] != 0,
                FieldSlot::Floats(values) => {
                    for (value, chunk) in values.iter_mut().zip(src.chunks_exact(4)) {
                        *value = bytemuck::pod_read_unaligned(chunk);
                    }
                }
            }
        }
        base
    }

    /// Writes every mapped field of `desc` into `native`.
    pub fn encode(&self, desc: &Descriptor, native: &mut NativeDescriptor) {
        let mut desc = *desc;
        for FieldOffset { field, offset } in &self.fields {
            let Some(dst) = native.bytes.get_mut(*offset..offset.saturating_add(field.width())) else {
                continue;
            };
            match field.slot(&mut desc) {
                FieldSlot::Flag(flag) => dst[0] = u8::from(*flag),
                FieldSlot::Floats(values) => dst.copy_from_slice(bytemuck::cast_slice::<f32, u8>(values)),
            }
        }
    }
}
