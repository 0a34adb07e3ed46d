// src/lighting.rs
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::backend::HairBackend;
use crate::scene::LightSource;

/// Most lights the backend's constant buffer holds.
pub const MAX_LIGHTS: usize = 8;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    Directional = 0,
    Point = 1,
}

/// Light record in the backend's constant-buffer layout.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct LightData {
    pub light_type: u32,
    pub _pad: [u32; 3],
    /// xyz: position, w: range
    pub position: [f32; 4],
    pub direction: [f32; 4],
    pub color: [f32; 4],
}

impl LightData {
    pub fn directional(direction: Vec3, color: Vec4) -> Self {
        Self {
            light_type: LightType::Directional as u32,
            _pad: [0; 3],
            position: [0.0; 4],
            direction: direction.normalize_or_zero().extend(0.0).to_array(),
            color: color.to_array(),
        }
    }

    pub fn point(position: Vec3, range: f32, color: Vec4) -> Self {
        Self {
            light_type: LightType::Point as u32,
            _pad: [0; 3],
            position: position.extend(range).to_array(),
            direction: [0.0; 4],
            color: color.to_array(),
        }
    }
}

impl Default for LightData {
    fn default() -> Self {
        Self::directional(Vec3::ZERO, Vec4::ONE)
    }
}

/// Collects the host's hair-affecting lights and pushes at most `max_lights`
/// of them. Returns how many were pushed.
pub fn push_scene_lights<S, B>(source: &S, backend: &mut B, max_lights: usize, stereo: bool) -> usize
where
    S: LightSource + ?Sized,
    B: HairBackend + ?Sized,
{
    let mut lights = source.hair_lights();
    let cap = max_lights.min(MAX_LIGHTS);
    if lights.len() > cap {
        log::warn!(
            "{} hair lights in scene, only the first {} are used",
            lights.len(),
            cap
        );
        lights.truncate(cap);
    }
    backend.set_lights(&lights, stereo);
    lights.len()
}
