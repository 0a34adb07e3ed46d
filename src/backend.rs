// src/backend.rs
//! The hair backend contract.
//!
//! [`HairBackend`] is the whole surface the bridge needs from the native hair
//! simulation/rendering library. Every call is synchronous; "async" skinning
//! uploads are queued inside the backend and read from the caller's buffer
//! later, which is why [`SkinningMatrix`] slices handed to
//! [`HairBackend::update_skinning_matrices_async`] must stay at a fixed address.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::handle::{AssetHandle, InstanceHandle, ShaderHandle};
use crate::lighting::LightData;

/// Number of texture slots an asset can declare.
pub const MAX_HAIR_TEXTURES: usize = 14;

/// Texture slots understood by the backend.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    Density = 0,
    RootColor = 1,
    TipColor = 2,
    Width = 3,
    Stiffness = 4,
    RootStiffness = 5,
    ClumpScale = 6,
    ClumpRoundness = 7,
    WaveScale = 8,
    WaveFrequency = 9,
    Strand = 10,
    Length = 11,
    Specular = 12,
    Weights = 13,
}

impl TextureType {
    pub const ALL: [TextureType; MAX_HAIR_TEXTURES] = [
        TextureType::Density,
        TextureType::RootColor,
        TextureType::TipColor,
        TextureType::Width,
        TextureType::Stiffness,
        TextureType::RootStiffness,
        TextureType::ClumpScale,
        TextureType::ClumpRoundness,
        TextureType::WaveScale,
        TextureType::WaveFrequency,
        TextureType::Strand,
        TextureType::Length,
        TextureType::Specular,
        TextureType::Weights,
    ];

    /// Slots bound automatically on first render. Others wait for explicit assignment.
    pub const AUTO_BOUND: [TextureType; 3] = [
        TextureType::RootColor,
        TextureType::TipColor,
        TextureType::Density,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Opaque native texture pointer supplied by the host's graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeTexture(pub usize);

/// Address of the backend's native draw entry point. The host's pipeline
/// invokes it with a [`RenderEvent`] id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawHookEntry(pub usize);

/// Sub-command id the native draw entry point dispatches on.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderEvent {
    Mono = 0,
    StereoMultiPass = 1,
    StereoSinglePass = 2,
}

impl RenderEvent {
    #[inline]
    pub fn id(self) -> i32 {
        self as i32
    }
}

/// A 4x4 transform in the layout the native plugin reads for every matrix it
/// takes: bind poses, skinning, view and projection.
///
/// The plugin uses the row-vector convention (`v' = v * M`), so each of
/// `rows` is a basis vector and `rows[3]` holds the translation. That memory
/// is exactly glam's column-major layout: `rows[i]` is column `i` of the
/// glam matrix and no transpose happens at the boundary.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SkinningMatrix {
    pub rows: [[f32; 4]; 4],
}

impl SkinningMatrix {
    pub const IDENTITY: Self = Self {
        rows: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    #[inline]
    pub fn from_mat4(m: Mat4) -> Self {
        Self {
            rows: m.to_cols_array_2d(),
        }
    }

    #[inline]
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.rows)
    }
}

impl Default for SkinningMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Simulation and shading parameters of one hair instance.
///
/// This is the bridge's own view of the SDK record; see
/// [`crate::native_descriptor`] for how it reaches the plugin.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Descriptor {
    pub enable: bool,
    pub simulate: bool,
    pub gravity_dir: [f32; 3],
    pub mass_scale: f32,
    pub damping: f32,
    pub stiffness: f32,
    pub root_stiffness: f32,
    pub inertia_scale: f32,
    pub wind: [f32; 3],
    pub wind_noise: f32,
    pub width: f32,
    pub width_root_scale: f32,
    pub width_tip_scale: f32,
    pub density: f32,
    pub length_scale: f32,
    pub clump_scale: f32,
    pub wave_scale: f32,
    pub wave_frequency: f32,
    pub root_color: [f32; 4],
    pub tip_color: [f32; 4],
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            enable: true,
            simulate: true,
            gravity_dir: [0.0, -1.0, 0.0],
            mass_scale: 10.0,
            damping: 0.0,
            stiffness: 0.5,
            root_stiffness: 0.5,
            inertia_scale: 1.0,
            wind: [0.0; 3],
            wind_noise: 0.0,
            width: 1.0,
            width_root_scale: 1.0,
            width_tip_scale: 0.1,
            density: 1.0,
            length_scale: 1.0,
            clump_scale: 0.0,
            wave_scale: 0.0,
            wave_frequency: 3.0,
            root_color: [1.0, 1.0, 1.0, 1.0],
            tip_color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// The native hair library as seen by the bridge.
///
/// Release calls accept empty handles and ignore them. Loads return an empty
/// handle on failure.
pub trait HairBackend {
    // ---------- Library ----------

    /// Loads the native SDK. `false` means nothing will render.
    fn load(&mut self) -> bool;
    fn sdk_version(&self) -> String;
    /// Routes backend log output into [`crate::diagnostics::backend_log_sink`].
    fn install_log_sink(&mut self);
    /// Stops the backend from executing queued draw work during teardown.
    fn set_shutting_down(&mut self);
    fn draw_hook_entry(&self) -> DrawHookEntry;

    // ---------- Shader ----------

    fn shader_load(&mut self, path: &str) -> ShaderHandle;
    fn shader_release(&mut self, shader: ShaderHandle);
    fn shader_reload(&mut self, shader: ShaderHandle);

    // ---------- Asset ----------

    fn asset_load(&mut self, path: &str) -> AssetHandle;
    fn asset_release(&mut self, asset: AssetHandle);
    fn asset_reload(&mut self, asset: AssetHandle);
    fn asset_bone_count(&self, asset: AssetHandle) -> usize;
    fn asset_bone_name(&self, asset: AssetHandle, bone: usize) -> Option<String>;
    fn asset_bind_pose(&self, asset: AssetHandle, bone: usize) -> Mat4;
    fn asset_texture_name(&self, asset: AssetHandle, slot: TextureType) -> Option<String>;
    fn asset_default_descriptor(&self, asset: AssetHandle) -> Descriptor;

    // ---------- Instance ----------

    fn instance_create(&mut self, asset: AssetHandle) -> InstanceHandle;
    fn instance_release(&mut self, instance: InstanceHandle);
    fn instance_descriptor(&self, instance: InstanceHandle) -> Descriptor;
    fn instance_set_descriptor(&mut self, instance: InstanceHandle, desc: &Descriptor);
    fn instance_set_texture(&mut self, instance: InstanceHandle, slot: TextureType, texture: NativeTexture);
    fn instance_set_texture_into_device(&mut self, instance: InstanceHandle, slot: TextureType);
    /// Queues a skinning upload. The backend keeps `matrices.as_ptr()` until the
    /// queued work runs, so the buffer must not move between frames.
    fn update_skinning_matrices_async(
        &mut self,
        instance: InstanceHandle,
        matrices: &[SkinningMatrix],
        stereo: bool,
    );

    // ---------- Scene ----------

    fn begin_scene(&mut self, stereo: bool);
    fn end_scene(&mut self, stereo: bool);
    fn set_view_projection(&mut self, view: &Mat4, projection: &Mat4, fov: f32);
    fn set_view_projection_stereo(
        &mut self,
        left: (&Mat4, &Mat4),
        right: (&Mat4, &Mat4),
        fov: f32,
        single_pass: bool,
    );
    fn set_lights(&mut self, lights: &[LightData], stereo: bool);
    fn set_shader(&mut self, shader: ShaderHandle, stereo: bool);
    fn render(&mut self, instance: InstanceHandle, stereo: bool);
    fn step_simulation(&mut self, dt: f32, stereo: bool, single_pass: bool);
}
