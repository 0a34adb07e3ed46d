// src/recording.rs
//! Headless backend.
//!
//! [`RecordingBackend`] hands out handles, keeps per-asset metadata registered
//! up front, and records every call it receives. It lets a host run the full
//! bridge without a GPU (servers, CI) and is what the crate's tests drive.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glam::Mat4;
use parking_lot::Mutex;

use crate::backend::{
    Descriptor, DrawHookEntry, HairBackend, NativeTexture, SkinningMatrix, TextureType,
};
use crate::handle::{AssetHandle, InstanceHandle, ShaderHandle};
use crate::lighting::LightData;

/// One backend call, with handles as raw ids.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load,
    InstallLogSink,
    SetShuttingDown,
    ShaderLoad { path: String, shader: u32 },
    ShaderRelease(u32),
    ShaderReload(u32),
    AssetLoad { path: String, asset: u32 },
    AssetRelease(u32),
    AssetReload(u32),
    InstanceCreate { asset: u32, instance: u32 },
    InstanceRelease(u32),
    GetDescriptor(u32),
    SetDescriptor(u32),
    SetTexture { instance: u32, slot: TextureType, texture: NativeTexture },
    SetTextureIntoDevice { instance: u32, slot: TextureType },
    UpdateSkinning { instance: u32, count: usize, ptr: usize, stereo: bool },
    BeginScene { stereo: bool },
    EndScene { stereo: bool },
    SetViewProjection { fov: f32 },
    SetViewProjectionStereo { fov: f32, single_pass: bool },
    SetLights { count: usize, stereo: bool },
    SetShader { shader: u32, stereo: bool },
    Render { instance: u32, stereo: bool },
    StepSimulation { dt: f32, stereo: bool, single_pass: bool },
}

/// Shared view of the calls a [`RecordingBackend`] has seen.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().iter().filter(|c| pred(c)).count()
    }
}

/// What an asset file contains, registered by path.
#[derive(Debug, Clone, Default)]
pub struct AssetSpec {
    pub bones: Vec<String>,
    pub bind_poses: Vec<Mat4>,
    pub textures: HashMap<TextureType, String>,
    pub descriptor: Descriptor,
}

impl AssetSpec {
    pub fn with_bones<I, S>(bones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bones: bones.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn texture(mut self, slot: TextureType, file: impl Into<String>) -> Self {
        self.textures.insert(slot, file.into());
        self
    }
}

#[derive(Debug)]
pub struct RecordingBackend {
    log: CallLog,
    available: bool,
    next_id: u32,
    assets: HashMap<String, AssetSpec>,
    failing_paths: HashSet<String>,
    live_shaders: HashSet<u32>,
    live_assets: HashMap<u32, String>,
    live_instances: HashMap<u32, u32>,
    descriptors: HashMap<u32, Descriptor>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            available: true,
            next_id: 0,
            assets: HashMap::new(),
            failing_paths: HashSet::new(),
            live_shaders: HashSet::new(),
            live_assets: HashMap::new(),
            live_instances: HashMap::new(),
            descriptors: HashMap::new(),
        }
    }

    /// Simulates a missing native library.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn with_asset(mut self, path: impl Into<String>, spec: AssetSpec) -> Self {
        self.assets.insert(path.into(), spec);
        self
    }

    /// Loads of `path` (shader or asset) will return an empty handle.
    pub fn fail_path(&mut self, path: impl Into<String>) {
        self.failing_paths.insert(path.into());
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn live_shader_count(&self) -> usize {
        self.live_shaders.len()
    }

    pub fn live_asset_count(&self) -> usize {
        self.live_assets.len()
    }

    pub fn live_instance_count(&self) -> usize {
        self.live_instances.len()
    }

    /// Descriptor last set on (or created with) `instance`.
    pub fn descriptor_of(&self, instance: InstanceHandle) -> Option<Descriptor> {
        self.descriptors.get(&instance.raw()).copied()
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn spec(&self, asset: AssetHandle) -> Option<&AssetSpec> {
        self.live_assets
            .get(&asset.raw())
            .and_then(|path| self.assets.get(path))
    }

    fn loadable(&self, path: &str) -> bool {
        self.available && !path.is_empty() && !self.failing_paths.contains(path)
    }
}

impl HairBackend for RecordingBackend {
    fn load(&mut self) -> bool {
        self.log.push(Call::Load);
        self.available
    }

    fn sdk_version(&self) -> String {
        "recording-1.0".to_string()
    }

    fn install_log_sink(&mut self) {
        self.log.push(Call::InstallLogSink);
    }

    fn set_shutting_down(&mut self) {
        self.log.push(Call::SetShuttingDown);
    }

    fn draw_hook_entry(&self) -> DrawHookEntry {
        DrawHookEntry(0x1000)
    }

    fn shader_load(&mut self, path: &str) -> ShaderHandle {
        let handle = if self.loadable(path) {
            let id = self.allocate();
            self.live_shaders.insert(id);
            ShaderHandle::from_raw(id)
        } else {
            ShaderHandle::EMPTY
        };
        self.log.push(Call::ShaderLoad {
            path: path.to_string(),
            shader: handle.raw(),
        });
        handle
    }

    fn shader_release(&mut self, shader: ShaderHandle) {
        self.live_shaders.remove(&shader.raw());
        self.log.push(Call::ShaderRelease(shader.raw()));
    }

    fn shader_reload(&mut self, shader: ShaderHandle) {
        self.log.push(Call::ShaderReload(shader.raw()));
    }

    fn asset_load(&mut self, path: &str) -> AssetHandle {
        let handle = if self.loadable(path) && self.assets.contains_key(path) {
            let id = self.allocate();
            self.live_assets.insert(id, path.to_string());
            AssetHandle::from_raw(id)
        } else {
            AssetHandle::EMPTY
        };
        self.log.push(Call::AssetLoad {
            path: path.to_string(),
            asset: handle.raw(),
        });
        handle
    }

    fn asset_release(&mut self, asset: AssetHandle) {
        self.live_assets.remove(&asset.raw());
        self.log.push(Call::AssetRelease(asset.raw()));
    }

    fn asset_reload(&mut self, asset: AssetHandle) {
        self.log.push(Call::AssetReload(asset.raw()));
    }

    fn asset_bone_count(&self, asset: AssetHandle) -> usize {
        self.spec(asset).map_or(0, |s| s.bones.len())
    }

    fn asset_bone_name(&self, asset: AssetHandle, bone: usize) -> Option<String> {
        self.spec(asset).and_then(|s| s.bones.get(bone).cloned())
    }

    fn asset_bind_pose(&self, asset: AssetHandle, bone: usize) -> Mat4 {
        self.spec(asset)
            .and_then(|s| s.bind_poses.get(bone).copied())
            .unwrap_or(Mat4::IDENTITY)
    }

    fn asset_texture_name(&self, asset: AssetHandle, slot: TextureType) -> Option<String> {
        self.spec(asset).and_then(|s| s.textures.get(&slot).cloned())
    }

    fn asset_default_descriptor(&self, asset: AssetHandle) -> Descriptor {
        self.spec(asset).map(|s| s.descriptor).unwrap_or_default()
    }

    fn instance_create(&mut self, asset: AssetHandle) -> InstanceHandle {
        let handle = if self.live_assets.contains_key(&asset.raw()) {
            let id = self.allocate();
            self.live_instances.insert(id, asset.raw());
            let desc = self.asset_default_descriptor(asset);
            self.descriptors.insert(id, desc);
            InstanceHandle::from_raw(id)
        } else {
            InstanceHandle::EMPTY
        };
        self.log.push(Call::InstanceCreate {
            asset: asset.raw(),
            instance: handle.raw(),
        });
        handle
    }

    fn instance_release(&mut self, instance: InstanceHandle) {
        self.live_instances.remove(&instance.raw());
        self.descriptors.remove(&instance.raw());
        self.log.push(Call::InstanceRelease(instance.raw()));
    }

    fn instance_descriptor(&self, instance: InstanceHandle) -> Descriptor {
        self.log.push(Call::GetDescriptor(instance.raw()));
        self.descriptors.get(&instance.raw()).copied().unwrap_or_default()
    }

    fn instance_set_descriptor(&mut self, instance: InstanceHandle, desc: &Descriptor) {
        if self.live_instances.contains_key(&instance.raw()) {
            self.descriptors.insert(instance.raw(), *desc);
        }
        self.log.push(Call::SetDescriptor(instance.raw()));
    }

    fn instance_set_texture(&mut self, instance: InstanceHandle, slot: TextureType, texture: NativeTexture) {
        self.log.push(Call::SetTexture {
            instance: instance.raw(),
            slot,
            texture,
        });
    }

    fn instance_set_texture_into_device(&mut self, instance: InstanceHandle, slot: TextureType) {
        self.log.push(Call::SetTextureIntoDevice {
            instance: instance.raw(),
            slot,
        });
    }

    fn update_skinning_matrices_async(
        &mut self,
        instance: InstanceHandle,
        matrices: &[SkinningMatrix],
        stereo: bool,
    ) {
        self.log.push(Call::UpdateSkinning {
            instance: instance.raw(),
            count: matrices.len(),
            ptr: matrices.as_ptr() as usize,
            stereo,
        });
    }

    fn begin_scene(&mut self, stereo: bool) {
        self.log.push(Call::BeginScene { stereo });
    }

    fn end_scene(&mut self, stereo: bool) {
        self.log.push(Call::EndScene { stereo });
    }

    fn set_view_projection(&mut self, _view: &Mat4, _projection: &Mat4, fov: f32) {
        self.log.push(Call::SetViewProjection { fov });
    }

    fn set_view_projection_stereo(
        &mut self,
        _left: (&Mat4, &Mat4),
        _right: (&Mat4, &Mat4),
        fov: f32,
        single_pass: bool,
    ) {
        self.log.push(Call::SetViewProjectionStereo { fov, single_pass });
    }

    fn set_lights(&mut self, lights: &[LightData], stereo: bool) {
        self.log.push(Call::SetLights {
            count: lights.len(),
            stereo,
        });
    }

    fn set_shader(&mut self, shader: ShaderHandle, stereo: bool) {
        self.log.push(Call::SetShader {
            shader: shader.raw(),
            stereo,
        });
    }

    fn render(&mut self, instance: InstanceHandle, stereo: bool) {
        self.log.push(Call::Render {
            instance: instance.raw(),
            stereo,
        });
    }

    fn step_simulation(&mut self, dt: f32, stereo: bool, single_pass: bool) {
        self.log.push(Call::StepSimulation {
            dt,
            stereo,
            single_pass,
        });
    }
}
