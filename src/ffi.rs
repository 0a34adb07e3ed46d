// src/ffi.rs
//! Binding to the native hair plugin.
//!
//! Only built with the `native` feature. The plugin exports plain C functions
//! taking `u32` handles (`0xFFFF_FFFF` = none), NUL-terminated strings and
//! matrices laid out as [`SkinningMatrix`]. Descriptors travel through a
//! [`NativeDescriptor`] buffer.

use std::ffi::{c_char, c_int, c_void, CStr, CString};

use glam::Mat4;

use crate::backend::{Descriptor, DrawHookEntry, HairBackend, NativeTexture, SkinningMatrix, TextureType};
use crate::diagnostics::backend_log_sink;
use crate::handle::{AssetHandle, InstanceHandle, ShaderHandle};
use crate::lighting::LightData;
use crate::native_descriptor::{DescriptorLayout, NativeDescriptor};

type LogCallback = unsafe extern "C" fn(*const c_char);

#[link(name = "HairWorksIntegration")]
extern "C" {
    fn hwGetSDKVersion() -> c_int;
    fn hwLoadHairWorks() -> bool;
    fn hwSetLogCallback(cb: LogCallback);
    fn hwSetShuttingDownFlag();
    fn hwGetRenderEventFunc() -> *const c_void;

    fn hwShaderLoadFromFile(path: *const c_char) -> u32;
    fn hwShaderRelease(sid: u32);
    fn hwShaderReload(sid: u32);

    fn hwAssetLoadFromFile(path: *const c_char) -> u32;
    fn hwAssetRelease(aid: u32);
    fn hwAssetReload(aid: u32);
    fn hwAssetGetNumBones(aid: u32) -> c_int;
    fn hwAssetGetBoneName(aid: u32, nth: c_int) -> *const c_char;
    fn hwAssetGetBindPose(aid: u32, nth: c_int, o_mat: *mut SkinningMatrix);
    fn hwAssetGetDefaultDescriptor(aid: u32, o_desc: *mut c_void);
    fn hwAssetGetTextureName(aid: u32, texture_type: c_int) -> *const c_char;

    fn hwInstanceCreate(aid: u32) -> u32;
    fn hwInstanceRelease(iid: u32);
    fn hwInstanceGetDescriptor(iid: u32, o_desc: *mut c_void);
    fn hwInstanceSetDescriptor(iid: u32, desc: *const c_void);
    fn hwInstanceSetTexture(iid: u32, texture_type: c_int, tex: *mut c_void);
    fn hwInstanceSetTextureIntoDevice(iid: u32, texture_type: c_int);
    fn hwInstanceUpdateSkinningMatricesAsync(iid: u32, num_bones: c_int, matrices: *const SkinningMatrix, vr_mode: bool);

    fn hwBeginScene(vr_mode: bool);
    fn hwEndScene(vr_mode: bool);
    fn hwSetViewProjection(view: *const SkinningMatrix, proj: *const SkinningMatrix, fov: f32);
    fn hwSetViewProjectionStereo(
        view: *const SkinningMatrix,
        proj: *const SkinningMatrix,
        view2: *const SkinningMatrix,
        proj2: *const SkinningMatrix,
        fov: f32,
        single_pass_stereo: bool,
    );
    fn hwSetShader(sid: u32, vr_mode: bool);
    fn hwSetLights(num_lights: c_int, lights: *const LightData, vr_mode: bool);
    fn hwRender(iid: u32, vr_mode: bool);
    fn hwStepSimulation(dt: f32, vr_mode: bool, single_pass_vr: bool);
}

/// Copies a plugin-owned string. Null and empty both read as `None`.
unsafe fn borrowed_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let s = CStr::from_ptr(ptr).to_string_lossy().into_owned();
    (!s.is_empty()).then_some(s)
}

fn c_path(path: &str) -> Option<CString> {
    match CString::new(path) {
        Ok(c) => Some(c),
        Err(_) => {
            log::error!("path '{}' contains a NUL byte", path.escape_debug());
            None
        }
    }
}

/// [`HairBackend`] backed by the linked native plugin.
///
/// Descriptor fields are only exchanged where `layout` maps them. The default
/// layout maps none, so the plugin keeps the asset's own parameters.
#[derive(Debug, Default)]
pub struct NativeBackend {
    loaded: bool,
    layout: DescriptorLayout,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `layout` to map descriptor fields onto the plugin's record.
    pub fn with_descriptor_layout(mut self, layout: DescriptorLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn descriptor_layout(&self) -> &DescriptorLayout {
        &self.layout
    }
}

impl HairBackend for NativeBackend {
    fn load(&mut self) -> bool {
        self.loaded = unsafe { hwLoadHairWorks() };
        self.loaded
    }

    fn sdk_version(&self) -> String {
        unsafe { hwGetSDKVersion() }.to_string()
    }

    fn install_log_sink(&mut self) {
        unsafe { hwSetLogCallback(backend_log_sink) }
    }

    fn set_shutting_down(&mut self) {
        unsafe { hwSetShuttingDownFlag() }
    }

    fn draw_hook_entry(&self) -> DrawHookEntry {
        DrawHookEntry(unsafe { hwGetRenderEventFunc() } as usize)
    }

    fn shader_load(&mut self, path: &str) -> ShaderHandle {
        match c_path(path) {
            Some(c) => ShaderHandle::from_raw(unsafe { hwShaderLoadFromFile(c.as_ptr()) }),
            None => ShaderHandle::EMPTY,
        }
    }

    fn shader_release(&mut self, shader: ShaderHandle) {
        if shader.is_valid() {
            unsafe { hwShaderRelease(shader.raw()) }
        }
    }

    fn shader_reload(&mut self, shader: ShaderHandle) {
        if shader.is_valid() {
            unsafe { hwShaderReload(shader.raw()) }
        }
    }

    fn asset_load(&mut self, path: &str) -> AssetHandle {
        match c_path(path) {
            Some(c) => AssetHandle::from_raw(unsafe { hwAssetLoadFromFile(c.as_ptr()) }),
            None => AssetHandle::EMPTY,
        }
    }

    fn asset_release(&mut self, asset: AssetHandle) {
        if asset.is_valid() {
            unsafe { hwAssetRelease(asset.raw()) }
        }
    }

    fn asset_reload(&mut self, asset: AssetHandle) {
        if asset.is_valid() {
            unsafe { hwAssetReload(asset.raw()) }
        }
    }

    fn asset_bone_count(&self, asset: AssetHandle) -> usize {
        if !asset.is_valid() {
            return 0;
        }
        usize::try_from(unsafe { hwAssetGetNumBones(asset.raw()) }).unwrap_or(0)
    }

    fn asset_bone_name(&self, asset: AssetHandle, bone: usize) -> Option<String> {
        let nth = c_int::try_from(bone).ok()?;
        unsafe { borrowed_string(hwAssetGetBoneName(asset.get()?.raw(), nth)) }
    }

    fn asset_bind_pose(&self, asset: AssetHandle, bone: usize) -> Mat4 {
        let (Some(asset), Ok(nth)) = (asset.get(), c_int::try_from(bone)) else {
            return Mat4::IDENTITY;
        };
        let mut pose = SkinningMatrix::IDENTITY;
        unsafe { hwAssetGetBindPose(asset.raw(), nth, &mut pose) };
        pose.to_mat4()
    }

    fn asset_texture_name(&self, asset: AssetHandle, slot: TextureType) -> Option<String> {
        unsafe { borrowed_string(hwAssetGetTextureName(asset.get()?.raw(), slot as c_int)) }
    }

    fn asset_default_descriptor(&self, asset: AssetHandle) -> Descriptor {
        let mut native = NativeDescriptor::zeroed();
        if asset.is_valid() {
            unsafe { hwAssetGetDefaultDescriptor(asset.raw(), native.as_mut_ptr()) };
        }
        self.layout.decode(&native, Descriptor::default())
    }

    fn instance_create(&mut self, asset: AssetHandle) -> InstanceHandle {
        match asset.get() {
            Some(asset) => InstanceHandle::from_raw(unsafe { hwInstanceCreate(asset.raw()) }),
            None => InstanceHandle::EMPTY,
        }
    }

    fn instance_release(&mut self, instance: InstanceHandle) {
        if instance.is_valid() {
            unsafe { hwInstanceRelease(instance.raw()) }
        }
    }

    fn instance_descriptor(&self, instance: InstanceHandle) -> Descriptor {
        let mut native = NativeDescriptor::zeroed();
        if instance.is_valid() {
            unsafe { hwInstanceGetDescriptor(instance.raw(), native.as_mut_ptr()) };
        }
        self.layout.decode(&native, Descriptor::default())
    }

    fn instance_set_descriptor(&mut self, instance: InstanceHandle, desc: &Descriptor) {
        let Some(instance) = instance.get() else {
            return;
        };
        // start from the plugin's record so unmapped fields survive
        let mut native = NativeDescriptor::zeroed();
        unsafe { hwInstanceGetDescriptor(instance.raw(), native.as_mut_ptr()) };
        self.layout.encode(desc, &mut native);
        unsafe { hwInstanceSetDescriptor(instance.raw(), native.as_ptr()) }
    }

    fn instance_set_texture(&mut self, instance: InstanceHandle, slot: TextureType, texture: NativeTexture) {
        if instance.is_valid() {
            unsafe { hwInstanceSetTexture(instance.raw(), slot as c_int, texture.0 as *mut c_void) }
        }
    }

    fn instance_set_texture_into_device(&mut self, instance: InstanceHandle, slot: TextureType) {
        if instance.is_valid() {
            unsafe { hwInstanceSetTextureIntoDevice(instance.raw(), slot as c_int) }
        }
    }

    fn update_skinning_matrices_async(&mut self, instance: InstanceHandle, matrices: &[SkinningMatrix], stereo: bool) {
        let Ok(count) = c_int::try_from(matrices.len()) else {
            log::error!("{} skinning matrices exceed the plugin limit", matrices.len());
            return;
        };
        if instance.is_valid() {
            unsafe { hwInstanceUpdateSkinningMatricesAsync(instance.raw(), count, matrices.as_ptr(), stereo) }
        }
    }

    fn begin_scene(&mut self, stereo: bool) {
        unsafe { hwBeginScene(stereo) }
    }

    fn end_scene(&mut self, stereo: bool) {
        unsafe { hwEndScene(stereo) }
    }

    fn set_view_projection(&mut self, view: &Mat4, projection: &Mat4, fov: f32) {
        let (v, p) = (SkinningMatrix::from_mat4(*view), SkinningMatrix::from_mat4(*projection));
        unsafe { hwSetViewProjection(&v, &p, fov) }
    }

    fn set_view_projection_stereo(&mut self, left: (&Mat4, &Mat4), right: (&Mat4, &Mat4), fov: f32, single_pass: bool) {
        let (vl, pl) = (SkinningMatrix::from_mat4(*left.0), SkinningMatrix::from_mat4(*left.1));
        let (vr, pr) = (SkinningMatrix::from_mat4(*right.0), SkinningMatrix::from_mat4(*right.1));
        unsafe { hwSetViewProjectionStereo(&vl, &pl, &vr, &pr, fov, single_pass) }
    }

    fn set_lights(&mut self, lights: &[LightData], stereo: bool) {
        // at most MAX_LIGHTS by the time it gets here
        let count = lights.len() as c_int;
        unsafe { hwSetLights(count, lights.as_ptr(), stereo) }
    }

    fn set_shader(&mut self, shader: ShaderHandle, stereo: bool) {
        unsafe { hwSetShader(shader.raw(), stereo) }
    }

    fn render(&mut self, instance: InstanceHandle, stereo: bool) {
        if instance.is_valid() {
            unsafe { hwRender(instance.raw(), stereo) }
        }
    }

    fn step_simulation(&mut self, dt: f32, stereo: bool, single_pass: bool) {
        unsafe { hwStepSimulation(dt, stereo, single_pass) }
    }
}
