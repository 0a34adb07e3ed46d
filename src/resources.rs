// src/resources.rs
//! Resource Lifecycle Manager.
//!
//! Owns one entity's shader, asset and instance handles. A release always
//! precedes the matching re-acquire, and the instance is always released
//! before the asset it was created from.

use std::path::Path;

use crate::backend::{HairBackend, NativeTexture, TextureType, MAX_HAIR_TEXTURES};
use crate::error::{Error, ResourceKind, Result};
use crate::handle::{AssetHandle, InstanceHandle, ShaderHandle};
use crate::scene::TextureLocator;

#[derive(Debug)]
pub struct HairResources {
    resource_root: String,
    texture_namespace: String,

    shader: ShaderHandle,
    asset: AssetHandle,
    instance: InstanceHandle,
    shader_path: Option<String>,
    asset_path: Option<String>,

    texture_names: [Option<String>; MAX_HAIR_TEXTURES],
    textures: [Option<NativeTexture>; MAX_HAIR_TEXTURES],
    textures_bound: bool,
}

impl HairResources {
    pub fn new(resource_root: impl Into<String>, texture_namespace: impl Into<String>) -> Self {
        Self {
            resource_root: resource_root.into(),
            texture_namespace: texture_namespace.into(),
            shader: ShaderHandle::EMPTY,
            asset: AssetHandle::EMPTY,
            instance: InstanceHandle::EMPTY,
            shader_path: None,
            asset_path: None,
            texture_names: Default::default(),
            textures: [None; MAX_HAIR_TEXTURES],
            textures_bound: false,
        }
    }

    #[inline]
    pub fn shader(&self) -> ShaderHandle {
        self.shader
    }

    #[inline]
    pub fn asset(&self) -> AssetHandle {
        self.asset
    }

    #[inline]
    pub fn instance(&self) -> InstanceHandle {
        self.instance
    }

    /// Path of the last shader that loaded successfully.
    pub fn shader_path(&self) -> Option<&str> {
        self.shader_path.as_deref()
    }

    /// Path of the last asset that loaded successfully.
    pub fn asset_path(&self) -> Option<&str> {
        self.asset_path.as_deref()
    }

    fn full_path(&self, path: &str) -> String {
        format!("{}{}", self.resource_root, path)
    }

    // ---------- Shader ----------

    /// Replaces the current shader with one loaded from `path`.
    ///
    /// The old shader is released first. On failure the entity is left without
    /// a shader and the stored path keeps its previous value.
    pub fn load_shader<B: HairBackend + ?Sized>(&mut self, backend: &mut B, path: &str) -> Result<()> {
        if let Some(old) = self.shader.take().get() {
            backend.shader_release(old);
        }

        let shader = backend.shader_load(&self.full_path(path));
        if !shader.is_valid() {
            log::error!("hair shader '{path}' failed to load");
            return Err(Error::load_failure(ResourceKind::Shader, path));
        }

        self.shader = shader;
        self.shader_path = Some(path.to_string());
        log::info!("hair shader '{path}' loaded ({shader:?})");
        Ok(())
    }

    /// Reloads the bound shader in place. No-op without a shader.
    pub fn reload_shader<B: HairBackend + ?Sized>(&mut self, backend: &mut B) -> bool {
        match self.shader.get() {
            Some(shader) => {
                backend.shader_reload(shader);
                true
            }
            None => false,
        }
    }

    // ---------- Asset ----------

    /// Releases the instance and asset, loads the asset at `path` and creates
    /// a fresh instance from it. Texture names are re-read from the asset and
    /// located through `textures`.
    ///
    /// On failure nothing is left bound.
    pub fn load_asset<B, T>(&mut self, backend: &mut B, textures: &T, path: &str) -> Result<()>
    where
        B: HairBackend + ?Sized,
        T: TextureLocator + ?Sized,
    {
        self.release_asset(backend);

        let asset = backend.asset_load(&self.full_path(path));
        if !asset.is_valid() {
            log::error!("hair asset '{path}' failed to load");
            return Err(Error::load_failure(ResourceKind::Asset, path));
        }
        self.asset = asset;
        self.asset_path = Some(path.to_string());

        let instance = backend.instance_create(asset);
        if !instance.is_valid() {
            log::error!("no instance could be created from hair asset '{path}'");
            self.release_asset(backend);
            return Err(Error::load_failure(ResourceKind::Instance, path));
        }
        self.instance = instance;

        self.read_texture_names(backend);
        self.locate_textures(textures);
        log::info!("hair asset '{path}' loaded ({asset:?}, {instance:?})");
        Ok(())
    }

    /// Reloads the asset in place. No-op without an asset.
    pub fn reload_asset<B: HairBackend + ?Sized>(&mut self, backend: &mut B) -> bool {
        match self.asset.get() {
            Some(asset) => {
                backend.asset_reload(asset);
                true
            }
            None => false,
        }
    }

    /// Instance first, then the asset it depends on.
    fn release_asset<B: HairBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(instance) = self.instance.take().get() {
            backend.instance_release(instance);
        }
        if let Some(asset) = self.asset.take().get() {
            backend.asset_release(asset);
        }
        self.texture_names = Default::default();
        self.textures = [None; MAX_HAIR_TEXTURES];
        self.textures_bound = false;
    }

    /// Releases every handle this entity holds.
    pub fn release_all<B: HairBackend + ?Sized>(&mut self, backend: &mut B) {
        self.release_asset(backend);
        if let Some(shader) = self.shader.take().get() {
            backend.shader_release(shader);
        }
    }

    // ---------- Textures ----------

    fn read_texture_names<B: HairBackend + ?Sized>(&mut self, backend: &B) {
        for slot in TextureType::ALL {
            self.texture_names[slot.index()] = backend
                .asset_texture_name(self.asset, slot)
                .filter(|name| !name.is_empty());
        }
    }

    fn locate_textures<T: TextureLocator + ?Sized>(&mut self, locator: &T) {
        for slot in TextureType::ALL {
            let Some(file) = self.texture_names[slot.index()].as_deref() else {
                continue;
            };
            let name = texture_resource_name(&self.texture_namespace, file);
            let found = locator.find_texture(&name);
            if found.is_none() {
                log::warn!("hair texture '{name}' ({slot:?}) not found");
            }
            self.textures[slot.index()] = found;
        }
    }

    /// File name the asset declares for `slot`.
    pub fn texture_name(&self, slot: TextureType) -> Option<&str> {
        self.texture_names[slot.index()].as_deref()
    }

    /// Texture located for `slot` (or explicitly assigned to it).
    pub fn texture(&self, slot: TextureType) -> Option<NativeTexture> {
        self.textures[slot.index()]
    }

    pub fn textures_bound(&self) -> bool {
        self.textures_bound
    }

    /// Binds `texture` to `slot` on the live instance.
    pub fn assign_texture<B: HairBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        slot: TextureType,
        texture: NativeTexture,
    ) -> bool {
        let Some(instance) = self.instance.get() else {
            return false;
        };
        backend.instance_set_texture(instance, slot, texture);
        self.textures[slot.index()] = Some(texture);
        true
    }

    /// Pushes the texture already set on `slot` to the device.
    pub fn assign_texture_to_device<B: HairBackend + ?Sized>(&mut self, backend: &mut B, slot: TextureType) -> bool {
        let Some(instance) = self.instance.get() else {
            return false;
        };
        backend.instance_set_texture_into_device(instance, slot);
        true
    }

    /// Binds the root colour, tip colour and density textures the first time
    /// it is called after an asset load. Other slots wait for
    /// [`HairResources::assign_texture`].
    pub fn bind_auto_textures<B: HairBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.textures_bound {
            return;
        }
        self.textures_bound = true;

        let Some(instance) = self.instance.get() else {
            return;
        };
        for slot in TextureType::AUTO_BOUND {
            if let Some(texture) = self.textures[slot.index()] {
                backend.instance_set_texture(instance, slot, texture);
            }
        }
    }
}

/// `"<namespace>/<file stem>"`, accepting either path separator in `file`.
pub fn texture_resource_name(namespace: &str, file: &str) -> String {
    let normalized = file.replace('\\', "/");
    let stem = Path::new(&normalized)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(normalized.as_str());
    format!("{namespace}/{stem}")
}
