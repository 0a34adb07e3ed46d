// src/entity.rs
use serde::{Deserialize, Serialize};

use crate::backend::{Descriptor, HairBackend, NativeTexture, SkinningMatrix, TextureType};
use crate::config::HairConfig;
use crate::error::Result;
use crate::resources::HairResources;
use crate::scene::{NodeId, SceneGraph, TextureLocator};
use crate::skinning::SkinningBuffer;

/// Identity of a hair entity inside a [`crate::coordinator::HairSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Per-object settings, usually authored alongside the scene object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HairEntityConfig {
    /// Scene node the hair is attached to.
    pub node: NodeId,
    /// Where bone lookup starts. Defaults to `node`.
    pub root_bone: Option<NodeId>,
    pub asset_path: String,
    pub shader_path: String,
    /// Mirror bone matrices on X to match the backend's handedness.
    pub invert_bone_x: bool,
    /// Seed the descriptor from the asset's defaults on start.
    pub use_default_parameters: bool,
}

impl Default for HairEntityConfig {
    fn default() -> Self {
        Self {
            node: NodeId(0),
            root_bone: None,
            asset_path: String::new(),
            shader_path: "UTJ/HairWorksIntegration/DefaultHairShader.cso".to_string(),
            invert_bone_x: true,
            use_default_parameters: true,
        }
    }
}

impl HairEntityConfig {
    pub fn new(node: NodeId, asset_path: impl Into<String>) -> Self {
        Self {
            node,
            asset_path: asset_path.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root_bone.unwrap_or(self.node)
    }
}

/// One hair asset instance placed in the scene.
#[derive(Debug)]
pub struct HairEntity {
    id: EntityId,
    config: HairEntityConfig,
    resources: HairResources,
    skinning: SkinningBuffer,
    descriptor: Descriptor,
    baseline: Option<Descriptor>,
    enabled: bool,
    started: bool,
}

impl HairEntity {
    pub fn new(id: EntityId, config: HairEntityConfig, system: &HairConfig) -> Self {
        Self {
            id,
            skinning: SkinningBuffer::new(config.invert_bone_x),
            resources: HairResources::new(system.resource_root.clone(), system.texture_namespace.clone()),
            config,
            descriptor: Descriptor::default(),
            baseline: None,
            enabled: false,
            started: false,
        }
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn config(&self) -> &HairEntityConfig {
        &self.config
    }

    pub fn resources(&self) -> &HairResources {
        &self.resources
    }

    pub fn skinning(&self) -> &SkinningBuffer {
        &self.skinning
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Parameters pushed to the backend on every render pass.
    pub fn descriptor_mut(&mut self) -> &mut Descriptor {
        &mut self.descriptor
    }

    /// Descriptor read back from the instance on its first render.
    pub fn baseline(&self) -> Option<&Descriptor> {
        self.baseline.as_ref()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Started and holding a shader and an asset: eligible for skinning and render.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.started && self.resources.shader().is_valid() && self.resources.asset().is_valid()
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.descriptor.enable = enabled;
        if enabled {
            self.started = false;
        }
    }

    // ---------- Resources ----------

    /// A failed load leaves the entity un-started until a later load succeeds.
    pub fn load_shader<B: HairBackend + ?Sized>(&mut self, backend: &mut B, path: &str) -> Result<()> {
        if let Err(err) = self.resources.load_shader(backend, path) {
            self.started = false;
            return Err(err);
        }
        self.settle_after_load();
        Ok(())
    }

    pub fn reload_shader<B: HairBackend + ?Sized>(&mut self, backend: &mut B) -> bool {
        self.resources.reload_shader(backend)
    }

    /// Loads `path` as this entity's asset. With `reset_params` the descriptor
    /// is replaced by the asset's defaults and the bone table is rebuilt.
    pub fn load_asset<B, H>(&mut self, backend: &mut B, host: &H, path: &str, reset_params: bool) -> Result<()>
    where
        B: HairBackend + ?Sized,
        H: SceneGraph + TextureLocator + ?Sized,
    {
        if let Err(err) = self.resources.load_asset(backend, host, path) {
            self.started = false;
            return Err(err);
        }
        if reset_params {
            self.descriptor = backend.asset_default_descriptor(self.resources.asset());
            self.skinning.reset();
        }
        self.sync_bones(backend, host);
        self.settle_after_load();
        Ok(())
    }

    // Whole again once both the shader and an instance exist.
    fn settle_after_load(&mut self) {
        self.started = self.resources.shader().is_valid() && self.resources.instance().is_valid();
    }

    /// Reloads the asset in place and pushes its default descriptor.
    pub fn reload_asset<B: HairBackend + ?Sized>(&mut self, backend: &mut B) -> bool {
        if !self.resources.reload_asset(backend) {
            return false;
        }
        self.descriptor = backend.asset_default_descriptor(self.resources.asset());
        if let Some(instance) = self.resources.instance().get() {
            backend.instance_set_descriptor(instance, &self.descriptor);
        }
        true
    }

    /// Loads the configured shader and asset. The entity only counts as
    /// started when both succeed.
    pub fn start<B, H>(&mut self, backend: &mut B, host: &H) -> Result<()>
    where
        B: HairBackend + ?Sized,
        H: SceneGraph + TextureLocator + ?Sized,
    {
        self.started = false;
        let shader_path = self.config.shader_path.clone();
        let asset_path = self.config.asset_path.clone();

        self.load_shader(backend, &shader_path)?;
        self.load_asset(backend, host, &asset_path, false)?;
        if self.config.use_default_parameters {
            let enable = self.descriptor.enable;
            self.descriptor = backend.asset_default_descriptor(self.resources.asset());
            self.descriptor.enable = enable;
        }
        self.started = true;
        Ok(())
    }

    pub fn assign_texture<B: HairBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        slot: TextureType,
        texture: NativeTexture,
    ) -> bool {
        self.resources.assign_texture(backend, slot, texture)
    }

    pub fn assign_texture_to_device<B: HairBackend + ?Sized>(&mut self, backend: &mut B, slot: TextureType) -> bool {
        self.resources.assign_texture_to_device(backend, slot)
    }

    pub fn release<B: HairBackend + ?Sized>(&mut self, backend: &mut B) {
        self.resources.release_all(backend);
        self.skinning.reset();
        self.started = false;
    }

    // ---------- Per frame ----------

    /// Samples bone transforms into the skinning buffer.
    pub fn sync_bones<B, G>(&mut self, backend: &B, graph: &G) -> &[SkinningMatrix]
    where
        B: HairBackend + ?Sized,
        G: SceneGraph + ?Sized,
    {
        let root = self.config.root();
        self.skinning.sync(backend, self.resources.asset(), graph, root)
    }

    /// Reads the baseline descriptor once, forces gravity and pushes the
    /// descriptor to the instance.
    pub(crate) fn push_descriptor<B: HairBackend + ?Sized>(&mut self, backend: &mut B, gravity: [f32; 3]) {
        let Some(instance) = self.resources.instance().get() else {
            return;
        };
        if self.baseline.is_none() {
            self.baseline = Some(backend.instance_descriptor(instance));
        }
        self.descriptor.gravity_dir = gravity;
        backend.instance_set_descriptor(instance, &self.descriptor);
    }

    /// Queues this entity's skinning matrices.
    pub(crate) fn submit_skinning<B, G>(&mut self, backend: &mut B, graph: &G, stereo: bool)
    where
        B: HairBackend + ?Sized,
        G: SceneGraph + ?Sized,
    {
        let Some(instance) = self.resources.instance().get() else {
            return;
        };
        let root = self.config.root();
        let matrices = self.skinning.sync(&*backend, self.resources.asset(), graph, root);
        backend.update_skinning_matrices_async(instance, matrices, stereo);
    }

    /// Binds the shader, lazily binds distinguished textures and draws.
    pub(crate) fn render<B: HairBackend + ?Sized>(&mut self, backend: &mut B, stereo: bool) {
        let Some(instance) = self.resources.instance().get() else {
            return;
        };
        backend.set_shader(self.resources.shader(), stereo);
        self.resources.bind_auto_textures(backend);
        backend.render(instance, stereo);
    }
}
