// src/lib.rs
//! Bridge between a host scene graph and a native hair simulation/rendering
//! backend.
//!
//! The host owns the scene, cameras and textures and drives everything through
//! [`HairSystem`]: entities are spawned and started, bones are sampled in
//! `late_update`, and every "about to render" callback goes through the frame
//! gate so the backend steps and draws once per camera pass.

pub mod backend;
pub mod camera;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod diagnostics;
pub mod entity;
pub mod error;
#[cfg(feature = "native")]
pub mod ffi;
pub mod handle;
pub mod lighting;
pub mod native_descriptor;
pub mod pipeline;
pub mod recording;
pub mod resources;
pub mod scene;
pub mod skinning;

pub use backend::{Descriptor, HairBackend, NativeTexture, SkinningMatrix, TextureType};
pub use camera::{CameraId, CameraKind, CameraState, EyeMatrices, StereoEyes, StereoMode};
pub use config::HairConfig;
pub use coordinator::{FrameGate, HairSystem};
pub use entity::{EntityId, HairEntity, HairEntityConfig};
pub use error::{Error, ResourceKind, Result};
#[cfg(feature = "native")]
pub use ffi::NativeBackend;
pub use handle::{AssetHandle, InstanceHandle, ShaderHandle};
pub use lighting::LightData;
pub use native_descriptor::{DescriptorField, DescriptorLayout, FieldOffset, NativeDescriptor};
pub use pipeline::{CameraPipeline, HookVariant, PipelineStage};
pub use recording::RecordingBackend;
pub use scene::{Host, HostNotifier, LightSource, NodeId, SceneGraph, TextureLocator};
