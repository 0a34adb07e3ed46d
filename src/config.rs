// src/config.rs
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::Result;
use crate::lighting::MAX_LIGHTS;
use crate::pipeline::PipelineStage;

/// Process-wide settings of the hair system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HairConfig {
    /// Prefix joined to every shader and asset path handed to the backend.
    pub resource_root: String,
    /// Namespace texture resources are looked up under.
    pub texture_namespace: String,
    /// Pipeline stage the draw hook is attached to on game cameras.
    pub hook_stage: PipelineStage,
    /// Stage used by editor scene and preview cameras, which skip image effects.
    pub scene_view_hook_stage: PipelineStage,
    /// Gravity written into every descriptor before it is pushed.
    pub gravity: [f32; 3],
    /// Preview cameras rendering in stereo draw no hair.
    pub skip_stereo_preview: bool,
    pub max_lights: usize,
}

impl Default for HairConfig {
    fn default() -> Self {
        Self {
            resource_root: "StreamingAssets/".to_string(),
            texture_namespace: "HairWorks".to_string(),
            hook_stage: PipelineStage::BeforeImageEffects,
            scene_view_hook_stage: PipelineStage::AfterForwardOpaque,
            gravity: [0.0, -1.0, 0.0],
            skip_stereo_preview: true,
            max_lights: MAX_LIGHTS,
        }
    }
}

impl HairConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading hair config {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("parsing hair config {}", path.display()))
    }
}
