// src/pipeline.rs
//! Camera Pipeline Binder.
//!
//! The backend draws hair from inside the host's camera pipeline: a hook
//! command injected at some stage calls the backend's native draw entry point
//! with a [`RenderEvent`] id. Three hooks are built once (mono, stereo
//! multi-pass, stereo single-pass) and each camera carries at most one of them.
//! When a camera switches stereo mode between frames its hook is swapped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::backend::{DrawHookEntry, RenderEvent};
use crate::camera::{CameraId, CameraKind, CameraState};
use crate::error::{Error, Result};

/// Insertion points in a camera's render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    BeforeForwardOpaque,
    AfterForwardOpaque,
    BeforeImageEffects,
    AfterImageEffects,
    AfterEverything,
}

/// Host-side command lists attached to cameras.
pub trait CameraPipeline {
    fn add_hook(&mut self, camera: CameraId, stage: PipelineStage, hook: &HookCommand);
    /// Names of the commands currently attached to `camera` at `stage`.
    fn hook_names(&self, camera: CameraId, stage: PipelineStage) -> Vec<String>;
    fn remove_hook(&mut self, camera: CameraId, stage: PipelineStage, name: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookVariant {
    Mono,
    StereoMultiPass,
    StereoSinglePass,
}

impl HookVariant {
    pub const ALL: [HookVariant; 3] = [
        HookVariant::Mono,
        HookVariant::StereoMultiPass,
        HookVariant::StereoSinglePass,
    ];

    /// Variant a camera needs in its current mode.
    pub fn for_camera(camera: &CameraState) -> Self {
        match (camera.is_stereo(), camera.is_single_pass()) {
            (true, true) => HookVariant::StereoSinglePass,
            (true, false) => HookVariant::StereoMultiPass,
            (false, _) => HookVariant::Mono,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HookVariant::Mono => "Hair",
            HookVariant::StereoMultiPass => "HairVR",
            HookVariant::StereoSinglePass => "HairVRSinglePass",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }

    pub fn event(self) -> RenderEvent {
        match self {
            HookVariant::Mono => RenderEvent::Mono,
            HookVariant::StereoMultiPass => RenderEvent::StereoMultiPass,
            HookVariant::StereoSinglePass => RenderEvent::StereoSinglePass,
        }
    }
}

/// A reusable command that invokes the backend's draw entry with one event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCommand {
    pub name: &'static str,
    pub variant: HookVariant,
    pub entry: DrawHookEntry,
    pub event_id: i32,
}

impl HookCommand {
    fn new(variant: HookVariant, entry: DrawHookEntry) -> Self {
        Self {
            name: variant.name(),
            variant,
            entry,
            event_id: variant.event().id(),
        }
    }
}

/// The three hook commands, built once per backend.
#[derive(Debug, Clone)]
pub struct HookSet {
    commands: [HookCommand; 3],
}

impl HookSet {
    pub fn new(entry: DrawHookEntry) -> Self {
        Self {
            commands: HookVariant::ALL.map(|v| HookCommand::new(v, entry)),
        }
    }

    pub fn get(&self, variant: HookVariant) -> &HookCommand {
        &self.commands[variant as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CameraBinding {
    variant: HookVariant,
    stage: PipelineStage,
}

/// Tracks which hook each camera carries and keeps it in sync with the camera mode.
#[derive(Debug)]
pub struct PipelineBinder {
    hooks: HookSet,
    hook_stage: PipelineStage,
    scene_view_stage: PipelineStage,
    bindings: BTreeMap<CameraId, CameraBinding>,
}

impl PipelineBinder {
    pub fn new(entry: DrawHookEntry, hook_stage: PipelineStage, scene_view_stage: PipelineStage) -> Self {
        Self {
            hooks: HookSet::new(entry),
            hook_stage,
            scene_view_stage,
            bindings: BTreeMap::new(),
        }
    }

    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    /// Variant currently attached to `camera`, if any.
    pub fn binding(&self, camera: CameraId) -> Option<HookVariant> {
        self.bindings.get(&camera).map(|b| b.variant)
    }

    pub fn bound_cameras(&self) -> usize {
        self.bindings.len()
    }

    fn stage_for(&self, camera: &CameraState) -> PipelineStage {
        match camera.kind {
            CameraKind::SceneView | CameraKind::Preview => self.scene_view_stage,
            CameraKind::Game => self.hook_stage,
        }
    }

    /// Makes sure `camera` carries exactly the hook its current mode needs.
    ///
    /// Fails with [`Error::InvariantViolation`] when the camera carries more
    /// than one command at the hair stage; the camera is left untouched.
    pub fn bind<P: CameraPipeline + ?Sized>(
        &mut self,
        pipeline: &mut P,
        camera: &CameraState,
    ) -> Result<HookVariant> {
        let required = HookVariant::for_camera(camera);
        let stage = self.stage_for(camera);

        let Some(current) = self.bindings.get(&camera.id).copied() else {
            self.attach(pipeline, camera.id, required, stage);
            log::info!("camera {:?}: attached '{}' hook at {:?}", camera.id, required.name(), stage);
            return Ok(required);
        };

        let attached = pipeline.hook_names(camera.id, current.stage);
        match attached.as_slice() {
            [] => {
                // host dropped the command list (camera rebuilt); attach again
                log::debug!("camera {:?}: hair hook missing, re-attaching", camera.id);
                self.attach(pipeline, camera.id, required, stage);
            }
            [name] if HookVariant::from_name(name) == Some(required) && current.stage == stage => {}
            [name] => {
                pipeline.remove_hook(camera.id, current.stage, name);
                self.attach(pipeline, camera.id, required, stage);
                log::info!(
                    "camera {:?}: swapped '{}' hook for '{}'",
                    camera.id,
                    name,
                    required.name()
                );
            }
            many => {
                let msg = format!(
                    "camera {:?} carries {} commands at {:?}: {:?}",
                    camera.id,
                    many.len(),
                    current.stage,
                    many
                );
                log::error!("{msg}");
                return Err(Error::InvariantViolation(msg));
            }
        }
        Ok(required)
    }

    fn attach<P: CameraPipeline + ?Sized>(
        &mut self,
        pipeline: &mut P,
        camera: CameraId,
        variant: HookVariant,
        stage: PipelineStage,
    ) {
        pipeline.add_hook(camera, stage, self.hooks.get(variant));
        self.bindings.insert(camera, CameraBinding { variant, stage });
    }

    /// Drops `camera`'s binding and detaches its hook. Returns `false` if the
    /// camera was never bound.
    pub fn forget<P: CameraPipeline + ?Sized>(&mut self, pipeline: &mut P, camera: CameraId) -> bool {
        match self.bindings.remove(&camera) {
            Some(binding) => {
                pipeline.remove_hook(camera, binding.stage, binding.variant.name());
                true
            }
            None => false,
        }
    }

    /// Detaches every hook this binder attached. Returns how many were removed.
    pub fn clear<P: CameraPipeline + ?Sized>(&mut self, pipeline: &mut P) -> usize {
        let bindings = std::mem::take(&mut self.bindings);
        for (camera, binding) in &bindings {
            pipeline.remove_hook(*camera, binding.stage, binding.variant.name());
        }
        bindings.len()
    }
}
