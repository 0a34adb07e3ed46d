// src/coordinator.rs
//! Frame Coordinator.
//!
//! The host notifies "about to render" once per visible hair object per
//! camera. The backend must see exactly one scene setup, one simulation step
//! and one render per live entity per camera pass, so the first notification
//! of a pass runs the whole sequence for every live entity and later ones only
//! bump the gate:
//!
//! ```text
//! view/projection -> lights -> hook bind -> begin_scene
//!   -> skinning (every live entity) -> step_simulation
//!   -> render (every live entity) -> end_scene
//! ```
//!
//! The pass closes when the camera's draw hook reports back through
//! [`HairSystem::on_finished_rendering`].

use std::collections::HashMap;

use crate::backend::{HairBackend, NativeTexture, TextureType};
use crate::bail;
use crate::camera::{push_view_projection, CameraId, CameraKind, CameraState};
use crate::config::HairConfig;
use crate::entity::{EntityId, HairEntity, HairEntityConfig};
use crate::error::{Error, Result};
use crate::lighting::push_scene_lights;
use crate::pipeline::{CameraPipeline, PipelineBinder};
use crate::scene::{Host, HostNotifier, SceneGraph, TextureLocator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GatePass {
    frame: u64,
    count: u32,
}

/// Per-camera notification counters.
///
/// A pass opens on the first notification for a camera and stays closed to
/// later ones until [`FrameGate::finish`] or until a notification arrives
/// with a different frame number.
#[derive(Debug, Default)]
pub struct FrameGate {
    passes: HashMap<CameraId, GatePass>,
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one notification. Returns `true` when it is the first of its pass.
    pub fn notify(&mut self, camera: CameraId, frame: u64) -> bool {
        let pass = self.passes.entry(camera).or_insert(GatePass { frame, count: 0 });
        if pass.frame != frame {
            if pass.count > 0 {
                log::debug!("camera {camera:?}: frame {frame} reopened an unfinished pass");
            }
            *pass = GatePass { frame, count: 0 };
        }
        let first = pass.count == 0;
        pass.count = pass.count.saturating_add(1);
        first
    }

    pub fn finish(&mut self, camera: CameraId) {
        if let Some(pass) = self.passes.get_mut(&camera) {
            pass.count = 0;
        }
    }

    /// Notifications counted for `camera` since its pass opened.
    pub fn count(&self, camera: CameraId) -> u32 {
        self.passes.get(&camera).map_or(0, |p| p.count)
    }

    #[inline]
    pub fn is_open(&self, camera: CameraId) -> bool {
        self.count(camera) > 0
    }

    /// Drops `camera`'s counter.
    pub fn forget(&mut self, camera: CameraId) -> bool {
        self.passes.remove(&camera).is_some()
    }

    pub fn tracked_cameras(&self) -> usize {
        self.passes.len()
    }

    pub fn clear(&mut self) {
        self.passes.clear();
    }
}

/// Owns the backend, every hair entity and the per-camera state.
///
/// Entities live in a registry keyed by [`EntityId`]; the live set holds the
/// ids of enabled entities in enable order.
pub struct HairSystem<B: HairBackend> {
    backend: B,
    config: HairConfig,
    startup_error: Option<Error>,
    binder: PipelineBinder,
    gate: FrameGate,
    entities: HashMap<EntityId, HairEntity>,
    live: Vec<EntityId>,
    next_id: u32,
    shut_down: bool,
}

impl<B: HairBackend> HairSystem<B> {
    /// Loads the backend. A backend that fails to load leaves the system
    /// inert: it is reported once through `notifier` and kept in
    /// [`HairSystem::startup_error`].
    pub fn init<N: HostNotifier + ?Sized>(mut backend: B, config: HairConfig, notifier: &mut N) -> Self {
        let startup_error = if backend.load() {
            backend.install_log_sink();
            log::info!("hair backend {} loaded", backend.sdk_version());
            None
        } else {
            let sdk_version = backend.sdk_version();
            log::error!("hair backend {sdk_version} failed to load, hair will not render");
            notifier.backend_unavailable(&sdk_version);
            Some(Error::BackendUnavailable { sdk_version })
        };

        let binder = PipelineBinder::new(
            backend.draw_hook_entry(),
            config.hook_stage,
            config.scene_view_hook_stage,
        );

        Self {
            backend,
            config,
            startup_error,
            binder,
            gate: FrameGate::new(),
            entities: HashMap::new(),
            live: Vec::new(),
            next_id: 0,
            shut_down: false,
        }
    }

    pub fn startup_error(&self) -> Option<&Error> {
        self.startup_error.as_ref()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.startup_error.is_none() && !self.shut_down
    }

    fn ensure_active(&self) -> Result<()> {
        if self.startup_error.is_some() {
            return Err(Error::BackendUnavailable {
                sdk_version: self.backend.sdk_version(),
            });
        }
        if self.shut_down {
            bail!("hair system is shut down");
        }
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &HairConfig {
        &self.config
    }

    pub fn gate(&self) -> &FrameGate {
        &self.gate
    }

    pub fn binder(&self) -> &PipelineBinder {
        &self.binder
    }

    /// Ids of enabled entities, in the order they were enabled.
    pub fn live_entities(&self) -> &[EntityId] {
        &self.live
    }

    pub fn entity(&self, id: EntityId) -> Option<&HairEntity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Result<&mut HairEntity> {
        self.entities.get_mut(&id).ok_or(Error::UnknownEntity(id))
    }

    // ---------- Entity lifecycle ----------

    /// Creates an entity and enables it. Nothing is loaded until [`HairSystem::start`].
    pub fn spawn(&mut self, config: HairEntityConfig) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(id, HairEntity::new(id, config, &self.config));
        self.live.push(id);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.set_enabled(true);
        }
        log::debug!("hair entity {id:?} spawned");
        id
    }

    /// Puts the entity back into the live set. It has to be started again.
    pub fn enable(&mut self, id: EntityId) -> Result<()> {
        let entity = self.entities.get_mut(&id).ok_or(Error::UnknownEntity(id))?;
        entity.set_enabled(true);
        if !self.live.contains(&id) {
            self.live.push(id);
        }
        Ok(())
    }

    pub fn disable(&mut self, id: EntityId) -> Result<()> {
        let entity = self.entities.get_mut(&id).ok_or(Error::UnknownEntity(id))?;
        entity.set_enabled(false);
        self.live.retain(|e| *e != id);
        Ok(())
    }

    /// Loads the entity's configured shader and asset.
    pub fn start<H>(&mut self, id: EntityId, host: &mut H) -> Result<()>
    where
        H: SceneGraph + TextureLocator + HostNotifier + ?Sized,
    {
        self.ensure_active()?;
        let entity = self.entities.get_mut(&id).ok_or(Error::UnknownEntity(id))?;
        let result = entity.start(&mut self.backend, &*host);
        host.resource_changed();
        result
    }

    /// Samples bones of every live entity that holds an asset.
    pub fn late_update<G: SceneGraph + ?Sized>(&mut self, graph: &G) {
        if !self.is_active() {
            return;
        }
        for id in &self.live {
            if let Some(entity) = self.entities.get_mut(id) {
                if entity.resources().asset().is_valid() {
                    entity.sync_bones(&self.backend, graph);
                }
            }
        }
    }

    /// Removes the entity and releases its backend handles.
    pub fn destroy(&mut self, id: EntityId) -> Result<()> {
        let mut entity = self.entities.remove(&id).ok_or(Error::UnknownEntity(id))?;
        self.live.retain(|e| *e != id);
        entity.release(&mut self.backend);
        log::debug!("hair entity {id:?} destroyed");
        Ok(())
    }

    // ---------- Resources ----------

    pub fn load_shader<N>(&mut self, id: EntityId, path: &str, notifier: &mut N) -> Result<()>
    where
        N: HostNotifier + ?Sized,
    {
        self.ensure_active()?;
        let entity = self.entities.get_mut(&id).ok_or(Error::UnknownEntity(id))?;
        entity.load_shader(&mut self.backend, path)?;
        notifier.resource_changed();
        Ok(())
    }

    pub fn reload_shader<N>(&mut self, id: EntityId, notifier: &mut N) -> Result<()>
    where
        N: HostNotifier + ?Sized,
    {
        self.ensure_active()?;
        let entity = self.entities.get_mut(&id).ok_or(Error::UnknownEntity(id))?;
        if entity.reload_shader(&mut self.backend) {
            notifier.resource_changed();
        }
        Ok(())
    }

    pub fn load_asset<H>(&mut self, id: EntityId, path: &str, reset_params: bool, host: &mut H) -> Result<()>
    where
        H: SceneGraph + TextureLocator + HostNotifier + ?Sized,
    {
        self.ensure_active()?;
        let entity = self.entities.get_mut(&id).ok_or(Error::UnknownEntity(id))?;
        let result = entity.load_asset(&mut self.backend, &*host, path, reset_params);
        host.resource_changed();
        result
    }

    pub fn reload_asset<N>(&mut self, id: EntityId, notifier: &mut N) -> Result<()>
    where
        N: HostNotifier + ?Sized,
    {
        self.ensure_active()?;
        let entity = self.entities.get_mut(&id).ok_or(Error::UnknownEntity(id))?;
        if entity.reload_asset(&mut self.backend) {
            notifier.resource_changed();
        }
        Ok(())
    }

    pub fn assign_texture(&mut self, id: EntityId, slot: TextureType, texture: NativeTexture) -> Result<bool> {
        self.ensure_active()?;
        let entity = self.entities.get_mut(&id).ok_or(Error::UnknownEntity(id))?;
        Ok(entity.assign_texture(&mut self.backend, slot, texture))
    }

    pub fn assign_texture_to_device(&mut self, id: EntityId, slot: TextureType) -> Result<bool> {
        self.ensure_active()?;
        let entity = self.entities.get_mut(&id).ok_or(Error::UnknownEntity(id))?;
        Ok(entity.assign_texture_to_device(&mut self.backend, slot))
    }

    // ---------- Frame ----------

    /// "About to render" for entity `id` as seen by `camera`.
    ///
    /// Returns `true` when this notification ran the camera's pass. Entities
    /// that are not started, or lost their asset, are skipped without
    /// touching the gate.
    pub fn on_will_render_object<H>(
        &mut self,
        id: EntityId,
        host: &mut H,
        camera: &CameraState,
        frame: u64,
        dt: f32,
    ) -> Result<bool>
    where
        H: Host + ?Sized,
    {
        if !self.is_active() {
            return Ok(false);
        }
        let gravity = self.config.gravity;
        let entity = self.entities.get_mut(&id).ok_or(Error::UnknownEntity(id))?;
        if !entity.is_enabled() || !entity.is_ready() {
            log::debug!("hair entity {id:?} not ready, skipped");
            return Ok(false);
        }
        entity.push_descriptor(&mut self.backend, gravity);

        if camera.kind == CameraKind::Preview && camera.is_stereo() && self.config.skip_stereo_preview {
            return Ok(false);
        }
        if !self.gate.notify(camera.id, frame) {
            return Ok(false);
        }

        self.run_pass(host, camera, dt);
        Ok(true)
    }

    fn run_pass<H: Host + ?Sized>(&mut self, host: &mut H, camera: &CameraState, dt: f32) {
        let stereo = camera.is_stereo();
        let single_pass = camera.is_single_pass();
        log::trace!("camera {:?}: hair pass (stereo {stereo}, single pass {single_pass})", camera.id);

        push_view_projection(&mut self.backend, camera);
        push_scene_lights(&*host, &mut self.backend, self.config.max_lights, stereo);
        if let Err(err) = self.binder.bind(&mut *host, camera) {
            log::warn!("camera {:?}: hook binding aborted: {err}", camera.id);
        }

        self.backend.begin_scene(stereo);

        for id in &self.live {
            match self.entities.get_mut(id) {
                Some(entity) if entity.is_ready() => {
                    entity.submit_skinning(&mut self.backend, &*host, stereo);
                }
                _ => {}
            }
        }

        self.backend.step_simulation(dt, stereo, single_pass);

        for id in &self.live {
            match self.entities.get_mut(id) {
                Some(entity) if entity.is_ready() => entity.render(&mut self.backend, stereo),
                _ => log::debug!("hair entity {id:?} not ready, skipped"),
            }
        }

        self.backend.end_scene(stereo);
    }

    /// The camera's draw hook finished; its next notification opens a new pass.
    pub fn on_finished_rendering(&mut self, camera: CameraId) {
        self.gate.finish(camera);
    }

    /// Drops every trace of a camera the host has destroyed: its gate counter
    /// and its hook binding. The hook is detached from `pipeline` too.
    pub fn forget_camera<P: CameraPipeline + ?Sized>(&mut self, camera: CameraId, pipeline: &mut P) {
        let counted = self.gate.forget(camera);
        let bound = self.binder.forget(pipeline, camera);
        if counted || bound {
            log::debug!("camera {camera:?} forgotten");
        }
    }

    /// Stops the backend from drawing and detaches every hook. Entities keep
    /// their handles until destroyed.
    pub fn shutdown<P: CameraPipeline + ?Sized>(&mut self, pipeline: &mut P) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if self.startup_error.is_some() {
            return;
        }
        self.backend.set_shutting_down();
        let removed = self.binder.clear(pipeline);
        self.gate.clear();
        log::info!("hair system shut down, {removed} camera hooks removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::StereoMode;
    use crate::lighting::LightData;
    use crate::pipeline::tests::{stereo, FakePipeline};
    use crate::pipeline::{HookCommand, HookVariant, PipelineStage};
    use crate::recording::{AssetSpec, Call, CallLog, RecordingBackend};
    use crate::scene::{NodeId, TransformTree};
    use glam::{Mat4, Vec3, Vec4};

    struct TestHost {
        tree: TransformTree,
        pipe: FakePipeline,
        log: CallLog,
        /// Hook edits with the number of backend calls made before each.
        hook_marks: Vec<(String, usize)>,
        lights: usize,
        changed: usize,
        unavailable: Vec<String>,
    }

    impl SceneGraph for TestHost {
        fn local_to_world(&self, node: NodeId) -> Option<Mat4> {
            self.tree.local_to_world(node)
        }
        fn node_name(&self, node: NodeId) -> Option<&str> {
            self.tree.node_name(node)
        }
        fn descendants(&self, root: NodeId) -> Vec<NodeId> {
            self.tree.descendants(root)
        }
    }

    impl CameraPipeline for TestHost {
        fn add_hook(&mut self, camera: CameraId, stage: PipelineStage, hook: &HookCommand) {
            self.hook_marks.push((format!("+{}", hook.name), self.log.calls().len()));
            self.pipe.add_hook(camera, stage, hook);
        }
        fn hook_names(&self, camera: CameraId, stage: PipelineStage) -> Vec<String> {
            self.pipe.hook_names(camera, stage)
        }
        fn remove_hook(&mut self, camera: CameraId, stage: PipelineStage, name: &str) {
            self.hook_marks.push((format!("-{name}"), self.log.calls().len()));
            self.pipe.remove_hook(camera, stage, name);
        }
    }

    impl TextureLocator for TestHost {
        fn find_texture(&self, _name: &str) -> Option<NativeTexture> {
            None
        }
    }

    impl crate::scene::LightSource for TestHost {
        fn hair_lights(&self) -> Vec<LightData> {
            (0..self.lights)
                .map(|i| LightData::point(Vec3::splat(i as f32), 3.0, Vec4::ONE))
                .collect()
        }
    }

    impl HostNotifier for TestHost {
        fn resource_changed(&mut self) {
            self.changed += 1;
        }
        fn backend_unavailable(&mut self, sdk_version: &str) {
            self.unavailable.push(sdk_version.to_string());
        }
    }

    fn test_backend() -> RecordingBackend {
        RecordingBackend::new()
            .with_asset("a.apx", AssetSpec::with_bones(["spine", "head"]))
            .with_asset("b.apx", AssetSpec::with_bones(["spine"]))
    }

    fn setup_with(backend: RecordingBackend) -> (HairSystem<RecordingBackend>, CallLog, TestHost) {
        let log = backend.log();
        let mut tree = TransformTree::new();
        let root = tree.add_node("root", None);
        let spine = tree.add_node("spine", Some(root));
        tree.add_node("head", Some(spine));
        tree.set_translation(spine, Vec3::new(0.0, 1.0, 0.0));
        tree.update_transforms();

        let mut host = TestHost {
            tree,
            pipe: FakePipeline::default(),
            log: log.clone(),
            hook_marks: Vec::new(),
            lights: 2,
            changed: 0,
            unavailable: Vec::new(),
        };
        let config = HairConfig {
            resource_root: String::new(),
            ..HairConfig::default()
        };
        let system = HairSystem::init(backend, config, &mut host);
        (system, log, host)
    }

    fn setup() -> (HairSystem<RecordingBackend>, CallLog, TestHost) {
        setup_with(test_backend())
    }

    fn started(sys: &mut HairSystem<RecordingBackend>, host: &mut TestHost, path: &str) -> EntityId {
        let id = sys.spawn(HairEntityConfig::new(NodeId(0), path));
        sys.start(id, host).unwrap();
        id
    }

    fn cam(id: u64) -> CameraState {
        CameraState::mono(CameraId(id), Mat4::IDENTITY, Mat4::IDENTITY, 60.0)
    }

    fn count(log: &CallLog, pred: impl Fn(&Call) -> bool) -> usize {
        log.count(pred)
    }

    fn is_step(c: &Call) -> bool {
        matches!(c, Call::StepSimulation { .. })
    }

    fn is_begin(c: &Call) -> bool {
        matches!(c, Call::BeginScene { .. })
    }

    fn is_end(c: &Call) -> bool {
        matches!(c, Call::EndScene { .. })
    }

    fn is_render(c: &Call) -> bool {
        matches!(c, Call::Render { .. })
    }

    fn is_skinning(c: &Call) -> bool {
        matches!(c, Call::UpdateSkinning { .. })
    }

    // ---------- FrameGate ----------

    #[test]
    fn gate_opens_once_per_pass() {
        let mut gate = FrameGate::new();
        let c = CameraId(1);
        assert!(gate.notify(c, 1));
        assert!(!gate.notify(c, 1));
        assert_eq!(gate.count(c), 2);
        gate.finish(c);
        assert_eq!(gate.count(c), 0);
        assert!(gate.notify(c, 1));
    }

    #[test]
    fn gate_is_per_camera_and_reopens_on_new_frame() {
        let mut gate = FrameGate::new();
        assert!(gate.notify(CameraId(1), 7));
        assert!(gate.notify(CameraId(2), 7));
        assert!(!gate.notify(CameraId(1), 7));
        assert!(gate.notify(CameraId(1), 8));
        assert!(gate.is_open(CameraId(1)));
    }

    // ---------- Frame coordination ----------

    #[test]
    fn one_step_per_pass_for_any_entity_count() {
        for n in 0..5usize {
            let (mut sys, log, mut host) = setup();
            let ids: Vec<_> = (0..n).map(|_| started(&mut sys, &mut host, "a.apx")).collect();
            log.clear();

            // reverse notification order must not matter
            let mut ran = 0;
            for id in ids.iter().rev() {
                if sys.on_will_render_object(*id, &mut host, &cam(1), 1, 0.016).unwrap() {
                    ran += 1;
                }
            }

            let expected = usize::from(n > 0);
            assert_eq!(ran, expected);
            assert_eq!(count(&log, is_step), expected);
            assert_eq!(count(&log, is_begin), expected);
            assert_eq!(count(&log, is_end), expected);
            assert_eq!(count(&log, is_render), n);
            assert_eq!(count(&log, is_skinning), n);
            assert_eq!(sys.gate().count(CameraId(1)), n as u32);
        }
    }

    #[test]
    fn pass_sequence_is_strictly_ordered() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        let _b = started(&mut sys, &mut host, "b.apx");
        log.clear();

        sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.02).unwrap();
        let calls: Vec<Call> = log
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::GetDescriptor(_) | Call::SetDescriptor(_) | Call::SetShader { .. } | Call::SetTexture { .. }))
            .collect();

        assert_eq!(calls[0], Call::SetViewProjection { fov: 60.0 });
        assert_eq!(calls[1], Call::SetLights { count: 2, stereo: false });
        assert_eq!(calls[2], Call::BeginScene { stereo: false });
        assert!(is_skinning(&calls[3]) && is_skinning(&calls[4]));
        assert_eq!(
            calls[5],
            Call::StepSimulation { dt: 0.02, stereo: false, single_pass: false }
        );
        assert!(is_render(&calls[6]) && is_render(&calls[7]));
        assert_eq!(calls[8], Call::EndScene { stereo: false });
        assert_eq!(calls.len(), 9);
    }

    #[test]
    fn finished_rendering_starts_a_new_pass() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        let b = started(&mut sys, &mut host, "b.apx");
        log.clear();

        assert!(sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.016).unwrap());
        assert!(!sys.on_will_render_object(b, &mut host, &cam(1), 1, 0.016).unwrap());
        sys.on_finished_rendering(CameraId(1));
        assert_eq!(sys.gate().count(CameraId(1)), 0);

        assert!(sys.on_will_render_object(b, &mut host, &cam(1), 1, 0.016).unwrap());
        assert_eq!(count(&log, is_step), 2);
    }

    #[test]
    fn each_camera_gets_its_own_pass() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        log.clear();

        assert!(sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.016).unwrap());
        assert!(sys.on_will_render_object(a, &mut host, &cam(2), 1, 0.016).unwrap());
        assert_eq!(count(&log, is_step), 2);
        assert_eq!(sys.binder().bound_cameras(), 2);
    }

    #[test]
    fn new_frame_reopens_without_finish() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        log.clear();

        sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.016).unwrap();
        assert!(sys.on_will_render_object(a, &mut host, &cam(1), 2, 0.016).unwrap());
        assert_eq!(count(&log, is_step), 2);
    }

    #[test]
    fn stereo_toggle_swaps_hook_before_begin_scene() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");

        sys.on_will_render_object(a, &mut host, &cam(5), 10, 0.016).unwrap();
        sys.on_finished_rendering(CameraId(5));
        log.clear();
        host.hook_marks.clear();

        let vr = stereo(cam(5), StereoMode::SinglePass);
        assert!(sys.on_will_render_object(a, &mut host, &vr, 11, 0.016).unwrap());

        let calls = log.calls();
        let begin = calls.iter().position(is_begin).unwrap();
        let marks: Vec<_> = host.hook_marks.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(marks, vec!["-Hair", "+HairVRSinglePass"]);
        assert!(host.hook_marks.iter().all(|(_, at)| *at <= begin));
        assert_eq!(host.pipe.total_hooks(CameraId(5)), 1);
        assert_eq!(sys.binder().binding(CameraId(5)), Some(HookVariant::StereoSinglePass));
        assert!(calls.contains(&Call::StepSimulation { dt: 0.016, stereo: true, single_pass: true }));
        assert!(calls.contains(&Call::SetViewProjectionStereo { fov: 60.0, single_pass: true }));
    }

    #[test]
    fn hook_conflict_does_not_abort_the_pass() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.016).unwrap();
        sys.on_finished_rendering(CameraId(1));

        let extra = sys.binder().hooks().get(HookVariant::StereoMultiPass).clone();
        host.pipe.add_hook(CameraId(1), PipelineStage::BeforeImageEffects, &extra);
        log.clear();

        assert!(sys.on_will_render_object(a, &mut host, &cam(1), 2, 0.016).unwrap());
        assert_eq!(count(&log, is_render), 1);
        assert_eq!(host.pipe.total_hooks(CameraId(1)), 2);
    }

    #[test]
    fn failed_asset_reload_makes_entity_inert() {
        let (mut sys, log, mut host) = setup();
        let good = started(&mut sys, &mut host, "a.apx");
        let bad = started(&mut sys, &mut host, "b.apx");

        let err = sys.load_asset(bad, "missing.apx", true, &mut host).unwrap_err();
        assert!(err.is_resource_failure());
        let entity = sys.entity(bad).unwrap();
        assert!(!entity.is_started());
        assert!(!entity.resources().asset().is_valid());
        assert!(!entity.resources().instance().is_valid());
        assert_eq!(sys.backend().live_asset_count(), 1);
        assert_eq!(sys.backend().live_instance_count(), 1);
        log.clear();

        assert!(!sys.on_will_render_object(bad, &mut host, &cam(1), 1, 0.016).unwrap());
        assert_eq!(sys.gate().count(CameraId(1)), 0);
        assert!(log.calls().is_empty());

        assert!(sys.on_will_render_object(good, &mut host, &cam(1), 1, 0.016).unwrap());
        let good_instance = sys.entity(good).unwrap().resources().instance().raw();
        let rendered: Vec<_> = log
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Render { instance, .. } => Some(instance),
                _ => None,
            })
            .collect();
        assert_eq!(rendered, vec![good_instance]);
        assert_eq!(count(&log, is_skinning), 1);
    }

    #[test]
    fn failed_shader_load_makes_entity_inert() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        sys.backend_mut().fail_path("broken.cso");

        let err = sys.load_shader(a, "broken.cso", &mut host).unwrap_err();
        assert!(err.is_resource_failure());
        let entity = sys.entity(a).unwrap();
        assert!(!entity.is_started());
        assert!(!entity.is_ready());
        log.clear();

        assert!(!sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.016).unwrap());
        assert_eq!(sys.gate().count(CameraId(1)), 0);
        assert_eq!(count(&log, |c| matches!(c, Call::SetShader { .. })), 0);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn shader_load_after_failure_resumes_rendering() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        sys.backend_mut().fail_path("broken.cso");
        assert!(sys.load_shader(a, "broken.cso", &mut host).is_err());

        sys.load_shader(a, "fixed.cso", &mut host).unwrap();
        let shader = sys.entity(a).unwrap().resources().shader();
        assert!(sys.entity(a).unwrap().is_ready());
        log.clear();

        assert!(sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.016).unwrap());
        let shaders: Vec<_> = log
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetShader { shader, .. } => Some(shader),
                _ => None,
            })
            .collect();
        assert_eq!(shaders, vec![shader.raw()]);
        assert_eq!(count(&log, is_render), 1);
    }

    #[test]
    fn asset_load_after_failure_resumes_rendering() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        assert!(sys.load_asset(a, "missing.apx", false, &mut host).is_err());
        assert!(!sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.016).unwrap());

        sys.load_asset(a, "b.apx", false, &mut host).unwrap();
        let entity = sys.entity(a).unwrap();
        assert!(entity.is_started());
        assert_eq!(entity.skinning().bone_count(), 1);
        log.clear();

        assert!(sys.on_will_render_object(a, &mut host, &cam(1), 2, 0.016).unwrap());
        assert_eq!(count(&log, is_render), 1);
        assert_eq!(count(&log, is_skinning), 1);
    }

    #[test]
    fn loading_without_a_shader_stays_inert() {
        let (mut sys, log, mut host) = setup();
        let id = sys.spawn(HairEntityConfig::new(NodeId(0), "a.apx"));
        sys.load_asset(id, "a.apx", true, &mut host).unwrap();
        assert!(!sys.entity(id).unwrap().is_started());
        log.clear();

        assert!(!sys.on_will_render_object(id, &mut host, &cam(1), 1, 0.016).unwrap());
        assert!(log.calls().is_empty());
    }

    #[test]
    fn unstarted_entities_are_skipped_in_the_loops() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        let _idle = sys.spawn(HairEntityConfig::new(NodeId(0), "b.apx"));
        log.clear();

        sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.016).unwrap();
        assert_eq!(count(&log, is_render), 1);
        assert_eq!(sys.live_entities().len(), 2);
    }

    #[test]
    fn skinning_buffer_address_is_stable_across_passes() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        log.clear();

        for frame in 1..4 {
            sys.on_will_render_object(a, &mut host, &cam(1), frame, 0.016).unwrap();
            sys.on_finished_rendering(CameraId(1));
        }
        let ptrs: Vec<_> = log
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateSkinning { ptr, count, .. } => Some((ptr, count)),
                _ => None,
            })
            .collect();
        assert_eq!(ptrs.len(), 3);
        assert!(ptrs.iter().all(|p| *p == ptrs[0]));
        assert_eq!(ptrs[0].1, 2);
    }

    #[test]
    fn stereo_preview_cameras_draw_nothing() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        log.clear();

        let preview = stereo(cam(3).with_kind(CameraKind::Preview), StereoMode::MultiPass);
        assert!(!sys.on_will_render_object(a, &mut host, &preview, 1, 0.016).unwrap());
        assert_eq!(count(&log, is_begin), 0);
        assert_eq!(sys.gate().count(CameraId(3)), 0);
    }

    #[test]
    fn lights_are_capped_by_config() {
        let (mut sys, log, mut host) = setup();
        sys.config.max_lights = 1;
        host.lights = 5;
        let a = started(&mut sys, &mut host, "a.apx");
        log.clear();

        sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.016).unwrap();
        assert!(log.calls().contains(&Call::SetLights { count: 1, stereo: false }));
    }

    #[test]
    fn gravity_is_forced_on_every_notification() {
        let (mut sys, _log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        sys.entity_mut(a).unwrap().descriptor_mut().gravity_dir = [0.0, 0.0, 1.0];

        sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.016).unwrap();
        let instance = sys.entity(a).unwrap().resources().instance();
        assert_eq!(sys.backend().descriptor_of(instance).unwrap().gravity_dir, [0.0, -1.0, 0.0]);
    }

    // ---------- Lifecycle ----------

    #[test]
    fn disable_and_destroy_update_live_set() {
        let (mut sys, _log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        let b = started(&mut sys, &mut host, "b.apx");

        sys.disable(a).unwrap();
        assert_eq!(sys.live_entities(), [b]);
        assert!(!sys.entity(a).unwrap().descriptor().enable);
        sys.enable(a).unwrap();
        assert_eq!(sys.live_entities(), [b, a]);
        assert!(!sys.entity(a).unwrap().is_started());

        sys.destroy(b).unwrap();
        assert_eq!(sys.live_entities(), [a]);
        assert_eq!(sys.backend().live_instance_count(), 1);
        assert!(matches!(sys.destroy(b), Err(Error::UnknownEntity(_))));
    }

    #[test]
    fn loads_notify_the_host() {
        let (mut sys, _log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        assert_eq!(host.changed, 1);
        sys.reload_shader(a, &mut host).unwrap();
        sys.reload_asset(a, &mut host).unwrap();
        sys.load_shader(a, "other.cso", &mut host).unwrap();
        assert_eq!(host.changed, 4);
    }

    #[test]
    fn texture_assignment_goes_through_the_system() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        log.clear();
        assert!(sys.assign_texture(a, TextureType::Specular, NativeTexture(7)).unwrap());
        assert!(sys.assign_texture_to_device(a, TextureType::Specular).unwrap());
        assert_eq!(log.calls().len(), 2);
    }

    #[test]
    fn unavailable_backend_is_reported_once_and_inert() {
        let (mut sys, log, mut host) = setup_with(RecordingBackend::unavailable());
        assert!(sys.startup_error().unwrap().is_backend_unavailable());
        assert_eq!(host.unavailable, vec!["recording-1.0".to_string()]);
        assert_eq!(log.calls(), vec![Call::Load]);

        let id = sys.spawn(HairEntityConfig::new(NodeId(0), "a.apx"));
        assert!(sys.start(id, &mut host).unwrap_err().is_backend_unavailable());
        assert!(!sys.on_will_render_object(id, &mut host, &cam(1), 1, 0.016).unwrap());
        assert_eq!(log.calls(), vec![Call::Load]);
    }

    #[test]
    fn shutdown_detaches_hooks_and_goes_inert() {
        let (mut sys, log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        sys.on_will_render_object(a, &mut host, &cam(1), 1, 0.016).unwrap();
        sys.on_will_render_object(a, &mut host, &cam(2).with_kind(CameraKind::SceneView), 1, 0.016)
            .unwrap();

        sys.shutdown(&mut host.pipe);
        assert!(log.calls().contains(&Call::SetShuttingDown));
        assert_eq!(host.pipe.total_hooks(CameraId(1)) + host.pipe.total_hooks(CameraId(2)), 0);
        assert!(!sys.is_active());

        log.clear();
        assert!(!sys.on_will_render_object(a, &mut host, &cam(1), 2, 0.016).unwrap());
        assert!(sys.start(a, &mut host).is_err());
        assert!(log.calls().is_empty());

        sys.destroy(a).unwrap();
        assert_eq!(sys.backend().live_asset_count(), 0);
    }

    #[test]
    fn forgotten_camera_leaves_no_state_behind() {
        let (mut sys, _log, mut host) = setup();
        let a = started(&mut sys, &mut host, "a.apx");
        for id in 1..4 {
            sys.on_will_render_object(a, &mut host, &cam(id), 1, 0.016).unwrap();
        }
        assert_eq!(sys.gate().tracked_cameras(), 3);
        assert_eq!(sys.binder().bound_cameras(), 3);

        sys.forget_camera(CameraId(2), &mut host.pipe);
        assert_eq!(sys.gate().tracked_cameras(), 2);
        assert_eq!(sys.binder().bound_cameras(), 2);
        assert_eq!(sys.binder().binding(CameraId(2)), None);
        assert_eq!(host.pipe.total_hooks(CameraId(2)), 0);

        // a camera id reused later starts from scratch
        assert!(sys.on_will_render_object(a, &mut host, &cam(2), 1, 0.016).unwrap());
        assert_eq!(host.pipe.total_hooks(CameraId(2)), 1);
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let (mut sys, _log, mut host) = setup();
        let err = sys
            .on_will_render_object(EntityId(42), &mut host, &cam(1), 1, 0.016)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(EntityId(42))));
    }
}
