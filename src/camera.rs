// src/camera.rs
use glam::{Mat4, Vec4};

use crate::backend::HairBackend;

/// Identity of a host camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub u64);

/// What the camera is used for. Editor cameras skip some post-processing stages
/// and get their hair hook at a different pipeline point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraKind {
    #[default]
    Game,
    /// Editor scene view.
    SceneView,
    /// Inspector / asset preview.
    Preview,
}

/// How a stereo camera renders its two eyes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StereoMode {
    /// One pass per eye.
    MultiPass,
    /// Both eyes in one pass.
    SinglePass,
}

/// View and (host convention) projection of one eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeMatrices {
    pub view: Mat4,
    pub projection: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoEyes {
    pub left: EyeMatrices,
    pub right: EyeMatrices,
}

/// Snapshot of the camera currently rendering, as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    pub id: CameraId,
    pub kind: CameraKind,
    pub stereo: Option<StereoMode>,
    pub world_to_camera: Mat4,
    /// OpenGL-style projection (clip z in [-w, w]).
    pub projection: Mat4,
    pub fov_y_degrees: f32,
    pub eyes: Option<StereoEyes>,
    /// Rendering into an offscreen target flips Y on D3D-style devices.
    pub renders_to_texture: bool,
    pub reversed_z: bool,
}

impl CameraState {
    /// A mono game camera.
    pub fn mono(id: CameraId, world_to_camera: Mat4, projection: Mat4, fov_y_degrees: f32) -> Self {
        Self {
            id,
            kind: CameraKind::Game,
            stereo: None,
            world_to_camera,
            projection,
            fov_y_degrees,
            eyes: None,
            renders_to_texture: false,
            reversed_z: false,
        }
    }

    pub fn with_kind(mut self, kind: CameraKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_stereo(mut self, mode: StereoMode, eyes: StereoEyes) -> Self {
        self.stereo = Some(mode);
        self.eyes = Some(eyes);
        self
    }

    #[inline]
    pub fn is_stereo(&self) -> bool {
        self.stereo.is_some()
    }

    #[inline]
    pub fn is_single_pass(&self) -> bool {
        self.stereo == Some(StereoMode::SinglePass)
    }

    /// Per-eye matrices; a stereo camera without eye data uses the mono pair for both.
    fn eye_pair(&self) -> StereoEyes {
        self.eyes.unwrap_or({
            let eye = EyeMatrices {
                view: self.world_to_camera,
                projection: self.projection,
            };
            StereoEyes { left: eye, right: eye }
        })
    }
}

/// Converts an OpenGL-style projection into the device convention the backend
/// draws with: depth mapped to [0, 1] (or [1, 0] when reversed) and Y flipped
/// when rendering into a texture.
pub fn gpu_projection(projection: Mat4, renders_to_texture: bool, reversed_z: bool) -> Mat4 {
    let r0 = projection.row(0);
    let mut r1 = projection.row(1);
    let w = projection.row(3);
    let mut z: Vec4 = projection.row(2) * 0.5 + w * 0.5;

    if reversed_z {
        z = w - z;
    }
    if renders_to_texture {
        r1 = -r1;
    }

    Mat4::from_cols(r0, r1, z, w).transpose()
}

/// Pushes the camera's view/projection state into the backend for the coming pass.
pub fn push_view_projection<B: HairBackend + ?Sized>(backend: &mut B, camera: &CameraState) {
    let adjust = |p: Mat4| gpu_projection(p, camera.renders_to_texture, camera.reversed_z);

    if camera.is_stereo() {
        let eyes = camera.eye_pair();
        let left_proj = adjust(eyes.left.projection);
        let right_proj = adjust(eyes.right.projection);
        backend.set_view_projection_stereo(
            (&eyes.left.view, &left_proj),
            (&eyes.right.view, &right_proj),
            camera.fov_y_degrees,
            camera.is_single_pass(),
        );
    } else {
        let proj = adjust(camera.projection);
        backend.set_view_projection(&camera.world_to_camera, &proj, camera.fov_y_degrees);
    }
}
