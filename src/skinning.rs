// src/skinning.rs
//! Bone sampling into the backend's skinning buffer.

use std::collections::HashMap;

use glam::{Mat4, Vec3};

use crate::backend::{HairBackend, SkinningMatrix};
use crate::handle::AssetHandle;
use crate::scene::{NodeId, SceneGraph};

/// Maps an asset's bones onto scene nodes and samples their world transforms
/// into a flat, address-stable matrix buffer.
///
/// The bone table is rebuilt whenever the asset's bone count changes. The
/// matrix buffer is reallocated only then, so the pointer handed to the
/// backend on the first upload stays valid across frames.
#[derive(Debug)]
pub struct SkinningBuffer {
    conversion: Mat4,
    bones: Vec<NodeId>,
    missing: Vec<String>,
    matrices: Vec<SkinningMatrix>,
    bind_poses: Vec<Mat4>,
    inv_bind_poses: Vec<Mat4>,
    built: bool,
}

impl SkinningBuffer {
    pub fn new(invert_bone_x: bool) -> Self {
        let conversion = if invert_bone_x {
            Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0))
        } else {
            Mat4::IDENTITY
        };
        Self {
            conversion,
            bones: Vec::new(),
            missing: Vec::new(),
            matrices: Vec::new(),
            bind_poses: Vec::new(),
            inv_bind_poses: Vec::new(),
            built: false,
        }
    }

    /// Drops the bone table and buffer; the next sync rebuilds both.
    pub fn reset(&mut self) {
        self.bones.clear();
        self.missing.clear();
        self.matrices = Vec::new();
        self.bind_poses.clear();
        self.inv_bind_poses.clear();
        self.built = false;
    }

    /// Samples every bone's world matrix into the buffer.
    ///
    /// Bones are matched by name against `root` and its descendants, the first
    /// node with a matching name winning. A bone with no match is bound to
    /// `root` and reported by [`SkinningBuffer::missing_bones`].
    pub fn sync<B, G>(&mut self, backend: &B, asset: AssetHandle, graph: &G, root: NodeId) -> &[SkinningMatrix]
    where
        B: HairBackend + ?Sized,
        G: SceneGraph + ?Sized,
    {
        let count = backend.asset_bone_count(asset);
        if !self.built || self.bones.len() != count {
            self.rebuild(backend, asset, graph, root, count);
        }

        for (slot, &node) in self.matrices.iter_mut().zip(&self.bones) {
            if let Some(world) = graph.local_to_world(node) {
                *slot = SkinningMatrix::from_mat4(world * self.conversion);
            }
        }
        &self.matrices
    }

    fn rebuild<B, G>(&mut self, backend: &B, asset: AssetHandle, graph: &G, root: NodeId, count: usize)
    where
        B: HairBackend + ?Sized,
        G: SceneGraph + ?Sized,
    {
        let candidates = graph.descendants(root);
        let mut by_name: HashMap<&str, NodeId> = HashMap::with_capacity(candidates.len());
        for &node in &candidates {
            if let Some(name) = graph.node_name(node) {
                by_name.entry(name).or_insert(node);
            }
        }

        self.bones.clear();
        self.missing.clear();
        for bone in 0..count {
            let name = backend.asset_bone_name(asset, bone).unwrap_or_default();
            match by_name.get(name.as_str()) {
                Some(&node) => self.bones.push(node),
                None => {
                    log::warn!("bone '{name}' not found under {root:?}, using the root transform");
                    self.bones.push(root);
                    self.missing.push(name);
                }
            }
        }

        if self.matrices.len() != count {
            self.matrices = vec![SkinningMatrix::IDENTITY; count];
        }
        self.bind_poses = (0..count).map(|b| backend.asset_bind_pose(asset, b)).collect();
        self.inv_bind_poses = self.bind_poses.iter().map(Mat4::inverse).collect();
        self.built = true;

        log::debug!("skinning buffer rebuilt: {count} bones, {} unmatched", self.missing.len());
    }

    #[inline]
    pub fn matrices(&self) -> &[SkinningMatrix] {
        &self.matrices
    }

    #[inline]
    pub fn as_ptr(&self) -> *const SkinningMatrix {
        self.matrices.as_ptr()
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// Scene node each bone slot reads from.
    pub fn bone_nodes(&self) -> &[NodeId] {
        &self.bones
    }

    /// Names of bones that fell back to the root in the last rebuild.
    pub fn missing_bones(&self) -> &[String] {
        &self.missing
    }

    pub fn bind_pose(&self, bone: usize) -> Option<Mat4> {
        self.bind_poses.get(bone).copied()
    }

    pub fn inverse_bind_pose(&self, bone: usize) -> Option<Mat4> {
        self.inv_bind_poses.get(bone).copied()
    }

    pub fn conversion(&self) -> Mat4 {
        self.conversion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{AssetSpec, RecordingBackend};
    use crate::scene::TransformTree;

    fn setup(bones: &[&str]) -> (RecordingBackend, AssetHandle) {
        let mut spec = AssetSpec::with_bones(bones.iter().copied());
        spec.bind_poses = vec![Mat4::from_translation(Vec3::Y); bones.len()];
        let mut backend = RecordingBackend::new().with_asset("rig.apx", spec);
        let asset = backend.asset_load("rig.apx");
        (backend, asset)
    }

    fn rig() -> (TransformTree, NodeId) {
        let mut tree = TransformTree::new();
        let root = tree.add_node("root", None);
        let a = tree.add_node("A", Some(root));
        let c = tree.add_node("C", Some(a));
        tree.set_translation(root, Vec3::new(0.0, 1.0, 0.0));
        tree.set_translation(a, Vec3::new(2.0, 0.0, 0.0));
        tree.set_translation(c, Vec3::new(0.0, 0.0, 3.0));
        tree.update_transforms();
        (tree, root)
    }

    #[test]
    fn missing_bone_falls_back_to_root() {
        let (backend, asset) = setup(&["A", "B", "C"]);
        let (tree, root) = rig();
        let mut buf = SkinningBuffer::new(true);

        let m = buf.sync(&backend, asset, &tree, root).to_vec();
        assert_eq!(m.len(), 3);
        let root_world = tree.local_to_world(root).unwrap();
        assert_eq!(m[1], SkinningMatrix::from_mat4(root_world * buf.conversion()));
        assert_eq!(buf.missing_bones(), ["B".to_string()]);
        assert_eq!(buf.bone_nodes()[1], root);
    }

    #[test]
    fn conversion_flips_x_when_enabled() {
        let (backend, asset) = setup(&["A"]);
        let (tree, root) = rig();

        let mut flipped = SkinningBuffer::new(true);
        let mut plain = SkinningBuffer::new(false);
        let f = flipped.sync(&backend, asset, &tree, root)[0].to_mat4();
        let p = plain.sync(&backend, asset, &tree, root)[0].to_mat4();

        assert_eq!(p.x_axis, -f.x_axis);
        assert_eq!(p.w_axis, f.w_axis);
    }

    #[test]
    fn resync_is_bit_identical_and_keeps_address() {
        let (backend, asset) = setup(&["A", "B", "C"]);
        let (tree, root) = rig();
        let mut buf = SkinningBuffer::new(true);

        let first = buf.sync(&backend, asset, &tree, root).to_vec();
        let ptr = buf.as_ptr();
        let second = buf.sync(&backend, asset, &tree, root).to_vec();

        assert_eq!(bytemuck::cast_slice::<_, u8>(&first), bytemuck::cast_slice::<_, u8>(&second));
        assert_eq!(ptr, buf.as_ptr());
    }

    #[test]
    fn bind_poses_captured_with_inverses() {
        let (backend, asset) = setup(&["A", "C"]);
        let (tree, root) = rig();
        let mut buf = SkinningBuffer::new(false);
        buf.sync(&backend, asset, &tree, root);

        let pose = buf.bind_pose(1).unwrap();
        let inv = buf.inverse_bind_pose(1).unwrap();
        assert!((pose * inv).abs_diff_eq(Mat4::IDENTITY, 1e-6));
        assert_eq!(buf.bind_pose(2), None);
    }

    #[test]
    fn reset_forces_rebuild() {
        let (backend, asset) = setup(&["A"]);
        let (tree, root) = rig();
        let mut buf = SkinningBuffer::new(false);
        buf.sync(&backend, asset, &tree, root);
        buf.reset();
        assert_eq!(buf.bone_count(), 0);
        assert!(buf.matrices().is_empty());
        buf.sync(&backend, asset, &tree, root);
        assert_eq!(buf.bone_count(), 1);
    }
}
