// src/scene.rs
//! Host-facing side of the bridge.
//!
//! The host engine owns the transform hierarchy, the cameras and the texture
//! resources. The bridge only reads them through the traits below; a host
//! implements all of them on one value and gets [`Host`] for free.
//!
//! [`TransformTree`] is a small in-memory hierarchy implementing
//! [`SceneGraph`] for hosts that keep their transforms elsewhere and for tests.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::backend::NativeTexture;
use crate::lighting::LightData;
use crate::pipeline::CameraPipeline;

/// Identity of a node in the host's transform hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Read access to the host's transform hierarchy.
pub trait SceneGraph {
    /// World matrix of `node`, `None` if the node no longer exists.
    fn local_to_world(&self, node: NodeId) -> Option<Mat4>;
    fn node_name(&self, node: NodeId) -> Option<&str>;
    /// `root` and every node below it, depth first, `root` first.
    fn descendants(&self, root: NodeId) -> Vec<NodeId>;
}

/// Resolves texture resources by their namespaced name (`"<namespace>/<stem>"`).
pub trait TextureLocator {
    fn find_texture(&self, resource_name: &str) -> Option<NativeTexture>;
}

/// Lights that should shade hair this pass.
pub trait LightSource {
    fn hair_lights(&self) -> Vec<LightData>;
}

/// Capabilities the host may offer in response to bridge events.
pub trait HostNotifier {
    /// A shader or asset was (re)loaded; hosts with an idle view may want to repaint.
    fn resource_changed(&mut self) {}

    /// The native library could not be loaded. Called once at startup.
    fn backend_unavailable(&mut self, _sdk_version: &str) {}
}

/// Everything the coordinator needs from the host during a frame.
pub trait Host: SceneGraph + CameraPipeline + TextureLocator + LightSource + HostNotifier {}

impl<T> Host for T where T: SceneGraph + CameraPipeline + TextureLocator + LightSource + HostNotifier {}

// ---------- TransformTree ----------

#[derive(Debug, Clone)]
struct TreeNode {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
    local: Mat4,
    world: Mat4,
    dirty: bool,
}

/// Flat-stored transform hierarchy with explicit world-matrix propagation.
#[derive(Debug, Clone, Default)]
pub struct TransformTree {
    nodes: Vec<TreeNode>,
}

impl TransformTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with identity local transform under `parent`.
    pub fn add_node(&mut self, name: impl Into<String>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(TreeNode {
            name: name.into(),
            parent,
            children: Vec::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            local: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
            dirty: true,
        });
        if let Some(p) = parent.and_then(|p| self.nodes.get_mut(p.0 as usize)) {
            p.children.push(id);
        }
        id
    }

    pub fn set_translation(&mut self, node: NodeId, translation: Vec3) {
        if let Some(n) = self.nodes.get_mut(node.0 as usize) {
            n.translation = translation;
            n.dirty = true;
        }
    }

    pub fn set_rotation(&mut self, node: NodeId, rotation: Quat) {
        if let Some(n) = self.nodes.get_mut(node.0 as usize) {
            n.rotation = rotation;
            n.dirty = true;
        }
    }

    pub fn set_scale(&mut self, node: NodeId, scale: Vec3) {
        if let Some(n) = self.nodes.get_mut(node.0 as usize) {
            n.scale = scale;
            n.dirty = true;
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0 as usize).and_then(|n| n.parent)
    }

    /// Recomputes dirty local matrices, then world matrices top-down.
    pub fn update_transforms(&mut self) {
        for n in self.nodes.iter_mut().filter(|n| n.dirty) {
            n.local = Mat4::from_scale_rotation_translation(n.scale, n.rotation, n.translation);
            n.dirty = false;
        }

        let mut stack: Vec<(NodeId, Mat4)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| (NodeId(i as u32), Mat4::IDENTITY))
            .collect();

        while let Some((id, parent_world)) = stack.pop() {
            let node = &mut self.nodes[id.0 as usize];
            node.world = parent_world * node.local;
            let world = node.world;
            stack.extend(node.children.iter().map(|&c| (c, world)));
        }
    }
}

impl SceneGraph for TransformTree {
    fn local_to_world(&self, node: NodeId) -> Option<Mat4> {
        self.nodes.get(node.0 as usize).map(|n| n.world)
    }

    fn node_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0 as usize).map(|n| n.name.as_str())
    }

    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.nodes.get(root.0 as usize).is_none() {
            return out;
        }
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            // reversed so children come out in insertion order
            stack.extend(self.nodes[id.0 as usize].children.iter().rev().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_matrices_compose_down_the_hierarchy() {
        let mut tree = TransformTree::new();
        let root = tree.add_node("root", None);
        let child = tree.add_node("child", Some(root));
        tree.set_translation(root, Vec3::new(1.0, 0.0, 0.0));
        tree.set_translation(child, Vec3::new(0.0, 2.0, 0.0));
        tree.update_transforms();

        let world = tree.local_to_world(child).unwrap();
        assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 0.0));
        assert_eq!(tree.parent(child), Some(root));
    }

    #[test]
    fn descendants_are_depth_first_from_root() {
        let mut tree = TransformTree::new();
        let root = tree.add_node("root", None);
        let a = tree.add_node("a", Some(root));
        let a1 = tree.add_node("a1", Some(a));
        let b = tree.add_node("b", Some(root));
        let _other = tree.add_node("other", None);

        assert_eq!(tree.descendants(root), vec![root, a, a1, b]);
        assert_eq!(tree.descendants(NodeId(99)), Vec::<NodeId>::new());
        assert_eq!(tree.node_name(a1), Some("a1"));
    }
}
