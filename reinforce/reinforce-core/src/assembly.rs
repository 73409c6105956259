//! The assembly arena: bodies, joints and trees indexed by stable IDs.
//!
//! [`Assembly`] mirrors what the host engine knows about its assemblies.
//! Bodies link to their parent and children by [`BodyId`]; no body owns
//! another. The host creates and destroys bodies and primary joints through
//! the topology operations here, the reinforcement engine only tunes joints
//! and creates or destroys synthesized ones.

use hashbrown::HashMap;
use nalgebra::Vector3;
use reinforce_types::{Body, BodyId, Joint, JointId, ReinforceError, TreeId};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One assembly tree (e.g. a vessel).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tree {
    /// Tree identifier.
    pub id: TreeId,
    /// Root body.
    pub root: BodyId,
    /// Display name, taken from the root body.
    pub name: String,
}

/// Arena of bodies, joints and trees.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Assembly {
    /// All bodies, indexed by ID.
    bodies: HashMap<BodyId, Body>,
    /// All joints, indexed by ID.
    joints: HashMap<JointId, Joint>,
    /// All trees, indexed by ID.
    trees: HashMap<TreeId, Tree>,
    /// Next available body ID.
    next_body_id: u64,
    /// Next available joint ID.
    next_joint_id: u64,
    /// Next available tree ID.
    next_tree_id: u64,
}

impl Default for Assembly {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembly {
    /// Create an empty assembly.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bodies: HashMap::new(),
            joints: HashMap::new(),
            trees: HashMap::new(),
            next_body_id: 1,
            next_joint_id: 1,
            next_tree_id: 1,
        }
    }

    /// Number of bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of joints, primary and synthesized.
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // =========================================================================
    // Topology
    // =========================================================================

    /// Add `body` as the root of a new tree.
    pub fn add_root(&mut self, mut body: Body) -> BodyId {
        let id = self.allocate_body_id();
        let tree = self.allocate_tree_id();
        body.id = id;
        body.tree = tree;
        body.parent = None;
        body.children.clear();
        body.attach_joints.clear();

        self.trees.insert(
            tree,
            Tree {
                id: tree,
                root: id,
                name: body.name.clone(),
            },
        );
        self.bodies.insert(id, body);
        id
    }

    /// Attach `body` as the last child of `parent`.
    ///
    /// Creates the host's primary joint when `body` is physical and there
    /// is a physical body at or above `parent` to connect to.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` does not exist.
    pub fn attach(&mut self, parent: BodyId, mut body: Body) -> reinforce_types::Result<BodyId> {
        let tree = self
            .bodies
            .get(&parent)
            .map(|p| p.tree)
            .ok_or(ReinforceError::UnknownBody(parent))?;

        let id = self.allocate_body_id();
        body.id = id;
        body.tree = tree;
        body.parent = None;
        body.children.clear();
        body.attach_joints.clear();
        self.bodies.insert(id, body);

        self.link(parent, id)?;
        Ok(id)
    }

    /// Attach `body` to `parent` through named attach nodes on both sides.
    ///
    /// `body_node` may name the body's surface attach node.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` does not exist or either node is missing.
    pub fn attach_at(
        &mut self,
        parent: BodyId,
        parent_node: &str,
        mut body: Body,
        body_node: &str,
    ) -> reinforce_types::Result<BodyId> {
        let missing = |id| ReinforceError::MissingAttachNode {
            body: id,
            connected: parent,
        };

        let next = BodyId::new(self.next_body_id);
        let node = body
            .attach_nodes
            .iter_mut()
            .chain(body.surface_node.iter_mut())
            .find(|n| n.id == body_node)
            .ok_or_else(|| missing(next))?;
        node.attached = Some(parent);

        let parent_body = self
            .bodies
            .get_mut(&parent)
            .ok_or(ReinforceError::UnknownBody(parent))?;
        let node = parent_body
            .attach_nodes
            .iter_mut()
            .find(|n| n.id == parent_node)
            .ok_or_else(|| missing(next))?;
        node.attached = Some(next);

        self.attach(parent, body)
    }

    /// Merge the tree rooted at `body` under `under` (docking, coupling).
    ///
    /// # Errors
    ///
    /// Returns an error if either body does not exist, or if `body` is not
    /// the root of a tree other than `under`'s.
    pub fn couple(&mut self, body: BodyId, under: BodyId) -> reinforce_types::Result<()> {
        let (old_tree, parent) = self
            .bodies
            .get(&body)
            .map(|b| (b.tree, b.parent))
            .ok_or(ReinforceError::UnknownBody(body))?;
        let new_tree = self
            .bodies
            .get(&under)
            .map(|b| b.tree)
            .ok_or(ReinforceError::UnknownBody(under))?;

        if parent.is_some() || old_tree == new_tree {
            return Err(ReinforceError::invalid_config(format!(
                "{body} is not the root of a separate tree"
            )));
        }

        self.trees.remove(&old_tree);
        self.set_subtree_tree(body, new_tree);
        self.link(under, body)
    }

    /// Split the subtree rooted at `body` off into a new tree.
    ///
    /// Every joint crossing the cut is destroyed.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` does not exist or is a root.
    pub fn decouple(&mut self, body: BodyId) -> reinforce_types::Result<TreeId> {
        let parent = self
            .bodies
            .get(&body)
            .ok_or(ReinforceError::UnknownBody(body))?
            .parent
            .ok_or_else(|| ReinforceError::invalid_config(format!("{body} is a root")))?;

        if let Some(p) = self.bodies.get_mut(&parent) {
            p.children.retain(|c| *c != body);
        }

        self.detach_nodes(body, parent);
        let tree = self.make_root(body);
        Ok(tree)
    }

    /// Remove a body, destroying every joint it owns or is targeted by.
    ///
    /// Its children become roots of new trees.
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not exist.
    pub fn destroy_body(&mut self, id: BodyId) -> reinforce_types::Result<Body> {
        let body = self
            .bodies
            .get(&id)
            .ok_or(ReinforceError::UnknownBody(id))?;
        let parent = body.parent;
        let tree = body.tree;
        let children = body.children.clone();

        if let Some(parent) = parent {
            if let Some(p) = self.bodies.get_mut(&parent) {
                p.children.retain(|c| *c != id);
            }
            self.detach_nodes(id, parent);
        } else {
            self.trees.remove(&tree);
        }

        for child in children {
            if let Some(c) = self.bodies.get_mut(&child) {
                c.parent = None;
            }
            self.make_root(child);
        }

        let touching: Vec<JointId> = self
            .joints
            .iter()
            .filter(|(_, j)| j.connects(id))
            .map(|(jid, _)| *jid)
            .collect();
        for joint in touching {
            self.remove_joint(joint);
        }

        let body = self
            .bodies
            .remove(&id)
            .ok_or(ReinforceError::UnknownBody(id))?;
        debug!(body = %id, name = %body.name, "body destroyed");
        Ok(body)
    }

    // =========================================================================
    // Body Management
    // =========================================================================

    /// Get a body by ID.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    /// Get a mutable reference to a body by ID.
    #[must_use]
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(&id)
    }

    /// Iterate over all bodies.
    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    /// Tree a body belongs to.
    #[must_use]
    pub fn tree_of(&self, body: BodyId) -> Option<TreeId> {
        self.bodies.get(&body).map(|b| b.tree)
    }

    /// Parent of a body.
    #[must_use]
    pub fn parent_of(&self, body: BodyId) -> Option<BodyId> {
        self.bodies.get(&body).and_then(|b| b.parent)
    }

    /// Whether the body exists and has a rigid body of its own.
    #[must_use]
    pub fn is_physical(&self, body: BodyId) -> bool {
        self.bodies.get(&body).is_some_and(|b| b.physical)
    }

    /// Whether the reinforcement engine may adjust this body's joints.
    ///
    /// False when a capability locks adjustment or the parent is robotic.
    #[must_use]
    pub fn is_adjustment_allowed(&self, body: BodyId) -> bool {
        let Some(b) = self.bodies.get(&body) else {
            return false;
        };
        if b.has_adjustment_lock() {
            return false;
        }
        !b.parent
            .and_then(|p| self.bodies.get(&p))
            .is_some_and(Body::is_robotic)
    }

    /// Nearest physical body at or above `body`.
    #[must_use]
    pub fn rigid_body_of(&self, body: BodyId) -> Option<BodyId> {
        let mut current = self.bodies.get(&body);
        while let Some(b) = current {
            if b.physical {
                return Some(b.id);
            }
            current = b.parent.and_then(|p| self.bodies.get(&p));
        }
        None
    }

    /// Dry mass plus current resources, `0` for unknown bodies.
    #[must_use]
    pub fn total_mass(&self, body: BodyId) -> f64 {
        self.bodies.get(&body).map_or(0.0, Body::total_mass)
    }

    /// Dry mass plus resources when full, `0` for unknown bodies.
    #[must_use]
    pub fn maximum_possible_mass(&self, body: BodyId) -> f64 {
        self.bodies.get(&body).map_or(0.0, Body::maximum_possible_mass)
    }

    // =========================================================================
    // Tree Management
    // =========================================================================

    /// Get a tree by ID.
    #[must_use]
    pub fn tree(&self, id: TreeId) -> Option<&Tree> {
        self.trees.get(&id)
    }

    /// Iterate over all trees.
    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.trees.values()
    }

    /// Bodies of a tree in depth-first order from the root.
    #[must_use]
    pub fn tree_bodies(&self, id: TreeId) -> Vec<BodyId> {
        self.trees
            .get(&id)
            .map(|t| self.subtree(t.root))
            .unwrap_or_default()
    }

    /// `root` and all its descendants in depth-first order.
    #[must_use]
    pub fn subtree(&self, root: BodyId) -> Vec<BodyId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(body) = self.bodies.get(&id) else {
                continue;
            };
            order.push(id);
            stack.extend(body.children.iter().rev().copied());
        }
        order
    }

    /// Whether the tree is a crew member on EVA.
    #[must_use]
    pub fn is_eva_tree(&self, id: TreeId) -> bool {
        self.trees
            .get(&id)
            .and_then(|t| self.bodies.get(&t.root))
            .is_some_and(Body::is_eva)
    }

    // =========================================================================
    // Joint Management
    // =========================================================================

    /// Add a joint.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner or target does not exist.
    pub fn create_joint(&mut self, joint: Joint) -> reinforce_types::Result<JointId> {
        if !self.bodies.contains_key(&joint.owner) {
            return Err(ReinforceError::UnknownBody(joint.owner));
        }
        if let Some(target) = joint.target {
            if !self.bodies.contains_key(&target) {
                return Err(ReinforceError::UnknownBody(target));
            }
        }

        let id = JointId::new(self.next_joint_id);
        self.next_joint_id += 1;
        self.joints.insert(id, joint);
        Ok(id)
    }

    /// Remove a joint, returning it.
    ///
    /// # Errors
    ///
    /// Returns an error if the joint does not exist.
    pub fn destroy_joint(&mut self, id: JointId) -> reinforce_types::Result<Joint> {
        self.remove_joint(id).ok_or(ReinforceError::UnknownJoint(id))
    }

    /// Get a joint by ID.
    #[must_use]
    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(&id)
    }

    /// Get a mutable reference to a joint by ID.
    #[must_use]
    pub fn joint_mut(&mut self, id: JointId) -> Option<&mut Joint> {
        self.joints.get_mut(&id)
    }

    /// Check whether a joint exists.
    #[must_use]
    pub fn contains_joint(&self, id: JointId) -> bool {
        self.joints.contains_key(&id)
    }

    /// Iterate over all joints.
    pub fn joints(&self) -> impl Iterator<Item = (JointId, &Joint)> {
        self.joints.iter().map(|(id, j)| (*id, j))
    }

    /// Joints owned by or targeting `body`.
    pub fn joints_of(&self, body: BodyId) -> impl Iterator<Item = (JointId, &Joint)> {
        self.joints().filter(move |(_, j)| j.connects(body))
    }

    /// Whether a host joint links `a` and `b` directly, in either direction.
    #[must_use]
    pub fn has_primary_joint_between(&self, a: BodyId, b: BodyId) -> bool {
        self.joints.values().any(|j| {
            j.is_primary()
                && ((j.owner == a && j.target == Some(b)) || (j.owner == b && j.target == Some(a)))
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn allocate_body_id(&mut self) -> BodyId {
        let id = BodyId::new(self.next_body_id);
        self.next_body_id += 1;
        id
    }

    fn allocate_tree_id(&mut self) -> TreeId {
        let id = TreeId::new(self.next_tree_id);
        self.next_tree_id += 1;
        id
    }

    /// Make `child` the last child of `parent` and create its primary joint.
    fn link(&mut self, parent: BodyId, child: BodyId) -> reinforce_types::Result<()> {
        let parent_body = self
            .bodies
            .get_mut(&parent)
            .ok_or(ReinforceError::UnknownBody(parent))?;
        parent_body.children.push(child);
        let tree = parent_body.tree;

        let child_body = self
            .bodies
            .get_mut(&child)
            .ok_or(ReinforceError::UnknownBody(child))?;
        child_body.parent = Some(parent);
        child_body.tree = tree;
        let physical = child_body.physical;

        if physical {
            if let Some(target) = self.rigid_body_of(parent) {
                let joint = self.primary_joint(child, target)?;
                let id = self.create_joint(joint)?;
                if let Some(b) = self.bodies.get_mut(&child) {
                    b.attach_joints.push(id);
                }
            }
        }
        Ok(())
    }

    fn primary_joint(&self, owner: BodyId, target: BodyId) -> reinforce_types::Result<Joint> {
        let o = self
            .bodies
            .get(&owner)
            .ok_or(ReinforceError::UnknownBody(owner))?;
        let t = self
            .bodies
            .get(&target)
            .ok_or(ReinforceError::UnknownBody(target))?;

        let mut joint = Joint::primary(owner, target, o.breaking_force, o.breaking_torque);
        let offset: Vector3<f64> =
            o.original_pose.translation.vector - t.original_pose.translation.vector;
        joint.connected_anchor = t.original_pose.rotation.inverse() * offset;
        Ok(joint)
    }

    /// Turn a detached body into the root of a fresh tree.
    ///
    /// Destroys joints linking the subtree to bodies outside of it.
    fn make_root(&mut self, body: BodyId) -> TreeId {
        let tree = self.allocate_tree_id();
        let name = self.bodies.get_mut(&body).map_or_else(String::new, |b| {
            b.parent = None;
            b.name.clone()
        });
        self.trees.insert(
            tree,
            Tree {
                id: tree,
                root: body,
                name,
            },
        );
        self.set_subtree_tree(body, tree);

        let members = self.subtree(body);
        let crossing: Vec<JointId> = self
            .joints
            .iter()
            .filter(|(_, j)| {
                let owner_inside = members.contains(&j.owner);
                let target_inside = j.target.is_none_or(|t| members.contains(&t));
                owner_inside != target_inside
            })
            .map(|(id, _)| *id)
            .collect();
        for id in crossing {
            self.remove_joint(id);
        }

        debug!(body = %body, tree = %tree, "new tree split off");
        tree
    }

    fn remove_joint(&mut self, id: JointId) -> Option<Joint> {
        let joint = self.joints.remove(&id)?;
        if let Some(owner) = self.bodies.get_mut(&joint.owner) {
            owner.attach_joints.retain(|j| *j != id);
        }
        Some(joint)
    }

    fn set_subtree_tree(&mut self, root: BodyId, tree: TreeId) {
        for id in self.subtree(root) {
            if let Some(b) = self.bodies.get_mut(&id) {
                b.tree = tree;
            }
        }
    }

    fn detach_nodes(&mut self, a: BodyId, b: BodyId) {
        for (owner, other) in [(a, b), (b, a)] {
            if let Some(body) = self.bodies.get_mut(&owner) {
                for node in body
                    .attach_nodes
                    .iter_mut()
                    .chain(body.surface_node.iter_mut())
                    .filter(|n| n.attached == Some(other))
                {
                    node.attached = None;
                }
            }
        }
    }
}
