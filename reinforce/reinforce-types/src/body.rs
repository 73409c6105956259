//! Body types for tree-structured assemblies.
//!
//! A [`Body`] is one part of an assembly: a node in a rooted tree with mass,
//! breaking thresholds, attach nodes describing how it connects to its
//! neighbours, and mesh geometry used to estimate joint footprints.
//!
//! Tree links (`tree`, `parent`, `children`, `attach_joints`) are index
//! references maintained by the arena that owns the bodies; a freshly built
//! body has none of them set.

use std::sync::Arc;

use nalgebra::{Isometry3, Point3, Vector3};

use crate::{Capability, JointId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

impl BodyId {
    /// Create a new body ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for BodyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// Unique identifier for a tree (one assembly, e.g. a vessel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TreeId(pub u64);

impl TreeId {
    /// Create a new tree ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for TreeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TreeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tree({})", self.0)
    }
}

/// Handle of the rigid body the host simulates for a physical body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidHandle(pub u64);

/// How a body is attached to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttachMode {
    /// Node to node along a stack axis.
    #[default]
    Stack,
    /// Radially onto the parent's surface.
    Surface,
}

/// State of the body's attachment to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttachMethod {
    /// Host default joint.
    #[default]
    FixedJoint,
    /// Joint already tuned by the reinforcement engine.
    LockedJoint,
}

/// Kind of attach node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodeKind {
    /// Stack node.
    #[default]
    Stack,
    /// Surface attach node.
    Surface,
    /// Docking node.
    Dock,
}

/// A point where another body can attach.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttachNode {
    /// Node name.
    pub id: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Size category (0 = tiny, 1 = small, 2 = large, ...).
    pub size: u32,
    /// Contact area reported for this node (square meters), `0` if unknown.
    pub contact_area: f64,
    /// Position in the owning body's local frame.
    pub position: Vector3<f64>,
    /// Orientation (outward normal) in the owning body's local frame.
    pub orientation: Vector3<f64>,
    /// Body attached at this node, if any.
    pub attached: Option<BodyId>,
}

impl AttachNode {
    /// Create a stack node.
    #[must_use]
    pub fn stack(id: impl Into<String>, size: u32, orientation: Vector3<f64>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Stack,
            size,
            contact_area: 0.0,
            position: Vector3::zeros(),
            orientation,
            attached: None,
        }
    }

    /// Create a surface attach node.
    #[must_use]
    pub fn surface(size: u32, orientation: Vector3<f64>) -> Self {
        Self {
            id: "srfAttach".to_string(),
            kind: NodeKind::Surface,
            ..Self::stack("srfAttach", size, orientation)
        }
    }

    /// Set the contact area.
    #[must_use]
    pub fn with_contact_area(mut self, area: f64) -> Self {
        self.contact_area = area;
        self
    }

    /// Set the node position.
    #[must_use]
    pub fn with_position(mut self, position: Vector3<f64>) -> Self {
        self.position = position;
        self
    }

    /// Set the attached body.
    #[must_use]
    pub fn attached_to(mut self, body: BodyId) -> Self {
        self.attached = Some(body);
        self
    }
}

/// One mesh of a body's model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MeshPart {
    /// Mesh-to-body transform.
    pub transform: Isometry3<f64>,
    /// Vertices in mesh coordinates.
    pub vertices: Vec<Point3<f64>>,
}

impl MeshPart {
    /// Create a mesh with identity transform.
    #[must_use]
    pub fn new(vertices: Vec<Point3<f64>>) -> Self {
        Self {
            transform: Isometry3::identity(),
            vertices,
        }
    }

    /// Axis-aligned box centered at the mesh origin.
    #[must_use]
    pub fn cuboid(half_extents: Vector3<f64>) -> Self {
        let h = half_extents;
        let vertices = [-1.0, 1.0]
            .iter()
            .flat_map(|&sx| {
                [-1.0, 1.0].iter().flat_map(move |&sy| {
                    [-1.0, 1.0]
                        .iter()
                        .map(move |&sz| Point3::new(sx * h.x, sy * h.y, sz * h.z))
                })
            })
            .collect();
        Self::new(vertices)
    }

    /// Set the mesh-to-body transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Isometry3<f64>) -> Self {
        self.transform = transform;
        self
    }
}

/// One part of an assembly.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Body {
    /// Identifier, assigned by the arena.
    pub id: BodyId,
    /// Display name.
    pub name: String,
    /// Tree this body belongs to, assigned by the arena.
    pub tree: TreeId,
    /// Dry mass.
    pub mass: f64,
    /// Mass of resources currently held.
    pub resource_mass: f64,
    /// Mass of resources when full.
    pub max_resource_mass: f64,
    /// Breaking force of the body's attachment.
    pub breaking_force: f64,
    /// Breaking torque of the body's attachment.
    pub breaking_torque: f64,
    /// Impact speed the body survives.
    pub crash_tolerance: f64,
    /// Whether the host simulates a rigid body for this body.
    pub physical: bool,
    /// Whether the host finished initialising the body.
    pub started: bool,
    /// Parent body.
    pub parent: Option<BodyId>,
    /// Child bodies, in attach order.
    pub children: Vec<BodyId>,
    /// Primary joints from this body to its parent.
    pub attach_joints: Vec<JointId>,
    /// How the body is attached to its parent.
    pub attach_mode: AttachMode,
    /// Whether the primary joints were already tuned.
    pub attach_method: AttachMethod,
    /// Stack and docking nodes.
    pub attach_nodes: Vec<AttachNode>,
    /// Surface attach node, if the body has one.
    pub surface_node: Option<AttachNode>,
    /// Whether other bodies may surface-attach to this one.
    pub surface_attachable: bool,
    /// Current world pose.
    pub pose: Isometry3<f64>,
    /// Pose relative to the assembly root when the assembly was built.
    pub original_pose: Isometry3<f64>,
    /// Model geometry.
    pub meshes: Vec<MeshPart>,
    /// Behaviour modules.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub capabilities: Vec<Arc<dyn Capability>>,
}

impl Body {
    /// Create a physical body with the given name and dry mass.
    #[must_use]
    pub fn new(name: impl Into<String>, mass: f64) -> Self {
        Self {
            id: BodyId::new(0),
            name: name.into(),
            tree: TreeId::new(0),
            mass,
            resource_mass: 0.0,
            max_resource_mass: 0.0,
            breaking_force: 22.0,
            breaking_torque: 22.0,
            crash_tolerance: 9.0,
            physical: true,
            started: true,
            parent: None,
            children: Vec::new(),
            attach_joints: Vec::new(),
            attach_mode: AttachMode::Stack,
            attach_method: AttachMethod::FixedJoint,
            attach_nodes: Vec::new(),
            surface_node: None,
            surface_attachable: false,
            pose: Isometry3::identity(),
            original_pose: Isometry3::identity(),
            meshes: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    /// Mark the body as physicsless (no rigid body of its own).
    #[must_use]
    pub fn physicsless(mut self) -> Self {
        self.physical = false;
        self
    }

    /// Set the resource mass, current and maximum.
    #[must_use]
    pub fn with_resources(mut self, current: f64, max: f64) -> Self {
        self.resource_mass = current;
        self.max_resource_mass = max;
        self
    }

    /// Set breaking force and torque.
    #[must_use]
    pub fn with_breaking(mut self, force: f64, torque: f64) -> Self {
        self.breaking_force = force;
        self.breaking_torque = torque;
        self
    }

    /// Set the attach mode.
    #[must_use]
    pub fn with_attach_mode(mut self, mode: AttachMode) -> Self {
        self.attach_mode = mode;
        self
    }

    /// Add a stack or docking node.
    #[must_use]
    pub fn with_node(mut self, node: AttachNode) -> Self {
        self.attach_nodes.push(node);
        self
    }

    /// Set the surface attach node.
    #[must_use]
    pub fn with_surface_node(mut self, node: AttachNode) -> Self {
        self.surface_node = Some(node);
        self
    }

    /// Allow other bodies to surface-attach to this one.
    #[must_use]
    pub fn surface_attachable(mut self) -> Self {
        self.surface_attachable = true;
        self
    }

    /// Set world and original pose.
    #[must_use]
    pub fn with_pose(mut self, pose: Isometry3<f64>) -> Self {
        self.pose = pose;
        self.original_pose = pose;
        self
    }

    /// Add a mesh.
    #[must_use]
    pub fn with_mesh(mut self, mesh: MeshPart) -> Self {
        self.meshes.push(mesh);
        self
    }

    /// Add a capability.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Capability + 'static) -> Self {
        self.capabilities.push(Arc::new(capability));
        self
    }

    /// Dry mass plus current resources.
    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.mass + self.resource_mass
    }

    /// Dry mass plus resources when full.
    #[must_use]
    pub fn maximum_possible_mass(&self) -> f64 {
        self.mass + self.max_resource_mass
    }

    /// Rigid body handle, `None` for physicsless bodies.
    #[must_use]
    pub fn rigid_handle(&self) -> Option<RigidHandle> {
        self.physical.then_some(RigidHandle(self.id.raw()))
    }

    /// Any capability forbids adjusting this body's joints.
    #[must_use]
    pub fn has_adjustment_lock(&self) -> bool {
        self.capabilities.iter().any(|c| c.locks_adjustment())
    }

    /// Any capability can lock and unlock the joint at runtime.
    #[must_use]
    pub fn is_unlockable(&self) -> bool {
        self.capabilities.iter().any(|c| c.is_unlockable())
    }

    /// The body is a launch clamp.
    #[must_use]
    pub fn is_launch_clamp(&self) -> bool {
        self.capabilities.iter().any(|c| c.is_launch_clamp())
    }

    /// The body is a robotic part.
    #[must_use]
    pub fn is_robotic(&self) -> bool {
        self.capabilities.iter().any(|c| c.is_robotic())
    }

    /// The body is a crew member on EVA.
    #[must_use]
    pub fn is_eva(&self) -> bool {
        self.capabilities.iter().any(|c| c.is_eva())
    }

    /// Intake direction of the first intake capability.
    #[must_use]
    pub fn intake_direction(&self) -> Option<Vector3<f64>> {
        self.capabilities.iter().find_map(|c| c.intake_direction())
    }

    /// Node of this body that `other` is attached to.
    #[must_use]
    pub fn find_attach_node_by(&self, other: BodyId) -> Option<&AttachNode> {
        self.attach_nodes
            .iter()
            .chain(self.surface_node.iter())
            .find(|n| n.attached == Some(other))
    }
}
