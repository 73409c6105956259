//! Strength of primary joints.
//!
//! Turns an attachment's footprint and the bodies' stock break thresholds
//! into target force, torque and stiffness for the host's joint, and tunes
//! the joint in place.
//!
//! Three figures feed the result:
//!
//! - the **geometric** estimate from the bodies' meshes along the attach node
//! - the **contact-area** estimate from the area the node reports
//! - the **shadow** floor derived from stock thresholds and node size
//!
//! The final strength is never below the shadow floor on any component.

use nalgebra::{UnitQuaternion, Vector3};
use reinforce_types::{
    AttachMethod, AttachMode, AttachNode, Body, BodyId, JointMotion, NodeKind, ReinforceConfig,
    ReinforceError,
};
use tracing::debug;

use crate::assembly::Assembly;
use crate::geometry::{
    AXIS_AGREEMENT, Footprint, direction_between, extents_facing, guess_up_vector, radius_along,
};

/// Radius below which a mesh estimate is discarded in favour of the node size.
const MIN_RADIUS: f64 = 0.001;

/// Radius per node size step when the mesh gives nothing usable.
const NODE_SIZE_RADIUS: f64 = 1.25;

/// Shadow factor for stack attachments.
const STACK_NODE_FACTOR: f64 = 2.0;

/// Shadow factor for surface attachments.
const SURFACE_NODE_FACTOR: f64 = 0.8;

/// Target figures for one joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointStrength {
    /// Moment-of-inertia proxy driving the angular stiffness.
    pub moment_of_inertia: f64,
    /// Break force and linear drive force.
    pub linear_force: f64,
    /// Break torque and angular drive force.
    pub torque_force: f64,
}

impl JointStrength {
    /// Component-wise maximum.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self {
            moment_of_inertia: self.moment_of_inertia.max(other.moment_of_inertia),
            linear_force: self.linear_force.max(other.linear_force),
            torque_force: self.torque_force.max(other.torque_force),
        }
    }

    /// Every component lies within `band` (relative) of `reference`.
    #[must_use]
    pub fn within_band(&self, reference: &Self, band: f64) -> bool {
        let close = |value: f64, reference: f64| {
            value >= reference * (1.0 - band) && value <= reference * (1.0 + band)
        };
        close(self.moment_of_inertia, reference.moment_of_inertia)
            && close(self.linear_force, reference.linear_force)
            && close(self.torque_force, reference.torque_force)
    }
}

/// The attach node linking a body to its parent, and the body owning it.
#[derive(Debug, Clone, Copy)]
pub struct SharedNode<'a> {
    /// The node.
    pub node: &'a AttachNode,
    /// Body the node belongs to.
    pub owner: &'a Body,
}

/// Locate the attach node linking `body` and `parent`.
///
/// Prefers the body's own node, then the parent's, then (surface attached
/// bodies only) the body's surface attach node.
#[must_use]
pub fn shared_node<'a>(body: &'a Body, parent: &'a Body) -> Option<SharedNode<'a>> {
    if let Some(node) = body.find_attach_node_by(parent.id) {
        return Some(SharedNode { node, owner: body });
    }
    if let Some(node) = parent.find_attach_node_by(body.id) {
        return Some(SharedNode {
            node,
            owner: parent,
        });
    }
    if body.attach_mode == AttachMode::Surface {
        return body
            .surface_node
            .as_ref()
            .map(|node| SharedNode { node, owner: body });
    }
    None
}

/// Computes and applies primary joint strength.
#[derive(Debug, Clone, Copy)]
pub struct StrengthCalculator<'a> {
    config: &'a ReinforceConfig,
}

impl<'a> StrengthCalculator<'a> {
    /// Create a calculator for the given configuration.
    #[must_use]
    pub fn new(config: &'a ReinforceConfig) -> Self {
        Self { config }
    }

    /// Strength for the joint from `body` to `connected`.
    ///
    /// # Errors
    ///
    /// Returns [`ReinforceError::MissingAttachNode`] when no attach node
    /// links `body` and its parent, and [`ReinforceError::UnknownBody`] when
    /// a body is missing.
    pub fn calculate(
        &self,
        assembly: &Assembly,
        body: BodyId,
        connected: BodyId,
    ) -> reinforce_types::Result<JointStrength> {
        let b = assembly.body(body).ok_or(ReinforceError::UnknownBody(body))?;
        let c = assembly
            .body(connected)
            .ok_or(ReinforceError::UnknownBody(connected))?;
        let parent_id = b.parent.unwrap_or(connected);
        let parent = assembly
            .body(parent_id)
            .ok_or(ReinforceError::UnknownBody(parent_id))?;

        let shared = shared_node(b, parent).ok_or(ReinforceError::MissingAttachNode {
            body,
            connected: parent_id,
        })?;

        let geometric = self.calculate_geometric_strength(b, c, &shared);
        let computed = if shared.node.contact_area > 0.0 {
            let contact = self.calculate_contact_strength(b, c, shared.node.contact_area);
            if !self.config.cross_check_contact_area
                || contact.within_band(&geometric, self.config.contact_area_strength_band)
            {
                contact
            } else {
                debug!(body = %body, "contact-area strength outside band, keeping geometric");
                geometric
            }
        } else {
            geometric
        };

        let joint_count = b.attach_joints.len().max(1);
        let shadow = calculate_shadow_strength(b, c, shared.node.size, joint_count);
        Ok(computed.max(shadow))
    }

    /// Strength from the mesh footprint along the shared attach node.
    #[must_use]
    pub fn calculate_geometric_strength(
        &self,
        body: &Body,
        connected: &Body,
        shared: &SharedNode<'_>,
    ) -> JointStrength {
        let main = shared.owner;
        let node = shared.node;
        let node_dir = node
            .orientation
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::y);

        let footprint = if node.kind == NodeKind::Surface {
            let up = guess_up_vector(main)
                .try_normalize(f64::EPSILON)
                .unwrap_or_else(Vector3::y);

            if up.dot(&node_dir).abs() > AXIS_AGREEMENT {
                // Radially attached but along the main axis, e.g. a docking port.
                stack_footprint(main, connected, &node_dir, node.size)
            } else {
                let size1 = extents_facing(main, &node_dir, &up);
                let size2 = extents_facing(
                    connected,
                    &direction_between(main, connected, &node_dir),
                    &direction_between(main, connected, &up),
                );
                // Which side is attached is unknown, so average them.
                let width1 = (size1.x + size1.z) / 2.0;
                let width2 = (size2.x + size2.z) / 2.0;
                if size1.y * width1 > size2.y * width2 {
                    Footprint::rectangle(size1.y, width1)
                } else {
                    Footprint::rectangle(size2.y, width2)
                }
            }
        } else {
            let dir = direction_between(main, body, &node_dir);
            stack_footprint(body, connected, &dir, node.size)
        };

        self.strength_from_footprint(footprint, body, connected)
    }

    /// Strength from the contact area reported by the attach node.
    #[must_use]
    pub fn calculate_contact_strength(
        &self,
        body: &Body,
        connected: &Body,
        contact_area: f64,
    ) -> JointStrength {
        self.strength_from_footprint(Footprint::from_contact_area(contact_area), body, connected)
    }

    fn strength_from_footprint(
        &self,
        footprint: Footprint,
        body: &Body,
        connected: &Body,
    ) -> JointStrength {
        let footprint = if self.config.use_volume_not_area {
            footprint.as_volume()
        } else {
            footprint
        };

        let stock_force =
            body.breaking_force.min(connected.breaking_force) * self.config.break_force_multiplier;
        let stock_torque =
            body.breaking_torque.min(connected.breaking_torque) * self.config.break_torque_multiplier;

        JointStrength {
            moment_of_inertia: footprint.moment_of_inertia,
            linear_force: (self.config.break_strength_per_area * footprint.area).max(stock_force),
            torque_force: (self.config.break_torque_per_moi * footprint.moment_of_inertia)
                .max(stock_torque),
        }
    }

    /// Retune every primary joint of `body` towards its parent.
    ///
    /// Returns the number of joints tuned; bodies that may not be adjusted,
    /// are unlockable, or are too light are skipped with zero.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::calculate`] failures.
    pub fn reinforce_body(
        &self,
        assembly: &mut Assembly,
        body: BodyId,
    ) -> reinforce_types::Result<usize> {
        let b = assembly.body(body).ok_or(ReinforceError::UnknownBody(body))?;
        if !b.physical || b.parent.is_none() || b.is_unlockable() {
            return Ok(0);
        }
        if !assembly.is_adjustment_allowed(body) {
            debug!(body = %body, "adjustment locked, skipping");
            return Ok(0);
        }
        if b.attach_method == AttachMethod::LockedJoint {
            debug!(body = %body, name = %b.name, "already processed before");
        }

        let body_mass = b.total_mass();
        let attach_joints = b.attach_joints.clone();
        let mut tuned = 0;

        for joint_id in attach_joints {
            let Some(joint) = assembly.joint(joint_id) else {
                continue;
            };
            let Some(connected) = joint.target.or(assembly.parent_of(body)) else {
                continue;
            };

            if body_mass < self.config.mass_for_adjustment
                || assembly.total_mass(connected) < self.config.mass_for_adjustment
            {
                debug!(body = %body, "mass too low, skipping");
                continue;
            }

            let strength = self.calculate(assembly, body, connected)?;
            let config = self.config;
            let Some(joint) = assembly.joint_mut(joint_id) else {
                continue;
            };

            let mut angular = joint.angular_drive();
            angular.spring = angular
                .spring
                .max(strength.moment_of_inertia * config.angular_drive_spring);
            angular.damper = angular
                .damper
                .max(strength.moment_of_inertia * config.angular_drive_damper * 0.1);
            angular.max_force = angular.max_force.max(strength.torque_force);
            joint.set_angular_drive(angular);

            let mut linear = joint.linear_drive();
            linear.max_force = linear.max_force.max(strength.linear_force);
            joint.set_linear_drive(linear);

            joint.linear_motion = JointMotion::Limited;
            joint.angular_motion = JointMotion::Limited;
            joint.linear_limit = 0.0;
            joint.angular_limit = 0.0;
            joint.target_rotation = UnitQuaternion::identity();
            joint.break_force = strength.linear_force;
            joint.break_torque = strength.torque_force;

            set_breaking_forces(assembly, body, strength.linear_force, strength.torque_force);
            if let Some(b) = assembly.body_mut(body) {
                b.attach_method = AttachMethod::LockedJoint;
            }
            tuned += 1;
        }

        Ok(tuned)
    }
}

/// Floor derived from stock thresholds and node size.
///
/// Never lets reinforcement produce a joint weaker than the host's own.
#[must_use]
pub fn calculate_shadow_strength(
    body: &Body,
    connected: &Body,
    node_size: u32,
    joint_count: usize,
) -> JointStrength {
    let factor = match body.attach_mode {
        AttachMode::Surface => SURFACE_NODE_FACTOR,
        AttachMode::Stack => STACK_NODE_FACTOR,
    };
    #[allow(clippy::cast_precision_loss)]
    let scale = (f64::from(node_size) + 1.0) * factor / joint_count as f64;

    JointStrength {
        moment_of_inertia: 0.0,
        linear_force: body.breaking_force.min(connected.breaking_force) * scale,
        torque_force: body.breaking_torque.min(connected.breaking_torque) * scale,
    }
}

/// Cylinder footprint of the thinner of two bodies along `axis` (in `body`'s frame).
fn stack_footprint(body: &Body, connected: &Body, axis: &Vector3<f64>, node_size: u32) -> Footprint {
    let radius = radius_along(body, axis)
        .min(radius_along(connected, &direction_between(body, connected, axis)));
    let radius = if radius <= MIN_RADIUS {
        f64::from(node_size) * NODE_SIZE_RADIUS
    } else {
        radius
    };
    Footprint::cylinder(radius)
}

/// Apply break thresholds to every primary joint of `body`.
fn set_breaking_forces(assembly: &mut Assembly, body: BodyId, force: f64, torque: f64) {
    let joints = assembly
        .body(body)
        .map(|b| b.attach_joints.clone())
        .unwrap_or_default();
    for id in joints {
        if let Some(joint) = assembly.joint_mut(id) {
            joint.break_force = force;
            joint.break_torque = torque;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use reinforce_types::{HOST_ANGULAR_SPRING, JointLock, MeshPart};

    fn tank() -> Body {
        Body::new("tank", 4.0)
            .with_mesh(MeshPart::cuboid(Vector3::new(1.25, 3.0, 1.25)))
            .with_node(AttachNode::stack("bottom", 1, -Vector3::y()))
    }

    fn engine() -> Body {
        Body::new("engine", 1.0)
            .with_mesh(MeshPart::cuboid(Vector3::new(0.625, 0.5, 0.625)))
            .with_node(AttachNode::stack("top", 1, Vector3::y()))
    }

    fn stack_pair() -> (Assembly, BodyId, BodyId) {
        let mut assembly = Assembly::new();
        let root = assembly.add_root(tank());
        let child = assembly.attach_at(root, "bottom", engine(), "top").unwrap();
        (assembly, root, child)
    }

    #[test]
    fn test_stack_geometric_strength() {
        let (assembly, root, child) = stack_pair();
        let config = ReinforceConfig::default().use_area();
        let calc = StrengthCalculator::new(&config);

        let strength = calc.calculate(&assembly, child, root).unwrap();
        let footprint = Footprint::cylinder(0.625);
        assert_relative_eq!(strength.moment_of_inertia, footprint.moment_of_inertia, epsilon = 1e-9);
        assert_relative_eq!(strength.linear_force, 1500.0 * footprint.area, epsilon = 1e-6);
        assert_relative_eq!(
            strength.torque_force,
            6000.0 * footprint.moment_of_inertia,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_volume_mode_scales_footprint() {
        let (assembly, root, child) = stack_pair();
        let config = ReinforceConfig::default();
        let strength = StrengthCalculator::new(&config)
            .calculate(&assembly, child, root)
            .unwrap();
        let footprint = Footprint::cylinder(0.625).as_volume();
        assert_relative_eq!(strength.linear_force, 1500.0 * footprint.area, epsilon = 1e-6);
    }

    #[test]
    fn test_node_size_fallback_radius() {
        let mut assembly = Assembly::new();
        let root = assembly.add_root(Body::new("core", 4.0).with_node(AttachNode::stack(
            "bottom",
            2,
            -Vector3::y(),
        )));
        let child = assembly
            .attach_at(
                root,
                "bottom",
                Body::new("meshless", 1.0).with_node(AttachNode::stack("top", 2, Vector3::y())),
                "top",
            )
            .unwrap();

        let config = ReinforceConfig::default().use_area();
        let strength = StrengthCalculator::new(&config)
            .calculate(&assembly, child, root)
            .unwrap();
        let footprint = Footprint::cylinder(2.5);
        assert_relative_eq!(strength.moment_of_inertia, footprint.moment_of_inertia, epsilon = 1e-9);
    }

    #[test]
    fn test_shadow_floor_holds_for_vanishing_contact_area() {
        let mut assembly = Assembly::new();
        let root = assembly.add_root(
            Body::new("hub", 4.0)
                .with_breaking(50.0, 40.0)
                .with_node(AttachNode::stack("bottom", 2, -Vector3::y())),
        );
        let child = assembly
            .attach_at(
                root,
                "bottom",
                Body::new("spoke", 1.0).with_breaking(22.0, 20.0).with_node(
                    AttachNode::stack("top", 2, Vector3::y()).with_contact_area(1e-12),
                ),
                "top",
            )
            .unwrap();

        let config = ReinforceConfig::default();
        let strength = StrengthCalculator::new(&config)
            .calculate(&assembly, child, root)
            .unwrap();

        let shadow = calculate_shadow_strength(
            assembly.body(child).unwrap(),
            assembly.body(root).unwrap(),
            2,
            1,
        );
        assert_relative_eq!(shadow.linear_force, 22.0 * 3.0 * 2.0);
        assert_relative_eq!(shadow.torque_force, 20.0 * 3.0 * 2.0);
        assert_eq!(strength.linear_force, shadow.linear_force);
        assert_eq!(strength.torque_force, shadow.torque_force);
    }

    #[test]
    fn test_surface_shadow_factor() {
        let body = Body::new("fin", 0.1)
            .with_breaking(10.0, 10.0)
            .with_attach_mode(AttachMode::Surface);
        let parent = Body::new("fuselage", 2.0).with_breaking(30.0, 30.0);
        let shadow = calculate_shadow_strength(&body, &parent, 0, 2);
        assert_relative_eq!(shadow.linear_force, 10.0 * 0.8 / 2.0);
    }

    #[test]
    fn test_contact_area_cross_check() {
        let geometric_area = Footprint::cylinder(0.625).area;
        let build = |contact_area: f64| {
            let mut assembly = Assembly::new();
            let root = assembly.add_root(tank());
            let child = assembly
                .attach_at(
                    root,
                    "bottom",
                    Body::new("engine", 1.0)
                        .with_mesh(MeshPart::cuboid(Vector3::new(0.625, 0.5, 0.625)))
                        .with_node(
                            AttachNode::stack("top", 1, Vector3::y()).with_contact_area(contact_area),
                        ),
                    "top",
                )
                .unwrap();
            (assembly, root, child)
        };

        let plain = ReinforceConfig::default().use_area();
        let checked = plain.clone().cross_check_contact_area(true);

        // Close to the geometric estimate: both modes use the contact area.
        let (assembly, root, child) = build(geometric_area * 1.02);
        let contact = Footprint::from_contact_area(geometric_area * 1.02);
        for config in [&plain, &checked] {
            let strength = StrengthCalculator::new(config)
                .calculate(&assembly, child, root)
                .unwrap();
            assert_relative_eq!(strength.linear_force, 1500.0 * contact.area, epsilon = 1e-6);
        }

        // Far off: only the unchecked mode trusts it.
        let (assembly, root, child) = build(geometric_area * 3.0);
        let strength = StrengthCalculator::new(&plain)
            .calculate(&assembly, child, root)
            .unwrap();
        assert_relative_eq!(strength.linear_force, 1500.0 * geometric_area * 3.0, epsilon = 1e-6);
        let strength = StrengthCalculator::new(&checked)
            .calculate(&assembly, child, root)
            .unwrap();
        assert_relative_eq!(strength.linear_force, 1500.0 * geometric_area, epsilon = 1e-6);
    }

    #[test]
    fn test_surface_rectangle_footprint() {
        let mut assembly = Assembly::new();
        let root = assembly.add_root(tank());
        let child = assembly
            .attach_at(
                root,
                "bottom",
                Body::new("radial", 0.5)
                    .with_attach_mode(AttachMode::Surface)
                    .with_mesh(MeshPart::cuboid(Vector3::new(0.25, 1.0, 0.5)))
                    .with_surface_node(AttachNode::surface(0, -Vector3::x())),
                "srfAttach",
            )
            .unwrap();

        let config = ReinforceConfig::default().use_area();
        let calc = StrengthCalculator::new(&config);
        let body = assembly.body(child).unwrap();
        let parent = assembly.body(root).unwrap();
        let shared = shared_node(body, parent).unwrap();
        assert_eq!(shared.node.kind, NodeKind::Surface);

        let strength = calc.calculate_geometric_strength(body, parent, &shared);
        // The tank's side (6 m tall, 2.5 m across) outweighs the radial's.
        let footprint = Footprint::rectangle(2.5, (2.5 + 6.0) / 2.0);
        assert_relative_eq!(strength.moment_of_inertia, footprint.moment_of_inertia, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_attach_node() {
        let mut assembly = Assembly::new();
        let root = assembly.add_root(Body::new("a", 1.0));
        let child = assembly.attach(root, Body::new("b", 1.0)).unwrap();
        let config = ReinforceConfig::default();
        let err = StrengthCalculator::new(&config)
            .calculate(&assembly, child, root)
            .unwrap_err();
        assert!(err.is_precondition_skip());
        assert!(matches!(err, ReinforceError::MissingAttachNode { .. }));
    }

    #[test]
    fn test_reinforce_body_tunes_primary_joint() {
        let (mut assembly, root, child) = stack_pair();
        let config = ReinforceConfig::default();
        let calc = StrengthCalculator::new(&config);

        let expected = calc.calculate(&assembly, child, root).unwrap();
        assert_eq!(calc.reinforce_body(&mut assembly, child).unwrap(), 1);

        let joint_id = assembly.body(child).unwrap().attach_joints[0];
        let joint = assembly.joint(joint_id).unwrap().clone();
        assert_eq!(assembly.body(child).unwrap().attach_method, AttachMethod::LockedJoint);
        assert_eq!(joint.break_force, expected.linear_force);
        assert_eq!(joint.break_torque, expected.torque_force);
        assert_eq!(joint.angular_limit, 0.0);
        assert!(joint.angular_drive().spring >= HOST_ANGULAR_SPRING);
        assert_relative_eq!(
            joint.angular_drive().spring,
            (expected.moment_of_inertia * 5e12).max(HOST_ANGULAR_SPRING)
        );

        // Running again changes nothing.
        assert_eq!(calc.reinforce_body(&mut assembly, child).unwrap(), 1);
        assert_eq!(assembly.joint(joint_id).unwrap(), &joint);

        // The root has no parent joint.
        assert_eq!(calc.reinforce_body(&mut assembly, root).unwrap(), 0);
    }

    #[test]
    fn test_reinforce_body_skips() {
        let mut assembly = Assembly::new();
        let root = assembly.add_root(tank());
        let light = assembly
            .attach_at(
                root,
                "bottom",
                Body::new("antenna", 0.001).with_node(AttachNode::stack("top", 0, Vector3::y())),
                "top",
            )
            .unwrap();
        let unlockable = assembly
            .attach(root, Body::new("hinge", 1.0).with_capability(JointLock { unlocked: false }))
            .unwrap();

        let config = ReinforceConfig::default();
        let calc = StrengthCalculator::new(&config);
        assert_eq!(calc.reinforce_body(&mut assembly, light).unwrap(), 0);
        assert_eq!(calc.reinforce_body(&mut assembly, unlockable).unwrap(), 0);
        assert_eq!(
            assembly.body(light).unwrap().attach_method,
            AttachMethod::FixedJoint
        );
    }
}
