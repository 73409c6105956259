//! Construction of synthesized joints.
//!
//! The builder only produces [`Joint`] values; adding them to the assembly
//! and registering them with the tracker is left to the caller.

use nalgebra::{UnitQuaternion, Vector3};
use reinforce_types::{Body, BodyId, Joint, JointMotion, ReinforceConfig, ReinforceError};

use crate::assembly::Assembly;
use crate::inversion::Solution;

/// Angular limit of inversion joints (degrees).
const INVERSION_ANGULAR_LIMIT: f64 = 180.0;

/// Linear limit of inversion joints (meters).
const INVERSION_LINEAR_LIMIT: f64 = 1.0;

/// Builds inversion, extra stability and ground joints.
#[derive(Debug, Clone, Copy)]
pub struct JointBuilder<'a> {
    config: &'a ReinforceConfig,
}

impl<'a> JointBuilder<'a> {
    /// Create a builder for the given configuration.
    #[must_use]
    pub fn new(config: &'a ReinforceConfig) -> Self {
        Self { config }
    }

    /// Joint from the inverted body to its anchor.
    ///
    /// Owned by the inverted body so that breaking it follows the body.
    ///
    /// # Errors
    ///
    /// Returns an error if either body is missing.
    pub fn inversion_joint(
        &self,
        assembly: &Assembly,
        solution: &Solution,
    ) -> reinforce_types::Result<Joint> {
        let part = body(assembly, solution.part)?;
        let link = body(assembly, solution.link)?;

        let mut joint = Joint::synthesized(part.id, Some(link.id));
        set_rest_pose(&mut joint, part, link);

        joint.linear_motion = JointMotion::Limited;
        joint.angular_motion = JointMotion::Limited;
        joint.linear_limit = INVERSION_LINEAR_LIMIT;
        joint.angular_limit = INVERSION_ANGULAR_LIMIT;
        joint.set_linear_drive(solution.strength.linear);
        joint.set_angular_drive(solution.strength.angular);
        joint.break_force = solution.strength.break_force;
        joint.break_torque = solution.strength.break_torque;
        Ok(joint)
    }

    /// Free-motion stability joint between two bodies.
    ///
    /// Owned by the heavier body when the lighter one is physical.
    ///
    /// # Errors
    ///
    /// Returns an error if either body is missing.
    pub fn extra_joint(
        &self,
        assembly: &Assembly,
        part: BodyId,
        link: BodyId,
    ) -> reinforce_types::Result<Joint> {
        let mut part = body(assembly, part)?;
        let mut link = body(assembly, link)?;
        if part.mass < link.mass && part.physical {
            std::mem::swap(&mut part, &mut link);
        }

        let params = &self.config.extra_joint;
        let mut joint = Joint::synthesized(part.id, Some(link.id));
        set_rest_pose(&mut joint, part, link);
        joint.set_linear_drive(params.linear);
        joint.set_angular_drive(params.angular);
        joint.break_force = params.breaking_force;
        joint.break_torque = params.breaking_torque;
        Ok(joint)
    }

    /// Fixed joint holding a launch clamp to the world.
    #[must_use]
    pub fn ground_joint(clamp: BodyId) -> Joint {
        let mut joint = Joint::ground(clamp, f64::MAX, f64::MAX);
        joint.unbreakable = true;
        joint
    }
}

fn body(assembly: &Assembly, id: BodyId) -> reinforce_types::Result<&Body> {
    assembly.body(id).ok_or(ReinforceError::UnknownBody(id))
}

/// Anchor the joint so the bodies' original relative pose is its rest pose.
fn set_rest_pose(joint: &mut Joint, part: &Body, link: &Body) {
    joint.anchor = Vector3::zeros();
    let offset = part.original_pose.translation.vector - link.original_pose.translation.vector;
    joint.connected_anchor = link.original_pose.rotation.inverse() * offset;

    let original: UnitQuaternion<f64> =
        link.original_pose.rotation.inverse() * part.original_pose.rotation;
    joint.target_rotation = part.pose.rotation.inverse() * link.pose.rotation * original;
}
