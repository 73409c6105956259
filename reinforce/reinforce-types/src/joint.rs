//! Compliant joint types.
//!
//! A [`Joint`] is a directed compliant link between two bodies: the `owner`
//! carries the joint, the `target` is the connected body. Drives pull the
//! pair back to the relative pose fixed by the anchors and target rotation;
//! break thresholds decide when the host solver destroys the joint.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::BodyId;

/// Drive force the host engine gives its own joints.
pub const HOST_JOINT_FORCE: f64 = 1.0e20;

/// Angular spring the host engine gives its own joints.
pub const HOST_ANGULAR_SPRING: f64 = 60_000.0;

/// Unique identifier for a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointId(pub u64);

impl JointId {
    /// Create a new joint ID.
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

impl From<u64> for JointId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Joint({})", self.0)
    }
}

/// Who created a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointOrigin {
    /// Host-style joint (parent-child attachment or ground anchor), tuned in place.
    Primary,
    /// Created by the reinforcement engine and owned by it.
    Synthesized,
}

/// Motion allowed on a group of axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointMotion {
    /// Unconstrained; only the drives act.
    Free,
    /// Constrained to the configured limit.
    Limited,
    /// No motion.
    Locked,
}

/// Spring-damper drive on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JointDrive {
    /// Maximum force (or torque) the drive may apply.
    pub max_force: f64,
    /// Position spring.
    pub spring: f64,
    /// Position damper.
    pub damper: f64,
}

impl JointDrive {
    /// Create a drive.
    #[must_use]
    pub const fn new(max_force: f64, spring: f64, damper: f64) -> Self {
        Self {
            max_force,
            spring,
            damper,
        }
    }

    /// Drive with every parameter at positive infinity.
    ///
    /// Identity element for [`JointDrive::min`].
    #[must_use]
    pub const fn unbounded() -> Self {
        Self::new(f64::INFINITY, f64::INFINITY, f64::INFINITY)
    }

    /// Linear drive of a freshly created host joint.
    #[must_use]
    pub const fn host_linear() -> Self {
        Self::new(HOST_JOINT_FORCE, HOST_JOINT_FORCE, 0.0)
    }

    /// Angular drive of a freshly created host joint.
    #[must_use]
    pub const fn host_angular() -> Self {
        Self::new(HOST_JOINT_FORCE, HOST_ANGULAR_SPRING, 0.0)
    }

    /// Component-wise minimum.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self {
            max_force: self.max_force.min(other.max_force),
            spring: self.spring.min(other.spring),
            damper: self.damper.min(other.damper),
        }
    }
}

/// A compliant joint between two bodies.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Joint {
    /// Body carrying the joint.
    pub owner: BodyId,
    /// Connected body, `None` when anchored to the world.
    pub target: Option<BodyId>,
    /// Who created the joint.
    pub origin: JointOrigin,
    /// Motion allowed on the three linear axes.
    pub linear_motion: JointMotion,
    /// Motion allowed on the three angular axes.
    pub angular_motion: JointMotion,
    /// X, Y, Z linear drives.
    pub linear_drives: [JointDrive; 3],
    /// Angular X, angular YZ, and slerp drives.
    pub angular_drives: [JointDrive; 3],
    /// Linear limit (meters) when motion is limited.
    pub linear_limit: f64,
    /// Angular limit (degrees) when motion is limited.
    pub angular_limit: f64,
    /// Force above which the host breaks the joint.
    pub break_force: f64,
    /// Torque above which the host breaks the joint.
    pub break_torque: f64,
    /// Temporarily exempt from breaking (physics easing).
    pub unbreakable: bool,
    /// Anchor in the owner's local frame.
    pub anchor: Vector3<f64>,
    /// Anchor in the target's local frame.
    pub connected_anchor: Vector3<f64>,
    /// Primary axis in the owner's local frame.
    pub axis: Vector3<f64>,
    /// Rest orientation the angular drives pull towards.
    pub target_rotation: UnitQuaternion<f64>,
}

impl Joint {
    /// Create a joint the way the host creates parent-child attachments.
    #[must_use]
    pub fn primary(owner: BodyId, target: BodyId, break_force: f64, break_torque: f64) -> Self {
        Self {
            owner,
            target: Some(target),
            origin: JointOrigin::Primary,
            linear_motion: JointMotion::Limited,
            angular_motion: JointMotion::Limited,
            linear_drives: [JointDrive::host_linear(); 3],
            angular_drives: [JointDrive::host_angular(); 3],
            linear_limit: 0.0,
            angular_limit: 0.0,
            break_force,
            break_torque,
            unbreakable: false,
            anchor: Vector3::zeros(),
            connected_anchor: Vector3::zeros(),
            axis: Vector3::x(),
            target_rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a fixed joint anchoring `owner` to the world.
    #[must_use]
    pub fn ground(owner: BodyId, break_force: f64, break_torque: f64) -> Self {
        Self {
            target: None,
            linear_motion: JointMotion::Locked,
            angular_motion: JointMotion::Locked,
            ..Self::primary(owner, owner, break_force, break_torque)
        }
    }

    /// Create an engine-owned joint with free motion and no drive.
    ///
    /// Callers fill in drives, limits, and thresholds.
    #[must_use]
    pub fn synthesized(owner: BodyId, target: Option<BodyId>) -> Self {
        Self {
            owner,
            target,
            origin: JointOrigin::Synthesized,
            linear_motion: JointMotion::Free,
            angular_motion: JointMotion::Free,
            linear_drives: [JointDrive::new(0.0, 0.0, 0.0); 3],
            angular_drives: [JointDrive::new(0.0, 0.0, 0.0); 3],
            linear_limit: 0.0,
            angular_limit: 0.0,
            break_force: f64::INFINITY,
            break_torque: f64::INFINITY,
            unbreakable: false,
            anchor: Vector3::zeros(),
            connected_anchor: Vector3::zeros(),
            axis: Vector3::x(),
            target_rotation: UnitQuaternion::identity(),
        }
    }

    /// Set all three linear drives.
    pub fn set_linear_drive(&mut self, drive: JointDrive) {
        self.linear_drives = [drive; 3];
    }

    /// Set all three angular drives.
    pub fn set_angular_drive(&mut self, drive: JointDrive) {
        self.angular_drives = [drive; 3];
    }

    /// Drive on the linear X axis, representative of all linear axes.
    #[must_use]
    pub fn linear_drive(&self) -> JointDrive {
        self.linear_drives[0]
    }

    /// Drive on the angular X axis, representative of all angular axes.
    #[must_use]
    pub fn angular_drive(&self) -> JointDrive {
        self.angular_drives[0]
    }

    /// Check whether this joint links `body` in either direction.
    #[must_use]
    pub fn connects(&self, body: BodyId) -> bool {
        self.owner == body || self.target == Some(body)
    }

    /// Check whether the host created this joint.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.origin == JointOrigin::Primary
    }

    /// Check whether this joint anchors its owner to the world.
    #[must_use]
    pub fn is_ground(&self) -> bool {
        self.target.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_min() {
        let a = JointDrive::new(10.0, 5.0, 1.0);
        let b = JointDrive::new(3.0, 8.0, 0.5);
        assert_eq!(a.min(b), JointDrive::new(3.0, 5.0, 0.5));
        assert_eq!(JointDrive::unbounded().min(a), a);
    }

    #[test]
    fn test_primary_joint() {
        let joint = Joint::primary(BodyId::new(2), BodyId::new(1), 50.0, 60.0);
        assert!(joint.is_primary());
        assert!(joint.connects(BodyId::new(1)));
        assert!(joint.connects(BodyId::new(2)));
        assert!(!joint.connects(BodyId::new(3)));
        assert_eq!(joint.angular_drive().spring, HOST_ANGULAR_SPRING);
    }

    #[test]
    fn test_world_anchored_joint() {
        let mut joint = Joint::synthesized(BodyId::new(7), None);
        joint.set_linear_drive(JointDrive::new(1.0, 2.0, 3.0));
        assert!(!joint.is_primary());
        assert!(joint.connects(BodyId::new(7)));
        assert_eq!(joint.linear_drives[2].damper, 3.0);
        assert_eq!(joint.linear_motion, JointMotion::Free);
    }

    #[test]
    fn test_ground_joint() {
        let joint = Joint::ground(BodyId::new(4), f64::MAX, f64::MAX);
        assert!(joint.is_ground());
        assert!(joint.is_primary());
        assert_eq!(joint.angular_motion, JointMotion::Locked);
    }
}
