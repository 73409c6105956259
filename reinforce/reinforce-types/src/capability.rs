//! Body capabilities that opt a body out of joint adjustment.
//!
//! The host attaches behaviour modules to bodies (wheels, grapples, robotic
//! hinges, ...). The reinforcement engine does not care what a module does,
//! only whether it forbids touching the body's joints. Every query has a
//! default, so an implementation overrides just what applies to it.

use std::fmt::Debug;

use nalgebra::Vector3;

/// A module attached to a body, queried uniformly by the engine.
pub trait Capability: Debug + Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// The body's joints must not be adjusted while this is attached.
    fn locks_adjustment(&self) -> bool {
        false
    }

    /// The joint can be locked and unlocked at runtime.
    ///
    /// Such bodies keep their primary joints untouched and are exempt from
    /// the easing tweaks, even while currently locked.
    fn is_unlockable(&self) -> bool {
        false
    }

    /// The body is a launch clamp holding the assembly to the ground.
    fn is_launch_clamp(&self) -> bool {
        false
    }

    /// The body is a robotic part; its children must not be adjusted.
    fn is_robotic(&self) -> bool {
        false
    }

    /// The body is a crew member on EVA.
    fn is_eva(&self) -> bool {
        false
    }

    /// Intake direction in the body's local frame, if the body is an intake.
    fn intake_direction(&self) -> Option<Vector3<f64>> {
        None
    }
}

/// A wheel; suspension joints belong to the wheel module.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wheel;

impl Capability for Wheel {
    fn name(&self) -> &str {
        "wheel"
    }

    fn locks_adjustment(&self) -> bool {
        true
    }
}

/// A grappling device.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grapple;

impl Capability for Grapple {
    fn name(&self) -> &str {
        "grapple"
    }

    fn locks_adjustment(&self) -> bool {
        true
    }
}

/// A crew member on EVA.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eva;

impl Capability for Eva {
    fn name(&self) -> &str {
        "eva"
    }

    fn locks_adjustment(&self) -> bool {
        true
    }

    fn is_eva(&self) -> bool {
        true
    }
}

/// A launch clamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchClamp;

impl Capability for LaunchClamp {
    fn name(&self) -> &str {
        "launch clamp"
    }

    fn locks_adjustment(&self) -> bool {
        true
    }

    fn is_launch_clamp(&self) -> bool {
        true
    }
}

/// A robotic hinge, piston, or rotor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoboticServo;

impl Capability for RoboticServo {
    fn name(&self) -> &str {
        "robotic servo"
    }

    fn is_robotic(&self) -> bool {
        true
    }
}

/// A joint that can be locked and unlocked at runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct JointLock {
    /// Current state; adjustment is forbidden while unlocked.
    pub unlocked: bool,
}

impl Capability for JointLock {
    fn name(&self) -> &str {
        "joint lock"
    }

    fn locks_adjustment(&self) -> bool {
        self.unlocked
    }

    fn is_unlockable(&self) -> bool {
        true
    }
}

/// Explicitly excludes a body from reinforcement.
#[derive(Debug, Clone, Copy, Default)]
pub struct Excluded;

impl Capability for Excluded {
    fn name(&self) -> &str {
        "excluded"
    }

    fn locks_adjustment(&self) -> bool {
        true
    }

    fn is_unlockable(&self) -> bool {
        true
    }
}

/// An air intake.
#[derive(Debug, Clone, Copy)]
pub struct Intake {
    /// Intake direction in the body's local frame.
    pub direction: Vector3<f64>,
}

impl Capability for Intake {
    fn name(&self) -> &str {
        "intake"
    }

    fn intake_direction(&self) -> Option<Vector3<f64>> {
        Some(self.direction)
    }
}
