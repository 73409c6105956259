//! Core types for joint reinforcement of tree-structured assemblies.
//!
//! This crate provides the data the reinforcement engine works on:
//!
//! - [`Body`] - One part of an assembly: mass, tree links, attach nodes, meshes
//! - [`Joint`] - A compliant link between two bodies with drives and break thresholds
//! - [`Capability`] - Behaviour modules that opt a body out of adjustment
//! - [`ReinforceConfig`] - Strength constants, mass factors, extra joint level
//!
//! # Design Philosophy
//!
//! These types are **pure data**. Tree walks, strength estimation and joint
//! synthesis live in `reinforce-core`; the host engine owns the real bodies
//! and mirrors them into these types.
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**.
//!
//! # Coordinate System
//!
//! Bodies use the host's convention: Y is the stack (up) axis of a part,
//! attach nodes point outward in the part's local frame.
//!
//! # Example
//!
//! ```
//! use reinforce_types::{AttachNode, Body, ReinforceConfig, Vector3};
//!
//! let tank = Body::new("tank", 0.5)
//!     .with_resources(4.0, 4.0)
//!     .with_node(AttachNode::stack("top", 1, Vector3::y()));
//!
//! assert_eq!(tank.total_mass(), 4.5);
//! assert!(ReinforceConfig::default().validate().is_ok());
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod capability;
mod config;
mod error;
mod joint;

pub use body::{
    AttachMethod, AttachMode, AttachNode, Body, BodyId, MeshPart, NodeKind, RigidHandle, TreeId,
};
pub use capability::{
    Capability, Eva, Excluded, Grapple, Intake, JointLock, LaunchClamp, RoboticServo, Wheel,
};
pub use config::{ExtraJointParams, MAX_EXTRA_LEVEL, ReinforceConfig};
pub use error::ReinforceError;
pub use joint::{
    HOST_ANGULAR_SPRING, HOST_JOINT_FORCE, Joint, JointDrive, JointId, JointMotion, JointOrigin,
};

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};

/// Result type for reinforcement operations.
pub type Result<T> = std::result::Result<T, ReinforceError>;
