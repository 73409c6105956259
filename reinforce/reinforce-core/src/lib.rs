//! Joint reinforcement and topology augmentation engine.
//!
//! This crate strengthens the joints of tree-structured rigid-body
//! assemblies and adds synthesized joints where the tree alone is too weak.
//! It builds on [`reinforce_types`] for the data structures.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ReinforcementManager                        │
//! │  Lifecycle events → debounced per-tree passes               │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!          ┌────────────────┼─────────────────┐
//!          ▼                ▼                 ▼
//! ┌────────────────┐ ┌──────────────┐ ┌──────────────────┐
//! │ Strength       │ │ Inversions   │ │ Augmenter        │
//! │ primary joints │ │ heavy over   │ │ parent-skip and  │
//! │ from contact   │ │ light chains │ │ endpoint ring    │
//! └───────┬────────┘ └──────┬───────┘ └────────┬─────────┘
//!         │                 │                  │
//!         ▼                 ▼                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Assembly  ·  Topology walks  ·  JointTracker         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. The host engine
//! mirrors its bodies into an [`Assembly`], forwards lifecycle events to a
//! [`ReinforcementManager`] and calls [`ReinforcementManager::fixed_update`]
//! once per physics step.
//!
//! # Quick Start
//!
//! ```
//! use reinforce_core::{Assembly, JointReason, ReinforcementManager};
//! use reinforce_types::{Body, ReinforceConfig};
//!
//! let mut assembly = Assembly::new();
//! let base = assembly.add_root(Body::new("base", 10.0));
//! let mid = assembly.attach(base, Body::new("adapter", 0.1)).unwrap();
//! let payload = assembly.attach(mid, Body::new("payload", 5.0)).unwrap();
//! let tree = assembly.tree_of(base).unwrap();
//!
//! let mut manager = ReinforcementManager::new(ReinforceConfig::default()).unwrap();
//! let report = manager.run_pass(&mut assembly, tree).unwrap();
//! assert!(report.inversions_resolved >= 1);
//!
//! // The heavy payload is now held directly by the base.
//! let tracked = manager.tracker().joints_of(payload);
//! assert!(tracked
//!     .iter()
//!     .any(|t| manager.reason_for(t.joint) == JointReason::ReinforceInversions));
//! ```
//!
//! # Idempotence
//!
//! Every pass starts by destroying the joints it built before, so running it
//! again on an unchanged tree yields the same joints and the same primary
//! joint parameters.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::missing_errors_doc,        // Error docs added where non-obvious
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod assembly;
mod augment;
mod builder;
pub mod geometry;
mod inversion;
mod manager;
mod strength;
pub mod topology;
mod tracker;

pub use assembly::{Assembly, Tree};
pub use augment::{AugmentReport, Augmenter, BridgeOutcome};
pub use builder::JointBuilder;
pub use geometry::Footprint;
pub use inversion::{ChainStrength, InversionResolver, InversionSweep, Solution, overall_strength};
pub use manager::{PassReport, ReinforcementManager, TreeEvent};
pub use strength::{
    JointStrength, SharedNode, StrengthCalculator, calculate_shadow_strength, shared_node,
};
pub use topology::{
    BridgePath, RootEndpoints, find_roots_and_endpoints, link_set, link_set_conditional,
    link_set_difference,
};
pub use tracker::{JointReason, JointTracker, TrackedJoint};

// Re-export key types from reinforce-types for convenience
pub use reinforce_types::{
    Body, BodyId, Joint, JointDrive, JointId, ReinforceConfig, ReinforceError, TreeId,
};
