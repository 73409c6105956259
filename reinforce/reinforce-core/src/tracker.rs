//! Ownership ledger for synthesized joints.
//!
//! Every synthesized joint is registered on each body it spans: its two
//! endpoints as *direct* participants and every body on the path between
//! them as *indirect* ones. Removing any participant (destruction,
//! decoupling) then finds and destroys the joint with a single lookup.
//!
//! The per-body lists and the per-joint record are always updated together:
//! destroying a joint through the tracker removes it from every participant.
//! Joints the host destroys on its own (breakage) are pruned lazily the next
//! time their body is touched.

use hashbrown::HashMap;
use reinforce_types::{Body, BodyId, JointId, TreeId};
use tracing::debug;

use crate::assembly::Assembly;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why a joint exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointReason {
    /// Not created by the engine (host joints, unknown joints).
    #[default]
    None,
    /// Bypass for a mass inversion.
    ReinforceInversions,
    /// Extra stability joint between distant bodies.
    ExtraStabilityJoint,
    /// Launch clamp anchored to what it holds.
    ReinforceLaunchClamp,
}

/// A joint as seen from one participating body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackedJoint {
    /// The joint.
    pub joint: JointId,
    /// Whether the body is one of the joint's endpoints.
    pub direct: bool,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct BodyEntry {
    /// Tree the body belonged to at registration.
    tree: TreeId,
    joints: Vec<TrackedJoint>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct JointRecord {
    reason: JointReason,
    participants: Vec<BodyId>,
}

/// Maps bodies to the synthesized joints touching them, and joints to the
/// reason they exist.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointTracker {
    bodies: HashMap<BodyId, BodyEntry>,
    joints: HashMap<JointId, JointRecord>,
}

impl JointTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked joints.
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Number of bodies with at least one registration.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Check whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Record that `joint` spans `body`.
    ///
    /// Joints of `body` that no longer exist in the assembly are pruned
    /// first. The reason is kept from the first registration of a joint.
    pub fn register(
        &mut self,
        assembly: &Assembly,
        body: BodyId,
        joint: JointId,
        direct: bool,
        reason: JointReason,
    ) {
        let Some(tree) = assembly.tree_of(body) else {
            debug!(body = %body, joint = %joint, "not registering joint on unknown body");
            return;
        };

        self.prune_stale(assembly, body);

        let entry = self.bodies.entry(body).or_insert_with(|| BodyEntry {
            tree,
            joints: Vec::new(),
        });
        let tracked = TrackedJoint { joint, direct };
        if !entry.joints.contains(&tracked) {
            entry.joints.push(tracked);
        }

        let record = self.joints.entry(joint).or_insert_with(|| JointRecord {
            reason,
            participants: Vec::new(),
        });
        if !record.participants.contains(&body) {
            record.participants.push(body);
        }
    }

    /// Check whether a live joint already links `a` and `b` directly.
    ///
    /// Only registrations where `a` is an endpoint count. Joint ends are
    /// compared by rigid body handle, so a body without one is never linked.
    #[must_use]
    pub fn check_direct(&self, assembly: &Assembly, a: BodyId, b: BodyId) -> bool {
        if a == b {
            return false;
        }
        let Some(entry) = self.bodies.get(&a) else {
            return false;
        };
        let handle_of = |id: BodyId| assembly.body(id).and_then(Body::rigid_handle);
        let Some(handle) = handle_of(b) else {
            return false;
        };
        entry.joints.iter().filter(|t| t.direct).any(|t| {
            assembly.joint(t.joint).is_some_and(|j| {
                handle_of(j.owner) == Some(handle) || j.target.and_then(handle_of) == Some(handle)
            })
        })
    }

    /// Why `joint` exists; [`JointReason::None`] for joints not tracked here.
    #[must_use]
    pub fn reason_for(&self, joint: JointId) -> JointReason {
        self.joints.get(&joint).map_or(JointReason::None, |r| r.reason)
    }

    /// Registrations of `body`.
    #[must_use]
    pub fn joints_of(&self, body: BodyId) -> &[TrackedJoint] {
        self.bodies
            .get(&body)
            .map(|e| e.joints.as_slice())
            .unwrap_or_default()
    }

    /// Iterate over tracked joints and their reasons.
    pub fn joints(&self) -> impl Iterator<Item = (JointId, JointReason)> + '_ {
        self.joints.iter().map(|(id, r)| (*id, r.reason))
    }

    /// Destroy every tracked joint touching a body of `tree`.
    ///
    /// A body counts as part of the tree if it was registered under it or
    /// currently belongs to it. Returns the number of joints destroyed.
    pub fn remove_all_for_tree(&mut self, assembly: &mut Assembly, tree: TreeId) -> usize {
        let members: Vec<BodyId> = self
            .bodies
            .iter()
            .filter(|(id, entry)| entry.tree == tree || assembly.tree_of(**id) == Some(tree))
            .map(|(id, _)| *id)
            .collect();

        let removed: usize = members
            .into_iter()
            .map(|body| self.remove_part_joints(assembly, body))
            .sum();
        if removed > 0 {
            debug!(tree = %tree, joints = removed, "tree joints removed");
        }
        removed
    }

    /// Destroy every tracked joint touching `body`.
    ///
    /// Returns the number of joints destroyed.
    pub fn remove_part_joints(&mut self, assembly: &mut Assembly, body: BodyId) -> usize {
        let Some(entry) = self.bodies.remove(&body) else {
            return 0;
        };

        let mut removed = 0;
        for tracked in entry.joints {
            if self.destroy_joint(assembly, tracked.joint) {
                removed += 1;
            }
        }
        removed
    }

    /// Forget everything without touching the assembly.
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.joints.clear();
    }

    /// Destroy one joint and unregister it from all participants.
    ///
    /// Returns whether the joint was still tracked.
    fn destroy_joint(&mut self, assembly: &mut Assembly, joint: JointId) -> bool {
        let Some(record) = self.joints.remove(&joint) else {
            return false;
        };
        if let Err(e) = assembly.destroy_joint(joint) {
            debug!(joint = %joint, error = %e, "tracked joint already gone");
        }

        for body in record.participants {
            if let Some(entry) = self.bodies.get_mut(&body) {
                entry.joints.retain(|t| t.joint != joint);
                if entry.joints.is_empty() {
                    self.bodies.remove(&body);
                }
            }
        }
        true
    }

    fn prune_stale(&mut self, assembly: &Assembly, body: BodyId) {
        let Some(entry) = self.bodies.get_mut(&body) else {
            return;
        };
        let mut stale = Vec::new();
        entry.joints.retain(|t| {
            let live = assembly.contains_joint(t.joint);
            if !live {
                stale.push(t.joint);
            }
            live
        });

        for joint in stale {
            if let Some(record) = self.joints.remove(&joint) {
                for other in record.participants {
                    if let Some(entry) = self.bodies.get_mut(&other) {
                        entry.joints.retain(|t| t.joint != joint);
                    }
                }
            }
        }
        self.bodies.retain(|id, e| *id == body || !e.joints.is_empty());
    }
}
