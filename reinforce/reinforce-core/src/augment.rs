//! Extra stability joints.
//!
//! Two passes add free-motion spring joints on top of the primary chain:
//!
//! - **Parent-skip** (level 3 only): every physical body is bridged to the
//!   first ancestor beyond its parent whose mass is comparable to its own.
//! - **Endpoint ring**: within each physically rooted subtree, endpoints
//!   are joined to their ring successor, to the endpoint opposite them, and
//!   to the subtree root.
//!
//! A bridge is skipped when the two bodies are already linked directly,
//! whether by a tracked joint or by a primary joint.

use reinforce_types::{BodyId, JointId, ReinforceConfig, TreeId};
use tracing::{debug, error};

use crate::assembly::Assembly;
use crate::builder::JointBuilder;
use crate::topology::{
    find_roots_and_endpoints, link_set, link_set_conditional, link_set_difference,
};
use crate::tracker::{JointReason, JointTracker};

/// What happened to a requested bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// A new joint was built and registered.
    Built(JointId),
    /// A direct joint already links the two bodies.
    Reused,
    /// The bodies cannot be bridged.
    Skipped,
}

/// Joint counts of an augmentation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AugmentReport {
    /// Joints built.
    pub built: usize,
    /// Bridges already in place.
    pub reused: usize,
}

impl AugmentReport {
    /// Count one outcome.
    pub fn record(&mut self, outcome: BridgeOutcome) {
        match outcome {
            BridgeOutcome::Built(_) => self.built += 1,
            BridgeOutcome::Reused => self.reused += 1,
            BridgeOutcome::Skipped => {}
        }
    }
}

/// Builds and registers extra stability joints.
#[derive(Debug, Clone, Copy)]
pub struct Augmenter<'a> {
    config: &'a ReinforceConfig,
    builder: JointBuilder<'a>,
}

impl<'a> Augmenter<'a> {
    /// Create an augmenter for the given configuration.
    #[must_use]
    pub fn new(config: &'a ReinforceConfig) -> Self {
        Self {
            config,
            builder: JointBuilder::new(config),
        }
    }

    /// Bridge `part` and `link` with an extra joint.
    ///
    /// Every body on the path between them is registered as an indirect
    /// participant.
    ///
    /// # Errors
    ///
    /// Returns an error if a body is missing.
    pub fn bridge(
        &self,
        assembly: &mut Assembly,
        tracker: &mut JointTracker,
        part: BodyId,
        link: BodyId,
        reason: JointReason,
    ) -> reinforce_types::Result<BridgeOutcome> {
        if tracker.check_direct(assembly, part, link)
            || assembly.has_primary_joint_between(part, link)
        {
            return Ok(BridgeOutcome::Reused);
        }

        let set1 = link_set_conditional(assembly, part);
        let set2 = link_set_conditional(assembly, link);
        let Some(path) = link_set_difference(&set1, &set2) else {
            debug!(part = %part, link = %link, "no common root, bridge skipped");
            return Ok(BridgeOutcome::Skipped);
        };

        let joint = self.builder.extra_joint(assembly, part, link)?;
        let id = assembly.create_joint(joint)?;
        register(assembly, tracker, id, part, link, path.intermediates(), reason);
        Ok(BridgeOutcome::Built(id))
    }

    /// Bridge physical bodies to the first ancestor beyond their parent
    /// whose mass is within `parent_skip_mass_ratio` of theirs.
    ///
    /// A bridge that cannot be built is logged and skipped.
    pub fn parent_skip(
        &self,
        assembly: &mut Assembly,
        tracker: &mut JointTracker,
        tree: TreeId,
    ) -> AugmentReport {
        let mut report = AugmentReport::default();

        for body in assembly.tree_bodies(tree) {
            let Some(b) = assembly.body(body) else {
                continue;
            };
            if !b.physical {
                continue;
            }
            let Some(parent) = b.parent else {
                continue;
            };
            let Some(grandparent) = assembly.parent_of(parent) else {
                continue;
            };

            let anchor = self.find_parent_skip_anchor(assembly, body, grandparent);
            if !assembly.is_physical(anchor) {
                continue;
            }
            if tracker.check_direct(assembly, body, anchor)
                || assembly.has_primary_joint_between(body, anchor)
            {
                report.record(BridgeOutcome::Reused);
                continue;
            }

            let mut crossed = link_set(assembly, parent, anchor);
            crossed.pop();

            let created = self
                .builder
                .extra_joint(assembly, body, anchor)
                .and_then(|joint| assembly.create_joint(joint));
            let id = match created {
                Ok(id) => id,
                Err(e) => {
                    error!(
                        body = %body,
                        anchor = %anchor,
                        error = %e,
                        "parent-skip joint not built"
                    );
                    continue;
                }
            };
            register(
                assembly,
                tracker,
                id,
                body,
                anchor,
                &crossed,
                JointReason::ExtraStabilityJoint,
            );
            report.record(BridgeOutcome::Built(id));
        }

        debug!(tree = %tree, built = report.built, reused = report.reused, "parent-skip joints");
        report
    }

    /// Join the endpoints of every physically rooted subtree in a ring.
    ///
    /// A bridge that cannot be built is logged and skipped.
    pub fn endpoint_ring(
        &self,
        assembly: &mut Assembly,
        tracker: &mut JointTracker,
        tree: TreeId,
    ) -> AugmentReport {
        let mut report = AugmentReport::default();
        let Some(root) = assembly.tree(tree).map(|t| t.root) else {
            return report;
        };
        if assembly.tree_bodies(tree).len() <= 1 {
            return report;
        }

        for group in find_roots_and_endpoints(assembly, root, self.config.mass_for_adjustment) {
            let endpoints = &group.endpoints;
            let n = endpoints.len();
            for (i, &part) in endpoints.iter().enumerate() {
                let next = endpoints[(i + 1) % n];
                let opposite = endpoints[(i + n / 2) % n];
                for link in [next, opposite, group.root] {
                    match self.bridge(
                        assembly,
                        tracker,
                        part,
                        link,
                        JointReason::ExtraStabilityJoint,
                    ) {
                        Ok(outcome) => report.record(outcome),
                        Err(e) => {
                            error!(
                                part = %part,
                                link = %link,
                                error = %e,
                                "endpoint joint not built"
                            );
                        }
                    }
                }
            }
        }

        debug!(tree = %tree, built = report.built, reused = report.reused, "endpoint joints");
        report
    }

    /// Walk up from `start` until an ancestor of comparable mass is found or
    /// the walk is blocked.
    fn find_parent_skip_anchor(&self, assembly: &Assembly, body: BodyId, start: BodyId) -> BodyId {
        let threshold = self.config.parent_skip_mass_ratio;
        let body_mass = assembly.body(body).map_or(0.0, |b| b.mass);
        let body_max_mass = assembly.maximum_possible_mass(body);

        let mut candidate = start;
        while let Some(c) = assembly.body(candidate) {
            if mass_ratio(body_max_mass, c.mass) <= threshold
                || mass_ratio(body_mass, c.maximum_possible_mass()) <= threshold
            {
                break;
            }
            match c.parent {
                Some(parent) if assembly.is_adjustment_allowed(candidate) => candidate = parent,
                _ => break,
            }
        }
        candidate
    }
}

/// Larger over smaller mass.
fn mass_ratio(a: f64, b: f64) -> f64 {
    if a < b { b / a } else { a / b }
}

fn register(
    assembly: &Assembly,
    tracker: &mut JointTracker,
    joint: JointId,
    part: BodyId,
    link: BodyId,
    intermediates: &[BodyId],
    reason: JointReason,
) {
    tracker.register(assembly, part, joint, true, reason);
    tracker.register(assembly, link, joint, true, reason);
    for &body in intermediates {
        tracker.register(assembly, body, joint, false, reason);
    }
}
