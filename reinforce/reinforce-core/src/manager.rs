//! Per-tree reinforcement lifecycle.
//!
//! The [`ReinforcementManager`] reacts to host lifecycle events and runs
//! one reinforcement pass per tree on the next fixed step after the tree
//! changed. A pass tears down every joint it built earlier for the tree and
//! builds a fresh set:
//!
//! 1. Primary joints are strengthened ([`StrengthCalculator`]).
//! 2. Launch clamps are made unbreakable and tied to their parent.
//! 3. Mass inversions are bridged ([`InversionResolver`]).
//! 4. Extra stability joints are added ([`Augmenter`]).
//!
//! # Example
//!
//! ```
//! use reinforce_core::{Assembly, ReinforcementManager, TreeEvent};
//! use reinforce_types::{Body, ReinforceConfig};
//!
//! let mut assembly = Assembly::new();
//! let root = assembly.add_root(Body::new("base", 10.0));
//! assembly.attach(root, Body::new("top", 2.0)).unwrap();
//! let tree = assembly.tree_of(root).unwrap();
//!
//! let mut manager = ReinforcementManager::new(ReinforceConfig::default()).unwrap();
//! manager.handle_event(&mut assembly, TreeEvent::OffRails(tree));
//! assert!(manager.is_pending(tree));
//!
//! let reports = manager.fixed_update(&mut assembly);
//! assert_eq!(reports.len(), 1);
//! assert!(manager.is_reinforced(tree));
//! ```

use hashbrown::HashSet;
use reinforce_types::{BodyId, JointId, ReinforceConfig, ReinforceError, TreeId};
use tracing::{debug, error, info, warn};

use crate::assembly::Assembly;
use crate::augment::{AugmentReport, Augmenter};
use crate::builder::JointBuilder;
use crate::inversion::InversionResolver;
use crate::strength::StrengthCalculator;
use crate::tracker::{JointReason, JointTracker};

/// Crash tolerance multiplier while a tree is being eased onto the ground.
const EASING_CRASH_TOLERANCE_FACTOR: f64 = 10_000.0;

/// Launch clamps never weigh less than this share of their parent.
const CLAMP_MASS_SHARE: f64 = 0.01;

/// Host lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    /// A tree came into existence.
    Created(TreeId),
    /// Bodies were added to or removed from a tree.
    Modified(TreeId),
    /// A tree ceased to exist.
    Destroyed(TreeId),
    /// A tree started being simulated.
    OffRails(TreeId),
    /// A tree stopped being simulated.
    OnRails(TreeId),
    /// The host started settling a tree onto the ground.
    EaseStart(TreeId),
    /// The host finished settling a tree.
    EaseStop(TreeId),
    /// A robotic body is about to lock or unlock its joint.
    RoboticLockChanging(BodyId),
    /// A body is about to be removed.
    PartRemoved(BodyId),
    /// Construction mode opened (`true`) or closed (`false`).
    ConstructionMode(bool),
    /// A body was attached during construction.
    ConstructionPartAttached {
        /// Tree receiving the body.
        tree: TreeId,
        /// Attached body.
        body: BodyId,
    },
    /// A body was detached during construction.
    ConstructionPartDetached {
        /// Tree losing the body.
        tree: TreeId,
        /// Detached body.
        body: BodyId,
    },
}

/// Outcome of one reinforcement pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// Tree the pass ran on.
    pub tree: TreeId,
    /// Synthesized joints created.
    pub joints_built: usize,
    /// Requested bridges that were already in place.
    pub joints_reused: usize,
    /// Primary joints tuned.
    pub primary_joints_reinforced: usize,
    /// Inversion joints created.
    pub inversions_resolved: usize,
}

impl PassReport {
    /// Empty report for `tree`.
    #[must_use]
    pub fn new(tree: TreeId) -> Self {
        Self {
            tree,
            joints_built: 0,
            joints_reused: 0,
            primary_joints_reinforced: 0,
            inversions_resolved: 0,
        }
    }

    fn absorb(&mut self, report: AugmentReport) {
        self.joints_built += report.built;
        self.joints_reused += report.reused;
    }
}

/// Event-driven orchestrator of reinforcement passes.
#[derive(Debug, Clone)]
pub struct ReinforcementManager {
    config: ReinforceConfig,
    tracker: JointTracker,
    /// Trees scheduled for the next fixed step, in request order.
    pending: Vec<TreeId>,
    /// Trees a pass has run on since their last teardown.
    reinforced: HashSet<TreeId>,
    /// Trees currently being eased.
    easing: HashSet<TreeId>,
    /// Trees touched while construction mode is open.
    constructing: Vec<TreeId>,
    construction_open: bool,
}

impl ReinforcementManager {
    /// Create a manager with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ReinforceConfig) -> reinforce_types::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tracker: JointTracker::new(),
            pending: Vec::new(),
            reinforced: HashSet::new(),
            easing: HashSet::new(),
            constructing: Vec::new(),
            construction_open: false,
        })
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ReinforceConfig {
        &self.config
    }

    /// Get the joint tracker.
    #[must_use]
    pub fn tracker(&self) -> &JointTracker {
        &self.tracker
    }

    /// Why `joint` was built; [`JointReason::None`] for host joints.
    #[must_use]
    pub fn reason_for(&self, joint: JointId) -> JointReason {
        self.tracker.reason_for(joint)
    }

    /// Whether a pass is scheduled for `tree`.
    #[must_use]
    pub fn is_pending(&self, tree: TreeId) -> bool {
        self.pending.contains(&tree)
    }

    /// Whether a pass has run on `tree` since its last teardown.
    #[must_use]
    pub fn is_reinforced(&self, tree: TreeId) -> bool {
        self.reinforced.contains(&tree)
    }

    /// Whether `tree` is being eased.
    #[must_use]
    pub fn is_easing(&self, tree: TreeId) -> bool {
        self.easing.contains(&tree)
    }

    /// Whether construction mode is open.
    #[must_use]
    pub fn is_constructing(&self) -> bool {
        self.construction_open
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// React to a host lifecycle event.
    pub fn handle_event(&mut self, assembly: &mut Assembly, event: TreeEvent) {
        debug!(?event, "tree event");
        match event {
            TreeEvent::Created(tree) => {
                self.teardown(assembly, tree);
            }
            TreeEvent::Modified(tree) => self.notify_tree_modified(assembly, tree),
            TreeEvent::Destroyed(tree) => {
                self.teardown(assembly, tree);
                self.easing.remove(&tree);
                self.pending.retain(|t| *t != tree);
            }
            TreeEvent::OffRails(tree) => {
                if !assembly.is_eva_tree(tree) {
                    self.schedule(tree);
                }
            }
            TreeEvent::OnRails(tree) => {
                if self.reinforced.contains(&tree) {
                    self.teardown(assembly, tree);
                }
            }
            TreeEvent::EaseStart(tree) => self.ease_start(assembly, tree),
            TreeEvent::EaseStop(tree) => self.ease_stop(assembly, tree),
            TreeEvent::RoboticLockChanging(body) => {
                if let Some(tree) = assembly.tree_of(body) {
                    self.notify_tree_modified(assembly, tree);
                }
            }
            TreeEvent::PartRemoved(body) => {
                self.tracker.remove_part_joints(assembly, body);
            }
            TreeEvent::ConstructionMode(open) => {
                self.construction_open = open;
                if !open {
                    for tree in std::mem::take(&mut self.constructing) {
                        self.notify_tree_modified(assembly, tree);
                    }
                }
            }
            TreeEvent::ConstructionPartAttached { tree, .. } => {
                self.track_construction(tree);
            }
            TreeEvent::ConstructionPartDetached { tree, body } => {
                self.tracker.remove_part_joints(assembly, body);
                self.track_construction(tree);
            }
        }
    }

    /// Tear down `tree` and schedule a fresh pass for the next fixed step.
    ///
    /// Trees of EVA crew and trees whose root has not started are ignored.
    pub fn notify_tree_modified(&mut self, assembly: &mut Assembly, tree: TreeId) {
        let Some(root) = assembly.tree(tree).map(|t| t.root) else {
            debug!(tree = %tree, "modified tree is unknown");
            return;
        };
        if assembly.is_eva_tree(tree) {
            return;
        }
        if !assembly.body(root).is_some_and(|b| b.started) {
            debug!(tree = %tree, "root not started, modification ignored");
            return;
        }

        self.teardown(assembly, tree);
        self.schedule(tree);
    }

    /// Run every scheduled pass.
    ///
    /// Nothing runs while construction mode is open. Failed passes are
    /// logged and dropped.
    pub fn fixed_update(&mut self, assembly: &mut Assembly) -> Vec<PassReport> {
        if self.construction_open || self.pending.is_empty() {
            return Vec::new();
        }

        let mut reports = Vec::with_capacity(self.pending.len());
        for tree in std::mem::take(&mut self.pending) {
            if assembly.tree(tree).is_none() {
                debug!(tree = %tree, "scheduled tree no longer exists");
                continue;
            }
            match self.run_pass(assembly, tree) {
                Ok(report) => reports.push(report),
                Err(e) => error!(tree = %tree, error = %e, "reinforcement pass failed"),
            }
        }
        reports
    }

    // =========================================================================
    // Reinforcement Pass
    // =========================================================================

    /// Rebuild all reinforcement of `tree`.
    ///
    /// Running the pass twice on an unchanged tree produces the same joints.
    /// A body, pair or bridge that fails is logged and skipped; the rest of
    /// the pass goes on.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree does not exist.
    pub fn run_pass(
        &mut self,
        assembly: &mut Assembly,
        tree: TreeId,
    ) -> reinforce_types::Result<PassReport> {
        let root = assembly
            .tree(tree)
            .map(|t| t.root)
            .ok_or(ReinforceError::UnknownTree(tree))?;
        let mut report = PassReport::new(tree);

        self.tracker.remove_all_for_tree(assembly, tree);
        self.reinforced.remove(&tree);

        let bodies = assembly.tree_bodies(tree);
        if self.config.debug {
            for body in &bodies {
                if let Some(b) = assembly.body(*body) {
                    debug!(
                        tree = %tree,
                        body = %body,
                        name = %b.name,
                        mass = b.total_mass(),
                        physical = b.physical,
                        "tree contains"
                    );
                }
            }
        }

        let mut ran = false;

        if self.config.reinforce_attach_nodes {
            ran = true;
            let calculator = StrengthCalculator::new(&self.config);
            for body in &bodies {
                match calculator.reinforce_body(assembly, *body) {
                    Ok(tuned) => report.primary_joints_reinforced += tuned,
                    Err(e) if e.is_precondition_skip() => {
                        debug!(body = %body, error = %e, "primary joint left as is");
                    }
                    Err(e) => error!(body = %body, error = %e, "primary joint reinforcement failed"),
                }
            }
        }

        if self.config.reinforce_launch_clamps {
            ran = true;
            for body in &bodies {
                let is_clamp = assembly
                    .body(*body)
                    .is_some_and(|b| b.parent.is_some() && b.is_launch_clamp());
                if !is_clamp {
                    continue;
                }
                match self.reinforce_launch_clamp(assembly, *body) {
                    Ok(true) => report.joints_built += 1,
                    Ok(false) => {}
                    Err(e) => error!(clamp = %body, error = %e, "launch clamp not tied"),
                }
            }
        }

        if self.config.reinforce_inversions {
            ran = true;
            let resolver = InversionResolver::new(&self.config);
            let builder = JointBuilder::new(&self.config);
            for solution in resolver.resolve(assembly, root) {
                if self
                    .tracker
                    .check_direct(assembly, solution.part, solution.link)
                {
                    report.joints_reused += 1;
                    continue;
                }

                let created = builder
                    .inversion_joint(assembly, &solution)
                    .and_then(|joint| assembly.create_joint(joint));
                let id = match created {
                    Ok(id) => id,
                    Err(e) => {
                        error!(
                            body = %solution.part,
                            link = %solution.link,
                            error = %e,
                            "inversion joint not built"
                        );
                        continue;
                    }
                };
                let reason = JointReason::ReinforceInversions;
                self.tracker
                    .register(assembly, solution.part, id, true, reason);
                self.tracker
                    .register(assembly, solution.link, id, true, reason);
                for body in &solution.intermediates {
                    self.tracker.register(assembly, *body, id, false, reason);
                }
                report.joints_built += 1;
                report.inversions_resolved += 1;
            }
        }

        if self.config.extra_joints_enabled() {
            ran = true;
            let augmenter = Augmenter::new(&self.config);
            if self.config.parent_skip_enabled() {
                report.absorb(augmenter.parent_skip(assembly, &mut self.tracker, tree));
            }
            report.absorb(augmenter.endpoint_ring(assembly, &mut self.tracker, tree));
        }

        if ran {
            self.reinforced.insert(tree);
        }

        info!(
            tree = %tree,
            built = report.joints_built,
            reused = report.joints_reused,
            primary = report.primary_joints_reinforced,
            inversions = report.inversions_resolved,
            "tree reinforced"
        );
        Ok(report)
    }

    /// Make a launch clamp unbreakable and tie it to its parent.
    ///
    /// Returns whether a joint was built.
    fn reinforce_launch_clamp(
        &mut self,
        assembly: &mut Assembly,
        clamp: BodyId,
    ) -> reinforce_types::Result<bool> {
        let Some(parent) = assembly.parent_of(clamp) else {
            return Ok(false);
        };
        let floor = assembly.total_mass(parent) * CLAMP_MASS_SHARE;
        if let Some(b) = assembly.body_mut(clamp) {
            b.breaking_force = f64::INFINITY;
            b.breaking_torque = f64::INFINITY;
            b.mass = b.mass.max(floor);
        }

        if !assembly.is_physical(parent) || self.tracker.check_direct(assembly, clamp, parent) {
            return Ok(false);
        }

        let joint = JointBuilder::new(&self.config).extra_joint(assembly, clamp, parent)?;
        let id = assembly.create_joint(joint)?;
        let reason = JointReason::ReinforceLaunchClamp;
        self.tracker.register(assembly, clamp, id, true, reason);
        self.tracker.register(assembly, parent, id, true, reason);
        debug!(clamp = %clamp, parent = %parent, joint = %id, "launch clamp tied");
        Ok(true)
    }

    // =========================================================================
    // Easing
    // =========================================================================

    fn ease_start(&mut self, assembly: &mut Assembly, tree: TreeId) {
        for body in assembly.tree_bodies(tree) {
            let Some(b) = assembly.body_mut(body) else {
                continue;
            };
            if b.is_unlockable() {
                continue;
            }
            b.crash_tolerance *= EASING_CRASH_TOLERANCE_FACTOR;
            let is_clamp = b.is_launch_clamp();
            let attach_joints = b.attach_joints.clone();
            for joint in attach_joints {
                if let Some(j) = assembly.joint_mut(joint) {
                    j.unbreakable = true;
                }
            }

            if is_clamp {
                let ground = assembly
                    .joints()
                    .find(|(_, j)| j.owner == body && j.is_ground())
                    .map(|(id, _)| id);
                if let Some(ground) = ground {
                    let replaced = assembly
                        .destroy_joint(ground)
                        .and_then(|_| assembly.create_joint(JointBuilder::ground_joint(body)));
                    if let Err(e) = replaced {
                        warn!(clamp = %body, error = %e, "ground joint not replaced");
                    }
                }
            }
        }
        self.easing.insert(tree);
    }

    fn ease_stop(&mut self, assembly: &mut Assembly, tree: TreeId) {
        if !self.easing.remove(&tree) {
            return;
        }
        for body in assembly.tree_bodies(tree) {
            let Some(b) = assembly.body_mut(body) else {
                continue;
            };
            if b.is_unlockable() {
                continue;
            }
            b.crash_tolerance /= EASING_CRASH_TOLERANCE_FACTOR;
            let attach_joints = b.attach_joints.clone();
            for joint in attach_joints {
                if let Some(j) = assembly.joint_mut(joint) {
                    j.unbreakable = false;
                }
            }
        }
        self.schedule(tree);
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn schedule(&mut self, tree: TreeId) {
        if !self.pending.contains(&tree) {
            self.pending.push(tree);
        }
    }

    fn teardown(&mut self, assembly: &mut Assembly, tree: TreeId) {
        self.tracker.remove_all_for_tree(assembly, tree);
        self.reinforced.remove(&tree);
    }

    fn track_construction(&mut self, tree: TreeId) {
        if !self.constructing.contains(&tree) {
            self.constructing.push(tree);
        }
    }
}
