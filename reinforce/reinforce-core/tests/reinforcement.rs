//! End-to-end reinforcement passes driven through the manager.
//!
//! Each test builds a small assembly, feeds lifecycle events to a
//! `ReinforcementManager` and checks the joints left in the assembly.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use approx::assert_relative_eq;
use reinforce_core::{
    Assembly, JointReason, JointTracker, ReinforcementManager, TrackedJoint, TreeEvent, link_set,
    link_set_difference,
};
use reinforce_types::{AttachNode, Body, BodyId, Joint, ReinforceConfig, TreeId, Vector3};

/// Helper: core -> adapter -> payload, core -> strut -> pod, all stack-attached.
fn rocket() -> (Assembly, TreeId, [BodyId; 5]) {
    let mut assembly = Assembly::new();
    let core = assembly.add_root(
        Body::new("core", 10.0)
            .with_node(AttachNode::stack("top", 1, Vector3::y()))
            .with_node(AttachNode::stack("bottom", 1, -Vector3::y())),
    );
    let adapter = assembly
        .attach_at(core, "top", coupler("adapter", 0.1), "bottom")
        .unwrap();
    let payload = assembly
        .attach_at(
            adapter,
            "top",
            Body::new("payload", 5.0).with_node(AttachNode::stack("bottom", 1, -Vector3::y())),
            "bottom",
        )
        .unwrap();
    let strut = assembly
        .attach_at(core, "bottom", coupler("strut", 1.0), "top")
        .unwrap();
    let pod = assembly
        .attach_at(
            strut,
            "bottom",
            Body::new("pod", 1.0).with_node(AttachNode::stack("top", 1, Vector3::y())),
            "top",
        )
        .unwrap();
    let tree = assembly.tree_of(core).unwrap();
    (assembly, tree, [core, adapter, payload, strut, pod])
}

fn coupler(name: &str, mass: f64) -> Body {
    Body::new(name, mass)
        .with_node(AttachNode::stack("top", 1, Vector3::y()))
        .with_node(AttachNode::stack("bottom", 1, -Vector3::y()))
}

/// Helper: r -> a -> {e0, e1}, r -> b -> {e2, e3}.
fn four_endpoints() -> (Assembly, TreeId, BodyId, [BodyId; 4]) {
    let mut assembly = Assembly::new();
    let r = assembly.add_root(Body::new("r", 10.0));
    let a = assembly.attach(r, Body::new("a", 2.0)).unwrap();
    let e0 = assembly.attach(a, Body::new("e0", 1.0)).unwrap();
    let e1 = assembly.attach(a, Body::new("e1", 1.0)).unwrap();
    let b = assembly.attach(r, Body::new("b", 2.0)).unwrap();
    let e2 = assembly.attach(b, Body::new("e2", 1.0)).unwrap();
    let e3 = assembly.attach(b, Body::new("e3", 1.0)).unwrap();
    let tree = assembly.tree_of(r).unwrap();
    (assembly, tree, r, [e0, e1, e2, e3])
}

/// Helper: every joint in a stable order, ignoring joint IDs.
fn snapshot(assembly: &Assembly) -> Vec<Joint> {
    let mut joints: Vec<Joint> = assembly.joints().map(|(_, j)| j.clone()).collect();
    joints.sort_by(|a, b| {
        (a.owner, a.target, a.is_primary())
            .cmp(&(b.owner, b.target, b.is_primary()))
            .then(a.break_force.total_cmp(&b.break_force))
    });
    joints
}

#[test]
fn pass_is_idempotent() {
    let (mut assembly, tree, _) = rocket();
    let mut manager = ReinforcementManager::new(ReinforceConfig::default().extra_level(3)).unwrap();

    let first = manager.run_pass(&mut assembly, tree).unwrap();
    let after_first = snapshot(&assembly);
    let second = manager.run_pass(&mut assembly, tree).unwrap();
    let after_second = snapshot(&assembly);

    assert_eq!(first, second);
    assert_eq!(after_first, after_second);
    assert!(first.primary_joints_reinforced > 0);
    assert!(first.joints_built > 0);
}

#[test]
fn primary_joint_never_below_shadow_floor() {
    let mut assembly = Assembly::new();
    let hub = assembly.add_root(
        Body::new("hub", 4.0)
            .with_breaking(50.0, 40.0)
            .with_node(AttachNode::stack("bottom", 2, -Vector3::y())),
    );
    let spoke = assembly
        .attach_at(
            hub,
            "bottom",
            Body::new("spoke", 1.0)
                .with_breaking(22.0, 20.0)
                .with_node(AttachNode::stack("top", 2, Vector3::y()).with_contact_area(1e-12)),
            "top",
        )
        .unwrap();
    let tree = assembly.tree_of(hub).unwrap();

    let mut manager = ReinforcementManager::new(ReinforceConfig::default()).unwrap();
    let report = manager.run_pass(&mut assembly, tree).unwrap();
    assert_eq!(report.primary_joints_reinforced, 1);

    // (node size + 1) * stack factor * weaker stock threshold
    let joint = assembly.body(spoke).unwrap().attach_joints[0];
    let joint = assembly.joint(joint).unwrap();
    assert_relative_eq!(joint.break_force, 132.0, epsilon = 1e-9);
    assert_relative_eq!(joint.break_torque, 120.0, epsilon = 1e-9);
}

#[test]
fn inversion_joint_no_stronger_than_its_chain() {
    let (mut assembly, tree, [core, adapter, payload, ..]) = rocket();
    let mut manager = ReinforcementManager::new(ReinforceConfig::default()).unwrap();
    let report = manager.run_pass(&mut assembly, tree).unwrap();
    assert_eq!(report.inversions_resolved, 1);

    let inversion = manager
        .tracker()
        .joints_of(payload)
        .iter()
        .find(|t| t.direct && manager.reason_for(t.joint) == JointReason::ReinforceInversions)
        .unwrap()
        .joint;
    let inversion = assembly.joint(inversion).unwrap();
    assert_eq!(inversion.owner, payload);
    assert_eq!(inversion.target, Some(core));

    for body in [payload, adapter] {
        let primary = assembly.body(body).unwrap().attach_joints[0];
        let primary = assembly.joint(primary).unwrap();
        assert!(inversion.break_force <= primary.break_force);
        assert!(inversion.break_torque <= primary.break_torque);
        assert!(inversion.angular_drive().spring <= primary.angular_drive().spring);
    }

    // The adapter is crossed but not an endpoint.
    assert!(
        manager
            .tracker()
            .joints_of(adapter)
            .iter()
            .any(|t| !t.direct)
    );
}

#[test]
fn endpoint_ring_of_four() {
    let (mut assembly, tree, r, endpoints) = four_endpoints();
    let mut manager = ReinforcementManager::new(ReinforceConfig::default()).unwrap();

    let report = manager.run_pass(&mut assembly, tree).unwrap();
    assert_eq!(report.joints_built, 10);
    assert_eq!(report.joints_reused, 2);

    for e in endpoints {
        let direct = manager
            .tracker()
            .joints_of(e)
            .iter()
            .filter(|t| t.direct)
            .count();
        assert_eq!(direct, 4);
        assert!(manager.tracker().check_direct(&assembly, e, r));
    }
}

#[test]
fn teardown_restores_host_joints() {
    let (mut assembly, tree, r, endpoints) = four_endpoints();
    let host = snapshot(&assembly);
    let mut manager = ReinforcementManager::new(ReinforceConfig::default()).unwrap();

    manager.handle_event(&mut assembly, TreeEvent::OffRails(tree));
    manager.fixed_update(&mut assembly);
    assert!(assembly.joint_count() > host.len());

    manager.handle_event(&mut assembly, TreeEvent::OnRails(tree));
    assert_eq!(snapshot(&assembly), host);
    assert!(manager.tracker().is_empty());
    for e in endpoints {
        assert!(!manager.tracker().check_direct(&assembly, e, r));
    }
}

#[test]
fn removed_part_takes_its_joints() {
    let (mut assembly, tree, _, [e0, e1, ..]) = four_endpoints();
    let mut manager = ReinforcementManager::new(ReinforceConfig::default()).unwrap();
    manager.run_pass(&mut assembly, tree).unwrap();
    let tracked: Vec<_> = manager
        .tracker()
        .joints_of(e0)
        .iter()
        .map(|t| t.joint)
        .collect();
    assert_eq!(tracked.len(), 4);

    manager.handle_event(&mut assembly, TreeEvent::PartRemoved(e0));
    assert!(tracked.iter().all(|j| !assembly.contains_joint(*j)));
    assert!(manager.tracker().joints_of(e0).is_empty());
    assert!(
        manager
            .tracker()
            .joints_of(e1)
            .iter()
            .all(|t| assembly.contains_joint(t.joint))
    );
}

#[test]
fn modifications_are_debounced() {
    let (mut assembly, tree, _, _) = four_endpoints();
    let mut manager = ReinforcementManager::new(ReinforceConfig::default()).unwrap();

    manager.handle_event(&mut assembly, TreeEvent::OffRails(tree));
    manager.handle_event(&mut assembly, TreeEvent::Modified(tree));
    manager.handle_event(&mut assembly, TreeEvent::Modified(tree));

    let reports = manager.fixed_update(&mut assembly);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].joints_built, 10);
    assert!(manager.fixed_update(&mut assembly).is_empty());
}

#[test]
fn construction_mode_defers_passes() {
    let (mut assembly, tree, _, [e0, ..]) = four_endpoints();
    let mut manager = ReinforcementManager::new(ReinforceConfig::default()).unwrap();
    manager.run_pass(&mut assembly, tree).unwrap();

    manager.handle_event(&mut assembly, TreeEvent::ConstructionMode(true));
    manager.handle_event(
        &mut assembly,
        TreeEvent::ConstructionPartDetached { tree, body: e0 },
    );
    assert!(manager.tracker().joints_of(e0).is_empty());

    manager.handle_event(&mut assembly, TreeEvent::Modified(tree));
    assert!(manager.fixed_update(&mut assembly).is_empty());

    manager.handle_event(&mut assembly, TreeEvent::ConstructionMode(false));
    let reports = manager.fixed_update(&mut assembly);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].tree, tree);
}

#[test]
fn bridge_path_runs_through_common_ancestor() {
    let (assembly, _, [core, adapter, payload, strut, pod]) = rocket();
    let set1 = link_set(&assembly, payload, core);
    let set2 = link_set(&assembly, pod, core);

    let path = link_set_difference(&set1, &set2).unwrap();
    assert_eq!(path.bodies, vec![payload, adapter, core, strut, pod]);
    assert_eq!(path.ancestor(), core);
    assert_eq!(path.intermediates(), &[adapter, core, strut]);

    // A body and its own parent need no bridge.
    let parent = link_set(&assembly, adapter, core);
    assert!(link_set_difference(&set1, &parent).is_none());
}

#[test]
fn destroyed_tree_forgets_its_state() {
    let (mut assembly, tree, _, [e0, ..]) = four_endpoints();
    let mut manager = ReinforcementManager::new(ReinforceConfig::default()).unwrap();
    manager.run_pass(&mut assembly, tree).unwrap();
    manager.handle_event(&mut assembly, TreeEvent::EaseStart(tree));
    manager.handle_event(&mut assembly, TreeEvent::OffRails(tree));
    assert!(manager.is_reinforced(tree));
    assert!(manager.is_easing(tree));
    assert!(manager.is_pending(tree));

    manager.handle_event(&mut assembly, TreeEvent::Destroyed(tree));
    assert!(!manager.is_reinforced(tree));
    assert!(!manager.is_easing(tree));
    assert!(!manager.is_pending(tree));
    assert!(manager.tracker().is_empty());
    assert!(manager.tracker().joints_of(e0).is_empty());
    assert!(manager.fixed_update(&mut assembly).is_empty());

    // Easing state went with the tree.
    manager.handle_event(&mut assembly, TreeEvent::EaseStop(tree));
    assert!(!manager.is_pending(tree));
}

#[test]
fn broken_joint_is_pruned_on_next_registration() {
    let (mut assembly, _, r, [e0, ..]) = four_endpoints();
    let mut tracker = JointTracker::new();
    let reason = JointReason::ExtraStabilityJoint;

    let broken = assembly
        .create_joint(Joint::synthesized(e0, Some(r)))
        .unwrap();
    tracker.register(&assembly, e0, broken, true, reason);
    tracker.register(&assembly, r, broken, true, reason);

    // The host breaks the joint without telling the tracker.
    assembly.destroy_joint(broken).unwrap();
    assert_eq!(tracker.joint_count(), 1);
    assert!(!tracker.check_direct(&assembly, e0, r));

    let replacement = assembly
        .create_joint(Joint::synthesized(e0, Some(r)))
        .unwrap();
    tracker.register(&assembly, e0, replacement, true, reason);

    assert_eq!(
        tracker.joints_of(e0),
        &[TrackedJoint {
            joint: replacement,
            direct: true
        }]
    );
    assert!(tracker.joints_of(r).is_empty());
    assert_eq!(tracker.joint_count(), 1);
    assert_eq!(tracker.reason_for(broken), JointReason::None);
    assert_eq!(tracker.reason_for(replacement), reason);
}

#[test]
fn broken_chain_only_drops_its_own_inversion() {
    // r -> light -> heavy, twice; one heavy body has lost its primary joint.
    let mut assembly = Assembly::new();
    let r = assembly.add_root(Body::new("r", 10.0));
    let a = assembly.attach(r, Body::new("a", 0.1)).unwrap();
    let cut = assembly.attach(a, Body::new("cut", 5.0)).unwrap();
    let b = assembly.attach(r, Body::new("b", 0.1)).unwrap();
    let whole = assembly.attach(b, Body::new("whole", 5.0)).unwrap();
    let tree = assembly.tree_of(r).unwrap();

    let primary = assembly.body(cut).unwrap().attach_joints[0];
    assembly.destroy_joint(primary).unwrap();

    let mut manager = ReinforcementManager::new(ReinforceConfig::default()).unwrap();
    let report = manager.run_pass(&mut assembly, tree).unwrap();
    assert_eq!(report.inversions_resolved, 1);
    assert!(report.joints_built > report.inversions_resolved);
    assert!(manager.is_reinforced(tree));

    let inversion_of = |body: BodyId| {
        manager
            .tracker()
            .joints_of(body)
            .iter()
            .find(|t| t.direct && manager.reason_for(t.joint) == JointReason::ReinforceInversions)
            .map(|t| t.joint)
    };
    assert!(inversion_of(cut).is_none());
    let joint = inversion_of(whole).unwrap();
    assert_eq!(assembly.joint(joint).unwrap().target, Some(r));
}
