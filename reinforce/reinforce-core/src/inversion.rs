//! Mass inversion detection and resolution.
//!
//! A joint chain is only as stiff as its softest link, and the solver
//! handles a heavy body hanging off a much lighter one badly. An
//! *inversion* is a body heavier than `inversion_mass_factor` times a
//! physical ancestor it depends on. It is resolved by bridging the body to
//! an ancestor heavy enough to anchor it, or failing that, to a heavy body
//! elsewhere in the tree.
//!
//! # Algorithm
//!
//! 1. Sweep the tree depth-first; every physical body heavy enough to be
//!    adjusted is checked for an inversion.
//! 2. On an inversion, keep climbing and track the heaviest ancestor. Accept
//!    it once it outweighs the body, or at the top if it comes within
//!    `solution_mass_factor`.
//! 3. Bodies left unresolved search the tree (outside their own subtree)
//!    for candidates, build a path to each through the lowest common
//!    ancestor, and pick one.
//!
//! A solution never gets stronger than the weakest primary joint it runs
//! parallel to.

use reinforce_types::{BodyId, Joint, JointDrive, ReinforceConfig, ReinforceError};
use tracing::{debug, error};

use crate::assembly::Assembly;
use crate::topology::{link_set, link_set_difference};

/// Mass ratio above which an uneven chain makes the solver soft.
const SOFT_CHAIN_RATIO: f64 = 5.0;

/// Minimum of drive and break parameters along a primary joint chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainStrength {
    /// Weakest linear drive.
    pub linear: JointDrive,
    /// Weakest angular drive.
    pub angular: JointDrive,
    /// Lowest break force.
    pub break_force: f64,
    /// Lowest break torque.
    pub break_torque: f64,
}

impl Default for ChainStrength {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl ChainStrength {
    /// Strength of an empty chain: every parameter infinite.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            linear: JointDrive::unbounded(),
            angular: JointDrive::unbounded(),
            break_force: f64::INFINITY,
            break_torque: f64::INFINITY,
        }
    }

    /// Fold one joint into the chain.
    pub fn absorb(&mut self, joint: &Joint) {
        self.linear = self.linear.min(joint.linear_drive());
        self.angular = self.angular.min(joint.angular_drive());
        self.break_force = self.break_force.min(joint.break_force);
        self.break_torque = self.break_torque.min(joint.break_torque);
    }

    /// Scale both break thresholds.
    pub fn scale_breaking(&mut self, factor: f64) {
        self.break_force *= factor;
        self.break_torque *= factor;
    }
}

/// A bypass joint to build for an inversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// The inverted body; owner of the joint.
    pub part: BodyId,
    /// The anchor body.
    pub link: BodyId,
    /// Lowest common ancestor of `part` and `link`.
    pub ancestor: BodyId,
    /// Bodies between `part` and `link` that must know about the joint.
    pub intermediates: Vec<BodyId>,
    /// Drive and break parameters for the joint.
    pub strength: ChainStrength,
}

impl Solution {
    /// Number of bodies the joint spans, endpoints included.
    #[must_use]
    pub fn span(&self) -> usize {
        self.intermediates.len() + 2
    }
}

/// Result of the depth-first inversion sweep.
#[derive(Debug, Clone, Default)]
pub struct InversionSweep {
    /// Inversions resolved by an ancestor.
    pub solutions: Vec<Solution>,
    /// Inverted bodies no ancestor can anchor.
    pub unresolved: Vec<BodyId>,
}

/// Minimum parameters of the primary joints from `from` up to `ancestor`.
///
/// Each step takes the first primary joint of the current body, then climbs
/// to the next physical body; the walk ends on reaching `ancestor`.
///
/// # Errors
///
/// Returns [`ReinforceError::BrokenJointChain`] when a body on the way has
/// no primary joint or the tree ends before `ancestor`.
pub fn overall_strength(
    assembly: &Assembly,
    from: BodyId,
    ancestor: BodyId,
    mut strength: ChainStrength,
) -> reinforce_types::Result<ChainStrength> {
    let broken = |at| ReinforceError::BrokenJointChain {
        body: from,
        ancestor,
        at,
    };

    let mut current = from;
    loop {
        if current == ancestor {
            return Ok(strength);
        }

        let body = assembly
            .body(current)
            .ok_or(ReinforceError::UnknownBody(current))?;
        let joint = body
            .attach_joints
            .first()
            .and_then(|id| assembly.joint(*id))
            .ok_or_else(|| broken(current))?;
        strength.absorb(joint);

        let mut up = body.parent;
        loop {
            match up {
                None => return Err(broken(current)),
                Some(id) if id == ancestor => return Ok(strength),
                Some(id) if assembly.is_physical(id) => {
                    current = id;
                    break;
                }
                Some(id) => up = assembly.parent_of(id),
            }
        }
    }
}

/// Finds inversions and their solutions.
#[derive(Debug, Clone, Copy)]
pub struct InversionResolver<'a> {
    config: &'a ReinforceConfig,
}

impl<'a> InversionResolver<'a> {
    /// Create a resolver for the given configuration.
    #[must_use]
    pub fn new(config: &'a ReinforceConfig) -> Self {
        Self { config }
    }

    /// The physical ancestor `part` is inverted against, if any.
    ///
    /// Climbs while adjustment is allowed. Stops with no inversion at the
    /// first ancestor heavy enough to anchor `part`.
    #[must_use]
    pub fn is_inversion(&self, assembly: &Assembly, part: BodyId) -> Option<BodyId> {
        let part_mass = assembly.body(part)?.mass;

        let mut current = part;
        while assembly.is_adjustment_allowed(current) {
            current = assembly.parent_of(current)?;
            let ancestor = assembly.body(current)?;
            if !ancestor.physical {
                continue;
            }
            if part_mass > ancestor.mass * self.config.inversion_mass_factor {
                return Some(current);
            }
            if ancestor.mass * self.config.solution_mass_factor >= part_mass {
                return None;
            }
        }
        None
    }

    /// A physical ancestor above `inverted` able to anchor `part`.
    #[must_use]
    pub fn find_inversion_resolution(
        &self,
        assembly: &Assembly,
        part: BodyId,
        inverted: BodyId,
    ) -> Option<BodyId> {
        let part_mass = assembly.body(part)?.mass;
        let mut best = inverted;
        let mut best_mass = assembly.body(inverted)?.mass;

        let mut current = inverted;
        while assembly.is_adjustment_allowed(current) {
            let Some(parent) = assembly.parent_of(current) else {
                break;
            };
            current = parent;
            let Some(ancestor) = assembly.body(current) else {
                break;
            };
            if ancestor.physical && ancestor.mass > best_mass {
                best = current;
                best_mass = ancestor.mass;
                if best_mass >= part_mass {
                    return Some(best);
                }
            }
        }

        (best_mass * self.config.solution_mass_factor >= part_mass).then_some(best)
    }

    /// Sweep the tree below `root` for inversions.
    #[must_use]
    pub fn find_inversions(&self, assembly: &Assembly, root: BodyId) -> InversionSweep {
        let mut sweep = InversionSweep::default();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let Some(body) = assembly.body(id) else {
                continue;
            };
            stack.extend(body.children.iter().rev().copied());

            if !body.physical || body.total_mass() < self.config.mass_for_adjustment {
                continue;
            }
            let Some(inverted) = self.is_inversion(assembly, id) else {
                continue;
            };

            match self.find_inversion_resolution(assembly, id, inverted) {
                Some(link) => match self.direct_solution(assembly, id, link) {
                    Ok(solution) => sweep.solutions.push(solution),
                    Err(e) => error!(body = %id, error = %e, "inversion solution dropped"),
                },
                None => {
                    debug!(body = %id, inverted = %inverted, "inversion unresolved by ancestors");
                    sweep.unresolved.push(id);
                }
            }
        }

        sweep
    }

    /// Resolve an inversion with a body outside `part`'s own subtree.
    ///
    /// Candidates that are themselves unresolved are only used when nothing
    /// else is available. The shortest path is preferred; among the sorted
    /// candidates a later one replaces the pick whenever its break force is
    /// strictly higher.
    #[must_use]
    pub fn find_child_resolution(
        &self,
        assembly: &Assembly,
        part: BodyId,
        unresolved: &[BodyId],
    ) -> Option<Solution> {
        let part_body = assembly.body(part)?;
        let part_mass = part_body.mass;

        let mut root = part;
        while assembly.is_adjustment_allowed(root) {
            match assembly.parent_of(root) {
                Some(parent) => root = parent,
                None => break,
            }
        }

        let mut candidates = Vec::new();
        self.collect_candidates(assembly, part, part_mass, root, &mut candidates);
        if candidates.is_empty() {
            return None;
        }

        let set1 = link_set(assembly, part, root);
        let mut solutions = Vec::new();
        for only_resolved in [true, false] {
            for &candidate in &candidates {
                if only_resolved && unresolved.contains(&candidate) {
                    continue;
                }
                let set2 = link_set(assembly, candidate, root);
                let Some(path) = link_set_difference(&set1, &set2) else {
                    continue;
                };

                let ancestor = path.ancestor();
                let strength = overall_strength(assembly, part, ancestor, ChainStrength::unbounded())
                    .and_then(|s| overall_strength(assembly, candidate, ancestor, s));
                match strength {
                    Ok(strength) => solutions.push(Solution {
                        part,
                        link: candidate,
                        ancestor,
                        intermediates: path.intermediates().to_vec(),
                        strength,
                    }),
                    Err(e) => error!(body = %part, candidate = %candidate, error = %e, "candidate dropped"),
                }
            }
            if !solutions.is_empty() {
                break;
            }
        }

        if solutions.is_empty() {
            return None;
        }
        solutions.sort_by_key(Solution::span);
        let mut pick = 0;
        for (i, solution) in solutions.iter().enumerate().skip(1) {
            if solutions[pick].strength.break_force < solution.strength.break_force {
                pick = i;
            }
        }
        let mut solution = solutions.swap_remove(pick);

        let lighter = part_mass.min(assembly.body(solution.link).map_or(part_mass, |b| b.mass));
        let lightest = solution
            .intermediates
            .iter()
            .filter_map(|id| assembly.body(*id))
            .map(|b| b.mass)
            .fold(f64::INFINITY, f64::min);
        if lightest.is_finite() && lightest > 0.0 {
            solution
                .strength
                .scale_breaking((lighter / (SOFT_CHAIN_RATIO * lightest)).max(1.0));
        }

        debug!(body = %part, link = %solution.link, span = solution.span(), "inversion resolved through tree");
        Some(solution)
    }

    /// Every solution for the tree below `root`: ancestor resolutions first,
    /// then the resolutions found for unresolved bodies.
    #[must_use]
    pub fn resolve(&self, assembly: &Assembly, root: BodyId) -> Vec<Solution> {
        let InversionSweep {
            mut solutions,
            unresolved,
        } = self.find_inversions(assembly, root);

        for &part in &unresolved {
            if let Some(solution) = self.find_child_resolution(assembly, part, &unresolved) {
                solutions.push(solution);
            }
        }
        solutions
    }

    fn direct_solution(
        &self,
        assembly: &Assembly,
        part: BodyId,
        link: BodyId,
    ) -> reinforce_types::Result<Solution> {
        let mut intermediates = Vec::new();
        let mut current = assembly.parent_of(part);
        while let Some(id) = current {
            if id == link {
                break;
            }
            intermediates.push(id);
            current = assembly.parent_of(id);
        }

        Ok(Solution {
            part,
            link,
            ancestor: link,
            intermediates,
            strength: overall_strength(assembly, part, link, ChainStrength::unbounded())?,
        })
    }

    fn collect_candidates(
        &self,
        assembly: &Assembly,
        part: BodyId,
        part_mass: f64,
        current: BodyId,
        candidates: &mut Vec<BodyId>,
    ) {
        if current == part || !assembly.is_adjustment_allowed(current) {
            return;
        }
        let Some(body) = assembly.body(current) else {
            return;
        };
        if body.physical && body.mass * self.config.solution_mass_factor >= part_mass {
            candidates.push(current);
        }
        for &child in &body.children {
            self.collect_candidates(assembly, part, part_mass, child, candidates);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use reinforce_types::{Body, HOST_JOINT_FORCE};

    fn chain(masses: &[f64]) -> (Assembly, Vec<BodyId>) {
        let mut assembly = Assembly::new();
        let mut ids = vec![assembly.add_root(Body::new("b0", masses[0]))];
        for (i, mass) in masses.iter().enumerate().skip(1) {
            let parent = ids[i - 1];
            ids.push(
                assembly
                    .attach(parent, Body::new(format!("b{i}"), *mass))
                    .unwrap(),
            );
        }
        (assembly, ids)
    }

    #[test]
    fn test_inversion_resolved_by_root() {
        let (assembly, ids) = chain(&[10.0, 0.1, 5.0]);
        let (root, mid, leaf) = (ids[0], ids[1], ids[2]);
        let config = ReinforceConfig::default();
        let resolver = InversionResolver::new(&config);

        assert_eq!(resolver.is_inversion(&assembly, leaf), Some(mid));
        assert_eq!(resolver.find_inversion_resolution(&assembly, leaf, mid), Some(root));
        assert_eq!(resolver.is_inversion(&assembly, mid), None);

        let solutions = resolver.resolve(&assembly, root);
        assert_eq!(solutions.len(), 1);
        let solution = &solutions[0];
        assert_eq!((solution.part, solution.link), (leaf, root));
        assert_eq!(solution.intermediates, vec![mid]);
        assert_eq!(solution.span(), 3);
    }

    #[test]
    fn test_heavy_parent_is_enough() {
        let (assembly, ids) = chain(&[0.1, 3.0, 5.0]);
        let config = ReinforceConfig::default();
        let resolver = InversionResolver::new(&config);
        // 3 * 2 >= 5: anchored before reaching the light root.
        assert_eq!(resolver.is_inversion(&assembly, ids[2]), None);
    }

    #[test]
    fn test_partial_resolution() {
        let (assembly, ids) = chain(&[3.0, 0.1, 5.0]);
        let config = ReinforceConfig::default();
        let resolver = InversionResolver::new(&config);
        // 3 < 5 but 3 * 2 >= 5.
        assert_eq!(
            resolver.find_inversion_resolution(&assembly, ids[2], ids[1]),
            Some(ids[0])
        );

        let (assembly, ids) = chain(&[1.0, 0.1, 5.0]);
        assert_eq!(resolver.find_inversion_resolution(&assembly, ids[2], ids[1]), None);
    }

    #[test]
    fn test_overall_strength_takes_minimum() {
        let (mut assembly, ids) = chain(&[10.0, 1.0, 1.0, 1.0]);
        let weak = assembly.body(ids[2]).unwrap().attach_joints[0];
        assembly.joint_mut(weak).unwrap().break_force = 5.0;
        let soft = assembly.body(ids[3]).unwrap().attach_joints[0];
        assembly.joint_mut(soft).unwrap().angular_drives[0].spring = 7.0;

        let strength =
            overall_strength(&assembly, ids[3], ids[0], ChainStrength::unbounded()).unwrap();
        assert_eq!(strength.break_force, 5.0);
        assert_eq!(strength.angular.spring, 7.0);
        assert_eq!(strength.linear.max_force, HOST_JOINT_FORCE);

        let empty = overall_strength(&assembly, ids[1], ids[1], ChainStrength::unbounded()).unwrap();
        assert_eq!(empty, ChainStrength::unbounded());
    }

    #[test]
    fn test_overall_strength_broken_chain() {
        let (mut assembly, ids) = chain(&[10.0, 1.0, 1.0]);
        let joint = assembly.body(ids[1]).unwrap().attach_joints[0];
        assembly.destroy_joint(joint).unwrap();

        let err = overall_strength(&assembly, ids[2], ids[0], ChainStrength::unbounded())
            .unwrap_err();
        assert!(matches!(err, ReinforceError::BrokenJointChain { at, .. } if at == ids[1]));
    }

    #[test]
    fn test_child_resolution_uses_sibling_branch() {
        // root(0.5) -> hub(0.1) -> heavy(6); root -> boom(0.2) -> weight(4)
        let mut assembly = Assembly::new();
        let root = assembly.add_root(Body::new("root", 0.5));
        let hub = assembly.attach(root, Body::new("hub", 0.1)).unwrap();
        let heavy = assembly.attach(hub, Body::new("heavy", 6.0)).unwrap();
        let boom = assembly.attach(root, Body::new("boom", 0.2)).unwrap();
        let weight = assembly.attach(boom, Body::new("weight", 4.0)).unwrap();

        let config = ReinforceConfig::default();
        let resolver = InversionResolver::new(&config);
        let sweep = resolver.find_inversions(&assembly, root);
        assert!(sweep.solutions.is_empty());
        assert_eq!(sweep.unresolved, vec![heavy, weight]);

        // weight is unresolved itself but the only candidate.
        let solution = resolver
            .find_child_resolution(&assembly, heavy, &sweep.unresolved)
            .unwrap();
        assert_eq!(solution.link, weight);
        assert_eq!(solution.ancestor, root);
        assert_eq!(solution.intermediates, vec![hub, root, boom]);
        // 4 / (5 * 0.1) = 8
        assert_relative_eq!(solution.strength.break_force, 22.0 * 8.0);

        assert_eq!(resolver.resolve(&assembly, root).len(), 2);
    }

    #[test]
    fn test_child_resolution_prefers_resolved_candidates() {
        let mut assembly = Assembly::new();
        let root = assembly.add_root(Body::new("root", 0.5));
        let hub = assembly.attach(root, Body::new("hub", 0.1)).unwrap();
        let heavy = assembly.attach(hub, Body::new("heavy", 6.0)).unwrap();
        let boom = assembly.attach(root, Body::new("boom", 0.2)).unwrap();
        let weight = assembly.attach(boom, Body::new("weight", 4.0)).unwrap();
        let tank = assembly.attach(root, Body::new("tank", 3.5)).unwrap();

        let config = ReinforceConfig::default();
        let resolver = InversionResolver::new(&config);
        let solution = resolver
            .find_child_resolution(&assembly, heavy, &[heavy, weight])
            .unwrap();
        assert_eq!(solution.link, tank);
        assert_eq!(solution.intermediates, vec![hub, root]);
    }

    #[test]
    fn test_no_candidates() {
        let (assembly, ids) = chain(&[0.1, 0.1, 5.0]);
        let config = ReinforceConfig::default();
        let resolver = InversionResolver::new(&config);
        assert!(resolver.find_child_resolution(&assembly, ids[2], &[ids[2]]).is_none());
    }
}
