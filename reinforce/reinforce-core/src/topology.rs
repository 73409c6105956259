//! Tree traversal utilities.
//!
//! A *link set* is the ordered path from a body up to one of its ancestors,
//! both ends included. Two link sets ending at the same root can be
//! subtracted to obtain the path a synthesized joint spans between two
//! bodies; every body on that path has to know about the joint so that
//! breaking any of them removes it.
//!
//! Endpoints are the leaf-like bodies of a physically rooted subtree: heavy
//! enough, adjustable, and without an adjustable physical descendant. They
//! anchor the extra stability joints.

use reinforce_types::BodyId;

use crate::assembly::Assembly;

/// Walk from `body` towards the root, stopping after the first body whose
/// joints may not be adjusted.
#[must_use]
pub fn link_set_conditional(assembly: &Assembly, body: BodyId) -> Vec<BodyId> {
    let mut set = Vec::new();
    let mut current = Some(body);
    while let Some(id) = current {
        if assembly.body(id).is_none() {
            break;
        }
        set.push(id);
        current = if assembly.is_adjustment_allowed(id) {
            assembly.parent_of(id)
        } else {
            None
        };
    }
    set
}

/// Path from `body` up to `root`, both included.
///
/// `root` is expected to be an ancestor of `body`; if it is not, the walk
/// ends at the tree root and `root` is appended anyway, which makes any
/// difference against a proper link set fail.
#[must_use]
pub fn link_set(assembly: &Assembly, body: BodyId, root: BodyId) -> Vec<BodyId> {
    let mut set = vec![body];
    if body == root {
        return set;
    }
    let mut current = assembly.parent_of(body);
    while let Some(id) = current {
        if id == root {
            break;
        }
        set.push(id);
        current = assembly.parent_of(id);
    }
    set.push(root);
    set
}

/// Path spanned by a joint between two bodies of the same tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgePath {
    /// `[first, …, ancestor, …, last]`.
    pub bodies: Vec<BodyId>,
    /// Position of the lowest common ancestor in `bodies`.
    pub ancestor_index: usize,
}

impl BridgePath {
    /// The lowest common ancestor of both endpoints.
    #[must_use]
    pub fn ancestor(&self) -> BodyId {
        self.bodies[self.ancestor_index]
    }

    /// First endpoint.
    #[must_use]
    pub fn first(&self) -> BodyId {
        self.bodies[0]
    }

    /// Last endpoint.
    #[must_use]
    pub fn last(&self) -> BodyId {
        self.bodies[self.bodies.len() - 1]
    }

    /// Bodies strictly between the endpoints.
    #[must_use]
    pub fn intermediates(&self) -> &[BodyId] {
        &self.bodies[1..self.bodies.len() - 1]
    }

    /// Number of bodies on the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Always false; a bridge path spans at least two bodies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

/// Subtract two link sets ending at the same root.
///
/// Strips the shared tail and joins the divergent heads through their lowest
/// common ancestor. Returns `None` when the sets end at different roots, or
/// when nothing is left to span (same body, or a direct parent-child pair).
#[must_use]
pub fn link_set_difference(set1: &[BodyId], set2: &[BodyId]) -> Option<BridgePath> {
    if set1.last()? != set2.last()? {
        return None;
    }

    let shared = set1
        .iter()
        .rev()
        .zip(set2.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let head1 = set1.len() - shared;
    let head2 = set2.len() - shared;
    if head1 + head2 < 2 {
        return None;
    }

    let mut bodies = Vec::with_capacity(head1 + head2 + 1);
    bodies.extend_from_slice(&set1[..=head1]);
    bodies.extend(set2[..head2].iter().rev());

    Some(BridgePath {
        bodies,
        ancestor_index: head1,
    })
}

/// A physically rooted subtree and its endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootEndpoints {
    /// Top body of the subtree.
    pub root: BodyId,
    /// Endpoints in depth-first order.
    pub endpoints: Vec<BodyId>,
}

/// Partition the tree below `body` into physically rooted subtrees and
/// collect the endpoints of each.
///
/// A body whose joints may not be adjusted starts a subtree of its own.
/// Subtrees are listed in discovery order, parents before nested ones.
#[must_use]
pub fn find_roots_and_endpoints(
    assembly: &Assembly,
    body: BodyId,
    mass_for_adjustment: f64,
) -> Vec<RootEndpoints> {
    let mut roots = Vec::new();
    collect_roots(assembly, body, mass_for_adjustment, &mut roots);
    roots
}

fn collect_roots(
    assembly: &Assembly,
    body: BodyId,
    mass_for_adjustment: f64,
    roots: &mut Vec<RootEndpoints>,
) {
    let Some(b) = assembly.body(body) else {
        return;
    };

    if b.physical {
        let index = roots.len();
        roots.push(RootEndpoints {
            root: body,
            endpoints: Vec::new(),
        });
        let mut endpoints = Vec::new();
        collect_endpoints(assembly, body, mass_for_adjustment, &mut endpoints, roots);
        roots[index].endpoints = endpoints;
    } else {
        for &child in &b.children {
            collect_roots(assembly, child, mass_for_adjustment, roots);
        }
    }
}

/// Returns whether `body` or one of its descendants became an endpoint.
fn collect_endpoints(
    assembly: &Assembly,
    body: BodyId,
    mass_for_adjustment: f64,
    endpoints: &mut Vec<BodyId>,
    roots: &mut Vec<RootEndpoints>,
) -> bool {
    let Some(b) = assembly.body(body) else {
        return false;
    };

    let mut found = false;
    for &child in &b.children {
        if assembly.is_adjustment_allowed(child) {
            found |= collect_endpoints(assembly, child, mass_for_adjustment, endpoints, roots);
        } else {
            collect_roots(assembly, child, mass_for_adjustment, roots);
        }
    }

    if !found
        && b.physical
        && assembly.is_adjustment_allowed(body)
        && b.maximum_possible_mass() > mass_for_adjustment
    {
        endpoints.push(body);
        found = true;
    }
    found
}
