//! Footprint estimation from mesh geometry.
//!
//! A joint's stiffness scales with the cross-section it spans. The host has
//! no such figure, so it is estimated from the body's mesh: vertices are
//! rotated into a frame whose Y axis is the presumed attachment axis and the
//! axis-aligned bounds in that frame give the body's extents.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use reinforce_types::{Body, NodeKind};
use tracing::{debug, warn};

/// `|cos|` above which two directions count as the same axis.
pub const AXIS_AGREEMENT: f64 = 0.9;

/// Cross-section figures used to derive joint strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    /// Characteristic radius.
    pub radius: f64,
    /// Cross-section area.
    pub area: f64,
    /// Moment-of-inertia proxy of the cross-section.
    pub moment_of_inertia: f64,
}

impl Footprint {
    /// Solid cylinder cross-section.
    #[must_use]
    pub fn cylinder(radius: f64) -> Self {
        let area = std::f64::consts::PI * radius * radius;
        Self {
            radius,
            area,
            moment_of_inertia: area * radius * radius / 4.0,
        }
    }

    /// Rectangle bending along its longer side.
    #[must_use]
    pub fn rectangle(side: f64, width: f64) -> Self {
        let area = side * width;
        let radius = side.max(width);
        Self {
            radius,
            area,
            moment_of_inertia: area * radius / 12.0,
        }
    }

    /// Cylinder with the given contact area.
    #[must_use]
    pub fn from_contact_area(area: f64) -> Self {
        let radius_squared = area / std::f64::consts::PI;
        Self {
            radius: radius_squared.sqrt(),
            area,
            moment_of_inertia: area * radius_squared / 4.0,
        }
    }

    /// Raise area and moment of inertia to the 1.5 power (3-D scaling).
    #[must_use]
    pub fn as_volume(self) -> Self {
        Self {
            area: self.area.powf(1.5),
            moment_of_inertia: self.moment_of_inertia.powf(1.5),
            ..self
        }
    }
}

/// Extents of a body's meshes in the frame given by `alignment`.
///
/// A body without vertices yields zero extents.
#[must_use]
pub fn calculate_extents(body: &Body, alignment: &UnitQuaternion<f64>) -> Vector3<f64> {
    let inverse = alignment.inverse();
    let mut min = Vector3::repeat(f64::INFINITY);
    let mut max = Vector3::repeat(f64::NEG_INFINITY);

    for mesh in &body.meshes {
        for vertex in &mesh.vertices {
            let v: Point3<f64> = mesh.transform * vertex;
            let v = inverse * v.coords;
            min = min.inf(&v);
            max = max.sup(&v);
        }
    }

    if min.x > max.x {
        warn!(body = %body.id, name = %body.name, "extents could not be built, no mesh vertices");
        return Vector3::zeros();
    }

    let extents = max - min;
    debug!(body = %body.id, x = extents.x, y = extents.y, z = extents.z, "extents");
    extents
}

/// Extents with Y aligned to `up` (in the body's local frame).
///
/// Directions within [`AXIS_AGREEMENT`] of vertical use the body frame as is.
#[must_use]
pub fn extents_along(body: &Body, up: &Vector3<f64>) -> Vector3<f64> {
    let up = up.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::y);
    let alignment = if up.y.abs() < AXIS_AGREEMENT {
        UnitQuaternion::rotation_between(&Vector3::y(), &up).unwrap_or_else(UnitQuaternion::identity)
    } else {
        UnitQuaternion::identity()
    };
    calculate_extents(body, &alignment)
}

/// Extents with Y aligned to `up` and Z to `forward` made orthogonal to it.
#[must_use]
pub fn extents_facing(body: &Body, up: &Vector3<f64>, forward: &Vector3<f64>) -> Vector3<f64> {
    let up = up.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::y);
    let forward = forward - up * up.dot(forward);
    match forward.try_normalize(1e-9) {
        Some(forward) => calculate_extents(body, &UnitQuaternion::face_towards(&forward, &up)),
        None => extents_along(body, &up),
    }
}

/// Radius of the ellipse inscribed in the body's cross-section orthogonal to `axis`.
#[must_use]
pub fn radius_along(body: &Body, axis: &Vector3<f64>) -> f64 {
    let extents = extents_along(body, axis);
    (extents.x * extents.z).sqrt() / 2.0
}

/// Guess the main axis of a body in its local frame.
///
/// Intakes use their intake direction. A surface-attachable body whose
/// surface node points straight up or down uses the axis its stack nodes
/// agree on (forward when it has none). Everything else is vertical.
#[must_use]
pub fn guess_up_vector(body: &Body) -> Vector3<f64> {
    if let Some(direction) = body.intake_direction() {
        return direction;
    }

    let vertical_surface_node = body.surface_node.as_ref().is_some_and(|node| {
        node.orientation
            .try_normalize(f64::EPSILON)
            .is_some_and(|o| o.y.abs() > AXIS_AGREEMENT)
    });
    if !(body.surface_attachable && vertical_surface_node) {
        return Vector3::y();
    }

    let mut direction: Option<Vector3<f64>> = None;
    for node in body.attach_nodes.iter().filter(|n| n.kind != NodeKind::Surface) {
        let Some(orientation) = node.orientation.try_normalize(f64::EPSILON) else {
            continue;
        };
        match direction {
            None => direction = Some(orientation),
            Some(d) if d.dot(&orientation).abs() < AXIS_AGREEMENT => return Vector3::y(),
            Some(_) => {}
        }
    }

    let axis = direction.unwrap_or_else(Vector3::z);
    debug!(body = %body.id, x = axis.x, y = axis.y, z = axis.z, "surface attach axis");
    axis
}

/// Express a direction given in `from`'s local frame in `to`'s local frame.
#[must_use]
pub fn direction_between(from: &Body, to: &Body, direction: &Vector3<f64>) -> Vector3<f64> {
    to.pose.rotation.inverse() * (from.pose.rotation * direction)
}
