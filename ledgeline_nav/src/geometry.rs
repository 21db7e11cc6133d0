// Geometry queries the graph builders probe the level with.
//
// The builders never look at tiles directly when validating nodes and
// edges. They ask a `GeometryQuery` implementor whether a straight segment
// is obstructed on a set of collision layers, or where a ray first hits.
// `TileLevel` is the stock implementor; hosts with their own collision
// world implement the trait over it instead.
//
// The segment/box test is a slab test (same shape as the usual ray/AABB
// slab test) with one twist: contact must have positive length. A segment
// that only grazes a face, runs along an edge, or ends exactly on a face is
// not obstructed. Nodes sit a hair above tile tops, and probes that end on
// a tile surface must not count as blocked.
//
// See also: `level.rs` for the tile implementation, `discovery.rs` and
// `edges.rs` for the probes themselves.

use crate::types::{TileId, Vec2};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Collision layer a tile belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    Ground,
    OneWay,
    Ladder,
    Portal,
}

impl Layer {
    pub fn mask(self) -> LayerMask {
        match self {
            Layer::Ground => LayerMask::GROUND,
            Layer::OneWay => LayerMask::ONE_WAY,
            Layer::Ladder => LayerMask::LADDER,
            Layer::Portal => LayerMask::PORTAL,
        }
    }
}

bitflags! {
    /// Set of layers a probe collides with.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct LayerMask: u8 {
        const GROUND  = 0b0000_0001;
        const ONE_WAY = 0b0000_0010;
        const LADDER  = 0b0000_0100;
        const PORTAL  = 0b0000_1000;
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        LayerMask::GROUND
    }
}

/// First contact of a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub point: Vec2,
    pub distance: f32,
    pub tile: TileId,
}

/// Line and ray tests against static level collision.
///
/// Implementations must be pure functions of the current geometry: the
/// builders call them from rayon workers and rely on repeated calls giving
/// identical answers.
pub trait GeometryQuery: Send + Sync {
    /// True if the segment `a -> b` passes through anything on `mask`.
    fn line_obstructed(&self, a: Vec2, b: Vec2, mask: LayerMask) -> bool;

    /// Nearest hit along `direction` from `origin` within `max_distance`.
    fn cast_ray(
        &self,
        origin: Vec2,
        direction: Vec2,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RayHit>;
}

/// Parameter `t` in `[0, 1]` at which segment `a -> b` enters the open box
/// `(min, max)`, or `None` if the overlap has zero length.
pub fn segment_box_entry(a: Vec2, b: Vec2, min: Vec2, max: Vec2) -> Option<f32> {
    let d = b - a;
    let mut t_enter = 0.0f32;
    let mut t_exit = 1.0f32;

    for axis in 0..2 {
        let (o, dir, mn, mx) = if axis == 0 {
            (a.x, d.x, min.x, max.x)
        } else {
            (a.y, d.y, min.y, max.y)
        };
        if dir.abs() < 1e-9 {
            if o <= mn || o >= mx {
                return None;
            }
            continue;
        }
        let inv = 1.0 / dir;
        let mut t1 = (mn - o) * inv;
        let mut t2 = (mx - o) * inv;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        t_enter = t_enter.max(t1);
        t_exit = t_exit.min(t2);
        if t_enter >= t_exit {
            return None;
        }
    }

    Some(t_enter)
}

/// Distance along a ray to the open box, using `segment_box_entry` over the
/// segment `origin -> origin + dir * max_distance`.
pub fn ray_box_distance(
    origin: Vec2,
    direction: Vec2,
    max_distance: f32,
    min: Vec2,
    max: Vec2,
) -> Option<f32> {
    let dir = direction.normalized()?;
    if max_distance <= 0.0 {
        return None;
    }
    let end = origin + dir * max_distance;
    segment_box_entry(origin, end, min, max).map(|t| t * max_distance)
}
