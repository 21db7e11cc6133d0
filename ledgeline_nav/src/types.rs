// Core types shared across the navigation library.
//
// Defines the world-space point type (`Vec2`), integer tile cells
// (`TileCell`), strongly-typed handles for nodes, tiles, requesters and
// tracked targets, the closed `NodeKind` enumeration, and the `Waypoint`
// pair handed to the movement executor. All types derive `Serialize` and
// `Deserialize` so graphs and paths can be dumped to JSON for inspection.
//
// See also: `graph.rs` for the arena that hands out `NodeId`s, `level.rs`
// for the tile grid keyed by `TileCell`, `request.rs` for the types that
// flow between requesters and the planner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A point (or offset) in level space, in world units.
///
/// Y points up. One tile is `block_size` units wide; tile centers sit on
/// multiples of `block_size`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a (near) zero vector.
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len <= 1e-6 {
            None
        } else {
            Some(Self::new(self.x / len, self.y / len))
        }
    }

    /// Bit pattern of both components. Used for exact, hashable comparisons
    /// of node positions in tests and graph signatures.
    pub fn to_bits(self) -> (u32, u32) {
        (self.x.to_bits(), self.y.to_bits())
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// A cell of the tile grid. The tile occupying cell `(x, y)` is centered on
/// `(x * block_size, y * block_size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCell {
    pub x: i32,
    pub y: i32,
}

impl TileCell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Index of a node slot in the `NavGraph` arena. Slots are never reused, so
/// a stale id resolves to an empty slot rather than to a different node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a tile in a `TileLevel`. Sequential, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(pub u32);

/// Identity of a path requester (a character, usually).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequesterId(pub u64);

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requester#{}", self.0)
    }
}

/// Identity of a tracked goal whose position is updated by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub u64);

// ---------------------------------------------------------------------------
// Node kinds and waypoints
// ---------------------------------------------------------------------------

/// How a node is reached. Doubles as the locomotion mode of a waypoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    /// Standing on top of a ground or one-way tile.
    Ground,
    /// Apex of a jump spawned above a ground node.
    Jump,
    /// Ledge-edge point beside a ground node, the start of a drop.
    Fall,
    /// A ladder tile.
    Climb,
    /// A portal tile, linked to exactly one other portal.
    Portal,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Ground,
        NodeKind::Jump,
        NodeKind::Fall,
        NodeKind::Climb,
        NodeKind::Portal,
    ];

    /// True for the kinds that can anchor spawned Jump/Fall nodes.
    pub fn is_anchor(self) -> bool {
        matches!(self, NodeKind::Ground | NodeKind::Climb)
    }

    /// True for kinds whose nodes are spawned from an anchor.
    pub fn is_spawned(self) -> bool {
        matches!(self, NodeKind::Jump | NodeKind::Fall)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Ground => "ground",
            NodeKind::Jump => "jump",
            NodeKind::Fall => "fall",
            NodeKind::Climb => "climb",
            NodeKind::Portal => "portal",
        };
        f.write_str(name)
    }
}

/// One step of a resolved path: where to go, and how to get there from the
/// previous waypoint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: Vec2,
    pub kind: NodeKind,
}

impl Waypoint {
    pub const fn new(position: Vec2, kind: NodeKind) -> Self {
        Self { position, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_distance() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(3.0, 4.0);
        assert_eq!(a.distance(b), 5.0);
        assert_eq!(b.distance(a), 5.0);
    }

    #[test]
    fn normalized_zero_is_none() {
        assert!(Vec2::ZERO.normalized().is_none());
        let n = Vec2::new(0.0, -2.0).normalized().unwrap();
        assert_eq!(n, Vec2::new(0.0, -1.0));
    }

    #[test]
    fn anchor_and_spawned_kinds_are_disjoint() {
        for kind in NodeKind::ALL {
            assert!(!(kind.is_anchor() && kind.is_spawned()), "{kind}");
        }
        assert!(NodeKind::Ground.is_anchor());
        assert!(NodeKind::Fall.is_spawned());
        assert!(!NodeKind::Portal.is_anchor());
    }

    #[test]
    fn waypoint_serde_roundtrip() {
        let wp = Waypoint::new(Vec2::new(1.5, -2.0), NodeKind::Climb);
        let json = serde_json::to_string(&wp).unwrap();
        let back: Waypoint = serde_json::from_str(&json).unwrap();
        assert_eq!(wp, back);
    }
}
