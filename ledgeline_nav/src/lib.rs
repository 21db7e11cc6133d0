// ledgeline_nav: 2D platformer navigation graph and path planner.
//
// Builds a navigation graph over a tile level (walkable ground, ladders,
// portals), samples jump and fall points around every standing spot,
// validates every edge with line-of-sight probes, keeps the graph current
// as tiles are added and removed, and answers path requests with A* search
// filtered by each requester's locomotion abilities.
//
// Module overview:
// - `types.rs`:     Vec2, TileCell, NodeId/TileId/RequesterId/TargetId handles, NodeKind, Waypoint.
// - `config.rs`:    NavConfig and nested tuning groups, JSON loading, ConfigError.
// - `geometry.rs`:  Layer/LayerMask, the GeometryQuery trait, segment/box math.
// - `level.rs`:     TileLevel, the grid of tiles; implements GeometryQuery; ASCII fixtures.
// - `graph.rs`:     NavGraph arena: nodes, directed adjacency, spawned-from ownership.
// - `discovery.rs`: Jump and Fall node sampling around anchor nodes.
// - `edges.rs`:     Edge rules per kind pair, each gated by probes.
// - `builder.rs`:   Full build and incremental region rebuild on tile edits.
// - `planner.rs`:   Start/goal resolution and capability-filtered A*.
// - `request.rs`:   Capabilities, PathRequest, the PathResultReceiver callback.
// - `worker.rs`:    Request queue with per-requester supersession; background or inline worker.
// - `follower.rs`:  ActivePath: waypoint cursor, salvage, stall detection.
// - `navigator.rs`: Navigator facade tying world, worker and requester state together.
//
// **Determinism.** Graph construction and search are pure functions of the
// level and config. Iteration is in id or insertion order everywhere,
// parallel probing only computes results that are applied sequentially, and
// the only hashed map (tile lookup) is never iterated.

pub mod builder;
pub mod config;
pub mod discovery;
pub mod edges;
pub mod follower;
pub mod geometry;
pub mod graph;
pub mod level;
pub mod navigator;
pub mod planner;
pub mod request;
pub mod types;
pub mod worker;

pub use config::{ConfigError, NavConfig, WorkerMode};
pub use geometry::{GeometryQuery, Layer, LayerMask};
pub use level::{LevelError, TileLevel};
pub use navigator::{NavWorld, Navigator};
pub use planner::PathError;
pub use request::{Capabilities, PathDelivery, PathGoal, PathRequest, PathResultReceiver};
pub use types::{NodeId, NodeKind, RequesterId, TargetId, TileCell, TileId, Vec2, Waypoint};
