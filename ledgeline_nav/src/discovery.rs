// Jump and Fall node discovery.
//
// Given a set of anchor nodes, samples candidate Jump and Fall positions
// around each one with geometry probes and adds the survivors to the graph
// as nodes spawned from that anchor.
//
// - Fall nodes: one step (`0.5 + fall_x_spacing` blocks) to the left, then
//   to the right, of the anchor. Kept if the sideways probe is clear and a
//   short probe straight down from the side point is clear too (nothing to
//   stand on there, so the character would drop).
// - Jump nodes: for each height in `NavConfig::jump_heights()` (tallest
//   first), probe straight up from the anchor. A clear probe spawns a node
//   with `height == real_height`. A blocked probe is narrowed downward in
//   `jump_narrow_step` increments until a clear height above one block is
//   found; that node keeps the nominal height as `real_height` (the jump
//   class that produced it) and the reduced clearance as `height`.
//
// All falls are discovered before all jumps, anchors are visited in the
// order given, and left comes before right, so identical inputs give an
// identical node sequence. Probing runs on rayon; only the insertion into
// the graph is sequential.
//
// See also: `edges.rs` for how spawned nodes get their edges,
// `builder.rs` for when discovery runs.

use crate::config::{MAX_NARROW_STEPS, NavConfig};
use crate::geometry::GeometryQuery;
use crate::graph::NavGraph;
use crate::types::{NodeId, Vec2};
use rayon::prelude::*;
use smallvec::SmallVec;

/// Nodes created by one discovery pass, in creation order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Spawned {
    pub jumps: Vec<NodeId>,
    pub falls: Vec<NodeId>,
}

impl Spawned {
    pub fn len(&self) -> usize {
        self.jumps.len() + self.falls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jumps.is_empty() && self.falls.is_empty()
    }
}

/// A jump candidate: apex position, clearance, and jump class.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JumpCandidate {
    pub position: Vec2,
    pub height: f32,
    pub real_height: f32,
}

/// Spawn Jump and Fall nodes for `anchors`. Anchors that are no longer in
/// the graph are skipped.
pub fn discover(
    graph: &mut NavGraph,
    geo: &dyn GeometryQuery,
    cfg: &NavConfig,
    anchors: &[NodeId],
) -> Spawned {
    let sites: Vec<(NodeId, Vec2)> = anchors
        .iter()
        .filter_map(|&id| graph.position(id).map(|p| (id, p)))
        .collect();

    let falls: Vec<(NodeId, SmallVec<[Vec2; 2]>)> = sites
        .par_iter()
        .map(|&(id, pos)| (id, fall_candidates(geo, cfg, pos)))
        .collect();
    let jumps: Vec<(NodeId, Vec<JumpCandidate>)> = sites
        .par_iter()
        .map(|&(id, pos)| (id, jump_candidates(geo, cfg, pos)))
        .collect();

    let mut spawned = Spawned::default();
    for (anchor, points) in falls {
        for point in points {
            if let Some(id) = graph.add_fall_node(anchor, point) {
                spawned.falls.push(id);
            }
        }
    }
    for (anchor, candidates) in jumps {
        for c in candidates {
            if let Some(id) = graph.add_jump_node(anchor, c.position, c.height, c.real_height) {
                spawned.jumps.push(id);
            }
        }
    }

    log::debug!(
        "discovery: {} anchors -> {} jump, {} fall nodes",
        sites.len(),
        spawned.jumps.len(),
        spawned.falls.len()
    );
    spawned
}

/// Fall positions beside an anchor at `pos`, left first.
pub fn fall_candidates(geo: &dyn GeometryQuery, cfg: &NavConfig, pos: Vec2) -> SmallVec<[Vec2; 2]> {
    let mask = cfg.probe_layers;
    let offset = cfg.fall_offset();
    let drop = cfg.fall_y_ground_dist * cfg.block_size;
    let mut out = SmallVec::new();
    for side in [-offset, offset] {
        let point = Vec2::new(pos.x + side, pos.y);
        if geo.line_obstructed(pos, point, mask) {
            continue;
        }
        let below = Vec2::new(point.x, point.y - drop);
        if !geo.line_obstructed(point, below, mask) {
            out.push(point);
        }
    }
    out
}

/// Jump apexes above an anchor at `pos`, tallest jump class first.
pub fn jump_candidates(geo: &dyn GeometryQuery, cfg: &NavConfig, pos: Vec2) -> Vec<JumpCandidate> {
    let mask = cfg.probe_layers;
    let step = cfg.jump_narrow_step * cfg.block_size;
    let floor = cfg.block_size;
    let up = Vec2::new(0.0, 1.0);
    let mut out = Vec::new();

    for nominal in cfg.jump_heights() {
        let apex = Vec2::new(pos.x, pos.y + nominal);
        if !geo.line_obstructed(pos, apex, mask) {
            out.push(JumpCandidate {
                position: apex,
                height: nominal,
                real_height: nominal,
            });
            continue;
        }

        // Every height above the ceiling is blocked; start narrowing at the
        // last step that is not above it.
        let first = match geo.cast_ray(pos, up, nominal, mask) {
            Some(hit) => ((nominal - hit.distance) / step).floor().max(0.0) as u32,
            None => 0,
        };
        let last = ((nominal - floor) / step).ceil().min(MAX_NARROW_STEPS as f32);
        let mut k = first;
        while k as f32 <= last {
            let h = nominal - k as f32 * step;
            if h <= floor {
                break;
            }
            let top = Vec2::new(pos.x, pos.y + h);
            if !geo.line_obstructed(pos, top, mask) {
                out.push(JumpCandidate {
                    position: top,
                    height: h,
                    real_height: nominal,
                });
                break;
            }
            k += 1;
        }
    }
    out
}
