// Edge rules between node collections.
//
// Every rule has the same shape: a cheap candidate filter on the distance
// envelope between two nodes, then zero or more line-of-sight probes along
// sampled sub-segments, rejecting the pair if any probe is obstructed. The
// probes approximate the silhouette of a walk, jump arc or drop without
// simulating it. All thresholds come from `NavConfig`.
//
// Each `connect_*` function takes a `from` and a `to` collection (possibly
// the same one), evaluates every pair on rayon against a read-only view of
// the graph, and then inserts the accepted edges sequentially in
// `from`-major order. Output is therefore independent of thread count.
// The functions return how many new edges were added.
//
// Rules, with `bs` = block size and `gmw` = ground max width:
// - Ground: |dy| < 0.7 bs, distance < bs + gmw, straight segment clear.
// - Ladder: |dx| < 0.501 bs and distance < bs + gmw between ladders, or
//   < 0.5 bs + 0.2 when one side is ground. No probe.
// - Portal pair: portal -> the portal of its linked tile, no probe.
// - Portal/ground: linked portals only, |dx| < bs, distance < 1.5 bs + 0.1,
//   segment clear; added in both directions.
// - Jump and fall: see `jump_edge_ok` and `fall_edge_ok`.
//
// See also: `discovery.rs` for where jump/fall nodes come from,
// `builder.rs` for the order rules are applied in.

use crate::config::NavConfig;
use crate::geometry::GeometryQuery;
use crate::graph::{NavGraph, NavNode};
use crate::types::{NodeId, Vec2};
use rayon::prelude::*;

/// Evaluate `accept` for every `(from, to)` pair in parallel and add the
/// accepted edges in order.
fn link_pairs<F>(graph: &mut NavGraph, from: &[NodeId], to: &[NodeId], accept: F) -> usize
where
    F: Fn(&NavGraph, &NavNode, &NavNode) -> bool + Sync,
{
    let accepted: Vec<Vec<(NodeId, NodeId)>> = {
        let view = &*graph;
        from.par_iter()
            .map(|&a| {
                let Some(na) = view.node(a) else {
                    return Vec::new();
                };
                to.iter()
                    .filter_map(|&b| {
                        let nb = view.node(b)?;
                        (a != b && accept(view, na, nb)).then_some((a, b))
                    })
                    .collect()
            })
            .collect()
    };
    accepted
        .into_iter()
        .flatten()
        .filter(|&(a, b)| graph.add_edge(a, b))
        .count()
}

// ---------------------------------------------------------------------------
// Ground, ladder, portal
// ---------------------------------------------------------------------------

pub fn connect_ground(
    graph: &mut NavGraph,
    geo: &dyn GeometryQuery,
    cfg: &NavConfig,
    from: &[NodeId],
    to: &[NodeId],
) -> usize {
    let bs = cfg.block_size;
    let max_gap = bs + cfg.ground_max_width * bs;
    let max_dy = cfg.ground_dy_tolerance * bs;
    link_pairs(graph, from, to, |_, a, b| {
        (a.position.y - b.position.y).abs() < max_dy
            && a.position.distance(b.position) < max_gap
            && !geo.line_obstructed(a.position, b.position, cfg.probe_layers)
    })
}

/// Ladder chains (`includes_ground == false`) or ladder/ground hand-offs
/// (`includes_ground == true`). Ladders are probe-free: the ladder tile
/// itself is the clearance.
pub fn connect_ladders(
    graph: &mut NavGraph,
    cfg: &NavConfig,
    from: &[NodeId],
    to: &[NodeId],
    includes_ground: bool,
) -> usize {
    let bs = cfg.block_size;
    let max_dx = cfg.ladder_dx_tolerance * bs;
    let max_dist = if includes_ground {
        bs * 0.5 + cfg.ladder_ground_extra
    } else {
        bs + cfg.ground_max_width * bs
    };
    link_pairs(graph, from, to, |_, a, b| {
        (a.position.x - b.position.x).abs() < max_dx && a.position.distance(b.position) < max_dist
    })
}

/// Connect each portal to the portal node of its linked tile.
/// `partner` maps a portal node to its counterpart, if linked.
pub fn connect_portal_pairs(
    graph: &mut NavGraph,
    portals: &[NodeId],
    partner: impl Fn(NodeId) -> Option<NodeId>,
) -> usize {
    portals
        .iter()
        .filter_map(|&p| partner(p).map(|q| (p, q)))
        .collect::<Vec<_>>()
        .into_iter()
        .filter(|&(p, q)| graph.add_edge(p, q))
        .count()
}

/// Connect linked portals with the ground right below or beside them, in
/// both directions. `linked` says whether a portal node currently has a
/// counterpart.
pub fn connect_portal_ground(
    graph: &mut NavGraph,
    geo: &dyn GeometryQuery,
    cfg: &NavConfig,
    portals: &[NodeId],
    grounds: &[NodeId],
    linked: impl Fn(NodeId) -> bool,
) -> usize {
    let bs = cfg.block_size;
    let max_dx = bs;
    let max_dist = cfg.portal_reach * bs + cfg.portal_slack;
    let active: Vec<NodeId> = portals.iter().copied().filter(|&p| linked(p)).collect();
    let accepted: Vec<Vec<(NodeId, NodeId)>> = {
        let view = &*graph;
        active
            .par_iter()
            .map(|&p| {
                let Some(np) = view.node(p) else {
                    return Vec::new();
                };
                grounds
                    .iter()
                    .filter_map(|&g| {
                        let ng = view.node(g)?;
                        let ok = (np.position.x - ng.position.x).abs() < max_dx
                            && np.position.distance(ng.position) < max_dist
                            && !geo.line_obstructed(np.position, ng.position, cfg.probe_layers);
                        ok.then_some((p, g))
                    })
                    .collect()
            })
            .collect()
    };
    let mut added = 0;
    for (p, g) in accepted.into_iter().flatten() {
        added += usize::from(graph.add_edge(p, g));
        added += usize::from(graph.add_edge(g, p));
    }
    added
}

// ---------------------------------------------------------------------------
// Jumps
// ---------------------------------------------------------------------------

/// Link each jump node's anchor to it, then link jump nodes to the landing
/// nodes in `landings` that pass `jump_edge_ok`.
pub fn connect_jumps(
    graph: &mut NavGraph,
    geo: &dyn GeometryQuery,
    cfg: &NavConfig,
    jumps: &[NodeId],
    landings: &[NodeId],
) -> usize {
    let mut added = link_anchors(graph, jumps);
    added += link_pairs(graph, jumps, landings, |view, a, b| {
        let Some(anchor) = a.spawned_from.and_then(|s| view.node(s)) else {
            return false;
        };
        jump_edge_ok(geo, cfg, a, anchor, b)
    });
    added
}

fn link_anchors(graph: &mut NavGraph, spawned: &[NodeId]) -> usize {
    let pairs: Vec<(NodeId, NodeId)> = spawned
        .iter()
        .filter_map(|&id| graph.node(id).and_then(|n| n.spawned_from).map(|s| (s, id)))
        .collect();
    pairs
        .into_iter()
        .filter(|&(s, id)| graph.add_edge(s, id))
        .count()
}

/// Jump from apex `a` (spawned above `anchor`) down onto `b`.
pub fn jump_edge_ok(
    geo: &dyn GeometryQuery,
    cfg: &NavConfig,
    a: &NavNode,
    anchor: &NavNode,
    b: &NavNode,
) -> bool {
    let bs = cfg.block_size;
    let gmw = cfg.ground_max_width * bs;
    let gnh = cfg.ground_node_height * bs;
    let h = &cfg.jump;
    let mask = cfg.probe_layers;
    let (ap, sp, bp) = (a.position, anchor.position, b.position);
    let dx = (ap.x - bp.x).abs();
    let short = bs + gmw;

    // Envelope.
    if dx >= bs * cfg.max_jump_blocks_x as f32 + bs + gmw || b.id == anchor.id {
        return false;
    }
    if ap.y <= bp.y + bs * 0.5
        || ap.y - bp.y <= dx * h.arc_ratio - bs
        || dx >= h.max_reach_blocks * bs + gmw
    {
        return false;
    }
    if geo.line_obstructed(ap, bp, mask) {
        return false;
    }

    // A short hop to a neighbour at the same level is a walk, not a jump.
    if dx < short && (sp.y - bp.y).abs() < 1e-4 * bs {
        return false;
    }
    // The apex was lowered by a ceiling and the target is more than a
    // step away.
    if ap.y - sp.y + 0.01 < a.height && dx > short {
        return false;
    }

    // Head hit: a ceiling-limited jump is flatter and reaches less far.
    if a.real_height > a.height {
        let mut reach = if a.height > h.head_hit_high_height {
            h.head_hit_high_reach
        } else if a.height > h.head_hit_mid_height {
            h.head_hit_mid_reach
        } else {
            h.head_hit_low_reach
        };
        let anchor_dx = (sp.x - bp.x).abs();
        if sp.y < bp.y && anchor_dx > bs * h.head_hit_upward_dx {
            reach = 0.0;
        }
        if anchor_dx > bs * reach {
            return false;
        }
    }

    if dx <= short {
        return true;
    }

    // Arc silhouette.
    let middle = (bp.x - ap.x) / 2.0;
    let quarter = middle / 2.0;
    let quarter_point = Vec2::new(ap.x + quarter, ap.y);
    let mid_point = Vec2::new(ap.x + middle, ap.y);
    let past_mid = Vec2::new(ap.x + middle + quarter, ap.y - bs);
    let lower_mid = Vec2::new(ap.x + middle, ap.y - bs);
    let straight_up = Vec2::new(bp.x, ap.y - bs);
    let level_or_down = sp.y >= bp.y - gnh;

    let blocked = geo.line_obstructed(sp, quarter_point, mask)
        || (level_or_down && geo.line_obstructed(bp, past_mid, mask))
        || geo.line_obstructed(sp, mid_point, mask)
        || (level_or_down && geo.line_obstructed(lower_mid, bp, mask))
        || (sp.y >= bp.y && geo.line_obstructed(bp, straight_up, mask));
    !blocked
}

// ---------------------------------------------------------------------------
// Falls
// ---------------------------------------------------------------------------

/// Link each fall node's anchor to it, then link fall nodes to the landing
/// nodes in `landings` that pass `fall_edge_ok`.
pub fn connect_falls(
    graph: &mut NavGraph,
    geo: &dyn GeometryQuery,
    cfg: &NavConfig,
    falls: &[NodeId],
    landings: &[NodeId],
) -> usize {
    let mut added = link_anchors(graph, falls);
    added += link_pairs(graph, falls, landings, |_, a, b| fall_edge_ok(geo, cfg, a, b));
    added
}

/// Drop from ledge point `a` onto `b`.
pub fn fall_edge_ok(geo: &dyn GeometryQuery, cfg: &NavConfig, a: &NavNode, b: &NavNode) -> bool {
    let bs = cfg.block_size;
    let gmw = cfg.ground_max_width * bs;
    let gnh = cfg.ground_node_height * bs;
    let h = &cfg.fall;
    let mask = cfg.probe_layers;
    let (ap, bp) = (a.position, b.position);
    let dx = (ap.x - bp.x).abs();
    let drop = ap.y - bp.y;

    let short_drop = dx < bs + gmw && ap.y > bp.y;
    let steep_drop = drop > dx * h.steep_ratio + bs && dx < h.max_reach_blocks * bs;
    if !(short_drop || steep_drop) {
        return false;
    }
    if geo.line_obstructed(ap, bp, mask) {
        return false;
    }

    let middle = (bp.x - ap.x) * 0.5;
    let quarter = middle / 2.0;
    let reduce = if drop.abs() > h.tall_drop_blocks * bs {
        h.tall_drop_reduction * bs
    } else {
        0.0
    };
    let middle_drop = Vec2::new(ap.x + middle, ap.y - reduce);
    let quarter_top = Vec2::new(ap.x + quarter, ap.y);
    let quarter_bot = Vec2::new(bp.x - quarter, bp.y);
    let corner = Vec2::new(bp.x, ap.y - bs * dx - bs * 0.5 - gnh);

    let blocked = geo.line_obstructed(quarter_top, bp, mask)
        || geo.line_obstructed(middle_drop, bp, mask)
        || (ap.y > bp.y + bs + gnh && geo.line_obstructed(corner, bp, mask))
        || geo.line_obstructed(quarter_bot, ap, mask);
    !blocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::TileLevel;
    use crate::types::NodeKind;

    fn cfg() -> NavConfig {
        NavConfig::default()
    }

    /// Ground nodes on top of tiles at `(x, 0)` for each x.
    fn grounds(graph: &mut NavGraph, xs: &[i32], tile_y: i32) -> Vec<NodeId> {
        let off = cfg().ground_offset();
        xs.iter()
            .map(|&x| graph.add_node(NodeKind::Ground, Vec2::new(x as f32, tile_y as f32 + off)))
            .collect()
    }

    #[test]
    fn ground_links_adjacent_tiles_both_ways() {
        let level = TileLevel::from_ascii("###", 1.0).unwrap();
        let mut graph = NavGraph::new();
        let g = grounds(&mut graph, &[0, 1, 2], 0);
        let added = connect_ground(&mut graph, &level, &cfg(), &g, &g);
        assert_eq!(added, 4);
        assert_eq!(graph.neighbours(g[1]), &[g[0], g[2]]);
        assert!(!graph.neighbours(g[0]).contains(&g[2]));
    }

    #[test]
    fn ground_rejects_steps_and_walls() {
        // Step of one block: too tall to walk.
        let level = TileLevel::from_ascii(".#\n##", 1.0).unwrap();
        let mut graph = NavGraph::new();
        let low = grounds(&mut graph, &[0], 0);
        let high = grounds(&mut graph, &[1], 1);
        let all = [low[0], high[0]];
        assert_eq!(connect_ground(&mut graph, &level, &cfg(), &all, &all), 0);
    }

    #[test]
    fn ladders_chain_and_hand_off() {
        let cfg = cfg();
        let mut graph = NavGraph::new();
        let floor = grounds(&mut graph, &[0], 0);
        let l1 = graph.add_node(NodeKind::Climb, Vec2::new(0.0, 1.0));
        let l2 = graph.add_node(NodeKind::Climb, Vec2::new(0.0, 2.0));
        let side = graph.add_node(NodeKind::Climb, Vec2::new(1.0, 1.0));
        let ladders = [l1, l2, side];
        connect_ladders(&mut graph, &cfg, &ladders, &ladders, false);
        connect_ladders(&mut graph, &cfg, &floor, &ladders, true);
        connect_ladders(&mut graph, &cfg, &ladders, &floor, true);
        assert_eq!(graph.neighbours(l1), &[l2, floor[0]]);
        assert_eq!(graph.neighbours(l2), &[l1]);
        assert!(graph.neighbours(side).is_empty());
        assert_eq!(graph.neighbours(floor[0]), &[l1]);
    }

    #[test]
    fn portal_pairs_and_ground() {
        let level = TileLevel::from_ascii("###.....###", 1.0).unwrap();
        let cfg = cfg();
        let mut graph = NavGraph::new();
        let g = grounds(&mut graph, &[2, 8], 0);
        let p = graph.add_node(NodeKind::Portal, Vec2::new(2.0, 1.0));
        let q = graph.add_node(NodeKind::Portal, Vec2::new(8.0, 1.0));
        let lone = graph.add_node(NodeKind::Portal, Vec2::new(5.0, 1.0));
        let portals = [p, q, lone];
        let partner = |id: NodeId| match id {
            x if x == p => Some(q),
            x if x == q => Some(p),
            _ => None,
        };
        assert_eq!(connect_portal_pairs(&mut graph, &portals, partner), 2);
        connect_portal_ground(&mut graph, &level, &cfg, &portals, &g, |id| partner(id).is_some());
        assert_eq!(graph.neighbours(p), &[q, g[0]]);
        assert_eq!(graph.neighbours(g[0]), &[p]);
        assert_eq!(graph.neighbours(g[1]), &[q]);
        assert!(graph.neighbours(lone).is_empty());
    }

    fn jump_fixture(anchor_x: i32, apex: f32) -> (NavGraph, NodeId, NodeId) {
        let mut graph = NavGraph::new();
        let anchor = grounds(&mut graph, &[anchor_x], 0)[0];
        let pos = graph.position(anchor).unwrap();
        let jump = graph
            .add_jump_node(anchor, Vec2::new(pos.x, pos.y + apex), apex, apex)
            .unwrap();
        (graph, anchor, jump)
    }

    #[test]
    fn jump_clears_two_block_gap() {
        let level = TileLevel::from_ascii("###..###", 1.0).unwrap();
        let (mut graph, anchor, jump) = jump_fixture(2, 3.8);
        let far = grounds(&mut graph, &[5, 6, 7], 0);
        connect_jumps(&mut graph, &level, &cfg(), &[jump], &far);
        assert_eq!(graph.neighbours(anchor), &[jump]);
        // x = 5 (dx 3) and x = 6 (dx 4) are in reach, x = 7 is not.
        assert_eq!(graph.neighbours(jump), &[far[0], far[1]]);
    }

    #[test]
    fn jump_never_lands_on_own_anchor_or_adjacent_level_tile() {
        let level = TileLevel::from_ascii("###", 1.0).unwrap();
        let mut graph = NavGraph::new();
        let g = grounds(&mut graph, &[0, 1, 2], 0);
        let jump = graph
            .add_jump_node(g[1], Vec2::new(1.0, 0.51 + 3.8), 3.8, 3.8)
            .unwrap();
        connect_jumps(&mut graph, &level, &cfg(), &[jump], &g);
        assert!(graph.neighbours(jump).is_empty());
    }

    #[test]
    fn wall_in_arc_blocks_jump() {
        // Tall wall at x = 3..4 reaching y = 3.
        let level = TileLevel::from_ascii(
            "
            ...##...
            ...##...
            ...##...
            ###..###
            ",
            1.0,
        )
        .unwrap();
        let (mut graph, _anchor, jump) = jump_fixture(2, 2.8);
        let far = grounds(&mut graph, &[5], 0);
        connect_jumps(&mut graph, &level, &cfg(), &[jump], &far);
        assert!(graph.neighbours(jump).is_empty());
    }

    #[test]
    fn head_hit_limits_reach() {
        let level = TileLevel::from_ascii("###..###", 1.0).unwrap();
        let cfg = cfg();
        let mut graph = NavGraph::new();
        let anchor = grounds(&mut graph, &[2], 0)[0];
        // A 3.8-class jump cut down to 1.5 by a ceiling: reach 1.5 blocks.
        let jump = graph
            .add_jump_node(anchor, Vec2::new(2.0, 0.51 + 1.5), 1.5, 3.8)
            .unwrap();
        let far = grounds(&mut graph, &[5], 0);
        let (a, s, b) = (
            graph.node(jump).unwrap(),
            graph.node(anchor).unwrap(),
            graph.node(far[0]).unwrap(),
        );
        assert!(!jump_edge_ok(&level, &cfg, a, s, b));
    }

    #[test]
    fn fall_lands_below_ledge() {
        let level = TileLevel::from_ascii(
            "
            ###....
            .......
            .......
            #######
            ",
            1.0,
        )
        .unwrap();
        let cfg = cfg();
        let mut graph = NavGraph::new();
        let top = grounds(&mut graph, &[2], 3)[0];
        let fall = graph.add_fall_node(top, Vec2::new(2.75, 3.51)).unwrap();
        let floor = grounds(&mut graph, &[0, 1, 2, 3, 4, 5, 6], 0);
        connect_falls(&mut graph, &level, &cfg, &[fall], &floor);
        assert_eq!(graph.neighbours(top), &[fall]);
        let landed = graph.neighbours(fall);
        assert!(landed.contains(&floor[3]));
        assert!(landed.contains(&floor[4]));
        // Under the ledge and far away are both out.
        assert!(!landed.contains(&floor[0]));
        assert!(!landed.contains(&floor[6]));
    }

    #[test]
    fn fall_never_goes_up_or_sideways() {
        let level = TileLevel::from_ascii("##.##", 1.0).unwrap();
        let cfg = cfg();
        let mut graph = NavGraph::new();
        let g = grounds(&mut graph, &[1, 3], 0);
        let fall = graph.add_fall_node(g[0], Vec2::new(1.75, 0.51)).unwrap();
        connect_falls(&mut graph, &level, &cfg, &[fall], &g);
        assert!(!graph.neighbours(fall).contains(&g[1]));
    }
}
