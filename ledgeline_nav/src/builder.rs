// Graph construction from a tile level, and incremental maintenance.
//
// `build_graph` does the full build:
//
// 1. Ground nodes for Ground and OneWay tiles, Climb nodes for ladders.
// 2. Fall then Jump discovery over every Ground node.
// 3. Portal nodes.
// 4. Edges: ground/ground; ladder chains, then ground/ladder hand-offs in
//    both directions; portal pairs, then portal/ground; jump and fall
//    landings on ground.
//
// After a tile edit, `collect_region` picks the anchors near the edit
// (`changed`) and a wider ring of edge candidates (`context`), and
// `rebuild_region` refreshes only that part of the graph:
//
// 1. Discard the Jump/Fall nodes spawned by `changed` nodes and drop every
//    walk/climb/portal edge into or out of them.
// 2. Recompute ground, ladder and portal/ground edges between `changed`
//    and `context`, in both directions.
// 3. Rediscover Jump/Fall nodes for the changed Ground nodes and connect
//    them to landings.
// 4. Reconnect the border: Jump/Fall nodes of unchanged anchors near the
//    edit, whose arcs may cross the edited cell or land on a changed node.
//
// Jump/Fall landings are looked up in a full-height column around the
// edit rather than in `context`, because a drop can start far above the
// region it lands in. With that, a region rebuild leaves the graph with
// the same edge signature as a full build of the edited level.
//
// See also: `discovery.rs`, `edges.rs` for the passes themselves,
// `navigator.rs` which applies tile edits under the world write lock.

use crate::config::NavConfig;
use crate::discovery::discover;
use crate::edges::{
    connect_falls, connect_ground, connect_jumps, connect_ladders, connect_portal_ground,
    connect_portal_pairs,
};
use crate::geometry::Layer;
use crate::graph::NavGraph;
use crate::level::{Tile, TileLevel};
use crate::types::{NodeId, NodeKind, Vec2};
use std::collections::{BTreeMap, BTreeSet};

/// Anchors to rebuild around an edit, and the nodes their edges may reach.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Region {
    /// Position of the edited tile's node.
    pub center: Vec2,
    pub changed: Vec<NodeId>,
    pub context: Vec<NodeId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub changed: usize,
    pub context: usize,
    pub spawned: usize,
    pub border: usize,
    pub edges_added: usize,
}

/// Kind and position of the node a tile produces.
pub fn tile_node(level: &TileLevel, cfg: &NavConfig, tile: &Tile) -> (NodeKind, Vec2) {
    let center = level.center(tile.cell);
    match tile.layer {
        Layer::Ground | Layer::OneWay => (
            NodeKind::Ground,
            Vec2::new(center.x, center.y + cfg.ground_offset()),
        ),
        Layer::Ladder => (NodeKind::Climb, center),
        Layer::Portal => (NodeKind::Portal, center),
    }
}

fn add_nodes_for(graph: &mut NavGraph, level: &TileLevel, cfg: &NavConfig, layer: Layer) {
    for tile in level.tiles_of(layer) {
        let (kind, pos) = tile_node(level, cfg, tile);
        graph.add_tile_node(kind, pos, tile.id);
    }
}

/// Portal node -> portal node of its linked tile, for the given portals.
fn portal_partners(
    graph: &NavGraph,
    level: &TileLevel,
    portals: &[NodeId],
) -> BTreeMap<NodeId, NodeId> {
    portals
        .iter()
        .filter_map(|&p| {
            let tile = graph.node(p)?.tile?;
            let link = level.tile(tile)?.link?;
            graph.node_for_tile(link).map(|q| (p, q))
        })
        .collect()
}

/// Build the whole graph for `level`.
pub fn build_graph(level: &TileLevel, cfg: &NavConfig) -> NavGraph {
    let mut graph = NavGraph::with_weights(cfg.weights.clone());

    add_nodes_for(&mut graph, level, cfg, Layer::Ground);
    add_nodes_for(&mut graph, level, cfg, Layer::OneWay);
    add_nodes_for(&mut graph, level, cfg, Layer::Ladder);
    let grounds = graph.ids_of_kind(NodeKind::Ground);
    let ladders = graph.ids_of_kind(NodeKind::Climb);

    let spawned = discover(&mut graph, level, cfg, &grounds);

    add_nodes_for(&mut graph, level, cfg, Layer::Portal);
    let portals = graph.ids_of_kind(NodeKind::Portal);

    connect_ground(&mut graph, level, cfg, &grounds, &grounds);
    connect_ladders(&mut graph, cfg, &ladders, &ladders, false);
    connect_ladders(&mut graph, cfg, &grounds, &ladders, true);
    connect_ladders(&mut graph, cfg, &ladders, &grounds, true);

    let partners = portal_partners(&graph, level, &portals);
    connect_portal_pairs(&mut graph, &portals, |p| partners.get(&p).copied());
    connect_portal_ground(&mut graph, level, cfg, &portals, &grounds, |p| {
        partners.contains_key(&p)
    });

    connect_jumps(&mut graph, level, cfg, &spawned.jumps, &grounds);
    connect_falls(&mut graph, level, cfg, &spawned.falls, &grounds);

    debug_assert!(graph.check_integrity().is_ok());
    log::debug!(
        "built nav graph: {} tiles -> {} nodes, {} edges",
        level.len(),
        graph.len(),
        graph.edge_count()
    );
    graph
}

// ---------------------------------------------------------------------------
// Incremental rebuild
// ---------------------------------------------------------------------------

/// Pick the anchors to rebuild around `center` and their edge candidates.
pub fn collect_region(graph: &NavGraph, cfg: &NavConfig, center: Vec2) -> Region {
    let bs = cfg.block_size;
    let r = &cfg.region;
    let mut changed = Vec::new();
    let mut context = Vec::new();
    for node in graph.nodes() {
        let is_anchor = node.kind.is_anchor();
        if !(is_anchor || node.kind == NodeKind::Portal) {
            continue;
        }
        let d = node.position.distance(center);
        if is_anchor && d < r.search_size * bs {
            changed.push(node.id);
        }
        let in_box = (node.position.x - center.x).abs() < r.context_dx * bs
            && (node.position.y - center.y).abs() < r.context_dy * bs;
        if d < r.larger_search_size * bs || in_box {
            context.push(node.id);
        }
    }
    Region {
        center,
        changed,
        context,
    }
}

fn of_kind(graph: &NavGraph, ids: &[NodeId], kind: NodeKind) -> Vec<NodeId> {
    ids.iter()
        .copied()
        .filter(|&id| graph.kind(id) == Some(kind))
        .collect()
}

/// Refresh the part of the graph described by `region` (see the module
/// comment for the steps).
pub fn rebuild_region(
    graph: &mut NavGraph,
    level: &TileLevel,
    cfg: &NavConfig,
    region: &Region,
) -> RebuildStats {
    let bs = cfg.block_size;
    let center = region.center;
    let changed: Vec<NodeId> = region
        .changed
        .iter()
        .copied()
        .filter(|&id| graph.contains(id))
        .collect();
    let changed_set: BTreeSet<NodeId> = changed.iter().copied().collect();
    let context: Vec<NodeId> = region
        .context
        .iter()
        .copied()
        .filter(|&id| graph.contains(id))
        .collect();

    // 1. Strip.
    for &c in &changed {
        graph.discard_spawned(c);
        graph.clear_outgoing(c);
        let fixed_in: Vec<NodeId> = graph
            .incoming(c)
            .iter()
            .copied()
            .filter(|&from| graph.kind(from).is_some_and(|k| !k.is_spawned()))
            .collect();
        for from in fixed_in {
            graph.remove_edge(from, c);
        }
    }

    // 2. Walk, climb and portal edges.
    let cg = of_kind(graph, &changed, NodeKind::Ground);
    let cl = of_kind(graph, &changed, NodeKind::Climb);
    let xg = of_kind(graph, &context, NodeKind::Ground);
    let xl = of_kind(graph, &context, NodeKind::Climb);
    let xp = of_kind(graph, &context, NodeKind::Portal);

    let mut added = 0;
    added += connect_ground(graph, level, cfg, &cg, &xg);
    added += connect_ground(graph, level, cfg, &xg, &cg);
    added += connect_ladders(graph, cfg, &cl, &xl, false);
    added += connect_ladders(graph, cfg, &xl, &cl, false);
    added += connect_ladders(graph, cfg, &cg, &xl, true);
    added += connect_ladders(graph, cfg, &xl, &cg, true);
    added += connect_ladders(graph, cfg, &cl, &xg, true);
    added += connect_ladders(graph, cfg, &xg, &cl, true);
    let partners = portal_partners(graph, level, &xp);
    added += connect_portal_ground(graph, level, cfg, &xp, &cg, |p| partners.contains_key(&p));

    // 3. Rediscover.
    let spawned = discover(graph, level, cfg, &cg);

    // 4. Border spawned nodes of unchanged anchors near the edit.
    let border_dx = cfg.region.larger_search_size * bs;
    let border: Vec<NodeId> = graph
        .nodes()
        .filter(|n| n.kind.is_spawned())
        .filter(|n| n.spawned_from.is_some_and(|s| !changed_set.contains(&s)))
        .filter(|n| (n.position.x - center.x).abs() < border_dx)
        .map(|n| n.id)
        .collect();
    for &b in &border {
        graph.clear_outgoing(b);
    }

    let column_dx = (cfg.region.larger_search_size + cfg.max_jump_blocks_x as f32 + 2.0) * bs;
    let column: Vec<NodeId> = graph
        .nodes()
        .filter(|n| n.kind == NodeKind::Ground && (n.position.x - center.x).abs() < column_dx)
        .map(|n| n.id)
        .collect();

    let mut jumps = spawned.jumps.clone();
    jumps.extend(of_kind(graph, &border, NodeKind::Jump));
    let mut falls = spawned.falls.clone();
    falls.extend(of_kind(graph, &border, NodeKind::Fall));
    added += connect_jumps(graph, level, cfg, &jumps, &column);
    added += connect_falls(graph, level, cfg, &falls, &column);

    debug_assert!(graph.check_integrity().is_ok());
    let stats = RebuildStats {
        changed: changed.len(),
        context: context.len(),
        spawned: spawned.len(),
        border: border.len(),
        edges_added: added,
    };
    log::debug!("rebuilt region at {center}: {stats:?}");
    stats
}

// ---------------------------------------------------------------------------
// Portals
// ---------------------------------------------------------------------------

/// Drop and recompute every edge of the given portal nodes from the
/// current tile links.
pub fn refresh_portals(graph: &mut NavGraph, level: &TileLevel, cfg: &NavConfig, portals: &[NodeId]) {
    let portals: Vec<NodeId> = portals
        .iter()
        .copied()
        .filter(|&p| graph.kind(p) == Some(NodeKind::Portal))
        .collect();
    for &p in &portals {
        graph.clear_outgoing(p);
        for from in graph.incoming(p).to_vec() {
            graph.remove_edge(from, p);
        }
    }

    let all_portals = graph.ids_of_kind(NodeKind::Portal);
    let partners = portal_partners(graph, level, &all_portals);
    let mut pair_from = portals.clone();
    pair_from.extend(portals.iter().filter_map(|p| partners.get(p).copied()));
    connect_portal_pairs(graph, &pair_from, |p| partners.get(&p).copied());

    let grounds = graph.ids_of_kind(NodeKind::Ground);
    connect_portal_ground(graph, level, cfg, &portals, &grounds, |p| partners.contains_key(&p));
}

// ---------------------------------------------------------------------------
// Tile edits
// ---------------------------------------------------------------------------

fn layer_needs_region(cfg: &NavConfig, layer: Layer) -> bool {
    matches!(layer, Layer::Ground | Layer::OneWay) || cfg.probe_layers.contains(layer.mask())
}

/// Bring the graph up to date after `tile` was inserted into `level`.
/// Returns the tile's new node.
pub fn apply_tile_added(
    graph: &mut NavGraph,
    level: &TileLevel,
    cfg: &NavConfig,
    tile: &Tile,
) -> NodeId {
    let (kind, pos) = tile_node(level, cfg, tile);
    let id = graph.add_tile_node(kind, pos, tile.id);
    match tile.layer {
        Layer::Ladder => {
            let region = collect_region(graph, cfg, pos);
            let xg = of_kind(graph, &region.context, NodeKind::Ground);
            let xl = of_kind(graph, &region.context, NodeKind::Climb);
            connect_ladders(graph, cfg, &[id], &xl, false);
            connect_ladders(graph, cfg, &xl, &[id], false);
            connect_ladders(graph, cfg, &[id], &xg, true);
            connect_ladders(graph, cfg, &xg, &[id], true);
        }
        Layer::Portal => {
            let mut affected = vec![id];
            affected.extend(tile.link.and_then(|l| graph.node_for_tile(l)));
            refresh_portals(graph, level, cfg, &affected);
        }
        Layer::Ground | Layer::OneWay => {}
    }
    if layer_needs_region(cfg, tile.layer) {
        let region = collect_region(graph, cfg, pos);
        rebuild_region(graph, level, cfg, &region);
    }
    id
}

/// Bring the graph up to date after `tile` was removed from `level`.
/// Returns false if the graph had no node for it.
pub fn apply_tile_removed(
    graph: &mut NavGraph,
    level: &TileLevel,
    cfg: &NavConfig,
    tile: &Tile,
) -> bool {
    let Some(id) = graph.node_for_tile(tile.id) else {
        return false;
    };
    let Some(pos) = graph.position(id) else {
        return false;
    };
    graph.remove_node(id);

    if tile.layer == Layer::Portal
        && let Some(partner) = tile.link.and_then(|l| graph.node_for_tile(l))
    {
        refresh_portals(graph, level, cfg, &[partner]);
    }
    if layer_needs_region(cfg, tile.layer) {
        let region = collect_region(graph, cfg, pos);
        rebuild_region(graph, level, cfg, &region);
    }
    true
}
