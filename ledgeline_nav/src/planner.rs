// Best-first path search over the navigation graph.
//
// Resolves a start and goal position to graph nodes, then runs A* with the
// requester's capabilities filtering which node kinds may be entered. The
// step cost is the weight of the node being entered (so a path's cost is
// the sum of its nodes' weights after the start), and the heuristic is the
// straight-line distance to the goal plus, for Jump nodes, the jump's
// `real_height`, so lower jumps are preferred.
//
// Search state (g, f, parent, open/closed flags) lives in `Vec`s indexed by
// `NodeId` and allocated per search, never on the graph itself, so two
// searches over the same `&NavGraph` cannot interfere. The open set is a
// `BinaryHeap` with reversed ordering: lowest f first, then the node that
// entered the open set earliest. A relaxed node keeps its original
// insertion sequence, so ties resolve the same way on every run.
//
// Jump nodes are class-filtered at expansion time: a Jump node is closed
// without relaxing its neighbours unless the requester's jump height is
// within `class_tolerance` increments of the node's `real_height` and does
// not overshoot it by more than `overshoot_tolerance` increments.
//
// See also: `graph.rs` for the store being searched, `worker.rs` which runs
// searches off the caller's thread, `request.rs` for `Capabilities`.

use crate::config::NavConfig;
use crate::graph::NavGraph;
use crate::request::Capabilities;
use crate::types::{NodeId, NodeKind, Vec2, Waypoint};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use thiserror::Error;

/// Why a search produced no path. Every variant is delivered to the
/// requester as a plain failure.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("requester cannot move")]
    CannotMove,
    #[error("no connected node near the start position")]
    NoStartNode,
    #[error("no connected node near the goal position")]
    NoGoalNode,
    #[error("open set exhausted before reaching the goal")]
    Exhausted,
    #[error("parent chain does not lead back to the start node")]
    BrokenChain,
    #[error("goal refers to an unknown tracked target")]
    UnknownTarget,
}

/// Resolved inputs for one search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlanQuery {
    pub start: Vec2,
    pub goal: Vec2,
    pub start_on_ladder: bool,
    pub capabilities: Capabilities,
}

/// A successful search: node sequence from start to goal (inclusive) and
/// its total cost.
#[derive(Clone, Debug)]
pub struct SearchResult {
    pub nodes: Vec<NodeId>,
    pub total_cost: f32,
    pub expanded: usize,
}

/// Entry in the open set (min-heap via reversed ordering).
struct OpenEntry {
    node: NodeId,
    f_score: f32,
    seq: u32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Smallest f, then earliest insertion, is "greatest".
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Nearest connected Ground node the requester can be standing on, or the
/// nearest Climb node when they start on a ladder.
pub fn resolve_start(graph: &NavGraph, cfg: &NavConfig, start: Vec2, on_ladder: bool) -> Option<NodeId> {
    let bs = cfg.block_size;
    if on_ladder {
        return graph.nearest_node(&[NodeKind::Climb], start, |n| {
            (n.position.x - start.x).abs() < bs
        });
    }
    let tol = cfg.endpoint_tolerance * bs;
    graph.nearest_node(&[NodeKind::Ground], start, |n| {
        start.y + tol >= n.position.y && (n.position.x - start.x).abs() < bs
    })
}

/// Nearest connected Ground node at or below the goal within
/// `goal_max_drop`, falling back to the nearest Climb node at or below it.
pub fn resolve_goal(graph: &NavGraph, cfg: &NavConfig, goal: Vec2) -> Option<NodeId> {
    let bs = cfg.block_size;
    let tol = cfg.endpoint_tolerance * bs;
    let max_drop = cfg.goal_max_drop * bs;
    let below = |y: f32| y <= goal.y + tol;
    graph
        .nearest_node(&[NodeKind::Ground], goal, |n| {
            below(n.position.y)
                && (n.position.x - goal.x).abs() < bs
                && goal.y - n.position.y < max_drop
        })
        .or_else(|| {
            graph.nearest_node(&[NodeKind::Climb], goal, |n| {
                below(n.position.y) && (n.position.x - goal.x).abs() < bs
            })
        })
}

/// Whether a requester of jump class `jump` may use a Jump node whose
/// class is `real_height`.
pub fn jump_class_matches(cfg: &NavConfig, real_height: f32, jump: f32) -> bool {
    let inc = cfg.jump_height_increment;
    (real_height - jump).abs() < inc * cfg.jump.class_tolerance
        && jump <= real_height + inc * cfg.jump.overshoot_tolerance
}

/// Resolve `query` against the graph and search it, returning one waypoint
/// per node on the path.
pub fn plan_path(graph: &NavGraph, cfg: &NavConfig, query: &PlanQuery) -> Result<Vec<Waypoint>, PathError> {
    if !query.capabilities.can_move {
        return Err(PathError::CannotMove);
    }
    let start = resolve_start(graph, cfg, query.start, query.start_on_ladder)
        .ok_or(PathError::NoStartNode)?;
    let goal = resolve_goal(graph, cfg, query.goal).ok_or(PathError::NoGoalNode)?;
    let result = search(graph, cfg, start, goal, &query.capabilities)?;
    Ok(result
        .nodes
        .iter()
        .filter_map(|&id| graph.node(id).map(|n| Waypoint::new(n.position, n.kind)))
        .collect())
}

/// A* from `start` to `goal` over nodes `caps` allows.
pub fn search(
    graph: &NavGraph,
    cfg: &NavConfig,
    start: NodeId,
    goal: NodeId,
    caps: &Capabilities,
) -> Result<SearchResult, PathError> {
    debug_assert!(
        graph.check_integrity().is_ok(),
        "search over an inconsistent graph: {:?}",
        graph.check_integrity()
    );

    let Some(goal_pos) = graph.position(goal) else {
        return Err(PathError::NoGoalNode);
    };
    let Some(start_pos) = graph.position(start) else {
        return Err(PathError::NoStartNode);
    };
    if start == goal {
        return Ok(SearchResult {
            nodes: vec![start],
            total_cost: 0.0,
            expanded: 0,
        });
    }

    let n = graph.slot_count();
    // g_score[node] = cost of cheapest known path from start to node.
    let mut g_score = vec![f32::INFINITY; n];
    let mut f_score = vec![f32::INFINITY; n];
    let mut came_from: Vec<Option<NodeId>> = vec![None; n];
    // Position in the open set's insertion order; u32::MAX = never opened.
    let mut opened = vec![u32::MAX; n];
    let mut closed = vec![false; n];
    let mut next_seq = 0u32;
    let mut expanded = 0usize;

    let si = start.index();
    g_score[si] = 0.0;
    f_score[si] = start_pos.distance(goal_pos);
    opened[si] = next_seq;
    next_seq += 1;

    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        node: start,
        f_score: f_score[si],
        seq: opened[si],
    });

    while let Some(current) = open.pop() {
        let ci = current.node.index();
        if closed[ci] || current.f_score.to_bits() != f_score[ci].to_bits() {
            continue; // Stale entry.
        }
        if current.node == goal {
            let result = reconstruct(&came_from, start, goal, g_score[ci], expanded);
            log::trace!(
                "search {:?} -> {:?}: expanded {}, cost {}",
                start,
                goal,
                expanded,
                g_score[ci]
            );
            return result;
        }
        closed[ci] = true;
        expanded += 1;

        let Some(node) = graph.node(current.node) else {
            continue;
        };
        if node.kind == NodeKind::Jump && !jump_class_matches(cfg, node.real_height, caps.jump_height) {
            continue;
        }

        for &next in &node.neighbours {
            let Some(neighbour) = graph.node(next) else {
                continue;
            };
            if neighbour.kind != NodeKind::Ground && !caps.allows(neighbour.kind) {
                continue;
            }
            let ni = next.index();
            let tentative_g = g_score[ci] + neighbour.cost;
            if tentative_g >= g_score[ni] {
                continue;
            }
            let mut h = neighbour.position.distance(goal_pos);
            if neighbour.kind == NodeKind::Jump {
                h += neighbour.real_height;
            }
            g_score[ni] = tentative_g;
            f_score[ni] = tentative_g + h;
            came_from[ni] = Some(current.node);
            if closed[ni] {
                // Cheaper route to an expanded node: keep the better parent
                // but do not expand it again.
                continue;
            }
            if opened[ni] == u32::MAX {
                opened[ni] = next_seq;
                next_seq += 1;
            }
            open.push(OpenEntry {
                node: next,
                f_score: f_score[ni],
                seq: opened[ni],
            });
        }
    }

    log::trace!("search {:?} -> {:?}: exhausted after {} expansions", start, goal, expanded);
    Err(PathError::Exhausted)
}

/// Walk parents back from `goal`. Bounded by the number of slots, and only
/// accepted if the walk ends at `start`.
fn reconstruct(
    came_from: &[Option<NodeId>],
    start: NodeId,
    goal: NodeId,
    total_cost: f32,
    expanded: usize,
) -> Result<SearchResult, PathError> {
    let mut nodes = vec![goal];
    let mut current = goal;
    while current != start {
        if nodes.len() > came_from.len() {
            log::warn!("parent chain from {goal:?} does not terminate");
            return Err(PathError::BrokenChain);
        }
        match came_from[current.index()] {
            Some(prev) => {
                nodes.push(prev);
                current = prev;
            }
            None => {
                log::warn!("parent chain from {goal:?} stops at {current:?}, not {start:?}");
                return Err(PathError::BrokenChain);
            }
        }
    }
    nodes.reverse();
    Ok(SearchResult {
        nodes,
        total_cost,
        expanded,
    })
}
