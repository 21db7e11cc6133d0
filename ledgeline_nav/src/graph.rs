// Navigation graph store.
//
// The graph is an arena of `NavNode`s addressed by `NodeId` (a slot index).
// Removing a node empties its slot; slots are never reused, so ids held by
// requesters or in-flight searches can go stale but never alias another
// node. Adjacency is a plain list of directed `neighbours` per node, with a
// mirrored `incoming` list so a removal can scrub every edge pointing at
// the node in O(degree) instead of scanning the whole graph.
//
// Jump and Fall nodes are spawned from an anchor (a Ground or Climb node).
// The anchor keeps the list of nodes it spawned, and removing the anchor
// removes them with it. Ground/Climb/Portal nodes built from tiles keep a
// weak `TileId` back-reference so tile removal can find them.
//
// Iteration is always in slot order and nearest-node ties go to the lowest
// id, so everything built on top of the store is deterministic.
//
// See also: `builder.rs` which populates the store from a `TileLevel`,
// `edges.rs` for the adjacency rules, `planner.rs` for search over it.

use crate::config::NodeWeights;
use crate::types::{NodeId, NodeKind, TileId, Vec2};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeSet, VecDeque};

/// Exact identity of a node by content: kind, position bits and
/// `real_height` bits. Used to compare graphs across rebuilds, where node
/// ids differ but positions are reproduced bit for bit.
pub type NodeKey = (NodeKind, (u32, u32), u32);

/// A sampled point of the navigation graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NavNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Vec2,
    /// Search cost of stepping onto this node (its kind's weight).
    pub cost: f32,
    /// Jump nodes: clearance actually available above the anchor.
    pub height: f32,
    /// Jump nodes: the jump class a requester needs to use this node. Equal
    /// to `height` unless a ceiling cut the jump short.
    pub real_height: f32,
    pub spawned_from: Option<NodeId>,
    /// Jump/Fall nodes this node spawned.
    pub spawned: SmallVec<[NodeId; 8]>,
    pub neighbours: SmallVec<[NodeId; 8]>,
    incoming: SmallVec<[NodeId; 8]>,
    pub tile: Option<TileId>,
}

impl NavNode {
    pub fn key(&self) -> NodeKey {
        (self.kind, self.position.to_bits(), self.real_height.to_bits())
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct NavGraph {
    slots: Vec<Option<NavNode>>,
    weights: NodeWeights,
    live: usize,
    #[serde(skip)]
    by_tile: FxHashMap<TileId, NodeId>,
}

impl NavGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: NodeWeights) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    pub fn add_node(&mut self, kind: NodeKind, position: Vec2) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Some(NavNode {
            id,
            kind,
            position,
            cost: self.weights.weight(kind),
            height: 0.0,
            real_height: 0.0,
            spawned_from: None,
            spawned: SmallVec::new(),
            neighbours: SmallVec::new(),
            incoming: SmallVec::new(),
            tile: None,
        }));
        self.live += 1;
        id
    }

    /// Add a node standing for a level tile (Ground, Climb or Portal).
    pub fn add_tile_node(&mut self, kind: NodeKind, position: Vec2, tile: TileId) -> NodeId {
        let id = self.add_node(kind, position);
        if let Some(node) = self.slot_mut(id) {
            node.tile = Some(tile);
        }
        self.by_tile.insert(tile, id);
        id
    }

    pub fn add_jump_node(
        &mut self,
        anchor: NodeId,
        position: Vec2,
        height: f32,
        real_height: f32,
    ) -> Option<NodeId> {
        let id = self.spawn(anchor, NodeKind::Jump, position)?;
        if let Some(node) = self.slot_mut(id) {
            node.height = height;
            node.real_height = real_height;
        }
        Some(id)
    }

    pub fn add_fall_node(&mut self, anchor: NodeId, position: Vec2) -> Option<NodeId> {
        self.spawn(anchor, NodeKind::Fall, position)
    }

    fn spawn(&mut self, anchor: NodeId, kind: NodeKind, position: Vec2) -> Option<NodeId> {
        if !self.contains(anchor) {
            return None;
        }
        let id = self.add_node(kind, position);
        if let Some(node) = self.slot_mut(id) {
            node.spawned_from = Some(anchor);
        }
        if let Some(a) = self.slot_mut(anchor) {
            a.spawned.push(id);
        }
        Some(id)
    }

    /// Remove a node, everything it spawned, and every edge touching them.
    /// Returns false if the node was already gone.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.slot_mut(id).map(|n| std::mem::take(&mut n.spawned)) else {
            return false;
        };
        for child in node {
            self.remove_node(child);
        }

        let Some(node) = self.slots.get_mut(id.index()).and_then(Option::take) else {
            return false;
        };
        self.live -= 1;

        for &to in &node.neighbours {
            if let Some(n) = self.slot_mut(to) {
                n.incoming.retain(|x| *x != id);
            }
        }
        for &from in &node.incoming {
            if let Some(n) = self.slot_mut(from) {
                n.neighbours.retain(|x| *x != id);
            }
        }
        if let Some(parent) = node.spawned_from
            && let Some(p) = self.slot_mut(parent)
        {
            p.spawned.retain(|x| *x != id);
        }
        if let Some(tile) = node.tile
            && self.by_tile.get(&tile) == Some(&id)
        {
            self.by_tile.remove(&tile);
        }
        true
    }

    /// Remove every Jump/Fall node `anchor` spawned. Returns how many went.
    pub fn discard_spawned(&mut self, anchor: NodeId) -> usize {
        let spawned = self.spawned(anchor).to_vec();
        spawned
            .into_iter()
            .filter(|&child| self.remove_node(child))
            .count()
    }

    pub fn node(&self, id: NodeId) -> Option<&NavNode> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut NavNode> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).map(|n| n.kind)
    }

    pub fn position(&self, id: NodeId) -> Option<Vec2> {
        self.node(id).map(|n| n.position)
    }

    pub fn spawned(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.spawned.as_slice())
    }

    pub fn node_for_tile(&self, tile: TileId) -> Option<NodeId> {
        self.by_tile.get(&tile).copied()
    }

    /// Live nodes in slot order.
    pub fn nodes(&self) -> impl Iterator<Item = &NavNode> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn ids_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| n.kind == kind)
            .map(|n| n.id)
            .collect()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots ever allocated, live or not. Per-search scratch is
    /// sized by this.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn weights(&self) -> &NodeWeights {
        &self.weights
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Add the directed edge `from -> to`. Self-loops, duplicates and edges
    /// touching missing nodes are ignored (returns false).
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        if from == to || !self.contains(to) {
            return false;
        }
        let Some(a) = self.slot_mut(from) else {
            return false;
        };
        if a.neighbours.contains(&to) {
            return false;
        }
        a.neighbours.push(to);
        if let Some(b) = self.slot_mut(to) {
            b.incoming.push(from);
        }
        true
    }

    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        let Some(a) = self.slot_mut(from) else {
            return false;
        };
        let before = a.neighbours.len();
        a.neighbours.retain(|x| *x != to);
        if a.neighbours.len() == before {
            return false;
        }
        if let Some(b) = self.slot_mut(to) {
            b.incoming.retain(|x| *x != from);
        }
        true
    }

    /// Drop every outgoing edge of `id`.
    pub fn clear_outgoing(&mut self, id: NodeId) {
        let Some(a) = self.slot_mut(id) else {
            return;
        };
        let targets = std::mem::take(&mut a.neighbours);
        for to in targets {
            if let Some(b) = self.slot_mut(to) {
                b.incoming.retain(|x| *x != id);
            }
        }
    }

    pub fn neighbours(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.neighbours.as_slice())
    }

    /// Nodes with an edge into `id`.
    pub fn incoming(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.incoming.as_slice())
    }

    pub fn edge_count(&self) -> usize {
        self.nodes().map(|n| n.neighbours.len()).sum()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Nearest node of one of `kinds` to `point` that has at least one
    /// neighbour and passes `accept`. Ties go to the lowest id.
    pub fn nearest_node(
        &self,
        kinds: &[NodeKind],
        point: Vec2,
        accept: impl Fn(&NavNode) -> bool,
    ) -> Option<NodeId> {
        let mut best: Option<(f32, NodeId)> = None;
        for node in self.nodes() {
            if !kinds.contains(&node.kind) || node.neighbours.is_empty() || !accept(node) {
                continue;
            }
            let d = node.position.distance(point);
            if best.is_none_or(|(bd, _)| d < bd) {
                best = Some((d, node.id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Every node reachable from `start` by following edges, including
    /// `start` itself.
    pub fn reachable_from(&self, start: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        if !self.contains(start) {
            return seen;
        }
        let mut queue = VecDeque::from([start]);
        seen.insert(start);
        while let Some(id) = queue.pop_front() {
            for &n in self.neighbours(id) {
                if seen.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        seen
    }

    /// Content keys of all live nodes, in slot order.
    pub fn node_keys(&self) -> Vec<NodeKey> {
        self.nodes().map(NavNode::key).collect()
    }

    /// The adjacency as a set of `(from, to)` content-key pairs. Two graphs
    /// with the same signature have the same edges between the same points,
    /// whatever their slot numbering.
    pub fn edge_signature(&self) -> BTreeSet<(NodeKey, NodeKey)> {
        let mut sig = BTreeSet::new();
        for node in self.nodes() {
            let from = node.key();
            for &to in &node.neighbours {
                if let Some(t) = self.node(to) {
                    sig.insert((from, t.key()));
                }
            }
        }
        sig
    }

    /// Verify structural invariants: no self-loops, no duplicate or
    /// dangling edges, `incoming` mirrors `neighbours`, and spawn links are
    /// consistent in both directions.
    pub fn check_integrity(&self) -> Result<(), String> {
        let mut live = 0;
        for node in self.nodes() {
            live += 1;
            let id = node.id;
            for (i, &to) in node.neighbours.iter().enumerate() {
                if to == id {
                    return Err(format!("{id:?} has a self-loop"));
                }
                if node.neighbours[..i].contains(&to) {
                    return Err(format!("{id:?} lists {to:?} twice"));
                }
                match self.node(to) {
                    None => return Err(format!("{id:?} points at removed {to:?}")),
                    Some(t) if !t.incoming.contains(&id) => {
                        return Err(format!("{to:?} is missing incoming {id:?}"));
                    }
                    Some(_) => {}
                }
            }
            for &from in &node.incoming {
                if !self.neighbours(from).contains(&id) {
                    return Err(format!("stale incoming {from:?} on {id:?}"));
                }
            }
            if node.kind.is_spawned() {
                let Some(parent) = node.spawned_from else {
                    return Err(format!("{id:?} has no spawning anchor"));
                };
                if !self.spawned(parent).contains(&id) {
                    return Err(format!("{parent:?} does not own spawned {id:?}"));
                }
            }
            for &child in &node.spawned {
                if self.node(child).and_then(|c| c.spawned_from) != Some(id) {
                    return Err(format!("{child:?} does not point back at {id:?}"));
                }
            }
        }
        if live != self.live {
            return Err(format!("live count {} != {}", self.live, live));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
