// Navigator: the public face of the crate.
//
// Owns the shared `NavWorld` (config, tile level, navigation graph) behind
// an `Arc<RwLock<_>>`, the `PathWorker` that runs searches, and all
// per-requester state. Hosts call it from their simulation loop:
//
// - `request_path` / `cancel_path` at any time; neither blocks on a search.
// - `update(&mut receiver)` once per tick. This is the only place results
//   reach requesters: completed searches are matched against each
//   requester's latest ticket, stale ones are dropped, and the survivors
//   are delivered through `PathResultReceiver` in completion order.
// - `report_progress` / `waypoint_reached` while a requester follows its
//   path; a stalled path is re-requested automatically.
// - `on_tile_added` / `on_tile_removed` / `link_portals` for level edits.
//   These take the world's write lock, so they wait for a running search
//   to finish and the next search sees the rebuilt graph.
//
// Tickets: every accepted request gets a fresh ticket number, and only the
// newest ticket per requester is deliverable. That one rule covers
// supersession (older ticket), cancellation (no ticket) and results that
// finish after a newer request was made.
//
// See also: `worker.rs` for the queue, `follower.rs` for `ActivePath`,
// `builder.rs` for the graph maintenance behind the tile-edit calls.

use crate::builder::{apply_tile_added, apply_tile_removed, build_graph, refresh_portals};
use crate::config::{ConfigError, FollowerConfig, NavConfig};
use crate::follower::{ActivePath, ProgressCheck};
use crate::geometry::Layer;
use crate::graph::NavGraph;
use crate::level::{LevelError, TileLevel};
use crate::planner::{PathError, PlanQuery};
use crate::request::{PathGoal, PathRequest, PathResultReceiver};
use crate::types::{RequesterId, TargetId, TileCell, TileId, Vec2, Waypoint};
use crate::worker::{Finished, Job, PathWorker, Submitted};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Everything a search reads.
#[derive(Clone, Debug)]
pub struct NavWorld {
    pub config: NavConfig,
    pub level: TileLevel,
    pub graph: NavGraph,
}

impl NavWorld {
    /// Build the graph for `level`.
    pub fn new(level: TileLevel, config: NavConfig) -> Self {
        let graph = build_graph(&level, &config);
        Self {
            config,
            level,
            graph,
        }
    }
}

/// The newest accepted request of a requester, not yet delivered.
#[derive(Clone, Copy, Debug)]
struct Outstanding {
    ticket: u64,
}

pub struct Navigator {
    world: Arc<RwLock<NavWorld>>,
    worker: PathWorker,
    follower: FollowerConfig,
    block_size: f32,
    next_ticket: u64,
    outstanding: BTreeMap<RequesterId, Outstanding>,
    /// Failures decided at submission, delivered at the next `update()`.
    immediate: Vec<Finished>,
    /// Last request per requester, reused for automatic re-requests.
    last_request: BTreeMap<RequesterId, PathRequest>,
    active: BTreeMap<RequesterId, ActivePath>,
    positions: BTreeMap<RequesterId, Vec2>,
    targets: BTreeMap<TargetId, Vec2>,
    /// Consecutive failed deliveries per requester.
    failures: BTreeMap<RequesterId, u32>,
}

impl Navigator {
    /// Build the graph for `level` and start the worker.
    pub fn new(level: TileLevel, config: NavConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let follower = config.follower.clone();
        let block_size = config.block_size;
        let mode = config.worker_mode;
        let world = NavWorld::new(level, config);
        log::debug!(
            "navigator ready: {} tiles, {} nodes, {} edges, {:?} worker",
            world.level.len(),
            world.graph.len(),
            world.graph.edge_count(),
            mode
        );
        let world = Arc::new(RwLock::new(world));
        let worker = PathWorker::new(Arc::clone(&world), mode);
        Ok(Self {
            world,
            worker,
            follower,
            block_size,
            next_ticket: 1,
            outstanding: BTreeMap::new(),
            immediate: Vec::new(),
            last_request: BTreeMap::new(),
            active: BTreeMap::new(),
            positions: BTreeMap::new(),
            targets: BTreeMap::new(),
            failures: BTreeMap::new(),
        })
    }

    /// Read access to config, level and graph. Holding the guard blocks
    /// tile edits but not searches.
    pub fn world(&self) -> RwLockReadGuard<'_, NavWorld> {
        self.world.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn world_mut(&self) -> RwLockWriteGuard<'_, NavWorld> {
        self.world.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the current graph.
    pub fn graph_snapshot(&self) -> NavGraph {
        self.world().graph.clone()
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Ask for a path. The result arrives through a later `update()`.
    /// Replaces any undelivered request from the same requester.
    pub fn request_path(&mut self, request: PathRequest) {
        self.submit(request);
    }

    fn submit(&mut self, request: PathRequest) {
        let requester = request.requester;
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.positions.insert(requester, request.start);
        self.last_request.insert(requester, request);
        self.outstanding.insert(requester, Outstanding { ticket });
        self.immediate.retain(|f| f.requester != requester);

        let goal = match request.goal {
            PathGoal::Position(p) => Some(p),
            PathGoal::Target(t) => self.targets.get(&t).copied(),
        };
        let Some(goal) = goal else {
            log::debug!("request {ticket} from {requester}: unknown target");
            self.worker.cancel(requester);
            self.immediate.push(Finished {
                ticket,
                requester,
                result: Err(PathError::UnknownTarget),
            });
            return;
        };

        let job = Job {
            ticket,
            requester,
            query: PlanQuery {
                start: request.start,
                goal,
                start_on_ladder: request.start_on_ladder,
                capabilities: request.capabilities,
            },
        };
        match self.worker.submit(job) {
            Submitted::Queued => log::debug!("request {ticket} from {requester} queued"),
            Submitted::Replaced { ticket: old } => {
                log::debug!("request {ticket} from {requester} supersedes queued request {old}")
            }
        }
    }

    /// Re-issue the requester's last request from their latest known
    /// position, unless they have hit the failure limit.
    fn retry(&mut self, requester: RequesterId) -> bool {
        if self.failures.get(&requester).copied().unwrap_or(0) >= self.follower.max_path_attempts {
            return false;
        }
        let Some(mut request) = self.last_request.get(&requester).copied() else {
            return false;
        };
        if let Some(&p) = self.positions.get(&requester) {
            request.start = p;
        }
        self.submit(request);
        true
    }

    /// Drop the requester's undelivered request and current path. A search
    /// already running finishes, but its result is discarded.
    pub fn cancel_path(&mut self, requester: RequesterId) -> bool {
        let had_request = self.outstanding.remove(&requester).is_some();
        self.worker.cancel(requester);
        self.immediate.retain(|f| f.requester != requester);
        self.last_request.remove(&requester);
        let had_path = self.active.remove(&requester).is_some();
        if had_request || had_path {
            log::debug!("path for {requester} cancelled");
        }
        had_request || had_path
    }

    /// Whether the requester has a request that has not been delivered.
    pub fn is_pending(&self, requester: RequesterId) -> bool {
        self.outstanding.contains_key(&requester)
    }

    /// Deliver every result that completed since the last call. Returns the
    /// number delivered.
    pub fn update<R: PathResultReceiver + ?Sized>(&mut self, receiver: &mut R) -> usize {
        self.worker.run_pending_inline();
        let mut finished = std::mem::take(&mut self.immediate);
        finished.extend(self.worker.drain_finished());

        let mut delivered = 0;
        for f in finished {
            let current = self.outstanding.get(&f.requester).map(|o| o.ticket);
            if current != Some(f.ticket) {
                log::debug!("discarding stale result {} for {}", f.ticket, f.requester);
                continue;
            }
            self.outstanding.remove(&f.requester);
            self.deliver(f, receiver);
            delivered += 1;
        }
        delivered
    }

    fn deliver<R: PathResultReceiver + ?Sized>(&mut self, f: Finished, receiver: &mut R) {
        let requester = f.requester;
        match f.result {
            Ok(waypoints) => {
                self.failures.remove(&requester);
                let goal = self
                    .last_request
                    .get(&requester)
                    .map_or(PathGoal::Position(Vec2::ZERO), |r| r.goal);
                let at = self
                    .positions
                    .get(&requester)
                    .copied()
                    .or_else(|| waypoints.first().map(|w| w.position))
                    .unwrap_or(Vec2::ZERO);
                let path = ActivePath::new(waypoints, goal, at, &self.follower, self.block_size);
                log::debug!(
                    "delivering {} waypoints to {requester} (ticket {})",
                    path.waypoints().len(),
                    f.ticket
                );
                receiver.receive_path_result(requester, path.waypoints(), true);
                self.active.insert(requester, path);
            }
            Err(e) => {
                let failures = self.failures.entry(requester).or_default();
                *failures += 1;
                log::debug!("delivering failure to {requester} (ticket {}): {e}", f.ticket);
                if *failures >= self.follower.max_path_attempts {
                    log::debug!("{requester}: {failures} failed paths in a row, giving up");
                    self.active.remove(&requester);
                    self.last_request.remove(&requester);
                }
                receiver.receive_path_result(requester, &[], false);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Following
    // -----------------------------------------------------------------------

    pub fn active_path(&self, requester: RequesterId) -> Option<&ActivePath> {
        self.active.get(&requester)
    }

    /// Waypoints left on the requester's current path, including the one
    /// they are heading for. Zero without a path.
    pub fn nodes_remaining_on_current_path(&self, requester: RequesterId) -> usize {
        self.active.get(&requester).map_or(0, ActivePath::remaining)
    }

    pub fn current_waypoint(&self, requester: RequesterId) -> Option<Waypoint> {
        self.active.get(&requester).and_then(ActivePath::current)
    }

    /// The requester reached its current waypoint. Returns the next one.
    pub fn waypoint_reached(&mut self, requester: RequesterId) -> Option<Waypoint> {
        self.active.get_mut(&requester).and_then(ActivePath::advance)
    }

    /// Record where the requester is. A path that stops making progress
    /// while grounded is recomputed from here.
    pub fn report_progress(&mut self, requester: RequesterId, position: Vec2, grounded: bool) -> ProgressCheck {
        self.positions.insert(requester, position);
        let Some(path) = self.active.get_mut(&requester) else {
            return ProgressCheck::Complete;
        };
        let check = path.check_progress(position, grounded, &self.follower, self.block_size);
        if check == ProgressCheck::Dirty && !self.is_pending(requester) {
            log::debug!("path for {requester} is dirty, re-requesting");
            self.retry(requester);
        }
        check
    }

    // -----------------------------------------------------------------------
    // Tracked targets
    // -----------------------------------------------------------------------

    /// Set or move a tracked target. Requesters following a path to it are
    /// re-routed once it has moved `follow_distance` from their path's end.
    pub fn set_target_position(&mut self, target: TargetId, position: Vec2) {
        self.targets.insert(target, position);
        let threshold = self.follower.follow_distance * self.block_size;
        let stale: Vec<RequesterId> = self
            .active
            .iter()
            .filter(|(r, path)| {
                path.goal() == PathGoal::Target(target)
                    && !self.outstanding.contains_key(r)
                    && path.destination().is_some_and(|d| d.distance(position) > threshold)
            })
            .map(|(&r, _)| r)
            .collect();
        for requester in stale {
            log::debug!("target {target:?} moved, re-routing {requester}");
            self.retry(requester);
        }
    }

    pub fn remove_target(&mut self, target: TargetId) -> Option<Vec2> {
        self.targets.remove(&target)
    }

    pub fn target_position(&self, target: TargetId) -> Option<Vec2> {
        self.targets.get(&target).copied()
    }

    // -----------------------------------------------------------------------
    // Level edits
    // -----------------------------------------------------------------------

    /// Add a tile at `cell` and update the graph around it.
    pub fn on_tile_added(&mut self, cell: TileCell, layer: Layer) -> Result<TileId, LevelError> {
        let mut guard = self.world_mut();
        let world = &mut *guard;
        let id = world.level.insert(cell, layer)?;
        let Some(tile) = world.level.tile(id).cloned() else {
            return Err(LevelError::UnknownTile(id));
        };
        let node = apply_tile_added(&mut world.graph, &world.level, &world.config, &tile);
        log::debug!(
            "tile {id:?} added at {cell} ({layer:?}) as {node:?}; graph has {} nodes",
            world.graph.len()
        );
        debug_assert!(world.graph.check_integrity().is_ok());
        Ok(id)
    }

    /// Add a tile at the cell containing `position`.
    pub fn on_tile_added_at(&mut self, position: Vec2, layer: Layer) -> Result<TileId, LevelError> {
        let cell = self.world().level.cell_at(position);
        self.on_tile_added(cell, layer)
    }

    /// Remove a tile and update the graph around it. Returns false if the
    /// tile did not exist.
    pub fn on_tile_removed(&mut self, tile: TileId) -> bool {
        let mut guard = self.world_mut();
        let world = &mut *guard;
        let Some(removed) = world.level.remove(tile) else {
            return false;
        };
        apply_tile_removed(&mut world.graph, &world.level, &world.config, &removed);
        log::debug!(
            "tile {tile:?} removed from {}; graph has {} nodes",
            removed.cell,
            world.graph.len()
        );
        debug_assert!(world.graph.check_integrity().is_ok());
        true
    }

    /// Link two portal tiles and reconnect both, plus whatever they were
    /// linked to before.
    pub fn link_portals(&mut self, a: TileId, b: TileId) -> Result<(), LevelError> {
        let mut guard = self.world_mut();
        let world = &mut *guard;
        let mut affected: Vec<TileId> = vec![a, b];
        for id in [a, b] {
            affected.extend(world.level.tile(id).and_then(|t| t.link));
        }
        world.level.link_portals(a, b)?;
        let nodes: Vec<_> = affected
            .iter()
            .filter_map(|&t| world.graph.node_for_tile(t))
            .collect();
        refresh_portals(&mut world.graph, &world.level, &world.config, &nodes);
        log::debug!("portals {a:?} and {b:?} linked");
        Ok(())
    }
}
