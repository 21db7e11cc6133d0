// Test-only host for navigation integration tests.
//
// Wraps a real `Navigator` and a recording receiver to give tests a
// synchronous API: submit requests, then block until the navigator has
// delivered a result (background worker) or run one update (inline
// worker). Everything below the harness is the same code a game would
// call; the only test-specific code is the polling loop and the ASCII
// level fixtures.
//
// See also: `tests/scenarios.rs` for end-to-end path requests,
// `tests/incremental.rs` for graph maintenance properties.

use std::thread;
use std::time::{Duration, Instant};

use ledgeline_nav::{
    Capabilities, NavConfig, Navigator, NodeKind, PathDelivery, PathRequest, RequesterId,
    TileLevel, Vec2, WorkerMode,
};

/// Default timeout for blocking poll operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Level pictures shared by the tests. `#` ground, `-` one-way, `H` ladder,
/// `^` ladder top (ladder + one-way), digits are paired portals.
pub mod fixtures {
    /// Five ground tiles, x = 0..4.
    pub const STRIP: &str = "#####";

    /// Platforms x = 0..2 and x = 5..7 with a two-block gap.
    pub const GAP: &str = "###..###";

    /// Floor x = 0..4; a ladder at x = 4 climbs to a ledge x = 5..7 at y = 3.
    pub const LADDER: &str = "
        ....^###
        ....H...
        ....H...
        #####...
    ";

    /// Two islands joined only by a portal pair.
    pub const PORTALS: &str = "
        ..1.......1..
        ###.....#####
    ";

    /// A ledge x = 0..2 at y = 3 over a floor x = 0..6.
    pub const LEDGE: &str = "
        ###....
        .......
        .......
        #######
    ";
}

/// Config for `mode`, built through the JSON loader like a host would.
pub fn config_for(mode: WorkerMode) -> NavConfig {
    let json = serde_json::json!({ "worker_mode": mode });
    NavConfig::from_json(&json.to_string()).unwrap_or_else(|e| panic!("test config: {e}"))
}

/// Capabilities that can move, with the given abilities and the default
/// jump class.
pub fn caps(can_jump: bool, can_climb: bool, can_fall: bool, can_portal: bool) -> Capabilities {
    Capabilities {
        can_jump,
        can_climb,
        can_fall,
        can_portal,
        ..Capabilities::default()
    }
}

/// A navigator plus everything it has delivered so far.
pub struct TestHost {
    pub nav: Navigator,
    pub inbox: Vec<PathDelivery>,
}

impl TestHost {
    pub fn new(ascii: &str, mode: WorkerMode) -> Self {
        let level = TileLevel::from_ascii(ascii, 1.0).unwrap_or_else(|e| panic!("fixture: {e}"));
        let nav = Navigator::new(level, config_for(mode)).unwrap_or_else(|e| panic!("{e}"));
        Self {
            nav,
            inbox: Vec::new(),
        }
    }

    pub fn request(&mut self, requester: u64, start: Vec2, goal: Vec2, caps: Capabilities) {
        self.nav.request_path(
            PathRequest::new(RequesterId(requester), start, goal).with_capabilities(caps),
        );
    }

    /// Run one update. Returns the number of results delivered.
    pub fn tick(&mut self) -> usize {
        self.nav.update(&mut self.inbox)
    }

    /// Blocking poll until at least `count` results have been delivered in
    /// total. Returns the deliveries.
    pub fn poll_until_delivered(&mut self, count: usize) -> &[PathDelivery] {
        let start = Instant::now();
        while self.inbox.len() < count {
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for {count} deliveries, have {}",
                self.inbox.len()
            );
            if self.tick() == 0 {
                thread::sleep(POLL_INTERVAL);
            }
        }
        log::debug!("{} deliveries after {:?}", self.inbox.len(), start.elapsed());
        &self.inbox
    }

    /// Keep updating for `window` and return how many results arrived.
    pub fn settle(&mut self, window: Duration) -> usize {
        let start = Instant::now();
        let mut delivered = 0;
        while start.elapsed() < window {
            delivered += self.tick();
            thread::sleep(POLL_INTERVAL);
        }
        delivered
    }

    /// The single delivery so far, for tests that expect exactly one.
    pub fn only_delivery(&self) -> &PathDelivery {
        assert_eq!(self.inbox.len(), 1, "deliveries: {:?}", self.inbox);
        &self.inbox[0]
    }
}

/// Kinds along a delivered path.
pub fn kinds(delivery: &PathDelivery) -> Vec<NodeKind> {
    delivery.waypoints.iter().map(|w| w.kind).collect()
}

/// Number of waypoints of `kind` in a delivered path.
pub fn count_kind(delivery: &PathDelivery, kind: NodeKind) -> usize {
    delivery.waypoints.iter().filter(|w| w.kind == kind).count()
}
