// End-to-end path request scenarios.
//
// Each test builds a real `Navigator` over an ASCII level (via `TestHost`),
// submits requests the way a game would, and checks what is delivered at
// `update()`. Scenarios that depend on the worker thread run in both
// worker modes.

use std::time::Duration;

use ledgeline_nav::{
    Capabilities, Layer, NodeKind, PathRequest, RequesterId, TargetId, TileCell, Vec2, WorkerMode,
};
use ledgeline_tests::{TestHost, caps, count_kind, fixtures, kinds};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn p(x: f32, y: f32) -> Vec2 {
    Vec2::new(x, y)
}

// ---------------------------------------------------------------------------
// Basic scenarios
// ---------------------------------------------------------------------------

#[test]
fn walks_along_strip() {
    init_logging();
    let mut host = TestHost::new(fixtures::STRIP, WorkerMode::Inline);
    host.request(1, p(0.0, 0.5), p(4.0, 0.5), Capabilities::default());
    host.poll_until_delivered(1);
    let d = host.only_delivery();
    assert!(d.succeeded);
    assert!(kinds(d).iter().all(|&k| k == NodeKind::Ground));
    assert_eq!(d.waypoints.len(), 5);
    assert!(d.waypoints.windows(2).all(|w| w[0].position.x < w[1].position.x));
}

#[test]
fn gap_without_jump_fails() {
    init_logging();
    let mut host = TestHost::new(fixtures::GAP, WorkerMode::Inline);
    host.request(1, p(0.0, 0.5), p(7.0, 0.5), caps(false, true, true, true));
    host.poll_until_delivered(1);
    let d = host.only_delivery();
    assert!(!d.succeeded);
    assert!(d.waypoints.is_empty());
}

#[test]
fn gap_with_jump_uses_one_jump() {
    init_logging();
    let mut host = TestHost::new(fixtures::GAP, WorkerMode::Inline);
    host.request(1, p(0.0, 0.5), p(7.0, 0.5), Capabilities::full(3.8));
    host.poll_until_delivered(1);
    let d = host.only_delivery();
    assert!(d.succeeded);
    assert_eq!(count_kind(d, NodeKind::Jump), 1);
    assert_eq!(d.waypoints.last().map(|w| w.position.x), Some(7.0));
}

#[test]
fn cannot_move_fails() {
    init_logging();
    let mut host = TestHost::new(fixtures::STRIP, WorkerMode::Inline);
    let frozen = Capabilities {
        can_move: false,
        ..Capabilities::default()
    };
    host.request(1, p(0.0, 0.5), p(4.0, 0.5), frozen);
    host.poll_until_delivered(1);
    assert!(!host.only_delivery().succeeded);
}

#[test]
fn same_node_is_single_waypoint() {
    init_logging();
    let mut host = TestHost::new(fixtures::STRIP, WorkerMode::Inline);
    host.request(1, p(2.0, 0.5), p(2.05, 0.55), Capabilities::walker());
    host.poll_until_delivered(1);
    let d = host.only_delivery();
    assert!(d.succeeded);
    assert_eq!(d.waypoints.len(), 1);
}

// ---------------------------------------------------------------------------
// Ladders, portals, falls
// ---------------------------------------------------------------------------

#[test]
fn climbs_ladder_to_ledge() {
    init_logging();
    let mut host = TestHost::new(fixtures::LADDER, WorkerMode::Inline);
    host.request(1, p(0.0, 0.5), p(6.0, 3.5), caps(false, true, true, false));
    host.poll_until_delivered(1);
    let d = host.only_delivery();
    assert!(d.succeeded, "{d:?}");
    assert!(count_kind(d, NodeKind::Climb) >= 2);
    let last = d.waypoints.last().map(|w| w.position).unwrap();
    assert_eq!(last.x, 6.0);
    assert!((last.y - 3.51).abs() < 1e-4, "{last}");
}

#[test]
fn ledge_unreachable_without_climbing() {
    init_logging();
    let mut host = TestHost::new(fixtures::LADDER, WorkerMode::Inline);
    host.request(1, p(0.0, 0.5), p(6.0, 3.5), caps(false, false, true, false));
    host.poll_until_delivered(1);
    assert!(!host.only_delivery().succeeded);
}

#[test]
fn starts_on_ladder() {
    init_logging();
    let mut host = TestHost::new(fixtures::LADDER, WorkerMode::Inline);
    host.nav.request_path(
        PathRequest::new(RequesterId(1), p(4.0, 2.0), p(0.0, 0.5))
            .with_capabilities(caps(false, true, true, false))
            .on_ladder(),
    );
    host.poll_until_delivered(1);
    let d = host.only_delivery();
    assert!(d.succeeded, "{d:?}");
    assert_eq!(d.waypoints.first().map(|w| w.kind), Some(NodeKind::Climb));
    assert_eq!(d.waypoints.last().map(|w| w.position.x), Some(0.0));
}

#[test]
fn crosses_through_portals() {
    init_logging();
    let mut host = TestHost::new(fixtures::PORTALS, WorkerMode::Inline);
    host.request(1, p(0.0, 0.5), p(12.0, 0.5), caps(false, false, false, true));
    host.poll_until_delivered(1);
    let d = host.only_delivery();
    assert!(d.succeeded, "{d:?}");
    assert_eq!(count_kind(d, NodeKind::Portal), 2);
    assert_eq!(d.waypoints.last().map(|w| w.position.x), Some(12.0));
}

#[test]
fn portals_need_capability() {
    init_logging();
    let mut host = TestHost::new(fixtures::PORTALS, WorkerMode::Inline);
    host.request(1, p(0.0, 0.5), p(12.0, 0.5), Capabilities::walker());
    host.poll_until_delivered(1);
    assert!(!host.only_delivery().succeeded);
}

#[test]
fn falls_off_ledge() {
    init_logging();
    let mut host = TestHost::new(fixtures::LEDGE, WorkerMode::Inline);
    host.request(1, p(0.0, 3.5), p(5.0, 0.5), caps(false, false, true, false));
    host.poll_until_delivered(1);
    let d = host.only_delivery();
    assert!(d.succeeded, "{d:?}");
    assert_eq!(count_kind(d, NodeKind::Fall), 1);
    assert_eq!(d.waypoints.last().map(|w| w.position.x), Some(5.0));
}

#[test]
fn ledge_needs_fall_capability() {
    init_logging();
    let mut host = TestHost::new(fixtures::LEDGE, WorkerMode::Inline);
    host.request(1, p(0.0, 3.5), p(5.0, 0.5), caps(false, false, false, false));
    host.poll_until_delivered(1);
    assert!(!host.only_delivery().succeeded);
}

// ---------------------------------------------------------------------------
// Request lifecycle, both worker modes
// ---------------------------------------------------------------------------

fn newer_request_wins(mode: WorkerMode) {
    init_logging();
    let mut host = TestHost::new(fixtures::STRIP, mode);
    host.request(1, p(0.0, 0.5), p(4.0, 0.5), Capabilities::default());
    host.request(1, p(0.0, 0.5), p(2.0, 0.5), Capabilities::default());
    host.poll_until_delivered(1);
    host.settle(Duration::from_millis(100));
    let d = host.only_delivery();
    assert!(d.succeeded);
    assert_eq!(d.waypoints.last().map(|w| w.position.x), Some(2.0));
}

#[test]
fn newer_request_wins_inline() {
    newer_request_wins(WorkerMode::Inline);
}

#[test]
fn newer_request_wins_background() {
    newer_request_wins(WorkerMode::Background);
}

fn cancel_suppresses_delivery(mode: WorkerMode) {
    init_logging();
    let mut host = TestHost::new(fixtures::STRIP, mode);
    host.request(1, p(0.0, 0.5), p(4.0, 0.5), Capabilities::default());
    assert!(host.nav.cancel_path(RequesterId(1)));
    assert_eq!(host.settle(Duration::from_millis(100)), 0);
    assert!(host.inbox.is_empty());
}

#[test]
fn cancel_suppresses_delivery_inline() {
    cancel_suppresses_delivery(WorkerMode::Inline);
}

#[test]
fn cancel_suppresses_delivery_background() {
    cancel_suppresses_delivery(WorkerMode::Background);
}

#[test]
fn many_requesters_each_get_one_result() {
    init_logging();
    let mut host = TestHost::new(fixtures::STRIP, WorkerMode::Background);
    for r in 1..=6 {
        host.request(r, p(0.0, 0.5), p((r % 5) as f32, 0.5), Capabilities::default());
    }
    host.poll_until_delivered(6);
    host.settle(Duration::from_millis(50));
    let mut seen: Vec<u64> = host.inbox.iter().map(|d| d.requester.0).collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
    assert!(host.inbox.iter().all(|d| d.succeeded));
}

#[test]
fn unknown_target_is_delivered_as_failure() {
    init_logging();
    let mut host = TestHost::new(fixtures::STRIP, WorkerMode::Background);
    host.nav
        .request_path(PathRequest::new(RequesterId(1), p(0.0, 0.5), TargetId(42)));
    host.poll_until_delivered(1);
    assert!(!host.only_delivery().succeeded);
}

#[test]
fn tracked_target_path() {
    init_logging();
    let mut host = TestHost::new(fixtures::STRIP, WorkerMode::Background);
    host.nav.set_target_position(TargetId(7), p(3.0, 0.5));
    host.nav
        .request_path(PathRequest::new(RequesterId(1), p(0.0, 0.5), TargetId(7)));
    host.poll_until_delivered(1);
    let d = host.only_delivery();
    assert!(d.succeeded);
    assert_eq!(d.waypoints.last().map(|w| w.position.x), Some(3.0));
    assert_eq!(host.nav.nodes_remaining_on_current_path(RequesterId(1)), 3);
}

#[test]
fn edits_between_requests_are_seen() {
    init_logging();
    let mut host = TestHost::new(fixtures::GAP, WorkerMode::Background);
    let walker = Capabilities::walker();
    host.request(1, p(0.0, 0.5), p(7.0, 0.5), walker);
    host.poll_until_delivered(1);
    assert!(!host.inbox[0].succeeded);

    for x in [3, 4] {
        host.nav.on_tile_added(TileCell::new(x, 0), Layer::Ground).unwrap();
    }
    host.request(1, p(0.0, 0.5), p(7.0, 0.5), walker);
    host.poll_until_delivered(2);
    assert!(host.inbox[1].succeeded);
    assert_eq!(host.inbox[1].waypoints.len(), 8);
}
