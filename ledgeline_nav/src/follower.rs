// Per-requester bookkeeping for a delivered path.
//
// The navigator installs an `ActivePath` when a search succeeds. It tracks
// which waypoint the requester is heading for and watches reported
// positions for a stalled follower, so a path that cannot be completed
// (a tile appeared in the way, a jump fell short) gets flagged dirty and
// recomputed.
//
// On install, two adjustments pick the starting waypoint:
// - Salvage: if the requester has drifted more than `salvage_distance`
//   from the first waypoint (the result arrived late), start from the
//   Ground/Climb waypoint nearest to where they are now.
// - Skip-first: when the first two waypoints are both Ground or both Climb
//   the requester is already on that surface; go straight to the second.
//
// See also: `navigator.rs` which owns one `ActivePath` per requester,
// `config.rs` for `FollowerConfig`.

use crate::config::FollowerConfig;
use crate::request::PathGoal;
use crate::types::{NodeKind, Vec2, Waypoint};

/// Outcome of one `ActivePath::check_progress` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressCheck {
    /// Closer to the current waypoint than last time.
    Advancing,
    /// Within `point_accuracy` of the current waypoint; the cursor moved on.
    Reached,
    /// No closer than last time, but not yet for long enough to give up.
    Stalled,
    /// Stalled for `max_stalled_checks` checks in a row; the path should be
    /// recomputed.
    Dirty,
    /// Nothing left to follow.
    Complete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActivePath {
    waypoints: Vec<Waypoint>,
    cursor: usize,
    goal: PathGoal,
    last_distance: Option<f32>,
    stalled: u32,
}

impl ActivePath {
    /// Start following `waypoints` from `position`.
    pub fn new(
        waypoints: Vec<Waypoint>,
        goal: PathGoal,
        position: Vec2,
        cfg: &FollowerConfig,
        block_size: f32,
    ) -> Self {
        let cursor = start_index(&waypoints, position, cfg.salvage_distance * block_size);
        Self {
            waypoints,
            cursor,
            goal,
            last_distance: None,
            stalled: 0,
        }
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn goal(&self) -> PathGoal {
        self.goal
    }

    pub fn current(&self) -> Option<Waypoint> {
        self.waypoints.get(self.cursor).copied()
    }

    /// Where the path ends.
    pub fn destination(&self) -> Option<Vec2> {
        self.waypoints.last().map(|w| w.position)
    }

    /// Waypoints not yet reached, including the current one.
    pub fn remaining(&self) -> usize {
        self.waypoints.len().saturating_sub(self.cursor)
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.waypoints.len()
    }

    /// Move on to the next waypoint. Returns the new current waypoint, if
    /// any.
    pub fn advance(&mut self) -> Option<Waypoint> {
        if self.cursor < self.waypoints.len() {
            self.cursor += 1;
        }
        self.last_distance = None;
        self.stalled = 0;
        self.current()
    }

    /// Record the requester's position. Only grounded checks count toward
    /// stalling; mid-air distance changes say nothing about progress.
    pub fn check_progress(
        &mut self,
        position: Vec2,
        grounded: bool,
        cfg: &FollowerConfig,
        block_size: f32,
    ) -> ProgressCheck {
        let Some(target) = self.current() else {
            return ProgressCheck::Complete;
        };
        let d = position.distance(target.position);
        if d < cfg.point_accuracy * block_size {
            self.advance();
            return ProgressCheck::Reached;
        }
        if !grounded {
            return ProgressCheck::Advancing;
        }

        let closer = self.last_distance.is_none_or(|last| d < last);
        self.last_distance = Some(d);
        if closer {
            self.stalled = 0;
            return ProgressCheck::Advancing;
        }
        self.stalled += 1;
        if self.stalled >= cfg.max_stalled_checks {
            self.stalled = 0;
            ProgressCheck::Dirty
        } else {
            ProgressCheck::Stalled
        }
    }
}

fn start_index(waypoints: &[Waypoint], position: Vec2, salvage_distance: f32) -> usize {
    let Some(first) = waypoints.first() else {
        return 0;
    };
    if position.distance(first.position) > salvage_distance {
        let mut best: Option<(f32, usize)> = None;
        for (i, w) in waypoints.iter().enumerate() {
            if !w.kind.is_anchor() {
                continue;
            }
            let d = position.distance(w.position);
            if best.is_none_or(|(bd, _)| d < bd) {
                best = Some((d, i));
            }
        }
        if let Some((_, i)) = best {
            return i;
        }
    }
    match waypoints {
        [a, b, ..] if a.kind == b.kind && matches!(a.kind, NodeKind::Ground | NodeKind::Climb) => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground(x: f32) -> Waypoint {
        Waypoint::new(Vec2::new(x, 0.51), NodeKind::Ground)
    }

    fn path(waypoints: Vec<Waypoint>, at: Vec2) -> ActivePath {
        ActivePath::new(
            waypoints,
            PathGoal::Position(Vec2::new(9.0, 0.5)),
            at,
            &FollowerConfig::default(),
            1.0,
        )
    }

    #[test]
    fn skips_first_shared_surface_waypoint() {
        let p = path(vec![ground(0.0), ground(1.0), ground(2.0)], Vec2::new(0.0, 0.5));
        assert_eq!(p.cursor(), 1);
        assert_eq!(p.remaining(), 2);
    }

    #[test]
    fn keeps_first_waypoint_before_a_jump() {
        let jump = Waypoint::new(Vec2::new(0.0, 4.31), NodeKind::Jump);
        let p = path(vec![ground(0.0), jump, ground(5.0)], Vec2::new(0.0, 0.5));
        assert_eq!(p.cursor(), 0);
        assert_eq!(p.remaining(), 3);
    }

    #[test]
    fn salvage_starts_near_requester() {
        let wps = vec![ground(0.0), ground(1.0), ground(2.0), ground(3.0), ground(4.0)];
        let p = path(wps, Vec2::new(3.1, 0.5));
        assert_eq!(p.cursor(), 3);
    }

    #[test]
    fn advance_to_completion() {
        let jump = Waypoint::new(Vec2::new(0.0, 4.31), NodeKind::Jump);
        let mut p = path(vec![ground(0.0), jump], Vec2::new(0.0, 0.5));
        assert_eq!(p.advance(), Some(jump));
        assert_eq!(p.advance(), None);
        assert!(p.is_complete());
        assert_eq!(p.remaining(), 0);
        // Advancing past the end stays put.
        assert_eq!(p.advance(), None);
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn stalled_follower_goes_dirty() {
        let cfg = FollowerConfig::default();
        let mut p = path(vec![ground(0.0), ground(1.0), ground(5.0)], Vec2::new(0.0, 0.5));
        let here = Vec2::new(0.3, 0.5);
        assert_eq!(p.check_progress(here, true, &cfg, 1.0), ProgressCheck::Advancing);
        assert_eq!(p.check_progress(here, true, &cfg, 1.0), ProgressCheck::Stalled);
        assert_eq!(p.check_progress(here, true, &cfg, 1.0), ProgressCheck::Stalled);
        assert_eq!(p.check_progress(here, true, &cfg, 1.0), ProgressCheck::Dirty);
    }

    #[test]
    fn airborne_checks_do_not_stall() {
        let cfg = FollowerConfig::default();
        let mut p = path(vec![ground(0.0), ground(1.0), ground(5.0)], Vec2::new(0.0, 0.5));
        let here = Vec2::new(0.3, 0.5);
        for _ in 0..10 {
            assert_eq!(p.check_progress(here, false, &cfg, 1.0), ProgressCheck::Advancing);
        }
    }

    #[test]
    fn reaching_waypoint_advances() {
        let cfg = FollowerConfig::default();
        let mut p = path(vec![ground(0.0), ground(1.0), ground(2.0)], Vec2::new(0.0, 0.5));
        assert_eq!(p.check_progress(Vec2::new(1.05, 0.51), true, &cfg, 1.0), ProgressCheck::Reached);
        assert_eq!(p.current(), Some(ground(2.0)));
        p.advance();
        assert_eq!(p.check_progress(Vec2::new(2.0, 0.5), true, &cfg, 1.0), ProgressCheck::Complete);
    }
}
