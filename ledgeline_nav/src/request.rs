// Path request types and the requester callback contract.
//
// A requester describes what it can do with a `Capabilities` set and asks
// for a path with a `PathRequest`. Results come back through the
// `PathResultReceiver` trait, which hosts implement on whatever owns their
// characters. Delivery happens once per `Navigator::update()`, never in the
// middle of a search.
//
// See also: `navigator.rs` for the public request API, `worker.rs` for the
// queue that carries requests to the planner.

use crate::types::{NodeKind, RequesterId, TargetId, Vec2, Waypoint};
use serde::{Deserialize, Serialize};

/// Locomotion abilities of a requester.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_move: bool,
    pub can_jump: bool,
    pub can_climb: bool,
    pub can_fall: bool,
    pub can_portal: bool,
    /// Jump class: only jump nodes whose `real_height` matches this (within
    /// the configured tolerance) are usable.
    pub jump_height: f32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_move: true,
            can_jump: true,
            can_climb: true,
            can_fall: true,
            can_portal: true,
            jump_height: 3.8,
        }
    }
}

impl Capabilities {
    /// Walks only.
    pub fn walker() -> Self {
        Self {
            can_jump: false,
            can_climb: false,
            can_fall: false,
            can_portal: false,
            ..Self::default()
        }
    }

    /// Everything, with the given jump class.
    pub fn full(jump_height: f32) -> Self {
        Self {
            jump_height,
            ..Self::default()
        }
    }

    /// Whether nodes of `kind` may appear on this requester's path.
    pub fn allows(&self, kind: NodeKind) -> bool {
        match kind {
            NodeKind::Ground => self.can_move,
            NodeKind::Jump => self.can_jump,
            NodeKind::Fall => self.can_fall,
            NodeKind::Climb => self.can_climb,
            NodeKind::Portal => self.can_portal,
        }
    }
}

/// Where a path should end.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PathGoal {
    Position(Vec2),
    /// A tracked target, resolved to its latest position when the request
    /// is submitted.
    Target(TargetId),
}

impl From<Vec2> for PathGoal {
    fn from(p: Vec2) -> Self {
        PathGoal::Position(p)
    }
}

impl From<TargetId> for PathGoal {
    fn from(t: TargetId) -> Self {
        PathGoal::Target(t)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathRequest {
    pub requester: RequesterId,
    pub start: Vec2,
    pub goal: PathGoal,
    /// Resolve the start to the nearest ladder node instead of ground.
    pub start_on_ladder: bool,
    pub capabilities: Capabilities,
}

impl PathRequest {
    pub fn new(requester: RequesterId, start: Vec2, goal: impl Into<PathGoal>) -> Self {
        Self {
            requester,
            start,
            goal: goal.into(),
            start_on_ladder: false,
            capabilities: Capabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn on_ladder(mut self) -> Self {
        self.start_on_ladder = true;
        self
    }
}

/// One delivered result, as recorded by the `Vec` receiver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathDelivery {
    pub requester: RequesterId,
    pub waypoints: Vec<Waypoint>,
    pub succeeded: bool,
}

/// Callback a requester's owner implements to receive path results.
///
/// Called exactly once per accepted, non-superseded, non-cancelled request.
/// A failed search arrives with `succeeded == false` and no waypoints.
pub trait PathResultReceiver {
    fn receive_path_result(&mut self, requester: RequesterId, waypoints: &[Waypoint], succeeded: bool);
}

impl PathResultReceiver for Vec<PathDelivery> {
    fn receive_path_result(&mut self, requester: RequesterId, waypoints: &[Waypoint], succeeded: bool) {
        self.push(PathDelivery {
            requester,
            waypoints: waypoints.to_vec(),
            succeeded,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walker_allows_only_ground() {
        let caps = Capabilities::walker();
        assert!(caps.allows(NodeKind::Ground));
        for kind in [NodeKind::Jump, NodeKind::Fall, NodeKind::Climb, NodeKind::Portal] {
            assert!(!caps.allows(kind), "{kind}");
        }
    }

    #[test]
    fn request_builder() {
        let req = PathRequest::new(RequesterId(4), Vec2::new(0.0, 0.5), TargetId(9))
            .with_capabilities(Capabilities::full(2.8))
            .on_ladder();
        assert_eq!(req.goal, PathGoal::Target(TargetId(9)));
        assert!(req.start_on_ladder);
        assert_eq!(req.capabilities.jump_height, 2.8);
    }

    #[test]
    fn vec_receiver_records_deliveries() {
        let mut inbox: Vec<PathDelivery> = Vec::new();
        let wp = [Waypoint::new(Vec2::new(1.0, 0.5), NodeKind::Ground)];
        inbox.receive_path_result(RequesterId(1), &wp, true);
        inbox.receive_path_result(RequesterId(2), &[], false);
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].waypoints, wp.to_vec());
        assert!(!inbox[1].succeeded);
    }
}
