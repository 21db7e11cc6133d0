// Data-driven navigation configuration.
//
// Every tunable number the graph builders and the planner use lives in
// `NavConfig`, loaded from JSON at startup. The builders never hard-code
// thresholds; they read them from here so level designers can retune
// jump/fall envelopes without recompiling. Distances are expressed in
// blocks unless a field says otherwise and are scaled by `block_size`
// where used.
//
// Parameters are grouped into nested sub-structs: `NodeWeights` (search
// cost per node kind), `JumpHeuristics` and `FallHeuristics` (edge
// envelopes and probe shapes), `RegionParams` (incremental rebuild window)
// and `FollowerConfig` (requester-side path bookkeeping). All structs are
// `#[serde(default)]`, so a JSON file only needs to name what it changes.
//
// See also: `edges.rs` and `discovery.rs` which read most of these values,
// `planner.rs` for the weights and jump-class tolerances, `navigator.rs`
// which owns the config as part of `NavWorld`.

use crate::geometry::LayerMask;
use crate::types::NodeKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Parameter groups
// ---------------------------------------------------------------------------

/// Cost of entering a node of each kind. The search adds the weight of the
/// node it steps onto; distance only enters through the heuristic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeWeights {
    pub ground: f32,
    pub jump: f32,
    pub fall: f32,
    pub climb: f32,
    pub portal: f32,
}

impl Default for NodeWeights {
    fn default() -> Self {
        Self {
            ground: 1.0,
            jump: 9.2,
            fall: 1.0,
            climb: 3.0,
            portal: 0.0,
        }
    }
}

impl NodeWeights {
    pub fn weight(&self, kind: NodeKind) -> f32 {
        match kind {
            NodeKind::Ground => self.ground,
            NodeKind::Jump => self.jump,
            NodeKind::Fall => self.fall,
            NodeKind::Climb => self.climb,
            NodeKind::Portal => self.portal,
        }
    }
}

/// Envelope and probe shape for jump edges, plus the jump-class tolerance
/// the planner applies when expanding jump nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpHeuristics {
    /// A requester may use a jump node if `|real_height - jump| <` this
    /// fraction of `jump_height_increment`...
    pub class_tolerance: f32,
    /// ...and its jump does not exceed `real_height` by more than this
    /// fraction of `jump_height_increment`.
    pub overshoot_tolerance: f32,
    /// Minimum rise-over-run: `apex - landing > dx * arc_ratio - 1 block`.
    pub arc_ratio: f32,
    /// Hard horizontal limit, in blocks, beyond the `max_jump_blocks_x` test.
    pub max_reach_blocks: f32,
    /// Head-hit reach (blocks) for ceiling-limited jumps taller than
    /// `head_hit_high_height`.
    pub head_hit_high_height: f32,
    pub head_hit_high_reach: f32,
    pub head_hit_mid_height: f32,
    pub head_hit_mid_reach: f32,
    pub head_hit_low_reach: f32,
    /// Ceiling-limited jumps up onto a higher ledge lose all reach beyond
    /// this horizontal offset (blocks).
    pub head_hit_upward_dx: f32,
}

impl Default for JumpHeuristics {
    fn default() -> Self {
        Self {
            class_tolerance: 0.92,
            overshoot_tolerance: 0.08,
            arc_ratio: 0.9,
            max_reach_blocks: 4.0,
            head_hit_high_height: 2.5,
            head_hit_high_reach: 3.5,
            head_hit_mid_height: 1.9,
            head_hit_mid_reach: 2.2,
            head_hit_low_reach: 1.5,
            head_hit_upward_dx: 1.5,
        }
    }
}

/// Envelope and probe shape for fall edges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallHeuristics {
    /// Steep drops are accepted when `drop > dx * steep_ratio + 1 block`.
    pub steep_ratio: f32,
    /// Horizontal limit for steep drops, in blocks.
    pub max_reach_blocks: f32,
    /// Drops taller than this (blocks) lower the midpoint probe...
    pub tall_drop_blocks: f32,
    /// ...by this many blocks.
    pub tall_drop_reduction: f32,
}

impl Default for FallHeuristics {
    fn default() -> Self {
        Self {
            steep_ratio: 2.2,
            max_reach_blocks: 4.0,
            tall_drop_blocks: 4.0,
            tall_drop_reduction: 1.3,
        }
    }
}

/// Window around an edited tile used by incremental rebuilds, in blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionParams {
    /// Anchors within this distance are rebuilt.
    pub search_size: f32,
    /// Nodes within this distance are edge candidates for rebuilt anchors.
    pub larger_search_size: f32,
    /// Nodes inside this box are also edge candidates (tall drops reach
    /// further vertically than horizontally).
    pub context_dx: f32,
    pub context_dy: f32,
}

impl Default for RegionParams {
    fn default() -> Self {
        Self {
            search_size: 4.2,
            larger_search_size: 9.0,
            context_dx: 4.2,
            context_dy: 8.0,
        }
    }
}

/// Requester-side path following bookkeeping (see `follower.rs`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    /// Distance at which a waypoint counts as reached.
    pub point_accuracy: f32,
    /// A tracked target this far from the path's end triggers a re-request.
    pub follow_distance: f32,
    /// A requester further than this from the first waypoint starts at the
    /// nearest walk/climb waypoint instead.
    pub salvage_distance: f32,
    /// Consecutive non-improving progress checks before a path is dirty.
    pub max_stalled_checks: u32,
    /// Consecutive failed deliveries before automatic re-requests stop.
    pub max_path_attempts: u32,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            point_accuracy: 0.18,
            follow_distance: 0.5,
            salvage_distance: 2.0,
            max_stalled_checks: 3,
            max_path_attempts: 3,
        }
    }
}

/// Where queued path requests are computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerMode {
    /// One dedicated worker thread.
    #[default]
    Background,
    /// On the caller's thread, at the start of each `update()`.
    Inline,
}

// ---------------------------------------------------------------------------
// NavConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Side length of one tile in world units.
    pub block_size: f32,
    /// Tallest jump node spawned above an anchor (world units).
    pub jump_height: f32,
    /// Horizontal jump envelope, in whole blocks.
    pub max_jump_blocks_x: u32,
    /// Step between spawned jump heights (world units).
    pub jump_height_increment: f32,
    /// Lowest jump height spawned (world units).
    pub minimum_jump: f32,
    /// Narrowing step when a jump probe hits a ceiling (blocks).
    pub jump_narrow_step: f32,
    /// Ground nodes float this far (blocks) above the tile top.
    pub ground_node_height: f32,
    /// Half-width slack (blocks) added to horizontal gap tests.
    pub ground_max_width: f32,
    /// Fall nodes sit `0.5 + fall_x_spacing` blocks beside their anchor.
    pub fall_x_spacing: f32,
    /// Length (blocks) of the downward probe under a fall candidate.
    pub fall_y_ground_dist: f32,
    /// Ground edges require `|dy| <` this many blocks.
    pub ground_dy_tolerance: f32,
    /// Ladder edges require `|dx| <` this many blocks.
    pub ladder_dx_tolerance: f32,
    /// Ladder/ground edges require distance `< 0.5 block +` this (world units).
    pub ladder_ground_extra: f32,
    /// Portal/ground edges require distance `<` this many blocks...
    pub portal_reach: f32,
    /// ...plus this (world units).
    pub portal_slack: f32,
    /// Vertical slack (blocks) when matching a start/goal point to a node.
    pub endpoint_tolerance: f32,
    /// A goal ground node may be at most this many blocks below the goal.
    pub goal_max_drop: f32,
    /// Layers that obstruct probes. Ground only by default.
    pub probe_layers: LayerMask,
    pub weights: NodeWeights,
    pub jump: JumpHeuristics,
    pub fall: FallHeuristics,
    pub region: RegionParams,
    pub follower: FollowerConfig,
    pub worker_mode: WorkerMode,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            block_size: 1.0,
            jump_height: 3.8,
            max_jump_blocks_x: 3,
            jump_height_increment: 1.0,
            minimum_jump: 1.8,
            jump_narrow_step: 0.1,
            ground_node_height: 0.01,
            ground_max_width: 0.35,
            fall_x_spacing: 0.25,
            fall_y_ground_dist: 0.02,
            ground_dy_tolerance: 0.7,
            ladder_dx_tolerance: 0.501,
            ladder_ground_extra: 0.2,
            portal_reach: 1.5,
            portal_slack: 0.1,
            endpoint_tolerance: 0.1,
            goal_max_drop: 4.0,
            probe_layers: LayerMask::GROUND,
            weights: NodeWeights::default(),
            jump: JumpHeuristics::default(),
            fall: FallHeuristics::default(),
            region: RegionParams::default(),
            follower: FollowerConfig::default(),
            worker_mode: WorkerMode::default(),
        }
    }
}

impl NavConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: NavConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that would make discovery loop forever, divide by
    /// zero, or give the search negative costs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("block_size", self.block_size)?;
        require_positive("jump_height_increment", self.jump_height_increment)?;
        require_positive("jump_narrow_step", self.jump_narrow_step)?;
        require_non_negative("jump_height", self.jump_height)?;
        require_non_negative("minimum_jump", self.minimum_jump)?;

        let w = &self.weights;
        for (name, value) in [
            ("weights.ground", w.ground),
            ("weights.jump", w.jump),
            ("weights.fall", w.fall),
            ("weights.climb", w.climb),
            ("weights.portal", w.portal),
        ] {
            require_non_negative(name, value)?;
        }

        let classes = (self.jump_height - self.minimum_jump) / self.jump_height_increment;
        if classes > MAX_JUMP_CLASSES as f32 {
            return Err(ConfigError::Invalid(format!(
                "jump_height {} gives more than {MAX_JUMP_CLASSES} jump classes",
                self.jump_height
            )));
        }
        if self.jump_height / self.jump_narrow_step > MAX_NARROW_STEPS as f32 {
            return Err(ConfigError::Invalid(format!(
                "jump_narrow_step {} gives more than {MAX_NARROW_STEPS} narrowing steps",
                self.jump_narrow_step
            )));
        }
        Ok(())
    }

    /// Vertical offset from a tile center to the ground node standing on it.
    pub fn ground_offset(&self) -> f32 {
        self.block_size * 0.5 + self.block_size * self.ground_node_height
    }

    /// Horizontal offset from an anchor to its fall nodes.
    pub fn fall_offset(&self) -> f32 {
        self.block_size * 0.5 + self.block_size * self.fall_x_spacing
    }

    /// Jump heights spawned above each anchor, tallest first.
    ///
    /// Computed from a step count so float drift in the decrement can never
    /// add or drop the last height.
    pub fn jump_heights(&self) -> Vec<f32> {
        if !self.jump_height.is_finite()
            || self.jump_height <= 0.0
            || self.jump_height < self.minimum_jump
        {
            return Vec::new();
        }
        let span = (self.jump_height - self.minimum_jump) / self.jump_height_increment;
        let steps = ((span + 1e-4).floor() as u32).min(MAX_JUMP_CLASSES);
        (0..=steps)
            .map(|i| self.jump_height - i as f32 * self.jump_height_increment)
            .collect()
    }
}

/// Upper bound on jump nodes spawned above one anchor.
pub const MAX_JUMP_CLASSES: u32 = 64;

/// Upper bound on clearance probes when narrowing one jump under a ceiling.
pub const MAX_NARROW_STEPS: u32 = 10_000;

fn require_positive(name: &str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{name} must be positive and finite, got {value}"
        )));
    }
    Ok(())
}

fn require_non_negative(name: &str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{name} must be finite and not negative, got {value}"
        )));
    }
    Ok(())
}
