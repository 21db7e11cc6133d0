// Tile-grid level model and its geometry queries.
//
// `TileLevel` is the static collision world the graph is built over: an
// unbounded integer grid holding at most one tile per layer per cell (so a
// ladder may share a cell with a one-way platform). Tiles are addressed by
// sequential `TileId`s that are never reused, which is what lets graph nodes
// keep a weak back-reference to the tile they came from.
//
// Tiles are axis-aligned squares of side `block_size` centered on
// `cell * block_size`. `TileLevel` implements `GeometryQuery` by testing
// only the cells under a probe's bounding box (or every tile on the probed
// layers, whichever is fewer).
//
// `from_ascii` builds levels from small text pictures for tests, benches
// and demos:
//
//   `#` ground   `-` one-way   `H` ladder   `^` ladder with a one-way top
//   `0`-`9` portals (equal digits pair up)   `.` or space: empty
//
// The bottom text row is y = 0; column 0 is x = 0. Lines are trimmed, and
// leading/trailing blank lines are ignored.
//
// See also: `geometry.rs` for the trait and the slab test, `builder.rs`
// which turns tiles into Ground/Climb/Portal nodes.

use crate::geometry::{GeometryQuery, Layer, LayerMask, RayHit, segment_box_entry};
use crate::types::{TileCell, TileId, Vec2};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const LAYERS: [Layer; 4] = [Layer::Ground, Layer::OneWay, Layer::Ladder, Layer::Portal];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LevelError {
    #[error("cell {cell} already holds a {layer:?} tile")]
    Occupied { cell: TileCell, layer: Layer },
    #[error("no tile with id {0:?}")]
    UnknownTile(TileId),
    #[error("tile {0:?} is not a portal")]
    NotAPortal(TileId),
    #[error("unknown glyph {glyph:?} at line {line}, column {column}")]
    UnknownGlyph {
        glyph: char,
        line: usize,
        column: usize,
    },
    #[error("portal glyph {0:?} must appear exactly twice")]
    UnpairedPortal(char),
}

/// One tile of the level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    pub cell: TileCell,
    pub layer: Layer,
    /// Linked counterpart, for portal tiles.
    pub link: Option<TileId>,
}

#[derive(Clone, Debug)]
pub struct TileLevel {
    block_size: f32,
    tiles: BTreeMap<TileId, Tile>,
    cells: FxHashMap<(TileCell, Layer), TileId>,
    next_id: u32,
}

impl TileLevel {
    pub fn new(block_size: f32) -> Self {
        Self {
            block_size,
            tiles: BTreeMap::new(),
            cells: FxHashMap::default(),
            next_id: 0,
        }
    }

    pub fn block_size(&self) -> f32 {
        self.block_size
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn insert(&mut self, cell: TileCell, layer: Layer) -> Result<TileId, LevelError> {
        if self.cells.contains_key(&(cell, layer)) {
            return Err(LevelError::Occupied { cell, layer });
        }
        let id = TileId(self.next_id);
        self.next_id += 1;
        self.tiles.insert(
            id,
            Tile {
                id,
                cell,
                layer,
                link: None,
            },
        );
        self.cells.insert((cell, layer), id);
        Ok(id)
    }

    /// Remove a tile. A removed portal's partner is left unlinked.
    pub fn remove(&mut self, id: TileId) -> Option<Tile> {
        let tile = self.tiles.remove(&id)?;
        self.cells.remove(&(tile.cell, tile.layer));
        if let Some(partner) = tile.link
            && let Some(p) = self.tiles.get_mut(&partner)
        {
            p.link = None;
        }
        Some(tile)
    }

    /// Link two portal tiles to each other, replacing any previous links.
    pub fn link_portals(&mut self, a: TileId, b: TileId) -> Result<(), LevelError> {
        for id in [a, b] {
            let tile = self.tiles.get(&id).ok_or(LevelError::UnknownTile(id))?;
            if tile.layer != Layer::Portal {
                return Err(LevelError::NotAPortal(id));
            }
        }
        for id in [a, b] {
            if let Some(old) = self.tiles.get(&id).and_then(|t| t.link)
                && let Some(t) = self.tiles.get_mut(&old)
            {
                t.link = None;
            }
        }
        if let Some(t) = self.tiles.get_mut(&a) {
            t.link = Some(b);
        }
        if let Some(t) = self.tiles.get_mut(&b) {
            t.link = Some(a);
        }
        Ok(())
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(&id)
    }

    pub fn tile_at(&self, cell: TileCell, layer: Layer) -> Option<&Tile> {
        self.cells.get(&(cell, layer)).and_then(|id| self.tiles.get(id))
    }

    /// All tiles in id order.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn tiles_of(&self, layer: Layer) -> impl Iterator<Item = &Tile> {
        self.tiles.values().filter(move |t| t.layer == layer)
    }

    pub fn center(&self, cell: TileCell) -> Vec2 {
        Vec2::new(
            cell.x as f32 * self.block_size,
            cell.y as f32 * self.block_size,
        )
    }

    /// Cell whose tile square contains `point`.
    pub fn cell_at(&self, point: Vec2) -> TileCell {
        TileCell::new(
            (point.x / self.block_size).round() as i32,
            (point.y / self.block_size).round() as i32,
        )
    }

    fn tile_box(&self, cell: TileCell) -> (Vec2, Vec2) {
        let c = self.center(cell);
        let half = self.block_size * 0.5;
        (
            Vec2::new(c.x - half, c.y - half),
            Vec2::new(c.x + half, c.y + half),
        )
    }

    /// Tiles on `mask` whose squares may overlap the box spanned by `a` and
    /// `b`, in id order.
    fn candidates(&self, a: Vec2, b: Vec2, mask: LayerMask) -> Vec<&Tile> {
        let bs = self.block_size;
        let x0 = (a.x.min(b.x) / bs - 0.5).floor() as i64;
        let x1 = (a.x.max(b.x) / bs + 0.5).ceil() as i64;
        let y0 = (a.y.min(b.y) / bs - 0.5).floor() as i64;
        let y1 = (a.y.max(b.y) / bs + 0.5).ceil() as i64;
        let area = (x1 - x0 + 1) * (y1 - y0 + 1);

        let mut out: Vec<&Tile> = if area as usize > self.tiles.len() {
            self.tiles
                .values()
                .filter(|t| mask.contains(t.layer.mask()))
                .collect()
        } else {
            let mut found = Vec::new();
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let cell = TileCell::new(x as i32, y as i32);
                    for layer in LAYERS {
                        if !mask.contains(layer.mask()) {
                            continue;
                        }
                        if let Some(t) = self.tile_at(cell, layer) {
                            found.push(t);
                        }
                    }
                }
            }
            found
        };
        out.sort_by_key(|t| t.id);
        out
    }

    /// Build a level from a text picture (see the module comment).
    pub fn from_ascii(text: &str, block_size: f32) -> Result<Self, LevelError> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let first = lines.iter().position(|l| !l.is_empty()).unwrap_or(0);
        let last = lines
            .iter()
            .rposition(|l| !l.is_empty())
            .map_or(0, |i| i + 1);
        let rows = if first < last { &lines[first..last] } else { &[][..] };

        let mut level = TileLevel::new(block_size);
        let mut portals: BTreeMap<char, Vec<TileId>> = BTreeMap::new();
        let height = rows.len() as i32;

        for (r, row) in rows.iter().enumerate() {
            let y = height - 1 - r as i32;
            for (column, glyph) in row.chars().enumerate() {
                let cell = TileCell::new(column as i32, y);
                match glyph {
                    '.' | ' ' => {}
                    '#' => {
                        level.insert(cell, Layer::Ground)?;
                    }
                    '-' => {
                        level.insert(cell, Layer::OneWay)?;
                    }
                    'H' => {
                        level.insert(cell, Layer::Ladder)?;
                    }
                    '^' => {
                        level.insert(cell, Layer::Ladder)?;
                        level.insert(cell, Layer::OneWay)?;
                    }
                    '0'..='9' => {
                        let id = level.insert(cell, Layer::Portal)?;
                        portals.entry(glyph).or_default().push(id);
                    }
                    _ => {
                        return Err(LevelError::UnknownGlyph {
                            glyph,
                            line: first + r + 1,
                            column: column + 1,
                        });
                    }
                }
            }
        }

        for (glyph, ids) in portals {
            match ids.as_slice() {
                [a, b] => level.link_portals(*a, *b)?,
                _ => return Err(LevelError::UnpairedPortal(glyph)),
            }
        }

        Ok(level)
    }
}

impl GeometryQuery for TileLevel {
    fn line_obstructed(&self, a: Vec2, b: Vec2, mask: LayerMask) -> bool {
        self.candidates(a, b, mask).into_iter().any(|t| {
            let (min, max) = self.tile_box(t.cell);
            segment_box_entry(a, b, min, max).is_some()
        })
    }

    fn cast_ray(
        &self,
        origin: Vec2,
        direction: Vec2,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RayHit> {
        let dir = direction.normalized()?;
        if max_distance <= 0.0 {
            return None;
        }
        let end = origin + dir * max_distance;
        let mut best: Option<RayHit> = None;
        for t in self.candidates(origin, end, mask) {
            let (min, max) = self.tile_box(t.cell);
            if let Some(param) = segment_box_entry(origin, end, min, max) {
                let distance = param * max_distance;
                // Candidates come in id order, so strict `<` keeps the
                // lowest id on ties.
                if best.is_none_or(|hit| distance < hit.distance) {
                    best = Some(RayHit {
                        point: origin + dir * distance,
                        distance,
                        tile: t.id,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut level = TileLevel::new(1.0);
        let id = level.insert(TileCell::new(2, 3), Layer::Ground).unwrap();
        assert_eq!(level.tile(id).unwrap().cell, TileCell::new(2, 3));
        assert_eq!(
            level.tile_at(TileCell::new(2, 3), Layer::Ground).unwrap().id,
            id
        );
        assert!(level.tile_at(TileCell::new(2, 3), Layer::Ladder).is_none());
        assert_eq!(
            level.insert(TileCell::new(2, 3), Layer::Ground),
            Err(LevelError::Occupied {
                cell: TileCell::new(2, 3),
                layer: Layer::Ground
            })
        );
        // A different layer may share the cell.
        assert!(level.insert(TileCell::new(2, 3), Layer::Ladder).is_ok());
    }

    #[test]
    fn ids_are_not_reused() {
        let mut level = TileLevel::new(1.0);
        let a = level.insert(TileCell::new(0, 0), Layer::Ground).unwrap();
        level.remove(a).unwrap();
        let b = level.insert(TileCell::new(0, 0), Layer::Ground).unwrap();
        assert_ne!(a, b);
        assert!(level.remove(a).is_none());
    }

    #[test]
    fn portal_links_are_symmetric_and_cleared() {
        let mut level = TileLevel::new(1.0);
        let a = level.insert(TileCell::new(0, 1), Layer::Portal).unwrap();
        let b = level.insert(TileCell::new(9, 1), Layer::Portal).unwrap();
        let g = level.insert(TileCell::new(0, 0), Layer::Ground).unwrap();
        assert_eq!(level.link_portals(a, g), Err(LevelError::NotAPortal(g)));
        level.link_portals(a, b).unwrap();
        assert_eq!(level.tile(a).unwrap().link, Some(b));
        assert_eq!(level.tile(b).unwrap().link, Some(a));
        level.remove(b);
        assert_eq!(level.tile(a).unwrap().link, None);
    }

    #[test]
    fn relinking_unlinks_old_partner() {
        let mut level = TileLevel::new(1.0);
        let a = level.insert(TileCell::new(0, 1), Layer::Portal).unwrap();
        let b = level.insert(TileCell::new(5, 1), Layer::Portal).unwrap();
        let c = level.insert(TileCell::new(9, 1), Layer::Portal).unwrap();
        level.link_portals(a, b).unwrap();
        level.link_portals(a, c).unwrap();
        assert_eq!(level.tile(b).unwrap().link, None);
        assert_eq!(level.tile(c).unwrap().link, Some(a));
    }

    #[test]
    fn ascii_rows_count_up_from_bottom() {
        let level = TileLevel::from_ascii(
            "
            ..#
            ##.
            ",
            1.0,
        )
        .unwrap();
        assert_eq!(level.len(), 3);
        assert!(level.tile_at(TileCell::new(2, 1), Layer::Ground).is_some());
        assert!(level.tile_at(TileCell::new(0, 0), Layer::Ground).is_some());
        assert!(level.tile_at(TileCell::new(2, 0), Layer::Ground).is_none());
    }

    #[test]
    fn ascii_ladder_top_and_portals() {
        let level = TileLevel::from_ascii("^.1..1\n######", 1.0).unwrap();
        let cell = TileCell::new(0, 1);
        assert!(level.tile_at(cell, Layer::Ladder).is_some());
        assert!(level.tile_at(cell, Layer::OneWay).is_some());
        let p = level.tile_at(TileCell::new(2, 1), Layer::Portal).unwrap();
        let q = level.tile_at(TileCell::new(5, 1), Layer::Portal).unwrap();
        assert_eq!(p.link, Some(q.id));
    }

    #[test]
    fn ascii_errors() {
        assert_eq!(
            TileLevel::from_ascii("#?#", 1.0).unwrap_err(),
            LevelError::UnknownGlyph {
                glyph: '?',
                line: 1,
                column: 2
            }
        );
        assert_eq!(
            TileLevel::from_ascii("1..#", 1.0).unwrap_err(),
            LevelError::UnpairedPortal('1')
        );
    }

    #[test]
    fn probes_ignore_layers_outside_mask() {
        let level = TileLevel::from_ascii("-H#", 1.0).unwrap();
        let a = Vec2::new(-1.0, 0.0);
        let b = Vec2::new(1.2, 0.0);
        assert!(!level.line_obstructed(a, b, LayerMask::GROUND));
        assert!(level.line_obstructed(a, b, LayerMask::ONE_WAY));
        assert!(level.line_obstructed(a, Vec2::new(3.0, 0.0), LayerMask::GROUND));
    }

    #[test]
    fn probe_resting_on_tile_top_is_clear() {
        let level = TileLevel::from_ascii("#####", 1.0).unwrap();
        assert!(!level.line_obstructed(
            Vec2::new(0.0, 0.51),
            Vec2::new(4.0, 0.51),
            LayerMask::GROUND
        ));
        assert!(level.line_obstructed(
            Vec2::new(2.0, 0.51),
            Vec2::new(2.0, 0.49),
            LayerMask::GROUND
        ));
    }

    #[test]
    fn long_probe_scans_all_tiles() {
        // Bounding box larger than the tile count takes the full-scan path.
        let level = TileLevel::from_ascii("#", 1.0).unwrap();
        assert!(level.line_obstructed(
            Vec2::new(-50.0, -50.0),
            Vec2::new(50.0, 50.0),
            LayerMask::GROUND
        ));
        assert!(!level.line_obstructed(
            Vec2::new(-50.0, 50.0),
            Vec2::new(50.0, 51.0),
            LayerMask::GROUND
        ));
    }

    #[test]
    fn ray_returns_nearest_hit() {
        let level = TileLevel::from_ascii("#\n.\n#", 1.0).unwrap();
        let hit = level
            .cast_ray(Vec2::new(0.0, 1.0), Vec2::new(0.0, 1.0), 10.0, LayerMask::GROUND)
            .unwrap();
        assert!((hit.distance - 0.5).abs() < 1e-5);
        assert_eq!(hit.tile, level.tile_at(TileCell::new(0, 2), Layer::Ground).unwrap().id);
        assert!(
            level
                .cast_ray(Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.0), 10.0, LayerMask::GROUND)
                .is_none()
        );
    }
}
