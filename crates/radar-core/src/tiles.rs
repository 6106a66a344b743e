// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Covering tile set resolution and per-tile request bookkeeping.
//!
//! [`covering_tiles`] turns a viewport into the list of tiles to draw and
//! where to draw them. [`TileLoader`] tracks the image request for each of
//! those tiles: responses for tiles that scrolled out of view are dropped on
//! arrival, and failed tiles are simply left out of the render.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::debug;

use crate::geo::{self, TileIndex, TILE_SIZE};
use crate::viewport::ViewportState;

/// Default raster tile server (Carto dark basemap).
pub const DEFAULT_TILE_SERVER: &str = "https://a.basemaps.cartocdn.com/dark_all";

/// A tile at an integer zoom level with its `x` already wrapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    #[must_use]
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Image URL on `server` (`{server}/{z}/{x}/{y}.png`).
    #[must_use]
    pub fn url(&self, server: &str) -> String {
        format!(
            "{}/{}/{}/{}.png",
            server.trim_end_matches('/'),
            self.zoom,
            self.x,
            self.y
        )
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.zoom, self.x, self.y)
    }
}

/// Where one tile lands on screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TilePlacement {
    pub key: TileKey,
    /// Left edge in viewport pixels.
    pub x: f64,
    /// Top edge in viewport pixels.
    pub y: f64,
    /// Edge length in viewport pixels (larger than [`TILE_SIZE`] between
    /// integer zoom levels).
    pub size: f64,
}

impl TilePlacement {
    /// Whether the viewport pixel `(px, py)` falls inside this tile.
    #[must_use]
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px < self.x + self.size && py >= self.y && py < self.y + self.size
    }
}

/// Tiles covering a `width` x `height` viewport, with their placements.
///
/// The grid extends one tile past each edge. Rows outside the world are
/// dropped; columns wrap around the antimeridian, so at low zoom the same key
/// may appear at more than one placement.
#[must_use]
pub fn covering_tiles(state: &ViewportState, width: f64, height: f64) -> Vec<TilePlacement> {
    if !(width > 0.0 && height > 0.0) {
        return Vec::new();
    }

    let zoom_floor = state.zoom_floor();
    let max_tile = geo::tiles_per_axis(zoom_floor);
    let center_tile = geo::tile_of(geo::project(
        state.center.lat,
        state.center.lng,
        f64::from(zoom_floor),
    ));

    let tiles_x = (width / TILE_SIZE).ceil() as i64 + 2;
    let tiles_y = (height / TILE_SIZE).ceil() as i64 + 2;
    let size = TILE_SIZE * 2_f64.powf(state.zoom - f64::from(zoom_floor));

    let x_range = (center_tile.x - tiles_x / 2)..=(center_tile.x + (tiles_x + 1) / 2);
    let y_range = (center_tile.y - tiles_y / 2)..=(center_tile.y + (tiles_y + 1) / 2);

    let mut placements = Vec::new();
    for x in x_range {
        for y in y_range.clone() {
            if y < 0 || y >= max_tile {
                continue;
            }
            let wrapped_x = x.rem_euclid(max_tile);
            // Place from the unwrapped index so tiles past the antimeridian
            // continue the grid instead of jumping back
            let corner = geo::tile_nw_corner(TileIndex { x, y }, zoom_floor);
            let (sx, sy) = state.screen_position(corner.lat, corner.lng, width, height);
            placements.push(TilePlacement {
                key: TileKey::new(zoom_floor, wrapped_x as u32, y as u32),
                x: sx,
                y: sy,
                size,
            });
        }
    }
    placements
}

/// Request state of a single tile.
#[derive(Debug)]
pub enum TileState<T> {
    Pending,
    Ready(T),
    Failed,
}

/// Tracks tile image requests for the current covering set.
///
/// `T` is whatever the renderer keeps per loaded tile (a texture handle, raw
/// bytes, ...).
pub struct TileLoader<T> {
    tiles: HashMap<TileKey, TileState<T>>,
    visible: HashSet<TileKey>,
}

impl<T> fmt::Debug for TileLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileLoader")
            .field("visible", &self.visible.len())
            .field("pending", &self.pending_count())
            .field("failed", &self.failed_count())
            .finish_non_exhaustive()
    }
}

impl<T> Default for TileLoader<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TileLoader<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tiles: HashMap::new(),
            visible: HashSet::new(),
        }
    }

    /// Replace the covering set.
    ///
    /// Forgets every tile that is no longer visible and returns the keys that
    /// need a new image request.
    pub fn set_visible<I>(&mut self, keys: I) -> Vec<TileKey>
    where
        I: IntoIterator<Item = TileKey>,
    {
        self.visible = keys.into_iter().collect();
        let visible = &self.visible;
        self.tiles.retain(|key, _| visible.contains(key));

        let mut requests = Vec::new();
        for key in &self.visible {
            if !self.tiles.contains_key(key) {
                self.tiles.insert(*key, TileState::Pending);
                requests.push(*key);
            }
        }
        requests
    }

    /// Record the outcome of an image request.
    ///
    /// Returns `false` when the tile is no longer visible and the response
    /// was discarded.
    pub fn accept<E: fmt::Display>(&mut self, key: TileKey, result: Result<T, E>) -> bool {
        if !self.visible.contains(&key) {
            debug!("Discarding stale tile {key}");
            return false;
        }
        let state = match result {
            Ok(tile) => TileState::Ready(tile),
            Err(e) => {
                debug!("Tile {key} failed: {e}");
                TileState::Failed
            }
        };
        self.tiles.insert(key, state);
        true
    }

    /// Loaded tile, if any. Pending and failed tiles return `None`.
    #[must_use]
    pub fn get(&self, key: &TileKey) -> Option<&T> {
        match self.tiles.get(key) {
            Some(TileState::Ready(tile)) => Some(tile),
            _ => None,
        }
    }

    #[must_use]
    pub fn state(&self, key: &TileKey) -> Option<&TileState<T>> {
        self.tiles.get(key)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.tiles
            .values()
            .filter(|s| matches!(s, TileState::Pending))
            .count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.tiles
            .values()
            .filter(|s| matches!(s, TileState::Failed))
            .count()
    }
}
