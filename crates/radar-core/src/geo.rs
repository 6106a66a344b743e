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

//! Spherical Web Mercator projection utilities.
//!
//! Pure functions converting between geographic coordinates, world pixels
//! (the pixel plane of the whole map at a given zoom) and tile indices.
//! Nothing in here allocates or fails: out-of-domain inputs are clamped or
//! wrapped by the callers in [`crate::viewport`].

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Edge length of one raster tile in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Lowest zoom level the viewport allows.
pub const MIN_ZOOM: f64 = 3.0;

/// Highest zoom level the viewport allows.
pub const MAX_ZOOM: f64 = 18.0;

/// Latitude limit in degrees (north and south) for the viewport center.
pub const MAX_LATITUDE: f64 = 85.0;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A position on the world pixel plane at some zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPixel {
    pub x: f64,
    pub y: f64,
}

/// Unwrapped tile index. `x` may lie outside `[0, 2^z)` until it is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileIndex {
    pub x: i64,
    pub y: i64,
}

/// Width (and height) of the world pixel plane at `zoom`.
#[must_use]
pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2_f64.powf(zoom)
}

/// Number of tiles along one axis at an integer zoom level.
#[must_use]
pub fn tiles_per_axis(zoom_floor: u8) -> i64 {
    1_i64 << zoom_floor
}

/// Project a coordinate onto the world pixel plane at `zoom`.
#[must_use]
pub fn project(lat: f64, lng: f64, zoom: f64) -> WorldPixel {
    let size = world_size(zoom);
    let lat_rad = lat.to_radians();
    let x = (lng + 180.0) / 360.0 * size;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * size;
    WorldPixel { x, y }
}

/// Inverse of [`project`].
#[must_use]
pub fn unproject(pixel: WorldPixel, zoom: f64) -> LatLng {
    let size = world_size(zoom);
    let lng = pixel.x / size * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * pixel.y / size)).sinh().atan().to_degrees();
    LatLng { lat, lng }
}

/// Tile containing a world pixel. The pixel must be projected at `zoom_floor`.
#[must_use]
pub fn tile_of(pixel: WorldPixel) -> TileIndex {
    TileIndex {
        x: (pixel.x / TILE_SIZE).floor() as i64,
        y: (pixel.y / TILE_SIZE).floor() as i64,
    }
}

/// North-west corner of a tile.
#[must_use]
pub fn tile_nw_corner(index: TileIndex, zoom_floor: u8) -> LatLng {
    let n = tiles_per_axis(zoom_floor) as f64;
    let lat = (PI * (1.0 - 2.0 * index.y as f64 / n)).sinh().atan().to_degrees();
    let lng = index.x as f64 / n * 360.0 - 180.0;
    LatLng { lat, lng }
}

/// Clamp a latitude into `[-MAX_LATITUDE, MAX_LATITUDE]`.
#[must_use]
pub fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
}

/// Wrap a longitude into `[-180, 180)`.
#[must_use]
pub fn wrap_longitude(lng: f64) -> f64 {
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 180.0 {
        -180.0
    } else {
        wrapped
    }
}

/// Clamp a zoom level into `[MIN_ZOOM, MAX_ZOOM]`.
#[must_use]
pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_nan() {
        return MIN_ZOOM;
    }
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}
