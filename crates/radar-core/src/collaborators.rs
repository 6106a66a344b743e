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

//! Interfaces to services owned outside this crate.
//!
//! The telemetry URL lives in a [`ConfigStore`] and normalized batches can be
//! handed to a [`TrackHistory`]. In-memory implementations are provided for
//! embedding and tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::telemetry::NormalizedAircraft;

/// Minimum movement before a new history point is recorded (~100 m).
const POSITION_CHANGE_THRESHOLD_DEGREES: f64 = 0.001;

/// Default cap on history points kept per aircraft.
pub const DEFAULT_MAX_POINTS_PER_AIRCRAFT: usize = 360;

/// Default time after which an aircraft that stopped reporting is forgotten.
pub const DEFAULT_TRACK_TIMEOUT_SECS: i64 = 300;

/// Read/write access to the telemetry endpoint URL.
pub trait ConfigStore: Send + Sync {
    /// Currently configured URL, or `None` when unconfigured.
    fn get(&self) -> Option<String>;

    /// Replace the configured URL.
    fn set(&self, url: String);
}

/// [`ConfigStore`] kept in memory.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    url: RwLock<Option<String>>,
}

impl MemoryConfigStore {
    #[must_use]
    pub fn new(url: Option<String>) -> Self {
        Self {
            url: RwLock::new(url),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self) -> Option<String> {
        self.url
            .read()
            .ok()
            .and_then(|u| u.clone())
            .filter(|u| !u.trim().is_empty())
    }

    fn set(&self, url: String) {
        if let Ok(mut current) = self.url.write() {
            *current = Some(url);
        }
    }
}

/// A single recorded position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPoint {
    pub lat: f64,
    pub lon: f64,
    /// Altitude in meters.
    pub altitude: f64,
    pub timestamp: DateTime<Utc>,
}

/// Append-only per-aircraft position history.
pub trait TrackHistory: Send + Sync {
    /// Record one normalized batch observed at `timestamp`.
    fn append(&self, batch: &[NormalizedAircraft], timestamp: DateTime<Utc>);

    /// History for one aircraft.
    fn get(&self, aircraft_id: &str) -> Option<Vec<PositionPoint>>;

    /// Every recorded history.
    fn all(&self) -> Vec<(String, Vec<PositionPoint>)>;

    /// Drop all history.
    fn clear(&self);
}

#[derive(Debug, Default)]
struct Track {
    points: Vec<PositionPoint>,
    last_seen: Option<DateTime<Utc>>,
}

/// [`TrackHistory`] kept in memory with a per-aircraft point cap.
///
/// Aircraft absent from every batch for longer than the timeout are dropped
/// on the next append.
pub struct MemoryTrackHistory {
    tracks: RwLock<HashMap<String, Track>>,
    max_points: usize,
    timeout: TimeDelta,
}

impl fmt::Debug for MemoryTrackHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.tracks.read().map(|t| t.len()).unwrap_or(0);
        f.debug_struct("MemoryTrackHistory")
            .field("aircraft_count", &count)
            .field("max_points", &self.max_points)
            .field("timeout_secs", &self.timeout.num_seconds())
            .finish()
    }
}

impl Default for MemoryTrackHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS_PER_AIRCRAFT)
    }
}

impl MemoryTrackHistory {
    #[must_use]
    pub fn new(max_points: usize) -> Self {
        Self {
            tracks: RwLock::new(HashMap::new()),
            max_points: max_points.max(1),
            timeout: TimeDelta::seconds(DEFAULT_TRACK_TIMEOUT_SECS),
        }
    }

    /// Forget aircraft not reported for `secs` seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: i64) -> Self {
        self.timeout = TimeDelta::seconds(secs.max(1));
        self
    }

    /// Number of aircraft with a recorded track.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracks.read().map(|t| t.len()).unwrap_or(0)
    }
}

impl TrackHistory for MemoryTrackHistory {
    fn append(&self, batch: &[NormalizedAircraft], timestamp: DateTime<Utc>) {
        let Ok(mut tracks) = self.tracks.write() else {
            return;
        };
        for aircraft in batch {
            let track = tracks.entry(aircraft.id.clone()).or_default();
            track.last_seen = Some(timestamp);

            // Only add to history if the position changed noticeably
            let moved = track.points.last().map_or(true, |last| {
                let distance = ((aircraft.latitude - last.lat).powi(2)
                    + (aircraft.longitude - last.lon).powi(2))
                .sqrt();
                distance > POSITION_CHANGE_THRESHOLD_DEGREES
            });
            if !moved {
                continue;
            }

            track.points.push(PositionPoint {
                lat: aircraft.latitude,
                lon: aircraft.longitude,
                altitude: aircraft.altitude,
                timestamp,
            });
            if track.points.len() > self.max_points {
                let excess = track.points.len() - self.max_points;
                track.points.drain(..excess);
            }
        }

        let before = tracks.len();
        tracks.retain(|_, track| {
            track
                .last_seen
                .is_some_and(|seen| timestamp - seen < self.timeout)
        });
        if tracks.len() != before {
            debug!("Dropped {} stale tracks", before - tracks.len());
        }
    }

    fn get(&self, aircraft_id: &str) -> Option<Vec<PositionPoint>> {
        self.tracks
            .read()
            .ok()?
            .get(aircraft_id)
            .map(|track| track.points.clone())
    }

    fn all(&self) -> Vec<(String, Vec<PositionPoint>)> {
        self.tracks
            .read()
            .map(|t| {
                t.iter()
                    .map(|(id, track)| (id.clone(), track.points.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn clear(&self) {
        if let Ok(mut tracks) = self.tracks.write() {
            tracks.clear();
        }
    }
}
