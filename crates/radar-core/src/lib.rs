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

//! Slippy-map engine and live aircraft telemetry pipeline.
//!
//! This library holds everything behind the flight radar view that is not UI:
//!
//! - **Geo layer**: spherical Web Mercator projection and tile math
//! - **Viewport layer**: center/zoom state with pan, zoom, drag and presets
//! - **Tile layer**: covering tile set for a viewport and per-tile request state
//! - **Telemetry layer**: polling, normalization and category classification
//! - **State layer**: the current aircraft collection, category filters and
//!   selection
//!
//! # Quick Start
//!
//! Use [`RadarSession`] to poll a feed into shared state:
//!
//! ```no_run
//! use std::sync::Arc;
//! use radar_core::telemetry::source::DEFAULT_HTTP_TIMEOUT;
//! use radar_core::{
//!     HttpTelemetrySource, MemoryConfigStore, Poller, PollerConfig, RadarSession,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryConfigStore::new(Some(
//!         "https://opensky-network.org/api/states/all".to_string(),
//!     )));
//!     let source = Arc::new(HttpTelemetrySource::new(DEFAULT_HTTP_TIMEOUT).unwrap());
//!     let session = RadarSession::spawn(
//!         Poller::new(PollerConfig::default(), source, store),
//!         Default::default(),
//!     );
//!
//!     let mut events = session.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}: {} aircraft", session.aircraft_count());
//!     }
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! ## Tile Set Only
//!
//! ```
//! use radar_core::tiles::covering_tiles;
//! use radar_core::viewport::{Preset, ViewportState};
//!
//! let state = ViewportState::from(Preset::Us);
//! for tile in covering_tiles(&state, 1024.0, 768.0) {
//!     println!("{} at ({:.0}, {:.0})", tile.key, tile.x, tile.y);
//! }
//! ```
//!
//! ## Normalizer Only
//!
//! ```
//! use radar_core::telemetry::{parse_response, Category};
//!
//! let body = br#"{"time": 1700000000, "states": [
//!     ["abc123","UAL123 ","USA",0,1700000000,-122.4,37.7,10000,false,250,90,0,0,0,0,0,0,3]
//! ]}"#;
//! let aircraft = parse_response(body).unwrap();
//! assert_eq!(aircraft[0].callsign, "UAL123");
//! assert_eq!(aircraft[0].category, Category::Commercial);
//! ```

pub mod collaborators;
pub mod geo;
pub mod state;
pub mod telemetry;
pub mod tiles;
pub mod viewport;

use std::sync::{Arc, RwLock};

use log::{debug, error};
use tokio::sync::{broadcast, watch};

pub use collaborators::{
    ConfigStore, MemoryConfigStore, MemoryTrackHistory, PositionPoint, TrackHistory,
};
pub use geo::LatLng;
pub use state::{CategoryFilter, RadarEvent, RadarState, Visibility};
pub use telemetry::{
    classify, Category, HttpTelemetrySource, NormalizedAircraft, PollStatus, Poller,
    PollerConfig, PollerControl, PollerHandle, Snapshot, TelemetryError, TelemetrySource,
};
pub use tiles::{covering_tiles, TileKey, TileLoader, TilePlacement, TileState};
pub use viewport::{DragSession, Preset, Viewport, ViewportEvent, ViewportState};

/// A running poller feeding a shared [`RadarState`].
///
/// Snapshots are applied in completion order, each one replacing the
/// collection under a single write lock. Dropping the session stops polling.
pub struct RadarSession {
    state: Arc<RwLock<RadarState>>,
    status: watch::Receiver<PollStatus>,
    control: PollerControl,
}

impl std::fmt::Debug for RadarSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadarSession")
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl RadarSession {
    /// Start the poller and a task applying its snapshots.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn<S>(poller: Poller<S>, filters: CategoryFilter) -> Self
    where
        S: TelemetrySource + 'static,
    {
        let state = Arc::new(RwLock::new(RadarState::new(filters)));
        let mut handle = poller.spawn();
        let status = handle.status();
        let control = handle.control();

        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(snapshot) = handle.recv().await {
                let sequence = snapshot.sequence;
                match state_clone.write() {
                    Ok(mut state) => state.apply_snapshot(snapshot),
                    Err(e) => {
                        error!("Radar state lock poisoned: {e}");
                        break;
                    }
                }
                debug!("Applied snapshot #{sequence}");
            }
        });

        Self {
            state,
            status,
            control,
        }
    }

    /// Shared state, for rendering and user interaction.
    #[must_use]
    pub fn state(&self) -> Arc<RwLock<RadarState>> {
        Arc::clone(&self.state)
    }

    /// Number of aircraft in the latest collection.
    #[must_use]
    pub fn aircraft_count(&self) -> usize {
        self.state.read().map(|s| s.aircraft().len()).unwrap_or(0)
    }

    /// Subscribe to state events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RadarEvent> {
        self.state
            .read()
            .map(|s| s.subscribe())
            .unwrap_or_else(|_| {
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            })
    }

    /// Current feed status.
    #[must_use]
    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    /// Watch the feed status.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<PollStatus> {
        self.status.clone()
    }

    /// Ask for fresh data, subject to the staleness window.
    pub fn refresh(&self) {
        self.control.refresh();
    }

    /// Stop polling.
    pub fn shutdown(&self) {
        self.control.shutdown();
    }
}

impl Drop for RadarSession {
    fn drop(&mut self) {
        self.control.shutdown();
    }
}
