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

//! Live telemetry pipeline.
//!
//! - [`source`]: fetching the provider document over HTTP
//! - [`normalize`]: provider state vectors to [`NormalizedAircraft`]
//! - [`poller`]: the repeating fetch loop producing [`Snapshot`]s
//!
//! Category derivation lives here in [`classify`] and nowhere else.

pub mod normalize;
pub mod poller;
pub mod source;

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use normalize::{normalize, parse_response};
pub use poller::{PollStatus, Poller, PollerConfig, PollerControl, PollerHandle};
pub use source::{HttpTelemetrySource, TelemetrySource};

/// Errors from a single telemetry fetch.
///
/// None of these escape the poller; they degrade to an empty snapshot.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TelemetryError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Display category of an aircraft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Commercial,
    Military,
    GeneralAviation,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::Commercial,
        Category::Military,
        Category::GeneralAviation,
    ];

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Category::Commercial => "Commercial",
            Category::Military => "Military",
            Category::GeneralAviation => "General Aviation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Map a provider category code to a display category.
///
/// | code                    | category        |
/// |-------------------------|-----------------|
/// | none, 0, unrecognized   | General Aviation|
/// | 1..=5                   | Commercial      |
/// | 6..=7                   | Military        |
#[must_use]
pub fn classify(code: Option<i64>) -> Category {
    match code {
        Some(1..=5) => Category::Commercial,
        Some(6..=7) => Category::Military,
        _ => Category::GeneralAviation,
    }
}

/// One aircraft in a telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAircraft {
    /// Transponder address, unique within a snapshot.
    pub id: String,
    pub callsign: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Barometric altitude in meters.
    pub altitude: f64,
    /// Ground speed in m/s.
    pub velocity: f64,
    /// True track in degrees clockwise from north.
    pub heading: f64,
    pub category: Category,
    pub on_ground: bool,
    /// Unix seconds of the last message from this aircraft.
    pub last_contact: i64,
    pub origin_country: String,
}

/// The result of one completed poll cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Issue order of the fetch that produced this snapshot.
    pub sequence: u64,
    /// When the fetch completed.
    pub completed_at: Instant,
    /// Full replacement collection (empty after a failed fetch).
    pub aircraft: Vec<NormalizedAircraft>,
    /// Error that emptied this cycle, if any.
    pub error: Option<TelemetryError>,
}
