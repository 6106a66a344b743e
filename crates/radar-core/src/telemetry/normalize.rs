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

//! OpenSky-style state vector normalization.
//!
//! The provider returns `{"time": <unix>, "states": [[...], ...]}` where each
//! state is a positional field list:
//!
//! ```text
//! 0 icao24   1 callsign   2 origin_country   4 last_contact
//! 5 longitude   6 latitude   7 baro_altitude   8 on_ground
//! 9 velocity   10 true_track   17 category
//! ```

use std::collections::HashMap;

use log::debug;
use serde::Deserialize;
use serde_json::Value;

use super::{classify, NormalizedAircraft, TelemetryError};

const FIELD_ID: usize = 0;
const FIELD_CALLSIGN: usize = 1;
const FIELD_ORIGIN_COUNTRY: usize = 2;
const FIELD_LAST_CONTACT: usize = 4;
const FIELD_LONGITUDE: usize = 5;
const FIELD_LATITUDE: usize = 6;
const FIELD_ALTITUDE: usize = 7;
const FIELD_ON_GROUND: usize = 8;
const FIELD_VELOCITY: usize = 9;
const FIELD_HEADING: usize = 10;
const FIELD_CATEGORY: usize = 17;

/// Top-level provider document.
#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    #[allow(dead_code, reason = "part of the wire format, not used for rendering")]
    time: Option<i64>,
    #[serde(default)]
    states: Option<Vec<Vec<Value>>>,
}

/// Parse a provider response body into normalized aircraft.
pub fn parse_response(body: &[u8]) -> Result<Vec<NormalizedAircraft>, TelemetryError> {
    let response: ProviderResponse =
        serde_json::from_slice(body).map_err(|e| TelemetryError::Malformed(e.to_string()))?;

    let states = response.states.unwrap_or_default();
    Ok(normalize(&states))
}

/// Normalize raw state vectors.
///
/// Records without a position or without a string id are dropped; missing
/// altitude, velocity and heading default to zero. Ids are unique in the
/// result: of several records sharing an id, the one with the newest
/// `last_contact` is kept (the later record on a tie).
#[must_use]
pub fn normalize(states: &[Vec<Value>]) -> Vec<NormalizedAircraft> {
    let mut aircraft: Vec<NormalizedAircraft> = Vec::with_capacity(states.len());
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(states.len());

    for record in states.iter().filter_map(|s| normalize_state(s)) {
        if let Some(&index) = positions.get(&record.id) {
            debug!("Duplicate state vector for {}", record.id);
            if record.last_contact >= aircraft[index].last_contact {
                aircraft[index] = record;
            }
        } else {
            positions.insert(record.id.clone(), aircraft.len());
            aircraft.push(record);
        }
    }

    if aircraft.len() != states.len() {
        debug!(
            "Normalized {} of {} state vectors",
            aircraft.len(),
            states.len()
        );
    }
    aircraft
}

fn normalize_state(state: &[Value]) -> Option<NormalizedAircraft> {
    let latitude = number(state, FIELD_LATITUDE)?;
    let longitude = number(state, FIELD_LONGITUDE)?;
    let id = text(state, FIELD_ID)?.to_string();

    let callsign = match text(state, FIELD_CALLSIGN).map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => id.clone(),
    };

    Some(NormalizedAircraft {
        callsign,
        latitude,
        longitude,
        altitude: number(state, FIELD_ALTITUDE).unwrap_or(0.0),
        velocity: number(state, FIELD_VELOCITY).unwrap_or(0.0),
        heading: number(state, FIELD_HEADING).unwrap_or(0.0),
        category: classify(integer(state, FIELD_CATEGORY)),
        on_ground: state
            .get(FIELD_ON_GROUND)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        last_contact: integer(state, FIELD_LAST_CONTACT).unwrap_or(0),
        origin_country: text(state, FIELD_ORIGIN_COUNTRY)
            .unwrap_or_default()
            .to_string(),
        id,
    })
}

fn number(state: &[Value], index: usize) -> Option<f64> {
    state
        .get(index)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}

fn integer(state: &[Value], index: usize) -> Option<i64> {
    let value = state.get(index)?;
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

fn text(state: &[Value], index: usize) -> Option<&str> {
    state.get(index).and_then(Value::as_str)
}
