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

//! Telemetry sources.
//!
//! [`TelemetrySource`] abstracts the fetch so the poller can be driven by a
//! real HTTP endpoint or by an in-process fake in tests.

use std::future::Future;
use std::time::Duration;

use log::debug;

use super::normalize::parse_response;
use super::{NormalizedAircraft, TelemetryError};

/// Default HTTP timeout for a telemetry request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can fetch and normalize one telemetry document.
pub trait TelemetrySource: Send + Sync {
    /// Fetch the document at `url` and normalize it.
    fn fetch(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Vec<NormalizedAircraft>, TelemetryError>> + Send;
}

/// HTTP telemetry source using a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTelemetrySource {
    http: reqwest::Client,
}

impl HttpTelemetrySource {
    /// Create a source with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TelemetryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("flight-radar/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TelemetryError::Network(e.to_string()))?;
        Ok(Self { http })
    }
}

impl TelemetrySource for HttpTelemetrySource {
    async fn fetch(&self, url: &str) -> Result<Vec<NormalizedAircraft>, TelemetryError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| TelemetryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TelemetryError::Network(e.to_string()))?;

        let aircraft = parse_response(&body)?;
        debug!("Fetched {} aircraft from {}", aircraft.len(), url);
        Ok(aircraft)
    }
}
