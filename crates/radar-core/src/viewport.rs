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

//! Viewport state: map center, zoom level and drag interaction.
//!
//! [`Viewport`] owns the view and is the only place that mutates it. All
//! inputs are sanitized (latitude clamped, longitude wrapped, zoom clamped)
//! rather than rejected. Consumers subscribe to [`ViewportEvent`]s instead of
//! polling for changes.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::geo::{self, LatLng};

/// Zoom change applied per mouse wheel notch.
pub const WHEEL_ZOOM_STEP: f64 = 0.5;

/// Zoom change applied by the zoom buttons.
pub const BUTTON_ZOOM_STEP: f64 = 1.0;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Named starting views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Continental United States.
    #[default]
    Us,
    /// Schenectady / Albany, New York.
    SchenectadyAlbany,
}

impl Preset {
    pub const ALL: [Preset; 2] = [Preset::Us, Preset::SchenectadyAlbany];

    /// Center of the preset view.
    #[must_use]
    pub const fn center(self) -> LatLng {
        match self {
            Preset::Us => LatLng::new(39.8283, -98.5795),
            Preset::SchenectadyAlbany => LatLng::new(42.8142, -73.9396),
        }
    }

    /// Zoom level of the preset view.
    #[must_use]
    pub const fn zoom(self) -> f64 {
        match self {
            Preset::Us => 5.0,
            Preset::SchenectadyAlbany => 10.0,
        }
    }

    /// Stable identifier used in config files and on the command line.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Preset::Us => "us",
            Preset::SchenectadyAlbany => "schenectady-albany",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Preset::Us => "Continental US",
            Preset::SchenectadyAlbany => "Schenectady-Albany",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown preset '{s}' (expected one of: us, schenectady-albany)"))
    }
}

/// An in-progress drag gesture.
///
/// Created by [`Viewport::begin_drag`] and handed back on every pointer move
/// so the viewport never has to remember gesture state itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    /// Last pointer position seen, in screen pixels.
    pub origin: (f64, f64),
    /// Zoom level when the drag started.
    pub zoom_at_start: f64,
}

/// Snapshot of the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub center: LatLng,
    pub zoom: f64,
}

impl ViewportState {
    /// Integer zoom used to pick tiles.
    #[must_use]
    pub fn zoom_floor(&self) -> u8 {
        self.zoom.floor() as u8
    }

    /// Screen position of a coordinate in a `width` x `height` viewport.
    #[must_use]
    pub fn screen_position(&self, lat: f64, lng: f64, width: f64, height: f64) -> (f64, f64) {
        let center = geo::project(self.center.lat, self.center.lng, self.zoom);
        let point = geo::project(lat, lng, self.zoom);
        (width / 2.0 + (point.x - center.x), height / 2.0 + (point.y - center.y))
    }
}

impl From<Preset> for ViewportState {
    fn from(preset: Preset) -> Self {
        Self {
            center: preset.center(),
            zoom: preset.zoom(),
        }
    }
}

/// Events emitted when the viewport changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewportEvent {
    /// Center moved (pan or drag).
    Moved(LatLng),
    /// Zoom level changed.
    Zoomed(f64),
    /// A preset replaced center and zoom.
    PresetApplied(Preset),
}

/// Owner of the map view.
pub struct Viewport {
    state: ViewportState,
    event_tx: broadcast::Sender<ViewportEvent>,
}

impl fmt::Debug for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Viewport")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(Preset::default())
    }
}

impl Viewport {
    /// Create a viewport showing `preset`.
    #[must_use]
    pub fn new(preset: Preset) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: ViewportState::from(preset),
            event_tx,
        }
    }

    /// Current center and zoom.
    #[must_use]
    pub fn state(&self) -> ViewportState {
        self.state
    }

    /// Subscribe to viewport changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ViewportEvent> {
        self.event_tx.subscribe()
    }

    /// Replace center and zoom with the preset's values.
    pub fn set_preset(&mut self, preset: Preset) {
        debug!("Applying preset {}", preset.id());
        self.state = ViewportState::from(preset);
        let _ = self.event_tx.send(ViewportEvent::PresetApplied(preset));
    }

    /// Pan by a pixel delta at the current zoom.
    ///
    /// Dragging right (positive `dx`) moves the view west.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        let size = geo::world_size(self.state.zoom);
        let delta_lng = -(dx / size) * 360.0;
        let delta_lat = (dy / size) * 180.0;

        self.state.center = LatLng {
            lat: geo::clamp_latitude(self.state.center.lat + delta_lat),
            lng: geo::wrap_longitude(self.state.center.lng + delta_lng),
        };
        let _ = self.event_tx.send(ViewportEvent::Moved(self.state.center));
    }

    /// Change zoom by `delta` levels, clamped to the allowed range.
    pub fn zoom(&mut self, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        let zoom = geo::clamp_zoom(self.state.zoom + delta);
        if (zoom - self.state.zoom).abs() > f64::EPSILON {
            self.state.zoom = zoom;
            let _ = self.event_tx.send(ViewportEvent::Zoomed(zoom));
        }
    }

    /// Zoom one wheel notch. Positive scroll (away from the user) zooms in.
    pub fn wheel(&mut self, scroll_delta: f64) {
        if scroll_delta > 0.0 {
            self.zoom(WHEEL_ZOOM_STEP);
        } else if scroll_delta < 0.0 {
            self.zoom(-WHEEL_ZOOM_STEP);
        }
    }

    /// Start a drag gesture at a screen position.
    #[must_use]
    pub fn begin_drag(&self, x: f64, y: f64) -> DragSession {
        DragSession {
            origin: (x, y),
            zoom_at_start: self.state.zoom,
        }
    }

    /// Continue a drag: pan by the pointer movement since the last call.
    pub fn drag_to(&mut self, session: &mut DragSession, x: f64, y: f64) {
        let (ox, oy) = session.origin;
        session.origin = (x, y);
        self.pan(x - ox, y - oy);
    }

    /// Finish a drag gesture.
    pub fn end_drag(&mut self, session: DragSession) {
        debug!(
            "Drag finished (zoom {:.1} -> {:.1})",
            session.zoom_at_start, self.state.zoom
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_preset() {
        let viewport = Viewport::new(Preset::SchenectadyAlbany);
        let state = viewport.state();
        assert_eq!(state.center, LatLng::new(42.8142, -73.9396));
        assert_eq!(state.zoom, 10.0);
    }

    #[test]
    fn test_zoom_always_clamped() {
        let mut viewport = Viewport::default();
        for delta in [-100.0, 0.5, 3.0, 40.0, -2.5, 1e9, -1e9, f64::NAN] {
            viewport.zoom(delta);
            let zoom = viewport.state().zoom;
            assert!((3.0..=18.0).contains(&zoom), "zoom {zoom} after {delta}");
        }
    }

    #[test]
    fn test_pan_sequences_stay_in_range() {
        let mut viewport = Viewport::default();
        viewport.zoom(-10.0);
        let deltas = [
            (5000.0, -9000.0),
            (-12345.0, 4000.0),
            (1e6, 1e6),
            (-1e7, -1e7),
            (333.3, 0.0),
            (0.0, -77.7),
        ];
        for _ in 0..20 {
            for (dx, dy) in deltas {
                viewport.pan(dx, dy);
                let c = viewport.state().center;
                assert!((-85.0..=85.0).contains(&c.lat), "lat {}", c.lat);
                assert!((-180.0..180.0).contains(&c.lng), "lng {}", c.lng);
            }
        }
    }

    #[test]
    fn test_pan_direction_and_scale() {
        let mut viewport = Viewport::new(Preset::Us);
        let before = viewport.state().center;
        // One world width at zoom 5 is 8192 px = 360 degrees
        viewport.pan(-8192.0 / 4.0, 0.0);
        let after = viewport.state().center;
        assert!((after.lng - (before.lng + 90.0)).abs() < 1e-9);
        assert!((after.lat - before.lat).abs() < 1e-12);
    }

    #[test]
    fn test_set_preset_replaces_state() {
        let mut viewport = Viewport::new(Preset::Us);
        viewport.pan(100.0, 100.0);
        viewport.zoom(2.0);
        viewport.set_preset(Preset::Us);
        assert_eq!(viewport.state(), ViewportState::from(Preset::Us));
    }

    #[test]
    fn test_drag_session_pans_incrementally() {
        let mut viewport = Viewport::new(Preset::Us);
        let mut reference = Viewport::new(Preset::Us);

        let mut session = viewport.begin_drag(100.0, 100.0);
        assert_eq!(session.zoom_at_start, 5.0);
        viewport.drag_to(&mut session, 110.0, 95.0);
        viewport.drag_to(&mut session, 130.0, 90.0);
        assert_eq!(session.origin, (130.0, 90.0));
        viewport.end_drag(session);

        reference.pan(30.0, -10.0);
        let a = viewport.state().center;
        let b = reference.state().center;
        assert!((a.lat - b.lat).abs() < 1e-9);
        assert!((a.lng - b.lng).abs() < 1e-9);
    }

    #[test]
    fn test_wheel_steps_half_level() {
        let mut viewport = Viewport::new(Preset::Us);
        viewport.wheel(1.0);
        assert_eq!(viewport.state().zoom, 5.5);
        viewport.wheel(-3.0);
        viewport.wheel(-3.0);
        assert_eq!(viewport.state().zoom, 4.5);
        viewport.wheel(0.0);
        assert_eq!(viewport.state().zoom, 4.5);
    }

    #[test]
    fn test_events_emitted() {
        let mut viewport = Viewport::new(Preset::Us);
        let mut rx = viewport.subscribe();

        viewport.zoom(1.0);
        viewport.pan(10.0, 0.0);
        viewport.set_preset(Preset::SchenectadyAlbany);
        viewport.zoom(-100.0);
        // Already at the minimum, no event
        viewport.zoom(-1.0);

        assert_eq!(rx.try_recv().unwrap(), ViewportEvent::Zoomed(6.0));
        assert!(matches!(rx.try_recv().unwrap(), ViewportEvent::Moved(_)));
        assert_eq!(
            rx.try_recv().unwrap(),
            ViewportEvent::PresetApplied(Preset::SchenectadyAlbany)
        );
        assert_eq!(rx.try_recv().unwrap(), ViewportEvent::Zoomed(3.0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_screen_position_of_center() {
        let state = ViewportState::from(Preset::Us);
        let (x, y) = state.screen_position(state.center.lat, state.center.lng, 1024.0, 768.0);
        assert!((x - 512.0).abs() < 1e-9);
        assert!((y - 384.0).abs() < 1e-9);
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("us".parse::<Preset>().unwrap(), Preset::Us);
        assert_eq!(
            "Schenectady-Albany".parse::<Preset>().unwrap(),
            Preset::SchenectadyAlbany
        );
        assert!("mars".parse::<Preset>().is_err());
    }
}
