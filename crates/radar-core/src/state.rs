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

//! Aircraft collection, category filters and selection.
//!
//! [`RadarState`] owns the latest aircraft collection. Each snapshot replaces
//! it wholesale, after which the selection is reconciled: a selected id that
//! is no longer present is cleared. Changes are announced as [`RadarEvent`]s.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::telemetry::{Category, NormalizedAircraft, Snapshot, TelemetryError};

/// Per-category visibility toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryFilter {
    pub commercial: bool,
    pub military: bool,
    pub general_aviation: bool,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self {
            commercial: true,
            military: true,
            general_aviation: true,
        }
    }
}

impl CategoryFilter {
    #[must_use]
    pub const fn is_enabled(&self, category: Category) -> bool {
        match category {
            Category::Commercial => self.commercial,
            Category::Military => self.military,
            Category::GeneralAviation => self.general_aviation,
        }
    }

    pub fn set(&mut self, category: Category, enabled: bool) {
        match category {
            Category::Commercial => self.commercial = enabled,
            Category::Military => self.military = enabled,
            Category::GeneralAviation => self.general_aviation = enabled,
        }
    }

    pub fn toggle(&mut self, category: Category) {
        self.set(category, !self.is_enabled(category));
    }

    #[must_use]
    pub const fn all_disabled(&self) -> bool {
        !self.commercial && !self.military && !self.general_aviation
    }
}

/// What the map should draw.
#[derive(Debug, Clone, PartialEq)]
pub enum Visibility<'a> {
    /// Aircraft passing the category filter.
    Aircraft(Vec<&'a NormalizedAircraft>),
    /// Every category is switched off.
    NoCategoriesSelected,
}

/// Events emitted by [`RadarState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadarEvent {
    /// The collection was replaced; carries the new size.
    AircraftReplaced(usize),
    /// Selection changed, including automatic clearing.
    SelectionChanged(Option<String>),
    FiltersChanged,
}

pub struct RadarState {
    aircraft: Vec<NormalizedAircraft>,
    filters: CategoryFilter,
    selected: Option<String>,
    last_sequence: Option<u64>,
    last_error: Option<TelemetryError>,
    event_tx: broadcast::Sender<RadarEvent>,
}

impl fmt::Debug for RadarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RadarState")
            .field("aircraft_count", &self.aircraft.len())
            .field("filters", &self.filters)
            .field("selected", &self.selected)
            .field("last_sequence", &self.last_sequence)
            .finish_non_exhaustive()
    }
}

impl Default for RadarState {
    fn default() -> Self {
        Self::new(CategoryFilter::default())
    }
}

impl RadarState {
    #[must_use]
    pub fn new(filters: CategoryFilter) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            aircraft: Vec::new(),
            filters,
            selected: None,
            last_sequence: None,
            last_error: None,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RadarEvent> {
        self.event_tx.subscribe()
    }

    /// Replace the collection with a completed snapshot.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.last_sequence = Some(snapshot.sequence);
        self.last_error = snapshot.error;
        self.aircraft = snapshot.aircraft;
        let _ = self
            .event_tx
            .send(RadarEvent::AircraftReplaced(self.aircraft.len()));

        if let Some(id) = &self.selected {
            if self.find(id).is_none() {
                debug!("Selected aircraft {id} left the collection, clearing selection");
                self.selected = None;
                let _ = self.event_tx.send(RadarEvent::SelectionChanged(None));
            }
        }
    }

    /// Select an aircraft by id. Returns `false` if it is not in the collection.
    pub fn select(&mut self, id: &str) -> bool {
        if self.find(id).is_none() {
            return false;
        }
        if self.selected.as_deref() != Some(id) {
            self.selected = Some(id.to_string());
            let _ = self
                .event_tx
                .send(RadarEvent::SelectionChanged(self.selected.clone()));
        }
        true
    }

    pub fn clear_selection(&mut self) {
        if self.selected.take().is_some() {
            let _ = self.event_tx.send(RadarEvent::SelectionChanged(None));
        }
    }

    #[must_use]
    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// The selected aircraft, for the details panel.
    #[must_use]
    pub fn selected(&self) -> Option<&NormalizedAircraft> {
        self.selected.as_deref().and_then(|id| self.find(id))
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&NormalizedAircraft> {
        self.aircraft.iter().find(|a| a.id == id)
    }

    #[must_use]
    pub fn filters(&self) -> CategoryFilter {
        self.filters
    }

    pub fn toggle_category(&mut self, category: Category) {
        self.filters.toggle(category);
        let _ = self.event_tx.send(RadarEvent::FiltersChanged);
    }

    pub fn set_category(&mut self, category: Category, enabled: bool) {
        if self.filters.is_enabled(category) != enabled {
            self.filters.set(category, enabled);
            let _ = self.event_tx.send(RadarEvent::FiltersChanged);
        }
    }

    /// Full, unfiltered collection.
    #[must_use]
    pub fn aircraft(&self) -> &[NormalizedAircraft] {
        &self.aircraft
    }

    /// Aircraft passing the category filter.
    #[must_use]
    pub fn visible(&self) -> Visibility<'_> {
        if self.filters.all_disabled() {
            return Visibility::NoCategoriesSelected;
        }
        Visibility::Aircraft(
            self.aircraft
                .iter()
                .filter(|a| self.filters.is_enabled(a.category))
                .collect(),
        )
    }

    /// Aircraft count per category, in [`Category::ALL`] order.
    #[must_use]
    pub fn category_counts(&self) -> [(Category, usize); 3] {
        Category::ALL.map(|c| (c, self.aircraft.iter().filter(|a| a.category == c).count()))
    }

    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Error that emptied the latest snapshot, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&TelemetryError> {
        self.last_error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn aircraft(id: &str, category: Category) -> NormalizedAircraft {
        NormalizedAircraft {
            id: id.to_string(),
            callsign: id.to_uppercase(),
            latitude: 42.0,
            longitude: -73.0,
            altitude: 3000.0,
            velocity: 120.0,
            heading: 270.0,
            category,
            on_ground: false,
            last_contact: 1_700_000_000,
            origin_country: "United States".to_string(),
        }
    }

    fn snapshot(sequence: u64, aircraft: Vec<NormalizedAircraft>) -> Snapshot {
        Snapshot {
            sequence,
            completed_at: Instant::now(),
            aircraft,
            error: None,
        }
    }

    fn sample() -> Vec<NormalizedAircraft> {
        vec![
            aircraft("a", Category::Commercial),
            aircraft("b", Category::Military),
            aircraft("c", Category::GeneralAviation),
            aircraft("d", Category::Commercial),
        ]
    }

    #[test]
    fn test_toggle_flips_one_category() {
        let mut filter = CategoryFilter::default();
        filter.toggle(Category::Military);
        assert!(filter.is_enabled(Category::Commercial));
        assert!(!filter.is_enabled(Category::Military));
        assert!(filter.is_enabled(Category::GeneralAviation));
        filter.toggle(Category::Military);
        assert_eq!(filter, CategoryFilter::default());
    }

    #[test]
    fn test_visible_applies_filter() {
        let mut state = RadarState::default();
        state.apply_snapshot(snapshot(1, sample()));
        state.toggle_category(Category::Commercial);

        let Visibility::Aircraft(visible) = state.visible() else {
            panic!("expected aircraft");
        };
        let ids: Vec<_> = visible.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_all_filters_off_reports_no_categories() {
        let mut state = RadarState::default();
        state.apply_snapshot(snapshot(1, sample()));
        for category in Category::ALL {
            state.toggle_category(category);
        }
        assert_eq!(state.visible(), Visibility::NoCategoriesSelected);
        assert_eq!(state.aircraft().len(), 4);

        // Independent of collection size
        state.apply_snapshot(snapshot(2, Vec::new()));
        assert_eq!(state.visible(), Visibility::NoCategoriesSelected);
    }

    #[test]
    fn test_selection_cleared_when_aircraft_disappears() {
        let mut state = RadarState::default();
        state.apply_snapshot(snapshot(1, sample()));
        assert!(state.select("b"));
        assert_eq!(state.selected().map(|a| a.callsign.as_str()), Some("B"));

        state.apply_snapshot(snapshot(2, vec![aircraft("a", Category::Commercial)]));
        assert_eq!(state.selected_id(), None);
        assert!(state.selected().is_none());
    }

    #[test]
    fn test_selection_kept_when_aircraft_remains() {
        let mut state = RadarState::default();
        state.apply_snapshot(snapshot(1, sample()));
        state.select("a");
        state.apply_snapshot(snapshot(2, vec![aircraft("a", Category::Commercial)]));
        assert_eq!(state.selected_id(), Some("a"));
    }

    #[test]
    fn test_select_unknown_id_rejected() {
        let mut state = RadarState::default();
        state.apply_snapshot(snapshot(1, sample()));
        assert!(!state.select("zzz"));
        assert_eq!(state.selected_id(), None);
    }

    #[test]
    fn test_failed_snapshot_empties_collection() {
        let mut state = RadarState::default();
        state.apply_snapshot(snapshot(1, sample()));
        state.select("a");
        state.apply_snapshot(Snapshot {
            error: Some(TelemetryError::Network("timed out".to_string())),
            ..snapshot(2, Vec::new())
        });
        assert!(state.aircraft().is_empty());
        assert_eq!(state.selected_id(), None);
        assert!(state.last_error().is_some());
        assert_eq!(state.last_sequence(), Some(2));
    }

    #[test]
    fn test_category_counts() {
        let mut state = RadarState::default();
        state.apply_snapshot(snapshot(1, sample()));
        assert_eq!(
            state.category_counts(),
            [
                (Category::Commercial, 2),
                (Category::Military, 1),
                (Category::GeneralAviation, 1),
            ]
        );
    }

    #[test]
    fn test_events_emitted() {
        let mut state = RadarState::default();
        let mut rx = state.subscribe();

        state.apply_snapshot(snapshot(1, sample()));
        state.select("c");
        state.set_category(Category::Military, true); // no change, no event
        state.toggle_category(Category::Military);
        state.apply_snapshot(snapshot(2, Vec::new()));

        assert_eq!(rx.try_recv().unwrap(), RadarEvent::AircraftReplaced(4));
        assert_eq!(
            rx.try_recv().unwrap(),
            RadarEvent::SelectionChanged(Some("c".to_string()))
        );
        assert_eq!(rx.try_recv().unwrap(), RadarEvent::FiltersChanged);
        assert_eq!(rx.try_recv().unwrap(), RadarEvent::AircraftReplaced(0));
        assert_eq!(rx.try_recv().unwrap(), RadarEvent::SelectionChanged(None));
        assert!(rx.try_recv().is_err());
    }
}
