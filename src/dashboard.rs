//! The dashboard controller.
//!
//! Owns every piece of mutable display state: the change detector (which
//! holds the rendered list), the selection, the counties, the marker layer,
//! and the mobile panel flags.
//! All mutation goes through methods here; the server holds the dashboard
//! behind one mutex, so there is a single writer at any time.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::detect::{ChangeDetector, ChangeResult};
use crate::errors::SelectionError;
use crate::markers::{MarkerLayer, MarkerTarget, MarkerView};
use crate::models::EarthquakeEvent;
use crate::projection::Mercator;
use crate::surface::{Surface, SurfaceUpdate};
use crate::topology::CountyFeature;
use crate::view::{
    self, DetailView, HoverMetrics, MapView, TableRow, TableScope, Tooltip,
};

/// Everything the page needs to draw itself from scratch.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub generation: u64,
    pub map: MapView,
    pub rows: Vec<TableRow>,
    pub desktop_selected: Option<usize>,
    pub mobile_selected: Option<usize>,
    pub detail: DetailView,
    pub main_marker: Option<MarkerView>,
    pub mobile_detail: Option<DetailView>,
    pub mobile_detail_visible: bool,
    pub mobile_list_visible: bool,
}

/// Refresh, selection, and interaction state for one map.
pub struct Dashboard<S: Surface> {
    surface: Arc<S>,
    projection: Mercator,
    detector: ChangeDetector,
    counties: Vec<CountyFeature>,
    /// Bumped on every re-render; clicks must name the generation they saw
    generation: u64,
    selected: Option<usize>,
    desktop_selected: Option<usize>,
    mobile_selected: Option<usize>,
    markers: MarkerLayer<S>,
    mobile_detail: Option<DetailView>,
    mobile_detail_visible: bool,
    mobile_list_visible: bool,
}

impl<S: Surface> Dashboard<S> {
    /// Create an empty dashboard; the projection is fixed from here on.
    #[must_use]
    pub fn new(surface: Arc<S>, projection: Mercator) -> Self {
        Self {
            markers: MarkerLayer::new(Arc::clone(&surface)),
            surface,
            projection,
            detector: ChangeDetector::new(),
            counties: Vec::new(),
            generation: 0,
            selected: None,
            desktop_selected: None,
            mobile_selected: None,
            mobile_detail: None,
            mobile_detail_visible: false,
            mobile_list_visible: false,
        }
    }

    /// The currently selected event.
    #[must_use]
    pub fn selected(&self) -> Option<&EarthquakeEvent> {
        self.selected.and_then(|i| self.detector.previous().get(i))
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Pulse timers started so far.
    #[must_use]
    pub fn marker_timer_starts(&self) -> u64 {
        self.markers.timer_starts()
    }

    /// Apply the result of a refresh cycle.
    ///
    /// Does nothing at all when the list equals the previous one. Otherwise
    /// redraws the map, selects the newest event, places its markers, and
    /// rebuilds both tables and the detail panel.
    pub fn apply_refresh(
        &mut self,
        events: Vec<EarthquakeEvent>,
        counties: Vec<CountyFeature>,
    ) -> ChangeResult {
        let change = self.detector.observe(&events);
        if !change.should_render() {
            debug!(
                "feed unchanged ({} polls, {:.1}% unchanged)",
                self.detector.total_seen(),
                self.detector.unchanged_rate() * 100.0
            );
            return change;
        }

        self.generation += 1;
        self.counties = counties;
        self.selected = (!self.detector.previous().is_empty()).then_some(0);
        self.desktop_selected = self.selected;
        self.mobile_selected = self.selected;

        info!(
            "rendering {} earthquakes (generation {})",
            self.detector.previous().len(),
            self.generation
        );

        self.surface.apply(SurfaceUpdate::DrawMap {
            generation: self.generation,
            map: self.map_view(),
        });
        self.mark_selected();
        self.update_table();
        change
    }

    /// A row was clicked in one of the list tables.
    ///
    /// # Errors
    ///
    /// Rejects clicks made against an older list or naming a missing row.
    pub fn select_row(
        &mut self,
        generation: u64,
        index: usize,
        scope: TableScope,
    ) -> Result<(), SelectionError> {
        self.check(generation, index)?;

        match scope {
            TableScope::Desktop => self.desktop_selected = Some(index),
            TableScope::Mobile => self.mobile_selected = Some(index),
        }
        self.surface.apply(SurfaceUpdate::RowSelected { scope, index });
        self.selected = Some(index);

        if scope == TableScope::Mobile {
            self.set_mobile_list(!self.mobile_list_visible);
        }

        self.update_detail_table();
        self.mark_selected();
        self.surface.apply(SurfaceUpdate::Recolor {
            fills: view::county_fills(&self.counties, self.selected()),
        });
        Ok(())
    }

    /// A marker was clicked: show its event in the mobile detail panel.
    ///
    /// # Errors
    ///
    /// Rejects clicks made against an older list or naming a missing event.
    pub fn marker_click(&mut self, generation: u64, index: usize) -> Result<(), SelectionError> {
        self.check(generation, index)?;
        let detail = view::mobile_detail_view(&self.detector.previous()[index]);
        self.mobile_detail = Some(detail.clone());
        self.surface.apply(SurfaceUpdate::MobileDetail { detail });
        self.set_mobile_detail(true);
        Ok(())
    }

    /// Tooltip for a hovered county under the current selection.
    #[must_use]
    pub fn hover(&self, county: &str, at: HoverMetrics) -> Tooltip {
        view::tooltip(self.selected(), county, at)
    }

    /// The close icon on the mobile detail panel.
    pub fn close_mobile_detail(&mut self) {
        self.set_mobile_detail(false);
    }

    /// The mobile title: toggles the list and hides the detail panel.
    pub fn toggle_mobile_title(&mut self) {
        self.set_mobile_list(!self.mobile_list_visible);
        self.set_mobile_detail(false);
    }

    /// Full view for a page that just connected.
    #[must_use]
    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            generation: self.generation,
            map: self.map_view(),
            rows: view::table_rows(self.detector.previous(), None),
            desktop_selected: self.desktop_selected,
            mobile_selected: self.mobile_selected,
            detail: self.selected().map(view::detail_view).unwrap_or_default(),
            main_marker: self.markers.main_marker().cloned(),
            mobile_detail: self.mobile_detail.clone(),
            mobile_detail_visible: self.mobile_detail_visible,
            mobile_list_visible: self.mobile_list_visible,
        }
    }

    fn check(&self, generation: u64, index: usize) -> Result<(), SelectionError> {
        if generation != self.generation {
            return Err(SelectionError::Stale {
                requested: generation,
                current: self.generation,
            });
        }
        if index >= self.detector.previous().len() {
            return Err(SelectionError::OutOfRange {
                index,
                len: self.detector.previous().len(),
            });
        }
        Ok(())
    }

    fn map_view(&self) -> MapView {
        view::map_view(&self.counties, &self.projection, self.selected())
    }

    fn mark_selected(&mut self) {
        match self.selected {
            Some(index) => {
                let position = self.detector.previous()[index]
                    .epicenter()
                    .map(|(lon, lat)| self.projection.project(lon, lat));
                self.markers.mark(MarkerTarget {
                    generation: self.generation,
                    index,
                    position,
                });
                debug!("marker layer {:?} for event {}", self.markers.phase(), index);
            }
            None => self.markers.clear(),
        }
    }

    fn update_table(&self) {
        self.surface.apply(SurfaceUpdate::Tables {
            generation: self.generation,
            rows: view::table_rows(self.detector.previous(), self.selected),
        });
        self.update_detail_table();
    }

    /// Detail panel for the selection, blanked when the list is empty.
    fn update_detail_table(&self) {
        let detail = self.selected().map(view::detail_view).unwrap_or_default();
        self.surface.apply(SurfaceUpdate::Detail { detail });
    }

    fn set_mobile_list(&mut self, visible: bool) {
        self.mobile_list_visible = visible;
        self.surface.apply(SurfaceUpdate::MobileListVisible { visible });
    }

    fn set_mobile_detail(&mut self, visible: bool) {
        self.mobile_detail_visible = visible;
        self.surface.apply(SurfaceUpdate::MobileDetailVisible { visible });
    }
}
