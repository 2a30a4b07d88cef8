//! Display surface: where view models end up.
//!
//! The dashboard never touches a page directly. It emits [`SurfaceUpdate`]s,
//! and a [`Surface`] applies them. In the server the surface is a broadcast
//! channel feeding SSE subscribers, which patch the page in place.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::markers::MarkerView;
use crate::view::{CountyFill, DetailView, MapView, TableRow, TableScope};

/// One change to the displayed page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SurfaceUpdate {
    /// Redraw every county shape
    DrawMap { generation: u64, map: MapView },
    /// Refill counties without redrawing shapes
    Recolor { fills: Vec<CountyFill> },
    /// Rebuild both list tables from scratch
    Tables { generation: u64, rows: Vec<TableRow> },
    /// Move the selected mark within one table
    RowSelected { scope: TableScope, index: usize },
    /// Selected event detail panel
    Detail { detail: DetailView },
    /// Remove the main marker and every pulse
    ClearMarkers,
    MainMarker { marker: MarkerView },
    Pulse { marker: MarkerView },
    /// Pulse finished animating
    RemovePulse { id: u64 },
    /// Marker-click detail panel
    MobileDetail { detail: DetailView },
    MobileDetailVisible { visible: bool },
    MobileListVisible { visible: bool },
}

/// Something that can show surface updates.
pub trait Surface: Send + Sync + 'static {
    fn apply(&self, update: SurfaceUpdate);
}

/// Surface that serializes updates to JSON and broadcasts them.
#[derive(Debug, Clone)]
pub struct BroadcastSurface {
    tx: broadcast::Sender<String>,
}

impl BroadcastSurface {
    #[must_use]
    pub fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }

    /// Subscribe to serialized updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Surface for BroadcastSurface {
    fn apply(&self, update: SurfaceUpdate) {
        match serde_json::to_string(&update) {
            // No subscribers is fine; the page fetches /state on load.
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(e) => warn!("failed to serialize surface update: {}", e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Surface that records every update, for call-count assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSurface {
        updates: Mutex<Vec<SurfaceUpdate>>,
    }

    impl RecordingSurface {
        pub(crate) fn updates(&self) -> Vec<SurfaceUpdate> {
            self.updates.lock().expect("lock").clone()
        }

        pub(crate) fn count(&self, pred: impl Fn(&SurfaceUpdate) -> bool) -> usize {
            self.updates.lock().expect("lock").iter().filter(|u| pred(u)).count()
        }

        pub(crate) fn clear(&self) {
            self.updates.lock().expect("lock").clear();
        }
    }

    impl Surface for RecordingSurface {
        fn apply(&self, update: SurfaceUpdate) {
            self.updates.lock().expect("lock").push(update);
        }
    }

    #[tokio::test]
    async fn test_broadcast_serializes_tagged_json() {
        let (tx, _) = broadcast::channel(8);
        let surface = BroadcastSurface::new(tx);
        let mut rx = surface.subscribe();

        surface.apply(SurfaceUpdate::MobileListVisible { visible: true });
        surface.apply(SurfaceUpdate::ClearMarkers);

        let first: serde_json::Value =
            serde_json::from_str(&rx.recv().await.expect("first update")).expect("json");
        assert_eq!(first["kind"], "mobile_list_visible");
        assert_eq!(first["visible"], true);

        let second = rx.recv().await.expect("second update");
        assert_eq!(second, r#"{"kind":"clear_markers"}"#);
    }

    #[test]
    fn test_broadcast_without_subscribers_does_not_fail() {
        let (tx, rx) = broadcast::channel(8);
        drop(rx);
        BroadcastSurface::new(tx).apply(SurfaceUpdate::ClearMarkers);
    }
}
