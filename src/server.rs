//! Web server for the quakemap dashboard.
//!
//! Provides the live intensity map using:
//! - Axum for HTTP server
//! - SSE (Server-Sent Events) to push display updates to the page
//! - A background task that refreshes the feeds on a fixed interval

use std::convert::Infallible;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{
        Html, IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::Deserialize;
use tokio::sync::{Mutex, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::client::QuakeClient;
use crate::dashboard::Dashboard;
use crate::errors::SelectionError;
use crate::projection::Mercator;
use crate::surface::BroadcastSurface;
use crate::token::{TokenProvider, TokenSource};
use crate::view::{HoverMetrics, TableScope};

/// Time between refresh cycles.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Serves `/api/earthquake_data`
    pub api_host: String,
    /// Serves `/static/json/{region}.json`; defaults to this server
    pub map_base: Option<String>,
    /// Topology object and file name
    pub region: String,
    /// Directory this server serves topology files from
    pub static_dir: Option<PathBuf>,
    /// Viewport width the projection scale is picked for
    pub viewport_width: u32,
    pub tokens: TokenSource,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            api_host: crate::client::DEFAULT_API_HOST.to_string(),
            map_base: None,
            region: "Taiwan".to_string(),
            static_dir: None,
            viewport_width: 1280,
            tokens: TokenSource::Fixed(String::new()),
        }
    }
}

impl ServerConfig {
    /// Reject configurations under which the topology can never load.
    ///
    /// # Errors
    ///
    /// Fails when the topology would be fetched from this server but no
    /// static directory is configured.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.map_base.is_some() || self.static_dir.is_some(),
            "no topology source: pass --static-dir to serve {}.json here, or --map-base",
            self.region
        );
        Ok(())
    }

    /// Base URL the topology is fetched from.
    #[must_use]
    pub fn map_base(&self) -> String {
        self.map_base
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The one dashboard; every mutation goes through this lock
    dashboard: Arc<Mutex<Dashboard<BroadcastSurface>>>,
    /// Surface the dashboard writes to, for SSE subscriptions
    surface: BroadcastSurface,
    /// Directory for `/static/json`
    static_dir: Option<Arc<PathBuf>>,
}

impl AppState {
    #[must_use]
    pub fn new(projection: Mercator, static_dir: Option<PathBuf>) -> Self {
        let (tx, _rx) = broadcast::channel::<String>(256);
        let surface = BroadcastSurface::new(tx);
        let dashboard = Dashboard::new(Arc::new(surface.clone()), projection);
        Self {
            dashboard: Arc::new(Mutex::new(dashboard)),
            surface,
            static_dir: static_dir.map(Arc::new),
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/stream", get(sse_handler))
        .route("/state", get(state_handler))
        .route("/select", post(select_handler))
        .route("/marker", post(marker_handler))
        .route("/hover", get(hover_handler))
        .route("/mobile/close", post(mobile_close_handler))
        .route("/mobile/title", post(mobile_title_handler))
        .route("/static/json/{file}", get(topology_file_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the web server.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;
    let client = QuakeClient::new(&config.api_host, config.map_base(), &config.region)?;
    let tokens = config.tokens.clone().into_provider(client.http());
    debug!("map region {} from {}", client.region(), config.map_base());

    let projection = Mercator::for_viewport(config.viewport_width);
    debug!("projection scale {}", projection.scale());
    let state = AppState::new(projection, config.static_dir.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌏 quakemap starting at http://{}", addr);

    // Spawn the background refresh task
    tokio::spawn(refresh_loop(state.dashboard.clone(), client, tokens, REFRESH_INTERVAL));

    axum::serve(listener, create_router(state)).await?;

    Ok(())
}

/// Refresh the feeds every `period`, starting immediately.
///
/// Each cycle finishes before the next tick is taken, so cycles never
/// overlap and a slow response can never overwrite a newer one.
async fn refresh_loop<T: TokenProvider>(
    dashboard: Arc<Mutex<Dashboard<BroadcastSurface>>>,
    client: QuakeClient,
    tokens: T,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycle = 0u64;

    loop {
        ticker.tick().await;
        cycle += 1;

        match client.load_data(&tokens).await {
            Ok((events, counties)) => {
                let mut guard = dashboard.lock().await;
                let change = guard.apply_refresh(events, counties);
                debug!(
                    "cycle #{}: {:?} (generation {}, {} pulse timers started)",
                    cycle,
                    change,
                    guard.generation(),
                    guard.marker_timer_starts()
                );
            }
            Err(e) => {
                warn!("refresh cycle #{} failed, keeping last view: {}", cycle, e);
            }
        }
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Main page handler - serves the HTML UI.
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// SSE stream of display updates.
///
/// A subscriber that falls behind gets a `resync` event and reloads `/state`.
async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.surface.subscribe();
    let stream = BroadcastStream::new(rx).map(|result| {
        Ok(match result {
            Ok(json) => Event::default().event("update").data(json),
            Err(_) => Event::default().event("resync").data("lagged"),
        })
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Full current view, for page load and resync.
async fn state_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dashboard.lock().await.snapshot())
}

#[derive(Debug, Deserialize)]
struct SelectRequest {
    generation: u64,
    index: usize,
    scope: TableScope,
}

/// Row click.
async fn select_handler(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> StatusCode {
    let result = state
        .dashboard
        .lock()
        .await
        .select_row(req.generation, req.index, req.scope);
    selection_status(result)
}

#[derive(Debug, Deserialize)]
struct MarkerRequest {
    generation: u64,
    index: usize,
}

/// Marker click.
async fn marker_handler(
    State(state): State<AppState>,
    Json(req): Json<MarkerRequest>,
) -> StatusCode {
    let result = state
        .dashboard
        .lock()
        .await
        .marker_click(req.generation, req.index);
    selection_status(result)
}

fn selection_status(result: Result<(), SelectionError>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            warn!("ignoring click: {}", e);
            match e {
                SelectionError::Stale { .. } => StatusCode::CONFLICT,
                SelectionError::OutOfRange { .. } => StatusCode::NOT_FOUND,
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct HoverQuery {
    county: String,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    window: f64,
}

/// Tooltip content and placement for a hovered county.
async fn hover_handler(
    State(state): State<AppState>,
    Query(q): Query<HoverQuery>,
) -> impl IntoResponse {
    let at = HoverMetrics {
        x: q.x,
        y: q.y,
        width: q.width,
        height: q.height,
        window: q.window,
    };
    Json(state.dashboard.lock().await.hover(&q.county, at))
}

/// Close icon on the mobile detail panel.
async fn mobile_close_handler(State(state): State<AppState>) -> StatusCode {
    state.dashboard.lock().await.close_mobile_detail();
    StatusCode::NO_CONTENT
}

/// Mobile title toggle.
async fn mobile_title_handler(State(state): State<AppState>) -> StatusCode {
    state.dashboard.lock().await.toggle_mobile_title();
    StatusCode::NO_CONTENT
}

/// Serve a topology file from the static directory.
async fn topology_file_handler(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Response {
    let Some(dir) = state.static_dir.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(path) = topology_path(dir, &file) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read_to_string(&path).await {
        Ok(text) => ([(CONTENT_TYPE, "application/json")], text).into_response(),
        Err(e) => {
            debug!("topology file {} unavailable: {}", path.display(), e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Resolve a requested file inside `dir`; only plain `*.json` names.
fn topology_path(dir: &FsPath, file: &str) -> Option<PathBuf> {
    let plain = !file.is_empty()
        && file.ends_with(".json")
        && !file.contains(['/', '\\'])
        && !file.starts_with('.');
    plain.then(|| dir.join(file))
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// HTML Template (embedded for single-binary deployment)
// ============================================================================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="zh-Hant">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>quakemap - 即時地震</title>
    <style>
        :root {
            --bg-color: #101418;
            --bg2-color: #2b3138;
            --font-color: #e8eaed;
            --sp-color: #ff5252;
            --earthquake-span-1: #d32f2f;
            --earthquake-span-2: #f57c00;
            --earthquake-span-3: #fbc02d;
            --earthquake-span-4: #388e3c;
            --default-color: #616161;
        }
        * { box-sizing: border-box; }
        body { margin: 0; font-family: system-ui, sans-serif; background: var(--bg-color); color: var(--font-color); }
        .layout { display: flex; gap: 16px; padding: 16px; height: 100vh; }
        .map-pane { flex: 1; min-width: 0; }
        .taiwan { width: 100%; height: 100%; }
        .county { stroke: var(--bg-color); stroke-width: 0.5px; cursor: pointer; }
        .earthquake-marker, .earthquake-marker-main { cursor: pointer; }
        .side-pane { width: 380px; display: flex; flex-direction: column; gap: 16px; overflow: hidden; }
        .list { overflow-y: auto; flex: 1; }
        table { width: 100%; border-collapse: collapse; }
        .table-tr { cursor: pointer; border-bottom: 1px solid var(--bg2-color); }
        .table-tr.selected { background: var(--bg2-color); }
        .table-td { padding: 8px; }
        .center { text-align: center; }
        .table-td span.badge { display: inline-block; padding: 4px 8px; border-radius: 6px; color: #000; font-weight: 600; }
        .datetime, .mobile-datetime { font-size: 0.8em; opacity: 0.7; }
        .detail th { text-align: left; padding: 4px 8px; opacity: 0.7; white-space: nowrap; }
        .detail td { padding: 4px 8px; }
        .county-tip { position: absolute; visibility: hidden; pointer-events: none; background: var(--bg2-color); padding: 6px 10px; border-radius: 6px; }
        .mobile-title, .mobile-list, #detail-mobile { display: none; }
        .close-icon { cursor: pointer; float: right; }
        @media (max-width: 768px) {
            .layout { flex-direction: column; height: auto; }
            .side-pane { display: none; }
            .mobile-title { display: block; padding: 12px 16px; font-weight: 600; cursor: pointer; background: var(--bg2-color); }
            #detail-mobile { position: fixed; bottom: 0; left: 0; right: 0; background: var(--bg2-color); }
        }
    </style>
</head>
<body>
    <div class="mobile-title">地震列表 ☰</div>
    <div class="mobile-list"><table><tbody id="mobile-earthquake"></tbody></table></div>
    <div class="layout">
        <div class="map-pane">
            <svg class="taiwan" preserveAspectRatio="xMidYMid meet" viewBox="0 0 800 600">
                <g id="counties"></g>
                <g id="markers"></g>
            </svg>
        </div>
        <div class="side-pane">
            <table class="detail">
                <tr><th>編號</th><td id="detail-no"></td></tr>
                <tr><th>時間</th><td id="detail-datetime"></td></tr>
                <tr><th>位置</th><td id="detail-location"></td></tr>
                <tr><th>深度</th><td id="detail-depth"></td></tr>
                <tr><th>規模</th><td id="detail-magnitude"></td></tr>
            </table>
            <div class="list"><table><tbody id="earthquake-tbody"></tbody></table></div>
        </div>
    </div>
    <table id="detail-mobile" class="detail">
        <tr><th>編號</th><td id="mobile-no"></td><td><span class="close-icon">✕</span></td></tr>
        <tr><th>時間</th><td id="mobile-datetime" colspan="2"></td></tr>
        <tr><th>位置</th><td id="mobile-location" colspan="2"></td></tr>
        <tr><th>深度</th><td id="mobile-depth" colspan="2"></td></tr>
        <tr><th>規模</th><td id="mobile-magnitude" colspan="2"></td></tr>
    </table>
    <div class="county-tip"><span id="tooltip-county"></span> <span id="tooltip-intensity"></span></div>

    <script>
    (function () {
        const SVG = 'http://www.w3.org/2000/svg';
        const countiesG = document.getElementById('counties');
        const markersG = document.getElementById('markers');
        const tooltip = document.querySelector('.county-tip');
        let generation = 0;
        let hoverPending = false;

        function post(url, body) {
            return fetch(url, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: body ? JSON.stringify(body) : undefined,
            });
        }

        function drawMap(map) {
            countiesG.replaceChildren();
            for (const c of map.counties) {
                const path = document.createElementNS(SVG, 'path');
                path.setAttribute('d', c.path);
                path.setAttribute('class', 'county');
                path.setAttribute('fill', c.fill);
                path.setAttribute('opacity', map.opacity);
                path.dataset.county = c.name;
                path.addEventListener('mousemove', (e) => hover(e, c.name));
                path.addEventListener('mouseover', (e) => hover(e, c.name));
                path.addEventListener('mouseout', () => { tooltip.style.visibility = 'hidden'; });
                countiesG.appendChild(path);
            }
        }

        function recolor(fills) {
            for (const f of fills) {
                for (const path of countiesG.querySelectorAll('path')) {
                    if (path.dataset.county === f.name) path.setAttribute('fill', f.fill);
                }
            }
        }

        function hover(event, county) {
            if (hoverPending) return;
            hoverPending = true;
            const params = new URLSearchParams({
                county,
                x: event.pageX,
                y: event.pageY,
                width: tooltip.offsetWidth,
                height: tooltip.offsetHeight,
                window: window.innerWidth,
            });
            fetch('/hover?' + params).then(r => r.json()).then(tip => {
                document.getElementById('tooltip-county').textContent = tip.county;
                document.getElementById('tooltip-intensity').textContent = tip.intensity;
                tooltip.style.left = tip.left + 'px';
                tooltip.style.top = tip.top + 'px';
                tooltip.style.visibility = 'visible';
            }).finally(() => { hoverPending = false; });
        }

        function buildRows(tbodyId, scope, rows, selected) {
            const tbody = document.getElementById(tbodyId);
            tbody.replaceChildren();
            for (const row of rows) {
                const tr = document.createElement('tr');
                tr.className = row.index === selected ? 'table-tr selected' : 'table-tr';
                const badgeTd = document.createElement('td');
                badgeTd.className = 'table-td center';
                const badge = document.createElement('span');
                badge.className = 'badge';
                badge.style.backgroundColor = row.badge_color;
                badge.textContent = row.intensity;
                badgeTd.appendChild(badge);
                const infoTd = document.createElement('td');
                infoTd.className = 'table-td';
                const time = document.createElement('span');
                time.className = scope === 'mobile' ? 'mobile-datetime' : 'datetime';
                time.textContent = row.origin_time;
                const loc = document.createElement('span');
                loc.className = scope === 'mobile' ? 'mobile-location' : 'location';
                loc.textContent = row.location;
                infoTd.append(time, document.createElement('br'), loc);
                tr.append(badgeTd, infoTd);
                tr.addEventListener('click', () => post('/select', { generation, index: row.index, scope }));
                tbody.appendChild(tr);
            }
        }

        function markSelected(scope, index) {
            const tbody = document.getElementById(scope === 'mobile' ? 'mobile-earthquake' : 'earthquake-tbody');
            tbody.querySelectorAll('.selected').forEach(el => el.classList.remove('selected'));
            const tr = tbody.children[index];
            if (tr) tr.classList.add('selected');
        }

        function fillDetail(prefix, d) {
            document.getElementById(prefix + 'no').textContent = d.no;
            document.getElementById(prefix + 'datetime').textContent = d.datetime;
            document.getElementById(prefix + 'location').textContent = d.location;
            document.getElementById(prefix + 'depth').textContent = d.depth;
            document.getElementById(prefix + 'magnitude').textContent = d.magnitude;
        }

        function addMarker(m, cls) {
            const circle = document.createElementNS(SVG, 'circle');
            circle.setAttribute('class', cls);
            circle.setAttribute('cx', m.x);
            circle.setAttribute('cy', m.y);
            circle.setAttribute('r', m.radius);
            circle.setAttribute('fill', 'var(--sp-color)');
            circle.setAttribute('opacity', m.opacity);
            circle.dataset.id = m.id;
            if (cls === 'earthquake-marker-main') {
                circle.setAttribute('stroke', 'var(--font-color)');
                circle.setAttribute('stroke-width', '1px');
            }
            if (m.duration_ms > 0) {
                for (const [attr, from, to] of [['r', m.radius, m.end_radius], ['opacity', m.opacity, 0]]) {
                    const anim = document.createElementNS(SVG, 'animate');
                    anim.setAttribute('attributeName', attr);
                    anim.setAttribute('from', from);
                    anim.setAttribute('to', to);
                    anim.setAttribute('dur', m.duration_ms + 'ms');
                    anim.setAttribute('fill', 'freeze');
                    anim.setAttribute('calcMode', 'spline');
                    anim.setAttribute('keySplines', '0.65 0 0.35 1');
                    anim.setAttribute('begin', 'indefinite');
                    anim.addEventListener('endEvent', () => circle.remove());
                    circle.appendChild(anim);
                }
            }
            circle.addEventListener('click', () => post('/marker', { generation: m.generation, index: m.index }));
            markersG.appendChild(circle);
            circle.querySelectorAll('animate').forEach(a => a.beginElement());
        }

        function setDisplay(selector, visible, shown) {
            document.querySelector(selector).style.display = visible ? shown : 'none';
        }

        function apply(u) {
            switch (u.kind) {
                case 'draw_map': generation = u.generation; drawMap(u.map); break;
                case 'recolor': recolor(u.fills); break;
                case 'tables':
                    generation = u.generation;
                    buildRows('earthquake-tbody', 'desktop', u.rows, 0);
                    buildRows('mobile-earthquake', 'mobile', u.rows, 0);
                    break;
                case 'row_selected': markSelected(u.scope, u.index); break;
                case 'detail': fillDetail('detail-', u.detail); break;
                case 'clear_markers': markersG.replaceChildren(); break;
                case 'main_marker': addMarker(u.marker, 'earthquake-marker-main'); break;
                case 'pulse': addMarker(u.marker, 'earthquake-marker'); break;
                case 'remove_pulse': markersG.querySelector(`[data-id="${u.id}"]`)?.remove(); break;
                case 'mobile_detail': fillDetail('mobile-', u.detail); break;
                case 'mobile_detail_visible': setDisplay('#detail-mobile', u.visible, 'table'); break;
                case 'mobile_list_visible': setDisplay('.mobile-list', u.visible, 'block'); break;
            }
        }

        function loadState() {
            return fetch('/state').then(r => r.json()).then(s => {
                generation = s.generation;
                drawMap(s.map);
                buildRows('earthquake-tbody', 'desktop', s.rows, s.desktop_selected);
                buildRows('mobile-earthquake', 'mobile', s.rows, s.mobile_selected);
                fillDetail('detail-', s.detail);
                markersG.replaceChildren();
                if (s.main_marker) addMarker(s.main_marker, 'earthquake-marker-main');
                if (s.mobile_detail) fillDetail('mobile-', s.mobile_detail);
                setDisplay('#detail-mobile', s.mobile_detail_visible, 'table');
                setDisplay('.mobile-list', s.mobile_list_visible, 'block');
            });
        }

        document.querySelector('.close-icon').addEventListener('click', () => post('/mobile/close'));
        document.querySelector('.mobile-title').addEventListener('click', () => post('/mobile/title'));

        loadState().then(() => {
            const source = new EventSource('/stream');
            source.addEventListener('update', (e) => apply(JSON.parse(e.data)));
            source.addEventListener('resync', () => loadState());
        });
    })();
    </script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::models::tests::SAMPLE_FEED;
    use crate::token::StaticToken;
    use crate::topology::tests::SAMPLE_TOPOLOGY;

    /// Request counters for the in-process earthquake feed.
    #[derive(Default)]
    struct FeedStats {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    /// Feed that answers the sample list once, then HTTP 500, taking `delay` per request.
    async fn flaky_feed(delay: Duration) -> (String, Arc<FeedStats>) {
        let stats = Arc::new(FeedStats::default());
        let seen = Arc::clone(&stats);
        let app = Router::new()
            .route(
                "/api/earthquake_data",
                get(move || {
                    let stats = Arc::clone(&seen);
                    async move {
                        let n = stats.calls.fetch_add(1, Ordering::SeqCst);
                        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(delay).await;
                        stats.in_flight.fetch_sub(1, Ordering::SeqCst);
                        if n == 0 {
                            ([(CONTENT_TYPE, "application/json")], SAMPLE_FEED).into_response()
                        } else {
                            StatusCode::INTERNAL_SERVER_ERROR.into_response()
                        }
                    }
                }),
            )
            .route("/static/json/Taiwan.json", get(|| async { SAMPLE_TOPOLOGY }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move { axum::serve(listener, app).await });
        (format!("http://{addr}"), stats)
    }

    fn spawn_refresh(state: &AppState, base: &str, period: Duration) {
        let client = QuakeClient::new(base, base, "Taiwan").expect("client");
        tokio::spawn(refresh_loop(
            Arc::clone(&state.dashboard),
            client,
            StaticToken("t".into()),
            period,
        ));
    }

    #[tokio::test]
    async fn test_refresh_loop_renders_first_cycle_immediately() {
        let (base, stats) = flaky_feed(Duration::ZERO).await;
        let state = AppState::new(Mercator::for_viewport(1280), None);
        spawn_refresh(&state, &base, REFRESH_INTERVAL);

        tokio::time::timeout(Duration::from_secs(5), async {
            while state.dashboard.lock().await.generation() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first cycle runs without waiting a full interval");

        // The next cycle is a full interval away.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(stats.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_cycles_keep_last_view_and_never_overlap() {
        let (base, stats) = flaky_feed(Duration::from_millis(60)).await;
        let state = AppState::new(Mercator::for_viewport(1280), None);
        spawn_refresh(&state, &base, Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.calls.load(Ordering::SeqCst) < 4 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("cycles keep running after failures");

        let snapshot = state.dashboard.lock().await.snapshot();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.detail.no, "001");
        assert_eq!(snapshot.map.counties.len(), 2);
        assert_eq!(stats.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_topology_path_accepts_plain_json_names() {
        let dir = FsPath::new("/srv/static/json");
        assert_eq!(
            topology_path(dir, "Taiwan.json"),
            Some(PathBuf::from("/srv/static/json/Taiwan.json"))
        );
        assert_eq!(topology_path(dir, "../secret.json"), None);
        assert_eq!(topology_path(dir, ".hidden.json"), None);
        assert_eq!(topology_path(dir, "Taiwan.geojson.txt"), None);
        assert_eq!(topology_path(dir, ""), None);
    }

    #[test]
    fn test_selection_status() {
        assert_eq!(selection_status(Ok(())), StatusCode::NO_CONTENT);
        assert_eq!(
            selection_status(Err(SelectionError::Stale { requested: 1, current: 2 })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            selection_status(Err(SelectionError::OutOfRange { index: 3, len: 1 })),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_config_without_topology_source_is_rejected() {
        let config = ServerConfig::default();
        assert!(config.validate().is_err());

        let config = ServerConfig {
            static_dir: Some(PathBuf::from("static/json")),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = ServerConfig {
            map_base: Some("https://maps.example".into()),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_map_base_defaults_to_self() {
        let config = ServerConfig::default();
        assert_eq!(config.map_base(), "http://127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_serves_state_and_rejects_stale_clicks() {
        let state = AppState::new(Mercator::for_viewport(1280), None);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move { axum::serve(listener, create_router(state)).await });
        let base = format!("http://{addr}");
        let http = reqwest::Client::new();

        let snapshot: serde_json::Value = http
            .get(format!("{base}/state"))
            .send()
            .await
            .expect("state")
            .json()
            .await
            .expect("json");
        assert_eq!(snapshot["generation"], 0);
        assert_eq!(snapshot["rows"], serde_json::json!([]));

        let status = http
            .post(format!("{base}/select"))
            .json(&serde_json::json!({ "generation": 7, "index": 0, "scope": "desktop" }))
            .send()
            .await
            .expect("select")
            .status();
        assert_eq!(status.as_u16(), 409);

        let tip: serde_json::Value = http
            .get(format!(
                "{base}/hover?county=%E5%8F%B0%E5%8C%97%E5%B8%82&x=10&y=100&width=50&height=20&window=800"
            ))
            .send()
            .await
            .expect("hover")
            .json()
            .await
            .expect("json");
        assert_eq!(tip["county"], "台北市");
        assert_eq!(tip["intensity"], "0級");

        let health = http.get(format!("{base}/health")).send().await.expect("health");
        assert_eq!(health.text().await.expect("body"), "OK");
    }
}
