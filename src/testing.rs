//! In-process mock of the catalog and league APIs, bound to an ephemeral port.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Days, NaiveDate};
use serde_json::{json, Value};

use crate::api::in_flight::InFlightGauge;

async fn bind(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum MockPlayer {
    Active { slug: String, team: u64 },
    OutOfLeague { slug: String },
    NoTeam { slug: String },
    ServerError,
}

impl MockPlayer {
    pub fn active(id: u64, team: u64) -> Self {
        MockPlayer::Active { slug: format!("player-{id}"), team }
    }

    pub fn out_of_league(id: u64) -> Self {
        MockPlayer::OutOfLeague { slug: format!("player-{id}") }
    }

    pub fn without_team(id: u64) -> Self {
        MockPlayer::NoTeam { slug: format!("player-{id}") }
    }

    pub fn server_error() -> Self {
        MockPlayer::ServerError
    }
}

pub struct MockCatalog {
    players: HashMap<u64, MockPlayer>,
    latency: Duration,
    stalls: HashMap<u64, Duration>,
    history_errors: HashSet<u64>,
}

impl MockCatalog {
    pub fn new(players: HashMap<u64, MockPlayer>) -> Self {
        Self {
            players,
            latency: Duration::ZERO,
            stalls: HashMap::new(),
            history_errors: HashSet::new(),
        }
    }

    /// Every response is delayed by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The profile call for `id` hangs for `stall` before answering.
    pub fn with_stall(mut self, id: u64, stall: Duration) -> Self {
        self.stalls.insert(id, stall);
        self
    }

    /// The market-value call for `id` answers 503.
    pub fn with_history_error(mut self, id: u64) -> Self {
        self.history_errors.insert(id);
        self
    }

    pub async fn serve(self) -> CatalogServer {
        let state = Arc::new(CatalogState {
            spec: self,
            profile_hits: Mutex::new(HashMap::new()),
            history_hits: AtomicUsize::new(0),
            in_flight: InFlightGauge::new(),
            day: AtomicU64::new(0),
        });
        let app = Router::new()
            .route("/player/:id", get(profile))
            .route("/player/:id/market-value", get(market_value))
            .with_state(Arc::clone(&state));
        CatalogServer { addr: bind(app).await, state }
    }
}

struct CatalogState {
    spec: MockCatalog,
    profile_hits: Mutex<HashMap<u64, usize>>,
    history_hits: AtomicUsize,
    in_flight: InFlightGauge,
    /// Days elapsed since the first published market value.
    day: AtomicU64,
}

pub struct CatalogServer {
    addr: SocketAddr,
    state: Arc<CatalogState>,
}

impl CatalogServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn profile_hits(&self) -> HashMap<u64, usize> {
        self.state.profile_hits.lock().unwrap().clone()
    }

    pub fn history_hits(&self) -> usize {
        self.state.history_hits.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.state.in_flight.peak()
    }

    /// Publish one more day of market values and revise every earlier one.
    pub fn advance_day(&self) {
        self.state.day.fetch_add(1, Ordering::SeqCst);
    }
}

fn player_json(slug: &str, status: &str, team: Option<u64>) -> Value {
    let mut body = json!({
        "slug": slug,
        "playerStatus": status,
        "positionId": 2,
        "playerStats": [
            {"weekNumber": 3, "totalPoints": 5},
            {"weekNumber": 7, "totalPoints": 0}
        ],
        "marketValue": "1000000",
        "points": 5,
        "averagePoints": 2.5
    });
    if let Some(team) = team {
        body["team"] = json!({"id": team, "shortName": format!("T{team}"), "name": format!("Team {team}")});
    }
    body
}

async fn profile(State(state): State<Arc<CatalogState>>, Path(id): Path<u64>) -> Response {
    let _guard = state.in_flight.enter();
    *state.profile_hits.lock().unwrap().entry(id).or_default() += 1;

    if let Some(stall) = state.spec.stalls.get(&id) {
        tokio::time::sleep(*stall).await;
    }
    tokio::time::sleep(state.spec.latency).await;

    match state.spec.players.get(&id) {
        None => StatusCode::NOT_FOUND.into_response(),
        Some(MockPlayer::ServerError) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Some(MockPlayer::Active { slug, team }) => Json(player_json(slug, "ok", Some(*team))).into_response(),
        Some(MockPlayer::OutOfLeague { slug }) => {
            Json(player_json(slug, "out_of_league", Some(99))).into_response()
        }
        Some(MockPlayer::NoTeam { slug }) => Json(player_json(slug, "ok", None)).into_response(),
    }
}

async fn market_value(State(state): State<Arc<CatalogState>>, Path(id): Path<u64>) -> Response {
    let _guard = state.in_flight.enter();
    state.history_hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(state.spec.latency).await;

    if state.spec.history_errors.contains(&id) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let day = state.day.load(Ordering::SeqCst);
    let start = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
    let points: Vec<Value> = (0..=day + 1)
        .map(|i| {
            let date = start.checked_add_days(Days::new(i)).unwrap();
            // Values depend on `day` so every earlier date is revised each time.
            json!({"date": format!("{date}T00:00:00+02:00"), "marketValue": id * 1000 + i * 10 + day})
        })
        .collect();
    Json(points).into_response()
}

// ---------------------------------------------------------------------------
// League API
// ---------------------------------------------------------------------------

/// Two leagues. League 1 ranks teams 11, 12 (managed) and 13 (no manager);
/// league 2 ranks team 21 (managed) and 22 (404).
pub struct MockLeagues {
    token: String,
}

impl MockLeagues {
    pub fn new(token: &str) -> Self {
        Self { token: token.to_string() }
    }

    pub async fn serve(self) -> LeagueServer {
        let state = Arc::new(LeagueState {
            expected_auth: format!("Bearer {}", self.token),
            requests: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        });
        let app = Router::new()
            .route("/v4/leagues", get(leagues))
            .route("/v3/league/:league/market", get(market))
            .route("/v4/leagues/:league/ranking", get(ranking))
            .route("/v3/leagues/:league/teams/:team", get(team))
            .with_state(Arc::clone(&state));
        LeagueServer { addr: bind(app).await, state }
    }
}

struct LeagueState {
    expected_auth: String,
    requests: AtomicUsize,
    rejected: AtomicUsize,
}

impl LeagueState {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let auth_ok = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == self.expected_auth);
        let client_ok = headers.get("x-app").is_some_and(|v| v == "Fantasy-web")
            && headers.get("x-lang").is_some();
        if !(auth_ok && client_ok) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
        }
        auth_ok && client_ok
    }
}

pub struct LeagueServer {
    addr: SocketAddr,
    state: Arc<LeagueState>,
}

impl LeagueServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn all_requests_authorized(&self) -> bool {
        self.state.requests.load(Ordering::SeqCst) > 0
            && self.state.rejected.load(Ordering::SeqCst) == 0
    }
}

async fn leagues(State(state): State<Arc<LeagueState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!([{"id": 1, "name": "Friends"}, {"id": "2", "name": "Work"}])).into_response()
}

async fn market(
    State(state): State<Arc<LeagueState>>,
    headers: HeaderMap,
    Path(league): Path<u64>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!([{"playerMaster": {"id": 53 + league}, "salePrice": 1000}])).into_response()
}

async fn ranking(
    State(state): State<Arc<LeagueState>>,
    headers: HeaderMap,
    Path(league): Path<u64>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let teams: &[u64] = match league {
        1 => &[11, 12, 13],
        2 => &[21, 22],
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    let entries: Vec<Value> = teams.iter().map(|t| json!({"team": {"id": t.to_string()}})).collect();
    Json(entries).into_response()
}

async fn team(
    State(state): State<Arc<LeagueState>>,
    headers: HeaderMap,
    Path((_league, team)): Path<(u64, u64)>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let manager = match team {
        11 => Some((511, "Ana")),
        12 => Some((512, "Bo")),
        21 => Some((521, "Cy")),
        13 => None,
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    let mut body = json!({
        "teamValue": 200_000_000,
        "teamMoney": 1_500_000,
        "players": [
            {"playerMaster": {"id": 53, "nickname": "Pedri", "positionId": 3, "marketValue": "85000000"}, "buyoutClause": 90_000_000}
        ]
    });
    if let Some((id, name)) = manager {
        body["manager"] = json!({"id": id, "managerName": name});
    }
    Json(body).into_response()
}
