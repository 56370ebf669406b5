use std::path::PathBuf;

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::api::endpoints;
use crate::api::latency::CallStage;
use crate::api::models::{ManagerRosterPayload, MarketValuePoint, PlayerPayload};
use crate::api::{ApiClient, ApiResponse};
use crate::config::layout::{DATA_DIR, LEAGUES_DIR, PLAYERS_DIR, RANKING_FILE};
use crate::dispatcher::{Fetched, HarvestTarget, Placement};
use crate::history::{normalize_date, HistoryPoint};
use crate::types::{
    AssociationGap, EntityId, HarvestOutcome, ManagerRoster, PlayerRecord, PlayerStatus,
    PlayerSummary, RosterPlayer, RosterSummary, TeamKey, WeeklyScores,
};

// ---------------------------------------------------------------------------
// Catalog mode: public player profiles + market-value history
// ---------------------------------------------------------------------------

/// Unauthenticated harvest of `/player/{id}` over a numeric range. Stage 2
/// (`/player/{id}/market-value`) runs only for players stored by stage 1.
pub struct CatalogTarget {
    api_url: String,
}

impl CatalogTarget {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self { api_url: api_url.into() }
    }

    async fn fetch_history(
        &self,
        client: &ApiClient,
        id: EntityId,
    ) -> std::result::Result<Vec<HistoryPoint>, String> {
        let resp = client
            .get(&endpoints::player_market_value(&self.api_url, id), CallStage::History)
            .await
            .map_err(describe_transport_error)?;
        if resp.status != StatusCode::OK {
            return Err(format!("status {}", resp.status.as_u16()));
        }
        let raw: Vec<MarketValuePoint> = resp.json().map_err(|e| e.to_string())?;
        Ok(parse_history(id, raw))
    }
}

impl HarvestTarget for CatalogTarget {
    type Record = PlayerRecord;
    type Summary = PlayerSummary;

    async fn fetch(&self, client: &ApiClient, id: EntityId) -> Fetched<PlayerRecord> {
        let resp = match client.get(&endpoints::player(&self.api_url, id), CallStage::Profile).await {
            Ok(resp) => resp,
            Err(e) => {
                return Fetched::outcome(HarvestOutcome::TransientFailure(describe_transport_error(e)))
            }
        };

        let record = match classify_profile(id, &resp) {
            HarvestOutcome::Stored(record) => record,
            other => return Fetched::outcome(other),
        };

        // The record is kept even when its history can't be fetched.
        let history = match self.fetch_history(client, id).await {
            Ok(points) => Some(points),
            Err(reason) => {
                warn!(player_id = %id, %reason, "Player {id}: market-value history unavailable, storing without it");
                None
            }
        };

        Fetched { outcome: HarvestOutcome::Stored(record), history }
    }

    fn place(&self, record: &PlayerRecord) -> Placement<PlayerSummary> {
        let team_dir = record.team.file_stem();
        Placement {
            bucket: record.team.clone(),
            summary: PlayerSummary::from(record),
            record_path: PathBuf::from(PLAYERS_DIR)
                .join(team_dir)
                .join(format!("{}.json", record.file_stem())),
        }
    }

    fn bucket_path(&self, key: &TeamKey) -> PathBuf {
        PathBuf::from(DATA_DIR).join(format!("{}.json", key.file_stem()))
    }

    fn label(&self) -> &'static str {
        "players"
    }
}

/// Stage-1 classification of a `/player/{id}` response.
pub fn classify_profile(id: EntityId, resp: &ApiResponse) -> HarvestOutcome<PlayerRecord> {
    match resp.status {
        StatusCode::OK => {}
        StatusCode::NOT_FOUND => return HarvestOutcome::NotFound,
        other => {
            return HarvestOutcome::MissingTeamAssociation(AssociationGap::UnexpectedStatus(
                other.as_u16(),
            ))
        }
    }

    let payload: PlayerPayload = match resp.json() {
        Ok(p) => p,
        Err(e) => {
            return HarvestOutcome::MissingTeamAssociation(AssociationGap::MalformedPayload(
                e.to_string(),
            ))
        }
    };

    let status = PlayerStatus::from_api(payload.player_status.as_deref());
    if status == PlayerStatus::OutOfScope {
        return HarvestOutcome::SkippedOutOfScope;
    }

    let Some(team) = payload.team.as_ref().and_then(|t| {
        let short_name = t.short_name.clone().or_else(|| t.name.clone())?;
        Some(TeamKey { id: t.id?, short_name })
    }) else {
        return HarvestOutcome::MissingTeamAssociation(AssociationGap::NoTeam);
    };

    let Some(slug) = payload.slug.filter(|s| !s.trim().is_empty()) else {
        return HarvestOutcome::MissingTeamAssociation(AssociationGap::MalformedPayload(
            "missing slug".to_string(),
        ));
    };

    let weekly_scores = WeeklyScores::from_weeks(
        payload
            .player_stats
            .into_iter()
            .filter_map(|w| w.total_points.map(|p| (w.week_number, p))),
    );

    debug!(player_id = %id, team = %team, weeks = weekly_scores.reported(), "Profile classified");
    HarvestOutcome::Stored(PlayerRecord {
        id,
        slug,
        status,
        position: payload.position.or(payload.position_id),
        team,
        weekly_scores,
        current_value: payload.market_value,
        points: payload.points,
        average_points: payload.average_points,
    })
}

/// Reduce a market-value payload to day-granularity points. Entries without a
/// usable date or value are dropped.
pub fn parse_history(id: EntityId, raw: Vec<MarketValuePoint>) -> Vec<HistoryPoint> {
    let total = raw.len();
    let points: Vec<HistoryPoint> = raw
        .into_iter()
        .filter_map(|p| {
            let date = normalize_date(p.date.as_deref()?)?;
            let value = p.value.or(p.market_value)?;
            Some(HistoryPoint { date, value })
        })
        .collect();
    if points.len() < total {
        debug!(player_id = %id, dropped = total - points.len(), "Dropped unusable market-value entries");
    }
    points
}

// ---------------------------------------------------------------------------
// Roster mode: authenticated per-league manager teams
// ---------------------------------------------------------------------------

/// Harvest of every manager team listed in one league's ranking.
pub struct RosterTarget {
    api_url: String,
    league: TeamKey,
}

impl RosterTarget {
    pub fn new(api_url: impl Into<String>, league: TeamKey) -> Self {
        Self { api_url: api_url.into(), league }
    }
}

impl HarvestTarget for RosterTarget {
    type Record = ManagerRoster;
    type Summary = RosterSummary;

    async fn fetch(&self, client: &ApiClient, id: EntityId) -> Fetched<ManagerRoster> {
        let url = endpoints::league_team(&self.api_url, self.league.id, id);
        let outcome = match client.get(&url, CallStage::Roster).await {
            Ok(resp) => classify_roster(self.league.id, id, &resp),
            Err(e) => HarvestOutcome::TransientFailure(describe_transport_error(e)),
        };
        Fetched::outcome(outcome)
    }

    fn place(&self, record: &ManagerRoster) -> Placement<RosterSummary> {
        Placement {
            bucket: self.league.clone(),
            summary: RosterSummary::from(record),
            record_path: PathBuf::from(LEAGUES_DIR)
                .join(self.league.id.to_string())
                .join(format!("{}.json", record.file_stem())),
        }
    }

    fn bucket_path(&self, key: &TeamKey) -> PathBuf {
        PathBuf::from(LEAGUES_DIR).join(key.id.to_string()).join(RANKING_FILE)
    }

    fn label(&self) -> &'static str {
        "manager teams"
    }
}

/// Classification of a `/leagues/{league}/teams/{team}` response. A team with
/// no manager attached is the roster-mode analogue of a player without a club.
pub fn classify_roster(
    league_id: EntityId,
    team_id: EntityId,
    resp: &ApiResponse,
) -> HarvestOutcome<ManagerRoster> {
    match resp.status {
        StatusCode::OK => {}
        StatusCode::NOT_FOUND => return HarvestOutcome::NotFound,
        other => {
            return HarvestOutcome::MissingTeamAssociation(AssociationGap::UnexpectedStatus(
                other.as_u16(),
            ))
        }
    }

    let payload: ManagerRosterPayload = match resp.json() {
        Ok(p) => p,
        Err(e) => {
            return HarvestOutcome::MissingTeamAssociation(AssociationGap::MalformedPayload(
                e.to_string(),
            ))
        }
    };

    let Some((manager_id, manager_name)) = payload.manager.and_then(|m| {
        let id = m.id?;
        let name = m.manager_name.unwrap_or_else(|| format!("manager-{id}"));
        Some((id, name))
    }) else {
        return HarvestOutcome::MissingTeamAssociation(AssociationGap::NoTeam);
    };

    let players = payload
        .players
        .into_iter()
        .filter_map(|p| {
            let master = p.player_master?;
            Some(RosterPlayer {
                id: master.id,
                nickname: master.nickname,
                position: master.position_id,
                market_value: master.market_value,
                buyout_clause: p.buyout_clause,
            })
        })
        .collect();

    HarvestOutcome::Stored(ManagerRoster {
        league_id,
        team_id,
        manager_id,
        manager_name,
        team_value: payload.team_value,
        team_money: payload.team_money,
        players,
    })
}

pub fn describe_transport_error(e: reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection error: {e}")
    } else {
        e.to_string()
    }
}
