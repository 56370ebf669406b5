use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;

use crate::api::latency::StageLatency;
use crate::config::SEASON_WEEKS;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Numeric catalog ID. The remote API is inconsistent about quoting IDs, so it
/// deserializes from either a JSON number or a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl serde::de::Visitor<'_> for IdVisitor {
            type Value = EntityId;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a non-negative integer or numeric string")
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<EntityId, E> {
                Ok(EntityId(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<EntityId, E> {
                u64::try_from(v)
                    .map(EntityId)
                    .map_err(|_| E::custom(format!("negative id {v}")))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<EntityId, E> {
                v.trim()
                    .parse()
                    .map(EntityId)
                    .map_err(|_| E::custom(format!("invalid id {v:?}")))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// Bucket key for aggregation: `(teamId, teamShortName)`. Also names the
/// per-team directory and aggregate file (`{id}_{short_name}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamKey {
    pub id: EntityId,
    pub short_name: String,
}

impl TeamKey {
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.id, sanitize_file_component(&self.short_name))
    }
}

impl std::fmt::Display for TeamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.id, self.short_name)
    }
}

/// Path separators and NULs never reach the filesystem from API-provided names.
pub fn sanitize_file_component(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Player record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Active,
    OutOfScope,
    Unknown,
}

impl PlayerStatus {
    /// Maps the API's `playerStatus` string. Only `out_of_league` removes a player
    /// from scope; anything unrecognised is kept but flagged unknown.
    pub fn from_api(raw: Option<&str>) -> Self {
        match raw {
            Some("out_of_league") => PlayerStatus::OutOfScope,
            Some("ok") | Some("doubtful") | Some("injured") | Some("suspended") => {
                PlayerStatus::Active
            }
            _ => PlayerStatus::Unknown,
        }
    }
}

impl std::fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlayerStatus::Active => "active",
            PlayerStatus::OutOfScope => "out_of_scope",
            PlayerStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Fixed-length per-week scores. `None` is a week with no reported score, which is
/// not the same thing as a week scored zero. Serializes as an array with `null`s;
/// scores keep the API's number form, so integer points stay integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklyScores(Vec<Option<Number>>);

impl WeeklyScores {
    pub fn empty() -> Self {
        Self(vec![None; SEASON_WEEKS])
    }

    /// Build from `(weekNumber, points)` pairs; week numbers are 1-based.
    /// Weeks outside the season are dropped.
    pub fn from_weeks<I>(weeks: I) -> Self
    where
        I: IntoIterator<Item = (u32, Number)>,
    {
        let mut scores = Self::empty();
        for (week, points) in weeks {
            let Some(idx) = (week as usize).checked_sub(1) else { continue };
            if let Some(slot) = scores.0.get_mut(idx) {
                *slot = Some(points);
            }
        }
        scores
    }

    #[cfg(test)]
    pub fn get(&self, idx: usize) -> Option<&Number> {
        self.0.get(idx).and_then(Option::as_ref)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn reported(&self) -> usize {
        self.0.iter().filter(|s| s.is_some()).count()
    }
}

/// Player position as the catalog reports it: a numeric code on most endpoints,
/// a name on some.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Position {
    Code(u32),
    Name(String),
}

/// One harvested player, reduced to the fields the harvester persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: EntityId,
    pub slug: String,
    pub status: PlayerStatus,
    pub position: Option<Position>,
    pub team: TeamKey,
    pub weekly_scores: WeeklyScores,
    pub current_value: Option<i64>,
    pub points: Option<Number>,
    pub average_points: Option<Number>,
}

impl PlayerRecord {
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.id, sanitize_file_component(&self.slug))
    }
}

/// Row of a team aggregate file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub id: EntityId,
    pub status: PlayerStatus,
    pub slug: String,
    pub position: Option<Position>,
    pub market_value: Option<i64>,
    pub player_stats: WeeklyScores,
    pub points: Option<Number>,
    pub average_points: Option<Number>,
}

impl From<&PlayerRecord> for PlayerSummary {
    fn from(r: &PlayerRecord) -> Self {
        Self {
            id: r.id,
            status: r.status,
            slug: r.slug.clone(),
            position: r.position.clone(),
            market_value: r.current_value,
            player_stats: r.weekly_scores.clone(),
            points: r.points.clone(),
            average_points: r.average_points.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Manager roster (authenticated league mode)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterPlayer {
    pub id: EntityId,
    pub nickname: Option<String>,
    pub position: Option<Position>,
    pub market_value: Option<i64>,
    pub buyout_clause: Option<i64>,
}

/// One manager's team within a league.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerRoster {
    pub league_id: EntityId,
    pub team_id: EntityId,
    pub manager_id: EntityId,
    pub manager_name: String,
    pub team_value: Option<i64>,
    pub team_money: Option<i64>,
    pub players: Vec<RosterPlayer>,
}

impl ManagerRoster {
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.manager_id, sanitize_file_component(&self.manager_name))
    }
}

/// Row of a league's `ranking.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSummary {
    pub team_id: EntityId,
    pub manager_id: EntityId,
    pub manager_name: String,
    pub team_value: Option<i64>,
    pub team_money: Option<i64>,
    pub player_count: usize,
}

impl From<&ManagerRoster> for RosterSummary {
    fn from(r: &ManagerRoster) -> Self {
        Self {
            team_id: r.team_id,
            manager_id: r.manager_id,
            manager_name: r.manager_name.clone(),
            team_value: r.team_value,
            team_money: r.team_money,
            player_count: r.players.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an entity that exists could not be tied to an active team. All variants
/// count as `MissingAssociation`; the reason is kept for the log.
#[derive(Debug, Clone, PartialEq)]
pub enum AssociationGap {
    /// 200 with no `team` object (e.g. a relegated club not yet purged).
    NoTeam,
    /// Neither 200 nor 404.
    UnexpectedStatus(u16),
    /// 200 with a body that does not match the expected shape.
    MalformedPayload(String),
}

impl std::fmt::Display for AssociationGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssociationGap::NoTeam => write!(f, "no team"),
            AssociationGap::UnexpectedStatus(code) => write!(f, "unexpected status {code}"),
            AssociationGap::MalformedPayload(e) => write!(f, "malformed payload: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HarvestOutcome<R> {
    Stored(R),
    SkippedOutOfScope,
    NotFound,
    MissingTeamAssociation(AssociationGap),
    TransientFailure(String),
}

impl<R> HarvestOutcome<R> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            HarvestOutcome::Stored(_) => OutcomeKind::Stored,
            HarvestOutcome::SkippedOutOfScope => OutcomeKind::Skipped,
            HarvestOutcome::NotFound => OutcomeKind::NotFound,
            HarvestOutcome::MissingTeamAssociation(_) => OutcomeKind::MissingAssociation,
            HarvestOutcome::TransientFailure(_) => OutcomeKind::Failed,
        }
    }
}

/// Terminal state of one dispatched ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Stored,
    Skipped,
    NotFound,
    MissingAssociation,
    Failed,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutcomeKind::Stored => "stored",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::NotFound => "not_found",
            OutcomeKind::MissingAssociation => "missing_association",
            OutcomeKind::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub stored: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub missing_association: usize,
    pub failed: usize,
    /// IDs never submitted because the run was cancelled.
    pub not_dispatched: usize,
    pub records_written: usize,
    pub record_write_failures: usize,
    pub teams_written: usize,
    /// Dates newly added to the history baseline this run.
    pub history_points_added: usize,
    pub peak_in_flight: usize,
    /// Roster mode: leagues never started because the run was cancelled.
    pub leagues_unvisited: usize,
    /// Request latency per call stage, stages without calls omitted.
    pub latency: Vec<StageLatency>,
}

impl RunSummary {
    pub fn record(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Stored => self.stored += 1,
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::NotFound => self.not_found += 1,
            OutcomeKind::MissingAssociation => self.missing_association += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
    }

    pub fn classified(&self) -> usize {
        self.stored + self.skipped + self.not_found + self.missing_association + self.failed
    }

    /// Fold a per-league summary into a run-wide one.
    pub fn absorb(&mut self, other: &RunSummary) {
        self.stored += other.stored;
        self.skipped += other.skipped;
        self.not_found += other.not_found;
        self.missing_association += other.missing_association;
        self.failed += other.failed;
        self.not_dispatched += other.not_dispatched;
        self.records_written += other.records_written;
        self.record_write_failures += other.record_write_failures;
        self.teams_written += other.teams_written;
        self.history_points_added += other.history_points_added;
        self.peak_in_flight = self.peak_in_flight.max(other.peak_in_flight);
        self.leagues_unvisited += other.leagues_unvisited;
        // Latency comes from the shared client, so the newest snapshot covers all.
        self.latency = other.latency.clone();
    }
}

// ---------------------------------------------------------------------------
// Lenient numeric fields
// ---------------------------------------------------------------------------

/// Accepts `123`, `123.0` or `"123"`; `null` and unparseable strings become `None`.
pub fn de_opt_i64_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(v.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// Accepts `6`, `1.5`, `"6"` or `"1.5"` and keeps integers integral; `null` and
/// unparseable strings become `None`.
pub fn de_opt_number_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Number>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(v.and_then(|v| match v {
        serde_json::Value::Number(n) => Some(n),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Number::from)
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(Number::from_f64))
        }
        _ => None,
    }))
}
