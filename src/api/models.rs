//! Wire types for the catalog and league APIs. Only the fields the harvester
//! uses are modeled; every field that the API is known to omit is optional and
//! checked once, at classification time.

use serde::{Deserialize, Deserializer};
use serde_json::Number;

use crate::types::{de_opt_i64_lenient, de_opt_number_lenient, EntityId, Position};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPayload {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub player_status: Option<String>,
    #[serde(default, deserialize_with = "de_opt_position")]
    pub position: Option<Position>,
    #[serde(default, deserialize_with = "de_opt_position")]
    pub position_id: Option<Position>,
    #[serde(default)]
    pub team: Option<TeamRef>,
    #[serde(default)]
    pub player_stats: Vec<WeekStat>,
    #[serde(default, deserialize_with = "de_opt_i64_lenient")]
    pub market_value: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_number_lenient")]
    pub points: Option<Number>,
    #[serde(default, deserialize_with = "de_opt_number_lenient")]
    pub average_points: Option<Number>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRef {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekStat {
    pub week_number: u32,
    #[serde(default, deserialize_with = "de_opt_number_lenient")]
    pub total_points: Option<Number>,
}

/// One entry of `/player/{id}/market-value`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketValuePoint {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64_lenient")]
    pub value: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64_lenient")]
    pub market_value: Option<i64>,
}

// ---------------------------------------------------------------------------
// League API (authenticated)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LeagueEntry {
    pub id: EntityId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RankingEntry {
    pub team: RankingTeam,
}

#[derive(Debug, Deserialize)]
pub struct RankingTeam {
    pub id: EntityId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerRef {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub manager_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerRosterPayload {
    #[serde(default)]
    pub manager: Option<ManagerRef>,
    #[serde(default)]
    pub players: Vec<RosterPlayerPayload>,
    #[serde(default, deserialize_with = "de_opt_i64_lenient")]
    pub team_value: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64_lenient")]
    pub team_money: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterPlayerPayload {
    #[serde(default)]
    pub player_master: Option<RosterPlayerMaster>,
    #[serde(default, deserialize_with = "de_opt_i64_lenient")]
    pub buyout_clause: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterPlayerMaster {
    pub id: EntityId,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default, deserialize_with = "de_opt_position")]
    pub position_id: Option<Position>,
    #[serde(default, deserialize_with = "de_opt_i64_lenient")]
    pub market_value: Option<i64>,
}

/// Position arrives as a number, a numeric string or a name. Anything else is
/// treated as absent rather than failing the whole payload.
fn de_opt_position<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Position>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(v.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_u64().map(|n| Position::Code(n as u32)),
        serde_json::Value::String(s) => match s.trim().parse::<u32>() {
            Ok(code) => Some(Position::Code(code)),
            Err(_) if !s.trim().is_empty() => Some(Position::Name(s)),
            Err(_) => None,
        },
        _ => None,
    }))
}
