//! URL templates. `base` never carries a trailing slash (see `Config`).

use crate::types::EntityId;

pub fn player(base: &str, id: EntityId) -> String {
    format!("{base}/player/{id}")
}

pub fn player_market_value(base: &str, id: EntityId) -> String {
    format!("{base}/player/{id}/market-value")
}

pub fn leagues(base: &str) -> String {
    format!("{base}/v4/leagues")
}

pub fn league_market(base: &str, league: EntityId) -> String {
    format!("{base}/v3/league/{league}/market")
}

pub fn league_ranking(base: &str, league: EntityId) -> String {
    format!("{base}/v4/leagues/{league}/ranking?x-lang=es")
}

pub fn league_team(base: &str, league: EntityId, team: EntityId) -> String {
    format!("{base}/v3/leagues/{league}/teams/{team}")
}
