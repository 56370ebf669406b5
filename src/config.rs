use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::error::{AppError, Result};
use crate::report::ReportMode;

pub const CATALOG_API_URL: &str = "https://api.laligafantasymarca.com/api/v3";
pub const LEAGUE_API_URL: &str = "https://api-fantasy.llt-services.com/api";

/// Lowest player ID the catalog serves; everything below is reserved.
pub const FIRST_PLAYER_ID: u64 = 52;

/// Default exclusive upper bound of the catalog ID range.
pub const DEFAULT_MAX_PLAYER_ID: u64 = 1595;

/// How far past the default the operator may push the upper bound.
pub const MAX_PLAYER_ID_HEADROOM: u64 = 1000;

/// Weeks in a league season; length of every weekly score sequence.
pub const SEASON_WEEKS: usize = 38;

/// Per-request timeout (seconds). A timed-out call is never retried within a run.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Channel capacity for the record writer.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Log file recreated on every run, regardless of reporting mode.
pub const LOG_FILE: &str = "log.txt";

/// Client-identification headers sent with every request.
pub mod client_headers {
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";
    pub const ORIGIN: &str = "https://fantasy.laliga.com";
    pub const REFERER: &str = "https://fantasy.laliga.com/";
    pub const X_APP: &str = "Fantasy-web";
    pub const X_LANG: &str = "es";
}

/// Output tree, relative to the configured output root.
pub mod layout {
    pub const PLAYERS_DIR: &str = "players";
    pub const DATA_DIR: &str = "data";
    pub const LEAGUES_DIR: &str = "leagues";
    pub const HISTORY_FILE: &str = "market_value_history.json";
    pub const MARKET_FILE: &str = "market.json";
    pub const RANKING_FILE: &str = "ranking.json";
}

#[derive(Debug, Parser)]
#[command(name = "harvester")]
#[command(about = "Harvests fantasy league players and rosters into per-team JSON files")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Maximum number of entities fetched in parallel (defaults to host parallelism)
    #[arg(long, global = true, env = "HARVEST_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Stream the log to the console instead of drawing a progress bar
    #[arg(long, global = true, env = "CONSOLE_LOG")]
    pub console_log: bool,

    /// Root directory for players/, data/ and leagues/
    #[arg(long, global = true, env = "OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, env = "REQUEST_TIMEOUT_SECS", default_value_t = REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Harvest the public player catalog over a numeric ID range
    Catalog {
        /// Exclusive upper bound of the player ID range
        #[arg(long, env = "MAX_PLAYER_ID", default_value_t = DEFAULT_MAX_PLAYER_ID)]
        max_player_id: u64,

        #[arg(long, env = "CATALOG_API_URL", default_value = CATALOG_API_URL)]
        api_url: String,
    },
    /// Harvest every manager roster of the leagues the token belongs to
    Roster {
        /// Bearer token; prompted for interactively when absent
        #[arg(long, env = "FANTASY_BEARER", hide_env_values = true)]
        token: Option<String>,

        #[arg(long, env = "LEAGUE_API_URL", default_value = LEAGUE_API_URL)]
        api_url: String,
    },
}

#[derive(Debug, Clone)]
pub enum Mode {
    Catalog { api_url: String, ids: Range<u64> },
    Roster { api_url: String, token: Option<String> },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub concurrency: usize,
    pub report_mode: ReportMode,
    pub output_dir: PathBuf,
    pub log_level: String,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let concurrency = match cli.concurrency {
            Some(0) => {
                return Err(AppError::Config("--concurrency must be at least 1".to_string()));
            }
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        };

        if cli.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "REQUEST_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        let mode = match cli.command {
            Command::Catalog { max_player_id, api_url } => Mode::Catalog {
                ids: FIRST_PLAYER_ID..validate_max_player_id(max_player_id)?,
                api_url: trim_base(api_url),
            },
            Command::Roster { token, api_url } => Mode::Roster {
                token,
                api_url: trim_base(api_url),
            },
        };

        Ok(Self {
            mode,
            concurrency,
            report_mode: if cli.console_log { ReportMode::Log } else { ReportMode::Progress },
            output_dir: cli.output_dir,
            log_level: cli.log_level,
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
        })
    }
}

/// The catalog keeps growing past the default bound during a season, but never by
/// more than the headroom.
pub fn validate_max_player_id(value: u64) -> Result<u64> {
    let upper = DEFAULT_MAX_PLAYER_ID + MAX_PLAYER_ID_HEADROOM;
    if (DEFAULT_MAX_PLAYER_ID..=upper).contains(&value) {
        Ok(value)
    } else {
        Err(AppError::Config(format!(
            "{value} is not a valid player count (expected {DEFAULT_MAX_PLAYER_ID}..={upper})"
        )))
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config> {
        let cli = Cli::try_parse_from(args).map_err(|e| AppError::Config(e.to_string()))?;
        Config::from_cli(cli)
    }

    #[test]
    fn max_player_id_bounds() {
        assert!(validate_max_player_id(DEFAULT_MAX_PLAYER_ID).is_ok());
        assert!(validate_max_player_id(DEFAULT_MAX_PLAYER_ID + MAX_PLAYER_ID_HEADROOM).is_ok());
        assert!(validate_max_player_id(DEFAULT_MAX_PLAYER_ID - 1).is_err());
        assert!(validate_max_player_id(DEFAULT_MAX_PLAYER_ID + MAX_PLAYER_ID_HEADROOM + 1).is_err());
    }

    #[test]
    fn catalog_defaults() {
        let cfg = parse(&["harvester", "catalog", "--concurrency", "8"]).unwrap();
        assert_eq!(cfg.concurrency, 8);
        assert_eq!(cfg.report_mode, ReportMode::Progress);
        match cfg.mode {
            Mode::Catalog { ids, api_url } => {
                assert_eq!(ids, FIRST_PLAYER_ID..DEFAULT_MAX_PLAYER_ID);
                assert_eq!(api_url, CATALOG_API_URL);
            }
            other => panic!("expected catalog mode, got {other:?}"),
        }
    }

    #[test]
    fn console_log_selects_log_mode() {
        let cfg = parse(&["harvester", "--console-log", "catalog", "--concurrency", "2"]).unwrap();
        assert_eq!(cfg.report_mode, ReportMode::Log);
    }

    #[test]
    fn zero_concurrency_rejected() {
        assert!(parse(&["harvester", "catalog", "--concurrency", "0"]).is_err());
    }

    #[test]
    fn roster_trims_trailing_slash() {
        let cfg = parse(&[
            "harvester",
            "roster",
            "--api-url",
            "http://localhost:9000/api/",
            "--token",
            "abc",
            "--concurrency",
            "1",
        ])
        .unwrap();
        match cfg.mode {
            Mode::Roster { api_url, token } => {
                assert_eq!(api_url, "http://localhost:9000/api");
                assert_eq!(token.as_deref(), Some("abc"));
            }
            other => panic!("expected roster mode, got {other:?}"),
        }
    }
}
