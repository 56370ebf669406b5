mod api;
mod config;
mod dispatcher;
mod error;
mod fetcher;
mod history;
mod report;
mod state;
mod storage;
mod types;

#[cfg(test)]
mod testing;

use std::fs::File;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::api::client::prompt_token;
use crate::api::endpoints;
use crate::api::models::{LeagueEntry, RankingEntry};
use crate::api::{ApiClient, BearerToken};
use crate::config::layout::{LEAGUES_DIR, MARKET_FILE};
use crate::config::{Cli, Config, Mode, LOG_FILE};
use crate::dispatcher::{Harvester, Shutdown};
use crate::error::Result;
use crate::fetcher::{CatalogTarget, RosterTarget};
use crate::report::{ReportMode, Reporter};
use crate::storage::OutputLayout;
use crate::types::{EntityId, RunSummary, TeamKey};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_cli(Cli::parse()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&cfg) {
        eprintln!("Cannot open {LOG_FILE}: {e}");
        std::process::exit(1);
    }

    let (stop_tx, shutdown) = Shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received: finishing in-flight requests, then flushing output");
            let _ = stop_tx.send(true);
        }
    });

    match run(cfg, shutdown).await {
        Ok(()) => {}
        Err(e) => {
            error!("Fatal error: {e}");
            eprintln!("Fatal error: {e}");
            std::process::exit(1);
        }
    }
}

/// `log.txt` is recreated on every run and always receives the full log; the
/// console only gets it in log mode.
fn init_tracing(cfg: &Config) -> std::io::Result<()> {
    let file = File::create(LOG_FILE)?;
    let file_layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
    let console_layer =
        (cfg.report_mode == ReportMode::Log).then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(EnvFilter::new(&cfg.log_level))
        .with(file_layer)
        .with(console_layer)
        .init();
    Ok(())
}

async fn run(cfg: Config, shutdown: Shutdown) -> Result<()> {
    let reporter = Arc::new(Reporter::new(cfg.report_mode));
    let layout = OutputLayout::new(cfg.output_dir.clone());

    let summary = match cfg.mode.clone() {
        Mode::Catalog { api_url, ids } => {
            run_catalog(&cfg, &api_url, ids, layout, Arc::clone(&reporter), shutdown).await?
        }
        Mode::Roster { api_url, token } => {
            let token = match token {
                Some(raw) => BearerToken::parse(&raw)?,
                None => prompt_token().await?,
            };
            run_roster(&cfg, &api_url, token, layout, Arc::clone(&reporter), shutdown).await?
        }
    };

    reporter.summary(&summary);
    Ok(())
}

async fn run_catalog(
    cfg: &Config,
    api_url: &str,
    ids: std::ops::Range<u64>,
    layout: OutputLayout,
    reporter: Arc<Reporter>,
    shutdown: Shutdown,
) -> Result<RunSummary> {
    info!("API endpoint {api_url}, players {}..{}, concurrency {}", ids.start, ids.end, cfg.concurrency);
    let baseline = layout.prepare_catalog().await?;
    let client = Arc::new(ApiClient::new(cfg.request_timeout, None)?);

    let harvester = Harvester::new(
        CatalogTarget::new(api_url),
        client,
        layout,
        reporter,
        cfg.concurrency,
        shutdown,
    );
    harvester.run(ids.map(EntityId).collect(), Some(baseline)).await
}

/// One harvest per league. The league listing is required; a league whose
/// ranking can't be read is logged and skipped.
async fn run_roster(
    cfg: &Config,
    api_url: &str,
    token: BearerToken,
    layout: OutputLayout,
    reporter: Arc<Reporter>,
    shutdown: Shutdown,
) -> Result<RunSummary> {
    layout.prepare_roster().await?;
    let client = Arc::new(ApiClient::new(cfg.request_timeout, Some(token))?);

    let leagues: Vec<LeagueEntry> = client.get_required(&endpoints::leagues(api_url)).await?;
    info!("Token belongs to {} leagues", leagues.len());

    let league_count = leagues.len();
    let mut total = RunSummary::default();
    for (idx, league) in leagues.into_iter().enumerate() {
        if shutdown.is_requested() {
            total.leagues_unvisited = league_count - idx;
            warn!("Stop requested: {} of {league_count} leagues not visited", total.leagues_unvisited);
            break;
        }
        let league_key = TeamKey {
            id: league.id,
            short_name: league.name.unwrap_or_else(|| format!("league-{}", league.id)),
        };
        let league_dir = std::path::PathBuf::from(LEAGUES_DIR).join(league.id.to_string());

        match client
            .get_required::<serde_json::Value>(&endpoints::league_market(api_url, league.id))
            .await
        {
            Ok(market) => {
                if let Err(e) = layout.write_json(&league_dir.join(MARKET_FILE), &market).await {
                    error!(league = %league_key, "Market write failed: {e}");
                }
            }
            Err(e) => warn!(league = %league_key, "Market listing unavailable: {e}"),
        }

        let ranking: Vec<RankingEntry> =
            match client.get_required(&endpoints::league_ranking(api_url, league.id)).await {
                Ok(r) => r,
                Err(e) => {
                    error!(league = %league_key, "Skipping league, ranking unavailable: {e}");
                    continue;
                }
            };
        let team_ids = ranking_team_ids(&ranking);

        info!(league = %league_key, teams = team_ids.len(), "Harvesting league rosters");
        let harvester = Harvester::new(
            RosterTarget::new(api_url, league_key),
            Arc::clone(&client),
            layout.clone(),
            Arc::clone(&reporter),
            cfg.concurrency,
            shutdown.clone(),
        );
        let summary = harvester.run(team_ids, None).await?;
        total.absorb(&summary);
    }
    Ok(total)
}

/// Team IDs in ranking order, each once.
fn ranking_team_ids(ranking: &[RankingEntry]) -> Vec<EntityId> {
    let mut seen = std::collections::HashSet::new();
    ranking
        .iter()
        .map(|entry| entry.team.id)
        .filter(|id| seen.insert(*id))
        .collect()
}
