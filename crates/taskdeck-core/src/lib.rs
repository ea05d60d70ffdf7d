pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod enrich;
pub mod manager;
pub mod remote;
pub mod render;
pub mod session;
pub mod sync;
pub mod task;
pub mod validate;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use crate::enrich::{DEFAULT_HORIZON_DAYS, Enricher, SyntheticEnricher};
use crate::manager::{DEFAULT_FETCH_LIMIT, DEFAULT_USER_ID, ManagerOptions, TaskManager};
use crate::remote::{HttpRemote, MemoryRemote, TaskRemote};
use crate::session::Session;

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let split = cli::preprocess_args(&raw_args);
    let cli = cli::GlobalCli::parse_from(&split.argv);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        offline = cli.offline,
        "starting taskdeck"
    );
    debug!(overrides = ?split.overrides, "positional rc overrides");

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(
        split
            .overrides
            .into_iter()
            .chain(cli.rc_overrides.iter().cloned())
            .map(cli::RcOverride::into_pair),
    );
    if let Some(url) = &cli.api_url {
        cfg.apply_overrides([("api.url".to_string(), url.clone())]);
    }

    let options = ManagerOptions {
        fetch_limit: cfg
            .get_u64("fetch.limit")?
            .map_or(DEFAULT_FETCH_LIMIT, |n| n as usize),
        user_id: cfg.get_u64("remote.user_id")?.unwrap_or(DEFAULT_USER_ID),
    };
    let horizon = cfg
        .get_u64("enrich.horizon_days")?
        .unwrap_or(DEFAULT_HORIZON_DAYS);
    let enricher: Box<dyn Enricher> = match cli.seed {
        Some(seed) => Box::new(SyntheticEnricher::seeded(seed, horizon)),
        None => Box::new(SyntheticEnricher::from_entropy(horizon)),
    };

    let offline = cli.offline;
    let inv = if cli.rest.is_empty() {
        None
    } else {
        Some(cli::Invocation::from_os_args(cli.rest)?)
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        if offline {
            let remote = Arc::new(MemoryRemote::new(session::demo_todos()));
            drive(remote, enricher, options, cfg, inv).await
        } else {
            let url = cfg
                .get("api.url")
                .context("api.url is not configured")?;
            let timeout = cfg.get_u64("api.timeout")?.unwrap_or(30);
            let remote = Arc::new(
                HttpRemote::new(&url, Duration::from_secs(timeout))
                    .with_context(|| format!("failed to set up remote at {url}"))?,
            );
            drive(remote, enricher, options, cfg, inv).await
        }
    })?;

    info!("done");
    Ok(())
}

async fn drive<R: TaskRemote>(
    remote: Arc<R>,
    enricher: Box<dyn Enricher>,
    options: ManagerOptions,
    cfg: config::Config,
    inv: Option<cli::Invocation>,
) -> anyhow::Result<()> {
    let renderer = render::Renderer::new(&cfg)?;
    let tz = datetime::resolve_timezone(&cfg);
    let mut session = Session {
        manager: TaskManager::new(remote, enricher, options),
        cfg,
        renderer,
        tz,
    };

    session.start().await?;
    match inv {
        Some(inv) => session.run_once(inv).await,
        None => session.run_interactive().await,
    }
}
