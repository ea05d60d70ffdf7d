use std::io::{IsTerminal, Write};
use std::time::Duration;

use anyhow::Context;
use chrono_tz::Tz;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::cli::Invocation;
use crate::commands::{self, Flow};
use crate::config::Config;
use crate::datetime::today_in;
use crate::manager::TaskManager;
use crate::remote::TaskRemote;
use crate::render::Renderer;
use crate::task::{RawTodo, SortOrder, StatusFilter};

const SETTLE_LIMIT: Duration = Duration::from_secs(5);

/// Seed records for `--offline` sessions.
pub fn demo_todos() -> Vec<RawTodo> {
    [
        ("Buy groceries", false),
        ("Walk the dog", false),
        ("Renew passport", false),
        ("File expense report", true),
        ("Book dentist appointment", false),
        ("Water the plants", true),
    ]
    .into_iter()
    .enumerate()
    .map(|(idx, (title, completed))| RawTodo {
        id: idx as u64 + 1,
        user_id: Some(1),
        title: title.to_string(),
        completed,
    })
    .collect()
}

pub struct Session<R: TaskRemote> {
    pub manager: TaskManager<R>,
    pub cfg: Config,
    pub renderer: Renderer,
    pub tz: Tz,
}

impl<R: TaskRemote> Session<R> {
    /// Loads the collection and applies the configured default view.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.manager.initialize(today_in(self.tz)).await;

        if let Some(raw) = self.cfg.get("default.sort") {
            let order: SortOrder = raw.parse().context("invalid default.sort")?;
            self.manager.set_sort_order(order);
        }
        if let Some(raw) = self.cfg.get("default.status") {
            let filter: StatusFilter = raw.parse().context("invalid default.status")?;
            self.manager.set_status_filter(filter);
        }

        let events = self.manager.drain_events();
        self.renderer.print_events(&events)?;
        info!(tasks = self.manager.tasks().len(), "session ready");
        Ok(())
    }

    pub fn execute(&mut self, inv: Invocation) -> anyhow::Result<Flow> {
        commands::dispatch(
            &mut self.manager,
            &self.cfg,
            &self.renderer,
            inv,
            today_in(self.tz),
        )
    }

    /// Runs one command, then waits for its remote calls to finish.
    pub async fn run_once(&mut self, inv: Invocation) -> anyhow::Result<()> {
        self.execute(inv)?;
        let events = self.manager.settle(SETTLE_LIMIT).await;
        let failures: Vec<_> = events.into_iter().filter(|e| e.is_failure()).collect();
        self.renderer.print_events(&failures)?;
        Ok(())
    }

    /// Reads commands from stdin until `quit` or end of input.
    pub async fn run_interactive(&mut self) -> anyhow::Result<()> {
        let interactive = std::io::stdin().is_terminal();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            if interactive {
                print!("taskdeck> ");
                std::io::stdout().flush().context("failed to flush prompt")?;
            }

            let Some(line) = lines.next_line().await.context("failed reading stdin")? else {
                debug!("end of input");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let flow = Invocation::from_line(line).and_then(|inv| self.execute(inv));
            let failures: Vec<_> = self
                .manager
                .drain_events()
                .into_iter()
                .filter(|e| e.is_failure())
                .collect();
            self.renderer.print_events(&failures)?;

            match flow {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(err) => eprintln!("error: {err:#}"),
            }
        }

        let events = self.manager.settle(SETTLE_LIMIT).await;
        let failures: Vec<_> = events.into_iter().filter(|e| e.is_failure()).collect();
        if !failures.is_empty() {
            warn!(count = failures.len(), "session ended with failed remote calls");
        }
        self.renderer.print_events(&failures)?;
        Ok(())
    }
}
