mod modifiers;

use std::collections::BTreeMap;

use anyhow::{Context, anyhow, bail};
use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use self::modifiers::{apply_mods, parse_mods, parse_title_and_mods};
use crate::cli::Invocation;
use crate::config::Config;
use crate::manager::TaskManager;
use crate::remote::TaskRemote;
use crate::render::Renderer;
use crate::task::{SortOrder, StatusFilter};
use crate::validate::{TaskDraft, validate_edit, validate_new};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "list", "info", "add", "edit", "done", "delete", "search", "status", "sort", "move",
        "stats", "sync", "show", "help", "quit", "exit",
    ]
}

pub fn expand_command_abbrev<'a>(token: &str, known: &[&'a str]) -> Option<&'a str> {
    if let Some(exact) = known.iter().copied().find(|name| *name == token) {
        return Some(exact);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(manager, cfg, renderer, inv, today), fields(command = %inv.command))]
pub fn dispatch<R: TaskRemote>(
    manager: &mut TaskManager<R>,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
    today: NaiveDate,
) -> anyhow::Result<Flow> {
    debug!(args = ?inv.args, "dispatching command");
    let args = inv.args.as_slice();

    match inv.command.as_str() {
        "list" => cmd_list(manager, renderer, today),
        "info" => cmd_info(manager, renderer, args),
        "add" => cmd_add(manager, renderer, args, today),
        "edit" => cmd_edit(manager, renderer, args, today),
        "done" => cmd_done(manager, args),
        "delete" => cmd_delete(manager, args),
        "search" => {
            manager.set_search_query(args.join(" "));
            cmd_list(manager, renderer, today)
        }
        "status" => {
            let filter: StatusFilter = args.join(" ").parse()?;
            manager.set_status_filter(filter);
            cmd_list(manager, renderer, today)
        }
        "sort" => {
            let order: SortOrder = args.join(" ").parse()?;
            manager.set_sort_order(order);
            cmd_list(manager, renderer, today)
        }
        "move" => cmd_move(manager, renderer, args, today),
        "stats" => {
            renderer.print_stats(&manager.stats())?;
            Ok(Flow::Continue)
        }
        "sync" => cmd_sync(manager, renderer),
        "show" => cmd_show(cfg),
        "help" => cmd_help(),
        "quit" | "exit" => Ok(Flow::Quit),
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn parse_id(args: &[String], command: &str) -> anyhow::Result<u64> {
    let raw = args
        .first()
        .ok_or_else(|| anyhow!("{command} requires a task id"))?;
    raw.parse::<u64>()
        .with_context(|| format!("invalid task id: {raw}"))
}

fn parse_position(raw: &str) -> anyhow::Result<usize> {
    let pos: usize = raw
        .parse()
        .with_context(|| format!("invalid position: {raw}"))?;
    pos.checked_sub(1)
        .ok_or_else(|| anyhow!("positions start at 1"))
}

fn cmd_list<R: TaskRemote>(
    manager: &TaskManager<R>,
    renderer: &Renderer,
    today: NaiveDate,
) -> anyhow::Result<Flow> {
    renderer.print_task_table(manager.filtered_tasks(), today, |id| manager.is_unsynced(id))?;

    let mut footer = format!(
        "{} of {} tasks | status: {} | sort: {}",
        manager.filtered_tasks().len(),
        manager.tasks().len(),
        manager.status_filter(),
        manager.sort_order()
    );
    if !manager.search_query().is_empty() {
        footer.push_str(&format!(" | search: {:?}", manager.search_query()));
    }
    if manager.is_manually_ordered() {
        footer.push_str(" | manual order");
    }
    println!("{footer}");
    Ok(Flow::Continue)
}

fn cmd_info<R: TaskRemote>(
    manager: &TaskManager<R>,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<Flow> {
    let id = parse_id(args, "info")?;
    let task = manager
        .task(id)
        .ok_or_else(|| anyhow!("task {id} not found"))?;
    renderer.print_task_info(task, manager.is_unsynced(id))?;
    Ok(Flow::Continue)
}

#[instrument(skip(manager, renderer, args, today))]
fn cmd_add<R: TaskRemote>(
    manager: &mut TaskManager<R>,
    renderer: &Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<Flow> {
    info!("command add");

    let (title, mods) = parse_title_and_mods(args, today)?;
    let mut draft = TaskDraft {
        title,
        ..TaskDraft::default()
    };
    apply_mods(&mut draft, &mods);

    let errors = validate_new(&draft, today);
    if !errors.is_empty() {
        renderer.print_field_errors(&errors)?;
        bail!("task not created ({} invalid field(s))", errors.len());
    }

    let id = manager.allocate_id();
    manager.add_task(draft.into_task(id, today))?;
    println!("Created task {id}.");
    Ok(Flow::Continue)
}

#[instrument(skip(manager, renderer, args, today))]
fn cmd_edit<R: TaskRemote>(
    manager: &mut TaskManager<R>,
    renderer: &Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<Flow> {
    info!("command edit");

    let id = parse_id(args, "edit")?;
    let task = manager
        .task(id)
        .ok_or_else(|| anyhow!("task {id} not found"))?;
    if task.completed {
        bail!("task {id} is completed and can no longer be edited");
    }

    let mods = parse_mods(&args[1..], today)?;
    if mods.is_empty() {
        bail!("edit needs at least one of title: desc: status: due:");
    }
    let mut draft = TaskDraft::from(task);
    apply_mods(&mut draft, &mods);

    let errors = validate_edit(&draft);
    if !errors.is_empty() {
        renderer.print_field_errors(&errors)?;
        bail!("task {id} not modified ({} invalid field(s))", errors.len());
    }

    manager.update_task(id, &draft.into_patch());
    println!("Modified task {id}.");
    Ok(Flow::Continue)
}

fn cmd_done<R: TaskRemote>(manager: &mut TaskManager<R>, args: &[String]) -> anyhow::Result<Flow> {
    let id = parse_id(args, "done")?;
    if manager.mark_complete(id) {
        println!("Completed task {id}.");
    } else {
        println!("No task {id}.");
    }
    Ok(Flow::Continue)
}

fn cmd_delete<R: TaskRemote>(
    manager: &mut TaskManager<R>,
    args: &[String],
) -> anyhow::Result<Flow> {
    let id = parse_id(args, "delete")?;
    if manager.delete_task(id) {
        println!("Deleted task {id}.");
    } else {
        println!("No task {id}.");
    }
    Ok(Flow::Continue)
}

fn cmd_move<R: TaskRemote>(
    manager: &mut TaskManager<R>,
    renderer: &Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<Flow> {
    let [from, to] = args else {
        bail!("usage: move <from> <to>");
    };
    manager.move_filtered(parse_position(from)?, parse_position(to)?)?;
    cmd_list(manager, renderer, today)
}

fn cmd_sync<R: TaskRemote>(
    manager: &mut TaskManager<R>,
    renderer: &Renderer,
) -> anyhow::Result<Flow> {
    let events = manager.drain_events();
    renderer.print_events(&events)?;

    let unsynced: Vec<String> = manager.unsynced_ids().map(|id| id.to_string()).collect();
    if unsynced.is_empty() {
        println!("All tasks synced ({} remote call(s) in flight).", manager.pending_remote_calls());
    } else {
        println!("Unsynced tasks: {}", unsynced.join(", "));
    }
    Ok(Flow::Continue)
}

fn cmd_show(cfg: &Config) -> anyhow::Result<Flow> {
    let sorted: BTreeMap<&String, &String> = cfg.iter().collect();
    for (key, value) in sorted {
        println!("{key}={value}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(Flow::Continue)
}

fn cmd_help() -> anyhow::Result<Flow> {
    println!(
        "\
Commands (unique prefixes work):
  list                          show the filtered view
  info <id>                     show one task
  add <title> [desc:..] [due:..] [status:..]
  edit <id> [title:..] [desc:..] [due:..] [status:..]
  done <id>                     mark a task completed
  delete <id>                   remove a task
  search [text]                 filter by title (empty clears)
  status <All|Pending|In Progress|Completed>
  sort <asc|desc>               order by due date
  move <from> <to>              reorder the view (1-based positions)
  stats                         task counts by status
  sync                          remote call results and unsynced tasks
  show                          effective configuration
  quit                          leave the session

Due dates: YYYY-MM-DD, today, tomorrow, +3d, +2w, friday"
    );
    Ok(Flow::Continue)
}
