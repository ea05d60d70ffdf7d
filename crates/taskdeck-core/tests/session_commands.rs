use std::sync::Arc;
use std::time::Duration;

use taskdeck_core::cli::Invocation;
use taskdeck_core::commands::Flow;
use taskdeck_core::config::Config;
use taskdeck_core::enrich::SyntheticEnricher;
use taskdeck_core::manager::{LOCAL_ID_BASE, ManagerOptions, TaskManager};
use taskdeck_core::remote::MemoryRemote;
use taskdeck_core::render::Renderer;
use taskdeck_core::session::{Session, demo_todos};
use taskdeck_core::task::{SortOrder, Status, StatusFilter};

async fn started(overrides: &[(&str, &str)]) -> Session<MemoryRemote> {
    let mut cfg = Config::default();
    cfg.apply_overrides(
        overrides
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
    );
    let mut session = Session {
        manager: TaskManager::new(
            Arc::new(MemoryRemote::new(demo_todos())),
            Box::new(SyntheticEnricher::seeded(5, 30)),
            ManagerOptions::default(),
        ),
        cfg,
        renderer: Renderer::plain(),
        tz: chrono_tz::UTC,
    };
    session.start().await.expect("start session");
    session
}

fn run(session: &mut Session<MemoryRemote>, line: &str) -> anyhow::Result<Flow> {
    session.execute(Invocation::from_line(line)?)
}

#[tokio::test]
async fn start_applies_configured_view_defaults() {
    let session = started(&[("default.sort", "desc"), ("default.status", "completed")]).await;
    assert_eq!(session.manager.sort_order(), SortOrder::Desc);
    assert_eq!(
        session.manager.status_filter(),
        StatusFilter::Only(Status::Completed)
    );
    assert_eq!(session.manager.tasks().len(), demo_todos().len());
}

#[tokio::test]
async fn invalid_default_is_an_error() {
    let mut cfg = Config::default();
    cfg.apply_overrides([("default.sort".to_string(), "sideways".to_string())]);
    let mut session = Session {
        manager: TaskManager::new(
            Arc::new(MemoryRemote::new(vec![])),
            Box::new(SyntheticEnricher::seeded(5, 30)),
            ManagerOptions::default(),
        ),
        cfg,
        renderer: Renderer::plain(),
        tz: chrono_tz::UTC,
    };
    assert!(session.start().await.is_err());
}

#[tokio::test]
async fn add_validates_then_creates_with_local_id() {
    let mut session = started(&[]).await;

    assert!(run(&mut session, "add ab desc:short due:yesterday").is_err());
    assert_eq!(session.manager.tasks().len(), demo_todos().len());

    run(
        &mut session,
        r#"add Buy milk desc:"Two litres, semi-skimmed" due:+1d status:"In Progress""#,
    )
    .expect("add");
    let first = &session.manager.tasks()[0];
    assert_eq!(first.id, LOCAL_ID_BASE);
    assert_eq!(first.title, "Buy milk");
    assert_eq!(first.status, Status::InProgress);
    assert!(!first.completed);

    let events = session.manager.settle(Duration::from_secs(1)).await;
    assert_eq!(events.len(), 1);
    assert!(!events[0].is_failure());
}

#[tokio::test]
async fn completed_tasks_refuse_edits() {
    let mut session = started(&[]).await;
    // Demo record 4 is completed.
    assert!(run(&mut session, "edit 4 title:Renamed").is_err());

    let open_id = session
        .manager
        .tasks()
        .iter()
        .find(|t| !t.completed)
        .map(|t| t.id)
        .expect("an open task");
    run(&mut session, &format!("edit {open_id} title:\"Walk the cat\"")).expect("edit");
    assert_eq!(
        session.manager.task(open_id).map(|t| t.title.as_str()),
        Some("Walk the cat")
    );
}

#[tokio::test]
async fn view_commands_drive_the_manager() {
    let mut session = started(&[]).await;

    run(&mut session, "search dog").expect("search");
    assert_eq!(session.manager.filtered_tasks().len(), 1);
    run(&mut session, "search").expect("clear search");
    assert_eq!(session.manager.search_query(), "");

    run(&mut session, "status completed").expect("status");
    assert_eq!(session.manager.filtered_tasks().len(), 2);
    run(&mut session, "move 2 1").expect("move");
    assert!(session.manager.is_manually_ordered());

    run(&mut session, "done 1").expect("done");
    assert_eq!(session.manager.task(1).map(|t| t.status), Some(Status::Completed));
    run(&mut session, "delete 1").expect("delete");
    assert!(session.manager.task(1).is_none());

    assert!(run(&mut session, "sort sideways").is_err());
    assert!(run(&mut session, "move 1").is_err());
    assert_eq!(run(&mut session, "quit").expect("quit"), Flow::Quit);
}
