use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use chrono::NaiveDate;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::enrich::Enricher;
use crate::remote::TaskRemote;
use crate::sync::{SyncEvent, SyncOp};
use crate::task::{
    RemoteTodoPayload, SortOrder, Status, StatusFilter, Task, TaskPatch, TaskStats,
};

/// First id handed out for locally created tasks. Remote ids stay below it.
pub const LOCAL_ID_BASE: u64 = 1_000_000_000;
pub const DEFAULT_FETCH_LIMIT: usize = 20;
pub const DEFAULT_USER_ID: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    pub fetch_limit: usize,
    pub user_id: u64,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            fetch_limit: DEFAULT_FETCH_LIMIT,
            user_id: DEFAULT_USER_ID,
        }
    }
}

/// Owns the session's task collection and the derived filtered view.
///
/// Mutations apply locally and return immediately. Any paired remote call
/// runs on the tokio runtime and reports back through [`SyncEvent`]s that
/// the owner collects with [`TaskManager::drain_events`].
pub struct TaskManager<R: TaskRemote> {
    remote: Arc<R>,
    enricher: Box<dyn Enricher>,
    options: ManagerOptions,

    tasks: Vec<Task>,
    filtered: Vec<Task>,
    manual_order: bool,
    loading: bool,

    search_query: String,
    status_filter: StatusFilter,
    sort_order: SortOrder,

    next_local_id: u64,
    unsynced: BTreeSet<u64>,
    // Remote calls are numbered in dispatch order; per task, the highest
    // number whose outcome has been applied.
    next_call_seq: u64,
    settled_seq: HashMap<u64, u64>,
    last_fetch_error: Option<String>,

    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
    in_flight: JoinSet<()>,
    revision: watch::Sender<u64>,
}

impl<R: TaskRemote> TaskManager<R> {
    pub fn new(remote: Arc<R>, enricher: Box<dyn Enricher>, options: ManagerOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (revision, _) = watch::channel(0);
        Self {
            remote,
            enricher,
            options,
            tasks: vec![],
            filtered: vec![],
            manual_order: false,
            loading: true,
            search_query: String::new(),
            status_filter: StatusFilter::All,
            sort_order: SortOrder::Asc,
            next_local_id: LOCAL_ID_BASE,
            unsynced: BTreeSet::new(),
            next_call_seq: 1,
            settled_seq: HashMap::new(),
            last_fetch_error: None,
            events_tx,
            events_rx,
            in_flight: JoinSet::new(),
            revision,
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn filtered_tasks(&self) -> &[Task] {
        &self.filtered
    }

    pub fn task(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn status_filter(&self) -> StatusFilter {
        self.status_filter
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn is_manually_ordered(&self) -> bool {
        self.manual_order
    }

    pub fn last_fetch_error(&self) -> Option<&str> {
        self.last_fetch_error.as_deref()
    }

    /// Counts are taken from the full collection on every call.
    pub fn stats(&self) -> TaskStats {
        TaskStats::from_tasks(&self.tasks)
    }

    pub fn is_unsynced(&self, id: u64) -> bool {
        self.unsynced.contains(&id)
    }

    pub fn unsynced_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.unsynced.iter().copied()
    }

    /// Receives a new revision number after every observable state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn pending_remote_calls(&self) -> usize {
        self.in_flight.len()
    }

    #[instrument(skip(self, today))]
    pub async fn initialize(&mut self, today: NaiveDate) {
        self.loading = true;
        self.bump();

        match self.remote.fetch_todos().await {
            Ok(raw) => {
                let total = raw.len();
                let limit = self.options.fetch_limit;
                let enricher = &mut self.enricher;
                self.tasks = raw
                    .into_iter()
                    .take(limit)
                    .map(|todo| enricher.enrich(todo, today))
                    .collect();
                self.last_fetch_error = None;
                info!(fetched = total, kept = self.tasks.len(), "loaded remote tasks");
            }
            Err(err) => {
                let error = format!("{err:#}");
                warn!(error = %error, "failed to fetch tasks; continuing with local collection");
                self.last_fetch_error = Some(error.clone());
                let _ = self.events_tx.send(SyncEvent::FetchFailed { error });
            }
        }

        self.loading = false;
        self.refresh_view();
    }

    /// Next id from the local namespace, above every id seen so far.
    pub fn allocate_id(&mut self) -> u64 {
        let above_existing = self
            .tasks
            .iter()
            .map(|t| t.id)
            .max()
            .map_or(0, |max| max.saturating_add(1));
        let id = self.next_local_id.max(above_existing);
        self.next_local_id = id.saturating_add(1);
        id
    }

    /// Prepends `task` and dispatches the remote create.
    ///
    /// Errors only when `task.id` is already in the collection; use
    /// [`allocate_id`](Self::allocate_id) to get a free one.
    #[instrument(skip(self, task), fields(id = task.id))]
    pub fn add_task(&mut self, mut task: Task) -> anyhow::Result<()> {
        if self.task(task.id).is_some() {
            bail!("task id {} is already in use", task.id);
        }
        task.completed = task.status.is_completed();

        let payload = RemoteTodoPayload {
            title: task.title.clone(),
            completed: false,
            user_id: self.options.user_id,
        };
        let id = task.id;
        self.tasks.insert(0, task);
        debug!(count = self.tasks.len(), "task added");

        self.spawn_remote(id, SyncOp::Create, payload);
        self.refresh_view();
        Ok(())
    }

    /// Returns false when no task has `id`.
    #[instrument(skip(self, patch))]
    pub fn update_task(&mut self, id: u64, patch: &TaskPatch) -> bool {
        let user_id = self.options.user_id;
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!("update for unknown task ignored");
            return false;
        };

        patch.apply_to(task);
        let payload = RemoteTodoPayload {
            title: task.title.clone(),
            completed: patch.remote_completed(),
            user_id,
        };

        self.spawn_remote(id, SyncOp::Update, payload);
        self.refresh_view();
        true
    }

    #[instrument(skip(self))]
    pub fn mark_complete(&mut self, id: u64) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!("mark complete for unknown task ignored");
            return false;
        };
        task.set_status(Status::Completed);
        self.refresh_view();
        true
    }

    #[instrument(skip(self))]
    pub fn delete_task(&mut self, id: u64) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        if self.tasks.len() == before {
            debug!("delete for unknown task ignored");
            return false;
        }
        self.unsynced.remove(&id);
        self.settled_seq.remove(&id);
        self.refresh_view();
        true
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
        self.refresh_view();
    }

    pub fn set_status_filter(&mut self, filter: StatusFilter) {
        self.status_filter = filter;
        self.refresh_view();
    }

    pub fn set_sort_order(&mut self, order: SortOrder) {
        self.sort_order = order;
        self.refresh_view();
    }

    /// Replaces the filtered view's order with `order`, which must be a
    /// permutation of the ids currently in the view. The master collection
    /// is reordered to match: the slots those tasks occupy are refilled in
    /// the new order and every other task stays where it was.
    ///
    /// The manual order holds until the next filter change or mutation.
    #[instrument(skip(self, order), fields(len = order.len()))]
    pub fn reorder_filtered(&mut self, order: &[u64]) -> anyhow::Result<()> {
        let current: HashSet<u64> = self.filtered.iter().map(|t| t.id).collect();
        let wanted: HashSet<u64> = order.iter().copied().collect();
        if order.len() != self.filtered.len() || wanted.len() != order.len() || wanted != current {
            bail!("reorder must list each task in the current view exactly once");
        }

        let mut by_id: HashMap<u64, Task> =
            self.filtered.drain(..).map(|t| (t.id, t)).collect();
        for id in order {
            let task = by_id
                .remove(id)
                .ok_or_else(|| anyhow!("task {id} missing from view"))?;
            self.filtered.push(task);
        }

        let slots: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| wanted.contains(&t.id))
            .map(|(idx, _)| idx)
            .collect();
        let mut moved: HashMap<u64, Task> = slots
            .iter()
            .map(|&idx| (self.tasks[idx].id, self.tasks[idx].clone()))
            .collect();
        for (slot, id) in slots.iter().zip(order) {
            if let Some(task) = moved.remove(id) {
                self.tasks[*slot] = task;
            }
        }

        self.manual_order = true;
        self.bump();
        Ok(())
    }

    /// Drag-and-drop form of [`reorder_filtered`](Self::reorder_filtered):
    /// moves the task at position `from` of the view to position `to`.
    pub fn move_filtered(&mut self, from: usize, to: usize) -> anyhow::Result<()> {
        let len = self.filtered.len();
        if from >= len || to >= len {
            bail!("position out of range (view has {len} tasks)");
        }
        let mut ids: Vec<u64> = self.filtered.iter().map(|t| t.id).collect();
        let moved = ids.remove(from);
        ids.insert(to, moved);
        self.reorder_filtered(&ids)
    }

    /// Collects finished remote outcomes. A failure marks the task unsynced
    /// and a success clears the mark, but only when the outcome belongs to
    /// the newest call settled so far for that task. Older outcomes that
    /// arrive late are returned without touching the mark.
    ///
    /// Outcomes never write into the collection itself.
    pub fn drain_events(&mut self) -> Vec<SyncEvent> {
        while let Some(joined) = self.in_flight.try_join_next() {
            if let Err(err) = joined {
                warn!(error = %err, "remote call task did not complete");
            }
        }

        let mut events = Vec::new();
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            match &event {
                SyncEvent::Synced { id, op, seq } => {
                    if self.record_outcome(*id, *seq) {
                        debug!(id, %op, seq, "remote call succeeded");
                        changed |= self.unsynced.remove(id);
                    } else {
                        debug!(id, %op, seq, "superseded remote success ignored");
                    }
                }
                SyncEvent::Failed { id, op, seq, error } => {
                    warn!(id, %op, seq, error = %error, "remote call failed");
                    if self.record_outcome(*id, *seq) {
                        changed |= self.unsynced.insert(*id);
                    }
                }
                SyncEvent::FetchFailed { error } => {
                    debug!(error = %error, "reporting fetch failure");
                }
            }
            events.push(event);
        }

        if changed {
            self.bump();
        }
        events
    }

    /// Waits up to `limit` for outstanding remote calls, then drains events.
    pub async fn settle(&mut self, limit: Duration) -> Vec<SyncEvent> {
        let in_flight = &mut self.in_flight;
        let waited = tokio::time::timeout(limit, async {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(err) = joined {
                    warn!(error = %err, "remote call task did not complete");
                }
            }
        })
        .await;

        if waited.is_err() {
            warn!(
                outstanding = self.in_flight.len(),
                "timed out waiting for remote calls"
            );
        }
        self.drain_events()
    }

    /// Returns false when `seq` is older than an outcome already applied for
    /// `id`, or when the task no longer exists.
    fn record_outcome(&mut self, id: u64, seq: u64) -> bool {
        if self.task(id).is_none() {
            return false;
        }
        let latest = self.settled_seq.entry(id).or_insert(0);
        if seq < *latest {
            return false;
        }
        *latest = seq;
        true
    }

    fn spawn_remote(&mut self, id: u64, op: SyncOp, payload: RemoteTodoPayload) {
        let seq = self.next_call_seq;
        self.next_call_seq += 1;

        let Ok(handle) = Handle::try_current() else {
            warn!(id, %op, "no async runtime; remote call skipped");
            let _ = self.events_tx.send(SyncEvent::Failed {
                id,
                op,
                seq,
                error: "no async runtime available".to_string(),
            });
            return;
        };

        let remote = Arc::clone(&self.remote);
        let tx = self.events_tx.clone();
        let job = async move {
            let result = match op {
                SyncOp::Create => remote.create_todo(&payload).await,
                SyncOp::Update => remote.update_todo(id, &payload).await,
            };
            let event = match result {
                Ok(()) => SyncEvent::Synced { id, op, seq },
                Err(err) => SyncEvent::Failed {
                    id,
                    op,
                    seq,
                    error: format!("{err:#}"),
                },
            };
            let _ = tx.send(event);
        };
        self.in_flight.spawn_on(job, &handle);
        debug!(id, %op, seq, "remote call dispatched");
    }

    fn refresh_view(&mut self) {
        self.filtered = filter_and_sort(
            &self.tasks,
            &self.search_query,
            self.status_filter,
            self.sort_order,
        );
        self.manual_order = false;
        self.bump();
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}

/// Derives the filtered view: case-insensitive title substring match, then
/// status filter, then a stable sort by due date. Equal dates keep
/// collection order.
pub fn filter_and_sort(
    tasks: &[Task],
    query: &str,
    status: StatusFilter,
    order: SortOrder,
) -> Vec<Task> {
    let needle = query.to_lowercase();
    let mut out: Vec<Task> = tasks
        .iter()
        .filter(|t| needle.is_empty() || t.title.to_lowercase().contains(&needle))
        .filter(|t| status.admits(t.status))
        .cloned()
        .collect();

    match order {
        SortOrder::Asc => out.sort_by(|a, b| a.due_date.cmp(&b.due_date)),
        SortOrder::Desc => out.sort_by(|a, b| b.due_date.cmp(&a.due_date)),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::SyntheticEnricher;
    use crate::remote::{MemoryRemote, RemoteCall};
    use crate::task::RawTodo;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn task(id: u64, title: &str, status: Status, due: NaiveDate) -> Task {
        Task::new(
            id,
            title.to_string(),
            format!("Details about {title}"),
            status,
            due,
        )
    }

    fn manager(todos: Vec<RawTodo>) -> TaskManager<MemoryRemote> {
        TaskManager::new(
            Arc::new(MemoryRemote::new(todos)),
            Box::new(SyntheticEnricher::seeded(1, 30)),
            ManagerOptions::default(),
        )
    }

    fn raw(id: u64, title: &str, completed: bool) -> RawTodo {
        RawTodo {
            id,
            user_id: Some(1),
            title: title.to_string(),
            completed,
        }
    }

    #[test]
    fn filter_matches_title_case_insensitively() {
        let tasks = vec![
            task(1, "Buy groceries", Status::Pending, date(2025, 1, 1)),
            task(2, "Walk the dog", Status::Pending, date(2025, 1, 2)),
        ];
        let view = filter_and_sort(&tasks, "GROCERIES", StatusFilter::All, SortOrder::Asc);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, 1);
    }

    #[test]
    fn sort_is_stable_for_equal_dates() {
        let same = date(2025, 3, 3);
        let tasks = vec![
            task(3, "c", Status::Pending, same),
            task(1, "a", Status::Pending, date(2025, 1, 1)),
            task(2, "b", Status::Pending, same),
        ];
        let asc = filter_and_sort(&tasks, "", StatusFilter::All, SortOrder::Asc);
        assert_eq!(asc.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 3, 2]);
        let desc = filter_and_sort(&tasks, "", StatusFilter::All, SortOrder::Desc);
        assert_eq!(desc.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn initialize_caps_and_enriches() {
        let todos = (1..=25).map(|id| raw(id, &format!("todo {id}"), id % 5 == 0)).collect();
        let mut mgr = manager(todos);
        assert!(mgr.loading());

        mgr.initialize(date(2026, 2, 17)).await;

        assert!(!mgr.loading());
        assert_eq!(mgr.tasks().len(), DEFAULT_FETCH_LIMIT);
        assert_eq!(mgr.filtered_tasks().len(), DEFAULT_FETCH_LIMIT);
        for t in mgr.tasks() {
            assert_eq!(t.completed, t.status == Status::Completed);
            assert_eq!(t.completed, t.id % 5 == 0);
        }
    }

    #[tokio::test]
    async fn initialize_failure_leaves_empty_collection_and_reports() {
        let mut mgr = manager(vec![raw(1, "never seen", false)]);
        mgr.remote().set_fail_fetch(true);

        mgr.initialize(date(2026, 2, 17)).await;

        assert!(!mgr.loading());
        assert!(mgr.tasks().is_empty());
        assert!(mgr.last_fetch_error().is_some());
        let events = mgr.drain_events();
        assert!(matches!(events.as_slice(), [SyncEvent::FetchFailed { .. }]));
    }

    #[tokio::test]
    async fn add_prepends_and_posts_create() {
        let mut mgr = manager(vec![raw(1, "existing", false)]);
        mgr.initialize(date(2026, 2, 17)).await;

        let id = mgr.allocate_id();
        mgr.add_task(task(id, "New Task", Status::Pending, date(2026, 3, 1)))
            .expect("add");
        assert_eq!(mgr.tasks()[0].id, id);

        let events = mgr.settle(Duration::from_secs(1)).await;
        assert_eq!(
            events,
            vec![SyncEvent::Synced {
                id,
                op: SyncOp::Create,
                seq: 1
            }]
        );
        assert_eq!(
            mgr.remote().calls(),
            vec![RemoteCall::Create(RemoteTodoPayload {
                title: "New Task".to_string(),
                completed: false,
                user_id: 1,
            })]
        );
    }

    #[tokio::test]
    async fn add_rejects_duplicate_id() {
        let mut mgr = manager(vec![raw(1, "existing", false)]);
        mgr.initialize(date(2026, 2, 17)).await;
        assert!(
            mgr.add_task(task(1, "clash", Status::Pending, date(2026, 3, 1)))
                .is_err()
        );
        assert_eq!(mgr.tasks().len(), 1);
    }

    #[tokio::test]
    async fn allocated_ids_stay_above_remote_ids() {
        let mut mgr = manager(vec![raw(7, "remote", false)]);
        mgr.initialize(date(2026, 2, 17)).await;
        let first = mgr.allocate_id();
        let second = mgr.allocate_id();
        assert_eq!(first, LOCAL_ID_BASE);
        assert_eq!(second, LOCAL_ID_BASE + 1);
    }

    #[tokio::test]
    async fn failed_write_marks_task_unsynced_until_success() {
        let mut mgr = manager(vec![raw(1, "existing", false)]);
        mgr.initialize(date(2026, 2, 17)).await;

        mgr.remote().set_fail_writes(true);
        let patch = TaskPatch {
            title: Some("renamed".to_string()),
            ..TaskPatch::default()
        };
        assert!(mgr.update_task(1, &patch));
        assert_eq!(mgr.task(1).map(|t| t.title.as_str()), Some("renamed"));

        let events = mgr.settle(Duration::from_secs(1)).await;
        assert!(matches!(events.as_slice(), [SyncEvent::Failed { id: 1, op: SyncOp::Update, .. }]));
        assert!(mgr.is_unsynced(1));

        mgr.remote().set_fail_writes(false);
        assert!(mgr.update_task(1, &patch));
        mgr.settle(Duration::from_secs(1)).await;
        assert!(!mgr.is_unsynced(1));
    }

    #[tokio::test]
    async fn update_unknown_id_is_silent() {
        let mut mgr = manager(vec![raw(1, "existing", false)]);
        mgr.initialize(date(2026, 2, 17)).await;
        let before = mgr.tasks().to_vec();

        assert!(!mgr.update_task(42, &TaskPatch::default()));
        assert_eq!(mgr.tasks(), before.as_slice());
        assert_eq!(mgr.pending_remote_calls(), 0);
        assert!(mgr.remote().calls().is_empty());
    }

    #[tokio::test]
    async fn reorder_rewrites_view_and_master_slots() {
        let mut mgr = manager(vec![]);
        mgr.initialize(date(2026, 2, 17)).await;
        for (id, title, status, day) in [
            (1, "one", Status::Completed, 4),
            (2, "two", Status::Pending, 3),
            (3, "three", Status::Completed, 2),
            (4, "four", Status::Pending, 1),
        ] {
            mgr.add_task(task(id, title, status, date(2026, 3, day))).expect("add");
        }
        // Collection is newest first: 4, 3, 2, 1.
        mgr.set_status_filter(StatusFilter::Only(Status::Completed));
        assert_eq!(mgr.filtered_tasks().iter().map(|t| t.id).collect::<Vec<_>>(), vec![3, 1]);

        mgr.move_filtered(1, 0).expect("move");
        assert!(mgr.is_manually_ordered());
        assert_eq!(mgr.filtered_tasks().iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(mgr.tasks().iter().map(|t| t.id).collect::<Vec<_>>(), vec![4, 1, 2, 3]);

        mgr.set_sort_order(SortOrder::Asc);
        assert!(!mgr.is_manually_ordered());
        assert_eq!(mgr.filtered_tasks().iter().map(|t| t.id).collect::<Vec<_>>(), vec![3, 1]);
    }

    #[tokio::test]
    async fn reorder_rejects_non_permutation() {
        let mut mgr = manager(vec![raw(1, "a", false), raw(2, "b", false)]);
        mgr.initialize(date(2026, 2, 17)).await;
        assert!(mgr.reorder_filtered(&[1]).is_err());
        assert!(mgr.reorder_filtered(&[1, 1]).is_err());
        assert!(mgr.reorder_filtered(&[1, 3]).is_err());
        assert!(mgr.move_filtered(0, 5).is_err());
        assert!(!mgr.is_manually_ordered());
    }

    #[tokio::test]
    async fn subscribers_see_revision_bumps() {
        let mut mgr = manager(vec![]);
        let rx = mgr.subscribe();
        let start = *rx.borrow();
        mgr.set_search_query("x");
        assert!(*rx.borrow() > start);
    }

    #[test]
    fn mutation_without_runtime_reports_failure() {
        let mut mgr = manager(vec![]);
        mgr.add_task(task(5, "offline", Status::Pending, date(2026, 3, 1)))
            .expect("add");
        let events = mgr.drain_events();
        assert!(matches!(events.as_slice(), [SyncEvent::Failed { id: 5, op: SyncOp::Create, .. }]));
        assert!(mgr.is_unsynced(5));
    }
}
