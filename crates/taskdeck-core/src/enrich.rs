//! Derives display fields for remote records that lack them.
//!
//! The remote listing carries only `id`, `userId`, `title` and
//! `completed`. [`SyntheticEnricher`] fills the rest with placeholder data;
//! swap in another [`Enricher`] once the server provides real fields.

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::task::{RawTodo, Status, Task};

pub const DEFAULT_HORIZON_DAYS: u64 = 30;

pub trait Enricher: Send {
    fn enrich(&mut self, raw: RawTodo, today: NaiveDate) -> Task;
}

pub fn placeholder_description(title: &str) -> String {
    format!("This is a detailed description for task: {title}")
}

#[derive(Debug, Clone)]
pub struct SyntheticEnricher<R = StdRng> {
    rng: R,
    horizon_days: u64,
}

impl SyntheticEnricher<StdRng> {
    pub fn from_entropy(horizon_days: u64) -> Self {
        Self::new(StdRng::from_os_rng(), horizon_days)
    }

    pub fn seeded(seed: u64, horizon_days: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed), horizon_days)
    }
}

impl<R: Rng> SyntheticEnricher<R> {
    pub fn new(rng: R, horizon_days: u64) -> Self {
        Self { rng, horizon_days }
    }
}

impl<R: Rng + Send> Enricher for SyntheticEnricher<R> {
    fn enrich(&mut self, raw: RawTodo, today: NaiveDate) -> Task {
        let status = if raw.completed {
            Status::Completed
        } else if self.rng.random_bool(0.5) {
            Status::InProgress
        } else {
            Status::Pending
        };

        let offset = self.rng.random_range(0..=self.horizon_days);
        let due_date = today.checked_add_days(Days::new(offset)).unwrap_or(today);

        let mut task = Task::new(
            raw.id,
            raw.title.clone(),
            placeholder_description(&raw.title),
            status,
            due_date,
        );
        task.user_id = raw.user_id;
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: u64, completed: bool) -> RawTodo {
        RawTodo {
            id,
            user_id: Some(1),
            title: format!("todo {id}"),
            completed,
        }
    }

    #[test]
    fn completed_records_stay_completed() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).expect("date");
        let mut enricher = SyntheticEnricher::seeded(7, DEFAULT_HORIZON_DAYS);
        let task = enricher.enrich(raw(1, true), today);
        assert_eq!(task.status, Status::Completed);
        assert!(task.completed);
        assert_eq!(task.description, "This is a detailed description for task: todo 1");
        assert_eq!(task.user_id, Some(1));
    }

    #[test]
    fn open_records_get_open_status_and_due_within_horizon() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).expect("date");
        let horizon = today
            .checked_add_days(Days::new(DEFAULT_HORIZON_DAYS))
            .expect("horizon");
        let mut enricher = SyntheticEnricher::seeded(42, DEFAULT_HORIZON_DAYS);

        let mut seen = std::collections::HashSet::new();
        for id in 0..200 {
            let task = enricher.enrich(raw(id, false), today);
            assert_ne!(task.status, Status::Completed);
            assert!(!task.completed);
            assert!(task.due_date >= today && task.due_date <= horizon);
            seen.insert(task.status);
        }
        assert!(seen.contains(&Status::Pending));
        assert!(seen.contains(&Status::InProgress));
    }

    #[test]
    fn same_seed_gives_same_tasks() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).expect("date");
        let mut a = SyntheticEnricher::seeded(9, 10);
        let mut b = SyntheticEnricher::seeded(9, 10);
        for id in 0..10 {
            assert_eq!(a.enrich(raw(id, false), today), b.enrich(raw(id, false), today));
        }
    }
}
