use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::sync::SyncEvent;
use crate::task::{Status, Task, TaskStats};
use crate::validate::FieldError;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all, fields(count = tasks.len()))]
    pub fn print_task_table<F>(
        &self,
        tasks: &[Task],
        today: NaiveDate,
        is_unsynced: F,
    ) -> anyhow::Result<()>
    where
        F: Fn(u64) -> bool,
    {
        let mut out = io::stdout().lock();
        self.write_task_table(&mut out, tasks, today, is_unsynced)
    }

    pub fn write_task_table<W, F>(
        &self,
        out: &mut W,
        tasks: &[Task],
        today: NaiveDate,
        is_unsynced: F,
    ) -> anyhow::Result<()>
    where
        W: Write,
        F: Fn(u64) -> bool,
    {
        if tasks.is_empty() {
            writeln!(out, "No tasks found")?;
            return Ok(());
        }

        let headers = vec![
            "#".to_string(),
            "ID".to_string(),
            "Status".to_string(),
            "Due".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for (pos, task) in tasks.iter().enumerate() {
            let marker = if is_unsynced(task.id) { "*" } else { "" };
            let id = self.paint(&format!("{}{marker}", task.id), "33");

            let status = match task.status {
                Status::Completed => self.paint(task.status.as_str(), "32"),
                Status::InProgress => self.paint(task.status.as_str(), "36"),
                Status::Pending => task.status.to_string(),
            };

            let due = task.due_date.format("%Y-%m-%d").to_string();
            let due = if task.is_overdue(today) {
                self.paint(&due, "31")
            } else {
                due
            };

            rows.push(vec![
                (pos + 1).to_string(),
                id,
                status,
                due,
                task.title.clone(),
            ]);
        }

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip_all, fields(id = task.id))]
    pub fn print_task_info(&self, task: &Task, unsynced: bool) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(out, "description {}", task.description)?;
        writeln!(out, "status      {}", task.status)?;
        writeln!(out, "due         {}", task.due_date.format("%Y-%m-%d"))?;
        writeln!(out, "completed   {}", task.completed)?;
        if let Some(user_id) = task.user_id {
            writeln!(out, "user        {user_id}")?;
        }
        if unsynced {
            writeln!(out, "sync        {}", self.paint("unsynced", "31"))?;
        }

        Ok(())
    }

    pub fn print_stats(&self, stats: &TaskStats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "Total        {}", stats.total_tasks)?;
        writeln!(out, "Completed    {}", stats.completed_tasks)?;
        writeln!(out, "In Progress  {}", stats.in_progress_tasks)?;
        writeln!(out, "Pending      {}", stats.pending_tasks)?;
        Ok(())
    }

    pub fn print_events(&self, events: &[SyncEvent]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for event in events {
            if event.is_failure() {
                writeln!(out, "{}", self.paint(&event.to_string(), "31"))?;
            } else {
                writeln!(out, "{event}")?;
            }
        }
        Ok(())
    }

    pub fn print_field_errors(&self, errors: &[FieldError]) -> anyhow::Result<()> {
        let mut out = io::stderr().lock();
        for err in errors {
            writeln!(out, "{}: {}", err.field, err.message)?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aligns_wide_titles_and_marks_unsynced() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).expect("date");
        let tasks = vec![
            Task::new(
                1,
                "書類を出す".to_string(),
                "Hand in the forms".to_string(),
                Status::Pending,
                NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"),
            ),
            Task::new(
                22,
                "Walk the dog".to_string(),
                "Around the block twice".to_string(),
                Status::Completed,
                NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"),
            ),
        ];

        let mut buf = Vec::new();
        Renderer::plain()
            .write_task_table(&mut buf, &tasks, today, |id| id == 22)
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("# ID  Status"));
        assert!(lines[3].contains("22*"));
        assert!(lines[2].contains("2026-02-01"));
    }

    #[test]
    fn empty_table_says_so() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).expect("date");
        let mut buf = Vec::new();
        Renderer::plain()
            .write_task_table(&mut buf, &[], today, |_| false)
            .expect("render");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "No tasks found\n");
    }

    #[test]
    fn strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[31m2026-01-01\x1b[0m"), "2026-01-01");
    }
}
