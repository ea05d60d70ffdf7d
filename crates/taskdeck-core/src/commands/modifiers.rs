use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::{instrument, warn};

use crate::datetime::parse_due_date;
use crate::task::Status;
use crate::validate::TaskDraft;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mod {
    Title(String),
    Description(String),
    Status(Status),
    Due(NaiveDate),
}

/// Splits `add` arguments into title words and `key:value` modifiers.
/// Everything after `--` is title text.
#[instrument(skip(args, today))]
pub(crate) fn parse_title_and_mods(
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<(String, Vec<Mod>)> {
    let mut title_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, today)? {
            mods.push(one_mod);
            continue;
        }

        title_parts.push(arg.clone());
    }

    Ok((title_parts.join(" "), mods))
}

#[instrument(skip(args, today))]
pub(crate) fn parse_mods(args: &[String], today: NaiveDate) -> anyhow::Result<Vec<Mod>> {
    let mut mods = Vec::new();
    for arg in args {
        if let Some(one_mod) = parse_one_mod(arg, today)? {
            mods.push(one_mod);
        } else {
            warn!(arg = %arg, "unrecognized modifier token ignored");
        }
    }
    Ok(mods)
}

fn parse_one_mod(tok: &str, today: NaiveDate) -> anyhow::Result<Option<Mod>> {
    let Some((key, value)) = tok.split_once(':').or_else(|| tok.split_once('=')) else {
        return Ok(None);
    };

    match key.to_ascii_lowercase().as_str() {
        "title" => Ok(Some(Mod::Title(value.to_string()))),
        "desc" | "description" => Ok(Some(Mod::Description(value.to_string()))),
        "status" => {
            let status = value
                .parse::<Status>()
                .map_err(|_| anyhow!("invalid status: {value} (Pending, In Progress, Completed)"))?;
            Ok(Some(Mod::Status(status)))
        }
        "due" => Ok(Some(Mod::Due(parse_due_date(value, today)?))),
        _ => Ok(None),
    }
}

pub(crate) fn apply_mods(draft: &mut TaskDraft, mods: &[Mod]) {
    for one_mod in mods {
        match one_mod {
            Mod::Title(title) => draft.title = title.clone(),
            Mod::Description(description) => draft.description = description.clone(),
            Mod::Status(status) => draft.status = *status,
            Mod::Due(date) => draft.due_date = Some(*date),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn splits_title_words_from_modifiers() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).expect("date");
        let (title, mods) = parse_title_and_mods(
            &args(&["Buy", "groceries", "due:tomorrow", "status:in-progress"]),
            today,
        )
        .expect("parse");
        assert_eq!(title, "Buy groceries");
        assert_eq!(
            mods,
            vec![
                Mod::Due(NaiveDate::from_ymd_opt(2026, 2, 18).expect("date")),
                Mod::Status(Status::InProgress),
            ]
        );
    }

    #[test]
    fn double_dash_keeps_colons_in_title() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).expect("date");
        let (title, mods) =
            parse_title_and_mods(&args(&["--", "Note:", "call", "mom"]), today).expect("parse");
        assert_eq!(title, "Note: call mom");
        assert!(mods.is_empty());
    }

    #[test]
    fn bad_values_are_errors() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).expect("date");
        assert!(parse_mods(&args(&["status:archived"]), today).is_err());
        assert!(parse_mods(&args(&["due:someday"]), today).is_err());
    }

    #[test]
    fn unknown_keys_pass_through() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).expect("date");
        let (title, mods) =
            parse_title_and_mods(&args(&["Read", "chapter:3"]), today).expect("parse");
        assert_eq!(title, "Read chapter:3");
        assert!(mods.is_empty());
    }

    #[test]
    fn modifiers_fill_draft() {
        let mut draft = TaskDraft::default();
        apply_mods(
            &mut draft,
            &[
                Mod::Title("Walk the dog".to_string()),
                Mod::Description("Around the block twice".to_string()),
                Mod::Status(Status::Completed),
            ],
        );
        assert_eq!(draft.title, "Walk the dog");
        assert_eq!(draft.status, Status::Completed);
        assert!(draft.due_date.is_none());
    }
}
