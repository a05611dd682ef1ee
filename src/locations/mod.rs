//! Canonical location directory. Trip endpoints must resolve against this
//! set at creation time; bookings never re-validate them.

use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};

use crate::entities::location;
use crate::error::{AppError, AppResult};

const SUGGESTION_LIMIT: usize = 5;

/// Collapse whitespace and case so "  ulan   ude " matches "Ulan Ude".
pub fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Exact match after normalization, or None.
pub async fn canonicalize<C: ConnectionTrait>(
    conn: &C,
    input: &str,
) -> AppResult<Option<location::Model>> {
    let needle = normalize(input);
    if needle.is_empty() {
        return Ok(None);
    }
    let all = location::Entity::find().all(conn).await?;
    Ok(all.into_iter().find(|l| normalize(&l.name) == needle))
}

/// Ranked candidates for an unresolved input: prefix matches first, then
/// substring matches, capped at `limit`.
pub async fn suggest<C: ConnectionTrait>(
    conn: &C,
    input: &str,
    limit: usize,
) -> AppResult<Vec<String>> {
    let names: Vec<String> = location::Entity::find()
        .order_by_asc(location::Column::Name)
        .all(conn)
        .await?
        .into_iter()
        .map(|l| l.name)
        .collect();
    Ok(rank(&names, input, limit))
}

pub fn rank(names: &[String], input: &str, limit: usize) -> Vec<String> {
    let needle = normalize(input);
    if needle.is_empty() {
        return Vec::new();
    }

    let mut prefix = Vec::new();
    let mut substring = Vec::new();
    for name in names {
        let normalized = normalize(name);
        if normalized.starts_with(&needle) {
            prefix.push(name.clone());
        } else if normalized.contains(&needle) {
            substring.push(name.clone());
        }
    }

    prefix.extend(substring);
    prefix.truncate(limit);
    prefix
}

/// Resolve an endpoint or fail trip creation with a Validation error that
/// carries ranked suggestions.
pub async fn resolve<C: ConnectionTrait>(conn: &C, input: &str) -> AppResult<location::Model> {
    if let Some(found) = canonicalize(conn, input).await? {
        return Ok(found);
    }

    let hints = suggest(conn, input, SUGGESTION_LIMIT).await?;
    let message = if hints.is_empty() {
        format!("Unknown location: {}", input.trim())
    } else {
        format!(
            "Unknown location: {}. Did you mean: {}?",
            input.trim(),
            hints.join(", ")
        )
    };
    Err(AppError::Validation(message))
}

/// Insert any of `names` missing from the directory. Called once at
/// startup; the directory itself is owned by operations, not this service.
pub async fn seed(db: &DatabaseConnection, names: &[String]) -> AppResult<usize> {
    let existing: Vec<String> = location::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|l| normalize(&l.name))
        .collect();

    let mut inserted = 0;
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() || existing.contains(&normalize(trimmed)) {
            continue;
        }
        let row = location::ActiveModel {
            name: Set(trimmed.to_string()),
            ..Default::default()
        };
        row.insert(db).await?;
        inserted += 1;
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> Vec<String> {
        ["Riverton", "River Falls", "Eastriver", "Lakewood", "Lake City"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("  River   Falls "), "river falls");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn rank_prefers_prefix_over_substring() {
        let hits = rank(&directory(), "river", 10);
        assert_eq!(hits, vec!["Riverton", "River Falls", "Eastriver"]);
    }

    #[test]
    fn rank_respects_limit() {
        let hits = rank(&directory(), "lake", 1);
        assert_eq!(hits, vec!["Lakewood"]);
    }

    #[test]
    fn rank_returns_nothing_for_blank_input() {
        assert!(rank(&directory(), "   ", 5).is_empty());
    }
}
