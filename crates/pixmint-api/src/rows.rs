//! Conversions from DB rows to the shared models.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use pixmint_db::models::{ImageRow, UserRow};
use pixmint_types::models::{GeneratedImage, User};

pub fn user_from_row(row: UserRow) -> User {
    User {
        id: parse_id(&row.id, "user"),
        tokens: row.tokens,
        created_at: parse_timestamp(&row.created_at, &row.id),
    }
}

pub fn image_from_row(row: ImageRow) -> GeneratedImage {
    GeneratedImage {
        id: parse_id(&row.id, "image"),
        user_id: parse_id(&row.user_id, "image owner"),
        created_at: parse_timestamp(&row.created_at, &row.id),
        prompt: row.prompt,
        image_url: row.image_url,
    }
}

fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::default()
    })
}

fn parse_timestamp(raw: &str, owner: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on '{}': {}", raw, owner, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn sqlite_timestamps_parse_as_utc() {
        let ts = parse_timestamp("2026-10-16 08:30:05", "row");
        assert_eq!((ts.year(), ts.month(), ts.day()), (2026, 10, 16));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (8, 30, 5));
    }

    #[test]
    fn corrupt_values_fall_back_to_defaults() {
        let user = user_from_row(UserRow {
            id: "not-a-uuid".into(),
            tokens: 2,
            created_at: "yesterday".into(),
        });
        assert_eq!(user.id, Uuid::default());
        assert_eq!(user.created_at, DateTime::<Utc>::default());
        assert_eq!(user.tokens, 2);
    }
}
