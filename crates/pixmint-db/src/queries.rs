use crate::Database;
use crate::models::{ImageRow, UserRow};
use anyhow::{Result, bail};
use rusqlite::Connection;
use tracing::debug;

/// Result of the debit-and-record transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// One token was taken and the image row written.
    Committed { remaining_tokens: i64 },
    /// The user is missing or holds no tokens. Nothing was written.
    Insufficient,
}

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str) -> Result<UserRow> {
        let tokens = self.starting_tokens();
        self.with_conn_mut(|conn| {
            let row = conn.query_row(
                "INSERT INTO users (id, tokens) VALUES (?1, ?2) RETURNING id, tokens, created_at",
                rusqlite::params![id, tokens],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        tokens: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )?;
            Ok(row)
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    /// Add `amount` to the balance. `None` means no such user.
    ///
    /// A negative amount that would overdraw trips the `tokens >= 0` check and errors.
    /// So does a sum outside `i64`: SQLite would otherwise store it as a REAL.
    pub fn credit_tokens(&self, id: &str, amount: i64) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let current: Option<i64> = tx
                .query_row("SELECT tokens FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            let Some(current) = current else {
                return Ok(None);
            };

            let Some(tokens) = current.checked_add(amount) else {
                bail!("Credit of {} overflows balance of user {}", amount, id);
            };

            tx.execute(
                "UPDATE users SET tokens = ?2 WHERE id = ?1",
                rusqlite::params![id, tokens],
            )?;
            tx.commit()?;
            Ok(Some(tokens))
        })
    }

    // -- Images --

    /// Take one token from `user_id` and record the image, in one transaction.
    ///
    /// The balance is re-checked by the guarded UPDATE, so two requests racing
    /// on a one-token balance cannot both commit.
    pub fn debit_and_record(
        &self,
        image_id: &str,
        user_id: &str,
        prompt: &str,
        image_url: &str,
    ) -> Result<DebitOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let remaining: Option<i64> = tx
                .query_row(
                    "UPDATE users SET tokens = tokens - 1 WHERE id = ?1 AND tokens >= 1 RETURNING tokens",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(remaining_tokens) = remaining else {
                debug!("Debit refused for user {}", user_id);
                // Dropping the transaction rolls it back
                return Ok(DebitOutcome::Insufficient);
            };

            tx.execute(
                "INSERT INTO generated_images (id, user_id, prompt, image_url) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![image_id, user_id, prompt, image_url],
            )?;

            tx.commit()?;
            Ok(DebitOutcome::Committed { remaining_tokens })
        })
    }

    pub fn list_images(&self, user_id: &str, limit: u32) -> Result<Vec<ImageRow>> {
        self.with_conn(|conn| query_images(conn, user_id, limit))
    }

    pub fn count_images(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM generated_images WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn query_user(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, tokens, created_at FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                tokens: row.get(1)?,
                created_at: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_images(conn: &Connection, user_id: &str, limit: u32) -> Result<Vec<ImageRow>> {
    // rowid breaks ties between images created within the same second
    let mut stmt = conn.prepare(
        "SELECT id, user_id, prompt, image_url, created_at
         FROM generated_images
         WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![user_id, limit], |row| {
            Ok(ImageRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                prompt: row.get(2)?,
                image_url: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn db() -> Database {
        Database::open_in_memory(3).unwrap()
    }

    #[test]
    fn create_user_uses_starting_balance() {
        let db = db();
        let id = new_id();

        let user = db.create_user(&id).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.tokens, 3);

        let fetched = db.get_user(&id).unwrap().unwrap();
        assert_eq!(fetched.tokens, 3);
    }

    #[test]
    fn get_unknown_user_is_none() {
        let db = db();
        assert!(db.get_user("nobody").unwrap().is_none());
    }

    #[test]
    fn credit_applies_exactly_once() {
        let db = db();
        let id = new_id();
        db.create_user(&id).unwrap();

        assert_eq!(db.credit_tokens(&id, 1).unwrap(), Some(4));
        assert_eq!(db.get_user(&id).unwrap().unwrap().tokens, 4);
    }

    #[test]
    fn credit_unknown_user_creates_nothing() {
        let db = db();
        assert_eq!(db.credit_tokens("nobody", 1).unwrap(), None);
        assert!(db.get_user("nobody").unwrap().is_none());
    }

    #[test]
    fn overdrawing_credit_fails_and_keeps_balance() {
        let db = db();
        let id = new_id();
        db.create_user(&id).unwrap();

        assert!(db.credit_tokens(&id, -4).is_err());
        assert_eq!(db.get_user(&id).unwrap().unwrap().tokens, 3);
    }

    #[test]
    fn overflowing_credit_fails_and_row_stays_readable() {
        let db = db();
        let id = new_id();
        db.create_user(&id).unwrap();

        assert!(db.credit_tokens(&id, i64::MAX).is_err());
        assert_eq!(db.get_user(&id).unwrap().unwrap().tokens, 3);

        // The ledger still accepts ordinary credits afterwards
        assert_eq!(db.credit_tokens(&id, -1).unwrap(), Some(2));
        assert_eq!(db.credit_tokens(&id, i64::MAX - 2).unwrap(), Some(i64::MAX));
    }

    #[test]
    fn debit_and_record_until_empty() {
        let db = db();
        let user = new_id();
        db.create_user(&user).unwrap();

        for expected in [2, 1, 0] {
            let outcome = db
                .debit_and_record(&new_id(), &user, "a fox", "https://img/fox.png")
                .unwrap();
            assert_eq!(outcome, DebitOutcome::Committed { remaining_tokens: expected });
        }

        let outcome = db
            .debit_and_record(&new_id(), &user, "a fox", "https://img/fox.png")
            .unwrap();
        assert_eq!(outcome, DebitOutcome::Insufficient);
        assert_eq!(db.get_user(&user).unwrap().unwrap().tokens, 0);
        assert_eq!(db.count_images(&user).unwrap(), 3);
    }

    #[test]
    fn debit_for_unknown_user_is_insufficient() {
        let db = db();
        let outcome = db
            .debit_and_record(&new_id(), "nobody", "a fox", "https://img/fox.png")
            .unwrap();
        assert_eq!(outcome, DebitOutcome::Insufficient);
        assert_eq!(db.count_images("nobody").unwrap(), 0);
    }

    #[test]
    fn failed_insert_rolls_back_debit() {
        let db = db();
        let user = new_id();
        let image_id = new_id();
        db.create_user(&user).unwrap();

        db.debit_and_record(&image_id, &user, "first", "https://img/1.png").unwrap();
        assert_eq!(db.get_user(&user).unwrap().unwrap().tokens, 2);

        // Reusing the image id violates the primary key after the debit ran
        let result = db.debit_and_record(&image_id, &user, "second", "https://img/2.png");
        assert!(result.is_err());
        assert_eq!(db.get_user(&user).unwrap().unwrap().tokens, 2);
        assert_eq!(db.count_images(&user).unwrap(), 1);
    }

    #[test]
    fn list_images_newest_first_with_limit() {
        let db = db();
        let user = new_id();
        db.create_user(&user).unwrap();

        for n in 1..=3 {
            let url = format!("https://img/{}.png", n);
            db.debit_and_record(&new_id(), &user, &format!("prompt {}", n), &url)
                .unwrap();
        }

        let rows = db.list_images(&user, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].prompt, "prompt 3");
        assert_eq!(rows[1].prompt, "prompt 2");
        assert!(rows.iter().all(|r| r.user_id == user));
    }
}
