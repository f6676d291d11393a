#![forbid(unsafe_code)]

use super::{SqliteStore, StoreError};
use rusqlite::{Connection, OptionalExtension, params};
use soi_core::ids::UserId;
use soi_core::token::Token;
use soi_core::{User, UserSummary};

impl SqliteStore {
    pub fn is_username_taken(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM users WHERE username=?1",
                params![username],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some())
    }

    /// Inserts a new user. The UNIQUE index on `username` makes a racing duplicate fail with
    /// `Conflict` instead of creating a second row.
    pub fn register_user(&mut self, username: &str, password: &str) -> Result<User, StoreError> {
        let now_ms = super::now_ms();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO users(username, password, created_at_ms) VALUES (?1, ?2, ?3)",
            params![username, password, now_ms],
        )
        .map_err(|err| super::map_insert_conflict(err, "username is already registered"))?;
        let id = UserId::new(tx.last_insert_rowid());
        tx.commit()?;

        log::debug!("registered user {id}");
        Ok(User {
            id,
            username: username.to_string(),
            password: password.to_string(),
            token_hash: None,
            token_issued_at_ms: None,
        })
    }

    /// Plaintext comparison against the stored password.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, StoreError> {
        let user = user_by_username(&self.conn, username)?.ok_or(StoreError::UnknownUser)?;
        if user.password != password {
            return Err(StoreError::WrongPassword);
        }
        Ok(user)
    }

    /// Overwrites the single stored token of `token.identity`.
    pub fn set_token(&mut self, token: &Token) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE users SET token_hash=?2, token_issued_at_ms=?3 WHERE username=?1",
            params![token.identity, token.hash, token.issued_at_ms],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownUser);
        }
        tx.commit()?;
        Ok(())
    }

    pub fn token_hash(&self, username: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT token_hash FROM users WHERE username=?1",
                params![username],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten())
    }

    pub fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        user_by_username(&self.conn, username)
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, username, password, token_hash, token_issued_at_ms \
                 FROM users WHERE id=?1",
                params![id.get()],
                user_from_row,
            )
            .optional()?)
    }

    pub fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username FROM users ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(UserSummary {
                id: UserId::new(row.get(0)?),
                username: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, username, password, token_hash, token_issued_at_ms \
             FROM users WHERE username=?1",
            params![username],
            user_from_row,
        )
        .optional()?)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::new(row.get(0)?),
        username: row.get(1)?,
        password: row.get(2)?,
        token_hash: row.get(3)?,
        token_issued_at_ms: row.get(4)?,
    })
}
