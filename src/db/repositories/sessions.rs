use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, parse_status, to_i64, to_u64},
    models::{Session, SessionStatus},
};

const SESSION_COLUMNS: &str = "id, name, icon, description, status, desktop_id, created_at, \
                               updated_at, last_snapshot_at, total_seconds";

fn row_to_session(row: &Row) -> Result<Session> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let last_snapshot_at: Option<String> = row.get("last_snapshot_at")?;
    let total_seconds: i64 = row.get("total_seconds")?;

    Ok(Session {
        id: row.get("id")?,
        name: row.get("name")?,
        icon: row.get("icon")?,
        description: row.get("description")?,
        status: parse_status(&status)?,
        desktop_id: row.get("desktop_id")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
        last_snapshot_at: parse_optional_datetime(last_snapshot_at, "last_snapshot_at")?,
        total_seconds: to_u64(total_seconds, "total_seconds")?,
    })
}

/// Pauses every active session except `keep`. Keeps "at most one active"
/// true for every transaction that activates a session.
fn pause_other_active(tx: &Transaction<'_>, keep: &str, now: DateTime<Utc>) -> Result<usize> {
    let paused = tx.execute(
        "UPDATE sessions
         SET status = 'paused',
             updated_at = ?1
         WHERE status = 'active' AND id != ?2",
        params![now.to_rfc3339(), keep],
    )?;
    Ok(paused)
}

fn find_live_session_for_desktop(
    tx: &Transaction<'_>,
    desktop_id: &str,
) -> Result<Option<Session>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM sessions
         WHERE desktop_id = ?1 AND status != 'idle'
         ORDER BY created_at DESC
         LIMIT 1"
    );
    let mut stmt = tx.prepare(&sql)?;
    let mut rows = stmt.query(params![desktop_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_session(row)?)),
        None => Ok(None),
    }
}

impl Database {
    /// Inserts `session`, or returns the live session already bound to the
    /// same desktop without writing anything.
    pub async fn create_session(&self, session: &Session) -> Result<Session> {
        let record = session.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            if let Some(desktop_id) = record.desktop_id.as_deref() {
                if let Some(existing) = find_live_session_for_desktop(&tx, desktop_id)? {
                    tx.commit()?;
                    return Ok(existing);
                }
            }

            if record.status == SessionStatus::Active {
                pause_other_active(&tx, &record.id, record.created_at)?;
            }

            tx.execute(
                "INSERT INTO sessions (id, name, icon, description, status, desktop_id,
                                       created_at, updated_at, last_snapshot_at, total_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.name,
                    record.icon,
                    record.description,
                    record.status.as_str(),
                    record.desktop_id,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                    record.last_snapshot_at.map(|dt| dt.to_rfc3339()),
                    to_i64(record.total_seconds)?,
                ],
            )?;

            tx.commit()?;
            Ok(record)
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![session_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_session(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Most recent session (any status) that was bound to `desktop_id`.
    pub async fn get_session_by_desktop(&self, desktop_id: &str) -> Result<Option<Session>> {
        let desktop_id = desktop_id.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE desktop_id = ?1
                 ORDER BY (status != 'idle') DESC, created_at DESC
                 LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![desktop_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_session(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn get_all_sessions(&self) -> Result<Vec<Session>> {
        self.execute(|conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY updated_at DESC");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn get_sessions_by_status(&self, status: SessionStatus) -> Result<Vec<Session>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE status = ?1 ORDER BY created_at"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![status.as_str()])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Moves a session to `status`. Activating a session pauses any other
    /// active one in the same transaction.
    pub async fn update_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let now = Utc::now();
            let tx = conn.transaction()?;

            if status == SessionStatus::Active {
                pause_other_active(&tx, &session_id, now)?;
            }

            let rows_affected = tx.execute(
                "UPDATE sessions
                 SET status = ?1,
                     updated_at = ?2
                 WHERE id = ?3",
                params![status.as_str(), now.to_rfc3339(), session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Session not found"));
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Rebinds a session to `desktop_id` and makes it the active session.
    /// Any other live session still claiming that desktop is idled.
    pub async fn bind_session_to_desktop(&self, session_id: &str, desktop_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        let desktop_id = desktop_id.to_string();
        self.execute(move |conn| {
            let now = Utc::now();
            let tx = conn.transaction()?;

            tx.execute(
                "UPDATE sessions
                 SET status = 'idle',
                     updated_at = ?1
                 WHERE desktop_id = ?2 AND id != ?3 AND status != 'idle'",
                params![now.to_rfc3339(), desktop_id, session_id],
            )?;
            pause_other_active(&tx, &session_id, now)?;

            let rows_affected = tx.execute(
                "UPDATE sessions
                 SET desktop_id = ?1,
                     status = 'active',
                     updated_at = ?2
                 WHERE id = ?3",
                params![desktop_id, now.to_rfc3339(), session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Session not found"));
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn rename_session(&self, session_id: &str, name: &str) -> Result<()> {
        let session_id = session_id.to_string();
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(anyhow!("Session name must not be empty"));
        }
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sessions
                 SET name = ?1,
                     updated_at = ?2
                 WHERE id = ?3",
                params![name, Utc::now().to_rfc3339(), session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Session not found"));
            }

            Ok(())
        })
        .await
    }

    pub async fn update_session_icon(&self, session_id: &str, icon: &str) -> Result<()> {
        let session_id = session_id.to_string();
        let icon = icon.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sessions
                 SET icon = ?1,
                     updated_at = ?2
                 WHERE id = ?3",
                params![icon, Utc::now().to_rfc3339(), session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Session not found"));
            }

            Ok(())
        })
        .await
    }

    pub async fn update_session_description(
        &self,
        session_id: &str,
        description: &str,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        let description = description.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sessions
                 SET description = ?1,
                     updated_at = ?2
                 WHERE id = ?3",
                params![description, Utc::now().to_rfc3339(), session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Session not found"));
            }

            Ok(())
        })
        .await
    }

    /// Delete a session and everything captured for it.
    ///
    /// Note: `snapshots`, `captured_windows` and `browser_tabs` go away via
    /// ON DELETE CASCADE (schema_v1.sql).
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let rows_affected =
                tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
            tx.commit()?;
            Ok(rows_affected > 0)
        })
        .await
    }

    /// Adds `seconds` to an active session. Non-active sessions are left
    /// untouched; returns whether time was added.
    pub async fn add_session_time(&self, session_id: &str, seconds: u64) -> Result<bool> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sessions
                 SET total_seconds = total_seconds + ?1,
                     updated_at = ?2
                 WHERE id = ?3 AND status = 'active'",
                params![to_i64(seconds)?, Utc::now().to_rfc3339(), session_id],
            )?;
            Ok(rows_affected > 0)
        })
        .await
    }

    pub async fn count_active_sessions(&self) -> Result<usize> {
        self.execute(|conn| {
            let count: Option<i64> = conn
                .query_row(
                    "SELECT COUNT(*) FROM sessions WHERE status = 'active'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(count.unwrap_or(0) as usize)
        })
        .await
    }
}
