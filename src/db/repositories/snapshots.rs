use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row, Transaction};

use crate::db::{
    connection::Database,
    helpers::{decode_args, encode_args, parse_datetime, to_i64, to_u32, to_u64},
    models::{BrowserTab, CapturedWindow, SaveOutcome, Snapshot, TabInfo, WindowInfo},
};

fn row_to_window(row: &Row) -> Result<CapturedWindow> {
    let hwnd: i64 = row.get("hwnd")?;
    let pid: i64 = row.get("pid")?;
    let cmd_args: String = row.get("cmd_args")?;
    let captured_at: String = row.get("captured_at")?;

    Ok(CapturedWindow {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        snapshot_id: row.get("snapshot_id")?,
        handle: hwnd as u64,
        title: row.get("title")?,
        exe_path: row.get("exe_path")?,
        exe_name: row.get("exe_name")?,
        pid: to_u32(pid, "pid")?,
        working_dir: row.get("working_dir")?,
        cmd_args: decode_args(&cmd_args)?,
        captured_at: parse_datetime(&captured_at, "captured_at")?,
    })
}

fn row_to_tab(row: &Row) -> Result<BrowserTab> {
    let captured_at: String = row.get("captured_at")?;
    Ok(BrowserTab {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        snapshot_id: row.get("snapshot_id")?,
        tab_id: row.get("tab_id")?,
        title: row.get("title")?,
        url: row.get("url")?,
        captured_at: parse_datetime(&captured_at, "captured_at")?,
    })
}

fn row_to_snapshot(row: &Row) -> Result<Snapshot> {
    let captured_at: String = row.get("captured_at")?;
    let window_count: i64 = row.get("window_count")?;
    let tab_count: i64 = row.get("tab_count")?;
    Ok(Snapshot {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        captured_at: parse_datetime(&captured_at, "captured_at")?,
        window_count: to_u64(window_count, "window_count")?,
        tab_count: to_u64(tab_count, "tab_count")?,
    })
}

fn count_rows(tx: &Transaction<'_>, table: &str, session_id: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE session_id = ?1");
    Ok(tx.query_row(&sql, params![session_id], |row| row.get(0))?)
}

fn ensure_session_exists(tx: &Transaction<'_>, session_id: &str) -> Result<()> {
    let exists: i64 = tx.query_row(
        "SELECT COUNT(*) FROM sessions WHERE id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(anyhow!("Session not found"));
    }
    Ok(())
}

/// Delete-then-insert inside the caller's transaction, so readers never see
/// the session with zero rows.
fn replace_windows(
    tx: &Transaction<'_>,
    session_id: &str,
    snapshot_id: Option<&str>,
    windows: &[WindowInfo],
    now: DateTime<Utc>,
) -> Result<()> {
    tx.execute(
        "DELETE FROM captured_windows WHERE session_id = ?1",
        params![session_id],
    )?;

    let mut stmt = tx.prepare(
        "INSERT INTO captured_windows (session_id, snapshot_id, hwnd, title, exe_path, exe_name,
                                       pid, working_dir, cmd_args, captured_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for window in windows {
        stmt.execute(params![
            session_id,
            snapshot_id,
            window.handle as i64,
            window.title,
            window.exe_path,
            window.exe_name,
            i64::from(window.pid),
            window.working_dir,
            encode_args(&window.cmd_args)?,
            now.to_rfc3339(),
        ])?;
    }
    Ok(())
}

fn replace_tabs(
    tx: &Transaction<'_>,
    session_id: &str,
    snapshot_id: Option<&str>,
    tabs: &[TabInfo],
    now: DateTime<Utc>,
) -> Result<()> {
    tx.execute(
        "DELETE FROM browser_tabs WHERE session_id = ?1",
        params![session_id],
    )?;

    let mut stmt = tx.prepare(
        "INSERT INTO browser_tabs (session_id, snapshot_id, tab_id, title, url, captured_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for tab in tabs {
        stmt.execute(params![
            session_id,
            snapshot_id,
            tab.id,
            tab.title,
            tab.url,
            now.to_rfc3339(),
        ])?;
    }
    Ok(())
}

fn touch_last_snapshot(tx: &Transaction<'_>, session_id: &str, now: DateTime<Utc>) -> Result<()> {
    tx.execute(
        "UPDATE sessions
         SET last_snapshot_at = ?1,
             updated_at = ?1
         WHERE id = ?2",
        params![now.to_rfc3339(), session_id],
    )?;
    Ok(())
}

impl Database {
    /// Persists one capture for a session.
    ///
    /// An empty window list never overwrites stored windows: when the session
    /// already has windows, only `last_snapshot_at` moves and no snapshot row is
    /// appended. Stored tabs survive an empty tab list the same way.
    pub async fn save_snapshot(
        &self,
        session_id: &str,
        windows: Vec<WindowInfo>,
        tabs: Vec<TabInfo>,
    ) -> Result<SaveOutcome> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let now = Utc::now();
            let tx = conn.transaction()?;
            ensure_session_exists(&tx, &session_id)?;

            let stored_windows = count_rows(&tx, "captured_windows", &session_id)?;
            if windows.is_empty() && stored_windows > 0 {
                touch_last_snapshot(&tx, &session_id, now)?;
                tx.commit()?;
                return Ok(SaveOutcome::Retained);
            }

            let stored_tabs = count_rows(&tx, "browser_tabs", &session_id)?;
            let tabs_retained = tabs.is_empty() && stored_tabs > 0;
            let tab_count = if tabs_retained {
                stored_tabs as usize
            } else {
                tabs.len()
            };

            let snapshot_id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO snapshots (id, session_id, captured_at, window_count, tab_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    snapshot_id,
                    session_id,
                    now.to_rfc3339(),
                    to_i64(windows.len() as u64)?,
                    to_i64(tab_count as u64)?,
                ],
            )?;

            replace_windows(&tx, &session_id, Some(&snapshot_id), &windows, now)?;
            if !tabs_retained {
                replace_tabs(&tx, &session_id, Some(&snapshot_id), &tabs, now)?;
            }
            touch_last_snapshot(&tx, &session_id, now)?;

            tx.commit()?;
            Ok(SaveOutcome::Written {
                snapshot_id,
                window_count: windows.len(),
                tab_count,
                tabs_retained,
            })
        })
        .await
    }

    /// Replaces the latest tab set pushed by an external tab host. An empty
    /// list is ignored when tabs are already stored.
    pub async fn save_tabs(&self, session_id: &str, tabs: Vec<TabInfo>) -> Result<bool> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let now = Utc::now();
            let tx = conn.transaction()?;
            ensure_session_exists(&tx, &session_id)?;

            if tabs.is_empty() && count_rows(&tx, "browser_tabs", &session_id)? > 0 {
                return Ok(false);
            }

            replace_tabs(&tx, &session_id, None, &tabs, now)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    pub async fn get_windows(&self, session_id: &str) -> Result<Vec<CapturedWindow>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, snapshot_id, hwnd, title, exe_path, exe_name, pid,
                        working_dir, cmd_args, captured_at
                 FROM captured_windows
                 WHERE session_id = ?1
                 ORDER BY id",
            )?;
            let mut rows = stmt.query(params![session_id])?;
            let mut windows = Vec::new();
            while let Some(row) = rows.next()? {
                windows.push(row_to_window(row)?);
            }
            Ok(windows)
        })
        .await
    }

    pub async fn get_tabs(&self, session_id: &str) -> Result<Vec<BrowserTab>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, snapshot_id, tab_id, title, url, captured_at
                 FROM browser_tabs
                 WHERE session_id = ?1
                 ORDER BY id",
            )?;
            let mut rows = stmt.query(params![session_id])?;
            let mut tabs = Vec::new();
            while let Some(row) = rows.next()? {
                tabs.push(row_to_tab(row)?);
            }
            Ok(tabs)
        })
        .await
    }

    /// Snapshot history, newest first.
    pub async fn list_snapshots(&self, session_id: &str, limit: usize) -> Result<Vec<Snapshot>> {
        let session_id = session_id.to_string();
        let limit = limit as i64;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, captured_at, window_count, tab_count
                 FROM snapshots
                 WHERE session_id = ?1
                 ORDER BY captured_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![session_id, limit])?;
            let mut snapshots = Vec::new();
            while let Some(row) = rows.next()? {
                snapshots.push(row_to_snapshot(row)?);
            }
            Ok(snapshots)
        })
        .await
    }
}
