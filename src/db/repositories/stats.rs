use anyhow::{anyhow, Result};
use rusqlite::params;

use crate::capture::is_system_exe;
use crate::db::{
    connection::Database,
    helpers::to_u64,
    models::{format_duration, SessionStats, STATS_APP_LIMIT},
};

impl Database {
    pub async fn get_session_stats(&self, session_id: &str) -> Result<SessionStats> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let total_seconds: i64 = conn
                .query_row(
                    "SELECT total_seconds FROM sessions WHERE id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .map_err(|_| anyhow!("Session not found"))?;

            let mut stmt = conn.prepare(
                "SELECT exe_name FROM captured_windows WHERE session_id = ?1 ORDER BY id",
            )?;
            let exe_names = stmt
                .query_map(params![session_id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut apps: Vec<String> = Vec::new();
            for name in &exe_names {
                if name.is_empty() {
                    continue;
                }
                if is_system_exe(name) {
                    continue;
                }
                if !apps.iter().any(|seen| seen.eq_ignore_ascii_case(name)) {
                    apps.push(name.clone());
                }
            }

            let tab_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM browser_tabs WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;

            let app_count = apps.len();
            apps.truncate(STATS_APP_LIMIT);

            Ok(SessionStats {
                app_count,
                apps,
                tab_count: tab_count as usize,
                window_count: exe_names.len(),
                duration: format_duration(to_u64(total_seconds, "total_seconds")?),
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Session, TabInfo, WindowInfo};
    use chrono::Utc;
    use tempfile::TempDir;

    fn window(exe: &str) -> WindowInfo {
        WindowInfo {
            handle: 1,
            title: "t".into(),
            exe_path: format!("C:\\{exe}"),
            exe_name: exe.into(),
            pid: 1,
            working_dir: None,
            cmd_args: vec![],
        }
    }

    #[tokio::test]
    async fn stats_aggregate_unique_apps_and_duration() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("stats.sqlite3")).unwrap();
        let session = db
            .create_session(&Session::new("Work", Some("d"), Utc::now()))
            .await
            .unwrap();

        let mut windows = vec![
            window("Code.exe"),
            window("code.exe"),
            window("explorer.exe"),
            window("chrome.exe"),
        ];
        for i in 0..6 {
            windows.push(window(&format!("tool{i}.exe")));
        }
        db.save_snapshot(
            &session.id,
            windows,
            vec![TabInfo {
                id: "1".into(),
                url: "https://a.dev".into(),
                title: "a".into(),
            }],
        )
        .await
        .unwrap();
        db.add_session_time(&session.id, 3720).await.unwrap();

        let stats = db.get_session_stats(&session.id).await.unwrap();
        assert_eq!(stats.window_count, 10);
        assert_eq!(stats.app_count, 8);
        assert_eq!(stats.apps.len(), STATS_APP_LIMIT);
        assert_eq!(stats.apps[0], "Code.exe");
        assert!(!stats.apps.iter().any(|a| a == "explorer.exe"));
        assert_eq!(stats.tab_count, 1);
        assert_eq!(stats.duration, "1h 2m");
    }

    #[tokio::test]
    async fn system_processes_from_the_capture_denylist_are_not_apps() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("stats.sqlite3")).unwrap();
        let session = db
            .create_session(&Session::new("Work", Some("d"), Utc::now()))
            .await
            .unwrap();
        let windows = vec![
            window("svchost.exe"),
            window("ApplicationFrameHost.exe"),
            window("SearchUI.exe"),
            window("Code.exe"),
        ];
        db.save_snapshot(&session.id, windows, vec![]).await.unwrap();

        let stats = db.get_session_stats(&session.id).await.unwrap();
        assert_eq!(stats.window_count, 4);
        assert_eq!(stats.apps, vec!["Code.exe".to_string()]);
        assert_eq!(stats.app_count, 1);
    }

    #[tokio::test]
    async fn stats_for_missing_session_fail() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("stats.sqlite3")).unwrap();
        assert!(db.get_session_stats("missing").await.is_err());
    }
}
