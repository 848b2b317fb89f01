use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::{SaveOutcome, TabInfo};
use crate::lifecycle::SessionManager;
use crate::restore::RestoreEngine;

/// Requests a presentation layer sends to a running daemon, one JSON object
/// per line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum DaemonCommand {
    #[serde(rename_all = "camelCase")]
    CreateSession { name: String, desktop_id: String },
    #[serde(rename_all = "camelCase")]
    CancelPrompt { desktop_id: String },
    NewSessionPrompt,
    Snapshot,
    #[serde(rename_all = "camelCase")]
    Tabs { session_id: String, tabs: Vec<TabInfo> },
    #[serde(rename_all = "camelCase")]
    Restore {
        session_id: String,
        #[serde(default)]
        new_desktop: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteSession { session_id: String },
    ActiveSession,
    ListSessions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandReply {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(message),
        }
    }
}

/// Parses one input line and runs it. Malformed input and failed actions
/// both come back as `ok: false`.
pub async fn handle_line(
    line: &str,
    manager: &SessionManager,
    restore: &RestoreEngine,
    default_new_desktop: bool,
) -> CommandReply {
    let command = match serde_json::from_str::<DaemonCommand>(line) {
        Ok(command) => command,
        Err(err) => return CommandReply::failure(format!("Invalid command: {err}")),
    };
    match dispatch(command, manager, restore, default_new_desktop).await {
        Ok(result) => CommandReply::success(result),
        Err(err) => CommandReply::failure(format!("{err:#}")),
    }
}

pub async fn dispatch(
    command: DaemonCommand,
    manager: &SessionManager,
    restore: &RestoreEngine,
    default_new_desktop: bool,
) -> Result<Value> {
    match command {
        DaemonCommand::CreateSession { name, desktop_id } => {
            let session = manager.create_session(&name, &desktop_id).await?;
            Ok(serde_json::to_value(session)?)
        }
        DaemonCommand::CancelPrompt { desktop_id } => {
            let cleared = manager.cancel_pending_prompt(&desktop_id).await;
            Ok(json!({ "cleared": cleared }))
        }
        DaemonCommand::NewSessionPrompt => {
            let prompted = manager.trigger_new_session_prompt().await?;
            Ok(json!({ "prompted": prompted }))
        }
        DaemonCommand::Snapshot => match manager.trigger_manual_snapshot().await? {
            SaveOutcome::Written {
                snapshot_id,
                window_count,
                tab_count,
                ..
            } => Ok(json!({
                "snapshotId": snapshot_id,
                "windowCount": window_count,
                "tabCount": tab_count,
            })),
            SaveOutcome::Retained => Ok(json!({ "retained": true })),
        },
        DaemonCommand::Tabs { session_id, tabs } => {
            let kept = manager.receive_tabs(&session_id, tabs).await?;
            Ok(json!({ "stored": kept.len() }))
        }
        DaemonCommand::Restore {
            session_id,
            new_desktop,
        } => {
            let summary = restore
                .restore_session(&session_id, new_desktop.unwrap_or(default_new_desktop))
                .await?;
            Ok(serde_json::to_value(summary)?)
        }
        DaemonCommand::DeleteSession { session_id } => {
            if !manager.delete_session(&session_id).await? {
                bail!("Session not found: {session_id}");
            }
            Ok(json!({ "deleted": session_id }))
        }
        DaemonCommand::ActiveSession => Ok(json!({
            "sessionId": manager.get_active_session_id().await?,
        })),
        DaemonCommand::ListSessions => Ok(serde_json::to_value(manager.get_all_sessions().await?)?),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::restore::RestorePacing;
    use crate::test_support::{FakeLauncher, Harness};
    use crate::topology::SuppressHandle;

    fn restore_engine(harness: &Harness) -> RestoreEngine {
        RestoreEngine::new(
            harness.manager.clone(),
            Arc::new(FakeLauncher::default()),
            SuppressHandle::new(),
            None,
        )
        .with_pacing(RestorePacing::immediate())
    }

    #[test]
    fn commands_parse_from_camel_case_json() {
        let command: DaemonCommand =
            serde_json::from_str(r#"{"command":"createSession","name":"Docs","desktopId":"d2"}"#)
                .unwrap();
        assert_eq!(
            command,
            DaemonCommand::CreateSession {
                name: "Docs".into(),
                desktop_id: "d2".into()
            }
        );

        let command: DaemonCommand =
            serde_json::from_str(r#"{"command":"restore","sessionId":"abc"}"#).unwrap();
        assert_eq!(
            command,
            DaemonCommand::Restore {
                session_id: "abc".into(),
                new_desktop: None
            }
        );
    }

    #[tokio::test]
    async fn create_session_line_returns_the_session() {
        let harness = Harness::new(&["d1"]);
        let restore = restore_engine(&harness);

        let reply = handle_line(
            r#"{"command":"createSession","name":"Writing","desktopId":"d1"}"#,
            &harness.manager,
            &restore,
            false,
        )
        .await;
        assert!(reply.ok);
        let result = reply.result.unwrap();
        assert_eq!(result["name"], "Writing");
        assert_eq!(result["status"], "active");

        let reply = handle_line(r#"{"command":"activeSession"}"#, &harness.manager, &restore, false)
            .await;
        assert_eq!(reply.result.unwrap()["sessionId"], result["id"]);
    }

    #[tokio::test]
    async fn restore_through_the_daemon_rebinds_without_prompting() {
        let mut harness = Harness::new(&["d1"]);
        let session = harness.seed_session("Old work", "gone").await;
        let suppress = SuppressHandle::new();
        let restore = RestoreEngine::new(
            harness.manager.clone(),
            Arc::new(FakeLauncher::default()),
            suppress.clone(),
            None,
        )
        .with_pacing(RestorePacing::immediate());
        let mut watcher = crate::topology::DesktopWatcher::new(suppress.clone());
        watcher.observe(vec!["d1".into()], "d1".into());

        let line = format!(r#"{{"command":"restore","sessionId":"{}","newDesktop":true}}"#, session.id);
        let reply = handle_line(&line, &harness.manager, &restore, false).await;
        assert!(reply.ok, "{:?}", reply.error);
        assert_eq!(reply.result.unwrap()["newDesktop"], "created-1");

        // The daemon's own watcher consumes the suppression for its desktop.
        let events = watcher.observe(vec!["d1".into(), "created-1".into()], "created-1".into());
        assert!(!events
            .iter()
            .any(|event| matches!(event, crate::topology::TopologyEvent::Created { .. })));
        assert_eq!(suppress.pending(), 0);
        assert_eq!(
            harness.manager.get_active_session_id().await.unwrap(),
            Some(session.id.clone())
        );
        assert!(!harness
            .drain_events()
            .iter()
            .any(|event| matches!(event, crate::events::DaemonEvent::NewDesktopDetected { .. })));
    }

    #[tokio::test]
    async fn delete_line_unbinds_the_session() {
        let harness = Harness::new(&["d1"]);
        let restore = restore_engine(&harness);
        let session = harness.manager.create_session("Gone soon", "d1").await.unwrap();

        let line = format!(r#"{{"command":"deleteSession","sessionId":"{}"}}"#, session.id);
        let reply = handle_line(&line, &harness.manager, &restore, false).await;
        assert!(reply.ok);
        assert!(harness.db.get_session(&session.id).await.unwrap().is_none());
        assert!(!handle_line(&line, &harness.manager, &restore, false).await.ok);
    }

    #[tokio::test]
    async fn bad_input_and_failed_actions_report_errors() {
        let harness = Harness::new(&["d1"]);
        let restore = restore_engine(&harness);

        let reply = handle_line("not json", &harness.manager, &restore, false).await;
        assert!(!reply.ok);
        assert!(reply.error.unwrap().starts_with("Invalid command"));

        let reply = handle_line(
            r#"{"command":"restore","sessionId":"missing"}"#,
            &harness.manager,
            &restore,
            false,
        )
        .await;
        assert!(!reply.ok);
        assert!(reply.error.unwrap().contains("Session not found"));
    }
}
