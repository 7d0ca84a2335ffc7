//! Request/response interface over the orchestrator.
//!
//! Sync requests pass through a [`SyncGate`]: per key, one request runs and at
//! most one waits behind it; anything beyond that is answered `busy` at once.
//! `get_status` never touches the gate.

use hsync_state::HsyncSettings;
use hsync_sync::{SyncOrchestrator, SyncParams, SyncScope};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    running: bool,
    pending: bool,
}

/// One running plus one pending sync per key.
#[derive(Debug, Default)]
pub struct SyncGate {
    slots: Mutex<HashMap<String, Slot>>,
    idle: Condvar,
}

/// Held while a gated sync runs; releases the slot on drop.
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a SyncGate,
    key: String,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the gate for `key`, waiting behind a running request if no one
    /// else is already waiting. Returns `None` when the caller should report busy.
    pub fn enter(&self, key: &str) -> Option<GatePermit<'_>> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key.to_string()).or_default();
        if !slot.running {
            slot.running = true;
            return Some(self.permit(key));
        }
        if slot.pending {
            return None;
        }
        slot.pending = true;
        debug!(key, "Sync queued behind running request");
        loop {
            self.idle.wait(&mut slots);
            let slot = slots.entry(key.to_string()).or_default();
            if !slot.running {
                slot.pending = false;
                slot.running = true;
                return Some(self.permit(key));
            }
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.slots.lock().get(key).is_some_and(|s| s.running)
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.slots.lock().get(key).is_some_and(|s| s.pending)
    }

    fn permit(&self, key: &str) -> GatePermit<'_> {
        GatePermit {
            gate: self,
            key: key.to_string(),
        }
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        let mut slots = self.gate.slots.lock();
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.running = false;
        }
        self.gate.idle.notify_all();
    }
}

/// A request as read from one input line.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    SyncAll {
        #[serde(default)]
        scope: SyncScope,
        #[serde(default)]
        dry_run: bool,
        #[serde(default)]
        allow_secrets: bool,
    },
    SyncTarget {
        target: String,
        #[serde(default)]
        scope: SyncScope,
        #[serde(default)]
        dry_run: bool,
        #[serde(default)]
        allow_secrets: bool,
    },
    GetStatus {
        #[serde(default)]
        scope: SyncScope,
    },
}

/// Request plus the caller's correlation id, echoed back in the response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: Value,
    #[serde(flatten)]
    pub request: Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Busy,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Value,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            status: ResponseStatus::Ok,
            result: Some(result),
            message: None,
        }
    }

    pub fn busy(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            status: ResponseStatus::Busy,
            result: None,
            message: Some(message.into()),
        }
    }

    pub fn error(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            status: ResponseStatus::Error,
            result: None,
            message: Some(message.into()),
        }
    }
}

/// Shared between request workers of `hsync serve`.
pub struct SyncService {
    orchestrator: SyncOrchestrator,
    settings: HsyncSettings,
    gate: SyncGate,
}

impl SyncService {
    pub fn new(orchestrator: SyncOrchestrator, settings: HsyncSettings) -> Self {
        Self {
            orchestrator,
            settings,
            gate: SyncGate::new(),
        }
    }

    pub fn gate(&self) -> &SyncGate {
        &self.gate
    }

    /// Gate key for a run over `targets` at `scope`.
    pub fn gate_key(targets: &[String], scope: SyncScope) -> String {
        format!("{}:{scope}", targets.join(","))
    }

    pub fn handle(&self, envelope: Envelope) -> Response {
        let id = envelope.id;
        match envelope.request {
            Request::GetStatus { scope } => match self.orchestrator.status(scope) {
                Ok(report) => to_response(id, &report),
                Err(e) => Response::error(id, format!("{e:#}")),
            },
            Request::SyncAll {
                scope,
                dry_run,
                allow_secrets,
            } => {
                let targets = self
                    .settings
                    .targets
                    .clone()
                    .unwrap_or_else(|| self.orchestrator.registry().list());
                self.gated_sync(id, targets, scope, dry_run, allow_secrets)
            }
            Request::SyncTarget {
                target,
                scope,
                dry_run,
                allow_secrets,
            } => {
                let target = target.trim().to_ascii_lowercase();
                if !self.orchestrator.registry().contains(&target) {
                    return Response::error(
                        id,
                        format!(
                            "unknown target '{target}' (available: {})",
                            self.orchestrator.registry().list().join(", ")
                        ),
                    );
                }
                self.gated_sync(id, vec![target], scope, dry_run, allow_secrets)
            }
        }
    }

    fn gated_sync(
        &self,
        id: Value,
        targets: Vec<String>,
        scope: SyncScope,
        dry_run: bool,
        allow_secrets: bool,
    ) -> Response {
        let key = Self::gate_key(&targets, scope);
        let Some(_permit) = self.gate.enter(&key) else {
            warn!(key = %key, "Rejecting sync: one already running and one queued");
            return Response::busy(
                id,
                "Sync already in progress; use get_status to check current state",
            );
        };
        let params = SyncParams {
            scope,
            dry_run,
            force: false,
            targets: Some(targets),
            allow_secrets: allow_secrets || self.settings.allow_secrets(),
            parallel: self.settings.parallel(),
        };
        match self.orchestrator.sync(&params) {
            Ok(report) => to_response(id, &report),
            Err(e) => Response::error(id, format!("{e:#}")),
        }
    }
}

fn to_response<T: Serialize>(id: Value, body: &T) -> Response {
    match serde_json::to_value(body) {
        Ok(value) => Response::ok(id, value),
        Err(e) => Response::error(id, format!("failed to encode response: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsync_sync::{AdapterRegistry, SourceConfig, SourceReader};
    use hsync_test_utils::TestFixture;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn service(fx: &TestFixture) -> SyncService {
        let reader = SourceReader::new(SourceConfig {
            claude_home: fx.claude_home.clone(),
            home: fx.home.clone(),
            project_dir: Some(fx.project.clone()),
        });
        let orchestrator = SyncOrchestrator::new(
            reader,
            AdapterRegistry::with_defaults(fx.home.clone()),
            fx.state_root.clone(),
        )
        .with_env(Default::default());
        SyncService::new(orchestrator, HsyncSettings::default())
    }

    fn envelope(value: Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    #[test]
    fn third_request_is_rejected_while_one_runs_and_one_waits() {
        let gate = Arc::new(SyncGate::new());
        let first = gate.enter("codex:all").unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.enter("codex:all").is_some())
        };
        wait_until(|| gate.is_pending("codex:all"));

        assert!(gate.enter("codex:all").is_none());
        assert!(gate.enter("gemini:all").is_some(), "other keys are independent");

        drop(first);
        assert!(waiter.join().unwrap());
        assert!(!gate.is_running("codex:all"));
        assert!(!gate.is_pending("codex:all"));
    }

    #[test]
    fn permit_release_allows_next_request() {
        let gate = SyncGate::new();
        drop(gate.enter("k").unwrap());
        assert!(gate.enter("k").is_some());
    }

    #[test]
    fn requests_parse_with_defaults() {
        let env = envelope(json!({"id": 7, "op": "sync_target", "target": "codex"}));
        assert_eq!(env.id, json!(7));
        assert!(matches!(
            env.request,
            Request::SyncTarget { ref target, scope: SyncScope::All, dry_run: false, .. } if target == "codex"
        ));
        let env = envelope(json!({"op": "get_status"}));
        assert!(env.id.is_null());
        assert!(matches!(env.request, Request::GetStatus { .. }));
    }

    #[test]
    fn sync_all_returns_report() {
        let fx = TestFixture::new().unwrap();
        fx.write_user_rules("Be terse.").unwrap();
        let service = service(&fx);

        let response = service.handle(envelope(json!({"id": 1, "op": "sync_all"})));

        assert_eq!(response.status, ResponseStatus::Ok, "{:?}", response.message);
        let result = response.result.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["targets"].as_array().unwrap().len(), 3);
        assert!(fx.home.join(".codex/AGENTS.md").is_file());
    }

    #[test]
    fn unknown_target_is_an_error_response() {
        let fx = TestFixture::new().unwrap();
        let response = service(&fx).handle(envelope(json!({"op": "sync_target", "target": "vim"})));
        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.message.unwrap().contains("available: codex, gemini, opencode"));
    }

    #[test]
    fn busy_gate_rejects_sync_but_not_status() {
        let fx = TestFixture::new().unwrap();
        let service = Arc::new(service(&fx));
        let key = SyncService::gate_key(&["codex".to_string()], SyncScope::All);
        let running = service.gate().enter(&key).unwrap();

        let queued = {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service.handle(envelope(json!({"op": "sync_target", "target": "codex"})))
            })
        };
        wait_until(|| service.gate().is_pending(&key));

        let rejected = service.handle(envelope(json!({"op": "sync_target", "target": "codex"})));
        assert_eq!(rejected.status, ResponseStatus::Busy);

        let status = service.handle(envelope(json!({"op": "get_status"})));
        assert_eq!(status.status, ResponseStatus::Ok);

        drop(running);
        assert_eq!(queued.join().unwrap().status, ResponseStatus::Ok);
    }
}
