//! In-process stand-in for a remote server's status endpoint.
//!
//! Each operation follows a [`Plan`]; the resolver advances it by one step on
//! every status fetch, the way a real process execution would make progress
//! between two polls.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use optrack_core::{OperationId, RawStatus};
use optrack_engine::{ResolverError, StatusResolver};

/// How a simulated operation behaves.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Runs for `steps` polls, then completes.
    Succeed { steps: u32 },
    /// Runs for `steps` polls, then completes with errors.
    Fail { steps: u32, message: String },
    /// Runs forever.
    Hang,
    /// Like `Succeed`, but every second status read fails.
    Flaky { steps: u32 },
}

#[derive(Debug)]
struct SimState {
    plan: Plan,
    polls: u32,
    cancelled: bool,
}

/// Resolver answering from per-operation plans.
#[derive(Debug, Default)]
pub struct SimulatedResolver {
    states: Mutex<HashMap<OperationId, SimState>>,
}

impl SimulatedResolver {
    /// Create a resolver with no plans.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a plan to an operation. Unplanned operations stay pending.
    pub fn plan(&self, id: &OperationId, plan: Plan) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(
                id.clone(),
                SimState {
                    plan,
                    polls: 0,
                    cancelled: false,
                },
            );
        }
    }
}

fn progress(polls: u32, steps: u32) -> f64 {
    if steps == 0 {
        return 100.0;
    }
    f64::from(polls.min(steps)) * 100.0 / f64::from(steps)
}

fn advance(state: &mut SimState) -> Result<RawStatus, ResolverError> {
    if state.cancelled {
        return Ok(RawStatus::new("Cancelled"));
    }
    state.polls += 1;
    let polls = state.polls;

    match &state.plan {
        Plan::Succeed { steps } if polls > *steps => {
            Ok(RawStatus::new("CompletedSuccessfully").with_result(json!({ "polls": polls })))
        }
        Plan::Fail { steps, message } if polls > *steps => {
            Ok(RawStatus::new("CompletedWithErrors").with_error(message.clone()))
        }
        Plan::Flaky { .. } if polls % 2 == 0 => Err(ResolverError::Transport(
            "simulated connection reset".to_string(),
        )),
        Plan::Flaky { steps } if polls > *steps => {
            Ok(RawStatus::new("CompletedSuccessfully").with_result(json!({ "polls": polls })))
        }
        Plan::Succeed { steps } | Plan::Fail { steps, .. } | Plan::Flaky { steps } => {
            Ok(RawStatus::new("Running").with_progress(progress(polls, *steps)))
        }
        Plan::Hang => Ok(RawStatus::new("Running")),
    }
}

#[async_trait]
impl StatusResolver for SimulatedResolver {
    async fn fetch_status(&self, id: &OperationId) -> Result<RawStatus, ResolverError> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| ResolverError::Transport("simulator state poisoned".to_string()))?;
        let raw = match states.get_mut(id) {
            Some(state) => advance(state)?,
            None => RawStatus::new("Pending"),
        };
        debug!(operation_id = %id, raw_status = %raw.text, "Simulated status");
        Ok(raw)
    }

    async fn cancel_remote(&self, id: &OperationId) -> Result<(), ResolverError> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| ResolverError::Transport("simulator state poisoned".to_string()))?;
        match states.get_mut(id) {
            Some(state) => {
                state.cancelled = true;
                info!(operation_id = %id, "Simulated server stopped operation");
                Ok(())
            }
            None => Err(ResolverError::Rejected(format!("unknown operation {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn statuses(resolver: &SimulatedResolver, id: &OperationId, n: usize) -> Vec<String> {
        let mut out = Vec::new();
        for _ in 0..n {
            out.push(match resolver.fetch_status(id).await {
                Ok(raw) => raw.text,
                Err(_) => "error".to_string(),
            });
        }
        out
    }

    #[tokio::test]
    async fn test_succeed_plan() {
        let resolver = SimulatedResolver::new();
        let id = OperationId::new("op-1");
        resolver.plan(&id, Plan::Succeed { steps: 2 });
        assert_eq!(
            statuses(&resolver, &id, 3).await,
            vec!["Running", "Running", "CompletedSuccessfully"]
        );
    }

    #[tokio::test]
    async fn test_fail_plan_carries_message() {
        let resolver = SimulatedResolver::new();
        let id = OperationId::new("op-1");
        resolver.plan(
            &id,
            Plan::Fail {
                steps: 0,
                message: "bad input".into(),
            },
        );
        let raw = resolver.fetch_status(&id).await.unwrap();
        assert_eq!(raw.text, "CompletedWithErrors");
        assert_eq!(raw.error.as_deref(), Some("bad input"));
    }

    #[tokio::test]
    async fn test_flaky_plan_errors_every_other_poll() {
        let resolver = SimulatedResolver::new();
        let id = OperationId::new("op-1");
        resolver.plan(&id, Plan::Flaky { steps: 3 });
        assert_eq!(
            statuses(&resolver, &id, 4).await,
            vec!["Running", "error", "Running", "error"]
        );
        assert_eq!(statuses(&resolver, &id, 1).await, vec!["CompletedSuccessfully"]);
    }

    #[tokio::test]
    async fn test_cancel_remote() {
        let resolver = SimulatedResolver::new();
        let id = OperationId::new("op-1");
        resolver.plan(&id, Plan::Hang);
        resolver.cancel_remote(&id).await.unwrap();
        assert_eq!(statuses(&resolver, &id, 1).await, vec!["Cancelled"]);
        assert!(resolver
            .cancel_remote(&OperationId::new("ghost"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unplanned_is_pending() {
        let resolver = SimulatedResolver::new();
        let raw = resolver.fetch_status(&OperationId::new("x")).await.unwrap();
        assert_eq!(raw.text, "Pending");
    }
}
