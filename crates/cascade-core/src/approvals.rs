//! # Approval Manager
//!
//! The only state shared across workflow runs: a mutex-guarded map from
//! `workflow_uid` to its pending [`ApprovalTicket`]. When a step suspends,
//! the engine creates a ticket and awaits the single-shot resume channel
//! registered with it; an external submission or the expiry ticker resolves
//! the ticket and wakes the engine exactly once.
//!
//! `submit` is idempotent per uid: once a ticket is terminal, further
//! submissions return the stored outcome unchanged.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Lifecycle of an approval ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalState {
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

/// One suspended approval gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalTicket {
    pub uid: Uuid,
    pub workflow_id: String,
    pub step_id: String,
    pub form_schema: Value,
    pub assignees: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub state: ApprovalState,
    /// The stored submission once the ticket is terminal.
    pub result: Option<Value>,
}

/// What the suspended engine is woken with.
#[derive(Debug)]
pub enum ApprovalOutcome {
    Submitted(Value),
    Expired,
}

/// What a submitter gets back.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The submission resolved the ticket.
    Accepted,
    /// The ticket was already approved or rejected; the stored result is
    /// returned unchanged.
    AlreadyResolved {
        state: ApprovalState,
        result: Option<Value>,
    },
    /// The ticket expired before the submission arrived.
    Expired,
}

struct Entry {
    ticket: ApprovalTicket,
    waker: Option<oneshot::Sender<ApprovalOutcome>>,
}

/// UID-indexed pending form store. Cheap to share behind an `Arc`.
#[derive(Default)]
pub struct ApprovalManager {
    tickets: Mutex<HashMap<Uuid, Entry>>,
}

impl ApprovalManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a suspension for `uid` and returns the external form URL
    /// plus the resume channel the engine awaits.
    ///
    /// A uid with a ticket still pending cannot suspend again; a terminal
    /// ticket from an earlier approval step in the same run is replaced.
    pub fn create(
        &self,
        uid: Uuid,
        workflow_id: impl Into<String>,
        step_id: impl Into<String>,
        form_schema: Value,
        assignees: Vec<String>,
        timeout_minutes: Option<f64>,
    ) -> Result<(String, oneshot::Receiver<ApprovalOutcome>)> {
        let mut tickets = self.tickets.lock().unwrap();
        if let Some(existing) = tickets.get(&uid) {
            if existing.ticket.state == ApprovalState::Pending {
                return Err(EngineError::validation(format!(
                    "workflow {} already has a pending approval",
                    uid
                )));
            }
        }
        let created_at = Utc::now();
        let expires_at = timeout_minutes
            .map(|minutes| created_at + Duration::milliseconds((minutes * 60_000.0) as i64));
        let (sender, receiver) = oneshot::channel();
        let step_id = step_id.into();
        let ticket = ApprovalTicket {
            uid,
            workflow_id: workflow_id.into(),
            step_id: step_id.clone(),
            form_schema,
            assignees,
            created_at,
            expires_at,
            state: ApprovalState::Pending,
            result: None,
        };
        info!(workflow_uid = %uid, step_id = %step_id, "approval ticket created");
        tickets.insert(
            uid,
            Entry {
                ticket,
                waker: Some(sender),
            },
        );
        Ok((format!("/webform/{}", uid), receiver))
    }

    /// Resolves the ticket with a form submission.
    ///
    /// A submission carrying `approved: false` marks the ticket rejected;
    /// everything else approves. The suspended engine resumes with the
    /// submission either way — interpretation belongs to the workflow.
    pub fn submit(&self, uid: Uuid, submission: Value) -> Result<SubmitOutcome> {
        let mut tickets = self.tickets.lock().unwrap();
        let entry = tickets.get_mut(&uid).ok_or_else(|| {
            EngineError::resolution(uid.to_string(), "no approval ticket for this workflow")
        })?;
        match entry.ticket.state {
            ApprovalState::Expired => Ok(SubmitOutcome::Expired),
            ApprovalState::Approved | ApprovalState::Rejected => {
                Ok(SubmitOutcome::AlreadyResolved {
                    state: entry.ticket.state,
                    result: entry.ticket.result.clone(),
                })
            }
            ApprovalState::Pending => {
                let rejected = submission
                    .get("approved")
                    .and_then(Value::as_bool)
                    .is_some_and(|approved| !approved);
                entry.ticket.state = if rejected {
                    ApprovalState::Rejected
                } else {
                    ApprovalState::Approved
                };
                entry.ticket.result = Some(submission.clone());
                if let Some(waker) = entry.waker.take() {
                    // The engine may have been dropped; resolution stands
                    // either way.
                    let _ = waker.send(ApprovalOutcome::Submitted(submission));
                }
                info!(workflow_uid = %uid, state = ?entry.ticket.state, "approval resolved");
                Ok(SubmitOutcome::Accepted)
            }
        }
    }

    /// Snapshot of the ticket for `uid`.
    pub fn status(&self, uid: Uuid) -> Option<ApprovalTicket> {
        self.tickets
            .lock()
            .unwrap()
            .get(&uid)
            .map(|entry| entry.ticket.clone())
    }

    /// The form definition published at the ticket's URL.
    pub fn form_schema(&self, uid: Uuid) -> Result<Value> {
        let tickets = self.tickets.lock().unwrap();
        let entry = tickets.get(&uid).ok_or_else(|| {
            EngineError::resolution(uid.to_string(), "no approval ticket for this workflow")
        })?;
        if entry.ticket.state == ApprovalState::Expired {
            return Err(EngineError::Timeout {
                message: format!("approval for {} expired", uid),
            });
        }
        Ok(entry.ticket.form_schema.clone())
    }

    /// Expires every pending ticket past its deadline, waking its engine
    /// with [`ApprovalOutcome::Expired`]. Returns how many expired.
    pub fn expire_due(&self) -> usize {
        let now = Utc::now();
        let mut expired = 0;
        let mut tickets = self.tickets.lock().unwrap();
        for entry in tickets.values_mut() {
            if entry.ticket.state != ApprovalState::Pending {
                continue;
            }
            let Some(expires_at) = entry.ticket.expires_at else {
                continue;
            };
            if expires_at <= now {
                entry.ticket.state = ApprovalState::Expired;
                if let Some(waker) = entry.waker.take() {
                    let _ = waker.send(ApprovalOutcome::Expired);
                }
                debug!(workflow_uid = %entry.ticket.uid, "approval ticket expired");
                expired += 1;
            }
        }
        expired
    }
}
