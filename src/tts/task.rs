//! Remote synthesis task lifecycle: task identity, wire status parsing and
//! the bounded "poll until terminal" state machine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::interface::TtsError;

/// A synthesis job accepted by the remote provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTask {
    pub task_id: String,
    pub created_at: DateTime<Utc>,
}

impl ProviderTask {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminalStatus {
    Failed,
    Error,
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStatus::Failed => write!(f, "FAILED"),
            TerminalStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Status reported by one poll of the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderTaskStatus {
    Pending,
    Success(String),
    Failed,
    Error,
}

impl ProviderTaskStatus {
    /// Interpret the provider's `status` string. `SUCCESS` without a run id
    /// is not usable yet and counts as pending; unknown strings are pending.
    pub fn from_wire(status: &str, run_id: Option<String>) -> Self {
        match status {
            "SUCCESS" => match run_id {
                Some(id) if !id.is_empty() => ProviderTaskStatus::Success(id),
                _ => ProviderTaskStatus::Pending,
            },
            "FAILED" => ProviderTaskStatus::Failed,
            "ERROR" => ProviderTaskStatus::Error,
            _ => ProviderTaskStatus::Pending,
        }
    }
}

/// Input to the poll state machine: either a parsed status or a failed poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollObservation {
    Status(ProviderTaskStatus),
    TransportError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Polling { attempts_used: u32 },
    Succeeded { run_id: String, attempts_used: u32 },
    Failed { status: TerminalStatus, attempts_used: u32 },
    TimedOut { attempts_used: u32 },
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling { .. })
    }

    pub fn attempts_used(&self) -> u32 {
        match self {
            PollState::Polling { attempts_used }
            | PollState::Succeeded { attempts_used, .. }
            | PollState::Failed { attempts_used, .. }
            | PollState::TimedOut { attempts_used } => *attempts_used,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollTransitionError {
    #[error("poll observed after terminal state {0:?}")]
    AlreadyTerminal(PollState),
}

/// Bounded poll state machine. Each observation consumes one attempt;
/// `FAILED`/`ERROR` end polling immediately, `Success` ends it successfully,
/// anything else keeps polling until the attempt budget runs out.
#[derive(Debug, Clone)]
pub struct TaskPoller {
    max_attempts: u32,
    state: PollState,
    last_transport_error: Option<String>,
}

impl TaskPoller {
    pub fn new(max_attempts: u32) -> Self {
        let state = if max_attempts == 0 {
            PollState::TimedOut { attempts_used: 0 }
        } else {
            PollState::Polling { attempts_used: 0 }
        };
        Self {
            max_attempts,
            state,
            last_transport_error: None,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn last_transport_error(&self) -> Option<&str> {
        self.last_transport_error.as_deref()
    }

    pub fn observe(&mut self, observation: PollObservation) -> Result<&PollState, PollTransitionError> {
        let attempts_used = match &self.state {
            PollState::Polling { attempts_used } => attempts_used + 1,
            terminal => return Err(PollTransitionError::AlreadyTerminal(terminal.clone())),
        };

        self.state = match observation {
            PollObservation::Status(ProviderTaskStatus::Success(run_id)) => PollState::Succeeded {
                run_id,
                attempts_used,
            },
            PollObservation::Status(ProviderTaskStatus::Failed) => PollState::Failed {
                status: TerminalStatus::Failed,
                attempts_used,
            },
            PollObservation::Status(ProviderTaskStatus::Error) => PollState::Failed {
                status: TerminalStatus::Error,
                attempts_used,
            },
            PollObservation::Status(ProviderTaskStatus::Pending) => {
                self.pending_or_timeout(attempts_used)
            }
            PollObservation::TransportError(message) => {
                self.last_transport_error = Some(message);
                self.pending_or_timeout(attempts_used)
            }
        };
        Ok(&self.state)
    }

    fn pending_or_timeout(&self, attempts_used: u32) -> PollState {
        if attempts_used >= self.max_attempts {
            PollState::TimedOut { attempts_used }
        } else {
            PollState::Polling { attempts_used }
        }
    }

    /// Convert a terminal state into the run id or the matching failure.
    pub fn finish(self, task: &ProviderTask) -> Result<String, TtsError> {
        match self.state {
            PollState::Succeeded { run_id, .. } => Ok(run_id),
            PollState::Failed { status, .. } => Err(TtsError::ProviderTerminal {
                task_id: task.task_id.clone(),
                status,
            }),
            PollState::TimedOut { attempts_used } | PollState::Polling { attempts_used } => {
                Err(TtsError::ProviderTimeout {
                    task_id: task.task_id.clone(),
                    attempts: attempts_used,
                })
            }
        }
    }
}
