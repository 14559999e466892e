//! The user's install decision and the one-shot channel that carries it from
//! the confirmation page to the workflow.

use std::{sync::Mutex, time::Duration};
use tokio::sync::oneshot;

/// Outcome of the consent prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserDecision {
    Unset,
    Granted,
    Denied,
}

impl UserDecision {
    /// Only the literal `"true"` grants; any other value denies.
    pub fn from_choice(choice: Option<&str>) -> Self {
        if choice == Some("true") {
            UserDecision::Granted
        } else {
            UserDecision::Denied
        }
    }

    pub fn is_granted(self) -> bool {
        self == UserDecision::Granted
    }
}

/// Creates the writer/reader halves of a decision channel.
pub fn decision_channel() -> (DecisionSender, DecisionReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        DecisionSender {
            slot: Mutex::new(Some(tx)),
        },
        DecisionReceiver { rx },
    )
}

/// Write side, held by the confirmation server. Only the first record lands.
#[derive(Debug)]
pub struct DecisionSender {
    slot: Mutex<Option<oneshot::Sender<UserDecision>>>,
}

impl DecisionSender {
    /// Returns false when a decision was already recorded or the reader is gone.
    pub fn record(&self, decision: UserDecision) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        }
    }
}

/// Read side, owned by the workflow.
#[derive(Debug)]
pub struct DecisionReceiver {
    rx: oneshot::Receiver<UserDecision>,
}

impl DecisionReceiver {
    /// Blocks until a decision arrives or `timeout` elapses. A timeout or a
    /// dropped sender yields [`UserDecision::Unset`].
    pub async fn wait(self, timeout: Duration) -> UserDecision {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) | Err(_) => UserDecision::Unset,
        }
    }
}
