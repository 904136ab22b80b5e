//! Initialisation state and completion signal
//!
//! The context publishes an unresolved [`InitSignal`] before it starts any
//! asynchronous work and settles that same signal once the work finishes, so
//! an observer can never find the signal missing while initialisation runs.

use tokio::sync::watch;

use crate::error::FilterError;

/// Context initialisation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    NotStarted,
    Initializing,
    Completed,
    Faulted,
}

impl InitPhase {
    pub fn has_started(self) -> bool {
        self != Self::NotStarted
    }
}

impl std::fmt::Display for InitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Completed => write!(f, "Completed"),
            Self::Faulted => write!(f, "Faulted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Settlement {
    Pending,
    Succeeded,
    Failed(String),
}

/// Cloneable view of the context's aggregate initialisation outcome
#[derive(Debug, Clone)]
pub struct InitSignal {
    rx: watch::Receiver<Settlement>,
}

/// Settles the signal it was created with; consumed on use
pub(crate) struct SignalResolver {
    tx: watch::Sender<Settlement>,
}

impl InitSignal {
    pub(crate) fn pending() -> (SignalResolver, InitSignal) {
        let (tx, rx) = watch::channel(Settlement::Pending);
        (SignalResolver { tx }, InitSignal { rx })
    }

    pub fn is_settled(&self) -> bool {
        *self.rx.borrow() != Settlement::Pending
    }

    /// The outcome if settled, without waiting
    pub fn outcome(&self) -> Option<Result<(), FilterError>> {
        match &*self.rx.borrow() {
            Settlement::Pending => None,
            Settlement::Succeeded => Some(Ok(())),
            Settlement::Failed(reason) => Some(Err(FilterError::Faulted { reason: reason.clone() })),
        }
    }

    /// Wait until the signal settles
    pub async fn wait(&self) -> Result<(), FilterError> {
        let mut rx = self.rx.clone();
        let settled = match rx.wait_for(|s| *s != Settlement::Pending).await {
            Ok(state) => state.clone(),
            Err(_) => Settlement::Failed("initialisation was abandoned before it finished".to_string()),
        };

        match settled {
            Settlement::Succeeded => Ok(()),
            Settlement::Failed(reason) => Err(FilterError::Faulted { reason }),
            Settlement::Pending => Err(FilterError::Faulted {
                reason: "initialisation signal closed while pending".to_string(),
            }),
        }
    }
}

impl SignalResolver {
    pub(crate) fn settle(self, outcome: &Result<(), FilterError>) {
        let settlement = match outcome {
            Ok(()) => Settlement::Succeeded,
            Err(FilterError::Faulted { reason }) => Settlement::Failed(reason.clone()),
            Err(other) => Settlement::Failed(other.to_string()),
        };
        self.tx.send_replace(settlement);
    }
}
