use std::{
    error::Error,
    fmt::{self, Display},
    io,
    time::Duration,
};

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, FedErr>;

/// The federation's error type.
#[derive(Debug)]
pub enum FedErr {
    /// Invalid hyperparameters, caught eagerly at construction.
    InvalidConfig(String),
    /// A tensor's shape differs between two parameter sets.
    ShapeMismatch {
        tensor: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// A length differs from what the receiving side expects.
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// Malformed training data.
    Data(String),
    /// A worker failed during a round, the whole run is aborted.
    WorkerFailure {
        worker_id: String,
        round: usize,
        cause: Box<FedErr>,
    },
    /// A worker went over the configured privacy budget in a previous round.
    PrivacyExhausted {
        worker_id: String,
        round: usize,
        epsilon: f64,
        limit: f64,
    },
    /// A worker didn't answer within the configured timeout.
    TimedOut(Duration),
    /// A message couldn't be delivered to a worker's actor.
    Mailbox(String),
    /// `run_round` was called on a finished or aborted orchestrator.
    RoundsExhausted { rounds: usize },
    Io(io::Error),
}

impl FedErr {
    /// Returns the innermost error, unwrapping any `WorkerFailure` layers.
    pub fn root_cause(&self) -> &FedErr {
        match self {
            FedErr::WorkerFailure { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl Display for FedErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FedErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            FedErr::ShapeMismatch {
                tensor,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch on tensor {tensor}: got {got:?}, expected {expected:?}"
            ),
            FedErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch on {what}, got {got} and expected {expected}"
            ),
            FedErr::Data(msg) => write!(f, "malformed data: {msg}"),
            FedErr::WorkerFailure {
                worker_id,
                round,
                cause,
            } => write!(f, "worker {worker_id} failed at round {round}: {cause}"),
            FedErr::PrivacyExhausted {
                worker_id,
                round,
                epsilon,
                limit,
            } => write!(
                f,
                "worker {worker_id} refused for round {round}: epsilon {epsilon:.4} exceeds the limit {limit:.4}"
            ),
            FedErr::TimedOut(after) => write!(f, "no answer after {after:?}"),
            FedErr::Mailbox(msg) => write!(f, "mailbox error: {msg}"),
            FedErr::RoundsExhausted { rounds } => {
                write!(f, "no rounds left to schedule after {rounds} round(s)")
            }
            FedErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for FedErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FedErr::WorkerFailure { cause, .. } => Some(cause.as_ref()),
            FedErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FedErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<actix::MailboxError> for FedErr {
    fn from(value: actix::MailboxError) -> Self {
        Self::Mailbox(value.to_string())
    }
}

impl From<ndarray::ShapeError> for FedErr {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::Data(value.to_string())
    }
}

impl From<serde_json::Error> for FedErr {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidConfig(value.to_string())
    }
}
