use ulid::Ulid;

/// A collaborator (promo, notification, job queue) call that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyError {
    pub service: &'static str,
    pub message: String,
}

impl DependencyError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DependencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.service, self.message)
    }
}

impl std::error::Error for DependencyError {}

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Overlaps the committed schedule with this id on the same studio.
    Conflict(Ulid),
    CapacityExceeded {
        requested: usize,
        capacity: u32,
    },
    SeatConflict(u32),
    InvalidSeat(u32),
    PromoInvalid(String),
    /// The owner already has this transaction awaiting payment.
    PendingExists(Ulid),
    AlreadyFinalized(Ulid),
    DependencyFailure(DependencyError),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict(id) => write!(f, "conflict with schedule: {id}"),
            EngineError::CapacityExceeded {
                requested,
                capacity,
            } => {
                write!(f, "{requested} seats requested, studio holds {capacity}")
            }
            EngineError::SeatConflict(seat) => write!(f, "seat {seat} is already booked"),
            EngineError::InvalidSeat(seat) => write!(f, "invalid seat number: {seat}"),
            EngineError::PromoInvalid(msg) => write!(f, "invalid promo: {msg}"),
            EngineError::PendingExists(id) => {
                write!(f, "transaction {id} is still awaiting payment")
            }
            EngineError::AlreadyFinalized(id) => {
                write!(f, "transaction {id} already succeeded, failed or timed out")
            }
            EngineError::DependencyFailure(e) => write!(f, "dependency failure: {e}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::DependencyFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DependencyError> for EngineError {
    fn from(e: DependencyError) -> Self {
        EngineError::DependencyFailure(e)
    }
}
