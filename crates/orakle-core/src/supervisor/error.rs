use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("port for service {0:?} is already in use")]
    PortInUse(super::ServiceId),

    #[error("failed to spawn service {0:?}: {1}")]
    SpawnFailed(super::ServiceId, String),

    #[error("service {0:?} did not become healthy within its startup timeout")]
    StartupTimedOut(super::ServiceId),

    #[error("service {0:?} is not registered with this supervisor")]
    UnknownService(super::ServiceId),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
