use shared::types::{ExperimentStatus, ExperimentType};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChaosError>;

/// Everything the translation engine and the tracker can reject.
///
/// Parser and synthesizer failures are turned into structured responses by the
/// orchestrator. Registry and tracker misuse (`DuplicateService`,
/// `UnknownExperiment`, `InvalidTransition`) goes back to the calling
/// collaborator instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChaosError {
    #[error("instruction matches several experiment types equally ({}); add a type hint to the context", join_types(.candidates))]
    AmbiguousIntent { candidates: Vec<ExperimentType> },

    #[error("could not recognize an experiment type in the instruction (expected one of cpu, memory, network, disk, process)")]
    UnrecognizedIntent,

    #[error("target service '{0}' is not registered")]
    TargetNotFound(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid duration '{0}': expected a positive number followed by s, m or h")]
    InvalidDuration(String),

    #[error("experiment type '{0}' is not enabled in the command catalog")]
    UnsupportedExperimentType(ExperimentType),

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("service '{0}' is already registered")]
    DuplicateService(String),

    #[error("unknown experiment '{0}'")]
    UnknownExperiment(String),

    #[error("experiment '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: ExperimentStatus,
        to: ExperimentStatus,
    },

    #[error("experiment tracker is not running")]
    TrackerUnavailable,
}

impl ChaosError {
    /// Stable taxonomy name, used as `error_code` on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ChaosError::AmbiguousIntent { .. } => "AmbiguousIntent",
            ChaosError::UnrecognizedIntent => "UnrecognizedIntent",
            ChaosError::TargetNotFound(_) => "TargetNotFound",
            ChaosError::InvalidParameter { .. } => "InvalidParameter",
            ChaosError::InvalidDuration(_) => "InvalidDuration",
            ChaosError::UnsupportedExperimentType(_) => "UnsupportedExperimentType",
            ChaosError::UnknownService(_) => "UnknownService",
            ChaosError::DuplicateService(_) => "DuplicateService",
            ChaosError::UnknownExperiment(_) => "UnknownExperiment",
            ChaosError::InvalidTransition { .. } => "InvalidTransition",
            ChaosError::TrackerUnavailable => "TrackerUnavailable",
        }
    }

    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        ChaosError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

fn join_types(types: &[ExperimentType]) -> String {
    types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
