use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// A service the control plane knows how to address.
/// Immutable once registered; the name is the registry key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Unique service name, e.g. "web-server"
    pub name: String,

    /// Host the service runs on
    pub host: String,

    /// Service port
    pub port: u16,

    /// Process name backing the service, e.g. "nginx"
    pub process: String,
}

/// The closed set of fault kinds the control plane can synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentType {
    Cpu,
    Memory,
    Network,
    Disk,
    Process,
}

impl ExperimentType {
    pub const ALL: [ExperimentType; 5] = [
        ExperimentType::Cpu,
        ExperimentType::Memory,
        ExperimentType::Network,
        ExperimentType::Disk,
        ExperimentType::Process,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentType::Cpu => "cpu",
            ExperimentType::Memory => "memory",
            ExperimentType::Network => "network",
            ExperimentType::Disk => "disk",
            ExperimentType::Process => "process",
        }
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(ExperimentType::Cpu),
            "memory" | "mem" => Ok(ExperimentType::Memory),
            "network" | "net" => Ok(ExperimentType::Network),
            "disk" => Ok(ExperimentType::Disk),
            "process" | "proc" => Ok(ExperimentType::Process),
            other => Err(format!("unknown experiment type: {}", other)),
        }
    }
}

/// Lifecycle status of a tracked experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExperimentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl ExperimentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExperimentStatus::Completed | ExperimentStatus::Failed | ExperimentStatus::Aborted
        )
    }

    /// Pending -> Running -> {Completed, Failed}, and Pending|Running -> Aborted.
    pub fn can_transition_to(&self, next: ExperimentStatus) -> bool {
        use ExperimentStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Pending, Aborted)
                | (Running, Aborted)
        )
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExperimentStatus::Pending => "Pending",
            ExperimentStatus::Running => "Running",
            ExperimentStatus::Completed => "Completed",
            ExperimentStatus::Failed => "Failed",
            ExperimentStatus::Aborted => "Aborted",
        };
        f.write_str(s)
    }
}

/// One synthesized fault-injection command and its lifecycle.
/// History is append-only; only `status` and `updated_at` ever change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    /// Generated id, e.g. "exp-000001"
    pub id: String,

    /// The instruction the experiment was synthesized from
    pub description: String,

    /// Command line handed to the external fault-injection agent
    pub command: String,

    pub experiment_type: ExperimentType,

    /// Service, process or host the fault is aimed at
    pub target: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub status: ExperimentStatus,
}

/// Inbound instruction request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpRequest {
    pub instruction: String,

    /// Free-form hints, e.g. {"experiment_type": "cpu", "target": "web-server"}
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub context: serde_json::Map<String, serde_json::Value>,
}

/// Batch of independent instruction requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpBatchRequest {
    pub requests: Vec<McpRequest>,
}

/// Response to an instruction. Exactly one of `command` and `error` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpResponse {
    pub explanation: String,

    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Stable error kind name, e.g. "UnrecognizedIntent"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl McpResponse {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Status report sent by the execution monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: ExperimentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_edges() {
        use ExperimentStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Aborted));
        assert!(Running.can_transition_to(Aborted));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Aborted.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [ExperimentStatus::Completed, ExperimentStatus::Failed, ExperimentStatus::Aborted] {
            assert!(from.is_terminal());
            for to in [
                ExperimentStatus::Pending,
                ExperimentStatus::Running,
                ExperimentStatus::Completed,
                ExperimentStatus::Failed,
                ExperimentStatus::Aborted,
            ] {
                assert!(!from.can_transition_to(to), "{} -> {} should be rejected", from, to);
            }
        }
    }

    #[test]
    fn test_experiment_type_parsing() {
        assert_eq!("CPU".parse::<ExperimentType>().unwrap(), ExperimentType::Cpu);
        assert_eq!("mem".parse::<ExperimentType>().unwrap(), ExperimentType::Memory);
        assert!("gpu".parse::<ExperimentType>().is_err());
        for ty in ExperimentType::ALL {
            assert_eq!(ty.as_str().parse::<ExperimentType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_response_omits_empty_fields() {
        let resp = McpResponse {
            explanation: "ok".to_string(),
            command: "blade create cpu load --cpu-percent 50 --timeout 30s".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("error").is_none());
        assert!(json.get("warnings").is_none());
        assert_eq!(json["command"], resp.command);
    }
}
