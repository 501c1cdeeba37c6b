/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Executable of the external fault-injection agent
pub const AGENT_BINARY: &str = "blade";

/// Timeout used when an instruction names no duration
pub const DEFAULT_TIMEOUT: &str = "30s";

/// Durations above this many seconds are accepted but flagged
pub const LONG_TIMEOUT_SECS: u64 = 3600;

/// Context keys the parser understands
pub const CTX_EXPERIMENT_TYPE: &str = "experiment_type";
pub const CTX_TYPE: &str = "type";
pub const CTX_TARGET: &str = "target";
pub const CTX_SERVICE: &str = "service";
pub const CTX_DURATION: &str = "duration";
