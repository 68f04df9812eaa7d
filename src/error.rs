use thiserror::Error;

/// Everything that can be wrong with a run before its first step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("at least one server is required")]
    NoServers,

    #[error("server id `{0}` is listed more than once")]
    DuplicateServer(String),

    #[error("server `{id}` has invalid capacity {capacity} (must be finite and > 0)")]
    InvalidCapacity { id: String, capacity: f64 },

    #[error("invalid demand: {0}")]
    InvalidDemand(String),

    #[error("policy parameter `{name}` must be finite and >= 0, got {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("initial rates are invalid: {0}")]
    InvalidInitialRates(String),

    #[error("unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("disturbance at step {step} targets unknown server `{server}`")]
    UnknownServer { step: usize, server: String },

    #[error("disturbance at step {step} on `{server}` is invalid: {reason}")]
    InvalidDisturbance { step: usize, server: String, reason: String },

    #[error("more than one disturbance scheduled for server `{server}` at step {step}")]
    DuplicateDisturbance { step: usize, server: String },
}
