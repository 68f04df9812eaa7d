pub mod agent;
pub mod error;
pub mod server;
pub mod policies;
pub mod metrics;
pub mod simulation;

pub use agent::Agent;
pub use error::ConfigError;
pub use server::{ServerRegistry, ServerSpec};
pub use policies::{Distribution, Policy};
pub use simulation::{Simulation, SimConfig};
pub use metrics::LatencyHistory;

pub mod prelude {
    pub use crate::agent::Agent;
    pub use crate::error::ConfigError;
    pub use crate::server::{ServerRegistry, ServerSpec};
    pub use crate::policies::{Distribution, InverseLatency, Policy, PolicyRegistry, Wardrop, WardropParams};
    pub use crate::simulation::{CapacityChange, DemandPattern, Disturbance, Simulation, SimConfig};
    pub use crate::metrics::{LatencyHistory, LatencySample};
}
