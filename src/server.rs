// Servers are addressed by their position in the registry everywhere in the loop,
// ids only matter for configuration and output.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    pub id: String,
    pub capacity: f64,
}

impl ServerSpec {
    pub fn new(id: impl Into<String>, capacity: f64) -> Self {
        Self { id: id.into(), capacity }
    }
}

#[derive(Debug, Clone)]
pub struct Server {
    id: String,
    capacity: f64,
    aggregate_load: f64,
}

impl Server {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn aggregate_load(&self) -> f64 {
        self.aggregate_load
    }

    /// Load over capacity. Capacity is validated positive on construction.
    pub fn latency(&self) -> f64 {
        self.aggregate_load / self.capacity
    }
}

#[derive(Debug, Clone)]
pub struct ServerRegistry {
    servers: Vec<Server>,
}

impl ServerRegistry {
    pub fn new(specs: &[ServerSpec]) -> Result<Self, ConfigError> {
        if specs.is_empty() {
            return Err(ConfigError::NoServers);
        }

        let mut seen = HashSet::new();
        let mut servers = Vec::with_capacity(specs.len());

        for spec in specs {
            if !seen.insert(spec.id.as_str()) {
                return Err(ConfigError::DuplicateServer(spec.id.clone()));
            }
            if !spec.capacity.is_finite() || spec.capacity <= 0.0 {
                return Err(ConfigError::InvalidCapacity {
                    id: spec.id.clone(),
                    capacity: spec.capacity,
                });
            }
            servers.push(Server {
                id: spec.id.clone(),
                capacity: spec.capacity,
                aggregate_load: 0.0,
            });
        }

        Ok(Self { servers })
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn ids(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.id.clone()).collect()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.servers.iter().position(|s| s.id == id)
    }

    /// Replaces every server's aggregate load with the totals of a finished
    /// contribution phase.
    pub fn set_loads(&mut self, loads: &[f64]) {
        debug_assert_eq!(loads.len(), self.servers.len());
        for (server, &load) in self.servers.iter_mut().zip(loads) {
            server.aggregate_load = load;
        }
    }

    pub fn set_capacity(&mut self, index: usize, capacity: f64) {
        self.servers[index].capacity = capacity;
    }

    pub fn latencies(&self) -> Vec<f64> {
        self.servers.iter().map(Server::latency).collect()
    }

    pub fn loads(&self) -> Vec<f64> {
        self.servers.iter().map(|s| s.aggregate_load).collect()
    }

    pub fn capacities(&self) -> Vec<f64> {
        self.servers.iter().map(|s| s.capacity).collect()
    }
}
