// Pairwise flow exchange towards a Wardrop equilibrium.
//
// Mass moves from server i to server j at rate sigma * x_i whenever i is slower
// than j by more than epsilon and i still holds more than delta. Too large a
// sigma for the chosen dt makes the rates oscillate around the equilibrium.

use super::{Distribution, Policy};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardropParams {
    /// Integration step.
    pub dt: f64,
    /// Migration speed.
    pub sigma: f64,
    /// Dead zone: latency gaps at or below this are treated as equal.
    pub epsilon: f64,
    /// Mass floor a server must exceed before it may shed flow.
    pub delta: f64,
    /// Starting rates, normalized onto the simplex. Uniform when absent.
    pub initial_rates: Option<Vec<f64>>,
}

impl Default for WardropParams {
    fn default() -> Self {
        Self {
            dt: 0.01,
            sigma: 0.05,
            epsilon: 1e-3,
            delta: 1e-3,
            initial_rates: None,
        }
    }
}

impl WardropParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("dt", self.dt),
            ("sigma", self.sigma),
            ("epsilon", self.epsilon),
            ("delta", self.delta),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Wardrop {
    rates: Vec<f64>,
    dt: f64,
    sigma: f64,
    epsilon: f64,
    delta: f64,
}

impl Wardrop {
    pub fn new(num_servers: usize, params: &WardropParams) -> Result<Self, ConfigError> {
        params.validate()?;
        if num_servers == 0 {
            return Err(ConfigError::NoServers);
        }

        let rates = match &params.initial_rates {
            Some(rates) => normalized_rates(rates, num_servers)?,
            None => vec![1.0 / num_servers as f64; num_servers],
        };

        Ok(Self {
            rates,
            dt: params.dt,
            sigma: params.sigma,
            epsilon: params.epsilon,
            delta: params.delta,
        })
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    fn transfer(&self, x_i: f64, l_i: f64, l_j: f64) -> f64 {
        if l_i - l_j > self.epsilon && x_i > self.delta {
            self.sigma * x_i
        } else {
            0.0
        }
    }

    /// Net inflow per server for the given latencies, before it is scaled by
    /// `dt` and renormalized. All zeros at a fixed point.
    ///
    /// Every dx is taken from the rates at the start of the call, not swept in place.
    pub fn flow_deltas(&self, latencies: &[f64]) -> Vec<f64> {
        debug_assert_eq!(latencies.len(), self.rates.len());
        let n = self.rates.len();

        (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| j != i)
                    .map(|j| {
                        let inflow = self.transfer(self.rates[j], latencies[j], latencies[i]);
                        let outflow = self.transfer(self.rates[i], latencies[i], latencies[j]);
                        inflow - outflow
                    })
                    .sum()
            })
            .collect()
    }
}

fn normalized_rates(rates: &[f64], num_servers: usize) -> Result<Vec<f64>, ConfigError> {
    if rates.len() != num_servers {
        return Err(ConfigError::InvalidInitialRates(format!(
            "expected {} rates, got {}",
            num_servers,
            rates.len()
        )));
    }
    if rates.iter().any(|r| !r.is_finite() || *r < 0.0) {
        return Err(ConfigError::InvalidInitialRates(
            "rates must be finite and >= 0".into(),
        ));
    }

    let total: f64 = rates.iter().sum();
    if total <= 0.0 {
        return Err(ConfigError::InvalidInitialRates(
            "rates must not all be zero".into(),
        ));
    }
    Ok(rates.iter().map(|r| r / total).collect())
}

impl Policy for Wardrop {
    fn balance(&mut self, latencies: &[f64], distribution: &mut Distribution) {
        let deltas = self.flow_deltas(latencies);

        for (x, dx) in self.rates.iter_mut().zip(deltas) {
            // Clamp only guards against float error, the delta floor keeps x >= 0.
            *x = (*x + dx * self.dt).max(0.0);
        }

        let total: f64 = self.rates.iter().sum();
        if total > 0.0 {
            for x in &mut self.rates {
                *x /= total;
            }
        } else {
            let uniform = 1.0 / self.rates.len() as f64;
            self.rates.fill(uniform);
        }

        distribution.0.clone_from(&self.rates);
    }

    fn name(&self) -> &str {
        "Wardrop"
    }

    fn initial_distribution(&self, _num_servers: usize) -> Distribution {
        Distribution(self.rates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_rates(rates: Vec<f64>) -> Wardrop {
        let params = WardropParams {
            initial_rates: Some(rates.clone()),
            ..WardropParams::default()
        };
        Wardrop::new(rates.len(), &params).unwrap()
    }

    #[test]
    fn single_step_moves_mass_to_the_faster_server() {
        let mut policy = with_rates(vec![0.5, 0.5]);
        let mut dist = policy.initial_distribution(2);

        policy.balance(&[1.0, 2.0], &mut dist);

        assert!((dist.weight(0) - 0.50025).abs() < 1e-12);
        assert!((dist.weight(1) - 0.49975).abs() < 1e-12);
        assert_eq!(dist.weights(), policy.rates());
    }

    #[test]
    fn flow_leaves_slow_server_and_reaches_fast_one() {
        let policy = with_rates(vec![0.2, 0.3, 0.5]);

        let deltas = policy.flow_deltas(&[1.0, 1.0, 3.0]);

        assert!(deltas[2] < 0.0);
        assert!(deltas[0] > 0.0);
        assert!(deltas[1] > 0.0);
        assert!(deltas.iter().sum::<f64>().abs() < 1e-12);
    }

    #[test]
    fn gaps_inside_dead_zone_are_a_fixed_point() {
        let mut policy = with_rates(vec![0.25, 0.25, 0.5]);
        let latencies = [1.0, 1.0002, 1.0004];

        assert!(policy.flow_deltas(&latencies).iter().all(|&dx| dx == 0.0));

        let mut dist = policy.initial_distribution(3);
        policy.balance(&latencies, &mut dist);
        assert_eq!(dist.weights(), &[0.25, 0.25, 0.5]);
    }

    #[test]
    fn server_at_mass_floor_does_not_shed_flow() {
        let policy = with_rates(vec![0.0005, 0.9995]);

        let deltas = policy.flow_deltas(&[5.0, 1.0]);

        assert_eq!(deltas, vec![0.0, 0.0]);
    }

    #[test]
    fn collapsed_mass_falls_back_to_uniform() {
        let mut policy = Wardrop::new(3, &WardropParams::default()).unwrap();
        policy.rates = vec![0.0; 3];
        let mut dist = Distribution::from_weights(vec![0.0; 3]);

        policy.balance(&[1.0, 2.0, 3.0], &mut dist);

        for w in dist.weights() {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn rejects_invalid_parameters_and_rates() {
        for (name, params) in [
            ("dt", WardropParams { dt: -1.0, ..Default::default() }),
            ("epsilon", WardropParams { epsilon: f64::NAN, ..Default::default() }),
            ("delta", WardropParams { delta: -1e-3, ..Default::default() }),
        ] {
            match Wardrop::new(2, &params).unwrap_err() {
                ConfigError::InvalidParameter { name: got, .. } => assert_eq!(got, name),
                other => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(
            Wardrop::new(0, &WardropParams::default()).unwrap_err(),
            ConfigError::NoServers
        );

        for rates in [vec![1.0], vec![0.0, 0.0], vec![-1.0, 2.0]] {
            let params = WardropParams {
                initial_rates: Some(rates),
                ..Default::default()
            };
            assert!(matches!(
                Wardrop::new(2, &params).unwrap_err(),
                ConfigError::InvalidInitialRates(_)
            ));
        }
    }

    #[test]
    fn initial_rates_are_normalized() {
        let policy = with_rates(vec![3.0, 1.0]);
        assert_eq!(policy.rates(), &[0.75, 0.25]);
    }

    #[test]
    fn repeated_steps_drain_the_slow_server() {
        let mut policy = Wardrop::new(2, &WardropParams::default()).unwrap();
        let mut dist = policy.initial_distribution(2);

        for _ in 0..100 {
            policy.balance(&[1.0, 2.0], &mut dist);
            assert!(dist.is_simplex(1e-9));
        }

        assert!(dist.weight(0) > 0.52);
        assert!(dist.weight(1) < 0.48);
    }
}
