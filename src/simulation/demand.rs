use crate::error::ConfigError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DemandPattern {
    Constant { rate: f64 },
    /// Each agent draws its rate once from `[min, max]`.
    Uniform { min: f64, max: f64 },
    /// Like `Uniform`, plus Gaussian noise on every step.
    Noisy { min: f64, max: f64, std_dev: f64 },
}

impl Default for DemandPattern {
    fn default() -> Self {
        DemandPattern::Uniform { min: 10.0, max: 50.0 }
    }
}

impl DemandPattern {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            DemandPattern::Constant { rate } => check_rate("rate", rate),
            DemandPattern::Uniform { min, max } => check_range(min, max),
            DemandPattern::Noisy { min, max, std_dev } => {
                check_range(min, max)?;
                check_rate("std_dev", std_dev)
            }
        }
    }
}

fn check_rate(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidDemand(format!(
            "{} must be finite and >= 0, got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_range(min: f64, max: f64) -> Result<(), ConfigError> {
    check_rate("min", min)?;
    check_rate("max", max)?;
    if min > max {
        return Err(ConfigError::InvalidDemand(format!(
            "min {} is greater than max {}",
            min, max
        )));
    }
    Ok(())
}

/// Seeded generator behind every random demand figure of a run.
#[derive(Debug)]
pub struct DemandSource {
    pattern: DemandPattern,
    noise: Option<Normal<f64>>,
    rng: StdRng,
}

impl DemandSource {
    pub fn new(pattern: DemandPattern, seed: Option<u64>) -> Result<Self, ConfigError> {
        pattern.validate()?;

        let noise = match pattern {
            DemandPattern::Noisy { std_dev, .. } => Some(
                Normal::new(0.0, std_dev).map_err(|e| ConfigError::InvalidDemand(e.to_string()))?,
            ),
            _ => None,
        };

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self { pattern, noise, rng })
    }

    /// Fixed rate of a newly created agent.
    pub fn base_rate(&mut self) -> f64 {
        match self.pattern {
            DemandPattern::Constant { rate } => rate,
            DemandPattern::Uniform { min, max } | DemandPattern::Noisy { min, max, .. } => {
                self.rng.gen_range(min..=max)
            }
        }
    }

    /// Demand an agent with the given base rate sends during one step.
    pub fn step_demand(&mut self, base_rate: f64) -> f64 {
        match &self.noise {
            Some(noise) => (base_rate + noise.sample(&mut self.rng)).max(0.0),
            None => base_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_rates_stay_in_range_and_are_reproducible() {
        let pattern = DemandPattern::Uniform { min: 10.0, max: 50.0 };
        let mut a = DemandSource::new(pattern.clone(), Some(7)).unwrap();
        let mut b = DemandSource::new(pattern, Some(7)).unwrap();

        for _ in 0..100 {
            let rate = a.base_rate();
            assert!((10.0..=50.0).contains(&rate));
            assert_eq!(rate, b.base_rate());
            assert_eq!(a.step_demand(rate), rate);
        }
    }

    #[test]
    fn noisy_demand_never_goes_negative() {
        let pattern = DemandPattern::Noisy { min: 0.0, max: 1.0, std_dev: 5.0 };
        let mut source = DemandSource::new(pattern, Some(1)).unwrap();

        for _ in 0..1000 {
            assert!(source.step_demand(0.5) >= 0.0);
        }
    }

    #[test]
    fn rejects_negative_or_inverted_demand() {
        for pattern in [
            DemandPattern::Constant { rate: -1.0 },
            DemandPattern::Uniform { min: 5.0, max: 1.0 },
            DemandPattern::Uniform { min: -5.0, max: 1.0 },
            DemandPattern::Noisy { min: 1.0, max: 2.0, std_dev: -0.1 },
            DemandPattern::Constant { rate: f64::NAN },
        ] {
            assert!(matches!(
                DemandSource::new(pattern, Some(0)).unwrap_err(),
                ConfigError::InvalidDemand(_)
            ));
        }
    }
}
