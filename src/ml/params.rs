use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Hyperparameters of one learning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningParameters {
    /// Visit count at which the learning rate reaches its end value
    pub learning_rate_max_count: u32,
    pub learning_rate_start: f64,
    pub learning_rate_end: f64,
    pub learning_rate_slope: f64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    pub epsilon_slope: f64,
    pub discount_factor: f64,
    pub seed: u64,
    /// Tolerance under which two action values count as tied
    pub error: f64,
    /// Visits before an action's value is trusted over `r_plus`
    pub ne: u32,
    /// Optimistic value of under-explored actions
    pub r_plus: f64,
    /// Episodes started from a uniformly random state
    pub iterations: usize,
    /// Episodes started from the initial state, run after the random ones
    pub initial_state_iterations: usize,
    /// Cap on transitions per episode; unset runs to a terminal or dead end
    pub max_steps_per_episode: Option<usize>,
    pub additional_information: String,
    pub save_q: bool,
    pub log_every: usize,
}

impl Default for LearningParameters {
    fn default() -> Self {
        Self {
            learning_rate_max_count: 1,
            learning_rate_start: 0.1,
            learning_rate_end: 0.1,
            learning_rate_slope: 1.0,
            epsilon_start: 0.3,
            epsilon_end: 0.0,
            epsilon_slope: 1.0,
            discount_factor: 1.0,
            seed: 0,
            error: 1e-9,
            ne: 5,
            r_plus: 20.0,
            iterations: 100_000,
            initial_state_iterations: 10_000,
            max_steps_per_episode: None,
            additional_information: String::new(),
            save_q: true,
            log_every: 10_000,
        }
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::config(field, format!("must be in [0, 1], got {}", value)));
    }
    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(Error::config(field, format!("must be a finite value > 0, got {}", value)));
    }
    Ok(())
}

impl LearningParameters {
    /// Constant learning rate and exploration, as used by the grid fixture.
    pub fn constant(alpha: f64, gamma: f64, epsilon: f64) -> Self {
        Self {
            learning_rate_start: alpha,
            learning_rate_end: alpha,
            epsilon_start: epsilon,
            epsilon_end: epsilon,
            discount_factor: gamma,
            ..Self::default()
        }
    }

    pub fn total_episodes(&self) -> usize {
        self.iterations + self.initial_state_iterations
    }

    /// Rejects out-of-range values. Nothing is clamped.
    pub fn validate(&self) -> Result<()> {
        if self.learning_rate_max_count == 0 {
            return Err(Error::config("learning_rate_max_count", "must be greater than 0"));
        }
        unit_interval("learning_rate_start", self.learning_rate_start)?;
        unit_interval("learning_rate_end", self.learning_rate_end)?;
        positive("learning_rate_slope", self.learning_rate_slope)?;
        unit_interval("epsilon_start", self.epsilon_start)?;
        unit_interval("epsilon_end", self.epsilon_end)?;
        positive("epsilon_slope", self.epsilon_slope)?;
        unit_interval("discount_factor", self.discount_factor)?;
        positive("error", self.error)?;
        if self.ne == 0 {
            return Err(Error::config("ne", "must be greater than 0"));
        }
        if !self.r_plus.is_finite() {
            return Err(Error::config("r_plus", format!("must be finite, got {}", self.r_plus)));
        }
        if self.max_steps_per_episode == Some(0) {
            return Err(Error::config("max_steps_per_episode", "must be greater than 0 when set"));
        }
        Ok(())
    }
}
