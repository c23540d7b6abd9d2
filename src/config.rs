use std::path::Path;

use serde::{ Serialize, Deserialize };

use crate::{
  error::{ Error, Result },
  tensor::Tensor,
};


/// Which engine drives training.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  /// Record every step on a fresh [GradientTape](crate::GradientTape).
  Eager,
  /// Build the model once and run it in a [Session](crate::Session).
  Graph,
}

/// How many samples contribute to each parameter update.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
  /// One update per step, using the whole training set.
  FullBatch,
  /// One update per sample, every step visits each sample once.
  PerSample,
}

/// Starting values for the weight and bias.

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Init {
  Fixed { weight: f32, bias: f32 },
  Random,
}

impl Init {
  /// Produce a `(weight, bias)` pair.

  pub fn values(&self) -> (f32, f32) {
    match *self {
      Self::Fixed { weight, bias } => (weight, bias),
      Self::Random => {
        let sample = Tensor::<f32>::randn(&[2]);
        (sample.raw()[0], sample.raw()[1])
      },
    }
  }
}


/// Hyperparameters of a training run.
///
/// Every field has a default, so a JSON document only needs to name
/// what it changes:
///
/// ```
/// use microflow::config::{ Config, Mode };
///
/// let config = Config::from_json(r#"{ "mode": "graph", "training_steps": 50 }"#).unwrap();
/// assert_eq!(config.mode, Mode::Graph);
/// assert_eq!(config.display_step, 100);
/// ```

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub mode: Mode,
  pub training_steps: usize,
  pub learning_rate: f32,
  pub display_step: usize,
  pub granularity: Granularity,
  pub init: Init,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      mode: Mode::Eager,
      training_steps: 1000,
      learning_rate: 0.01,
      display_step: 100,
      granularity: Granularity::FullBatch,
      init: Init::Fixed { weight: -0.06, bias: -0.73 },
    }
  }
}

impl Config {
  pub fn from_json(json: &str) -> Result<Self> {
    let config: Self = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let json = std::fs::read_to_string(path)?;
    Self::from_json(&json)
  }

  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  pub fn validate(&self) -> Result<()> {
    if self.training_steps == 0 {
      return Err(Error::InvalidConfig("training_steps must be positive".to_string()))
    }
    if self.display_step == 0 {
      return Err(Error::InvalidConfig("display_step must be positive".to_string()))
    }
    if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
      return Err(Error::InvalidConfig(format!("learning_rate must be positive, got {}", self.learning_rate)))
    }
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let config = Config::default();
    assert_eq!(config.mode, Mode::Eager);
    assert_eq!(config.training_steps, 1000);
    assert_eq!(config.display_step, 100);
    assert_eq!(config.granularity, Granularity::FullBatch);
    assert_eq!(config.init.values(), (-0.06, -0.73));
    assert!(config.validate().is_ok());
  }

  #[test]
  fn partial_json() {
    let config = Config::from_json(r#"{
      "granularity": "per_sample",
      "init": { "fixed": { "weight": 1.0, "bias": 2.0 } }
    }"#).unwrap();
    assert_eq!(config.granularity, Granularity::PerSample);
    assert_eq!(config.init.values(), (1.0, 2.0));
    assert_eq!(config.learning_rate, 0.01);

    let random = Config::from_json(r#"{ "init": "random" }"#).unwrap();
    assert_eq!(random.init, Init::Random);
  }

  #[test]
  fn json_survives_a_round_trip() {
    let config = Config { mode: Mode::Graph, ..Config::default() };
    assert_eq!(Config::from_json(&config.to_json().unwrap()).unwrap(), config);
  }

  #[test]
  fn rejects_invalid() {
    assert!(matches!(Config::from_json(r#"{ "training_steps": 0 }"#), Err(Error::InvalidConfig(_))));
    assert!(matches!(Config::from_json(r#"{ "display_step": 0 }"#), Err(Error::InvalidConfig(_))));
    assert!(matches!(Config::from_json(r#"{ "learning_rate": -1.0 }"#), Err(Error::InvalidConfig(_))));
    assert!(matches!(Config::from_json(r#"{ "mode": "lazy" }"#), Err(Error::Json(_))));
  }

  #[test]
  fn missing_file() {
    assert!(matches!(Config::load("/nonexistent/microflow.json"), Err(Error::Io(_))));
  }
}
