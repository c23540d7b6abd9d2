use log::{ debug, info, error };
use serde::Serialize;

use crate::{
  config::{ Config, Granularity, Mode },
  data::Dataset,
  error::Result,
  graph::{ Graph, NodeId, Session },
  optimize::Optimizer,
  tensor::Tensor,
  variable::{ GradientTape, Variable },
};


/// Progress snapshot taken every `display_step` steps.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
  pub step: usize,
  pub loss: f32,
  pub weight: f32,
  pub bias: f32,
}

/// Receives checkpoints while a model trains.

pub trait Reporter {
  fn report(&mut self, checkpoint: &Checkpoint);
}

/// Writes each checkpoint to the log.

#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
  fn report(&mut self, checkpoint: &Checkpoint) {
    info!("step: {}, loss: {}, W: {}, b: {}",
      checkpoint.step, checkpoint.loss, checkpoint.weight, checkpoint.bias);
  }
}

impl Reporter for Vec<Checkpoint> {
  fn report(&mut self, checkpoint: &Checkpoint) {
    self.push(*checkpoint);
  }
}


/// Outcome of a finished training run.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
  pub mode: Mode,
  pub weight: f32,
  pub bias: f32,
  pub training_cost: f32,
  pub testing_cost: f32,
}

impl Summary {
  /// Absolute gap between training and testing cost.

  pub fn difference(&self) -> f32 {
    (self.training_cost - self.testing_cost).abs()
  }
}


/// `weight * x + bias`, elementwise.

pub fn predict(weight: &Tensor<f32>, bias: &Tensor<f32>, x: &Tensor<f32>) -> Result<Tensor<f32>> {
  weight.mul(x)?.add(bias)
}

/// Half the mean of squared errors.

pub fn mean_squared_error(prediction: &Tensor<f32>, target: &Tensor<f32>) -> Result<f32> {
  let divisor = Tensor::scalar(2.0 * target.size() as f32);
  prediction.sub(target)?.powf(2.0).sum().div(&divisor)?.item()
}

/// Append half the mean of squared errors over `n_samples` to `graph`.

pub fn build_mean_squared_error(
  graph: &mut Graph<f32>,
  prediction: NodeId,
  target: NodeId,
  n_samples: usize,
) -> Result<NodeId> {
  let error = graph.subtract(prediction, target)?;
  let squared = graph.pow(error, 2.0)?;
  let total = graph.reduce_sum(squared)?;
  let divisor = graph.scalar(2.0 * n_samples as f32);
  graph.divide(total, divisor)
}


/// Fits `y = W * x + b` by gradient descent.

#[derive(Debug, Clone)]
pub struct LinearRegression {
  config: Config,
  data: Dataset,
}

impl LinearRegression {
  pub fn new(config: Config, data: Dataset) -> Result<Self> {
    config.validate()?;
    data.validate()?;
    Ok(Self { config, data })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn data(&self) -> &Dataset {
    &self.data
  }

  /// Train from scratch, reporting progress to `reporter`.

  pub fn run(&self, reporter: &mut impl Reporter) -> Result<Summary> {
    let (weight, bias) = self.config.init.values();
    info!("Training {:?} model for {} steps ({:?}), starting at W: {}, b: {}",
      self.config.mode, self.config.training_steps, self.config.granularity, weight, bias);
    let summary = match self.config.mode {
      Mode::Eager => self.run_eager(weight, bias, reporter)?,
      Mode::Graph => self.run_graph(weight, bias, reporter)?,
    };
    info!("Optimization finished: training cost = {}, W = {}, b = {}",
      summary.training_cost, summary.weight, summary.bias);
    info!("Testing cost = {}", summary.testing_cost);
    info!("Absolute mean square loss difference: {}", summary.difference());
    Ok(summary)
  }

  fn batches(&self) -> Vec<(Tensor<f32>, Tensor<f32>)> {
    let (x, y, _) = self.data.prepare_data();
    match self.config.granularity {
      Granularity::FullBatch => vec![(x, y)],
      Granularity::PerSample => x.items().zip(y.items()).collect(),
    }
  }

  fn run_eager(&self, weight: f32, bias: f32, reporter: &mut impl Reporter) -> Result<Summary> {
    let mut weight = Variable::scalar("weight", weight);
    let mut bias = Variable::scalar("bias", bias);
    let optimizer = Optimizer::new(self.config.learning_rate);
    let divisor = 2.0 * self.data.n_samples() as f32;
    let batches = self.batches();

    for step in 1..=self.config.training_steps {
      for (x, y) in &batches {
        let gradients = eager_gradients(&weight, &bias, x, y, divisor)?;
        optimizer.apply_gradients(gradients.into_iter().zip([&mut weight, &mut bias]))?;
      }
      if step % self.config.display_step == 0 {
        let prediction = predict(weight.value(), bias.value(), &self.data.train_x)?;
        reporter.report(&Checkpoint {
          step,
          loss: mean_squared_error(&prediction, &self.data.train_y)?,
          weight: weight.item()?,
          bias: bias.item()?,
        });
      }
    }

    let training = predict(weight.value(), bias.value(), &self.data.train_x)?;
    let testing = predict(weight.value(), bias.value(), &self.data.test_x)?;
    Ok(Summary {
      mode: Mode::Eager,
      weight: weight.item()?,
      bias: bias.item()?,
      training_cost: mean_squared_error(&training, &self.data.train_y)?,
      testing_cost: mean_squared_error(&testing, &self.data.test_y)?,
    })
  }

  fn run_graph(&self, weight: f32, bias: f32, reporter: &mut impl Reporter) -> Result<Summary> {
    let mut graph = Graph::new();
    let x = graph.placeholder("X", None);
    let y = graph.placeholder("Y", None);
    let w = graph.variable("weight", Tensor::scalar(weight));
    let b = graph.variable("bias", Tensor::scalar(bias));
    let product = graph.multiply(x, w)?;
    let prediction = graph.add(product, b)?;
    let cost = build_mean_squared_error(&mut graph, prediction, y, self.data.n_samples())?;
    let train = Optimizer::new(self.config.learning_rate).minimize(&mut graph, cost)?;
    let init = graph.global_variables_initializer();
    debug!("Built graph with {} nodes", graph.len());

    let mut session = Session::new(graph);
    session.run(&[init], &[])?;

    let batches = self.batches();
    let training_set = [(x, &self.data.train_x), (y, &self.data.train_y)];

    for step in 1..=self.config.training_steps {
      for (xs, ys) in &batches {
        session.run(&[train], &[(x, xs), (y, ys)])?;
      }
      if step % self.config.display_step == 0 {
        reporter.report(&Checkpoint {
          step,
          loss: session.eval(cost, &training_set)?.item()?,
          weight: session.variable(w)?.item()?,
          bias: session.variable(b)?.item()?,
        });
      }
    }

    let training_cost = session.eval(cost, &training_set)?.item()?;
    let test_cost = build_mean_squared_error(session.graph_mut(), prediction, y, self.data.test_x.size())?;
    let testing_cost = session
      .eval(test_cost, &[(x, &self.data.test_x), (y, &self.data.test_y)])?
      .item()?;
    let summary = Summary {
      mode: Mode::Graph,
      weight: session.variable(w)?.item()?,
      bias: session.variable(b)?.item()?,
      training_cost,
      testing_cost,
    };
    for variable in session.close() {
      debug!("Released {}", variable);
    }
    Ok(summary)
  }
}

// One tape per step, spent on a single gradient query
fn eager_gradients(
  weight: &Variable<f32>,
  bias: &Variable<f32>,
  x: &Tensor<f32>,
  y: &Tensor<f32>,
  divisor: f32,
) -> Result<Vec<Tensor<f32>>> {
  let tape = GradientTape::new();
  let w = tape.watch(weight)?;
  let b = tape.watch(bias)?;
  let x = tape.constant(x)?;
  let y = tape.constant(y)?;
  let prediction = w.mul(&x)?.add(&b)?;
  let loss = prediction.sub(&y)?.pow(2.0)?.reduce_sum()?.div_scalar(divisor)?;
  let gradients = tape.gradient(&loss, &[weight, bias])?;
  Ok(gradients)
}


/// Train the reference linear regression with `config`, logging progress.
///
/// Returns whether training finished without error.

pub fn run(config: &Config) -> bool {
  let result = LinearRegression::new(config.clone(), Dataset::linear_regression())
    .and_then(|model| model.run(&mut LogReporter) );
  match result {
    Ok(_) => true,
    Err(err) => {
      error!("Linear regression failed: {}", err);
      false
    },
  }
}

/// Train with the default configuration in the given mode.

pub fn run_mode(mode: Mode) -> bool {
  run(&Config { mode, ..Config::default() })
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Init;

  fn train(config: Config) -> (Vec<Checkpoint>, Summary) {
    let model = LinearRegression::new(config, Dataset::linear_regression()).unwrap();
    let mut checkpoints = vec![];
    let summary = model.run(&mut checkpoints).unwrap();
    (checkpoints, summary)
  }

  fn relative_diff(a: f32, b: f32) -> f32 {
    (a - b).abs() / a.abs().max(b.abs()).max(f32::EPSILON)
  }

  #[test]
  fn loss_decreases() {
    for mode in [Mode::Eager, Mode::Graph] {
      let (checkpoints, summary) = train(Config { mode, ..Config::default() });
      assert_eq!(checkpoints.len(), 10);
      assert_eq!(checkpoints[0].step, 100);
      assert_eq!(checkpoints[9].step, 1000);
      for pair in checkpoints.windows(2) {
        assert!(pair[1].loss <= pair[0].loss);
      }
      assert!(checkpoints[0].loss < 0.2);
      assert!(summary.training_cost < 0.1);
      assert!(summary.testing_cost < 0.1);
    }
  }

  #[test]
  fn modes_agree() {
    for (learning_rate, granularity) in [
      (0.001, Granularity::FullBatch),
      (0.01, Granularity::FullBatch),
      (0.02, Granularity::FullBatch),
      (0.01, Granularity::PerSample),
    ] {
      let config = Config { learning_rate, granularity, training_steps: 300, ..Config::default() };
      let (eager_checkpoints, eager) = train(Config { mode: Mode::Eager, ..config.clone() });
      let (graph_checkpoints, graph) = train(Config { mode: Mode::Graph, ..config });
      assert_eq!(eager_checkpoints.len(), 3);
      assert_eq!(eager_checkpoints.len(), graph_checkpoints.len());
      for (a, b) in eager_checkpoints.iter().zip(&graph_checkpoints) {
        assert_eq!(a.step, b.step);
        assert!(relative_diff(a.loss, b.loss) < 1e-4, "lr {learning_rate}, step {}", a.step);
      }
      assert!(relative_diff(eager.weight, graph.weight) < 1e-4);
      assert!(relative_diff(eager.bias, graph.bias) < 1e-4);
      assert!(relative_diff(eager.testing_cost, graph.testing_cost) < 1e-4);
    }
  }

  #[test]
  fn rejects_unpaired_dataset() {
    let mut data = Dataset::linear_regression();
    data.train_y = Tensor::vec(&[1.0, 2.0]);
    let config = Config { granularity: Granularity::PerSample, ..Config::default() };
    let err = LinearRegression::new(config, data).unwrap_err();
    assert!(matches!(err, crate::Error::ShapeMismatch { op: "train data", .. }));
  }

  #[test]
  fn per_sample_updates() {
    for mode in [Mode::Eager, Mode::Graph] {
      let (checkpoints, summary) = train(Config {
        mode,
        granularity: Granularity::PerSample,
        training_steps: 200,
        ..Config::default()
      });
      assert_eq!(checkpoints.len(), 2);
      assert!(checkpoints[1].loss < checkpoints[0].loss);
      assert!(summary.training_cost.is_finite());
    }
  }

  #[test]
  fn cost_helpers() {
    let x = Tensor::vec(&[1.0, 2.0, 3.0]);
    let y = Tensor::vec(&[1.0, 2.0, 3.0]);
    let prediction = predict(&Tensor::scalar(0.0), &Tensor::scalar(0.0), &x).unwrap();
    assert_eq!(mean_squared_error(&prediction, &y).unwrap(), 14.0 / 6.0);
    let perfect = predict(&Tensor::scalar(1.0), &Tensor::scalar(0.0), &x).unwrap();
    assert_eq!(mean_squared_error(&perfect, &y).unwrap(), 0.0);
  }

  #[test]
  fn summary_difference() {
    let summary = Summary { mode: Mode::Eager, weight: 0.3, bias: 0.4, training_cost: 0.1, testing_cost: 0.25 };
    assert!((summary.difference() - 0.15).abs() < 1e-6);
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["mode"], "eager");
    assert!((json["weight"].as_f64().unwrap() - 0.3).abs() < 1e-6);
  }

  #[test]
  fn reports_success() {
    assert!(run(&Config { training_steps: 10, display_step: 5, ..Config::default() }));
    assert!(run(&Config { mode: Mode::Graph, init: Init::Random, training_steps: 10, ..Config::default() }));
    assert!(!run(&Config { training_steps: 0, ..Config::default() }));
    assert!(run_mode(Mode::Graph));
  }
}
