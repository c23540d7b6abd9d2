mod tape;

pub use tape::{ GradientTape, Tracked };

use crate::{
  internal::*,
  error::Result,
  scalar::Real,
  shape::Shape,
  tensor::Tensor,
};


/// Named, trainable value that gradients can be computed for.
///
/// Variables are owned by exactly one party, the model in eager mode
/// or the [Session](crate::Session) in graph mode, and only ever get
/// modified by an [Optimizer](crate::Optimizer).

#[derive(Debug)]
pub struct Variable<T: Real> {
  id: usize,
  name: String,
  value: Tensor<T>,
  trainable: bool,
}

impl<T: Real> Variable<T> {
  pub fn new(name: &str, value: Tensor<T>) -> Self {
    Self {
      id: make_id(),
      name: name.to_string(),
      value,
      trainable: true,
    }
  }

  pub fn scalar(name: &str, value: T) -> Self {
    Self::new(name, Tensor::scalar(value))
  }

  pub fn id(&self) -> usize {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn value(&self) -> &Tensor<T> {
    &self.value
  }

  pub fn shape(&self) -> &Shape {
    self.value.shape()
  }

  pub fn trainable(&self) -> bool {
    self.trainable
  }

  pub fn item(&self) -> Result<T> {
    self.value.item()
  }

  // Callers check shapes before committing a new value
  pub(crate) fn set(&mut self, value: Tensor<T>) {
    debug_assert_eq!(value.shape(), self.value.shape());
    self.value = value;
  }
}

impl<T: Real> std::fmt::Display for Variable<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Variable {} {}", self.name, self.value)
  }
}
