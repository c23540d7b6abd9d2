use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::{ Serialize, Deserialize };

use crate::{
  error::{ Error, Result },
  scalar::Real,
  shape::Shape,
  tensor::Tensor,
};


/// Differentiable operation kinds.
///
/// Both the eager [GradientTape](crate::GradientTape) and graph mode
/// [Session](crate::Session) replay these during back-propagation.

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Op<T> {
  Add,
  Subtract,
  Multiply,
  Divide,
  /// Raise to a constant power.
  Pow(T),
  /// Sum all elements into a scalar.
  ReduceSum,
}

impl<T: Real> Op<T> {
  pub fn name(&self) -> &'static str {
    match self {
      Self::Add => "add",
      Self::Subtract => "subtract",
      Self::Multiply => "multiply",
      Self::Divide => "divide",
      Self::Pow(_) => "pow",
      Self::ReduceSum => "reduce_sum",
    }
  }

  pub fn arity(&self) -> usize {
    match self {
      Self::Pow(_) | Self::ReduceSum => 1,
      _ => 2,
    }
  }

  pub fn run(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
    match (self, inputs) {
      (Self::Add, [lhs, rhs]) => lhs.add(rhs),
      (Self::Subtract, [lhs, rhs]) => lhs.sub(rhs),
      (Self::Multiply, [lhs, rhs]) => lhs.mul(rhs),
      (Self::Divide, [lhs, rhs]) => lhs.div(rhs),
      (Self::Pow(exponent), [lhs]) => Ok(lhs.powf(*exponent)),
      (Self::ReduceSum, [lhs]) => Ok(lhs.sum()),
      _ => Err(self.arity_error(inputs.len())),
    }
  }

  /// Propagate `grad`, the gradient of this operation's output,
  /// to each of its inputs.

  pub fn derive(&self, inputs: &[&Tensor<T>], grad: &Tensor<T>) -> Result<Vec<Tensor<T>>> {
    match (self, inputs) {
      (Self::Add, [lhs, rhs]) => Ok(vec![
        unbroadcast(grad.clone(), lhs.shape())?,
        unbroadcast(grad.clone(), rhs.shape())?,
      ]),
      (Self::Subtract, [lhs, rhs]) => Ok(vec![
        unbroadcast(grad.clone(), lhs.shape())?,
        unbroadcast(grad.neg(), rhs.shape())?,
      ]),
      (Self::Multiply, [lhs, rhs]) => Ok(vec![
        unbroadcast(grad.mul(rhs)?, lhs.shape())?,
        unbroadcast(grad.mul(lhs)?, rhs.shape())?,
      ]),
      (Self::Divide, [lhs, rhs]) => {
        let dlhs = grad.div(rhs)?;
        let drhs = grad.mul(lhs)?.div(&rhs.powf(T::one() + T::one()))?.neg();
        Ok(vec![
          unbroadcast(dlhs, lhs.shape())?,
          unbroadcast(drhs, rhs.shape())?,
        ])
      },
      (Self::Pow(exponent), [lhs]) => {
        let local = lhs.powf(*exponent - T::one()).scale(*exponent);
        Ok(vec![grad.mul(&local)?])
      },
      (Self::ReduceSum, [lhs]) => Ok(vec![grad.broadcast(lhs.shape())?]),
      _ => Err(self.arity_error(inputs.len())),
    }
  }

  fn arity_error(&self, got: usize) -> Error {
    Error::Arity { op: self.name(), expected: self.arity(), got }
  }
}


// Sum gradients flowing into a broadcasted scalar back into a scalar

fn unbroadcast<T: Real>(grad: Tensor<T>, shape: &Shape) -> Result<Tensor<T>> {
  if grad.shape() == shape {
    Ok(grad)
  } else if shape.is_scalar() {
    Ok(grad.sum())
  } else {
    Err(Error::ShapeMismatch { op: "unbroadcast", lhs: grad.shape().clone(), rhs: shape.clone() })
  }
}


/// A recorded computation that can be differentiated in reverse.
///
/// Nodes are addressed by index and only ever depend on nodes
/// with smaller indices.

pub(crate) trait Trace<T: Real> {
  fn operation(&self, index: usize) -> Option<(&Op<T>, &[usize])>;
  fn value(&self, index: usize) -> Option<&Tensor<T>>;
}


/// Reverse-mode accumulation of gradients, starting from `output`.
///
/// Returns the gradient of every node the output depends on.

pub(crate) fn backpropagate<T: Real>(trace: &impl Trace<T>, output: usize) -> Result<BTreeMap<usize, Tensor<T>>> {
  let seed = match trace.value(output) {
    Some(value) => Tensor::ones(&value.shape().dims),
    None => return Err(Error::UnknownNode { index: output }),
  };
  let mut grads = BTreeMap::new();
  grads.insert(output, seed);
  for index in (0..=output).rev() {
    let Some((op, inputs)) = trace.operation(index) else { continue };
    let Some(grad) = grads.get(&index).cloned() else { continue };
    let values = inputs.iter()
      .map(|&input| trace.value(input).ok_or(Error::UnknownNode { index: input }) )
      .collect::<Result<Vec<_>>>()?;
    let changes = op.derive(&values, &grad)?;
    for (&input, change) in inputs.iter().zip(changes) {
      match grads.entry(input) {
        Entry::Vacant(entry) => { entry.insert(change); },
        Entry::Occupied(mut entry) => {
          let sum = entry.get().add(&change)?;
          entry.insert(sum);
        },
      }
    }
  }
  Ok(grads)
}
