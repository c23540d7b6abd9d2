use log::debug;

use crate::{
  error::{ Error, Result },
  graph::{ Graph, NodeId },
  scalar::Real,
  tensor::Tensor,
  variable::Variable,
};


/// Stateless gradient descent.
///
/// Every update follows `value ← value − learning_rate × gradient`.
/// No momentum or decay is carried from one call to the next.

#[derive(Debug, Clone)]
pub struct Optimizer<T: Real> {
  pub learning_rate: T,
}

impl<T: Real> Optimizer<T> {
  pub fn new(learning_rate: T) -> Self {
    Self { learning_rate }
  }

  /// Update each variable with its gradient, in place.
  ///
  /// Either every variable gets updated or, if any gradient
  /// doesn't match its variable's shape, none of them.

  pub fn apply_gradients<'a, I>(&self, pairs: I) -> Result<()>
  where
    I: IntoIterator<Item = (Tensor<T>, &'a mut Variable<T>)>,
  {
    let staged = pairs.into_iter()
      .map(|(grad, variable)| {
        if grad.shape() != variable.shape() {
          return Err(Error::ShapeMismatch {
            op: "apply_gradients",
            lhs: variable.shape().clone(),
            rhs: grad.shape().clone(),
          })
        }
        let value = variable.value().sub(&grad.scale(self.learning_rate))?;
        Ok((variable, value))
      })
      .collect::<Result<Vec<_>>>()?;
    for (variable, value) in staged {
      debug!("updating {} to {}", variable.name(), value);
      variable.set(value);
    }
    Ok(())
  }

  /// Add a node to `graph` that, when run in a [Session](crate::Session),
  /// minimizes `loss` with respect to every variable it depends on.

  pub fn minimize(&self, graph: &mut Graph<T>, loss: NodeId) -> Result<NodeId> {
    graph.minimize(loss, self.learning_rate)
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn descend() {
    let mut w = Variable::scalar("weight", 1.0);
    let mut b = Variable::new("bias", Tensor::vec(&[0.0, 1.0]));
    let optimizer = Optimizer::new(0.5);
    optimizer.apply_gradients([
      (Tensor::scalar(2.0), &mut w),
      (Tensor::vec(&[1.0, -1.0]), &mut b),
    ]).unwrap();
    assert_eq!(w.value(), &Tensor::scalar(0.0));
    assert_eq!(b.value(), &Tensor::vec(&[-0.5, 1.5]));
  }

  #[test]
  fn mismatched_gradient_changes_nothing() {
    let mut w = Variable::scalar("weight", 1.0);
    let mut b = Variable::scalar("bias", 2.0);
    let optimizer = Optimizer::new(0.1);
    let err = optimizer.apply_gradients([
      (Tensor::scalar(1.0), &mut w),
      (Tensor::vec(&[1.0, 1.0]), &mut b),
    ]).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { op: "apply_gradients", .. }));
    assert_eq!(w.value(), &Tensor::scalar(1.0));
    assert_eq!(b.value(), &Tensor::scalar(2.0));
  }
}
