use crate::{
  error::{ Error, Result },
  tensor::Tensor,
};


/// Paired one-dimensional inputs and targets, split into training and testing sets.

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
  pub train_x: Tensor<f32>,
  pub train_y: Tensor<f32>,
  pub test_x: Tensor<f32>,
  pub test_y: Tensor<f32>,
}

impl Dataset {
  pub fn new(train_x: &[f32], train_y: &[f32], test_x: &[f32], test_y: &[f32]) -> Result<Self> {
    let data = Self {
      train_x: Tensor::vec(train_x),
      train_y: Tensor::vec(train_y),
      test_x: Tensor::vec(test_x),
      test_y: Tensor::vec(test_y),
    };
    data.validate()?;
    Ok(data)
  }

  /// Check that inputs and targets pair up and neither set is empty.

  pub fn validate(&self) -> Result<()> {
    for (op, x, y) in [
      ("train data", &self.train_x, &self.train_y),
      ("test data", &self.test_x, &self.test_y),
    ] {
      if x.shape() != y.shape() || x.size() == 0 {
        return Err(Error::ShapeMismatch { op, lhs: x.shape().clone(), rhs: y.shape().clone() })
      }
    }
    Ok(())
  }

  /// Seventeen training and eight testing points scattered around a line.

  pub fn linear_regression() -> Self {
    Self {
      train_x: Tensor::vec(&[
        3.3, 4.4, 5.5, 6.71, 6.93, 4.168, 9.779, 6.182, 7.59,
        2.167, 7.042, 10.791, 5.313, 7.997, 5.654, 9.27, 3.1,
      ]),
      train_y: Tensor::vec(&[
        1.7, 2.76, 2.09, 3.19, 1.694, 1.573, 3.366, 2.596, 2.53,
        1.221, 2.827, 3.465, 1.65, 2.904, 2.42, 2.94, 1.3,
      ]),
      test_x: Tensor::vec(&[6.83, 4.668, 8.9, 7.91, 5.7, 8.7, 3.1, 2.1]),
      test_y: Tensor::vec(&[1.84, 2.273, 3.2, 2.831, 2.92, 3.24, 1.35, 1.03]),
    }
  }

  pub fn n_samples(&self) -> usize {
    self.train_x.size()
  }

  /// Training inputs, targets and sample count.

  pub fn prepare_data(&self) -> (Tensor<f32>, Tensor<f32>, usize) {
    (self.train_x.clone(), self.train_y.clone(), self.n_samples())
  }
}


/// Training inputs, targets and sample count of the reference data.

pub fn prepare_data() -> (Tensor<f32>, Tensor<f32>, usize) {
  Dataset::linear_regression().prepare_data()
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reference_data() {
    let data = Dataset::linear_regression();
    let (x, y, n) = prepare_data();
    assert_eq!(n, 17);
    assert_eq!(x.shape(), y.shape());
    assert_eq!(data.test_x.size(), 8);
    assert_eq!(data.test_y.size(), 8);
  }

  #[test]
  fn unpaired_samples() {
    let err = Dataset::new(&[1.0, 2.0], &[1.0], &[1.0], &[1.0]).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { op: "train data", .. }));
    assert!(Dataset::new(&[1.0], &[1.0], &[], &[]).is_err());
    assert!(Dataset::new(&[1.0], &[2.0], &[3.0], &[4.0]).is_ok());
    assert!(Dataset::linear_regression().validate().is_ok());
  }
}
