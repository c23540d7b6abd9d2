use itertools::Itertools;
use serde::{ Serialize, Deserialize };


/// The shape of a [Tensor](crate::Tensor).
///
/// A shape without dimensions describes a scalar.

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
  pub dims: Vec<usize>,
}

impl Shape {
  pub fn new(dims: &[usize]) -> Self {
    Self { dims: dims.to_vec() }
  }

  pub fn scalar() -> Self {
    Self { dims: vec![] }
  }

  pub fn size(&self) -> usize {
    self.dims.iter().product()
  }

  pub fn rank(&self) -> usize {
    self.dims.len()
  }

  pub fn is_scalar(&self) -> bool {
    self.dims.is_empty()
  }

  /// Shape resulting from an elementwise operation between both shapes.
  ///
  /// Only scalars get broadcasted. Arrays must match exactly.

  pub fn broadcast(&self, other: &Self) -> Option<Self> {
    if self == other || other.is_scalar() {
      Some(self.clone())
    } else if self.is_scalar() {
      Some(other.clone())
    } else {
      None
    }
  }
}

impl std::fmt::Display for Shape {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Shape[{}]", self.dims.iter().join(", "))
  }
}
