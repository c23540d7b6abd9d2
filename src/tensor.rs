use serde::{ Serialize, Deserialize };

use crate::{
  internal::*,
  error::{ Error, Result },
  shape::Shape,
  scalar::{ Inner, Real },
};


/// Fixed-shape array of values.
///
/// Tensors have value semantics: arithmetic never modifies its operands
/// and always produces a new tensor. Elementwise operations accept
/// operands of identical shape, or a scalar together with any other shape.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorDump<T>")]
pub struct Tensor<T: Inner> {
  shape: Shape,
  data: Vec<T>,
}

// Deserialized tensors pass through the same size check as constructed ones
#[derive(Deserialize)]
struct TensorDump<T> {
  shape: Shape,
  data: Vec<T>,
}

impl<T: Inner> TryFrom<TensorDump<T>> for Tensor<T> {
  type Error = Error;

  fn try_from(dump: TensorDump<T>) -> Result<Self> {
    Self::from_shape(dump.shape, dump.data)
  }
}

impl<T: Inner> Tensor<T> {
  pub fn from_shape(shape: Shape, data: Vec<T>) -> Result<Self> {
    if shape.size() != data.len() {
      return Err(Error::ShapeMismatch {
        op: "from_shape",
        lhs: shape,
        rhs: Shape::new(&[data.len()]),
      })
    }
    Ok(Self { shape, data })
  }

  pub fn new(shape: &[usize], data: Vec<T>) -> Result<Self> {
    Self::from_shape(Shape::new(shape), data)
  }

  pub fn scalar(item: T) -> Self {
    Self { shape: Shape::scalar(), data: vec![item] }
  }

  pub fn vec(vec: &[T]) -> Self {
    Self { shape: Shape::new(&[vec.len()]), data: vec.to_vec() }
  }

  pub fn fill(shape: &[usize], filler: T) -> Self {
    Self { shape: Shape::new(shape), data: vec![filler; shape.iter().product()] }
  }

  pub fn shape(&self) -> &Shape {
    &self.shape
  }

  pub fn size(&self) -> usize {
    self.shape.size()
  }

  pub fn rank(&self) -> usize {
    self.shape.rank()
  }

  pub fn raw(&self) -> &[T] {
    &self.data
  }

  /// Extract the single value of a scalar or one-element tensor.

  pub fn item(&self) -> Result<T> {
    match self.data.as_slice() {
      [item] => Ok(*item),
      _ => Err(Error::ShapeMismatch { op: "item", lhs: self.shape.clone(), rhs: Shape::scalar() }),
    }
  }

  pub fn param_iter(&self) -> impl Iterator<Item = T> + '_ {
    self.data.iter().copied()
  }

  /// Split into scalar tensors, one per element.

  pub fn items(&self) -> impl Iterator<Item = Self> + '_ {
    self.param_iter().map(Self::scalar)
  }

  pub fn vectorize<O, F>(&self, cb: F) -> Tensor<O>
  where
    O: Inner,
    F: FnMut(T) -> O,
  {
    Tensor {
      shape: self.shape.clone(),
      data: self.param_iter().map(cb).collect(),
    }
  }

  pub fn zip<O, F>(&self, rhs: &Self, op: &'static str, cb: F) -> Result<Tensor<O>>
  where
    O: Inner,
    F: Fn(T, T) -> O,
  {
    let shape = self.shape.broadcast(&rhs.shape).ok_or_else(|| Error::ShapeMismatch {
      op,
      lhs: self.shape.clone(),
      rhs: rhs.shape.clone(),
    })?;
    let data = (0..shape.size())
      .map(|i| cb(self.element(i), rhs.element(i)) )
      .collect();
    Ok(Tensor { shape, data })
  }

  /// Repeat a scalar to fill the given shape.

  pub fn broadcast(&self, shape: &Shape) -> Result<Self> {
    if &self.shape == shape { return Ok(self.clone()) }
    if !self.shape.is_scalar() {
      return Err(Error::ShapeMismatch { op: "broadcast", lhs: self.shape.clone(), rhs: shape.clone() })
    }
    Ok(Self::fill(&shape.dims, self.data[0]))
  }

  #[inline]
  fn element(&self, i: usize) -> T {
    if self.shape.is_scalar() { self.data[0] } else { self.data[i] }
  }
}

impl<T: Real> Tensor<T> {
  pub fn ones(shape: &[usize]) -> Self {
    Self::fill(shape, T::one())
  }

  pub fn add(&self, rhs: &Self) -> Result<Self> {
    self.zip(rhs, "add", |a, b| a + b )
  }

  pub fn sub(&self, rhs: &Self) -> Result<Self> {
    self.zip(rhs, "subtract", |a, b| a - b )
  }

  pub fn mul(&self, rhs: &Self) -> Result<Self> {
    self.zip(rhs, "multiply", |a, b| a * b )
  }

  pub fn div(&self, rhs: &Self) -> Result<Self> {
    self.zip(rhs, "divide", |a, b| a / b )
  }

  pub fn scale(&self, factor: T) -> Self {
    self.vectorize(|a| a * factor )
  }

  pub fn powf(&self, exponent: T) -> Self {
    self.vectorize(|a| a.powf(exponent) )
  }

  pub fn neg(&self) -> Self {
    self.vectorize(|a| -a )
  }

  /// Sum of all elements, as a scalar.

  pub fn sum(&self) -> Self {
    Self::scalar(self.param_iter().sum())
  }

  /// Standard normal samples.

  pub fn randn(shape: &[usize]) -> Self {
    let len: usize = shape.iter().product();
    let mut data = Vec::with_capacity(len + 1);
    while data.len() < len {
      let (r1, r2): (T, T) = randn();
      data.push(r1);
      data.push(r2);
    }
    data.truncate(len);
    Self { shape: Shape::new(shape), data }
  }
}

impl<T: Inner> std::fmt::Display for Tensor<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    if self.shape.is_scalar() {
      write!(f, "{}", self.data[0])
    } else {
      write!(f, "Tensor{:?} {:?}", self.shape.dims, self.data)
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn construct() {
    let x = Tensor::new(&[2,2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(x.size(), 4);
    assert_eq!(x.rank(), 2);
    assert!(matches!(Tensor::new(&[3], vec![1.0, 2.0]), Err(Error::ShapeMismatch { .. })));
  }

  #[test]
  fn scalar_broadcast() {
    let x = Tensor::vec(&[1.0, 2.0, 3.0]);
    let y = x.mul(&Tensor::scalar(2.0)).unwrap();
    assert_eq!(y, Tensor::vec(&[2.0, 4.0, 6.0]));
    let y = Tensor::scalar(1.0).sub(&x).unwrap();
    assert_eq!(y, Tensor::vec(&[0.0, -1.0, -2.0]));
  }

  #[test]
  fn mismatched_shapes() {
    let x = Tensor::vec(&[1.0, 2.0, 3.0]);
    let y = Tensor::vec(&[1.0, 2.0]);
    let err = x.add(&y).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { op: "add", .. }));
  }

  #[test]
  fn sum_and_item() {
    let x = Tensor::vec(&[1.0, 2.0, 3.5]);
    assert_eq!(x.sum().shape(), &Shape::scalar());
    assert_eq!(x.sum().item().unwrap(), 6.5);
    assert!(x.item().is_err());
  }

  #[test]
  fn powf() {
    let x = Tensor::vec(&[2.0, -3.0]);
    assert_eq!(x.powf(2.0), Tensor::vec(&[4.0, 9.0]));
  }

  #[test]
  fn broadcast_scalar() {
    let g = Tensor::scalar(0.5).broadcast(&Shape::new(&[3])).unwrap();
    assert_eq!(g, Tensor::vec(&[0.5, 0.5, 0.5]));
    assert!(Tensor::vec(&[1.0, 2.0]).broadcast(&Shape::new(&[3])).is_err());
  }

  #[test]
  fn randn() {
    let x = Tensor::<f64>::randn(&[5]);
    assert_eq!(x.size(), 5);
    assert!(x.param_iter().all(|a| a.is_finite() ));
  }

  #[test]
  fn deserialize_checks_size() {
    let x: Tensor<f32> = serde_json::from_str(r#"{ "shape": { "dims": [2] }, "data": [1.0, 2.0] }"#).unwrap();
    assert_eq!(x, Tensor::vec(&[1.0, 2.0]));
    assert!(serde_json::from_str::<Tensor<f32>>(r#"{ "shape": { "dims": [3] }, "data": [1.0] }"#).is_err());
    assert!(serde_json::from_str::<Tensor<f32>>(r#"{ "shape": { "dims": [] }, "data": [] }"#).is_err());
  }

  #[test]
  fn items() {
    let items: Vec<_> = Tensor::vec(&[1.0, 2.0]).items().collect();
    assert_eq!(items, vec![Tensor::scalar(1.0), Tensor::scalar(2.0)]);
  }
}
