use rand::distributions::uniform::SampleUniform;
use num_traits::{ Float, NumAssignOps };
use serde::{ Serialize, de::DeserializeOwned };


/// All types that may be stored in a [Tensor](crate::Tensor).
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Inner: PartialEq + Clone + Copy + std::fmt::Debug + std::fmt::Display {}
impl<T: PartialEq + Clone + Copy + std::fmt::Debug + std::fmt::Display> Inner for T {}


/// All continuous numeric types gradients can be computed for.
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits, most notably [f32] and [f64].

pub trait Real: Inner + Float + NumAssignOps + SampleUniform + std::iter::Sum + Serialize + DeserializeOwned + 'static {}
impl<T: Inner + Float + NumAssignOps + SampleUniform + std::iter::Sum + Serialize + DeserializeOwned + 'static> Real for T {}
