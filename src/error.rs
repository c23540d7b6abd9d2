use thiserror::Error;

use crate::shape::Shape;


/// Everything that can go wrong while building or running a computation.

#[derive(Debug, Error)]
pub enum Error {
  /// Operands can't be combined, or a value doesn't fit where it goes.
  #[error("Shape mismatch in {op}: {lhs} vs {rhs}")]
  ShapeMismatch { op: &'static str, lhs: Shape, rhs: Shape },

  /// A placeholder reachable from a fetched node got no value.
  #[error("Placeholder '{name}' has no bound value")]
  UnboundPlaceholder { name: String },

  /// Gradient requested for something the tape never recorded, or the tape was reused.
  #[error("Ungated tape access: {0}")]
  UngatedTapeAccess(String),

  #[error("Gradient tape was already used to compute gradients")]
  DoubleRecording,

  #[error("Variable '{name}' was read before running its initializer")]
  UninitializedVariable { name: String },

  #[error("Node {index} does not belong to this graph")]
  UnknownNode { index: usize },

  #[error("Node {index} has side effects only and produces no value")]
  NotEvaluable { index: usize },

  #[error("Operation {op} takes {expected} inputs, got {got}")]
  Arity { op: &'static str, expected: usize, got: usize },

  #[error("Malformed graph: {0}")]
  MalformedGraph(String),

  #[error("Invalid config: {0}")]
  InvalidConfig(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error("Could not (de)serialize graph: {0}")]
  Serialization(String),

  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
