use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use log::debug;
use serde::{ Serialize, Deserialize };

mod session;

pub use session::Session;

use crate::{
  internal::*,
  error::{ Error, Result },
  ops::Op,
  scalar::Real,
  shape::Shape,
  tensor::Tensor,
};


/// Handle to a node of a [Graph].
///
/// Handles remember which graph they belong to and
/// are rejected by any other graph.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
  graph: usize,
  index: usize,
}

impl NodeId {
  pub fn index(&self) -> usize {
    self.index
  }
}


/// Symbolic node in a computation [Graph].

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum Node<T: Real> {
  /// Input slot that receives a value only when the graph gets run.
  Placeholder { name: String, shape: Option<Shape> },
  /// Trainable value, stored by the [Session] once initialized.
  Variable { name: String, initial: Tensor<T> },
  Constant(Tensor<T>),
  Operation { op: Op<T>, inputs: Vec<usize> },
  /// Assigns every listed variable its initial value.
  Initializer { variables: Vec<usize> },
  /// Performs one gradient descent step on the listed variables.
  Minimize { loss: usize, variables: Vec<usize>, learning_rate: T },
}

impl<T: Real> Node<T> {
  /// Indices of all nodes this node refers to.

  pub fn inputs(&self) -> &[usize] {
    match self {
      Self::Operation { inputs, .. } => inputs,
      Self::Initializer { variables } => variables,
      Self::Minimize { loss, .. } => std::slice::from_ref(loss),
      _ => &[],
    }
  }

  pub fn name(&self) -> Option<&str> {
    match self {
      Self::Placeholder { name, .. } | Self::Variable { name, .. } => Some(name.as_str()),
      _ => None,
    }
  }

  /// Whether running this node yields a value, as opposed to only side effects.

  pub fn produces_value(&self) -> bool {
    !matches!(self, Self::Initializer { .. } | Self::Minimize { .. })
  }
}


/// Deferred computation, built once and run many times in a [Session].
///
/// Nodes live in an append-only arena and may only refer to nodes
/// that were added before them, which keeps the graph acyclic.
/// Building a graph never performs any arithmetic.
///
/// ```
/// use microflow::{ Graph, Session, Tensor };
///
/// let mut graph = Graph::new();
/// let x = graph.placeholder("x", None);
/// let w = graph.variable("w", Tensor::scalar(2.0));
/// let y = graph.multiply(x, w).unwrap();
/// let init = graph.global_variables_initializer();
///
/// let mut session = Session::new(graph);
/// session.run(&[init], &[]).unwrap();
/// let out = session.eval(y, &[(x, &Tensor::vec(&[1.0, 2.0]))]).unwrap();
/// assert_eq!(out, Tensor::vec(&[2.0, 4.0]));
/// ```

#[derive(Debug, Clone)]
pub struct Graph<T: Real> {
  id: usize,
  nodes: Vec<Node<T>>,
}

impl<T: Real> Default for Graph<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Real> Graph<T> {
  pub fn new() -> Self {
    Self { id: make_id(), nodes: vec![] }
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn node(&self, id: NodeId) -> Result<&Node<T>> {
    let index = self.index(id)?;
    Ok(&self.nodes[index])
  }

  /// Handle for the node at `index`, e.g. after loading a saved graph.

  pub fn resolve(&self, index: usize) -> Result<NodeId> {
    if index >= self.nodes.len() { return Err(Error::UnknownNode { index }) }
    Ok(self.id_of(index))
  }

  /// Find the first placeholder or variable with the given name.

  pub fn lookup(&self, name: &str) -> Option<NodeId> {
    self.nodes.iter()
      .position(|node| node.name() == Some(name) )
      .map(|index| self.id_of(index) )
  }

  pub fn variables(&self) -> Vec<NodeId> {
    self.nodes.iter()
      .positions(|node| matches!(node, Node::Variable { .. }) )
      .map(|index| self.id_of(index) )
      .collect()
  }

  pub fn placeholder(&mut self, name: &str, shape: Option<&[usize]>) -> NodeId {
    self.push(Node::Placeholder { name: name.to_string(), shape: shape.map(Shape::new) })
  }

  pub fn variable(&mut self, name: &str, initial: Tensor<T>) -> NodeId {
    self.push(Node::Variable { name: name.to_string(), initial })
  }

  pub fn constant(&mut self, value: Tensor<T>) -> NodeId {
    self.push(Node::Constant(value))
  }

  pub fn scalar(&mut self, value: T) -> NodeId {
    self.constant(Tensor::scalar(value))
  }

  pub fn add(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
    self.operation(Op::Add, &[lhs, rhs])
  }

  pub fn subtract(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
    self.operation(Op::Subtract, &[lhs, rhs])
  }

  pub fn multiply(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
    self.operation(Op::Multiply, &[lhs, rhs])
  }

  pub fn divide(&mut self, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
    self.operation(Op::Divide, &[lhs, rhs])
  }

  pub fn pow(&mut self, base: NodeId, exponent: T) -> Result<NodeId> {
    self.operation(Op::Pow(exponent), &[base])
  }

  pub fn reduce_sum(&mut self, input: NodeId) -> Result<NodeId> {
    self.operation(Op::ReduceSum, &[input])
  }

  /// Node that initializes all variables declared so far.

  pub fn global_variables_initializer(&mut self) -> NodeId {
    let variables = self.nodes.iter()
      .positions(|node| matches!(node, Node::Variable { .. }) )
      .collect();
    self.push(Node::Initializer { variables })
  }

  pub(crate) fn minimize(&mut self, loss: NodeId, learning_rate: T) -> Result<NodeId> {
    let loss = self.value_index(loss)?;
    let variables: Vec<usize> = self.ancestors_of(loss)
      .into_iter()
      .filter(|&index| matches!(self.nodes[index], Node::Variable { .. }) )
      .collect();
    if variables.is_empty() {
      return Err(Error::MalformedGraph(format!("loss node {loss} depends on no variable")))
    }
    Ok(self.push(Node::Minimize { loss, variables, learning_rate }))
  }

  /// All nodes needed to compute `id`, including itself, in evaluation order.

  pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>> {
    let index = self.index(id)?;
    Ok(self.ancestors_of(index).into_iter().map(|index| self.id_of(index) ).collect())
  }

  pub(crate) fn ancestors_of(&self, index: usize) -> Vec<usize> {
    let mut visited = BTreeSet::new();
    let mut stack = vec![index];
    while let Some(index) = stack.pop() {
      if visited.insert(index) {
        stack.extend(self.nodes[index].inputs());
      }
    }
    // Inputs always precede their consumers
    visited.into_iter().collect()
  }

  pub(crate) fn index(&self, id: NodeId) -> Result<usize> {
    if id.graph != self.id || id.index >= self.nodes.len() {
      return Err(Error::UnknownNode { index: id.index })
    }
    Ok(id.index)
  }

  fn value_index(&self, id: NodeId) -> Result<usize> {
    let index = self.index(id)?;
    if !self.nodes[index].produces_value() { return Err(Error::NotEvaluable { index }) }
    Ok(index)
  }

  fn id_of(&self, index: usize) -> NodeId {
    NodeId { graph: self.id, index }
  }

  fn push(&mut self, node: Node<T>) -> NodeId {
    self.nodes.push(node);
    self.id_of(self.nodes.len() - 1)
  }

  fn operation(&mut self, op: Op<T>, inputs: &[NodeId]) -> Result<NodeId> {
    let inputs = inputs.iter()
      .map(|&input| self.value_index(input) )
      .collect::<Result<Vec<_>>>()?;
    Ok(self.push(Node::Operation { op, inputs }))
  }

  pub fn to_bytes(&self) -> Result<Vec<u8>> {
    let dump = GraphDump { nodes: self.nodes.clone() };
    postcard::to_allocvec(&dump).map_err(|err| Error::Serialization(err.to_string()) )
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    let dump: GraphDump<T> = postcard::from_bytes(bytes)
      .map_err(|err| Error::Serialization(err.to_string()) )?;
    validate(&dump.nodes)?;
    Ok(Self { id: make_id(), nodes: dump.nodes })
  }

  /// Save the entire graph, including initial variable values, to disc.

  pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
    let bytes = self.to_bytes()?;
    debug!("saving graph with {} nodes to {}", self.nodes.len(), path.as_ref().display());
    fs::write(path, bytes)?;
    Ok(())
  }

  /// Load a graph saved with [save](Self::save).
  ///
  /// Handles of the original graph are not valid for the loaded one.
  /// Use [resolve](Self::resolve) or [lookup](Self::lookup) instead.

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let bytes = fs::read(path)?;
    Self::from_bytes(&bytes)
  }
}


fn validate<T: Real>(nodes: &[Node<T>]) -> Result<()> {
  let is_variable = |index: usize| matches!(nodes[index], Node::Variable { .. });
  for (index, node) in nodes.iter().enumerate() {
    if let Some(&input) = node.inputs().iter().find(|&&input| input >= index ) {
      return Err(Error::MalformedGraph(format!("node {index} refers to later node {input}")))
    }
    match node {
      Node::Operation { op, inputs } => {
        if inputs.len() != op.arity() {
          return Err(Error::Arity { op: op.name(), expected: op.arity(), got: inputs.len() })
        }
        if let Some(&input) = inputs.iter().find(|&&input| !nodes[input].produces_value() ) {
          return Err(Error::MalformedGraph(format!("node {index} consumes side-effect node {input}")))
        }
      },
      Node::Initializer { variables } | Node::Minimize { variables, .. } => {
        if let Some(&input) = variables.iter().find(|&&input| input >= index || !is_variable(input) ) {
          return Err(Error::MalformedGraph(format!("node {index} lists node {input} as a variable")))
        }
      },
      _ => {},
    }
    if let Node::Minimize { loss, .. } = node {
      if !nodes[*loss].produces_value() {
        return Err(Error::MalformedGraph(format!("node {index} minimizes side-effect node {loss}")))
      }
    }
  }
  Ok(())
}


#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
struct GraphDump<T: Real> {
  nodes: Vec<Node<T>>,
}
