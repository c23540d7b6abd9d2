use std::collections::{ BTreeMap, HashMap };

use log::{ debug, trace };

use crate::{
  error::{ Error, Result },
  graph::{ Graph, Node, NodeId },
  ops::{ Op, Trace, backpropagate },
  optimize::Optimizer,
  scalar::Real,
  shape::Shape,
  tensor::Tensor,
  variable::Variable,
};


type Feed<'f, T> = HashMap<usize, &'f Tensor<T>>;
type Memo<T> = HashMap<usize, Tensor<T>>;

enum Update<T: Real> {
  Initialize(Vec<usize>),
  Descend { learning_rate: T, gradients: Vec<(usize, Tensor<T>)> },
}

struct Evaluation<'a, T: Real> {
  graph: &'a Graph<T>,
  memo: &'a Memo<T>,
}

impl<T: Real> Trace<T> for Evaluation<'_, T> {
  fn operation(&self, index: usize) -> Option<(&Op<T>, &[usize])> {
    match self.graph.nodes.get(index)? {
      Node::Operation { op, inputs } => Some((op, inputs.as_slice())),
      _ => None,
    }
  }

  fn value(&self, index: usize) -> Option<&Tensor<T>> {
    self.memo.get(&index)
  }
}


/// Executes a [Graph] with concrete values bound to its placeholders.
///
/// The session exclusively owns the graph's variables. They come into
/// existence when an initializer node gets run and keep their values
/// across calls to [run](Self::run).

#[derive(Debug)]
pub struct Session<T: Real> {
  graph: Graph<T>,
  variables: BTreeMap<usize, Variable<T>>,
}

impl<T: Real> Session<T> {
  pub fn new(graph: Graph<T>) -> Self {
    debug!("opening session on graph with {} nodes", graph.len());
    Self { graph, variables: BTreeMap::new() }
  }

  pub fn graph(&self) -> &Graph<T> {
    &self.graph
  }

  /// Extend the graph while the session is open.
  ///
  /// Nodes can only be appended, so existing handles stay valid.

  pub fn graph_mut(&mut self) -> &mut Graph<T> {
    &mut self.graph
  }

  pub fn variable(&self, node: NodeId) -> Result<&Variable<T>> {
    let index = self.graph.index(node)?;
    match &self.graph.nodes[index] {
      Node::Variable { name, .. } => self.variables.get(&index)
        .ok_or_else(|| Error::UninitializedVariable { name: name.clone() }),
      _ => Err(Error::MalformedGraph(format!("node {index} is not a variable"))),
    }
  }

  /// Run each of `fetches`, with `feed` providing values for placeholders.
  ///
  /// Returns one entry per fetch, `None` for nodes that only have side effects.
  /// Variables get updated only after every fetch succeeded, so a failing
  /// run leaves them untouched.

  pub fn run(&mut self, fetches: &[NodeId], feed: &[(NodeId, &Tensor<T>)]) -> Result<Vec<Option<Tensor<T>>>> {
    let feed = self.bind(feed)?;
    let mut memo = Memo::new();
    let mut updates = vec![];
    let mut outputs = Vec::with_capacity(fetches.len());
    for &fetch in fetches {
      let index = self.graph.index(fetch)?;
      match &self.graph.nodes[index] {
        Node::Initializer { variables } => {
          updates.push(Update::Initialize(variables.clone()));
          outputs.push(None);
        },
        Node::Minimize { loss, variables, learning_rate } => {
          let gradients = self.gradients(*loss, variables, &feed, &mut memo)?;
          updates.push(Update::Descend { learning_rate: *learning_rate, gradients });
          outputs.push(None);
        },
        _ => outputs.push(Some(self.evaluate(index, &feed, &mut memo)?)),
      }
    }
    self.commit(updates)?;
    Ok(outputs)
  }

  /// Compute the value of a single node.

  pub fn eval(&self, fetch: NodeId, feed: &[(NodeId, &Tensor<T>)]) -> Result<Tensor<T>> {
    let feed = self.bind(feed)?;
    let index = self.graph.index(fetch)?;
    if !self.graph.nodes[index].produces_value() { return Err(Error::NotEvaluable { index }) }
    self.evaluate(index, &feed, &mut Memo::new())
  }

  /// End the session, handing out the variables' final values.

  pub fn close(self) -> Vec<Variable<T>> {
    debug!("closing session with {} variables", self.variables.len());
    self.variables.into_values().collect()
  }

  fn bind<'f>(&self, feed: &[(NodeId, &'f Tensor<T>)]) -> Result<Feed<'f, T>> {
    feed.iter()
      .map(|&(node, value)| {
        let index = self.graph.index(node)?;
        match &self.graph.nodes[index] {
          Node::Placeholder { shape: Some(shape), .. } if shape != value.shape() => Err(Error::ShapeMismatch {
            op: "feed",
            lhs: shape.clone(),
            rhs: value.shape().clone(),
          }),
          Node::Placeholder { .. } => Ok((index, value)),
          _ => Err(Error::MalformedGraph(format!("node {index} is not a placeholder"))),
        }
      })
      .collect()
  }

  fn evaluate(&self, target: usize, feed: &Feed<T>, memo: &mut Memo<T>) -> Result<Tensor<T>> {
    for index in self.graph.ancestors_of(target) {
      if memo.contains_key(&index) { continue }
      let value = match &self.graph.nodes[index] {
        Node::Placeholder { name, .. } => feed.get(&index)
          .map(|&value| value.clone() )
          .ok_or_else(|| Error::UnboundPlaceholder { name: name.clone() })?,
        Node::Variable { name, .. } => self.variables.get(&index)
          .map(|variable| variable.value().clone() )
          .ok_or_else(|| Error::UninitializedVariable { name: name.clone() })?,
        Node::Constant(value) => value.clone(),
        Node::Operation { op, inputs } => {
          let values = inputs.iter()
            .map(|input| memo.get(input).ok_or(Error::UnknownNode { index: *input }) )
            .collect::<Result<Vec<_>>>()?;
          op.run(&values)?
        },
        Node::Initializer { .. } | Node::Minimize { .. } => return Err(Error::NotEvaluable { index }),
      };
      trace!("evaluated node {index} to {}", value.shape());
      memo.insert(index, value);
    }
    memo.get(&target).cloned().ok_or(Error::UnknownNode { index: target })
  }

  fn gradients(&self, loss: usize, variables: &[usize], feed: &Feed<T>, memo: &mut Memo<T>) -> Result<Vec<(usize, Tensor<T>)>> {
    let value = self.evaluate(loss, feed, memo)?;
    if value.size() != 1 {
      return Err(Error::ShapeMismatch { op: "minimize", lhs: value.shape().clone(), rhs: Shape::scalar() })
    }
    let grads = backpropagate(&Evaluation { graph: &self.graph, memo: &*memo }, loss)?;
    variables.iter()
      .map(|&index| match grads.get(&index) {
        Some(grad) => Ok((index, grad.clone())),
        None => Err(Error::MalformedGraph(format!("variable node {index} is not connected to loss {loss}"))),
      })
      .collect()
  }

  fn commit(&mut self, updates: Vec<Update<T>>) -> Result<()> {
    // Check every update before applying any of them
    for update in &updates {
      if let Update::Descend { gradients, .. } = update {
        for (index, grad) in gradients {
          let variable = self.variables.get(index).ok_or_else(|| Error::UninitializedVariable {
            name: self.graph.nodes[*index].name().unwrap_or_default().to_string(),
          })?;
          if variable.shape() != grad.shape() {
            return Err(Error::ShapeMismatch {
              op: "minimize",
              lhs: variable.shape().clone(),
              rhs: grad.shape().clone(),
            })
          }
        }
      }
    }
    for update in updates {
      match update {
        Update::Initialize(variables) => {
          for index in variables {
            if let Node::Variable { name, initial } = &self.graph.nodes[index] {
              match self.variables.get_mut(&index) {
                Some(variable) => variable.set(initial.clone()),
                None => { self.variables.insert(index, Variable::new(name, initial.clone())); },
              }
            }
          }
          debug!("initialized {} variables", self.variables.len());
        },
        Update::Descend { learning_rate, gradients } => {
          let mut gradients: BTreeMap<usize, Tensor<T>> = gradients.into_iter().collect();
          let pairs = self.variables.iter_mut()
            .filter_map(|(index, variable)| gradients.remove(index).map(|grad| (grad, variable)) );
          Optimizer::new(learning_rate).apply_gradients(pairs)?;
        },
      }
    }
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  struct Linear {
    graph: Graph<f64>,
    x: NodeId,
    y: NodeId,
    w: NodeId,
    b: NodeId,
    cost: NodeId,
    init: NodeId,
  }

  // cost = sum((x * w + b - y)^2) / (2 * n)
  fn linear(n: usize) -> Linear {
    let mut graph = Graph::new();
    let x = graph.placeholder("X", None);
    let y = graph.placeholder("Y", None);
    let w = graph.variable("weight", Tensor::scalar(0.0));
    let b = graph.variable("bias", Tensor::scalar(0.0));
    let product = graph.multiply(x, w).unwrap();
    let pred = graph.add(product, b).unwrap();
    let diff = graph.subtract(pred, y).unwrap();
    let squared = graph.pow(diff, 2.0).unwrap();
    let sum = graph.reduce_sum(squared).unwrap();
    let denominator = graph.scalar(2.0 * n as f64);
    let cost = graph.divide(sum, denominator).unwrap();
    let init = graph.global_variables_initializer();
    Linear { graph, x, y, w, b, cost, init }
  }

  fn data() -> (Tensor<f64>, Tensor<f64>) {
    (Tensor::vec(&[1.0, 2.0, 3.0]), Tensor::vec(&[1.0, 2.0, 3.0]))
  }

  #[test]
  fn evaluate_cost() {
    let model = linear(3);
    let (x, y) = data();
    let mut session = Session::new(model.graph);
    session.run(&[model.init], &[]).unwrap();
    let cost = session.eval(model.cost, &[(model.x, &x), (model.y, &y)]).unwrap();
    assert!((cost.item().unwrap() - 14.0 / 6.0).abs() < 1e-12);
  }

  #[test]
  fn uninitialized_variable() {
    let model = linear(3);
    let (x, y) = data();
    let session = Session::new(model.graph);
    let err = session.eval(model.cost, &[(model.x, &x), (model.y, &y)]).unwrap_err();
    assert!(matches!(err, Error::UninitializedVariable { name } if name == "weight"));
  }

  #[test]
  fn minimize_step() {
    let mut model = linear(3);
    let step = Optimizer::new(0.1).minimize(&mut model.graph, model.cost).unwrap();
    let (x, y) = data();
    let mut session = Session::new(model.graph);
    session.run(&[model.init], &[]).unwrap();
    let outputs = session.run(&[step], &[(model.x, &x), (model.y, &y)]).unwrap();
    assert_eq!(outputs, vec![None]);
    // Gradients are -14/3 for the weight and -2 for the bias
    let w = session.variable(model.w).unwrap().item().unwrap();
    let b = session.variable(model.b).unwrap().item().unwrap();
    assert!((w - 1.4 / 3.0).abs() < 1e-12);
    assert!((b - 0.2).abs() < 1e-12);
  }

  #[test]
  fn unbound_placeholder_changes_nothing() {
    let mut model = linear(3);
    let step = Optimizer::new(0.1).minimize(&mut model.graph, model.cost).unwrap();
    let (x, _) = data();
    let mut session = Session::new(model.graph);
    session.run(&[model.init], &[]).unwrap();
    let err = session.run(&[step], &[(model.x, &x)]).unwrap_err();
    assert!(matches!(err, Error::UnboundPlaceholder { name } if name == "Y"));
    assert_eq!(session.variable(model.w).unwrap().value(), &Tensor::scalar(0.0));
    assert_eq!(session.variable(model.b).unwrap().value(), &Tensor::scalar(0.0));
  }

  #[test]
  fn failing_fetch_discards_updates() {
    let mut model = linear(3);
    let step = Optimizer::new(0.1).minimize(&mut model.graph, model.cost).unwrap();
    let (x, y) = data();
    let mut session = Session::new(model.graph);
    session.run(&[model.init], &[]).unwrap();
    let bad = session.graph_mut().placeholder("Z", None);
    let result = session.run(&[step, bad], &[(model.x, &x), (model.y, &y)]);
    assert!(result.is_err());
    assert_eq!(session.variable(model.w).unwrap().value(), &Tensor::scalar(0.0));
  }

  #[test]
  fn shared_nodes_are_evaluated_once_per_run() {
    let model = linear(3);
    let (x, y) = data();
    let mut session = Session::new(model.graph);
    session.run(&[model.init], &[]).unwrap();
    let outputs = session.run(&[model.cost, model.w, model.cost], &[(model.x, &x), (model.y, &y)]).unwrap();
    assert_eq!(outputs.len(), 3);
    assert_eq!(outputs[0], outputs[2]);
    assert_eq!(outputs[1], Some(Tensor::scalar(0.0)));
  }

  #[test]
  fn feed_checks_declared_shape() {
    let mut graph = Graph::<f64>::new();
    let x = graph.placeholder("X", Some(&[2][..]));
    let sum = graph.reduce_sum(x).unwrap();
    let session = Session::new(graph);
    let err = session.eval(sum, &[(x, &Tensor::vec(&[1.0, 2.0, 3.0]))]).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { op: "feed", .. }));
    let sum = session.eval(sum, &[(x, &Tensor::vec(&[1.0, 2.0]))]).unwrap();
    assert_eq!(sum, Tensor::scalar(3.0));
  }

  #[test]
  fn feed_only_placeholders() {
    let model = linear(3);
    let session = Session::new(model.graph);
    let err = session.eval(model.cost, &[(model.w, &Tensor::scalar(1.0))]).unwrap_err();
    assert!(matches!(err, Error::MalformedGraph(_)));
  }

  #[test]
  fn side_effect_nodes_have_no_value() {
    let mut model = linear(3);
    let step = Optimizer::new(0.1).minimize(&mut model.graph, model.cost).unwrap();
    let (x, y) = data();
    let mut session = Session::new(model.graph);
    assert!(matches!(session.eval(model.init, &[]), Err(Error::NotEvaluable { .. })));
    assert!(matches!(session.eval(step, &[]), Err(Error::NotEvaluable { .. })));
    session.run(&[model.init], &[]).unwrap();
    let feed = [(model.x, &x), (model.y, &y)];
    assert!(matches!(session.eval(step, &feed), Err(Error::NotEvaluable { .. })));
    assert_eq!(session.variable(model.w).unwrap().value(), &Tensor::scalar(0.0));
  }

  #[test]
  fn reinitialize_resets_values() {
    let mut model = linear(3);
    let step = Optimizer::new(0.1).minimize(&mut model.graph, model.cost).unwrap();
    let (x, y) = data();
    let mut session = Session::new(model.graph);
    session.run(&[model.init], &[]).unwrap();
    session.run(&[step], &[(model.x, &x), (model.y, &y)]).unwrap();
    assert_ne!(session.variable(model.w).unwrap().item().unwrap(), 0.0);
    session.run(&[model.init], &[]).unwrap();
    assert_eq!(session.variable(model.w).unwrap().item().unwrap(), 0.0);
  }

  #[test]
  fn close_keeps_values() {
    let model = linear(3);
    let mut session = Session::new(model.graph);
    session.run(&[model.init], &[]).unwrap();
    let variables = session.close();
    let names: Vec<_> = variables.iter().map(|variable| variable.name() ).collect();
    assert_eq!(names, vec!["weight", "bias"]);
  }

  #[test]
  fn saved_graph_runs_identically() {
    let model = linear(3);
    let (x, y) = data();
    let path = std::env::temp_dir().join(format!("microflow-session-{}.graph", std::process::id()));
    model.graph.save(&path).unwrap();
    let loaded = Graph::<f64>::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let bindings = |graph: &Graph<f64>| (graph.lookup("X").unwrap(), graph.lookup("Y").unwrap());
    let (lx, ly) = bindings(&loaded);
    let cost = loaded.resolve(model.cost.index()).unwrap();
    let init = loaded.resolve(model.init.index()).unwrap();
    let mut copy = Session::new(loaded);
    copy.run(&[init], &[]).unwrap();
    let mut original = Session::new(model.graph);
    original.run(&[model.init], &[]).unwrap();
    assert_eq!(
      copy.eval(cost, &[(lx, &x), (ly, &y)]).unwrap(),
      original.eval(model.cost, &[(model.x, &x), (model.y, &y)]).unwrap(),
    );
  }
}
