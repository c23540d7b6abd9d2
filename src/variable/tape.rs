use std::cell::{ Cell, RefCell };
use std::collections::HashMap;

use log::{ debug, trace };

use crate::{
  error::{ Error, Result },
  ops::{ Op, Trace, backpropagate },
  scalar::Real,
  shape::Shape,
  tensor::Tensor,
  variable::Variable,
};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Recording,
  Stopped,
  Spent,
}

#[derive(Debug)]
struct Record<T: Real> {
  value: Tensor<T>,
  op: Option<(Op<T>, Vec<usize>)>,
}

impl<T: Real> Trace<T> for Vec<Record<T>> {
  fn operation(&self, index: usize) -> Option<(&Op<T>, &[usize])> {
    self.get(index)?.op.as_ref().map(|(op, inputs)| (op, inputs.as_slice()) )
  }

  fn value(&self, index: usize) -> Option<&Tensor<T>> {
    self.get(index).map(|record| &record.value )
  }
}


/// Records eagerly executed operations for reverse-mode differentiation.
///
/// Recording starts when the tape gets created and ends when it is dropped,
/// when [stop_recording](Self::stop_recording) is called or after gradients
/// have been computed. Only operations performed on [Tracked] handles of
/// this tape get recorded. A tape computes gradients only once.
///
/// ```
/// use microflow::{ GradientTape, Tensor, Variable };
///
/// let w = Variable::scalar("weight", 3.0);
/// let tape = GradientTape::new();
/// let x = tape.watch(&w).unwrap();
/// let y = x.mul(&x).unwrap().reduce_sum().unwrap();
/// let grads = tape.gradient(&y, &[&w]).unwrap();
/// assert_eq!(grads[0], Tensor::scalar(6.0));
/// ```

#[derive(Debug)]
pub struct GradientTape<T: Real> {
  records: RefCell<Vec<Record<T>>>,
  watched: RefCell<HashMap<usize, usize>>,
  state: Cell<State>,
}

impl<T: Real> Default for GradientTape<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Real> GradientTape<T> {
  pub fn new() -> Self {
    Self {
      records: RefCell::new(vec![]),
      watched: RefCell::new(HashMap::new()),
      state: Cell::new(State::Recording),
    }
  }

  pub fn is_recording(&self) -> bool {
    self.state.get() == State::Recording
  }

  /// End the recording scope early. Gradients may still be computed.

  pub fn stop_recording(&self) {
    if self.is_recording() {
      self.state.set(State::Stopped);
    }
  }

  pub fn len(&self) -> usize {
    self.records.borrow().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Start tracking a variable. Watching the same variable twice
  /// yields the same handle.

  pub fn watch(&self, variable: &Variable<T>) -> Result<Tracked<'_, T>> {
    self.ensure_recording()?;
    if let Some(&index) = self.watched.borrow().get(&variable.id()) {
      return Ok(Tracked { tape: self, index })
    }
    let index = self.push(variable.value().clone(), None);
    self.watched.borrow_mut().insert(variable.id(), index);
    trace!("watching {} as record {index}", variable.name());
    Ok(Tracked { tape: self, index })
  }

  /// Record a value that takes part in the computation without being differentiated.

  pub fn constant(&self, tensor: &Tensor<T>) -> Result<Tracked<'_, T>> {
    self.ensure_recording()?;
    let index = self.push(tensor.clone(), None);
    Ok(Tracked { tape: self, index })
  }

  /// Compute the gradient of a scalar `target` with respect to each of `sources`.
  ///
  /// Gradients are returned in the order of `sources` and match their shapes.

  pub fn gradient(&self, target: &Tracked<'_, T>, sources: &[&Variable<T>]) -> Result<Vec<Tensor<T>>> {
    if self.state.get() == State::Spent { return Err(Error::DoubleRecording) }
    self.state.set(State::Spent);
    if !std::ptr::eq(target.tape, self) {
      return Err(Error::UngatedTapeAccess("target was recorded by a different tape".to_string()))
    }
    let records = self.records.borrow();
    let loss = &records[target.index].value;
    if loss.size() != 1 {
      return Err(Error::ShapeMismatch { op: "gradient", lhs: loss.shape().clone(), rhs: Shape::scalar() })
    }
    let grads = backpropagate(&*records, target.index)?;
    debug!("back-propagated through {} records", records.len());
    let watched = self.watched.borrow();
    sources.iter()
      .map(|variable| {
        let index = watched.get(&variable.id()).ok_or_else(|| Error::UngatedTapeAccess(
          format!("variable '{}' is not watched by this tape", variable.name())
        ))?;
        grads.get(index).cloned().ok_or_else(|| Error::UngatedTapeAccess(
          format!("variable '{}' does not contribute to the target", variable.name())
        ))
      })
      .collect()
  }

  fn ensure_recording(&self) -> Result<()> {
    match self.state.get() {
      State::Recording => Ok(()),
      State::Stopped => Err(Error::UngatedTapeAccess("tape has stopped recording".to_string())),
      State::Spent => Err(Error::UngatedTapeAccess("tape was already used".to_string())),
    }
  }

  fn push(&self, value: Tensor<T>, op: Option<(Op<T>, Vec<usize>)>) -> usize {
    let mut records = self.records.borrow_mut();
    records.push(Record { value, op });
    records.len() - 1
  }

  fn record(&self, op: Op<T>, inputs: &[&Tracked<'_, T>]) -> Result<Tracked<'_, T>> {
    self.ensure_recording()?;
    if inputs.iter().any(|input| !std::ptr::eq(input.tape, self) ) {
      return Err(Error::UngatedTapeAccess("operand was recorded by a different tape".to_string()))
    }
    let indices: Vec<usize> = inputs.iter().map(|input| input.index ).collect();
    let value = {
      let records = self.records.borrow();
      let values: Vec<&Tensor<T>> = indices.iter().map(|&i| &records[i].value ).collect();
      op.run(&values)?
    };
    trace!("recorded {} into {}", op.name(), value.shape());
    let index = self.push(value, Some((op, indices)));
    Ok(Tracked { tape: self, index })
  }
}

impl<T: Real> Drop for GradientTape<T> {
  fn drop(&mut self) {
    trace!("released gradient tape with {} records", self.records.get_mut().len());
  }
}


/// Handle to a value recorded on a [GradientTape].
///
/// Arithmetic on handles executes immediately and gets recorded.

#[derive(Clone, Copy)]
pub struct Tracked<'t, T: Real> {
  tape: &'t GradientTape<T>,
  index: usize,
}

impl<'t, T: Real> Tracked<'t, T> {
  pub fn value(&self) -> Tensor<T> {
    self.tape.records.borrow()[self.index].value.clone()
  }

  pub fn shape(&self) -> Shape {
    self.tape.records.borrow()[self.index].value.shape().clone()
  }

  pub fn item(&self) -> Result<T> {
    self.tape.records.borrow()[self.index].value.item()
  }

  pub fn add(&self, rhs: &Self) -> Result<Self> {
    self.tape.record(Op::Add, &[self, rhs])
  }

  pub fn sub(&self, rhs: &Self) -> Result<Self> {
    self.tape.record(Op::Subtract, &[self, rhs])
  }

  pub fn mul(&self, rhs: &Self) -> Result<Self> {
    self.tape.record(Op::Multiply, &[self, rhs])
  }

  pub fn div(&self, rhs: &Self) -> Result<Self> {
    self.tape.record(Op::Divide, &[self, rhs])
  }

  pub fn pow(&self, exponent: T) -> Result<Self> {
    self.tape.record(Op::Pow(exponent), &[self])
  }

  pub fn reduce_sum(&self) -> Result<Self> {
    self.tape.record(Op::ReduceSum, &[self])
  }

  pub fn div_scalar(&self, divisor: T) -> Result<Self> {
    let divisor = self.tape.constant(&Tensor::scalar(divisor))?;
    self.div(&divisor)
  }
}

impl<T: Real> std::fmt::Debug for Tracked<'_, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    f.debug_struct("Tracked").field("index", &self.index).finish()
  }
}
