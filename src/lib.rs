//! Automatic differentiation in two flavours, small enough to read in one sitting.
//! CPU only. Few dependencies.
//!
//! # Features
//!
//! - **Eager mode** — Operations on [Tracked] handles execute immediately and get
//! recorded on a [GradientTape], which replays them in reverse to compute gradients.
//!
//! - **Graph mode** — A [Graph] describes a computation symbolically. A [Session]
//! owns the variables, binds [placeholders](Graph::placeholder) to data and
//! evaluates only what a fetched node depends on.
//!
//! - **Shared derivatives** — Both modes differentiate through the same [Op] rules,
//! so they agree on every gradient.
//!
//! - **Graph recycling** — Graphs can be serialized and loaded elsewhere,
//! without access to the code that built them.
//!
//! - **Training** — A plain gradient descent [Optimizer] plus a configurable
//! [linear regression](train::LinearRegression) training loop on top.
//!
//! # Examples
//!
//! Fitting `y = W * x + b` eagerly:
//! ```
//! use microflow::{ GradientTape, Optimizer, Tensor, Variable };
//!
//! let x = Tensor::vec(&[1.0, 2.0, 3.0]);
//! let y = Tensor::vec(&[1.0, 2.0, 3.0]);
//! let mut w = Variable::scalar("weight", 0.0f64);
//! let mut b = Variable::scalar("bias", 0.0);
//! let optimizer = Optimizer::new(0.1);
//!
//! for _ in 0..1000 {
//!   let grads = {
//!     let tape = GradientTape::new();
//!     let (tw, tb) = (tape.watch(&w).unwrap(), tape.watch(&b).unwrap());
//!     let (tx, ty) = (tape.constant(&x).unwrap(), tape.constant(&y).unwrap());
//!     let loss = tw.mul(&tx).unwrap().add(&tb).unwrap()
//!       .sub(&ty).unwrap()
//!       .pow(2.0).unwrap()
//!       .reduce_sum().unwrap()
//!       .div_scalar(6.0).unwrap();
//!     let grads = tape.gradient(&loss, &[&w, &b]).unwrap();
//!     grads
//!   };
//!   optimizer.apply_gradients(grads.into_iter().zip([&mut w, &mut b])).unwrap();
//! }
//! assert!((w.item().unwrap() - 1.0).abs() < 0.1);
//! ```
//!
//! The same model as a graph:
//! ```
//! use microflow::{ Graph, Optimizer, Session, Tensor };
//!
//! let mut graph = Graph::new();
//! let x = graph.placeholder("X", None);
//! let y = graph.placeholder("Y", None);
//! let w = graph.variable("weight", Tensor::scalar(0.0f64));
//! let b = graph.variable("bias", Tensor::scalar(0.0));
//! let product = graph.multiply(x, w).unwrap();
//! let prediction = graph.add(product, b).unwrap();
//! let error = graph.subtract(prediction, y).unwrap();
//! let squared = graph.pow(error, 2.0).unwrap();
//! let total = graph.reduce_sum(squared).unwrap();
//! let divisor = graph.scalar(6.0);
//! let cost = graph.divide(total, divisor).unwrap();
//! let train = Optimizer::new(0.1).minimize(&mut graph, cost).unwrap();
//! let init = graph.global_variables_initializer();
//!
//! let mut session = Session::new(graph);
//! session.run(&[init], &[]).unwrap();
//! let data = Tensor::vec(&[1.0, 2.0, 3.0]);
//! for _ in 0..1000 {
//!   session.run(&[train], &[(x, &data), (y, &data)]).unwrap();
//! }
//! assert!((session.variable(w).unwrap().item().unwrap() - 1.0).abs() < 0.1);
//! ```
//!
//! ## More examples
//! Check the `/demos` folder for a complete training run.

mod internal;
mod shape;
mod tensor;
mod variable;
mod error;

pub mod ops;
pub mod scalar;
pub mod graph;
pub mod optimize;
pub mod config;
pub mod data;
pub mod train;

pub use shape::Shape;
pub use tensor::Tensor;
pub use variable::{ Variable, GradientTape, Tracked };
pub use graph::{ Graph, Node, NodeId, Session };
pub use optimize::Optimizer;
pub use ops::Op;
pub use error::{ Error, Result };
