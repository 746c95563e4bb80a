//! Evaluates a tree of dense linear-algebra expressions (n-ary add, n-ary
//! left-associative multiply, unary negate, unary transpose) in parallel
//! over a fixed-size, fatigue-priority worker pool.
//!
//! The two load-bearing subsystems are [`executor::FatigueExecutor`], which
//! schedules row-scoped tasks onto the least-tired idle worker, and
//! [`evaluator::Evaluator`], which stages each operator's operands into a
//! pair of shared matrix slots and drives the expression tree to a single
//! literal result.

mod error;
mod evaluator;
mod executor;
mod matrix;
mod parser;
mod tree;
mod vector;
mod worker;
mod writer;

pub use error::Error;
pub use evaluator::Evaluator;
pub use executor::FatigueExecutor;
pub use matrix::Matrix;
pub use parser::parse_from_str;
pub use tree::{Node, Operator};
pub use vector::{Orientation, Vector};
pub use writer::{write_error, write_result};
