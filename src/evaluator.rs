use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::executor::{FatigueExecutor, Task};
use crate::matrix::Matrix;
use crate::tree::{Node, Operator};
use crate::vector::Vector;

/// Drives an expression tree to completion: picks the deepest ready node,
/// stages its operands into the two shared matrix slots, generates
/// row-scoped tasks, dispatches them through the executor, and writes the
/// collected result back into the node. Repeats until the root is a
/// literal.
pub struct Evaluator {
    executor: FatigueExecutor,
    m1: Arc<Mutex<Matrix>>,
    m2: Arc<Mutex<Matrix>>,
}

impl Evaluator {
    pub fn new(num_workers: usize) -> Result<Self, Error> {
        Ok(Self {
            executor: FatigueExecutor::new(num_workers)?,
            m1: Arc::new(Mutex::new(Matrix::empty())),
            m2: Arc::new(Mutex::new(Matrix::empty())),
        })
    }

    /// Evaluates `root` in place and returns the final row-major matrix.
    /// Executor shutdown is guaranteed on the way out via `Drop`, regardless
    /// of whether this returns `Ok` or propagates an error.
    pub fn run(&mut self, root: &mut Node) -> Result<Vec<Vec<f64>>, Error> {
        if let Some(data) = root.literal_data() {
            return Ok(data.clone());
        }

        root.associative_nesting();

        loop {
            match root.find_resolvable_mut() {
                Some(node) => {
                    self.load_and_compute(node)?;
                    let result = self.m1.lock().unwrap().read_row_major();
                    node.resolve(result);
                }
                None => {
                    return match root.literal_data() {
                        Some(data) => Ok(data.clone()),
                        None => Err(Error::InvalidState(
                            "tree exhausted without yielding a literal root".into(),
                        )),
                    };
                }
            }
        }
    }

    fn load_and_compute(&self, node: &Node) -> Result<(), Error> {
        let (op, children) = match node {
            Node::Operator { op, children } => (*op, children),
            Node::Literal(_) => {
                return Err(Error::InvalidState(
                    "only an operator node can be loaded and computed".into(),
                ))
            }
        };

        let arity_ok = match op {
            Operator::Add | Operator::Multiply => children.len() == 2,
            Operator::Negate | Operator::Transpose => children.len() == 1,
        };
        if !arity_ok {
            return Err(Error::InvalidArgument(format!(
                "operator {op:?} cannot run with {} operand(s)",
                children.len()
            )));
        }

        let operands: Vec<&Vec<Vec<f64>>> = children
            .iter()
            .map(|child| {
                child.literal_data().ok_or_else(|| {
                    Error::InvalidState("operand is not yet resolved to a literal".into())
                })
            })
            .collect::<Result<_, _>>()?;

        match op {
            Operator::Add => {
                self.m1.lock().unwrap().load_row_major(operands[0].clone())?;
                self.m2.lock().unwrap().load_row_major(operands[1].clone())?;
                self.check_same_shape()?;
                let tasks = self.generate_add_tasks();
                self.executor.submit_all(tasks);
            }
            Operator::Multiply => {
                self.m1.lock().unwrap().load_row_major(operands[0].clone())?;
                self.m2
                    .lock()
                    .unwrap()
                    .load_column_major(operands[1].clone())?;
                self.check_multiply_shape()?;
                let tasks = self.generate_multiply_tasks();
                self.executor.submit_all(tasks);
            }
            Operator::Negate => {
                self.m1.lock().unwrap().load_row_major(operands[0].clone())?;
                let tasks = self.generate_negate_tasks();
                self.executor.submit_all(tasks);
            }
            Operator::Transpose => {
                self.m1.lock().unwrap().load_row_major(operands[0].clone())?;
                let tasks = self.generate_transpose_tasks();
                self.executor.submit_all(tasks);
            }
        }

        Ok(())
    }

    fn check_same_shape(&self) -> Result<(), Error> {
        let m1 = self.m1.lock().unwrap();
        let m2 = self.m2.lock().unwrap();
        if m1.rows() != m2.rows() || m1.cols() != m2.cols() {
            return Err(Error::DimensionMismatch(format!(
                "add requires operands of equal shape, got {}x{} and {}x{}",
                m1.rows(),
                m1.cols(),
                m2.rows(),
                m2.cols()
            )));
        }
        Ok(())
    }

    fn check_multiply_shape(&self) -> Result<(), Error> {
        let m1 = self.m1.lock().unwrap();
        let m2 = self.m2.lock().unwrap();
        if m1.cols() != m2.rows() {
            return Err(Error::DimensionMismatch(format!(
                "multiply requires cols(left) == rows(right), got {} and {}",
                m1.cols(),
                m2.rows()
            )));
        }
        Ok(())
    }

    fn generate_add_tasks(&self) -> Vec<Task> {
        let m1 = self.m1.lock().unwrap();
        let m2 = self.m2.lock().unwrap();
        (0..m1.rows())
            .map(|i| {
                let a: Arc<Vector> = Arc::clone(m1.get(i).expect("row index in range"));
                let b: Arc<Vector> = Arc::clone(m2.get(i).expect("row index in range"));
                let task: Task = Box::new(move || {
                    a.add(&b).expect("shapes already validated by load_and_compute");
                });
                task
            })
            .collect()
    }

    fn generate_multiply_tasks(&self) -> Vec<Task> {
        let m1 = self.m1.lock().unwrap();
        let m2 = self.m2.lock().unwrap().clone();
        (0..m1.rows())
            .map(|i| {
                let row: Arc<Vector> = Arc::clone(m1.get(i).expect("row index in range"));
                let m2 = m2.clone();
                let task: Task = Box::new(move || {
                    row.vec_mat_mul(&m2)
                        .expect("shape already validated by load_and_compute");
                });
                task
            })
            .collect()
    }

    fn generate_negate_tasks(&self) -> Vec<Task> {
        let m1 = self.m1.lock().unwrap();
        (0..m1.rows())
            .map(|i| {
                let row: Arc<Vector> = Arc::clone(m1.get(i).expect("row index in range"));
                let task: Task = Box::new(move || row.negate());
                task
            })
            .collect()
    }

    /// Captures the input row vectors up front, then hands out one task per
    /// output column. Each task writes only its own row of a private output
    /// buffer; the task that observes the shared remaining-task counter
    /// hit zero installs the buffer into `M1` — the only task that mutates
    /// it. Works correctly even with a single worker, since no task ever
    /// waits on another.
    fn generate_transpose_tasks(&self) -> Vec<Task> {
        let (rows, cols, input_rows) = {
            let m1 = self.m1.lock().unwrap();
            let rows = m1.rows();
            let cols = m1.cols();
            let input_rows: Vec<Arc<Vector>> = (0..rows)
                .map(|i| Arc::clone(m1.get(i).expect("row index in range")))
                .collect();
            (rows, cols, input_rows)
        };

        // A matrix with zero columns (e.g. the literal `[[]]`) transposes to
        // zero rows. No per-column task would ever run to drive the
        // last-finisher install, so install the (empty) transposed shape
        // directly instead of leaving M1's prior, un-transposed contents in
        // place.
        if cols == 0 {
            self.m1
                .lock()
                .unwrap()
                .load_row_major(Vec::new())
                .expect("an empty matrix is trivially rectangular");
            return Vec::new();
        }

        let output: Arc<Mutex<Vec<Vec<f64>>>> = Arc::new(Mutex::new(vec![vec![0.0; rows]; cols]));
        let remaining = Arc::new(AtomicUsize::new(cols));
        let m1_handle = Arc::clone(&self.m1);

        (0..cols)
            .map(|c| {
                let input_rows = input_rows.clone();
                let output = Arc::clone(&output);
                let remaining = Arc::clone(&remaining);
                let m1_handle = Arc::clone(&m1_handle);
                let task: Task = Box::new(move || {
                    let mut column = vec![0.0; rows];
                    for (r, slot) in column.iter_mut().enumerate() {
                        *slot = input_rows[r]
                            .get(c)
                            .expect("column index validated by load_and_compute");
                    }
                    {
                        let mut out = output.lock().unwrap();
                        out[c] = column;
                    }
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        let data = std::mem::take(&mut *output.lock().unwrap());
                        m1_handle
                            .lock()
                            .unwrap()
                            .load_row_major(data)
                            .expect("transpose buffer is rectangular by construction");
                    }
                });
                task
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Node, Operator};

    fn literal(data: Vec<Vec<f64>>) -> Node {
        Node::literal(data)
    }

    #[test]
    fn literal_passthrough() {
        let mut tree = literal(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let mut evaluator = Evaluator::new(2).unwrap();
        let result = evaluator.run(&mut tree).unwrap();
        assert_eq!(result, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn add_two_matrices() {
        let mut tree = Node::operator(
            Operator::Add,
            vec![
                literal(vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
                literal(vec![vec![10.0, 20.0], vec![30.0, 40.0]]),
            ],
        );
        let mut evaluator = Evaluator::new(3).unwrap();
        let result = evaluator.run(&mut tree).unwrap();
        assert_eq!(result, vec![vec![11.0, 22.0], vec![33.0, 44.0]]);
    }

    #[test]
    fn multiply_two_matrices() {
        let mut tree = Node::operator(
            Operator::Multiply,
            vec![
                literal(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]),
                literal(vec![vec![7.0, 8.0], vec![9.0, 10.0], vec![11.0, 12.0]]),
            ],
        );
        let mut evaluator = Evaluator::new(4).unwrap();
        let result = evaluator.run(&mut tree).unwrap();
        assert_eq!(result, vec![vec![58.0, 64.0], vec![139.0, 154.0]]);
    }

    #[test]
    fn negate_a_matrix() {
        let mut tree = Node::operator(
            Operator::Negate,
            vec![literal(vec![vec![1.0, -2.0], vec![3.0, 0.0]])],
        );
        let mut evaluator = Evaluator::new(2).unwrap();
        let result = evaluator.run(&mut tree).unwrap();
        assert_eq!(result, vec![vec![-1.0, 2.0], vec![-3.0, 0.0]]);
    }

    #[test]
    fn transpose_with_a_single_worker_exercises_the_last_finisher_path() {
        let mut tree = Node::operator(
            Operator::Transpose,
            vec![literal(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]])],
        );
        let mut evaluator = Evaluator::new(1).unwrap();
        let result = evaluator.run(&mut tree).unwrap();
        assert_eq!(
            result,
            vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]
        );
    }

    #[test]
    fn transpose_of_a_zero_column_matrix_yields_zero_rows() {
        let mut tree = Node::operator(Operator::Transpose, vec![literal(vec![vec![]])]);
        let mut evaluator = Evaluator::new(2).unwrap();
        let result = evaluator.run(&mut tree).unwrap();
        assert_eq!(result, Vec::<Vec<f64>>::new());
    }

    #[test]
    fn nary_left_associative_add() {
        let mut tree = Node::operator(
            Operator::Add,
            vec![
                literal(vec![vec![1.0, 1.0], vec![1.0, 1.0]]),
                literal(vec![vec![2.0, 2.0], vec![2.0, 2.0]]),
                literal(vec![vec![3.0, 3.0], vec![3.0, 3.0]]),
            ],
        );
        let mut evaluator = Evaluator::new(3).unwrap();
        let result = evaluator.run(&mut tree).unwrap();
        assert_eq!(result, vec![vec![6.0, 6.0], vec![6.0, 6.0]]);
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let mut tree = Node::operator(
            Operator::Add,
            vec![
                literal(vec![vec![1.0, 2.0]]),
                literal(vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
            ],
        );
        let mut evaluator = Evaluator::new(2).unwrap();
        assert!(matches!(
            evaluator.run(&mut tree),
            Err(Error::DimensionMismatch(_))
        ));
    }

    #[test]
    fn zero_workers_is_rejected_at_construction() {
        assert!(matches!(Evaluator::new(0), Err(Error::InvalidArgument(_))));
    }
}
