use std::path::{Path, PathBuf};

use fatigue_linalg::{parse_from_str, write_error, write_result, Error, Evaluator};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let default_output = PathBuf::from("output.json");

    if args.len() != 4 {
        log::warn!(
            "expected exactly 3 arguments (<threads> <input-path> <output-path>), got {}",
            args.len().saturating_sub(1)
        );
        report_error(
            &default_output,
            "expected exactly 3 arguments: <threads> <input-path> <output-path>",
        );
        return;
    }

    let output_path = PathBuf::from(&args[3]);

    let threads = match args[1].parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => {
            report_error(&output_path, &format!("invalid thread count: '{}'", args[1]));
            return;
        }
    };

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        run(threads, &args[2])
    }));

    match outcome {
        Ok(Ok(result)) => {
            if let Err(e) = write_result(&output_path, result) {
                log::error!("failed to write result to {}: {e}", output_path.display());
            }
        }
        Ok(Err(e)) => report_error(&output_path, &e.to_string()),
        Err(payload) => report_error(&output_path, &panic_message(payload)),
    }
}

fn run(threads: usize, input_path: &str) -> Result<Vec<Vec<f64>>, Error> {
    let input = std::fs::read_to_string(input_path)?;
    let mut tree = parse_from_str(&input)?;
    let mut evaluator = Evaluator::new(threads)?;
    evaluator.run(&mut tree)
}

fn report_error(path: &Path, message: &str) {
    if let Err(e) = write_error(path, message) {
        log::error!("failed to write error output to {}: {e}", path.display());
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected panic during evaluation".to_string()
    }
}
