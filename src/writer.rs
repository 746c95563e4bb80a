use std::path::Path;

use serde::Serialize;

use crate::error::Error;

#[derive(Serialize)]
struct OutputDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Writes `{"result": <2-D array>}` to `path`.
pub fn write_result(path: &Path, result: Vec<Vec<f64>>) -> Result<(), Error> {
    write_doc(
        path,
        &OutputDoc {
            result: Some(result),
            error: None,
        },
    )
}

/// Writes `{"error": <string>}` to `path`. An empty message falls back to a
/// fixed string.
pub fn write_error(path: &Path, message: &str) -> Result<(), Error> {
    let message = if message.trim().is_empty() {
        "unknown error".to_string()
    } else {
        message.to_string()
    };
    write_doc(
        path,
        &OutputDoc {
            result: None,
            error: Some(message),
        },
    )
}

fn write_doc(path: &Path, doc: &OutputDoc) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(doc)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn write_result_produces_the_fixed_result_shape() {
        let dir = std::env::temp_dir().join("fatigue_linalg_writer_result_test");
        write_result(&dir, vec![vec![1.0, 2.0]]).unwrap();
        let contents = fs::read_to_string(&dir).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["result"], serde_json::json!([[1.0, 2.0]]));
        assert!(value.get("error").is_none());
        let _ = fs::remove_file(&dir);
    }

    #[test]
    fn write_error_produces_the_fixed_error_shape() {
        let dir = std::env::temp_dir().join("fatigue_linalg_writer_error_test");
        write_error(&dir, "boom").unwrap();
        let contents = fs::read_to_string(&dir).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["error"], "boom");
        assert!(value.get("result").is_none());
        let _ = fs::remove_file(&dir);
    }

    #[test]
    fn empty_error_message_falls_back_to_a_fixed_string() {
        let dir = std::env::temp_dir().join("fatigue_linalg_writer_empty_error_test");
        write_error(&dir, "").unwrap();
        let contents = fs::read_to_string(&dir).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["error"], "unknown error");
        let _ = fs::remove_file(&dir);
    }
}
