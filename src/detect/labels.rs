use std::path::Path;

use crate::error::{CourtError, Result};

/// Label used for a class index with no entry in the label list.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Load an ordered label list, one label per line.
pub fn load_labels<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        CourtError::model_load(format!("failed to read labels {}: {}", path.display(), e))
    })?;
    let labels = parse_labels(&raw);
    if labels.is_empty() {
        return Err(CourtError::model_load(format!(
            "label file {} is empty",
            path.display()
        )));
    }
    Ok(labels)
}

pub fn parse_labels(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn label_for(labels: &[String], class_id: usize) -> &str {
    labels
        .get(class_id)
        .map(String::as_str)
        .unwrap_or(UNKNOWN_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn blank_lines_are_skipped() {
        let labels = parse_labels("person\n\n bicycle \ncar\n");
        assert_eq!(labels, vec!["person", "bicycle", "car"]);
        assert_eq!(label_for(&labels, 2), "car");
        assert_eq!(label_for(&labels, 3), UNKNOWN_LABEL);
    }

    #[test]
    fn missing_or_empty_file_is_model_load_error() {
        let err = load_labels("/nonexistent/labels.txt").unwrap_err();
        assert!(matches!(err, CourtError::ModelLoadError(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\n\n").unwrap();
        assert!(matches!(
            load_labels(file.path()),
            Err(CourtError::ModelLoadError(_))
        ));
    }
}
