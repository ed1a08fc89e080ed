//! Label CSV import/export (`begin index;end index;label`).

use std::path::Path;

use log::info;

use crate::error::{EditorError, Result};

const HEADER: [&str; 3] = ["begin index", "end index", "label"];

/// Write `(start, end, name)` triples as a `;`-delimited CSV with header.
pub fn export_labels(path: impl AsRef<Path>, labels: &[(i64, i64, String)]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(path)?;
    writer.write_record(HEADER)?;
    for (start, end, name) in labels {
        writer.write_record([start.to_string(), end.to_string(), name.clone()])?;
    }
    writer.flush()?;
    info!("exported {} labels to {}", labels.len(), path.display());
    Ok(())
}

/// Read triples written by [`export_labels`].
pub fn import_labels(path: impl AsRef<Path>) -> Result<Vec<(i64, i64, String)>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .from_path(path)?;
    let mut labels = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| record.get(i).map(str::trim).unwrap_or_default();
        let parse = |i: usize| {
            field(i).parse::<i64>().map_err(|e| {
                EditorError::InvalidRecording(format!("{}:{}: {}", path.display(), line + 2, e))
            })
        };
        labels.push((parse(0)?, parse(1)?, field(2).to_string()));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        export_labels(&path, &[(100, 200, "wave".into()), (250, 260, "point".into())]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "begin index;end index;label\n100;200;wave\n250;260;point\n");
        assert_eq!(import_labels(&path).unwrap()[1], (250, 260, "point".to_string()));
    }

    #[test]
    fn test_import_rejects_bad_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, "begin index;end index;label\nten;20;x\n").unwrap();
        assert!(matches!(import_labels(&path), Err(EditorError::InvalidRecording(_))));
    }
}
