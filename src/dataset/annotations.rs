//! Annotation table parsing
//!
//! The table is a CSV file with a header row. The first column holds the image
//! file name and is used as the row key; the remaining columns hold attribute
//! scores (e.g. `Dominance`).

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::utils::error::{FaceAttributeError, Result};

/// Annotation rows keyed by image file name
#[derive(Debug, Clone, Default)]
pub struct AnnotationTable {
    headers: Vec<String>,
    rows: HashMap<String, Vec<String>>,
}

impl AnnotationTable {
    /// Read an annotation CSV from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceAttributeError::PathNotFound(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        debug!(
            "Parsed {} annotation rows with columns {:?} from {:?}",
            table.len(),
            table.headers,
            path
        );
        Ok(table)
    }

    /// Parse annotation CSV data from any reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect();
        if headers.is_empty() {
            return Err(FaceAttributeError::Annotation(
                "annotation table has no columns".to_string(),
            ));
        }

        let mut rows = HashMap::new();
        for record in csv_reader.records() {
            let record = record?;
            let Some(key) = record.get(0) else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            let values = record.iter().skip(1).map(|v| v.to_string()).collect();
            rows.insert(key.to_string(), values);
        }

        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names, key column first
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Whether an image name appears as a row key
    pub fn contains(&self, name: &str) -> bool {
        self.rows.contains_key(name)
    }

    /// Index of `attribute` among the value columns
    pub fn column_index(&self, attribute: &str) -> Result<usize> {
        self.headers
            .iter()
            .skip(1)
            .position(|h| h == attribute)
            .ok_or_else(|| {
                FaceAttributeError::Annotation(format!(
                    "attribute column '{}' not found (columns: {})",
                    attribute,
                    self.headers.join(", ")
                ))
            })
    }

    /// Attribute value of one image
    ///
    /// `Ok(None)` when the image has no row.
    pub fn value(&self, name: &str, column: usize) -> Result<Option<f32>> {
        let Some(values) = self.rows.get(name) else {
            return Ok(None);
        };
        let raw = values.get(column).ok_or_else(|| {
            FaceAttributeError::Annotation(format!("row '{}' has no column {}", name, column + 1))
        })?;
        raw.parse::<f32>().map(Some).map_err(|e| {
            FaceAttributeError::Annotation(format!(
                "invalid value '{}' for '{}': {}",
                raw, name, e
            ))
        })
    }

    /// Every parseable value of `attribute`, ordered by image name
    pub fn values(&self, attribute: &str) -> Result<Vec<f32>> {
        let column = self.column_index(attribute)?;
        let mut names: Vec<&String> = self.rows.keys().collect();
        names.sort();

        let mut values = Vec::with_capacity(names.len());
        for name in names {
            match self.value(name, column) {
                Ok(Some(v)) => values.push(v),
                Ok(None) => {}
                Err(e) => debug!("Skipping {}: {}", name, e),
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
image,Dominance,Trustworthiness
face_001.png,3.5,2.0
face_002.png, 1.25 ,4.0
face_003.png,n/a,1.0
";

    #[test]
    fn test_parse_table() {
        let table = AnnotationTable::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.headers()[0], "image");
        assert!(table.contains("face_001.png"));
        assert!(!table.contains("face_999.png"));
    }

    #[test]
    fn test_lookup_by_attribute() {
        let table = AnnotationTable::from_reader(CSV.as_bytes()).unwrap();
        let dominance = table.column_index("Dominance").unwrap();
        let trust = table.column_index("Trustworthiness").unwrap();

        assert_eq!(table.value("face_001.png", dominance).unwrap(), Some(3.5));
        assert_eq!(table.value("face_002.png", dominance).unwrap(), Some(1.25));
        assert_eq!(table.value("face_002.png", trust).unwrap(), Some(4.0));
        assert_eq!(table.value("face_999.png", dominance).unwrap(), None);
    }

    #[test]
    fn test_unknown_attribute() {
        let table = AnnotationTable::from_reader(CSV.as_bytes()).unwrap();
        let err = table.column_index("Attractiveness").unwrap_err();
        assert!(matches!(err, FaceAttributeError::Annotation(_)));
        assert!(table.column_index("image").is_err());
    }

    #[test]
    fn test_unparseable_value() {
        let table = AnnotationTable::from_reader(CSV.as_bytes()).unwrap();
        let column = table.column_index("Dominance").unwrap();
        assert!(table.value("face_003.png", column).is_err());
    }

    #[test]
    fn test_column_values_skip_invalid() {
        let table = AnnotationTable::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(table.values("Dominance").unwrap(), vec![3.5, 1.25]);
        assert_eq!(table.values("Trustworthiness").unwrap(), vec![2.0, 4.0, 1.0]);
    }

    #[test]
    fn test_missing_file() {
        let err = AnnotationTable::load(Path::new("/nonexistent/annotations.csv")).unwrap_err();
        assert!(matches!(err, FaceAttributeError::PathNotFound(_)));
    }
}
