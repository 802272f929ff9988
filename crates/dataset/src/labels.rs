//! Label file IO in both on-disk schemas.
//!
//! One text file per image, one annotation per line:
//! `<class> <a> <b> <c> <d>`, where the four floats are read per the
//! manifest's label format. Annotations are held internally in the corner
//! schema regardless of what is on disk.

use crate::types::{DatasetError, DatasetResult};
use data_contracts::{Annotation, LabelFormat};
use std::path::Path;

/// Parse a label file. A missing file means zero annotations.
pub fn read_labels(
    path: &Path,
    format: LabelFormat,
    num_classes: usize,
) -> DatasetResult<Vec<Annotation>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(DatasetError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    parse_labels(&raw, path, format, num_classes)
}

fn parse_labels(
    raw: &str,
    path: &Path,
    format: LabelFormat,
    num_classes: usize,
) -> DatasetResult<Vec<Annotation>> {
    let mut annotations = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(DatasetError::Label {
                path: path.to_path_buf(),
                line: line_no,
                msg: format!("expected 5 fields, found {}", fields.len()),
            });
        }
        let class_id: u32 = fields[0].parse().map_err(|_| DatasetError::Label {
            path: path.to_path_buf(),
            line: line_no,
            msg: format!("invalid class id {:?}", fields[0]),
        })?;
        let mut coords = [0.0f32; 4];
        for (i, field) in fields[1..].iter().enumerate() {
            coords[i] = field.parse().map_err(|_| DatasetError::Label {
                path: path.to_path_buf(),
                line: line_no,
                msg: format!("invalid coordinate {:?}", field),
            })?;
        }
        let annotation = Annotation::from_raw(class_id, coords, format);
        annotation
            .validate(num_classes)
            .map_err(|e| DatasetError::Annotation {
                path: path.to_path_buf(),
                line: line_no,
                source: e,
            })?;
        annotations.push(annotation);
    }
    Ok(annotations)
}

/// Write a label file in the requested schema. Creates parent directories.
pub fn write_labels(
    path: &Path,
    annotations: &[Annotation],
    format: LabelFormat,
) -> DatasetResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatasetError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let mut out = String::new();
    for annotation in annotations {
        let [a, b, c, d] = annotation.bbox_as(format);
        out.push_str(&format!(
            "{} {:.6} {:.6} {:.6} {:.6}\n",
            annotation.class_id, a, b, c, d
        ));
    }
    std::fs::write(path, out).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
