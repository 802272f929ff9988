use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which of the two on-disk box schemas a label file uses.
///
/// Both store four normalized floats per box; they are freely convertible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelFormat {
    /// `[x_min, y_min, x_max, y_max]`, all in `[0, 1]`.
    Corners,
    /// `[cx, cy, w, h]`, all in `[0, 1]`.
    #[default]
    CenterSize,
}

/// A single labeled box. The box is held in the corner schema; `class_id`
/// indexes into the manifest's class-name table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub class_id: u32,
    /// Normalized `[x_min, y_min, x_max, y_max]`.
    pub bbox: [f32; 4],
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("bbox contains non-finite values: {0:?}")]
    NonFinite([f32; 4]),
    #[error("bbox out of [0,1] range: {0:?}")]
    OutOfRange([f32; 4]),
    #[error("corner bbox min >= max: {0:?}")]
    Degenerate([f32; 4]),
    #[error("center/size bbox has non-positive extent: {0:?}")]
    EmptyExtent([f32; 4]),
    #[error("class id {class_id} out of range for {num_classes} classes")]
    ClassOutOfRange { class_id: u32, num_classes: usize },
}

/// Check a corner-schema box: finite, within the unit square, min < max.
pub fn validate_corner(bbox: [f32; 4]) -> Result<(), ValidationError> {
    if bbox.iter().any(|v| !v.is_finite()) {
        return Err(ValidationError::NonFinite(bbox));
    }
    if bbox.iter().any(|v| *v < 0.0 || *v > 1.0) {
        return Err(ValidationError::OutOfRange(bbox));
    }
    if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
        return Err(ValidationError::Degenerate(bbox));
    }
    Ok(())
}

/// Check a center/size-schema box: finite, within range, positive extent.
pub fn validate_center(bbox: [f32; 4]) -> Result<(), ValidationError> {
    if bbox.iter().any(|v| !v.is_finite()) {
        return Err(ValidationError::NonFinite(bbox));
    }
    if bbox.iter().any(|v| *v < 0.0 || *v > 1.0) {
        return Err(ValidationError::OutOfRange(bbox));
    }
    if bbox[2] <= 0.0 || bbox[3] <= 0.0 {
        return Err(ValidationError::EmptyExtent(bbox));
    }
    Ok(())
}

/// `[cx, cy, w, h]` -> `[x_min, y_min, x_max, y_max]`.
pub fn center_to_corner(bbox: [f32; 4]) -> [f32; 4] {
    let [cx, cy, w, h] = bbox;
    [
        cx - w / 2.0,
        cy - h / 2.0,
        cx + w / 2.0,
        cy + h / 2.0,
    ]
}

/// `[x_min, y_min, x_max, y_max]` -> `[cx, cy, w, h]`.
pub fn corner_to_center(bbox: [f32; 4]) -> [f32; 4] {
    let [x0, y0, x1, y1] = bbox;
    [
        (x0 + x1) / 2.0,
        (y0 + y1) / 2.0,
        x1 - x0,
        y1 - y0,
    ]
}

/// Clamp a corner box to the unit square, keeping min <= max per axis.
pub fn clamp_corner(bbox: [f32; 4]) -> [f32; 4] {
    let x0 = bbox[0].clamp(0.0, 1.0);
    let y0 = bbox[1].clamp(0.0, 1.0);
    let x1 = bbox[2].clamp(x0, 1.0);
    let y1 = bbox[3].clamp(y0, 1.0);
    [x0, y0, x1, y1]
}

impl Annotation {
    pub fn new(class_id: u32, bbox: [f32; 4]) -> Self {
        Self { class_id, bbox }
    }

    pub fn validate(&self, num_classes: usize) -> Result<(), ValidationError> {
        validate_corner(self.bbox)?;
        if self.class_id as usize >= num_classes {
            return Err(ValidationError::ClassOutOfRange {
                class_id: self.class_id,
                num_classes,
            });
        }
        Ok(())
    }

    /// The box in the requested on-disk schema.
    pub fn bbox_as(&self, format: LabelFormat) -> [f32; 4] {
        match format {
            LabelFormat::Corners => self.bbox,
            LabelFormat::CenterSize => corner_to_center(self.bbox),
        }
    }

    /// Build from four on-disk floats in the given schema.
    pub fn from_raw(class_id: u32, raw: [f32; 4], format: LabelFormat) -> Self {
        let bbox = match format {
            LabelFormat::Corners => raw,
            LabelFormat::CenterSize => center_to_corner(raw),
        };
        Self { class_id, bbox }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_center_round_trip() {
        let corner = [0.1, 0.2, 0.6, 0.9];
        let back = center_to_corner(corner_to_center(corner));
        for (a, b) in corner.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn center_to_corner_stays_in_range() {
        let corner = center_to_corner([0.5, 0.5, 1.0, 1.0]);
        assert!(validate_corner(corner).is_ok());
    }

    #[test]
    fn validate_rejects_inverted_corners() {
        assert!(matches!(
            validate_corner([0.6, 0.2, 0.1, 0.9]),
            Err(ValidationError::Degenerate(_))
        ));
    }

    #[test]
    fn validate_rejects_nan() {
        assert!(matches!(
            validate_corner([f32::NAN, 0.2, 0.5, 0.9]),
            Err(ValidationError::NonFinite(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_extent_center() {
        assert!(matches!(
            validate_center([0.5, 0.5, 0.0, 0.2]),
            Err(ValidationError::EmptyExtent(_))
        ));
    }

    #[test]
    fn clamp_preserves_ordering() {
        let clamped = clamp_corner([-0.2, 0.1, 1.4, 0.9]);
        assert_eq!(clamped, [0.0, 0.1, 1.0, 0.9]);
        assert!(validate_corner(clamped).is_ok());
    }

    #[test]
    fn annotation_class_range_checked() {
        let ann = Annotation::new(3, [0.1, 0.1, 0.5, 0.5]);
        assert!(ann.validate(4).is_ok());
        assert!(matches!(
            ann.validate(3),
            Err(ValidationError::ClassOutOfRange { .. })
        ));
    }

    #[test]
    fn from_raw_center_size_converts() {
        let ann = Annotation::from_raw(0, [0.5, 0.5, 0.2, 0.4], LabelFormat::CenterSize);
        let expect = [0.4, 0.3, 0.6, 0.7];
        for (a, b) in ann.bbox.iter().zip(expect.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
