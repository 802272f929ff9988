use crate::annotation::LabelFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("yaml parse error at {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("manifest validation failed at {path}: {msg}")]
    Validation { path: PathBuf, msg: String },
}

/// The `data.yaml` dataset manifest.
///
/// External fixed schema: split directories relative to `path` (or to the
/// manifest's own directory when `path` is absent), the ordered class-name
/// table, and the on-disk label schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub train: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<String>,
    pub names: Vec<String>,
    #[serde(default)]
    pub label_format: LabelFormat,
}

impl DatasetManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let manifest: DatasetManifest =
            serde_yaml::from_str(&raw).map_err(|e| ManifestError::Yaml {
                path: path.to_path_buf(),
                source: e,
            })?;
        manifest.validate(path)?;
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let raw = serde_yaml::to_string(self).map_err(|e| ManifestError::Yaml {
            path: path.to_path_buf(),
            source: e,
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ManifestError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, raw).map_err(|e| ManifestError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn validate(&self, path: &Path) -> Result<(), ManifestError> {
        if self.train.trim().is_empty() {
            return Err(ManifestError::Validation {
                path: path.to_path_buf(),
                msg: "train split path is empty".into(),
            });
        }
        if self.names.is_empty() {
            return Err(ManifestError::Validation {
                path: path.to_path_buf(),
                msg: "names table is empty".into(),
            });
        }
        let unique: BTreeSet<&str> = self.names.iter().map(String::as_str).collect();
        if unique.len() != self.names.len() {
            return Err(ManifestError::Validation {
                path: path.to_path_buf(),
                msg: "duplicate class names".into(),
            });
        }
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    /// Dataset root: explicit `path` if present, else the manifest's directory.
    pub fn root(&self, manifest_path: &Path) -> PathBuf {
        match &self.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => manifest_dir(manifest_path).join(p),
            None => manifest_dir(manifest_path),
        }
    }

    pub fn train_images_dir(&self, manifest_path: &Path) -> PathBuf {
        self.root(manifest_path).join(&self.train)
    }

    pub fn val_images_dir(&self, manifest_path: &Path) -> Option<PathBuf> {
        self.val
            .as_ref()
            .map(|v| self.root(manifest_path).join(v))
    }

    /// Labels directory for an images directory: the last `images` path
    /// component is replaced with `labels`; with no such component the labels
    /// sit beside the images.
    pub fn labels_dir_for(images_dir: &Path) -> PathBuf {
        let mut components: Vec<String> = images_dir
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if let Some(pos) = components.iter().rposition(|c| c == "images") {
            components[pos] = "labels".to_string();
            return components.iter().collect();
        }
        images_dir.to_path_buf()
    }
}

fn manifest_dir(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DatasetManifest {
        DatasetManifest {
            path: None,
            train: "images/train".into(),
            val: Some("images/val".into()),
            names: vec!["orange mallet".into(), "water bottle".into()],
            label_format: LabelFormat::CenterSize,
        }
    }

    #[test]
    fn yaml_round_trip() {
        let manifest = sample();
        let raw = serde_yaml::to_string(&manifest).unwrap();
        let back: DatasetManifest = serde_yaml::from_str(&raw).unwrap();
        assert_eq!(back.train, manifest.train);
        assert_eq!(back.names, manifest.names);
        assert_eq!(back.label_format, LabelFormat::CenterSize);
    }

    #[test]
    fn label_format_defaults_to_center_size() {
        let raw = "train: images/train\nnames: [a, b]\n";
        let manifest: DatasetManifest = serde_yaml::from_str(raw).unwrap();
        assert_eq!(manifest.label_format, LabelFormat::CenterSize);
        assert!(manifest.val.is_none());
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut manifest = sample();
        manifest.names = vec!["a".into(), "a".into()];
        assert!(manifest.validate(Path::new("data.yaml")).is_err());
    }

    #[test]
    fn labels_dir_swaps_last_images_component() {
        let dir = PathBuf::from("data/images/train");
        assert_eq!(
            DatasetManifest::labels_dir_for(&dir),
            PathBuf::from("data/labels/train")
        );
    }

    #[test]
    fn labels_dir_falls_back_to_side_by_side() {
        let dir = PathBuf::from("data/train");
        assert_eq!(DatasetManifest::labels_dir_for(&dir), dir);
    }

    #[test]
    fn root_prefers_explicit_path() {
        let mut manifest = sample();
        manifest.path = Some(PathBuf::from("subset"));
        let root = manifest.root(Path::new("datasets/export/data.yaml"));
        assert_eq!(root, PathBuf::from("datasets/export/subset"));
    }
}
