use data_contracts::{DatasetManifest, LabelFormat};
use std::path::PathBuf;

#[test]
fn manifest_save_load_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest_path = tmp.path().join("data.yaml");

    let manifest = DatasetManifest {
        path: None,
        train: "images/train".into(),
        val: Some("images/val".into()),
        names: vec!["orange mallet".into(), "water bottle".into()],
        label_format: LabelFormat::Corners,
    };
    manifest.save(&manifest_path).unwrap();

    let loaded = DatasetManifest::load(&manifest_path).unwrap();
    assert_eq!(loaded.train, "images/train");
    assert_eq!(loaded.val.as_deref(), Some("images/val"));
    assert_eq!(loaded.names.len(), 2);
    assert_eq!(loaded.label_format, LabelFormat::Corners);

    let train_dir = loaded.train_images_dir(&manifest_path);
    assert_eq!(train_dir, tmp.path().join("images/train"));
    assert_eq!(
        DatasetManifest::labels_dir_for(&train_dir),
        tmp.path().join("labels/train")
    );
}

#[test]
fn empty_names_rejected_on_load() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest_path = tmp.path().join("data.yaml");
    std::fs::write(&manifest_path, "train: images/train\nnames: []\n").unwrap();
    assert!(DatasetManifest::load(&manifest_path).is_err());
}

#[test]
fn missing_file_is_io_error() {
    let err = DatasetManifest::load(&PathBuf::from("does/not/exist.yaml")).unwrap_err();
    assert!(err.to_string().contains("does/not/exist.yaml"));
}
