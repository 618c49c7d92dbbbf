mod common;

use std::fs;

use tempfile::TempDir;

use sulcus_core::compare::CompareMethod;
use sulcus_core::header::DataType;
use sulcus_core::io::{load_path, save_path};
use sulcus_core::orient::OrientationCode;
use sulcus_core::prefs::Preferences;
use sulcus_core::volume::{CreateOptions, Volume};

use common::{build_tiff, TiffSpec};

fn sample_volume() -> Volume {
    let mut volume = Volume::create(&CreateOptions {
        datatype: DataType::Float,
        dimensions: vec![3, 4, 5],
        spacing: [0.5, 0.5, 2.0],
        ..CreateOptions::default()
    })
    .unwrap();
    for i in 0..volume.volume_size() {
        volume.buffer_mut().set_value(i, (i as f64) * 0.25);
    }
    volume.add_comment("synthetic acquisition");
    volume
}

#[test]
fn plain_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vol.nii");

    let original = sample_volume();
    save_path(&original, &path).unwrap();
    let reloaded = load_path(&path, OrientationCode::None).unwrap();

    assert_eq!(reloaded.dimensions(), original.dimensions());
    assert_eq!(reloaded.data_type(), DataType::Float);
    assert_eq!(reloaded.orientation_name(), "RAS");
    assert_eq!(reloaded.filename(), Some(path.as_path()));
    assert_eq!(reloaded.comments().len(), 1);
    let diff = reloaded
        .compare_with(&original, CompareMethod::MaxAbs, 1e-9)
        .unwrap();
    assert!(diff.passed);
}

#[test]
fn gzipped_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vol.nii.gz");

    let original = sample_volume();
    save_path(&original, &path).unwrap();

    // really gzip on disk
    let raw = fs::read(&path).unwrap();
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);

    let reloaded = load_path(&path, OrientationCode::None).unwrap();
    assert_eq!(reloaded.dimensions(), original.dimensions());
    let diff = reloaded
        .compare_with(&original, CompareMethod::MaxAbs, 1e-9)
        .unwrap();
    assert!(diff.passed);
}

#[test]
fn tiff_extension_dispatches_to_page_ingestion() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stack.tif");

    let spec = TiffSpec::new(2, 2);
    let pages: Vec<Vec<u16>> = (0..3).map(|p| vec![p as u16 + 1; 4]).collect();
    fs::write(&path, build_tiff(&spec, &pages)).unwrap();

    let volume = load_path(&path, OrientationCode::None).unwrap();
    assert_eq!(volume.dimensions(), [2, 2, 1, 3, 1]);
    assert_eq!(volume.data_type(), DataType::UShort);
    assert_eq!(volume.voxel([0, 0, 0, 2]), 3.0);
    // ingestion records its provenance
    assert!(volume
        .comments()
        .iter()
        .any(|c| c.as_str().is_some_and(|s| s.contains("tiff"))));
}

#[test]
fn preferences_feed_the_load_orientation() {
    let dir = TempDir::new().unwrap();
    let prefs_path = dir.path().join("prefs.toml");
    fs::write(&prefs_path, "orientation_on_load = \"RAS\"\n").unwrap();
    let prefs = Preferences::load(&prefs_path).unwrap();

    let path = dir.path().join("vol.nii");
    let original = Volume::create(&CreateOptions {
        datatype: DataType::Float,
        dimensions: vec![3, 4, 5],
        orientation: OrientationCode::Lps,
        ..CreateOptions::default()
    })
    .unwrap();
    save_path(&original, &path).unwrap();

    let resolved = prefs.resolve(None);
    assert_eq!(resolved, OrientationCode::Ras);
    let reloaded = load_path(&path, resolved).unwrap();
    assert_eq!(reloaded.orientation_name(), "RAS");
}
