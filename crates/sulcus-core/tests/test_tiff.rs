mod common;

use sulcus_core::error::SulcusError;
use sulcus_core::header::DataType;
use sulcus_core::io::tiff::{parse_pages, PageReader};
use sulcus_core::orient::OrientationCode;

use common::{build_tiff, TiffSpec};

#[test]
fn reader_walks_the_page_chain() {
    let spec = TiffSpec::new(4, 3);
    let pages: Vec<Vec<u16>> = (0..3).map(|p| vec![p as u16; 12]).collect();
    let data = build_tiff(&spec, &pages);

    let reader = PageReader::new(&data).unwrap();
    assert!(!reader.big_endian());
    assert_eq!(reader.page_count().unwrap(), 3);

    let mut reader = PageReader::new(&data).unwrap();
    let info = reader.next_page().unwrap();
    assert_eq!(info.width, 4);
    assert_eq!(info.height, 3);
    assert_eq!(info.bits_per_sample, 16);
    assert_eq!(info.samples_per_pixel, 1);
    assert_eq!(info.data_type(), DataType::UShort);
    assert_eq!(info.x_resolution, Some(0.025));

    let page = reader.decode_page(&info).unwrap();
    assert_eq!(page.dim(), (3, 4));
    assert_eq!(page[[0, 0]], 0);
}

#[test]
fn missing_byte_order_mark_is_rejected() {
    let err = PageReader::new(b"XX\x2a\x00\x08\x00\x00\x00").unwrap_err();
    assert!(matches!(err, SulcusError::Format(_)));
}

#[test]
fn single_page_defaults_to_lps() {
    let spec = TiffSpec::new(4, 3);
    let values: Vec<u16> = (1..=12).collect();
    let data = build_tiff(&spec, &[values]);

    let volume = parse_pages(data, OrientationCode::None).unwrap();
    assert_eq!(volume.dimensions(), [4, 3, 1, 1, 1]);
    assert_eq!(volume.data_type(), DataType::UShort);
    assert_eq!(volume.orientation_name(), "LPS");
    assert_eq!(volume.spacing()[..3], [0.025, 0.025, 1.0]);
    assert_eq!(volume.voxel([0, 0, 0, 0]), 1.0);
    assert_eq!(volume.voxel([3, 0, 0, 0]), 4.0);
    assert_eq!(volume.voxel([3, 2, 0, 0]), 12.0);
}

#[test]
fn single_page_ras_reverses_both_axes() {
    let spec = TiffSpec::new(4, 3);
    let values: Vec<u16> = (1..=12).collect();
    let data = build_tiff(&spec, &[values]);

    let volume = parse_pages(data, OrientationCode::Ras).unwrap();
    assert_eq!(volume.orientation_name(), "RAS");
    // 180-degree rotation of the page
    assert_eq!(volume.voxel([0, 0, 0, 0]), 12.0);
    assert_eq!(volume.voxel([3, 2, 0, 0]), 1.0);
}

#[test]
fn signed_pages_resolve_to_short() {
    let spec = TiffSpec {
        signed: true,
        ..TiffSpec::new(2, 2)
    };
    let values: Vec<u16> = vec![(-5i16) as u16, 0, 7, (-1i16) as u16];
    let data = build_tiff(&spec, &[values]);

    let volume = parse_pages(data, OrientationCode::None).unwrap();
    assert_eq!(volume.data_type(), DataType::Short);
    assert_eq!(volume.voxel([0, 0, 0, 0]), -5.0);
    assert_eq!(volume.voxel([1, 1, 0, 0]), -1.0);
}

#[test]
fn multi_page_stacks_into_frames() {
    let spec = TiffSpec::new(2, 2);
    let pages: Vec<Vec<u16>> = (0..3)
        .map(|p| vec![p * 10 + 1, p * 10 + 2, p * 10 + 3, p * 10 + 4])
        .collect();
    let data = build_tiff(&spec, &pages);

    let volume = parse_pages(data, OrientationCode::None).unwrap();
    assert_eq!(volume.dimensions(), [2, 2, 1, 3, 1]);
    assert_eq!(volume.orientation_name(), "LPS");
    assert_eq!(volume.header().dim[0], 4);
    for p in 0..3usize {
        assert_eq!(volume.voxel([0, 0, 0, p]), (p * 10 + 1) as f64, "page {p}");
        assert_eq!(volume.voxel([1, 1, 0, p]), (p * 10 + 4) as f64, "page {p}");
    }
    // the rebuilt buffer is aliased, not copied again
    assert!(volume.buffer().is_borrowed());
}

#[test]
fn multi_page_ras_flips_every_page() {
    let spec = TiffSpec::new(2, 2);
    let pages: Vec<Vec<u16>> = (0..3)
        .map(|p| vec![p * 10 + 1, p * 10 + 2, p * 10 + 3, p * 10 + 4])
        .collect();
    let data = build_tiff(&spec, &pages);

    let volume = parse_pages(data, OrientationCode::Ras).unwrap();
    assert_eq!(volume.orientation_name(), "RAS");
    for p in 0..3usize {
        assert_eq!(volume.voxel([0, 0, 0, p]), (p * 10 + 4) as f64, "page {p}");
        assert_eq!(volume.voxel([1, 1, 0, p]), (p * 10 + 1) as f64, "page {p}");
    }
}

#[test]
fn five_hundred_one_pages_ingest_in_chunks() {
    // One page past the chunk limit: the final flush carries a single page.
    let spec = TiffSpec::new(64, 64);
    let pages: Vec<Vec<u16>> = (0..501).map(|p| vec![(p % 100) as u16; 64 * 64]).collect();
    let data = build_tiff(&spec, &pages);

    let volume = parse_pages(data, OrientationCode::None).unwrap();
    assert_eq!(volume.dimensions(), [64, 64, 1, 501, 1]);
    assert_eq!(volume.data_type(), DataType::UShort);
    assert_eq!(volume.voxel([0, 0, 0, 0]), 0.0);
    assert_eq!(volume.voxel([5, 5, 0, 123]), 23.0);
    assert_eq!(volume.voxel([63, 63, 0, 500]), 0.0);
}

#[test]
fn strips_overlapping_the_store_region_overflow() {
    // Strip offsets rewound into the stream's head: the chunk store would
    // have to write past data that has not been decoded yet.
    let spec = TiffSpec {
        strip_offsets_override: Some(vec![8, 16]),
        ..TiffSpec::new(2, 2)
    };
    let pages: Vec<Vec<u16>> = vec![vec![0; 4], vec![0; 4]];
    let data = build_tiff(&spec, &pages);

    let err = parse_pages(data, OrientationCode::None).unwrap_err();
    assert!(matches!(err, SulcusError::BufferOverflow { .. }));
}
