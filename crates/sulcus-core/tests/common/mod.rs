//! Synthetic byte-buffer builders shared by the integration tests.

use byteorder::{ByteOrder, LittleEndian};

pub const HEADER_SIZE: usize = 348;
pub const VOX_OFFSET: usize = 352;

/// Description of a synthetic primary-format volume.
pub struct NiftiSpec {
    pub dims: [i16; 5],
    pub spacing: [f32; 3],
    pub datatype: i16,
    pub bitpix: i16,
    /// Sets sform_code = 1 when present.
    pub srows: Option<[[f32; 4]; 3]>,
}

impl NiftiSpec {
    pub fn new(dims: [i16; 5], datatype: i16, bitpix: i16) -> Self {
        Self {
            dims,
            spacing: [1.0; 3],
            datatype,
            bitpix,
            srows: None,
        }
    }
}

/// Hand-build a primary-format byte buffer: 348-byte header at its fixed
/// offsets, zeroed extension flag, then the given voxel bytes.
pub fn build_nifti(spec: &NiftiSpec, voxel_bytes: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; VOX_OFFSET];
    LittleEndian::write_i32(&mut buf[0..4], HEADER_SIZE as i32);

    let mut dim = [1i16; 8];
    dim[0] = 5;
    dim[1..6].copy_from_slice(&spec.dims);
    for (i, &d) in dim.iter().enumerate() {
        LittleEndian::write_i16(&mut buf[40 + i * 2..42 + i * 2], d);
    }

    LittleEndian::write_i16(&mut buf[70..72], spec.datatype);
    LittleEndian::write_i16(&mut buf[72..74], spec.bitpix);

    let mut pixdim = [0f32; 8];
    pixdim[1..4].copy_from_slice(&spec.spacing);
    pixdim[4] = 1.0;
    pixdim[5] = 1.0;
    for (i, &p) in pixdim.iter().enumerate() {
        LittleEndian::write_f32(&mut buf[76 + i * 4..80 + i * 4], p);
    }

    LittleEndian::write_f32(&mut buf[108..112], VOX_OFFSET as f32);
    LittleEndian::write_f32(&mut buf[112..116], 1.0);

    if let Some(rows) = spec.srows {
        LittleEndian::write_i16(&mut buf[254..256], 1);
        for (r, at) in [(0usize, 280usize), (1, 296), (2, 312)] {
            for c in 0..4 {
                LittleEndian::write_f32(&mut buf[at + c * 4..at + c * 4 + 4], rows[r][c]);
            }
        }
    }

    buf[344..348].copy_from_slice(b"n+1\0");
    buf.extend_from_slice(voxel_bytes);
    buf
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for &v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

const TAGS_PER_IFD: usize = 11;
const IFD_SIZE: usize = 2 + TAGS_PER_IFD * 12 + 4;

/// Description of a synthetic page stream (little-endian, one strip per
/// page, all directories up front, shared resolution rationals, data last).
pub struct TiffSpec {
    pub width: usize,
    pub height: usize,
    pub signed: bool,
    /// Numerator/denominator shared by both resolution tags.
    pub resolution: (u32, u32),
    /// Overrides the strip offset of every page (corruption tests).
    pub strip_offsets_override: Option<Vec<u32>>,
}

impl TiffSpec {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            signed: false,
            resolution: (25, 1000),
            strip_offsets_override: None,
        }
    }
}

pub fn build_tiff(spec: &TiffSpec, pages: &[Vec<u16>]) -> Vec<u8> {
    let n = pages.len();
    let page_bytes = spec.width * spec.height * 2;
    let res_area = 8 + n * IFD_SIZE;
    let data_start = res_area + 16;
    let strip_at = |p: usize| -> u32 {
        match &spec.strip_offsets_override {
            Some(list) => list[p],
            None => (data_start + p * page_bytes) as u32,
        }
    };

    let mut buf = vec![0u8; data_start + n * page_bytes];
    buf[0] = b'I';
    buf[1] = b'I';
    LittleEndian::write_u16(&mut buf[2..4], 42);
    LittleEndian::write_u32(&mut buf[4..8], 8);

    for p in 0..n {
        let at = 8 + p * IFD_SIZE;
        LittleEndian::write_u16(&mut buf[at..at + 2], TAGS_PER_IFD as u16);
        let entries = [
            (256u16, 4u16, spec.width as u32),
            (257, 4, spec.height as u32),
            (258, 3, 16),
            (259, 3, 1),
            (273, 4, strip_at(p)),
            (277, 3, 1),
            (278, 4, spec.height as u32),
            (279, 4, page_bytes as u32),
            (282, 5, res_area as u32),
            (283, 5, res_area as u32 + 8),
            (339, 3, if spec.signed { 2 } else { 1 }),
        ];
        for (e, &(tag, ftype, value)) in entries.iter().enumerate() {
            let entry = at + 2 + e * 12;
            LittleEndian::write_u16(&mut buf[entry..entry + 2], tag);
            LittleEndian::write_u16(&mut buf[entry + 2..entry + 4], ftype);
            LittleEndian::write_u32(&mut buf[entry + 4..entry + 8], 1);
            LittleEndian::write_u32(&mut buf[entry + 8..entry + 12], value);
        }
        let next = if p + 1 < n {
            (8 + (p + 1) * IFD_SIZE) as u32
        } else {
            0
        };
        LittleEndian::write_u32(
            &mut buf[at + 2 + TAGS_PER_IFD * 12..at + IFD_SIZE],
            next,
        );
    }

    LittleEndian::write_u32(&mut buf[res_area..res_area + 4], spec.resolution.0);
    LittleEndian::write_u32(&mut buf[res_area + 4..res_area + 8], spec.resolution.1);
    LittleEndian::write_u32(&mut buf[res_area + 8..res_area + 12], spec.resolution.0);
    LittleEndian::write_u32(&mut buf[res_area + 12..res_area + 16], spec.resolution.1);

    for (p, page) in pages.iter().enumerate() {
        let at = data_start + p * page_bytes;
        for (i, &v) in page.iter().enumerate() {
            LittleEndian::write_u16(&mut buf[at + i * 2..at + i * 2 + 2], v);
        }
    }

    buf
}
