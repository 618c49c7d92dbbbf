//! Fixed-layout volume header: byte-exact parse and serialize.
//!
//! The header is 348 bytes of little-endian fields at fixed offsets, a 4-byte
//! extension flag, and an optional run of `{esize, ecode, payload}` extension
//! records padded to 16-byte multiples. `vox_offset` encodes the total header
//! length and therefore the byte at which voxel data begins.

use byteorder::{ByteOrder, LittleEndian};
use serde_json::Value;

use crate::consts::{
    COMMENT_ECODE, DEFAULT_VOX_OFFSET, EXTENSION_ALIGN, HEADER_SIZE, MAX_HEADER_BYTES,
};
use crate::error::{Result, SulcusError};

/// Voxel datatype, keyed by the header's datatype code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    UChar,
    SChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl DataType {
    /// Resolve a header datatype code.
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            2 => Ok(Self::UChar),
            4 => Ok(Self::Short),
            8 => Ok(Self::Int),
            16 => Ok(Self::Float),
            64 => Ok(Self::Double),
            256 => Ok(Self::SChar),
            512 => Ok(Self::UShort),
            768 => Ok(Self::UInt),
            _ => Err(SulcusError::UnsupportedDataType(code)),
        }
    }

    pub const fn code(self) -> i16 {
        match self {
            Self::UChar => 2,
            Self::Short => 4,
            Self::Int => 8,
            Self::Float => 16,
            Self::Double => 64,
            Self::SChar => 256,
            Self::UShort => 512,
            Self::UInt => 768,
        }
    }

    /// Storage size of one element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::UChar | Self::SChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Double => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::UChar => "uchar",
            Self::SChar => "schar",
            Self::Short => "short",
            Self::UShort => "ushort",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "uchar" | "uint8" => Ok(Self::UChar),
            "schar" | "int8" => Ok(Self::SChar),
            "short" | "int16" => Ok(Self::Short),
            "ushort" | "uint16" => Ok(Self::UShort),
            "int" | "int32" => Ok(Self::Int),
            "uint" | "uint32" => Ok(Self::UInt),
            "float" | "float32" => Ok(Self::Float),
            "double" | "float64" => Ok(Self::Double),
            _ => Err(SulcusError::Format(format!("unknown datatype name '{name}'"))),
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One header extension record (padding stripped of the 8-byte record header).
#[derive(Clone, Debug, PartialEq)]
pub struct Extension {
    pub ecode: i32,
    pub payload: Vec<u8>,
}

/// The fixed-layout volume header.
///
/// Constructed only through [`NiftiHeader::create`] or [`NiftiHeader::parse`];
/// never partially initialized.
#[derive(Clone, Debug, PartialEq)]
pub struct NiftiHeader {
    pub sizeof_hdr: i32,
    pub dim_info: u8,
    /// dim[0] = rank; dim[1..=5] = x, y, z, frames, components.
    pub dim: [i16; 8],
    pub intent_p1: f32,
    pub intent_p2: f32,
    pub intent_p3: f32,
    pub intent_code: i16,
    pub datatype: i16,
    pub bitpix: i16,
    pub slice_start: i16,
    /// pixdim[0] is qfac; pixdim[1..=5] are per-axis spacings.
    pub pixdim: [f32; 8],
    pub vox_offset: f32,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub slice_end: i16,
    pub slice_code: u8,
    pub xyzt_units: u8,
    pub cal_max: f32,
    pub cal_min: f32,
    pub slice_duration: f32,
    pub toffset: f32,
    pub descrip: [u8; 80],
    pub aux_file: [u8; 24],
    pub qform_code: i16,
    pub sform_code: i16,
    pub quatern_b: f32,
    pub quatern_c: f32,
    pub quatern_d: f32,
    pub qoffset_x: f32,
    pub qoffset_y: f32,
    pub qoffset_z: f32,
    pub srow_x: [f32; 4],
    pub srow_y: [f32; 4],
    pub srow_z: [f32; 4],
    pub intent_name: [u8; 16],
    pub magic: [u8; 4],
    pub extensions: Vec<Extension>,
}

impl NiftiHeader {
    /// A fresh single-volume header: unit spacing, uchar data, no affine.
    pub fn create() -> Self {
        Self {
            sizeof_hdr: HEADER_SIZE as i32,
            dim_info: 0,
            dim: [3, 1, 1, 1, 1, 1, 1, 1],
            intent_p1: 0.0,
            intent_p2: 0.0,
            intent_p3: 0.0,
            intent_code: 0,
            datatype: DataType::UChar.code(),
            bitpix: 8,
            slice_start: 0,
            pixdim: [0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            vox_offset: DEFAULT_VOX_OFFSET as f32,
            scl_slope: 1.0,
            scl_inter: 0.0,
            slice_end: 0,
            slice_code: 0,
            xyzt_units: 2,
            cal_max: 0.0,
            cal_min: 0.0,
            slice_duration: 0.0,
            toffset: 0.0,
            descrip: [0; 80],
            aux_file: [0; 24],
            qform_code: 0,
            sform_code: 0,
            quatern_b: 0.0,
            quatern_c: 0.0,
            quatern_d: 0.0,
            qoffset_x: 0.0,
            qoffset_y: 0.0,
            qoffset_z: 0.0,
            srow_x: [0.0; 4],
            srow_y: [0.0; 4],
            srow_z: [0.0; 4],
            intent_name: [0; 16],
            magic: *b"n+1\0",
            extensions: Vec::new(),
        }
    }

    /// Parse exactly `declared_len` header bytes (fixed fields plus the
    /// trailing extension region) out of `bytes`.
    pub fn parse(bytes: &[u8], declared_len: usize) -> Result<Self> {
        if declared_len == 0 || declared_len > MAX_HEADER_BYTES {
            return Err(SulcusError::Format(format!(
                "declared header length {declared_len} outside (0, {MAX_HEADER_BYTES}]"
            )));
        }
        if bytes.len() < HEADER_SIZE {
            return Err(SulcusError::Format(format!(
                "need {HEADER_SIZE} header bytes, got {}",
                bytes.len()
            )));
        }

        let mut dim = [0i16; 8];
        for (i, d) in dim.iter_mut().enumerate() {
            *d = LittleEndian::read_i16(&bytes[40 + i * 2..42 + i * 2]);
        }
        let mut pixdim = [0f32; 8];
        for (i, p) in pixdim.iter_mut().enumerate() {
            *p = LittleEndian::read_f32(&bytes[76 + i * 4..80 + i * 4]);
        }

        let mut descrip = [0u8; 80];
        descrip.copy_from_slice(&bytes[148..228]);
        let mut aux_file = [0u8; 24];
        aux_file.copy_from_slice(&bytes[228..252]);
        let mut intent_name = [0u8; 16];
        intent_name.copy_from_slice(&bytes[328..344]);
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[344..348]);

        let extensions = parse_extensions(bytes, declared_len)?;

        Ok(Self {
            sizeof_hdr: LittleEndian::read_i32(&bytes[0..4]),
            dim_info: bytes[39],
            dim,
            intent_p1: LittleEndian::read_f32(&bytes[56..60]),
            intent_p2: LittleEndian::read_f32(&bytes[60..64]),
            intent_p3: LittleEndian::read_f32(&bytes[64..68]),
            intent_code: LittleEndian::read_i16(&bytes[68..70]),
            datatype: LittleEndian::read_i16(&bytes[70..72]),
            bitpix: LittleEndian::read_i16(&bytes[72..74]),
            slice_start: LittleEndian::read_i16(&bytes[74..76]),
            pixdim,
            vox_offset: LittleEndian::read_f32(&bytes[108..112]),
            scl_slope: LittleEndian::read_f32(&bytes[112..116]),
            scl_inter: LittleEndian::read_f32(&bytes[116..120]),
            slice_end: LittleEndian::read_i16(&bytes[120..122]),
            slice_code: bytes[122],
            xyzt_units: bytes[123],
            cal_max: LittleEndian::read_f32(&bytes[124..128]),
            cal_min: LittleEndian::read_f32(&bytes[128..132]),
            slice_duration: LittleEndian::read_f32(&bytes[132..136]),
            toffset: LittleEndian::read_f32(&bytes[136..140]),
            descrip,
            aux_file,
            qform_code: LittleEndian::read_i16(&bytes[252..254]),
            sform_code: LittleEndian::read_i16(&bytes[254..256]),
            quatern_b: LittleEndian::read_f32(&bytes[256..260]),
            quatern_c: LittleEndian::read_f32(&bytes[260..264]),
            quatern_d: LittleEndian::read_f32(&bytes[264..268]),
            qoffset_x: LittleEndian::read_f32(&bytes[268..272]),
            qoffset_y: LittleEndian::read_f32(&bytes[272..276]),
            qoffset_z: LittleEndian::read_f32(&bytes[276..280]),
            srow_x: read_f32x4(bytes, 280),
            srow_y: read_f32x4(bytes, 296),
            srow_z: read_f32x4(bytes, 312),
            intent_name,
            magic,
            extensions,
        })
    }

    /// Serialize the fixed header and, when `keep_extensions` is set, the
    /// extension block. `vox_offset` is recomputed to match the emitted
    /// extension length.
    pub fn serialize(&self, keep_extensions: bool) -> Vec<u8> {
        let extensions: &[Extension] = if keep_extensions { &self.extensions } else { &[] };
        let ext_total: usize = extensions
            .iter()
            .map(|e| padded_record_size(e.payload.len()))
            .sum();
        let total = DEFAULT_VOX_OFFSET + ext_total;
        let mut buf = vec![0u8; total];

        LittleEndian::write_i32(&mut buf[0..4], self.sizeof_hdr);
        buf[39] = self.dim_info;
        for (i, &d) in self.dim.iter().enumerate() {
            LittleEndian::write_i16(&mut buf[40 + i * 2..42 + i * 2], d);
        }
        LittleEndian::write_f32(&mut buf[56..60], self.intent_p1);
        LittleEndian::write_f32(&mut buf[60..64], self.intent_p2);
        LittleEndian::write_f32(&mut buf[64..68], self.intent_p3);
        LittleEndian::write_i16(&mut buf[68..70], self.intent_code);
        LittleEndian::write_i16(&mut buf[70..72], self.datatype);
        LittleEndian::write_i16(&mut buf[72..74], self.bitpix);
        LittleEndian::write_i16(&mut buf[74..76], self.slice_start);
        for (i, &p) in self.pixdim.iter().enumerate() {
            LittleEndian::write_f32(&mut buf[76 + i * 4..80 + i * 4], p);
        }
        LittleEndian::write_f32(&mut buf[108..112], total as f32);
        LittleEndian::write_f32(&mut buf[112..116], self.scl_slope);
        LittleEndian::write_f32(&mut buf[116..120], self.scl_inter);
        LittleEndian::write_i16(&mut buf[120..122], self.slice_end);
        buf[122] = self.slice_code;
        buf[123] = self.xyzt_units;
        LittleEndian::write_f32(&mut buf[124..128], self.cal_max);
        LittleEndian::write_f32(&mut buf[128..132], self.cal_min);
        LittleEndian::write_f32(&mut buf[132..136], self.slice_duration);
        LittleEndian::write_f32(&mut buf[136..140], self.toffset);
        buf[148..228].copy_from_slice(&self.descrip);
        buf[228..252].copy_from_slice(&self.aux_file);
        LittleEndian::write_i16(&mut buf[252..254], self.qform_code);
        LittleEndian::write_i16(&mut buf[254..256], self.sform_code);
        LittleEndian::write_f32(&mut buf[256..260], self.quatern_b);
        LittleEndian::write_f32(&mut buf[260..264], self.quatern_c);
        LittleEndian::write_f32(&mut buf[264..268], self.quatern_d);
        LittleEndian::write_f32(&mut buf[268..272], self.qoffset_x);
        LittleEndian::write_f32(&mut buf[272..276], self.qoffset_y);
        LittleEndian::write_f32(&mut buf[276..280], self.qoffset_z);
        write_f32x4(&mut buf, 280, &self.srow_x);
        write_f32x4(&mut buf, 296, &self.srow_y);
        write_f32x4(&mut buf, 312, &self.srow_z);
        buf[328..344].copy_from_slice(&self.intent_name);
        buf[344..348].copy_from_slice(&self.magic);

        if !extensions.is_empty() {
            buf[HEADER_SIZE] = 1;
        }
        let mut pos = DEFAULT_VOX_OFFSET;
        for ext in extensions {
            let esize = padded_record_size(ext.payload.len());
            LittleEndian::write_i32(&mut buf[pos..pos + 4], esize as i32);
            LittleEndian::write_i32(&mut buf[pos + 4..pos + 8], ext.ecode);
            buf[pos + 8..pos + 8 + ext.payload.len()].copy_from_slice(&ext.payload);
            pos += esize;
        }

        buf
    }

    pub fn data_type(&self) -> Result<DataType> {
        DataType::from_code(self.datatype)
    }

    /// Set the datatype code and the matching bitpix in one step.
    pub fn set_datatype(&mut self, dtype: DataType) {
        self.datatype = dtype.code();
        self.bitpix = (dtype.byte_size() * 8) as i16;
    }

    /// Decode the comment list from the extension block.
    pub fn comments(&self) -> Vec<Value> {
        for ext in &self.extensions {
            if ext.ecode != COMMENT_ECODE {
                continue;
            }
            let end = ext
                .payload
                .iter()
                .rposition(|&b| b != 0)
                .map_or(0, |p| p + 1);
            let trimmed = &ext.payload[..end];
            if trimmed.is_empty() {
                continue;
            }
            return match serde_json::from_slice::<Vec<Value>>(trimmed) {
                Ok(values) => values,
                Err(_) => vec![Value::String(
                    String::from_utf8_lossy(trimmed).into_owned(),
                )],
            };
        }
        Vec::new()
    }

    /// Replace the comment extension with the given list (empty clears it).
    pub fn set_comments(&mut self, comments: &[Value]) -> Result<()> {
        self.extensions.retain(|e| e.ecode != COMMENT_ECODE);
        if comments.is_empty() {
            return Ok(());
        }
        let payload = serde_json::to_vec(comments)
            .map_err(|e| SulcusError::Format(format!("comment encoding failed: {e}")))?;
        self.extensions.push(Extension {
            ecode: COMMENT_ECODE,
            payload,
        });
        Ok(())
    }

    /// Copy the affine fields from another header, rescaling the matrix rows
    /// to this image's spacing so direction cosines carry over unchanged.
    pub fn copy_orientation_from(&mut self, other: &NiftiHeader, spacing: [f64; 3]) {
        self.qform_code = other.qform_code;
        self.sform_code = other.sform_code;
        self.quatern_b = other.quatern_b;
        self.quatern_c = other.quatern_c;
        self.quatern_d = other.quatern_d;
        self.qoffset_x = other.qoffset_x;
        self.qoffset_y = other.qoffset_y;
        self.qoffset_z = other.qoffset_z;
        self.pixdim[0] = other.pixdim[0];
        self.srow_x = other.srow_x;
        self.srow_y = other.srow_y;
        self.srow_z = other.srow_z;
        rescale_srows(self, spacing);
    }

    pub fn descrip_str(&self) -> String {
        fixed_str(&self.descrip)
    }

    pub fn set_descrip(&mut self, text: &str) {
        self.descrip = [0; 80];
        let bytes = text.as_bytes();
        let n = bytes.len().min(self.descrip.len());
        self.descrip[..n].copy_from_slice(&bytes[..n]);
    }
}

/// Scale each sform row vector to the given magnitude, keeping its direction.
pub(crate) fn rescale_srows(header: &mut NiftiHeader, spacing: [f64; 3]) {
    let magnitude = |r: &[f32; 4]| -> f64 {
        ((r[0] as f64).powi(2) + (r[1] as f64).powi(2) + (r[2] as f64).powi(2)).sqrt()
    };
    let m = [
        magnitude(&header.srow_x),
        magnitude(&header.srow_y),
        magnitude(&header.srow_z),
    ];
    for j in 0..3 {
        if m[0] > 0.0 {
            header.srow_x[j] = (header.srow_x[j] as f64 * spacing[0] / m[0]) as f32;
        }
        if m[1] > 0.0 {
            header.srow_y[j] = (header.srow_y[j] as f64 * spacing[1] / m[1]) as f32;
        }
        if m[2] > 0.0 {
            header.srow_z[j] = (header.srow_z[j] as f64 * spacing[2] / m[2]) as f32;
        }
    }
}

fn parse_extensions(bytes: &[u8], declared_len: usize) -> Result<Vec<Extension>> {
    let limit = declared_len.min(bytes.len());
    if limit <= DEFAULT_VOX_OFFSET || bytes[HEADER_SIZE] == 0 {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let mut pos = DEFAULT_VOX_OFFSET;
    while pos + 8 <= limit {
        let esize = LittleEndian::read_i32(&bytes[pos..pos + 4]);
        let ecode = LittleEndian::read_i32(&bytes[pos + 4..pos + 8]);
        if esize < 8 || pos + esize as usize > limit {
            return Err(SulcusError::Format(format!(
                "malformed extension record at byte {pos}: esize={esize}"
            )));
        }
        out.push(Extension {
            ecode,
            payload: bytes[pos + 8..pos + esize as usize].to_vec(),
        });
        pos += esize as usize;
    }
    Ok(out)
}

fn padded_record_size(payload_len: usize) -> usize {
    (payload_len + 8).div_ceil(EXTENSION_ALIGN) * EXTENSION_ALIGN
}

fn read_f32x4(bytes: &[u8], at: usize) -> [f32; 4] {
    let mut out = [0f32; 4];
    for (i, v) in out.iter_mut().enumerate() {
        *v = LittleEndian::read_f32(&bytes[at + i * 4..at + i * 4 + 4]);
    }
    out
}

fn write_f32x4(buf: &mut [u8], at: usize, values: &[f32; 4]) {
    for (i, &v) in values.iter().enumerate() {
        LittleEndian::write_f32(&mut buf[at + i * 4..at + i * 4 + 4], v);
    }
}

fn fixed_str(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}
