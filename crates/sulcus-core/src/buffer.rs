//! Raw voxel storage with an explicit ownership tag.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;

use crate::header::DataType;

/// Where the voxel bytes live. Resolved once at load time; any mutation of a
/// borrowed buffer first materializes an owned copy.
#[derive(Clone, Debug)]
pub enum VoxelData {
    Owned(Vec<u8>),
    /// Zero-copy alias into an externally owned buffer. The alias is treated
    /// as immutable for the buffer's lifetime.
    Borrowed(Bytes),
}

/// A byte buffer plus the datatype that gives it a typed meaning.
#[derive(Clone, Debug)]
pub struct VoxelBuffer {
    data: VoxelData,
    dtype: DataType,
}

impl VoxelBuffer {
    /// Zero-filled owned buffer for `elements` voxels.
    pub fn alloc(dtype: DataType, elements: usize) -> Self {
        Self {
            data: VoxelData::Owned(vec![0u8; elements * dtype.byte_size()]),
            dtype,
        }
    }

    pub fn from_vec(dtype: DataType, bytes: Vec<u8>) -> Self {
        Self {
            data: VoxelData::Owned(bytes),
            dtype,
        }
    }

    /// Zero-copy view over a slice of an externally owned buffer.
    pub fn borrowed(dtype: DataType, bytes: Bytes) -> Self {
        Self {
            data: VoxelData::Borrowed(bytes),
            dtype,
        }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            VoxelData::Owned(vec) => vec,
            VoxelData::Borrowed(bytes) => bytes,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn element_count(&self) -> usize {
        self.byte_len() / self.dtype.byte_size()
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self.data, VoxelData::Borrowed(_))
    }

    /// Copy-on-write: hand out mutable bytes, materializing a borrowed
    /// buffer first.
    pub fn make_owned(&mut self) -> &mut Vec<u8> {
        if let VoxelData::Borrowed(bytes) = &self.data {
            self.data = VoxelData::Owned(bytes.to_vec());
        }
        match &mut self.data {
            VoxelData::Owned(vec) => vec,
            VoxelData::Borrowed(_) => unreachable!("buffer was just materialized"),
        }
    }

    /// Element at `index`, widened to f64.
    pub fn value(&self, index: usize) -> f64 {
        let es = self.dtype.byte_size();
        let at = index * es;
        let b = &self.as_bytes()[at..at + es];
        match self.dtype {
            DataType::UChar => b[0] as f64,
            DataType::SChar => b[0] as i8 as f64,
            DataType::Short => LittleEndian::read_i16(b) as f64,
            DataType::UShort => LittleEndian::read_u16(b) as f64,
            DataType::Int => LittleEndian::read_i32(b) as f64,
            DataType::UInt => LittleEndian::read_u32(b) as f64,
            DataType::Float => LittleEndian::read_f32(b) as f64,
            DataType::Double => LittleEndian::read_f64(b),
        }
    }

    /// Store `value` at `index`, narrowing to the buffer's datatype.
    pub fn set_value(&mut self, index: usize, value: f64) {
        let dtype = self.dtype;
        let es = dtype.byte_size();
        let at = index * es;
        let buf = &mut self.make_owned()[at..at + es];
        match dtype {
            DataType::UChar => buf[0] = value as u8,
            DataType::SChar => buf[0] = value as i8 as u8,
            DataType::Short => LittleEndian::write_i16(buf, value as i16),
            DataType::UShort => LittleEndian::write_u16(buf, value as u16),
            DataType::Int => LittleEndian::write_i32(buf, value as i32),
            DataType::UInt => LittleEndian::write_u32(buf, value as u32),
            DataType::Float => LittleEndian::write_f32(buf, value as f32),
            DataType::Double => LittleEndian::write_f64(buf, value),
        }
    }

    /// Zero every NaN element and report how many were fixed. Integer buffers
    /// are untouched, and an all-finite borrowed buffer keeps its alias.
    pub fn zero_nans(&mut self) -> usize {
        if !self.dtype.is_float() {
            return 0;
        }
        let count = self.element_count();
        let has_nan = (0..count).any(|i| self.value(i).is_nan());
        if !has_nan {
            return 0;
        }
        let mut fixed = 0;
        for i in 0..count {
            if self.value(i).is_nan() {
                self.set_value(i, 0.0);
                fixed += 1;
            }
        }
        fixed
    }
}
