//! Flat transferable packing for the numeric compute boundary.
//!
//! Layout, little-endian:
//! `[magic: i32][datatype code: i32][shape bytes: i32 = 40][data bytes: i32]`
//! `[dim: 5 x i32][spacing: 5 x f32][raw voxel bytes]`.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{BRIDGE_MAGIC, BRIDGE_PREFIX};
use crate::error::{Result, SulcusError};
use crate::header::DataType;
use crate::orient::OrientationCode;
use crate::volume::{CloneOverrides, CreateOptions, Volume};

/// Pack dimensions, spacing, datatype, and the flat voxel view into one
/// transferable buffer.
pub fn pack_volume(volume: &Volume) -> Vec<u8> {
    let raw = volume.raw_bytes();
    let mut out = vec![0u8; BRIDGE_PREFIX + raw.len()];
    LittleEndian::write_i32(&mut out[0..4], BRIDGE_MAGIC);
    LittleEndian::write_i32(&mut out[4..8], volume.data_type().code() as i32);
    LittleEndian::write_i32(&mut out[8..12], (BRIDGE_PREFIX - 16) as i32);
    LittleEndian::write_i32(&mut out[12..16], raw.len() as i32);
    let dims = volume.dimensions();
    for (i, &d) in dims.iter().enumerate() {
        LittleEndian::write_i32(&mut out[16 + i * 4..20 + i * 4], d as i32);
    }
    let spacing = volume.spacing();
    for (i, &s) in spacing.iter().enumerate() {
        LittleEndian::write_f32(&mut out[36 + i * 4..40 + i * 4], s as f32);
    }
    out[BRIDGE_PREFIX..].copy_from_slice(raw);
    out
}

/// Unpack a transferable buffer back into a volume.
///
/// With `base`, the result clones the base's header shape before the packed
/// dimensions and spacing are applied, so affine and annotation context
/// carries over from a reference image.
pub fn unpack_volume(data: &[u8], base: Option<&Volume>) -> Result<Volume> {
    if data.len() < BRIDGE_PREFIX {
        return Err(SulcusError::Format(format!(
            "transfer buffer of {} bytes is smaller than the {BRIDGE_PREFIX}-byte prefix",
            data.len()
        )));
    }
    let magic = LittleEndian::read_i32(&data[0..4]);
    if magic != BRIDGE_MAGIC {
        return Err(SulcusError::Format(format!(
            "bad transfer magic {magic}, expected {BRIDGE_MAGIC}"
        )));
    }
    let dtype = DataType::from_code(LittleEndian::read_i32(&data[4..8]) as i16)?;
    let data_len = LittleEndian::read_i32(&data[12..16]) as usize;

    let mut dims = [0usize; 5];
    for (i, d) in dims.iter_mut().enumerate() {
        *d = LittleEndian::read_i32(&data[16 + i * 4..20 + i * 4]).max(0) as usize;
    }
    let mut spacing = [0f64; 5];
    for (i, s) in spacing.iter_mut().enumerate() {
        *s = LittleEndian::read_f32(&data[36 + i * 4..40 + i * 4]) as f64;
    }

    if data.len() < BRIDGE_PREFIX + data_len {
        return Err(SulcusError::Format(format!(
            "transfer buffer truncated: prefix promises {data_len} data bytes"
        )));
    }

    let mut volume = match base {
        Some(reference) => Volume::clone_shape(
            reference,
            &CloneOverrides {
                datatype: Some(dtype),
                dimensions: Some(dims[..3].to_vec()),
                spacing: Some([spacing[0], spacing[1], spacing[2]]),
                num_frames: Some(dims[3]),
                num_components: Some(dims[4]),
            },
        )?,
        None => Volume::create(&CreateOptions {
            datatype: dtype,
            dimensions: dims[..3].to_vec(),
            spacing: [spacing[0], spacing[1], spacing[2]],
            num_frames: dims[3],
            num_components: dims[4],
            orientation: OrientationCode::Ras,
        })?,
    };

    let expected = volume.volume_size() * dtype.byte_size();
    if expected != data_len {
        return Err(SulcusError::Format(format!(
            "transfer data holds {data_len} bytes, dimensions imply {expected}"
        )));
    }
    volume
        .buffer_mut()
        .make_owned()
        .copy_from_slice(&data[BRIDGE_PREFIX..BRIDGE_PREFIX + data_len]);
    Ok(volume)
}
