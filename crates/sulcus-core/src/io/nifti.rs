//! Byte-level load and save of the primary volumetric format.
//!
//! The header embeds its own total length (fixed fields + extension block) in
//! the `vox_offset` field at byte 108; voxel data follows immediately. Loads
//! either alias the input buffer zero-copy or copy-and-permute into a
//! requested axis convention.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use tracing::{debug, info};

use crate::consts::{MAX_HEADER_BYTES, VOX_OFFSET_FIELD};
use crate::error::{Result, SulcusError};
use crate::header::NiftiHeader;
use crate::orient::OrientationCode;
use crate::permute::permute_voxels;
use crate::volume::Volume;

/// Parse a volume out of `data`.
///
/// With `target` unset (or already matching the stored orientation) the voxel
/// region is aliased zero-copy unless `force_copy` is set; otherwise the data
/// is copied and repermuted into the requested convention.
pub fn parse_volume(data: Bytes, target: OrientationCode, force_copy: bool) -> Result<Volume> {
    if data.len() < VOX_OFFSET_FIELD + 4 {
        return Err(SulcusError::Format(format!(
            "buffer of {} bytes is too small for a header",
            data.len()
        )));
    }
    let declared = LittleEndian::read_f32(&data[VOX_OFFSET_FIELD..VOX_OFFSET_FIELD + 4]).floor();
    if declared < 1.0 || declared > MAX_HEADER_BYTES as f32 {
        return Err(SulcusError::Format(format!(
            "encoded header length {declared} outside (0, {MAX_HEADER_BYTES}]"
        )));
    }
    let header_len = declared as usize;

    let header = NiftiHeader::parse(&data, header_len)?;
    if header.dim[1] == 0 {
        return Err(SulcusError::Format(
            "degenerate volume: dim[1] is zero".to_string(),
        ));
    }

    let mut volume = Volume::from_header(header)?;
    let raw_size = volume.volume_size() * volume.data_type().byte_size();
    let data_end = header_len + raw_size;
    if data.len() < data_end {
        return Err(SulcusError::Format(format!(
            "truncated volume: expected at least {data_end} bytes, got {}",
            data.len()
        )));
    }

    let current = volume.orientation_name().to_string();
    if target == OrientationCode::None || current == target.as_str() {
        if force_copy {
            volume.set_owned_data(data[header_len..data_end].to_vec());
        } else {
            volume.alias_data(data, header_len, raw_size);
            debug!("aliasing voxel data, no copy");
        }
    } else {
        permute_into_target(&mut volume, &data, header_len, target)?;
        info!(
            source = %current,
            requested = target.as_str(),
            "reoriented volume on load"
        );
    }

    let fixed = volume.scrub_nans();
    if fixed > 0 {
        debug!(fixed, "zeroed NaN voxels");
    }
    Ok(volume)
}

/// Serialize a volume back to its on-disk byte layout.
///
/// Current comments are embedded in the extension block first. When the
/// volume still aliases its original input buffer and the re-serialized
/// header is byte-identical to that buffer's prefix, the original is returned
/// as a zero-copy slice.
pub fn serialize_volume(volume: &Volume) -> Result<Bytes> {
    let mut header = volume.header().clone();
    header.set_comments(volume.comments())?;
    let header_bytes = header.serialize(true);

    if let Some(source) = volume.source() {
        if volume.buffer().is_borrowed()
            && source.len() >= header_bytes.len()
            && source[..header_bytes.len()] == header_bytes[..]
        {
            let total = header_bytes.len() + volume.buffer().byte_len();
            debug!("returning the aliased input buffer, no copy");
            return Ok(source.slice(0..total));
        }
    }

    let mut out = Vec::with_capacity(header_bytes.len() + volume.raw_bytes().len());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(volume.raw_bytes());
    Ok(Bytes::from(out))
}

/// Copy-and-permute `data`'s voxel region into `target`'s axis convention,
/// then rewrite the header to the matching axis-aligned matrix.
fn permute_into_target(
    volume: &mut Volume,
    data: &[u8],
    header_len: usize,
    target: OrientationCode,
) -> Result<()> {
    let es = volume.data_type().byte_size();
    if header_len % es != 0 {
        return Err(SulcusError::Format(format!(
            "voxel region at byte {header_len} is not aligned to {es}-byte elements"
        )));
    }

    let map = volume.orientation().map;
    let axis = map.axis();
    let mut flip = map.flip();
    let scale = if target == OrientationCode::Lps {
        // LPS additionally runs the first two physical axes backwards
        flip[0] = !flip[0];
        flip[1] = !flip[1];
        -1.0
    } else {
        1.0
    };

    let dims = volume.dimensions();
    let spacing = volume.spacing();
    let src_dims = [dims[0], dims[1], dims[2]];
    let out_dims = [dims[axis[0]], dims[axis[1]], dims[axis[2]]];
    let new_spacing = [spacing[axis[0]], spacing[axis[1]], spacing[axis[2]]];
    let frames = dims[3] * dims[4];

    let mut dst = vec![0u8; volume.volume_size() * es];
    permute_voxels(
        data,
        header_len / es,
        &mut dst,
        es,
        src_dims,
        out_dims,
        axis,
        flip,
        frames,
    );

    volume.change_dimensions(&[out_dims[0], out_dims[1], out_dims[2], dims[3], dims[4]])?;
    volume.change_spacing(new_spacing);
    let header = volume.header_mut();
    header.qform_code = 0;
    header.sform_code = 1;
    header.srow_x = [(scale * new_spacing[0]) as f32, 0.0, 0.0, 0.0];
    header.srow_y = [0.0, (scale * new_spacing[1]) as f32, 0.0, 0.0];
    header.srow_z = [0.0, 0.0, new_spacing[2] as f32, 0.0];
    volume.set_owned_data(dst);
    volume.refresh_geometry();
    debug_assert_eq!(volume.orientation_name(), target.as_str());
    Ok(())
}
