//! The in-memory volumetric image: header, orientation, geometry, voxels.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::buffer::VoxelBuffer;
use crate::compare::{compare_buffers, CompareMethod, CompareResult};
use crate::consts::{MAX_FRAMES, SPACING_ROUND};
use crate::error::{Result, SulcusError};
use crate::header::{rescale_srows, DataType, NiftiHeader};
use crate::orient::{compute_orientation, Orientation, OrientationCode};

/// Options for [`Volume::create`].
#[derive(Clone, Debug)]
pub struct CreateOptions {
    pub datatype: DataType,
    /// 3 to 5 entries: x, y, z and optionally frames, components.
    pub dimensions: Vec<usize>,
    pub spacing: [f64; 3],
    /// 0 keeps the `dimensions` entry (or 1).
    pub num_frames: usize,
    /// 0 keeps the `dimensions` entry (or 1).
    pub num_components: usize,
    /// `Ras`/`Lps` seed an axis-aligned matrix with that sign convention.
    pub orientation: OrientationCode,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            datatype: DataType::Short,
            dimensions: vec![10, 10, 10],
            spacing: [1.0; 3],
            num_frames: 0,
            num_components: 0,
            orientation: OrientationCode::Ras,
        }
    }
}

/// Overrides for [`Volume::clone_shape`]; `None` keeps the reference value.
#[derive(Clone, Debug, Default)]
pub struct CloneOverrides {
    pub datatype: Option<DataType>,
    pub dimensions: Option<Vec<usize>>,
    pub spacing: Option<[f64; 3]>,
    pub num_frames: Option<usize>,
    pub num_components: Option<usize>,
}

/// A volumetric image.
///
/// Owns exactly one header, one voxel buffer, and the orientation derived
/// from the header. Not meant for concurrent mutation; clone first.
#[derive(Clone, Debug)]
pub struct Volume {
    header: NiftiHeader,
    orientation: Orientation,
    /// x, y, z, frames, components.
    dimensions: [usize; 5],
    spacing: [f64; 5],
    /// Per-axis element strides.
    offsets: [usize; 5],
    volume_size: usize,
    buffer: VoxelBuffer,
    filename: Option<PathBuf>,
    comments: Vec<Value>,
    /// The original input buffer while the voxel data still aliases it.
    source: Option<Bytes>,
}

impl Volume {
    /// Allocate a fresh volume.
    pub fn create(opts: &CreateOptions) -> Result<Self> {
        if opts.dimensions.len() < 3 || opts.dimensions.len() > 5 {
            return Err(SulcusError::Format(format!(
                "create needs 3 to 5 dimensions, got {}",
                opts.dimensions.len()
            )));
        }
        let mut header = NiftiHeader::create();
        header.set_datatype(opts.datatype);
        let mut vol = Self::from_header(header)?;

        let mut dims = [1usize; 5];
        dims[..opts.dimensions.len()].copy_from_slice(&opts.dimensions);
        if opts.num_frames != 0 {
            dims[3] = opts.num_frames.clamp(1, MAX_FRAMES);
        }
        if opts.num_components != 0 {
            dims[4] = opts.num_components.clamp(1, MAX_FRAMES);
        }
        vol.change_dimensions(&dims)?;
        vol.change_spacing(opts.spacing);

        match opts.orientation {
            OrientationCode::Ras => vol.seed_axis_aligned_sform(1.0),
            OrientationCode::Lps => vol.seed_axis_aligned_sform(-1.0),
            OrientationCode::None => {}
        }
        Ok(vol)
    }

    /// New volume with the shape (header, type, geometry) of `reference` and
    /// the given overrides applied. Voxel values are deliberately not copied;
    /// the buffer comes back zeroed at the new size.
    pub fn clone_shape(reference: &Volume, overrides: &CloneOverrides) -> Result<Self> {
        let mut source_header = reference.header.clone();
        source_header.set_comments(&reference.comments)?;
        let header_bytes = source_header.serialize(true);
        let mut header = NiftiHeader::parse(&header_bytes, header_bytes.len())?;
        if let Some(dtype) = overrides.datatype {
            header.set_datatype(dtype);
        }
        let mut vol = Self::from_header(header)?;

        let mut dims = vol.dimensions;
        if let Some(d) = &overrides.dimensions {
            if d.len() < 3 || d.len() > 5 {
                return Err(SulcusError::Format(format!(
                    "clone needs 3 to 5 dimensions, got {}",
                    d.len()
                )));
            }
            dims[..d.len()].copy_from_slice(d);
        }
        if let Some(frames) = overrides.num_frames {
            dims[3] = frames.clamp(1, MAX_FRAMES);
        }
        if let Some(components) = overrides.num_components {
            dims[4] = components.clamp(1, MAX_FRAMES);
        }
        vol.change_dimensions(&dims)?;
        if let Some(spacing) = overrides.spacing {
            vol.change_spacing(spacing);
        }
        Ok(vol)
    }

    /// Build a volume around a parsed header; the buffer starts zeroed at the
    /// header-implied size.
    pub(crate) fn from_header(mut header: NiftiHeader) -> Result<Self> {
        let dtype = header.data_type()?;
        let (dimensions, spacing) = sync_geometry(&mut header);
        let orientation = compute_orientation(&header);
        let volume_size = dimensions.iter().product();
        let comments = header.comments();
        Ok(Self {
            header,
            orientation,
            dimensions,
            spacing,
            offsets: strides(&dimensions),
            volume_size,
            buffer: VoxelBuffer::alloc(dtype, volume_size),
            filename: None,
            comments,
            source: None,
        })
    }

    /// Parse a volume out of an in-memory byte buffer.
    pub fn parse(data: Bytes, target: OrientationCode, force_copy: bool) -> Result<Self> {
        crate::io::nifti::parse_volume(data, target, force_copy)
    }

    /// Serialize to the on-disk byte layout (header + extensions + voxels).
    pub fn to_bytes(&self) -> Result<Bytes> {
        crate::io::nifti::serialize_volume(self)
    }

    // ---- accessors -------------------------------------------------------

    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    pub fn orientation(&self) -> &Orientation {
        &self.orientation
    }

    pub fn orientation_name(&self) -> &str {
        &self.orientation.name
    }

    pub fn data_type(&self) -> DataType {
        self.buffer.dtype()
    }

    pub fn dimensions(&self) -> [usize; 5] {
        self.dimensions
    }

    pub fn spacing(&self) -> [f64; 5] {
        self.spacing
    }

    /// Per-axis element strides: `[1, dx, dx*dy, dx*dy*dz, dx*dy*dz*df]`.
    pub fn offsets(&self) -> [usize; 5] {
        self.offsets
    }

    pub fn volume_size(&self) -> usize {
        self.volume_size
    }

    pub fn raw_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    pub fn buffer(&self) -> &VoxelBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut VoxelBuffer {
        &mut self.buffer
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn set_filename(&mut self, path: &Path) {
        self.filename = Some(path.to_path_buf());
    }

    /// Intensity at (x, y, z, frame); the linear index is clamped into the
    /// buffer.
    pub fn voxel(&self, coords: [usize; 4]) -> f64 {
        if self.volume_size == 0 {
            return 0.0;
        }
        let index = coords[0]
            + coords[1] * self.offsets[1]
            + coords[2] * self.offsets[2]
            + coords[3] * self.offsets[3];
        self.buffer.value(index.min(self.volume_size - 1))
    }

    pub fn set_voxel(&mut self, coords: [usize; 4], value: f64) {
        if self.volume_size == 0 {
            return;
        }
        let index = coords[0]
            + coords[1] * self.offsets[1]
            + coords[2] * self.offsets[2]
            + coords[3] * self.offsets[3];
        let index = index.min(self.volume_size - 1);
        self.buffer.set_value(index, value);
    }

    /// `[x0, x1, y0, y1, z0, z1]`, shrunk by `margin` on every side.
    pub fn bounds(&self, margin: usize) -> [usize; 6] {
        [
            margin,
            self.dimensions[0].saturating_sub(1 + margin),
            margin,
            self.dimensions[1].saturating_sub(1 + margin),
            margin,
            self.dimensions[2].saturating_sub(1 + margin),
        ]
    }

    /// Physical size of the field of view: dimensions times spacing.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.dimensions[0] as f64 * self.spacing[0],
            self.dimensions[1] as f64 * self.spacing[1],
            self.dimensions[2] as f64 * self.spacing[2],
        ]
    }

    /// Min and max intensity over the whole buffer.
    pub fn intensity_range(&self) -> (f64, f64) {
        if self.volume_size == 0 {
            return (0.0, 0.0);
        }
        let first = self.buffer.value(0);
        let mut range = (first, first);
        for i in 1..self.volume_size {
            let v = self.buffer.value(i);
            if v > range.1 {
                range.1 = v;
            } else if v < range.0 {
                range.0 = v;
            }
        }
        range
    }

    pub fn memory_size(&self) -> usize {
        self.buffer.byte_len()
    }

    /// SHA-256 of the raw voxel bytes, hex-encoded.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.raw_bytes());
        hex::encode(hasher.finalize())
    }

    // ---- mutation --------------------------------------------------------

    /// Change the grid dimensions (3 to 5 entries). The buffer is reallocated
    /// (zeroed) only when the total voxel count changes, so permutations keep
    /// their data.
    pub fn change_dimensions(&mut self, new_dims: &[usize]) -> Result<()> {
        let len = new_dims.len();
        if !(3..=5).contains(&len) {
            return Err(SulcusError::Format(format!(
                "cannot change dimensions to a {len}-element array"
            )));
        }
        for (i, &d) in new_dims.iter().enumerate() {
            self.dimensions[i] = d;
            self.header.dim[i + 1] = d as i16;
        }
        self.header.dim[0] = if self.dimensions[4] > 1 {
            5
        } else if self.dimensions[3] > 1 {
            4
        } else {
            3
        };
        self.volume_size = self.dimensions.iter().product();
        self.offsets = strides(&self.dimensions);
        if self.buffer.element_count() != self.volume_size {
            self.buffer = VoxelBuffer::alloc(self.data_type(), self.volume_size);
            self.source = None;
        }
        Ok(())
    }

    /// Change the voxel spacing. When an explicit matrix is present its rows
    /// are rescaled to the new magnitudes, preserving direction cosines.
    pub fn change_spacing(&mut self, new_spacing: [f64; 3]) {
        for (i, &s) in new_spacing.iter().enumerate() {
            self.header.pixdim[i + 1] = s as f32;
        }
        if self.header.sform_code > 0 {
            rescale_srows(&mut self.header, new_spacing);
        }
        self.spacing[..3].copy_from_slice(&new_spacing);
        self.orientation = compute_orientation(&self.header);
    }

    /// Copy the affine fields of `other`, rescaled to this volume's spacing.
    pub fn copy_orientation_info(&mut self, other: &Volume) {
        let spacing = [self.spacing[0], self.spacing[1], self.spacing[2]];
        self.header.copy_orientation_from(other.header(), spacing);
        self.refresh_geometry();
        let from = other
            .filename()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "peer volume".to_string());
        self.add_comment(&format!("Copied orientation info from {from}"));
    }

    /// Elementwise `self = reference + offset`.
    pub fn add_offset(&mut self, reference: &Volume, offset: f64) -> Result<()> {
        let left = self.buffer.element_count();
        let right = reference.buffer.element_count();
        if left != right {
            return Err(SulcusError::SizeMismatch { left, right });
        }
        for i in 0..left {
            self.buffer.set_value(i, reference.buffer.value(i) + offset);
        }
        Ok(())
    }

    // ---- comparison ------------------------------------------------------

    pub fn compare_with(
        &self,
        other: &Volume,
        method: CompareMethod,
        threshold: f64,
    ) -> Result<CompareResult> {
        compare_buffers(&self.buffer, &other.buffer, method, threshold)
    }

    /// Same dimensions, spacing (within `threshold`), and orientation name.
    pub fn has_same_shape(&self, other: &Volume, threshold: f64, space_only: bool) -> bool {
        let upto = if space_only { 3 } else { 5 };
        if self.dimensions[..upto] != other.dimensions[..upto] {
            return false;
        }
        for i in 0..upto {
            if (self.spacing[i] - other.spacing[i]).abs() > threshold {
                return false;
            }
        }
        self.orientation.name == other.orientation.name
    }

    // ---- comments --------------------------------------------------------

    pub fn comments(&self) -> &[Value] {
        &self.comments
    }

    pub fn add_comment(&mut self, text: &str) {
        self.comments.push(Value::String(text.to_string()));
    }

    pub fn push_comment(&mut self, comment: Value) {
        self.comments.push(comment);
    }

    pub fn set_comments(&mut self, comments: Vec<Value>) {
        self.comments = comments;
    }

    // ---- internal hooks for the I/O layer --------------------------------

    pub(crate) fn seed_axis_aligned_sform(&mut self, scale: f64) {
        self.header.srow_x = [(scale * self.spacing[0]) as f32, 0.0, 0.0, 0.0];
        self.header.srow_y = [0.0, (scale * self.spacing[1]) as f32, 0.0, 0.0];
        self.header.srow_z = [0.0, 0.0, self.spacing[2] as f32, 0.0];
        self.header.qform_code = 0;
        self.header.sform_code = 1;
        self.refresh_geometry();
    }

    pub(crate) fn refresh_geometry(&mut self) {
        let (dims, spacing) = sync_geometry(&mut self.header);
        self.dimensions = dims;
        self.spacing = spacing;
        self.volume_size = dims.iter().product();
        self.offsets = strides(&dims);
        self.orientation = compute_orientation(&self.header);
        if self.buffer.element_count() != self.volume_size {
            self.buffer = VoxelBuffer::alloc(self.data_type(), self.volume_size);
            self.source = None;
        }
    }

    pub(crate) fn header_mut(&mut self) -> &mut NiftiHeader {
        &mut self.header
    }

    pub(crate) fn set_owned_data(&mut self, bytes: Vec<u8>) {
        debug_assert_eq!(bytes.len(), self.volume_size * self.data_type().byte_size());
        self.buffer = VoxelBuffer::from_vec(self.data_type(), bytes);
        self.source = None;
    }

    pub(crate) fn alias_data(&mut self, source: Bytes, offset: usize, len: usize) {
        self.buffer = VoxelBuffer::borrowed(self.data_type(), source.slice(offset..offset + len));
        self.source = Some(source);
    }

    pub(crate) fn source(&self) -> Option<&Bytes> {
        self.source.as_ref()
    }

    pub(crate) fn scrub_nans(&mut self) -> usize {
        self.buffer.zero_nans()
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .filename
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let rounded: Vec<f64> = self
            .spacing
            .iter()
            .map(|s| (s * SPACING_ROUND).round() / SPACING_ROUND)
            .collect();
        write!(
            f,
            "{name} dim={:?}, sp={rounded:?} orient={} type={}",
            self.dimensions,
            self.orientation.name,
            self.data_type().name()
        )
    }
}

/// Normalize the header in place and return the derived dimensions and
/// spacing: degenerate frame/component entries default to 1, the explicit
/// matrix back-derives the spatial spacings, and spatial spacings are rounded
/// to 1e-3.
fn sync_geometry(header: &mut NiftiHeader) -> ([usize; 5], [f64; 5]) {
    for k in [4usize, 5] {
        if header.dim[k] == 0 {
            header.dim[k] = 1;
        }
        if header.pixdim[k] == 0.0 {
            header.pixdim[k] = 1.0;
        }
    }
    if header.qform_code <= 0 && header.sform_code > 0 {
        for j in 0..3 {
            let col = ((header.srow_x[j] as f64).powi(2)
                + (header.srow_y[j] as f64).powi(2)
                + (header.srow_z[j] as f64).powi(2))
            .sqrt();
            header.pixdim[j + 1] = col as f32;
        }
    }

    let mut dims = [0usize; 5];
    let mut spacing = [0f64; 5];
    for i in 0..5 {
        dims[i] = header.dim[i + 1].max(0) as usize;
        spacing[i] = header.pixdim[i + 1] as f64;
    }
    for s in spacing.iter_mut().take(3) {
        *s = (*s * SPACING_ROUND).round() / SPACING_ROUND;
    }
    (dims, spacing)
}

fn strides(dims: &[usize; 5]) -> [usize; 5] {
    [
        1,
        dims[0],
        dims[0] * dims[1],
        dims[0] * dims[1] * dims[2],
        dims[0] * dims[1] * dims[2] * dims[3],
    ]
}
