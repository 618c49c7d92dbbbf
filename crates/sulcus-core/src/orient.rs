//! Orientation derivation from the header's affine fields.
//!
//! The voxel-to-physical transform is rebuilt from whichever affine the
//! header carries (quaternion, explicit matrix, or neither), then decomposed
//! into a dominant-axis permutation, per-axis flips, and a three-letter
//! orientation code.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::affine::Mat4;
use crate::consts::{QUATERNION_EPS, SPACING_ROUND};
use crate::header::NiftiHeader;

/// Requested voxel-order convention for loads and newly created volumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrientationCode {
    /// Keep the native voxel order.
    #[default]
    None,
    /// Right-Anterior-Superior.
    Ras,
    /// Left-Posterior-Superior.
    Lps,
}

impl OrientationCode {
    /// Sanitize a user-supplied string; anything unrecognized keeps the
    /// native order.
    pub fn parse(text: &str) -> Self {
        match text.to_ascii_uppercase().as_str() {
            "RAS" => Self::Ras,
            "LPS" => Self::Lps,
            _ => Self::None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Ras => "RAS",
            Self::Lps => "LPS",
        }
    }
}

impl std::fmt::Display for OrientationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A 3-axis permutation with per-axis direction flips.
///
/// `axis[i]` is the voxel axis dominating physical axis `i`; `flip[i]` is set
/// when that voxel axis runs against the increasing physical direction. The
/// inverse view is derived on demand so the two cannot drift apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisMap {
    axis: [usize; 3],
    flip: [bool; 3],
}

impl AxisMap {
    pub fn identity() -> Self {
        Self {
            axis: [0, 1, 2],
            flip: [false; 3],
        }
    }

    pub fn new(axis: [usize; 3], flip: [bool; 3]) -> Self {
        debug_assert!(axis.contains(&0) && axis.contains(&1) && axis.contains(&2));
        Self { axis, flip }
    }

    pub fn axis(&self) -> [usize; 3] {
        self.axis
    }

    pub fn flip(&self) -> [bool; 3] {
        self.flip
    }

    /// Voxel axis -> physical axis it dominates.
    pub fn inv_axis(&self) -> [usize; 3] {
        let mut inv = [0usize; 3];
        for k in 0..3 {
            for j in 0..3 {
                if self.axis[j] == k {
                    inv[k] = j;
                }
            }
        }
        inv
    }

    pub fn inv_flip(&self) -> [bool; 3] {
        let inv = self.inv_axis();
        [self.flip[inv[0]], self.flip[inv[1]], self.flip[inv[2]]]
    }
}

/// Derived orientation of a volume; recomputed from the header, never
/// mutated independently.
#[derive(Clone, Debug)]
pub struct Orientation {
    /// Voxel-index to physical-space transform.
    pub transform: Mat4,
    pub map: AxisMap,
    /// Three letters, one per voxel axis, naming the physical direction it
    /// advances toward (e.g. "RAS", "LPS", "SRA").
    pub name: String,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            transform: Mat4::identity(),
            map: AxisMap::identity(),
            name: "RAS".to_string(),
        }
    }
}

const AXIS_LETTERS: [[char; 2]; 3] = [['L', 'R'], ['P', 'A'], ['I', 'S']];

/// Derive the orientation of `header`. Pure: two calls on the same header
/// yield the same axis order, flips, and name. Malformed affine fields
/// degrade to an axis-aligned result instead of failing.
pub fn compute_orientation(header: &NiftiHeader) -> Orientation {
    let transform = voxel_to_physical(header);
    let spacing = effective_spacing(header, &transform);

    let inverse = transform.inverted().unwrap_or_else(Mat4::identity);

    let mut axis = [0usize; 3];
    let mut flip = [false; 3];
    let mut claimed = [false; 3];
    for i in 0..3 {
        let mut best = 0usize;
        let mut best_mag = -1.0f64;
        for j in 0..3 {
            if claimed[j] {
                continue;
            }
            let mag = (inverse.at(i, j) * spacing[j]).abs();
            // Ascending scan, replace on strict `>`: an exact tie resolves
            // to the lowest unclaimed voxel axis.
            if mag > best_mag {
                best = j;
                best_mag = mag;
            }
        }
        axis[i] = best;
        claimed[best] = true;
        flip[i] = inverse.at(i, best) < 0.0;
    }

    let map = AxisMap::new(axis, flip);
    let inv_axis = map.inv_axis();
    let inv_flip = map.inv_flip();
    let mut name = String::with_capacity(3);
    for i in 0..3 {
        name.push(AXIS_LETTERS[inv_axis[i]][if inv_flip[i] { 0 } else { 1 }]);
    }

    Orientation {
        transform,
        map,
        name,
    }
}

/// Build the voxel-to-physical transform from whichever affine representation
/// the header carries.
fn voxel_to_physical(header: &NiftiHeader) -> Mat4 {
    let mut m = Mat4::identity();
    let pixdim = &header.pixdim;

    if header.qform_code > 0 {
        let mut b = header.quatern_b as f64;
        let mut c = header.quatern_c as f64;
        let mut d = header.quatern_d as f64;
        let mut a = 1.0 - (b * b + c * c + d * d);
        if a < QUATERNION_EPS {
            // 180-degree rotation: renormalize (b, c, d), a collapses to 0
            let s = 1.0 / (b * b + c * c + d * d).sqrt();
            b *= s;
            c *= s;
            d *= s;
            a = 0.0;
        } else {
            a = a.sqrt();
        }

        let xd = if pixdim[1] > 0.0 { pixdim[1] as f64 } else { 1.0 };
        let yd = if pixdim[2] > 0.0 { pixdim[2] as f64 } else { 1.0 };
        let mut zd = if pixdim[3] > 0.0 { pixdim[3] as f64 } else { 1.0 };
        if pixdim[0] < 0.0 {
            // qfac: the voxel grid is left-handed
            zd = -zd;
        }

        m.set_row(
            0,
            [
                (a * a + b * b - c * c - d * d) * xd,
                2.0 * (b * c - a * d) * yd,
                2.0 * (b * d + a * c) * zd,
                header.qoffset_x as f64,
            ],
        );
        m.set_row(
            1,
            [
                2.0 * (b * c + a * d) * xd,
                (a * a + c * c - b * b - d * d) * yd,
                2.0 * (c * d - a * b) * zd,
                header.qoffset_y as f64,
            ],
        );
        m.set_row(
            2,
            [
                2.0 * (b * d - a * c) * xd,
                2.0 * (c * d + a * b) * yd,
                (a * a + d * d - c * c - b * b) * zd,
                header.qoffset_z as f64,
            ],
        );
    } else if header.sform_code > 0 {
        m.set_row(0, widen(&header.srow_x));
        m.set_row(1, widen(&header.srow_y));
        m.set_row(2, widen(&header.srow_z));
    } else {
        if header.qform_code < 0 {
            warn!(
                qform_code = header.qform_code,
                "unusable affine fields, assuming an axis-aligned grid"
            );
        }
        m.set_row(0, [pixdim[1] as f64, 0.0, 0.0, 0.0]);
        m.set_row(1, [0.0, pixdim[2] as f64, 0.0, 0.0]);
        m.set_row(2, [0.0, 0.0, pixdim[3] as f64, 0.0]);
    }

    m
}

/// Spacing used for the dominant-axis scan: column norms when the transform
/// came from the explicit matrix, pixdim otherwise; always rounded to 1e-3.
fn effective_spacing(header: &NiftiHeader, transform: &Mat4) -> [f64; 3] {
    let from_matrix = header.qform_code <= 0 && header.sform_code > 0;
    let mut spacing = [0f64; 3];
    for (j, s) in spacing.iter_mut().enumerate() {
        let raw = if from_matrix {
            (transform.at(0, j).powi(2) + transform.at(1, j).powi(2) + transform.at(2, j).powi(2))
                .sqrt()
        } else {
            header.pixdim[j + 1] as f64
        };
        *s = (raw * SPACING_ROUND).round() / SPACING_ROUND;
    }
    spacing
}

fn widen(row: &[f32; 4]) -> [f64; 4] {
    [row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64]
}
