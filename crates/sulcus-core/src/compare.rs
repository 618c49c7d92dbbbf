//! Voxelwise comparison metrics for regression testing.

use crate::buffer::VoxelBuffer;
use crate::error::{Result, SulcusError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareMethod {
    /// Maximum absolute per-voxel difference; passes below the threshold.
    MaxAbs,
    /// Normalized cross-correlation; passes above the threshold.
    Cc,
    /// Sum of squared differences; passes below the threshold.
    Ssd,
}

impl CompareMethod {
    /// Anything unrecognized falls back to maxabs, the historical default.
    pub fn parse(text: &str) -> Self {
        match text.to_ascii_lowercase().as_str() {
            "cc" => Self::Cc,
            "ssd" => Self::Ssd,
            _ => Self::MaxAbs,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxAbs => "maxabs",
            Self::Cc => "cc",
            Self::Ssd => "ssd",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompareResult {
    pub passed: bool,
    pub value: f64,
    pub metric: &'static str,
}

pub(crate) fn compare_buffers(
    a: &VoxelBuffer,
    b: &VoxelBuffer,
    method: CompareMethod,
    threshold: f64,
) -> Result<CompareResult> {
    let left = a.element_count();
    let right = b.element_count();
    if left != right || left == 0 {
        return Err(SulcusError::SizeMismatch { left, right });
    }

    let (value, passed) = match method {
        CompareMethod::MaxAbs => {
            let v = max_abs_diff(a, b, left);
            (v, v < threshold)
        }
        CompareMethod::Cc => {
            let v = cross_correlation(a, b, left);
            (v, v > threshold)
        }
        CompareMethod::Ssd => {
            let v = sum_squared_diff(a, b, left);
            (v, v < threshold)
        }
    };

    Ok(CompareResult {
        passed,
        value,
        metric: method.as_str(),
    })
}

fn max_abs_diff(a: &VoxelBuffer, b: &VoxelBuffer, n: usize) -> f64 {
    let mut max = 0.0f64;
    for i in 0..n {
        let d = (a.value(i) - b.value(i)).abs();
        if d > max {
            max = d;
        }
    }
    max
}

fn cross_correlation(a: &VoxelBuffer, b: &VoxelBuffer, n: usize) -> f64 {
    let inv_n = 1.0 / n as f64;
    let mut mean_a = 0.0;
    let mut mean_b = 0.0;
    for i in 0..n {
        mean_a += a.value(i);
        mean_b += b.value(i);
    }
    mean_a *= inv_n;
    mean_b *= inv_n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a.value(i) - mean_a;
        let db = b.value(i) - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom <= 0.0 {
        return 0.0;
    }
    cov / denom
}

fn sum_squared_diff(a: &VoxelBuffer, b: &VoxelBuffer, n: usize) -> f64 {
    let mut sum = 0.0;
    for i in 0..n {
        let d = a.value(i) - b.value(i);
        sum += d * d;
    }
    sum
}
