use approx::assert_relative_eq;

use sulcus_core::header::NiftiHeader;
use sulcus_core::orient::{compute_orientation, OrientationCode};

fn base_header() -> NiftiHeader {
    let mut header = NiftiHeader::create();
    header.dim = [3, 4, 5, 6, 1, 1, 1, 1];
    header
}

#[test]
fn axis_aligned_fallback() {
    // No qform, no sform: pure pixdim grid names as RAS by convention.
    let header = base_header();
    let orient = compute_orientation(&header);
    assert_eq!(orient.name, "RAS");
    assert_eq!(orient.map.axis(), [0, 1, 2]);
    assert_eq!(orient.map.flip(), [false, false, false]);
    assert_eq!(orient.transform.at(0, 0), 1.0);
    assert_eq!(orient.transform.at(3, 3), 1.0);
}

#[test]
fn negative_qform_code_degrades_to_axis_aligned() {
    let mut header = base_header();
    header.qform_code = -1;
    header.sform_code = 0;
    let orient = compute_orientation(&header);
    assert_eq!(orient.name, "RAS");
    assert_eq!(orient.map.axis(), [0, 1, 2]);
}

#[test]
fn computation_is_deterministic() {
    let mut header = base_header();
    header.sform_code = 1;
    header.srow_x = [0.0, 0.0, 2.0, 10.0];
    header.srow_y = [3.0, 0.0, 0.0, -4.5];
    header.srow_z = [0.0, 1.5, 0.0, 7.25];
    let first = compute_orientation(&header);
    let second = compute_orientation(&header);
    assert_eq!(first.name, second.name);
    assert_eq!(first.map.axis(), second.map.axis());
    assert_eq!(first.map.flip(), second.map.flip());
}

#[test]
fn lps_matrix_names_as_lps() {
    let mut header = base_header();
    header.sform_code = 1;
    header.srow_x = [-1.0, 0.0, 0.0, 0.0];
    header.srow_y = [0.0, -1.0, 0.0, 0.0];
    header.srow_z = [0.0, 0.0, 1.0, 0.0];
    let orient = compute_orientation(&header);
    assert_eq!(orient.name, "LPS");
    assert_eq!(orient.map.axis(), [0, 1, 2]);
    assert_eq!(orient.map.flip(), [true, true, false]);
}

#[test]
fn permuted_matrix_names_each_axis_once() {
    // Physical x comes from voxel z, y from voxel x, z from voxel y.
    let mut header = base_header();
    header.sform_code = 1;
    header.srow_x = [0.0, 0.0, 2.0, 0.0];
    header.srow_y = [3.0, 0.0, 0.0, 0.0];
    header.srow_z = [0.0, 1.5, 0.0, 0.0];
    let orient = compute_orientation(&header);
    assert_eq!(orient.map.axis(), [1, 2, 0]);
    assert_eq!(orient.map.flip(), [false, false, false]);
    assert_eq!(orient.map.inv_axis(), [2, 0, 1]);
    assert_eq!(orient.name, "SRA");
}

#[test]
fn matrix_back_derives_spacing_from_column_norms() {
    let mut header = base_header();
    header.sform_code = 1;
    header.srow_x = [0.0, 0.0, 2.0, 0.0];
    header.srow_y = [3.0, 0.0, 0.0, 0.0];
    header.srow_z = [0.0, 1.5, 0.0, 0.0];
    let orient = compute_orientation(&header);
    // column norms: 3, 1.5, 2
    assert_relative_eq!(orient.transform.at(1, 0), 3.0);
    assert_relative_eq!(orient.transform.at(2, 1), 1.5);
    assert_relative_eq!(orient.transform.at(0, 2), 2.0);
}

#[test]
fn identity_quaternion_scales_by_pixdim() {
    let mut header = base_header();
    header.qform_code = 1;
    header.pixdim[1] = 2.0;
    header.pixdim[2] = 3.0;
    header.pixdim[3] = 4.0;
    header.qoffset_x = -12.0;
    header.qoffset_y = 5.0;
    header.qoffset_z = 9.0;
    let orient = compute_orientation(&header);
    assert_eq!(orient.name, "RAS");
    assert_relative_eq!(orient.transform.at(0, 0), 2.0);
    assert_relative_eq!(orient.transform.at(1, 1), 3.0);
    assert_relative_eq!(orient.transform.at(2, 2), 4.0);
    assert_relative_eq!(orient.transform.at(0, 3), -12.0);
    assert_relative_eq!(orient.transform.at(1, 3), 5.0);
    assert_relative_eq!(orient.transform.at(2, 3), 9.0);
}

#[test]
fn half_turn_quaternion_flips_y_and_z() {
    // b = 1 drives 1-(b^2+c^2+d^2) to zero: the renormalized special case.
    let mut header = base_header();
    header.qform_code = 1;
    header.quatern_b = 1.0;
    let orient = compute_orientation(&header);
    assert_eq!(orient.map.flip(), [false, true, true]);
    assert_eq!(orient.name, "RPI");
}

#[test]
fn negative_qfac_flips_z() {
    let mut header = base_header();
    header.qform_code = 1;
    header.pixdim[0] = -1.0;
    let orient = compute_orientation(&header);
    assert_eq!(orient.map.flip(), [false, false, true]);
    assert_eq!(orient.name, "RAI");
}

#[test]
fn oblique_tie_resolves_to_a_valid_permutation() {
    // A 45-degree in-plane rotation puts two candidate axes at (nearly)
    // equal projected magnitude. The tie-break is the documented scan
    // order (lowest unclaimed index wins on exact equality), so only the
    // structural invariants are asserted here, not a "correct" winner.
    let c = std::f32::consts::FRAC_1_SQRT_2;
    let mut header = base_header();
    header.sform_code = 1;
    header.srow_x = [c, -c, 0.0, 0.0];
    header.srow_y = [c, c, 0.0, 0.0];
    header.srow_z = [0.0, 0.0, 1.0, 0.0];
    let orient = compute_orientation(&header);

    let mut axis = orient.map.axis();
    axis.sort_unstable();
    assert_eq!(axis, [0, 1, 2]);
    assert_eq!(orient.name.len(), 3);
    for pair in ["LR", "PA", "IS"] {
        assert_eq!(
            orient.name.chars().filter(|ch| pair.contains(*ch)).count(),
            1
        );
    }
}

#[test]
fn orientation_code_round_trips_strings() {
    assert_eq!(OrientationCode::parse("RAS").as_str(), "RAS");
    assert_eq!(OrientationCode::parse("lps").as_str(), "LPS");
    assert_eq!(OrientationCode::parse("").as_str(), "None");
}
