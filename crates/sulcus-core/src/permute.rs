//! Voxel repermutation between axis conventions.

/// Remap `src` voxels into `dst` under an axis permutation with per-axis
/// flips.
///
/// `src_dims` describes the source lattice and `out_dims` the destination
/// (`out_dims[j] == src_dims[axis[j]]`). All `frames` frame/component planes
/// move together at a `src_dims`-product stride, which the permutation leaves
/// unchanged. Element moves are `elem_size`-byte copies, so one kernel serves
/// every datatype without alignment assumptions. Single pass, no per-voxel
/// allocation.
#[allow(clippy::too_many_arguments)]
pub fn permute_voxels(
    src: &[u8],
    src_elem_offset: usize,
    dst: &mut [u8],
    elem_size: usize,
    src_dims: [usize; 3],
    out_dims: [usize; 3],
    axis: [usize; 3],
    flip: [bool; 3],
    frames: usize,
) {
    if src_dims.contains(&0) || frames == 0 {
        return;
    }
    let frame_size = src_dims[0] * src_dims[1] * src_dims[2];
    let out_incr = [1, out_dims[0], out_dims[0] * out_dims[1]];
    let flip_dim = [out_dims[0] - 1, out_dims[1] - 1, out_dims[2] - 1];

    let mut index = src_elem_offset;
    for z in 0..src_dims[2] {
        for y in 0..src_dims[1] {
            for x in 0..src_dims[0] {
                let ia = [x, y, z];
                let mut out_index = 0usize;
                for o in 0..3 {
                    let c = ia[axis[o]];
                    let b = if flip[o] { flip_dim[o] - c } else { c };
                    out_index += b * out_incr[o];
                }
                for frame in 0..frames {
                    let s = (index + frame * frame_size) * elem_size;
                    let d = (out_index + frame * frame_size) * elem_size;
                    dst[d..d + elem_size].copy_from_slice(&src[s..s + elem_size]);
                }
                index += 1;
            }
        }
    }
}
