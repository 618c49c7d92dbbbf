/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 348;

/// Fixed header plus the 4-byte extension flag; voxel data starts here when
/// no extensions are present.
pub const DEFAULT_VOX_OFFSET: usize = 352;

/// Upper bound on the encoded header length (fixed header + extensions).
pub const MAX_HEADER_BYTES: usize = 300_000;

/// Byte offset of the vox_offset field, which encodes the total header length.
pub const VOX_OFFSET_FIELD: usize = 108;

/// Extension records are zero-padded so their size is a multiple of this.
pub const EXTENSION_ALIGN: usize = 16;

/// Extension code carrying the JSON comment block.
pub const COMMENT_ECODE: i32 = 6;

/// Below this, 1 - (b^2 + c^2 + d^2) is treated as zero and the quaternion
/// encodes a 180-degree rotation.
pub const QUATERNION_EPS: f64 = 1e-7;

/// Spacings are rounded to 1/SPACING_ROUND before orientation derivation so
/// floating noise cannot flip the orientation name.
pub const SPACING_ROUND: f64 = 1000.0;

/// Frame and component counts are clamped to this.
pub const MAX_FRAMES: usize = 9999;

/// Maximum number of pages decoded per chunk during multi-page ingestion.
pub const CHUNK_PAGES: usize = 500;

/// Fallback in-plane page spacing when a page carries no resolution tags.
pub const DEFAULT_PAGE_SPACING: f64 = 0.025;

/// Magic tag of a packed volume in the numeric-boundary layout.
pub const BRIDGE_MAGIC: i32 = 20_003;

/// Byte length of the numeric-boundary prefix (4 x i32, 5 x i32, 5 x f32).
pub const BRIDGE_PREFIX: usize = 56;
