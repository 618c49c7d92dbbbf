//! File-level I/O: memory mapping, gzip wrapping, format dispatch.

pub mod nifti;
pub mod tiff;

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use bytes::Bytes;
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use memmap2::Mmap;
use tracing::info;

use crate::error::Result;
use crate::orient::OrientationCode;
use crate::volume::Volume;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Load a volume from disk.
///
/// The file is memory-mapped and sniffed for gzip; `.tif`/`.tiff` names go
/// through page ingestion, everything else through the primary format. The
/// primary path keeps the mapping alive behind a zero-copy alias.
pub fn load_path(path: &Path, target: OrientationCode) -> Result<Volume> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let gzipped = mmap.len() >= 2 && mmap[..2] == GZIP_MAGIC;

    let mut volume = if is_page_format(path) {
        let data = if gzipped { gunzip(&mmap)? } else { mmap.to_vec() };
        let mut volume = tiff::parse_pages(data, target)?;
        volume.add_comment(&format!("read from tiff {}", path.display()));
        volume
    } else {
        let data = if gzipped {
            Bytes::from(gunzip(&mmap)?)
        } else {
            Bytes::from_owner(mmap)
        };
        nifti::parse_volume(data, target, false)?
    };

    volume.set_filename(path);
    info!(
        path = %path.display(),
        dims = ?volume.dimensions(),
        orient = volume.orientation_name(),
        dtype = volume.data_type().name(),
        "loaded volume"
    );
    Ok(volume)
}

/// Serialize and write a volume; a trailing `.gz` selects gzip output.
pub fn save_path(volume: &Volume, path: &Path) -> Result<()> {
    let bytes = nifti::serialize_volume(volume)?;
    let file = File::create(path)?;
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        encoder.write_all(&bytes)?;
        encoder.finish()?;
    } else {
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
    }
    info!(path = %path.display(), bytes = bytes.len(), "saved volume");
    Ok(())
}

fn is_page_format(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.ends_with(".tif") || name.ends_with(".tiff")
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
