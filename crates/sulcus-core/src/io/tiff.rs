//! Multi-page 16-bit bitmap ingestion.
//!
//! A minimal walker for the tagged-directory bitmap format used by microscopy
//! captures. Only 16-bit integer single-band uncompressed pages are in scope;
//! the page chain is decoded page by page so very large stacks never need a
//! second full-size allocation: the input buffer itself becomes the final
//! volume, rewritten in place behind the read cursor.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use bytes::Bytes;
use ndarray::{Array2, Axis};
use tracing::{debug, info};

use crate::consts::{CHUNK_PAGES, DEFAULT_PAGE_SPACING, DEFAULT_VOX_OFFSET};
use crate::error::{Result, SulcusError};
use crate::header::DataType;
use crate::io::nifti;
use crate::orient::OrientationCode;
use crate::volume::{CreateOptions, Volume};

/// Decoded description of one directory page.
#[derive(Clone, Debug)]
pub struct PageInfo {
    pub width: usize,
    pub height: usize,
    pub bits_per_sample: u32,
    pub samples_per_pixel: u32,
    pub compression: u32,
    /// 1 = unsigned integer, 2 = signed integer.
    pub sample_format: u32,
    pub rows_per_strip: usize,
    pub strip_offsets: Vec<usize>,
    pub strip_byte_counts: Vec<usize>,
    pub x_resolution: Option<f64>,
    pub y_resolution: Option<f64>,
}

impl PageInfo {
    pub fn data_type(&self) -> DataType {
        if self.sample_format == 2 {
            DataType::Short
        } else {
            DataType::UShort
        }
    }

    pub fn sample_count(&self) -> usize {
        self.width * self.height
    }

    pub fn byte_size(&self) -> usize {
        self.sample_count() * 2
    }

    fn spacing(&self) -> [f64; 3] {
        [
            self.x_resolution.filter(|v| *v > 0.0).unwrap_or(DEFAULT_PAGE_SPACING),
            self.y_resolution.filter(|v| *v > 0.0).unwrap_or(DEFAULT_PAGE_SPACING),
            1.0,
        ]
    }
}

/// Walks the tagged directory chain of a page stream.
#[derive(Debug)]
pub struct PageReader<'a> {
    data: &'a [u8],
    big_endian: bool,
    next_ifd: usize,
}

impl<'a> PageReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(SulcusError::Format(
                "stream too small for a page table header".to_string(),
            ));
        }
        let big_endian = match &data[0..2] {
            b"II" => false,
            b"MM" => true,
            _ => {
                return Err(SulcusError::Format(
                    "missing byte-order mark".to_string(),
                ))
            }
        };
        let reader = Self {
            data,
            big_endian,
            next_ifd: 0,
        };
        if reader.read_u16(2)? != 42 {
            return Err(SulcusError::Format("bad page table magic".to_string()));
        }
        let first = reader.read_u32(4)? as usize;
        if first == 0 || first >= data.len() {
            return Err(SulcusError::Format(format!(
                "first directory offset {first} out of range"
            )));
        }
        Ok(Self {
            next_ifd: first,
            ..reader
        })
    }

    pub fn big_endian(&self) -> bool {
        self.big_endian
    }

    /// Count pages by walking the directory chain, without decoding.
    pub fn page_count(&self) -> Result<usize> {
        let mut count = 0usize;
        let mut at = self.next_ifd;
        while at != 0 {
            count += 1;
            if count > 65_536 {
                return Err(SulcusError::Format(
                    "directory chain does not terminate".to_string(),
                ));
            }
            let entries = self.read_u16(at)? as usize;
            at = self.read_u32(at + 2 + entries * 12)? as usize;
        }
        Ok(count)
    }

    /// Decode the next directory in the chain, advancing the cursor.
    pub fn next_page(&mut self) -> Result<PageInfo> {
        if self.next_ifd == 0 {
            return Err(SulcusError::Format("no pages left".to_string()));
        }
        let at = self.next_ifd;
        let entries = self.read_u16(at)? as usize;

        let mut info = PageInfo {
            width: 0,
            height: 0,
            bits_per_sample: 1,
            samples_per_pixel: 1,
            compression: 1,
            sample_format: 1,
            rows_per_strip: usize::MAX,
            strip_offsets: Vec::new(),
            strip_byte_counts: Vec::new(),
            x_resolution: None,
            y_resolution: None,
        };

        for e in 0..entries {
            let base = at + 2 + e * 12;
            let tag = self.read_u16(base)?;
            let ftype = self.read_u16(base + 2)?;
            let count = self.read_u32(base + 4)? as usize;
            match tag {
                256 => info.width = self.tag_value(base, ftype)? as usize,
                257 => info.height = self.tag_value(base, ftype)? as usize,
                258 => info.bits_per_sample = self.tag_value(base, ftype)?,
                259 => info.compression = self.tag_value(base, ftype)?,
                273 => info.strip_offsets = self.tag_values(base, ftype, count)?,
                277 => info.samples_per_pixel = self.tag_value(base, ftype)?,
                278 => info.rows_per_strip = self.tag_value(base, ftype)? as usize,
                279 => info.strip_byte_counts = self.tag_values(base, ftype, count)?,
                282 => info.x_resolution = Some(self.rational(base)?),
                283 => info.y_resolution = Some(self.rational(base)?),
                339 => info.sample_format = self.tag_value(base, ftype)?,
                _ => {}
            }
        }
        self.next_ifd = self.read_u32(at + 2 + entries * 12)? as usize;

        if info.width == 0 || info.height == 0 || info.strip_offsets.is_empty() {
            return Err(SulcusError::Format(
                "page is missing geometry or strip tags".to_string(),
            ));
        }
        Ok(info)
    }

    pub fn decode_page(&self, info: &PageInfo) -> Result<Array2<u16>> {
        decode_page_from(self.data, self.big_endian, info)
    }

    fn read_u16(&self, at: usize) -> Result<u32> {
        let slice = self.data.get(at..at + 2).ok_or_else(|| truncated(at))?;
        Ok(if self.big_endian {
            BigEndian::read_u16(slice) as u32
        } else {
            LittleEndian::read_u16(slice) as u32
        })
    }

    fn read_u32(&self, at: usize) -> Result<u32> {
        let slice = self.data.get(at..at + 4).ok_or_else(|| truncated(at))?;
        Ok(if self.big_endian {
            BigEndian::read_u32(slice)
        } else {
            LittleEndian::read_u32(slice)
        })
    }

    /// Single-value tag: SHORT values sit in the first two value bytes,
    /// LONG values fill all four.
    fn tag_value(&self, base: usize, ftype: u32) -> Result<u32> {
        if ftype == 3 {
            self.read_u16(base + 8)
        } else {
            self.read_u32(base + 8)
        }
    }

    /// Array-valued tag; values spill into a pointed-to area when they do
    /// not fit the 4 inline bytes.
    fn tag_values(&self, base: usize, ftype: u32, count: usize) -> Result<Vec<usize>> {
        let each = if ftype == 3 { 2 } else { 4 };
        let start = if count * each <= 4 {
            base + 8
        } else {
            self.read_u32(base + 8)? as usize
        };
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let v = if ftype == 3 {
                self.read_u16(start + i * each)?
            } else {
                self.read_u32(start + i * each)?
            };
            out.push(v as usize);
        }
        Ok(out)
    }

    fn rational(&self, base: usize) -> Result<f64> {
        let at = self.read_u32(base + 8)? as usize;
        let num = self.read_u32(at)? as f64;
        let den = self.read_u32(at + 4)? as f64;
        if den == 0.0 {
            return Ok(0.0);
        }
        Ok(num / den)
    }
}

/// Decode one page into its raw 16-bit sample grid (signedness is carried by
/// the datatype, the bit patterns are shared).
fn decode_page_from(data: &[u8], big_endian: bool, info: &PageInfo) -> Result<Array2<u16>> {
    if info.bits_per_sample != 16 || info.samples_per_pixel != 1 {
        return Err(SulcusError::Format(format!(
            "only 16-bit single-band pages are supported (got {} bits x {} samples)",
            info.bits_per_sample, info.samples_per_pixel
        )));
    }
    if info.compression != 1 {
        return Err(SulcusError::Format(format!(
            "compressed pages are not supported (compression={})",
            info.compression
        )));
    }
    if info.sample_format > 2 {
        return Err(SulcusError::Format(format!(
            "non-integer sample format {}",
            info.sample_format
        )));
    }
    if info.strip_byte_counts.len() != info.strip_offsets.len() {
        return Err(SulcusError::Format(
            "strip offset and byte-count tags disagree".to_string(),
        ));
    }

    let mut samples = Vec::with_capacity(info.sample_count());
    for (&offset, &count) in info.strip_offsets.iter().zip(&info.strip_byte_counts) {
        let strip = data
            .get(offset..offset + count)
            .ok_or_else(|| truncated(offset))?;
        for pair in strip.chunks_exact(2) {
            samples.push(if big_endian {
                BigEndian::read_u16(pair)
            } else {
                LittleEndian::read_u16(pair)
            });
        }
    }
    if samples.len() != info.sample_count() {
        return Err(SulcusError::Format(format!(
            "page data holds {} samples, geometry implies {}",
            samples.len(),
            info.sample_count()
        )));
    }
    Array2::from_shape_vec((info.height, info.width), samples)
        .map_err(|e| SulcusError::Format(e.to_string()))
}

fn truncated(at: usize) -> SulcusError {
    SulcusError::Format(format!("page stream ends early at byte {at}"))
}

/// The source convention is treated as LPS-like; only an explicit RAS
/// request flips pages.
fn page_orientation(target: OrientationCode) -> OrientationCode {
    if target == OrientationCode::Ras {
        OrientationCode::Ras
    } else {
        OrientationCode::Lps
    }
}

/// Ingest a single- or multi-page stream into a volume. Takes the buffer by
/// value: the multi-page path rewrites it in place.
pub fn parse_pages(data: Vec<u8>, target: OrientationCode) -> Result<Volume> {
    let pages = PageReader::new(&data)?.page_count()?;
    debug!(pages, "scanned page directory");
    if pages == 1 {
        parse_single_page(&data, target)
    } else {
        parse_multi_page(data, pages, target)
    }
}

fn parse_single_page(data: &[u8], target: OrientationCode) -> Result<Volume> {
    let mut reader = PageReader::new(data)?;
    let info = reader.next_page()?;
    let mut page = reader.decode_page(&info)?;
    let orient = page_orientation(target);

    let mut volume = Volume::create(&CreateOptions {
        datatype: info.data_type(),
        dimensions: vec![info.width, info.height, 1],
        spacing: info.spacing(),
        orientation: orient,
        ..CreateOptions::default()
    })?;

    if orient == OrientationCode::Ras {
        page.invert_axis(Axis(0));
        page.invert_axis(Axis(1));
    }
    store_page(&mut volume, &page, 0);

    info!(
        width = info.width,
        height = info.height,
        orient = orient.as_str(),
        "decoded single-page bitmap"
    );
    Ok(volume)
}

fn parse_multi_page(mut data: Vec<u8>, pages: usize, target: OrientationCode) -> Result<Volume> {
    let orient = page_orientation(target);
    let chunk_pages = CHUNK_PAGES.min(pages);

    // Directory metadata is extracted up front; decoded chunks then overwrite
    // the stream strictly behind the read cursor.
    let big_endian;
    let mut infos = Vec::with_capacity(pages);
    {
        let mut reader = PageReader::new(&data)?;
        big_endian = reader.big_endian();
        for _ in 0..pages {
            infos.push(reader.next_page()?);
        }
    }

    let first = infos[0].clone();
    let page_bytes = first.byte_size();
    let mut scratch = Volume::create(&CreateOptions {
        datatype: first.data_type(),
        dimensions: vec![first.width, first.height, 1],
        spacing: first.spacing(),
        num_frames: chunk_pages,
        orientation: orient,
        ..CreateOptions::default()
    })?;

    let mut store_offset = 0usize;
    let mut piece = 0usize;
    let mut chunk_start = 0usize;

    for (f, info) in infos.iter().enumerate() {
        if info.width != first.width
            || info.height != first.height
            || info.sample_format != first.sample_format
        {
            return Err(SulcusError::Format(format!(
                "page {f} geometry differs from page 0"
            )));
        }
        if info.rows_per_strip < info.height {
            return Err(SulcusError::Format(format!(
                "page {f} is split into strips; chunked ingestion needs one strip per page"
            )));
        }

        let mut page = decode_page_from(&data, big_endian, info)?;
        if orient == OrientationCode::Ras {
            page.invert_axis(Axis(0));
            page.invert_axis(Axis(1));
        }
        store_page(&mut scratch, &page, piece);
        piece += 1;

        if piece >= chunk_pages || f == pages - 1 {
            // The write cursor may never pass the first undecoded strip.
            let next_strip = info.strip_offsets[0] + page_bytes;
            let base = if store_offset == 0 {
                DEFAULT_VOX_OFFSET
            } else {
                store_offset
            };
            let flush_bytes = piece * page_bytes;
            let write_end = base + flush_bytes;
            if write_end > next_strip {
                return Err(SulcusError::BufferOverflow {
                    write_end,
                    next_strip,
                });
            }

            if store_offset == 0 {
                let mut header = scratch.header().clone();
                header.dim[0] = 4;
                header.dim[4] = pages as i16;
                let header_bytes = header.serialize(false);
                data[..header_bytes.len()].copy_from_slice(&header_bytes);
                store_offset = header_bytes.len();
            }
            data[store_offset..store_offset + flush_bytes]
                .copy_from_slice(&scratch.raw_bytes()[..flush_bytes]);
            store_offset += flush_bytes;
            debug!(first = chunk_start, last = f, store_offset, "flushed page chunk");
            piece = 0;
            chunk_start = f + 1;
        }
    }

    info!(pages, "assembled multi-page volume in place");
    // The rebuilt buffer is now a primary-format image; alias it zero-copy.
    // Pages were already flipped per chunk, so no further reorientation.
    nifti::parse_volume(Bytes::from(data), OrientationCode::None, false)
}

/// Write a decoded page into frame slot `slot` of `volume`.
fn store_page(volume: &mut Volume, page: &Array2<u16>, slot: usize) {
    let base = slot * page.len() * 2;
    let raw = volume.buffer_mut().make_owned();
    for (i, &bits) in page.iter().enumerate() {
        let at = base + i * 2;
        LittleEndian::write_u16(&mut raw[at..at + 2], bits);
    }
}
