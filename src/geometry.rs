use crate::byte_reader::Endian;
use crate::error::{Result, YaffsError};

pub const PAGE_SIZES: [usize; 6] = [512, 1024, 2048, 4096, 8192, 16384];
pub const SPARE_SIZES: [usize; 6] = [16, 32, 64, 128, 256, 512];

/// On-flash geometry: the four knobs needed to slice an image into chunks
/// and parse their spare records. Detected (§4.B), user-supplied, or
/// defaulted; never read from process-global state.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct Geometry {
    pub page_size: usize,
    pub spare_size: usize,
    pub endian: Endian,
    pub ecclayout: bool,
}

impl Geometry {
    pub const DEFAULT_PAGE_SIZE: usize = 2048;
    pub const DEFAULT_SPARE_SIZE: usize = 64;

    pub fn default_geometry() -> Self {
        Geometry {
            page_size: Self::DEFAULT_PAGE_SIZE,
            spare_size: Self::DEFAULT_SPARE_SIZE,
            endian: Endian::Little,
            ecclayout: true,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.page_size + self.spare_size
    }
}

const SPARE_LE_ECC: [u8; 4] = [0x00, 0x10, 0x00, 0x00];
const SPARE_LE_NOECC: [u8; 6] = [0xFF, 0xFF, 0x00, 0x10, 0x00, 0x00];
const SPARE_BE_ECC: [u8; 4] = [0x00, 0x00, 0x10, 0x00];
const SPARE_BE_NOECC: [u8; 6] = [0xFF, 0xFF, 0x00, 0x00, 0x10, 0x00];

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Infers page size, spare size, endianness, and ECC-layout from a sample
/// prefix of the image (10 KiB is sufficient in practice). See §4.B.
pub fn detect_geometry(sample: &[u8]) -> Result<Geometry> {
    let mut fixed: Option<(usize, Endian, bool)> = None;

    for &page_size in PAGE_SIZES.iter() {
        if sample.len() <= page_size + SPARE_LE_NOECC.len() {
            continue;
        }
        let tail = &sample[page_size..];
        if tail.starts_with(&SPARE_LE_ECC) {
            fixed = Some((page_size, Endian::Little, true));
        } else if tail.starts_with(&SPARE_LE_NOECC) {
            fixed = Some((page_size, Endian::Little, false));
        } else if tail.starts_with(&SPARE_BE_ECC) {
            fixed = Some((page_size, Endian::Big, true));
        } else if tail.starts_with(&SPARE_BE_NOECC) {
            fixed = Some((page_size, Endian::Big, false));
        }
        if fixed.is_some() {
            break;
        }
    }

    let (page_size, endian, ecclayout) = fixed.ok_or_else(|| {
        YaffsError::DetectFailed("could not locate start of spare data section".to_string())
    })?;

    let offset = if ecclayout { 4 } else { 6 };
    if page_size + offset + 4 > sample.len() {
        return Err(YaffsError::DetectFailed(
            "sample too short to locate end of spare data section".to_string(),
        ));
    }

    let mut needle = sample[page_size + offset..page_size + offset + 4].to_vec();
    needle.extend_from_slice(&[0xFF, 0xFF]);

    let haystack = &sample[page_size..];
    let found = find_subslice(haystack, &needle).ok_or_else(|| {
        YaffsError::DetectFailed("could not locate end of spare data section".to_string())
    })?;

    let spare_size = found
        .checked_sub(4)
        .ok_or_else(|| YaffsError::DetectFailed("spare data section too short".to_string()))?;

    if !SPARE_SIZES.contains(&spare_size) {
        return Err(YaffsError::DetectFailed(format!(
            "detected an unlikely spare size: {spare_size}"
        )));
    }

    Ok(Geometry {
        page_size,
        spare_size,
        endian,
        ecclayout,
    })
}
