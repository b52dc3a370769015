use crate::byte_reader::{null_terminate, ByteReader};
use crate::error::{Result, YaffsError};
use crate::geometry::Geometry;

pub const MAX_NAME_LENGTH: usize = 253;
pub const MAX_ALIAS_LENGTH: usize = 159;

const NAME_FIELD_LEN: usize = MAX_NAME_LENGTH + 1;
const ALIAS_FIELD_LEN: usize = MAX_ALIAS_LENGTH + 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ObjectType {
    Unknown = 0,
    File = 1,
    Symlink = 2,
    Directory = 3,
    HardLink = 4,
    Special = 5,
}

impl TryFrom<u32> for ObjectType {
    type Error = YaffsError;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        match v {
            0 => Ok(ObjectType::Unknown),
            1 => Ok(ObjectType::File),
            2 => Ok(ObjectType::Symlink),
            3 => Ok(ObjectType::Directory),
            4 => Ok(ObjectType::HardLink),
            5 => Ok(ObjectType::Special),
            other => Err(YaffsError::MalformedHeader(format!(
                "unknown object type identifier: {other}"
            ))),
        }
    }
}

/// A decoded object-header page (§3 "Object header"). Names and aliases are
/// kept as raw byte strings; UTF-8 validity is only required at the
/// materialization boundary (§4.G), never here.
#[derive(Clone, Debug)]
pub struct Header {
    pub obj_type: ObjectType,
    pub parent_obj_id: u32,
    pub name: Vec<u8>,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub file_size_low: u32,
    pub equiv_id: u32,
    pub alias: Vec<u8>,
    pub rdev: u32,
    pub file_size_high: u32,
}

impl Header {
    /// Combines `file_size_low`/`file_size_high` per §4.G: the high half
    /// only participates when it isn't the "unused" sentinel `0xFFFFFFFF`.
    pub fn file_size(&self) -> u64 {
        if self.file_size_high != 0xFFFF_FFFF {
            (self.file_size_low as u64) | ((self.file_size_high as u64) << 32)
        } else if self.file_size_low != 0xFFFF_FFFF {
            self.file_size_low as u64
        } else {
            0
        }
    }
}

/// Decodes a page as an object header (a chunk whose spare has
/// `chunk_id == 0`). See §3 for the field layout.
pub fn decode_header(page: &[u8], geometry: &Geometry) -> Result<Header> {
    let mut r = ByteReader::new(page);

    let raw_type = r.read_u32(geometry.endian)?;
    let obj_type = ObjectType::try_from(raw_type)?;

    let parent_obj_id = r.read_u32(geometry.endian)?;

    r.skip(2)?; // legacy name checksum, unused

    let name = null_terminate(r.read_bytes(NAME_FIELD_LEN)?).to_vec();

    r.skip(4)?; // 0xFFFFFFFF filler

    let mode = r.read_u32(geometry.endian)?;
    let uid = r.read_u32(geometry.endian)?;
    let gid = r.read_u32(geometry.endian)?;
    let atime = r.read_u32(geometry.endian)?;
    let mtime = r.read_u32(geometry.endian)?;
    let ctime = r.read_u32(geometry.endian)?;

    let file_size_low = r.read_u32(geometry.endian)?;
    let equiv_id = r.read_u32(geometry.endian)?;

    let alias = null_terminate(r.read_bytes(ALIAS_FIELD_LEN)?).to_vec();

    let rdev = r.read_u32(geometry.endian)?;

    r.skip(4 * 6)?; // six WinCE timestamp halves, unused

    r.skip(4)?; // inband_shadowed_obj_id, unused
    r.skip(4)?; // inband_is_shrink, unused
    let file_size_high = r.read_u32(geometry.endian)?;
    // remaining reserved/shadow/shrink fields are unused and not consumed.

    Ok(Header {
        obj_type,
        parent_obj_id,
        name,
        mode,
        uid,
        gid,
        atime,
        mtime,
        ctime,
        file_size_low,
        equiv_id,
        alias,
        rdev,
        file_size_high,
    })
}
