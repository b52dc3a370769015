use clap::{Parser, ValueEnum};

use yaffs2_extract::byte_reader::Endian;

/// Reconstructs a directory tree from a raw YAFFS2 flash filesystem image.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// YAFFS2 image file to read
    #[arg(short = 'f', long = "file")]
    pub file: String,

    /// Output directory to extract into (required unless --ls)
    #[arg(short = 'd', long = "dir")]
    pub dir: Option<String>,

    /// Override the detected/default page size
    #[arg(short = 'p', long = "page-size")]
    pub page_size: Option<usize>,

    /// Override the detected/default spare size
    #[arg(short = 's', long = "spare-size")]
    pub spare_size: Option<usize>,

    /// Pages per erase block, enabling whole-block checkpoint/bad-block skip
    #[arg(short = 'B', long = "block-size")]
    pub block_size: Option<u32>,

    /// Byte order of the on-flash structures
    #[arg(short = 'e', long = "endianess", value_enum)]
    pub endianess: Option<EndianArg>,

    /// Disable ECC-layout spare parsing (two leading filler bytes)
    #[arg(short = 'n', long = "no-ecc")]
    pub no_ecc: bool,

    /// Auto-detect geometry from the image itself
    #[arg(short = 'a', long = "auto")]
    pub auto: bool,

    /// Exhaustive geometry search if the first parse attempt recovers nothing
    #[arg(short = 'b', long = "brute-force")]
    pub brute_force: bool,

    /// Preserve uid/gid from object headers
    #[arg(short = 'o', long = "ownership")]
    pub ownership: bool,

    /// Print entries only; do not extract anything to disk
    #[arg(short = 'l', long = "ls")]
    pub ls: bool,

    /// Verbose trace to stderr
    #[arg(short = 'D', long = "debug")]
    pub debug: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndianArg {
    Big,
    Little,
}

impl From<EndianArg> for Endian {
    fn from(value: EndianArg) -> Self {
        match value {
            EndianArg::Big => Endian::Big,
            EndianArg::Little => Endian::Little,
        }
    }
}
