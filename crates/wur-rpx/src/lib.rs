//! RPX image parser.
//!
//! RPX is the Wii U executable container: a 32-bit big-endian ELF variant
//! whose sections may be individually zlib-compressed (`SHF_RPL_ZLIB`) and
//! which adds RPL-specific section types for exports, imports, CRCs and
//! file info.

pub mod constants;
mod header;
mod image;
mod symbols;

pub use constants::*;
pub use header::*;
pub use image::*;
pub use symbols::*;

use thiserror::Error;

/// Image parsing errors.
#[derive(Error, Debug)]
pub enum RpxError {
    #[error("file too small for an ELF header")]
    TooSmall,
    #[error("invalid ELF magic")]
    InvalidMagic,
    #[error("not a 32-bit ELF (class {0})")]
    NotElf32(u8),
    #[error("not big-endian (data encoding {0})")]
    NotBigEndian(u8),
    #[error("not a PowerPC image (machine {0})")]
    NotPowerPc(u16),
    #[error("section table out of bounds")]
    SectionTableOutOfBounds,
    #[error("program header table out of bounds")]
    ProgramTableOutOfBounds,
    #[error("section {name} data out of bounds")]
    SectionDataOutOfBounds { name: String },
    #[error("section {name} failed to decompress: {source}")]
    Decompress {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("string table index {0} out of range")]
    BadStringTableIndex(u16),
}

pub type Result<T> = std::result::Result<T, RpxError>;
