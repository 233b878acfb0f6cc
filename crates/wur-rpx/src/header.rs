//! Big-endian ELF header records.
//!
//! Every multi-byte field on disk is big-endian; these readers byte-swap on
//! the way in and the in-memory structs hold host-order values. Raw image
//! bytes are never aliased as native integers.

use crate::constants::*;
use crate::{Result, RpxError};

/// Read a big-endian u16 at `offset`.
#[inline]
pub(crate) fn read_be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

/// Read a big-endian u32 at `offset`.
#[inline]
pub(crate) fn read_be32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Parsed ELF header.
#[derive(Clone, Debug)]
pub struct ElfHeader {
    pub e_type: u16,
    pub e_machine: u16,
    pub e_entry: u32,
    pub e_phoff: u32,
    pub e_shoff: u32,
    pub e_flags: u32,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl ElfHeader {
    /// Parse and validate the fixed 52-byte header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < EHDR_SIZE {
            return Err(RpxError::TooSmall);
        }
        if data[0..4] != ELF_MAGIC {
            return Err(RpxError::InvalidMagic);
        }
        if data[4] != ELF_CLASS_32 {
            return Err(RpxError::NotElf32(data[4]));
        }
        if data[5] != ELF_DATA_MSB {
            return Err(RpxError::NotBigEndian(data[5]));
        }
        let e_machine = read_be16(data, 18);
        if e_machine != EM_PPC {
            return Err(RpxError::NotPowerPc(e_machine));
        }

        Ok(Self {
            e_type: read_be16(data, 16),
            e_machine,
            e_entry: read_be32(data, 24),
            e_phoff: read_be32(data, 28),
            e_shoff: read_be32(data, 32),
            e_flags: read_be32(data, 36),
            e_phentsize: read_be16(data, 42),
            e_phnum: read_be16(data, 44),
            e_shentsize: read_be16(data, 46),
            e_shnum: read_be16(data, 48),
            e_shstrndx: read_be16(data, 50),
        })
    }
}

/// One section header entry.
#[derive(Clone, Debug)]
pub struct SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u32,
    pub sh_addr: u32,
    pub sh_offset: u32,
    pub sh_size: u32,
    pub sh_link: u32,
    pub sh_info: u32,
}

impl SectionHeader {
    pub(crate) fn parse(data: &[u8], offset: usize) -> Result<Self> {
        if offset + SHDR_SIZE > data.len() {
            return Err(RpxError::SectionTableOutOfBounds);
        }
        Ok(Self {
            sh_name: read_be32(data, offset),
            sh_type: read_be32(data, offset + 4),
            sh_flags: read_be32(data, offset + 8),
            sh_addr: read_be32(data, offset + 12),
            sh_offset: read_be32(data, offset + 16),
            sh_size: read_be32(data, offset + 20),
            sh_link: read_be32(data, offset + 24),
            sh_info: read_be32(data, offset + 28),
        })
    }
}

/// One program header entry. Parsed when present, unused downstream.
#[derive(Clone, Debug)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub p_offset: u32,
    pub p_vaddr: u32,
    pub p_filesz: u32,
    pub p_memsz: u32,
    pub p_flags: u32,
}

impl ProgramHeader {
    pub(crate) fn parse(data: &[u8], offset: usize) -> Result<Self> {
        if offset + PHDR_SIZE > data.len() {
            return Err(RpxError::ProgramTableOutOfBounds);
        }
        Ok(Self {
            p_type: read_be32(data, offset),
            p_offset: read_be32(data, offset + 4),
            p_vaddr: read_be32(data, offset + 8),
            p_filesz: read_be32(data, offset + 16),
            p_memsz: read_be32(data, offset + 20),
            p_flags: read_be32(data, offset + 24),
        })
    }
}

/// Cheap header peek: entry point without a full parse.
pub fn peek_entry_point(data: &[u8]) -> Result<u32> {
    ElfHeader::parse(data).map(|h| h.e_entry)
}
