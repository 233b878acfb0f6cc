//! Shared helpers for integration tests: assembles minimal RPX images in
//! memory (big-endian 32-bit PowerPC ELF with optional zlib sections).
#![allow(dead_code)]

use std::io::Write;

pub const EHDR_SIZE: usize = 52;
pub const SHDR_SIZE: usize = 40;

pub const SHT_PROGBITS: u32 = 1;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_NOBITS: u32 = 8;
pub const SHF_WRITE: u32 = 0x1;
pub const SHF_ALLOC: u32 = 0x2;
pub const SHF_EXECINSTR: u32 = 0x4;
pub const SHF_RPL_ZLIB: u32 = 0x0800_0000;

pub struct TestSection {
    pub name: &'static str,
    pub addr: u32,
    pub sh_type: u32,
    pub flags: u32,
    pub bytes: Vec<u8>,
}

impl TestSection {
    pub fn code(addr: u32, words: &[u32]) -> Self {
        Self {
            name: ".text",
            addr,
            sh_type: SHT_PROGBITS,
            flags: SHF_ALLOC | SHF_EXECINSTR,
            bytes: words.iter().flat_map(|w| w.to_be_bytes()).collect(),
        }
    }

    pub fn compressed_code(addr: u32, words: &[u32]) -> Self {
        let mut section = Self::code(addr, words);
        section.flags |= SHF_RPL_ZLIB;
        section
    }

    pub fn rodata(addr: u32, bytes: Vec<u8>) -> Self {
        Self { name: ".rodata", addr, sh_type: SHT_PROGBITS, flags: SHF_ALLOC, bytes }
    }
}

/// Assemble a complete RPX: null section, the given sections, `.shstrtab`.
pub fn build_rpx(entry: u32, sections: &[TestSection]) -> Vec<u8> {
    let mut shstrtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for section in sections {
        name_offsets.push(shstrtab.len() as u32);
        shstrtab.extend_from_slice(section.name.as_bytes());
        shstrtab.push(0);
    }
    let shstrtab_name = shstrtab.len() as u32;
    shstrtab.extend_from_slice(b".shstrtab\0");

    let shnum = sections.len() + 2;
    let mut file = vec![0u8; EHDR_SIZE];
    file[0..4].copy_from_slice(&[0x7F, 0x45, 0x4C, 0x46]);
    file[4] = 1; // ELFCLASS32
    file[5] = 2; // big-endian
    file[18..20].copy_from_slice(&20u16.to_be_bytes()); // EM_PPC
    file[24..28].copy_from_slice(&entry.to_be_bytes());

    let shoff = EHDR_SIZE;
    let data_start = shoff + shnum * SHDR_SIZE;
    let mut payload = Vec::new();
    let mut headers: Vec<[u32; 10]> = vec![[0; 10]];

    for (i, section) in sections.iter().enumerate() {
        let offset = (data_start + payload.len()) as u32;
        if section.sh_type == SHT_NOBITS {
            headers.push([
                name_offsets[i],
                section.sh_type,
                section.flags,
                section.addr,
                offset,
                section.bytes.len() as u32,
                0,
                0,
                0,
                0,
            ]);
            continue;
        }
        let size = section.bytes.len() as u32;
        if section.flags & SHF_RPL_ZLIB != 0 {
            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&section.bytes).unwrap();
            payload.extend_from_slice(&encoder.finish().unwrap());
        } else {
            payload.extend_from_slice(&section.bytes);
        }
        headers.push([
            name_offsets[i],
            section.sh_type,
            section.flags,
            section.addr,
            offset,
            size,
            0,
            0,
            0,
            0,
        ]);
    }

    let strtab_offset = (data_start + payload.len()) as u32;
    payload.extend_from_slice(&shstrtab);
    headers.push([
        shstrtab_name,
        SHT_STRTAB,
        0,
        0,
        strtab_offset,
        shstrtab.len() as u32,
        0,
        0,
        0,
        0,
    ]);

    file[32..36].copy_from_slice(&(shoff as u32).to_be_bytes());
    file[46..48].copy_from_slice(&(SHDR_SIZE as u16).to_be_bytes());
    file[48..50].copy_from_slice(&(shnum as u16).to_be_bytes());
    file[50..52].copy_from_slice(&((shnum - 1) as u16).to_be_bytes());

    for header in headers {
        for word in header {
            file.extend_from_slice(&word.to_be_bytes());
        }
    }
    file.extend_from_slice(&payload);
    file
}

/// A fresh scratch directory with an `out/` subdirectory.
pub fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(dir.join("out")).unwrap();
    dir
}
