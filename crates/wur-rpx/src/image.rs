//! Image loading and the address index.

use std::io::Read;

use tracing::debug;

use crate::constants::*;
use crate::header::{read_be32, ElfHeader, ProgramHeader, SectionHeader};
use crate::symbols::{Symbol, SymbolKind, SymbolStore};
use crate::{Result, RpxError};

/// A materialized section.
///
/// `data` holds the decompressed bytes and is `None` for NOBITS sections.
#[derive(Clone, Debug)]
pub struct Section {
    pub name: String,
    pub base: u32,
    pub size: u32,
    pub sh_type: u32,
    pub sh_flags: u32,
    pub was_compressed: bool,
    pub data: Option<Vec<u8>>,
}

impl Section {
    pub fn is_code(&self) -> bool {
        self.sh_flags & SHF_EXECINSTR != 0
    }

    pub fn is_data(&self) -> bool {
        self.sh_flags & SHF_WRITE != 0
    }

    pub fn is_bss(&self) -> bool {
        self.sh_type == SHT_NOBITS
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.base && address < self.base + self.size
    }
}

/// A fully parsed RPX image.
///
/// Constructed once from a byte buffer and immutable afterwards, except for
/// the symbol store, which grows as discovery synthesizes names.
#[derive(Clone, Debug, Default)]
pub struct RpxImage {
    /// Raw file bytes.
    pub data: Vec<u8>,
    pub entry_point: u32,
    /// Lowest non-zero section base.
    pub base: u32,
    pub sections: Vec<Section>,
    pub symbols: SymbolStore,
    pub program_headers: Vec<ProgramHeader>,
    pub text_base: u32,
    pub text_size: u32,
    pub data_base: u32,
    pub data_size: u32,
    pub has_rpl_imports: bool,
    pub has_rpl_exports: bool,
}

impl RpxImage {
    /// Parse an RPX from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = ElfHeader::parse(data)?;

        let mut image = RpxImage {
            data: data.to_vec(),
            entry_point: header.e_entry,
            ..Default::default()
        };

        let section_headers = Self::parse_section_headers(data, &header)?;
        image.program_headers = Self::parse_program_headers(data, &header)?;
        image.materialize_sections(data, &header, &section_headers)?;
        image.load_symbols();
        image.load_imports();
        image.load_exports();

        Ok(image)
    }

    fn parse_section_headers(data: &[u8], header: &ElfHeader) -> Result<Vec<SectionHeader>> {
        if header.e_shoff == 0 || header.e_shnum == 0 {
            return Err(RpxError::SectionTableOutOfBounds);
        }
        let mut headers = Vec::with_capacity(header.e_shnum as usize);
        for i in 0..header.e_shnum {
            let offset = header.e_shoff as usize + i as usize * SHDR_SIZE;
            headers.push(SectionHeader::parse(data, offset)?);
        }
        Ok(headers)
    }

    fn parse_program_headers(data: &[u8], header: &ElfHeader) -> Result<Vec<ProgramHeader>> {
        if header.e_phoff == 0 || header.e_phnum == 0 {
            return Ok(Vec::new());
        }
        let mut headers = Vec::with_capacity(header.e_phnum as usize);
        for i in 0..header.e_phnum {
            let offset = header.e_phoff as usize + i as usize * PHDR_SIZE;
            headers.push(ProgramHeader::parse(data, offset)?);
        }
        Ok(headers)
    }

    fn materialize_sections(
        &mut self,
        data: &[u8],
        header: &ElfHeader,
        section_headers: &[SectionHeader],
    ) -> Result<()> {
        let strtab = Self::section_name_table(data, header, section_headers)?;

        self.sections.reserve(section_headers.len());
        for sh in section_headers {
            let name = name_at(strtab, sh.sh_name as usize);

            let bytes = if sh.sh_type == SHT_NOBITS || sh.sh_size == 0 {
                None
            } else if sh.sh_flags & SHF_RPL_ZLIB != 0 {
                Some(decompress_section(data, sh, &name)?)
            } else {
                let start = sh.sh_offset as usize;
                let end = start + sh.sh_size as usize;
                if end > data.len() {
                    return Err(RpxError::SectionDataOutOfBounds { name });
                }
                Some(data[start..end].to_vec())
            };

            let section = Section {
                name,
                base: sh.sh_addr,
                size: sh.sh_size,
                sh_type: sh.sh_type,
                sh_flags: sh.sh_flags,
                was_compressed: sh.sh_flags & SHF_RPL_ZLIB != 0,
                data: bytes,
            };

            if section.name == ".text" && section.is_code() {
                self.text_base = section.base;
                self.text_size = section.size;
            }
            if section.name == ".data" && section.is_data() {
                self.data_base = section.base;
                self.data_size = section.size;
            }

            self.sections.push(section);
        }

        self.base = self
            .sections
            .iter()
            .filter(|s| s.base > 0)
            .map(|s| s.base)
            .min()
            .unwrap_or(0);

        Ok(())
    }

    fn section_name_table<'a>(
        data: &'a [u8],
        header: &ElfHeader,
        section_headers: &[SectionHeader],
    ) -> Result<&'a [u8]> {
        let index = header.e_shstrndx as usize;
        let sh = section_headers
            .get(index)
            .ok_or(RpxError::BadStringTableIndex(header.e_shstrndx))?;
        let start = sh.sh_offset as usize;
        let end = start + sh.sh_size as usize;
        if end > data.len() {
            return Err(RpxError::BadStringTableIndex(header.e_shstrndx));
        }
        Ok(&data[start..end])
    }

    /// Bytes at `address`, running to the end of the owning section. Returns
    /// `None` for addresses outside every section and for BSS.
    ///
    /// Sections placed at address zero (symbol and string tables) are not
    /// part of the guest address space and never match.
    pub fn find(&self, address: u32) -> Option<&[u8]> {
        for section in &self.sections {
            if section.base != 0 && section.contains(address) {
                let bytes = section.data.as_deref()?;
                return Some(&bytes[(address - section.base) as usize..]);
            }
        }
        None
    }

    /// The section containing `address`, if any.
    pub fn section_at(&self, address: u32) -> Option<&Section> {
        self.sections.iter().find(|s| s.base != 0 && s.contains(address))
    }

    /// Section lookup by name.
    pub fn section_named(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Whether `address` falls inside an executable section.
    pub fn is_code_address(&self, address: u32) -> bool {
        self.section_at(address).is_some_and(Section::is_code)
    }

    fn load_symbols(&mut self) {
        let Some(symtab) = self.section_named(".symtab").and_then(|s| s.data.clone()) else {
            return;
        };
        let Some(strtab) = self.section_named(".strtab").and_then(|s| s.data.clone()) else {
            return;
        };

        let count = symtab.len() / SYM_SIZE;
        for i in 0..count {
            let offset = i * SYM_SIZE;
            let st_name = read_be32(&symtab, offset) as usize;
            let st_value = read_be32(&symtab, offset + 4);
            let st_size = read_be32(&symtab, offset + 8);
            let st_info = symtab[offset + 12];

            if st_name >= strtab.len() {
                continue;
            }
            let name = name_at(&strtab, st_name);
            if name.is_empty() || st_size == 0 {
                continue;
            }

            let kind = match st_info & 0xF {
                STT_OBJECT => SymbolKind::Data,
                STT_FUNC => SymbolKind::Function,
                _ => SymbolKind::Object,
            };
            self.symbols.insert(Symbol::new(name, st_value, st_size, kind));
        }
        debug!(count = self.symbols.len(), "loaded symbol table");
    }

    // Import and export payloads are not parsed yet; only their presence is
    // recorded so callers can tell a stripped image from a linked one.
    fn load_imports(&mut self) {
        self.has_rpl_imports = self
            .sections
            .iter()
            .any(|s| s.sh_type == SHT_RPL_IMPORTS || s.name == ".rpl_imports");
        if self.has_rpl_imports {
            debug!("image carries RPL import sections");
        }
    }

    fn load_exports(&mut self) {
        self.has_rpl_exports = self
            .sections
            .iter()
            .any(|s| s.sh_type == SHT_RPL_EXPORTS || s.name == ".rpl_exports");
        if self.has_rpl_exports {
            debug!("image carries RPL export sections");
        }
    }
}

fn name_at(strtab: &[u8], offset: usize) -> String {
    if offset >= strtab.len() {
        return String::new();
    }
    let bytes = &strtab[offset..];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn decompress_section(data: &[u8], sh: &SectionHeader, name: &str) -> Result<Vec<u8>> {
    let start = sh.sh_offset as usize;
    if start >= data.len() {
        return Err(RpxError::SectionDataOutOfBounds { name: name.to_string() });
    }
    let mut out = Vec::with_capacity(sh.sh_size as usize);
    let mut decoder = flate2::read::ZlibDecoder::new(&data[start..]);
    decoder
        .by_ref()
        .take(sh.sh_size as u64)
        .read_to_end(&mut out)
        .map_err(|source| RpxError::Decompress { name: name.to_string(), source })?;
    if out.len() != sh.sh_size as usize {
        return Err(RpxError::Decompress {
            name: name.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes, got {}", sh.sh_size, out.len()),
            ),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Assembles a minimal RPX: null section, .shstrtab, plus the given
    /// sections (name, addr, type, flags, bytes).
    fn build_rpx(entry: u32, sections: &[(&str, u32, u32, u32, Vec<u8>)]) -> Vec<u8> {
        let mut shstrtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for (name, ..) in sections {
            name_offsets.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(name.as_bytes());
            shstrtab.push(0);
        }
        let shstrtab_name = shstrtab.len() as u32;
        shstrtab.extend_from_slice(b".shstrtab\0");

        let shnum = sections.len() + 2;
        let mut file = vec![0u8; EHDR_SIZE];
        file[0..4].copy_from_slice(&ELF_MAGIC);
        file[4] = ELF_CLASS_32;
        file[5] = ELF_DATA_MSB;
        file[18..20].copy_from_slice(&EM_PPC.to_be_bytes());
        file[24..28].copy_from_slice(&entry.to_be_bytes());

        // Section payloads follow the headers.
        let shoff = EHDR_SIZE;
        let data_start = shoff + shnum * SHDR_SIZE;
        let mut payload = Vec::new();
        let mut headers = Vec::new();

        // Null section.
        headers.push([0u32; 10]);
        for (i, (_, addr, sh_type, flags, bytes)) in sections.iter().enumerate() {
            let offset = (data_start + payload.len()) as u32;
            let size = if *sh_type == SHT_NOBITS {
                bytes.len() as u32
            } else if *flags & SHF_RPL_ZLIB != 0 {
                // sh_size is the uncompressed length; compress the payload.
                let mut enc =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(bytes).unwrap();
                let compressed = enc.finish().unwrap();
                let size = bytes.len() as u32;
                payload.extend_from_slice(&compressed);
                headers.push([name_offsets[i], *sh_type, *flags, *addr, offset, size, 0, 0, 0, 0]);
                continue;
            } else {
                payload.extend_from_slice(bytes);
                bytes.len() as u32
            };
            headers.push([name_offsets[i], *sh_type, *flags, *addr, offset, size, 0, 0, 0, 0]);
        }
        // .shstrtab last.
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

    #[test]
    fn parses_single_code_section() {
        let code = vec![0x4E, 0x80, 0x00, 0x20]; // blr
        let file = build_rpx(
            0x0200_0000,
            &[(".text", 0x0200_0000, SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR, code.clone())],
        );
        let image = RpxImage::parse(&file).unwrap();
        assert_eq!(image.base, 0x0200_0000);
        assert_eq!(image.text_base, 0x0200_0000);
        assert_eq!(image.text_size, 4);
        let section = image.section_named(".text").unwrap();
        assert!(section.is_code());
        assert!(!section.was_compressed);
        assert_eq!(image.find(0x0200_0000).unwrap()[..4], code[..]);
    }

    #[test]
    fn find_covers_section_and_nothing_else() {
        let code = vec![0xAA; 16];
        let file = build_rpx(
            0x0200_0000,
            &[(".text", 0x0200_0000, SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR, code)],
        );
        let image = RpxImage::parse(&file).unwrap();
        for addr in 0x0200_0000u32..0x0200_0010 {
            let bytes = image.find(addr).unwrap();
            assert_eq!(bytes[0], 0xAA);
            assert_eq!(bytes.len(), (0x0200_0010 - addr) as usize);
        }
        assert!(image.find(0x0200_0010).is_none());
        assert!(image.find(0x01FF_FFFF).is_none());
        assert!(image.find(0).is_none());
    }

    #[test]
    fn zlib_section_roundtrips() {
        let code = vec![0x4E, 0x80, 0x00, 0x20];
        let file = build_rpx(
            0x0200_0000,
            &[(
                ".text",
                0x0200_0000,
                SHT_PROGBITS,
                SHF_ALLOC | SHF_EXECINSTR | SHF_RPL_ZLIB,
                code.clone(),
            )],
        );
        let image = RpxImage::parse(&file).unwrap();
        let section = image.section_named(".text").unwrap();
        assert!(section.was_compressed);
        assert_eq!(section.data.as_deref().unwrap(), &code[..]);
    }

    #[test]
    fn bss_has_no_bytes() {
        let file = build_rpx(
            0x1000_0000,
            &[(".bss", 0x1000_0000, SHT_NOBITS, SHF_ALLOC | SHF_WRITE, vec![0; 64])],
        );
        let image = RpxImage::parse(&file).unwrap();
        let section = image.section_named(".bss").unwrap();
        assert!(section.is_bss());
        assert!(section.data.is_none());
        assert_eq!(section.size, 64);
        assert!(image.find(0x1000_0000).is_none());
    }

    #[test]
    fn base_is_lowest_nonzero_section() {
        let file = build_rpx(
            0x0200_0000,
            &[
                (".text", 0x0200_0000, SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR, vec![0; 4]),
                (".data", 0x1000_0000, SHT_PROGBITS, SHF_ALLOC | SHF_WRITE, vec![0; 4]),
            ],
        );
        let image = RpxImage::parse(&file).unwrap();
        assert_eq!(image.base, 0x0200_0000);
        assert_eq!(image.data_base, 0x1000_0000);
    }

    #[test]
    fn symbols_load_from_symtab() {
        let mut symtab = Vec::new();
        let mut strtab = vec![0u8];
        let name_off = strtab.len() as u32;
        strtab.extend_from_slice(b"main\0");
        symtab.extend_from_slice(&name_off.to_be_bytes());
        symtab.extend_from_slice(&0x0200_0000u32.to_be_bytes());
        symtab.extend_from_slice(&8u32.to_be_bytes());
        symtab.push(STT_FUNC); // st_info
        symtab.push(0);
        symtab.extend_from_slice(&1u16.to_be_bytes());
        // Zero-size entry must be dropped.
        symtab.extend_from_slice(&name_off.to_be_bytes());
        symtab.extend_from_slice(&0x0200_0008u32.to_be_bytes());
        symtab.extend_from_slice(&0u32.to_be_bytes());
        symtab.push(STT_FUNC);
        symtab.push(0);
        symtab.extend_from_slice(&1u16.to_be_bytes());

        let file = build_rpx(
            0x0200_0000,
            &[
                (".text", 0x0200_0000, SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR, vec![0; 8]),
                (".symtab", 0, SHT_SYMTAB, 0, symtab),
                (".strtab", 0, SHT_STRTAB, 0, strtab),
            ],
        );
        let image = RpxImage::parse(&file).unwrap();
        assert_eq!(image.symbols.len(), 1);
        let sym = image.symbols.get(0x0200_0000).unwrap();
        assert_eq!(sym.name, "main");
        assert_eq!(sym.kind, SymbolKind::Function);
    }

    #[test]
    fn truncated_file_is_an_error() {
        // Cutting the tail clips the string table, or the section payload
        // once enough is gone; either way parsing must fail cleanly.
        let file = build_rpx(
            0x0200_0000,
            &[(".text", 0x0200_0000, SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR, vec![0; 32])],
        );
        for cut in [16, 48, 96] {
            let mut clipped = file.clone();
            clipped.truncate(clipped.len() - cut);
            assert!(RpxImage::parse(&clipped).is_err(), "cut {cut} parsed");
        }
    }
}
