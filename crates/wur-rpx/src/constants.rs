//! ELF and RPX constants.

/// ELF magic bytes.
pub const ELF_MAGIC: [u8; 4] = [0x7F, 0x45, 0x4C, 0x46];
/// EI_CLASS value for 32-bit objects.
pub const ELF_CLASS_32: u8 = 1;
/// EI_DATA value for big-endian objects.
pub const ELF_DATA_MSB: u8 = 2;
/// e_machine value for PowerPC.
pub const EM_PPC: u16 = 20;

/// ELF header size for 32-bit objects.
pub const EHDR_SIZE: usize = 52;
/// Section header entry size for 32-bit objects.
pub const SHDR_SIZE: usize = 40;
/// Program header entry size for 32-bit objects.
pub const PHDR_SIZE: usize = 32;
/// Symbol table entry size for 32-bit objects.
pub const SYM_SIZE: usize = 16;

// Section types.
pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_RELA: u32 = 4;
pub const SHT_NOBITS: u32 = 8;
pub const SHT_REL: u32 = 9;
// RPL-specific section types.
pub const SHT_RPL_EXPORTS: u32 = 0x8000_0001;
pub const SHT_RPL_IMPORTS: u32 = 0x8000_0002;
pub const SHT_RPL_CRCS: u32 = 0x8000_0003;
pub const SHT_RPL_FILEINFO: u32 = 0x8000_0004;

// Section flags.
pub const SHF_WRITE: u32 = 0x1;
pub const SHF_ALLOC: u32 = 0x2;
pub const SHF_EXECINSTR: u32 = 0x4;
/// RPL flag marking a zlib-compressed section payload.
pub const SHF_RPL_ZLIB: u32 = 0x0800_0000;

// Symbol types (st_info & 0xF).
pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;

// Wii U memory layout defaults.
pub const WIIU_MEM1_BASE: u32 = 0x0080_0000;
pub const WIIU_MEM1_SIZE: u32 = 0x0180_0000;
pub const WIIU_MEM2_BASE: u32 = 0x1000_0000;
pub const WIIU_MEM2_SIZE: u32 = 0x2000_0000;
pub const WIIU_CODE_BASE: u32 = 0x0200_0000;
pub const WIIU_CODE_SIZE: u32 = 0x0E00_0000;
