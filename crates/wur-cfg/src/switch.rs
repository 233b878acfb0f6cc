//! Jump-table recognition.
//!
//! Wii U compilers emit four dispatch shapes, all ending in `mtctr`/`bctr`.
//! Each is recognized by matching the exact opcode sequence, then walking
//! backward to the guard that bounds the selector: a `bgt`/`ble` names the
//! default label and a `cmplwi` on the same condition field names the
//! selector register and the case count.

use tracing::warn;
use wur_ppc::{decode, Instr, OpId};
use wur_rpx::RpxImage;

/// How case targets are stored and reconstructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchKind {
    /// 4-byte big-endian absolute targets: `table[i]`.
    Absolute,
    /// 1-byte scaled offsets: `base + (table[i] << shift)`.
    Computed,
    /// 1-byte offsets: `base + table[i]`.
    ByteOffset,
    /// 2-byte big-endian offsets: `base + table[i]`.
    ShortOffset,
}

impl SwitchKind {
    pub const ALL: [SwitchKind; 4] =
        [SwitchKind::Absolute, SwitchKind::Computed, SwitchKind::ByteOffset, SwitchKind::ShortOffset];

    fn pattern(self) -> &'static [OpId] {
        use OpId::*;
        match self {
            SwitchKind::Absolute => &[Lis, Addi, Rlwinm, Lwzx, Mtctr, Bctr],
            SwitchKind::Computed => &[Lis, Addi, Lbzx, Rlwinm, Lis, Addi, Add, Mtctr],
            SwitchKind::ByteOffset => &[Lis, Addi, Lbzx, Lis, Addi, Add, Mtctr],
            SwitchKind::ShortOffset => &[Lis, Addi, Rlwinm, Lhzx, Lis, Addi, Add, Mtctr],
        }
    }
}

/// One recognized dispatch site.
#[derive(Clone, Debug)]
pub struct SwitchTable {
    /// Address of the first instruction of the dispatch pattern.
    pub base: u32,
    pub kind: SwitchKind,
    /// Selector register.
    pub register: u32,
    /// Taken target of the guarding branch.
    pub default_target: u32,
    /// Case targets in selector order.
    pub labels: Vec<u32>,
}

/// Scan every code section for one dispatch shape.
pub fn scan_kind(image: &RpxImage, kind: SwitchKind) -> Vec<SwitchTable> {
    let mut tables = Vec::new();
    let pattern = kind.pattern();

    for section in &image.sections {
        if !section.is_code() {
            continue;
        }
        let Some(code) = section.data.as_deref() else { continue };
        let word_count = code.len() / 4;
        if word_count < pattern.len() {
            continue;
        }

        for i in 0..=word_count - pattern.len() {
            if !matches_pattern(code, section.base, i, pattern) {
                continue;
            }
            let site = section.base + i as u32 * 4;
            let Some(guard) = scan_guard(code, i, section.base) else {
                warn!(site = format_args!("{site:#010X}"), "jump table candidate without guard");
                continue;
            };
            match read_table(image, code, i, site, kind, &guard) {
                Some(table) => tables.push(table),
                None => {
                    warn!(site = format_args!("{site:#010X}"), "jump table candidate dropped");
                }
            }
        }
    }

    tables
}

/// Scan every code section for all four shapes, in shape order.
pub fn scan_image(image: &RpxImage) -> Vec<SwitchTable> {
    SwitchKind::ALL.iter().flat_map(|&kind| scan_kind(image, kind)).collect()
}

fn instr_at(code: &[u8], section_base: u32, word_index: usize) -> Instr {
    let offset = word_index * 4;
    let word = u32::from_be_bytes([
        code[offset],
        code[offset + 1],
        code[offset + 2],
        code[offset + 3],
    ]);
    decode(word, section_base + offset as u32)
}

fn matches_pattern(code: &[u8], section_base: u32, start: usize, pattern: &[OpId]) -> bool {
    pattern
        .iter()
        .enumerate()
        .all(|(j, &id)| instr_at(code, section_base, start + j).id() == Some(id))
}

struct Guard {
    register: u32,
    default_target: u32,
    case_count: u32,
}

/// Walk backward up to 32 instructions from the pattern start looking for
/// the bounding comparison.
fn scan_guard(code: &[u8], pattern_index: usize, section_base: u32) -> Option<Guard> {
    let mut cr = None;
    let mut default_target = 0;

    for i in 0..32 {
        let Some(index) = pattern_index.checked_sub(i) else { break };
        let ins = instr_at(code, section_base, index);
        let Some(id) = ins.id() else { continue };

        match cr {
            None => {
                if matches!(id, OpId::Bgt | OpId::Ble) {
                    cr = Some(ins.operands[0]);
                    default_target = ins.operands[1];
                }
            }
            Some(field) => {
                if id == OpId::Cmplwi && ins.operands[0] == field {
                    return Some(Guard {
                        register: ins.operands[1],
                        default_target,
                        case_count: ins.operands[2] + 1,
                    });
                }
            }
        }
    }
    None
}

/// High/low halves of a `lis`/`addi` pair reassembled into a pointer.
fn pair_address(hi: &Instr, lo: &Instr) -> u32 {
    ((hi.operands[1] as i32 as u32) << 16).wrapping_add(lo.operands[2])
}

fn read_table(
    image: &RpxImage,
    code: &[u8],
    pattern_index: usize,
    site: u32,
    kind: SwitchKind,
    guard: &Guard,
) -> Option<SwitchTable> {
    let ins = |j: usize| instr_at(code, site - pattern_index as u32 * 4, pattern_index + j);
    let count = guard.case_count as usize;

    let table_addr = pair_address(&ins(0), &ins(1));
    let labels = match kind {
        SwitchKind::Absolute => {
            let bytes = image.find(table_addr)?;
            if bytes.len() < count * 4 {
                return None;
            }
            (0..count)
                .map(|i| {
                    u32::from_be_bytes([
                        bytes[i * 4],
                        bytes[i * 4 + 1],
                        bytes[i * 4 + 2],
                        bytes[i * 4 + 3],
                    ])
                })
                .collect::<Vec<_>>()
        }
        SwitchKind::Computed => {
            let base = pair_address(&ins(4), &ins(5));
            let shift = ins(3).operands[2];
            let bytes = image.find(table_addr)?;
            if bytes.len() < count {
                return None;
            }
            bytes[..count].iter().map(|&b| base.wrapping_add((b as u32) << shift)).collect()
        }
        SwitchKind::ByteOffset => {
            let base = pair_address(&ins(3), &ins(4));
            let bytes = image.find(table_addr)?;
            if bytes.len() < count {
                return None;
            }
            bytes[..count].iter().map(|&b| base.wrapping_add(b as u32)).collect()
        }
        SwitchKind::ShortOffset => {
            let base = pair_address(&ins(4), &ins(5));
            let bytes = image.find(table_addr)?;
            if bytes.len() < count * 2 {
                return None;
            }
            (0..count)
                .map(|i| {
                    base.wrapping_add(
                        u16::from_be_bytes([bytes[i * 2], bytes[i * 2 + 1]]) as u32
                    )
                })
                .collect()
        }
    };

    let table = SwitchTable {
        base: site,
        kind,
        register: guard.register,
        default_target: guard.default_target,
        labels,
    };
    validate(image, &table).then_some(table)
}

/// Every target of a usable table lands in executable code.
fn validate(image: &RpxImage, table: &SwitchTable) -> bool {
    if table.labels.is_empty() || !image.is_code_address(table.default_target) {
        return false;
    }
    table.labels.iter().all(|&label| image.is_code_address(label))
}
