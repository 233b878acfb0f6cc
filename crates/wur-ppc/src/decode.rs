//! Word decoding against the descriptor table.
//!
//! A decoded instruction keeps the raw word, so emission code can pull any
//! encoding field straight from it. The `operands` array carries the few
//! values the jump-table scanner and label pass depend on:
//!
//! - `b`/`bl`: `[target]`
//! - `bc`: `[BO, BI, target]`
//! - simplified conditional branches: `[crf, target]` (`bdnz`/`bdz`: `[target]`)
//! - `cmpwi`/`cmplwi`: `[crf, rA, imm]`
//! - `li`/`lis`: `[rD, simm]`
//! - `addi` and displacement loads/stores: `[rD, rA, simm]`
//! - `rlwinm`: `[rA, rS, SH, MB]`
//! - everything else: the raw 5-bit fields 6-10, 11-15, 16-20, 21-25

use crate::opcode::{lookup, OpId, Opcode};
use crate::{ppc_bd, ppc_bi, ppc_bo, ppc_li};

/// One decoded instruction.
#[derive(Clone, Copy, Debug)]
pub struct Instr {
    pub raw: u32,
    pub addr: u32,
    pub opcode: Option<&'static Opcode>,
    pub operands: [u32; 4],
}

#[inline]
fn field(word: u32, start: u32, end: u32) -> u32 {
    (word >> (31 - end)) & ((1 << (end - start + 1)) - 1)
}

#[inline]
fn simm(word: u32) -> i32 {
    (word as i32) << 16 >> 16
}

/// Decode `word` located at `addr`. Branch-target operands come out as
/// absolute addresses.
pub fn decode(word: u32, addr: u32) -> Instr {
    let mut opcode = lookup(word);

    // mr is or rA, rS, rS; the table cannot express the field equality.
    if let Some(op) = opcode {
        if op.id == OpId::Mr && field(word, 6, 10) != field(word, 16, 20) {
            opcode = lookup_skipping_alias(word);
        }
    }

    let mut operands = [0u32; 4];
    if let Some(op) = opcode {
        decode_operands(op.id, word, addr, &mut operands);
    }

    Instr { raw: word, addr, opcode, operands }
}

fn lookup_skipping_alias(word: u32) -> Option<&'static Opcode> {
    crate::OPCODES
        .iter()
        .filter(|op| op.id != OpId::Mr)
        .find(|op| (word & op.mask) == op.bits)
}

fn decode_operands(id: OpId, word: u32, addr: u32, out: &mut [u32; 4]) {
    match id {
        OpId::B | OpId::Bl => {
            out[0] = addr.wrapping_add_signed(ppc_li(word));
        }
        OpId::Ba | OpId::Bla => {
            out[0] = (ppc_li(word) as u32) & !3;
        }
        OpId::Bc => {
            out[0] = ppc_bo(word);
            out[1] = ppc_bi(word);
            out[2] = addr.wrapping_add_signed(ppc_bd(word));
        }
        OpId::Blt
        | OpId::Bgt
        | OpId::Beq
        | OpId::Bso
        | OpId::Bge
        | OpId::Ble
        | OpId::Bne
        | OpId::Bns => {
            out[0] = ppc_bi(word) >> 2;
            out[1] = addr.wrapping_add_signed(ppc_bd(word));
        }
        OpId::Bdnz | OpId::Bdz => {
            out[0] = addr.wrapping_add_signed(ppc_bd(word));
        }
        OpId::Bclr | OpId::Bcctr => {
            out[0] = ppc_bo(word);
            out[1] = ppc_bi(word);
        }
        OpId::Cmpwi | OpId::Cmplwi => {
            out[0] = field(word, 6, 8);
            out[1] = field(word, 11, 15);
            out[2] = if id == OpId::Cmpwi { simm(word) as u32 } else { word & 0xFFFF };
        }
        OpId::Cmpw | OpId::Cmplw => {
            out[0] = field(word, 6, 8);
            out[1] = field(word, 11, 15);
            out[2] = field(word, 16, 20);
        }
        OpId::Li | OpId::Lis => {
            out[0] = field(word, 6, 10);
            out[1] = simm(word) as u32;
        }
        OpId::Addi
        | OpId::Addis
        | OpId::Addic
        | OpId::AddicRc
        | OpId::Mulli
        | OpId::Subfic
        | OpId::Lwz
        | OpId::Lwzu
        | OpId::Lbz
        | OpId::Lbzu
        | OpId::Lhz
        | OpId::Lhzu
        | OpId::Lha
        | OpId::Lhau
        | OpId::Stw
        | OpId::Stwu
        | OpId::Stb
        | OpId::Stbu
        | OpId::Sth
        | OpId::Sthu
        | OpId::Lmw
        | OpId::Stmw
        | OpId::Lfs
        | OpId::Lfd
        | OpId::Stfs
        | OpId::Stfd => {
            out[0] = field(word, 6, 10);
            out[1] = field(word, 11, 15);
            out[2] = simm(word) as u32;
        }
        OpId::Ori | OpId::Oris | OpId::Xori | OpId::Xoris | OpId::AndiRc | OpId::AndisRc => {
            out[0] = field(word, 11, 15);
            out[1] = field(word, 6, 10);
            out[2] = word & 0xFFFF;
        }
        OpId::Rlwinm | OpId::Rlwimi => {
            out[0] = field(word, 11, 15);
            out[1] = field(word, 6, 10);
            out[2] = field(word, 16, 20);
            out[3] = field(word, 21, 25);
        }
        OpId::Srawi => {
            out[0] = field(word, 11, 15);
            out[1] = field(word, 6, 10);
            out[2] = field(word, 16, 20);
        }
        OpId::Mr | OpId::Cntlzw | OpId::Extsb | OpId::Extsh => {
            out[0] = field(word, 11, 15);
            out[1] = field(word, 6, 10);
        }
        OpId::And
        | OpId::Andc
        | OpId::Or
        | OpId::Orc
        | OpId::Xor
        | OpId::Nand
        | OpId::Nor
        | OpId::Eqv
        | OpId::Slw
        | OpId::Srw
        | OpId::Sraw
        | OpId::Rlwnm => {
            out[0] = field(word, 11, 15);
            out[1] = field(word, 6, 10);
            out[2] = field(word, 16, 20);
        }
        _ => {
            out[0] = field(word, 6, 10);
            out[1] = field(word, 11, 15);
            out[2] = field(word, 16, 20);
            out[3] = field(word, 21, 25);
        }
    }
}

impl Instr {
    /// Decoded identity, or `None` for an unrecognized word.
    pub fn id(&self) -> Option<OpId> {
        self.opcode.map(|op| op.id)
    }

    pub fn is_valid(&self) -> bool {
        self.opcode.is_some()
    }

    // Raw field accessors; big-endian bit numbering throughout.

    pub fn rd(&self) -> u32 {
        field(self.raw, 6, 10)
    }

    pub fn ra(&self) -> u32 {
        field(self.raw, 11, 15)
    }

    pub fn rb(&self) -> u32 {
        field(self.raw, 16, 20)
    }

    /// Fourth register field (frC in A-form floating point).
    pub fn rc_field(&self) -> u32 {
        field(self.raw, 21, 25)
    }

    pub fn crfd(&self) -> u32 {
        field(self.raw, 6, 8)
    }

    pub fn simm(&self) -> i32 {
        simm(self.raw)
    }

    pub fn uimm(&self) -> u32 {
        self.raw & 0xFFFF
    }

    pub fn sh(&self) -> u32 {
        field(self.raw, 16, 20)
    }

    pub fn mb(&self) -> u32 {
        field(self.raw, 21, 25)
    }

    pub fn me(&self) -> u32 {
        field(self.raw, 26, 30)
    }

    /// CRM field of mtcrf.
    pub fn crm(&self) -> u32 {
        field(self.raw, 12, 19)
    }

    /// Signed 12-bit displacement of quantized loads and stores.
    pub fn ps_d(&self) -> i32 {
        ((self.raw as i32) << 20) >> 20
    }

    /// W bit of quantized loads and stores (single-lane when set).
    pub fn ps_w(&self) -> u32 {
        field(self.raw, 16, 16)
    }

    /// GQR index of quantized loads and stores.
    pub fn ps_i(&self) -> u32 {
        field(self.raw, 17, 19)
    }

    /// W bit of the indexed quantized forms.
    pub fn ps_wx(&self) -> u32 {
        field(self.raw, 21, 21)
    }

    /// GQR index of the indexed quantized forms.
    pub fn ps_ix(&self) -> u32 {
        field(self.raw, 22, 24)
    }
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(op) = self.opcode else {
            return write!(f, "invalid 0x{:08X}", self.raw);
        };
        write!(f, "{}", op.name)?;
        let id = op.id;
        // Branch targets render as addresses, everything else as raw values.
        let count = operand_count(id);
        for (i, value) in self.operands.iter().take(count).enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            if is_target_operand(id, i) {
                write!(f, "{sep}0x{value:X}")?;
            } else {
                write!(f, "{sep}{value}")?;
            }
        }
        Ok(())
    }
}

fn operand_count(id: OpId) -> usize {
    match id {
        OpId::Nop
        | OpId::Blr
        | OpId::Blrl
        | OpId::Bctr
        | OpId::Bctrl
        | OpId::Sync
        | OpId::Isync
        | OpId::Eieio
        | OpId::Sc => 0,
        OpId::B | OpId::Ba | OpId::Bl | OpId::Bla | OpId::Bdnz | OpId::Bdz => 1,
        OpId::Blt
        | OpId::Bgt
        | OpId::Beq
        | OpId::Bso
        | OpId::Bge
        | OpId::Ble
        | OpId::Bne
        | OpId::Bns
        | OpId::Li
        | OpId::Lis
        | OpId::Mr
        | OpId::Bclr
        | OpId::Bcctr
        | OpId::Cntlzw
        | OpId::Extsb
        | OpId::Extsh
        | OpId::Mcrf
        | OpId::Mtcrf => 2,
        OpId::Mflr | OpId::Mtlr | OpId::Mfctr | OpId::Mtctr | OpId::Mfcr | OpId::Mfmsr
        | OpId::Mtmsr => 1,
        OpId::Rlwinm | OpId::Rlwimi | OpId::Fmadd | OpId::Fmadds | OpId::Fmsub | OpId::Fmsubs
        | OpId::Fnmadd | OpId::Fnmadds | OpId::Fnmsub | OpId::Fnmsubs | OpId::Fsel
        | OpId::PsMadd | OpId::PsMsub | OpId::PsNmadd | OpId::PsNmsub | OpId::PsSel
        | OpId::PsMadds0 | OpId::PsMadds1 | OpId::PsSum0 | OpId::PsSum1 | OpId::PsqL
        | OpId::PsqLu | OpId::PsqSt | OpId::PsqStu => 4,
        _ => 3,
    }
}

fn is_target_operand(id: OpId, index: usize) -> bool {
    match id {
        OpId::B | OpId::Ba | OpId::Bl | OpId::Bla | OpId::Bdnz | OpId::Bdz => index == 0,
        OpId::Bc => index == 2,
        OpId::Blt
        | OpId::Bgt
        | OpId::Beq
        | OpId::Bso
        | OpId::Bge
        | OpId::Ble
        | OpId::Bne
        | OpId::Bns => index == 1,
        _ => false,
    }
}
