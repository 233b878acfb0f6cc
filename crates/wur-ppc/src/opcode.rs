//! Static opcode descriptor table.
//!
//! Descriptors are matched first-hit by `(word & mask) == bits`, so
//! simplified mnemonics (`li`, `lis`, `mr`, `nop`, `blr`, `beq`, ...) must
//! precede the generic encodings they specialize.

/// Instruction identity used to dispatch analysis and emission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum OpId {
    // Integer arithmetic
    Add,
    Addc,
    Adde,
    Addi,
    Addic,
    AddicRc,
    Addis,
    Addze,
    Subf,
    Subfc,
    Subfe,
    Subfic,
    Neg,
    Mulli,
    Mullw,
    Mulhw,
    Mulhwu,
    Divw,
    Divwu,
    // Logic and shifts
    And,
    Andc,
    AndiRc,
    AndisRc,
    Or,
    Orc,
    Ori,
    Oris,
    Xor,
    Xori,
    Xoris,
    Nand,
    Nor,
    Eqv,
    Slw,
    Srw,
    Sraw,
    Srawi,
    Cntlzw,
    Extsb,
    Extsh,
    Rlwimi,
    Rlwinm,
    Rlwnm,
    // Compares
    Cmpw,
    Cmpwi,
    Cmplw,
    Cmplwi,
    // Branches
    B,
    Ba,
    Bl,
    Bla,
    Bc,
    Bdnz,
    Bdz,
    Beq,
    Bge,
    Bgt,
    Ble,
    Blt,
    Bne,
    Bns,
    Bso,
    Bclr,
    Bcctr,
    Blr,
    Blrl,
    Bctr,
    Bctrl,
    // Condition register logic
    Cror,
    Crxor,
    Mcrf,
    // Loads
    Lbz,
    Lbzu,
    Lbzx,
    Lha,
    Lhau,
    Lhax,
    Lhz,
    Lhzu,
    Lhzx,
    Lwz,
    Lwzu,
    Lwzx,
    Lwzux,
    Lhbrx,
    Lwbrx,
    Lwarx,
    Lmw,
    // Stores
    Stb,
    Stbu,
    Stbx,
    Sth,
    Sthu,
    Sthx,
    Stw,
    Stwu,
    Stwx,
    Stwux,
    Sthbrx,
    Stwbrx,
    StwcxRc,
    Stmw,
    // Special-purpose register moves
    Mflr,
    Mtlr,
    Mfctr,
    Mtctr,
    Mfcr,
    Mtcrf,
    Mfmsr,
    Mtmsr,
    // Scalar floating point
    Fabs,
    Fadd,
    Fadds,
    Fcmpu,
    Fctiw,
    Fctiwz,
    Fdiv,
    Fdivs,
    Fmadd,
    Fmadds,
    Fmr,
    Fmsub,
    Fmsubs,
    Fmul,
    Fmuls,
    Fnabs,
    Fneg,
    Fnmadd,
    Fnmadds,
    Fnmsub,
    Fnmsubs,
    Frsp,
    Fsel,
    Fsub,
    Fsubs,
    Lfd,
    Lfdx,
    Lfs,
    Lfsx,
    Stfd,
    Stfdx,
    Stfiwx,
    Stfs,
    Stfsx,
    // Paired singles (Gekko/Broadway/Espresso)
    PsAbs,
    PsAdd,
    PsDiv,
    PsMadd,
    PsMadds0,
    PsMadds1,
    PsMerge00,
    PsMerge01,
    PsMerge10,
    PsMerge11,
    PsMr,
    PsMsub,
    PsMul,
    PsMuls0,
    PsMuls1,
    PsNabs,
    PsNeg,
    PsNmadd,
    PsNmsub,
    PsRes,
    PsRsqrte,
    PsSel,
    PsSub,
    PsSum0,
    PsSum1,
    PsqL,
    PsqLu,
    PsqLx,
    PsqSt,
    PsqStu,
    PsqStx,
    // System
    Sc,
    Sync,
    Isync,
    Eieio,
    Dcbf,
    Dcbst,
    Dcbt,
    Dcbtst,
    Dcbz,
    Icbi,
    Tw,
    Twi,
    // Simplified aliases
    Li,
    Lis,
    Mr,
    Nop,
}

/// One row of the descriptor table.
#[derive(Debug)]
pub struct Opcode {
    pub name: &'static str,
    pub bits: u32,
    pub mask: u32,
    pub id: OpId,
}

macro_rules! op {
    ($name:literal, $bits:literal, $mask:literal, $id:ident) => {
        Opcode { name: $name, bits: $bits, mask: $mask, id: OpId::$id }
    };
}

/// The descriptor table. Order matters: first match wins.
pub static OPCODES: &[Opcode] = &[
    // Simplified mnemonics ahead of the encodings they alias.
    op!("nop", 0x6000_0000, 0xFFFF_FFFF, Nop),
    op!("li", 0x3800_0000, 0xFC1F_0000, Li),
    op!("lis", 0x3C00_0000, 0xFC1F_0000, Lis),
    op!("mr", 0x7C00_0378, 0xFC00_07FE, Mr), // verified rS == rB at decode
    op!("blr", 0x4E80_0020, 0xFFFF_FFFF, Blr),
    op!("blrl", 0x4E80_0021, 0xFFFF_FFFF, Blrl),
    op!("bctr", 0x4E80_0420, 0xFFFF_FFFF, Bctr),
    op!("bctrl", 0x4E80_0421, 0xFFFF_FFFF, Bctrl),
    op!("bdnz", 0x4200_0000, 0xFFE0_0003, Bdnz),
    op!("bdz", 0x4240_0000, 0xFFE0_0003, Bdz),
    op!("blt", 0x4180_0000, 0xFFE3_0003, Blt),
    op!("bgt", 0x4181_0000, 0xFFE3_0003, Bgt),
    op!("beq", 0x4182_0000, 0xFFE3_0003, Beq),
    op!("bso", 0x4183_0000, 0xFFE3_0003, Bso),
    op!("bge", 0x4080_0000, 0xFFE3_0003, Bge),
    op!("ble", 0x4081_0000, 0xFFE3_0003, Ble),
    op!("bne", 0x4082_0000, 0xFFE3_0003, Bne),
    op!("bns", 0x4083_0000, 0xFFE3_0003, Bns),
    // Branches, generic forms
    op!("b", 0x4800_0000, 0xFC00_0003, B),
    op!("bl", 0x4800_0001, 0xFC00_0003, Bl),
    op!("ba", 0x4800_0002, 0xFC00_0003, Ba),
    op!("bla", 0x4800_0003, 0xFC00_0003, Bla),
    op!("bc", 0x4000_0000, 0xFC00_0000, Bc),
    op!("bclr", 0x4C00_0020, 0xFC00_FFFE, Bclr),
    op!("bcctr", 0x4C00_0420, 0xFC00_FFFE, Bcctr),
    op!("cror", 0x4C00_0382, 0xFC00_07FF, Cror),
    op!("crxor", 0x4C00_0182, 0xFC00_07FF, Crxor),
    op!("mcrf", 0x4C00_0000, 0xFC63_FFFF, Mcrf),
    op!("isync", 0x4C00_012C, 0xFFFF_FFFF, Isync),
    op!("sc", 0x4400_0002, 0xFFFF_FFFF, Sc),
    // Integer immediates
    op!("twi", 0x0C00_0000, 0xFC00_0000, Twi),
    op!("mulli", 0x1C00_0000, 0xFC00_0000, Mulli),
    op!("subfic", 0x2000_0000, 0xFC00_0000, Subfic),
    op!("cmplwi", 0x2800_0000, 0xFC40_0000, Cmplwi),
    op!("cmpwi", 0x2C00_0000, 0xFC40_0000, Cmpwi),
    op!("addic", 0x3000_0000, 0xFC00_0000, Addic),
    op!("addic.", 0x3400_0000, 0xFC00_0000, AddicRc),
    op!("addi", 0x3800_0000, 0xFC00_0000, Addi),
    op!("addis", 0x3C00_0000, 0xFC00_0000, Addis),
    // Rotates; the Rc bit stays free so the record forms decode too
    op!("rlwimi", 0x5000_0000, 0xFC00_0000, Rlwimi),
    op!("rlwinm", 0x5400_0000, 0xFC00_0000, Rlwinm),
    op!("rlwnm", 0x5C00_0000, 0xFC00_0000, Rlwnm),
    // Logical immediates
    op!("ori", 0x6000_0000, 0xFC00_0000, Ori),
    op!("oris", 0x6400_0000, 0xFC00_0000, Oris),
    op!("xori", 0x6800_0000, 0xFC00_0000, Xori),
    op!("xoris", 0x6C00_0000, 0xFC00_0000, Xoris),
    op!("andi.", 0x7000_0000, 0xFC00_0000, AndiRc),
    op!("andis.", 0x7400_0000, 0xFC00_0000, AndisRc),
    // Primary op 31, extended opcode in bits 21-30
    op!("cmpw", 0x7C00_0000, 0xFC40_07FE, Cmpw),
    op!("tw", 0x7C00_0008, 0xFC00_07FE, Tw),
    op!("subfc", 0x7C00_0010, 0xFC00_07FE, Subfc),
    op!("mulhwu", 0x7C00_0016, 0xFC00_07FE, Mulhwu),
    op!("mfcr", 0x7C00_0026, 0xFC1F_FFFF, Mfcr),
    op!("lwarx", 0x7C00_0028, 0xFC00_07FE, Lwarx),
    op!("lwzx", 0x7C00_002E, 0xFC00_07FE, Lwzx),
    op!("slw", 0x7C00_0030, 0xFC00_07FE, Slw),
    op!("cntlzw", 0x7C00_0034, 0xFC00_FFFE, Cntlzw),
    op!("and", 0x7C00_0038, 0xFC00_07FE, And),
    op!("cmplw", 0x7C00_0040, 0xFC40_07FE, Cmplw),
    op!("subf", 0x7C00_0050, 0xFC00_07FE, Subf),
    op!("dcbst", 0x7C00_006C, 0xFFE0_07FE, Dcbst),
    op!("lwzux", 0x7C00_006E, 0xFC00_07FE, Lwzux),
    op!("andc", 0x7C00_0078, 0xFC00_07FE, Andc),
    op!("mulhw", 0x7C00_0096, 0xFC00_07FE, Mulhw),
    op!("mfmsr", 0x7C00_00A6, 0xFC1F_FFFF, Mfmsr),
    op!("dcbf", 0x7C00_00AC, 0xFFE0_07FE, Dcbf),
    op!("lbzx", 0x7C00_00AE, 0xFC00_07FE, Lbzx),
    op!("neg", 0x7C00_00D0, 0xFC00_FFFE, Neg),
    op!("nor", 0x7C00_00F8, 0xFC00_07FE, Nor),
    op!("subfe", 0x7C00_0110, 0xFC00_07FE, Subfe),
    op!("adde", 0x7C00_0114, 0xFC00_07FE, Adde),
    op!("mtcrf", 0x7C00_0120, 0xFC10_0FFF, Mtcrf),
    op!("mtmsr", 0x7C00_0124, 0xFC1F_FFFF, Mtmsr),
    op!("stwcx.", 0x7C00_012D, 0xFC00_07FF, StwcxRc),
    op!("stwx", 0x7C00_012E, 0xFC00_07FE, Stwx),
    op!("stwux", 0x7C00_016E, 0xFC00_07FE, Stwux),
    op!("addze", 0x7C00_0194, 0xFC00_FFFE, Addze),
    op!("stbx", 0x7C00_01AE, 0xFC00_07FE, Stbx),
    op!("addc", 0x7C00_0014, 0xFC00_07FE, Addc),
    op!("mullw", 0x7C00_01D6, 0xFC00_07FE, Mullw),
    op!("dcbtst", 0x7C00_01EC, 0xFFE0_07FE, Dcbtst),
    op!("add", 0x7C00_0214, 0xFC00_07FE, Add),
    op!("dcbt", 0x7C00_022C, 0xFFE0_07FE, Dcbt),
    op!("lhzx", 0x7C00_022E, 0xFC00_07FE, Lhzx),
    op!("eqv", 0x7C00_0238, 0xFC00_07FE, Eqv),
    op!("xor", 0x7C00_0278, 0xFC00_07FE, Xor),
    op!("mflr", 0x7C08_02A6, 0xFC1F_FFFF, Mflr),
    op!("mfctr", 0x7C09_02A6, 0xFC1F_FFFF, Mfctr),
    op!("lhax", 0x7C00_02AE, 0xFC00_07FE, Lhax),
    op!("sthx", 0x7C00_032E, 0xFC00_07FE, Sthx),
    op!("orc", 0x7C00_0338, 0xFC00_07FE, Orc),
    op!("or", 0x7C00_0378, 0xFC00_07FE, Or),
    op!("divwu", 0x7C00_0396, 0xFC00_07FE, Divwu),
    op!("mtlr", 0x7C08_03A6, 0xFC1F_FFFF, Mtlr),
    op!("mtctr", 0x7C09_03A6, 0xFC1F_FFFF, Mtctr),
    op!("nand", 0x7C00_03B8, 0xFC00_07FE, Nand),
    op!("divw", 0x7C00_03D6, 0xFC00_07FE, Divw),
    op!("srw", 0x7C00_0430, 0xFC00_07FE, Srw),
    op!("lwbrx", 0x7C00_042C, 0xFC00_07FE, Lwbrx),
    op!("lfsx", 0x7C00_042E, 0xFC00_07FE, Lfsx),
    op!("sync", 0x7C00_04AC, 0xFFFF_FFFF, Sync),
    op!("lfdx", 0x7C00_04AE, 0xFC00_07FE, Lfdx),
    op!("stwbrx", 0x7C00_052C, 0xFC00_07FE, Stwbrx),
    op!("stfsx", 0x7C00_052E, 0xFC00_07FE, Stfsx),
    op!("stfdx", 0x7C00_05AE, 0xFC00_07FE, Stfdx),
    op!("lhbrx", 0x7C00_062C, 0xFC00_07FE, Lhbrx),
    op!("sraw", 0x7C00_0630, 0xFC00_07FE, Sraw),
    op!("srawi", 0x7C00_0670, 0xFC00_07FE, Srawi),
    op!("eieio", 0x7C00_06AC, 0xFFFF_FFFF, Eieio),
    op!("sthbrx", 0x7C00_072C, 0xFC00_07FE, Sthbrx),
    op!("extsh", 0x7C00_0734, 0xFC00_FFFE, Extsh),
    op!("extsb", 0x7C00_0774, 0xFC00_FFFE, Extsb),
    op!("icbi", 0x7C00_07AC, 0xFFE0_07FE, Icbi),
    op!("stfiwx", 0x7C00_07AE, 0xFC00_07FE, Stfiwx),
    op!("dcbz", 0x7C00_07EC, 0xFFE0_07FE, Dcbz),
    // Displacement loads and stores
    op!("lwz", 0x8000_0000, 0xFC00_0000, Lwz),
    op!("lwzu", 0x8400_0000, 0xFC00_0000, Lwzu),
    op!("lbz", 0x8800_0000, 0xFC00_0000, Lbz),
    op!("lbzu", 0x8C00_0000, 0xFC00_0000, Lbzu),
    op!("stw", 0x9000_0000, 0xFC00_0000, Stw),
    op!("stwu", 0x9400_0000, 0xFC00_0000, Stwu),
    op!("stb", 0x9800_0000, 0xFC00_0000, Stb),
    op!("stbu", 0x9C00_0000, 0xFC00_0000, Stbu),
    op!("lhz", 0xA000_0000, 0xFC00_0000, Lhz),
    op!("lhzu", 0xA400_0000, 0xFC00_0000, Lhzu),
    op!("lha", 0xA800_0000, 0xFC00_0000, Lha),
    op!("lhau", 0xAC00_0000, 0xFC00_0000, Lhau),
    op!("sth", 0xB000_0000, 0xFC00_0000, Sth),
    op!("sthu", 0xB400_0000, 0xFC00_0000, Sthu),
    op!("lmw", 0xB800_0000, 0xFC00_0000, Lmw),
    op!("stmw", 0xBC00_0000, 0xFC00_0000, Stmw),
    op!("lfs", 0xC000_0000, 0xFC00_0000, Lfs),
    op!("lfd", 0xC800_0000, 0xFC00_0000, Lfd),
    op!("stfs", 0xD000_0000, 0xFC00_0000, Stfs),
    op!("stfd", 0xD800_0000, 0xFC00_0000, Stfd),
    // Quantized paired-single loads and stores
    op!("psq_l", 0xE000_0000, 0xFC00_0000, PsqL),
    op!("psq_lu", 0xE400_0000, 0xFC00_0000, PsqLu),
    op!("psq_st", 0xF000_0000, 0xFC00_0000, PsqSt),
    op!("psq_stu", 0xF400_0000, 0xFC00_0000, PsqStu),
    // Paired-single arithmetic, primary op 4
    op!("psq_lx", 0x1000_000C, 0xFC00_007E, PsqLx),
    op!("psq_stx", 0x1000_000E, 0xFC00_007E, PsqStx),
    op!("ps_sum0", 0x1000_0014, 0xFC00_003E, PsSum0),
    op!("ps_sum1", 0x1000_0016, 0xFC00_003E, PsSum1),
    op!("ps_muls0", 0x1000_0018, 0xFC00_F83E, PsMuls0),
    op!("ps_muls1", 0x1000_001A, 0xFC00_F83E, PsMuls1),
    op!("ps_madds0", 0x1000_001C, 0xFC00_003E, PsMadds0),
    op!("ps_madds1", 0x1000_001E, 0xFC00_003E, PsMadds1),
    op!("ps_div", 0x1000_0024, 0xFC00_07FE, PsDiv),
    op!("ps_sub", 0x1000_0028, 0xFC00_07FE, PsSub),
    op!("ps_add", 0x1000_002A, 0xFC00_07FE, PsAdd),
    op!("ps_sel", 0x1000_002E, 0xFC00_003E, PsSel),
    op!("ps_res", 0x1000_0030, 0xFC1F_F83E, PsRes),
    op!("ps_mul", 0x1000_0032, 0xFC00_F83E, PsMul),
    op!("ps_rsqrte", 0x1000_0034, 0xFC1F_F83E, PsRsqrte),
    op!("ps_msub", 0x1000_0038, 0xFC00_003E, PsMsub),
    op!("ps_madd", 0x1000_003A, 0xFC00_003E, PsMadd),
    op!("ps_nmsub", 0x1000_003C, 0xFC00_003E, PsNmsub),
    op!("ps_nmadd", 0x1000_003E, 0xFC00_003E, PsNmadd),
    op!("ps_neg", 0x1000_0050, 0xFC1F_07FE, PsNeg),
    op!("ps_mr", 0x1000_0090, 0xFC1F_07FE, PsMr),
    op!("ps_nabs", 0x1000_0110, 0xFC1F_07FE, PsNabs),
    op!("ps_abs", 0x1000_0210, 0xFC1F_07FE, PsAbs),
    op!("ps_merge00", 0x1000_0420, 0xFC00_07FE, PsMerge00),
    op!("ps_merge01", 0x1000_0460, 0xFC00_07FE, PsMerge01),
    op!("ps_merge10", 0x1000_04A0, 0xFC00_07FE, PsMerge10),
    op!("ps_merge11", 0x1000_04E0, 0xFC00_07FE, PsMerge11),
    // Single-precision scalar FP, primary op 59
    op!("fdivs", 0xEC00_0024, 0xFC00_07FE, Fdivs),
    op!("fsubs", 0xEC00_0028, 0xFC00_07FE, Fsubs),
    op!("fadds", 0xEC00_002A, 0xFC00_07FE, Fadds),
    op!("fmuls", 0xEC00_0032, 0xFC00_F83E, Fmuls),
    op!("fmsubs", 0xEC00_0038, 0xFC00_003E, Fmsubs),
    op!("fmadds", 0xEC00_003A, 0xFC00_003E, Fmadds),
    op!("fnmsubs", 0xEC00_003C, 0xFC00_003E, Fnmsubs),
    op!("fnmadds", 0xEC00_003E, 0xFC00_003E, Fnmadds),
    // Double-precision scalar FP, primary op 63
    op!("fcmpu", 0xFC00_0000, 0xFC60_07FE, Fcmpu),
    op!("frsp", 0xFC00_0018, 0xFC1F_07FE, Frsp),
    op!("fctiw", 0xFC00_001C, 0xFC1F_07FE, Fctiw),
    op!("fctiwz", 0xFC00_001E, 0xFC1F_07FE, Fctiwz),
    op!("fdiv", 0xFC00_0024, 0xFC00_07FE, Fdiv),
    op!("fsub", 0xFC00_0028, 0xFC00_07FE, Fsub),
    op!("fadd", 0xFC00_002A, 0xFC00_07FE, Fadd),
    op!("fsel", 0xFC00_002E, 0xFC00_003E, Fsel),
    op!("fmul", 0xFC00_0032, 0xFC00_F83E, Fmul),
    op!("fmsub", 0xFC00_0038, 0xFC00_003E, Fmsub),
    op!("fmadd", 0xFC00_003A, 0xFC00_003E, Fmadd),
    op!("fnmsub", 0xFC00_003C, 0xFC00_003E, Fnmsub),
    op!("fnmadd", 0xFC00_003E, 0xFC00_003E, Fnmadd),
    op!("fneg", 0xFC00_0050, 0xFC1F_07FE, Fneg),
    op!("fmr", 0xFC00_0090, 0xFC1F_07FE, Fmr),
    op!("fnabs", 0xFC00_0110, 0xFC1F_07FE, Fnabs),
    op!("fabs", 0xFC00_0210, 0xFC1F_07FE, Fabs),
];

/// Find the first descriptor matching `word`, if any.
pub fn lookup(word: u32) -> Option<&'static Opcode> {
    OPCODES.iter().find(|op| (word & op.mask) == op.bits)
}

impl OpId {
    /// Any instruction that redirects control flow.
    pub fn is_branch(self) -> bool {
        self.is_conditional_branch()
            || matches!(
                self,
                OpId::B
                    | OpId::Ba
                    | OpId::Bl
                    | OpId::Bla
                    | OpId::Blr
                    | OpId::Blrl
                    | OpId::Bctr
                    | OpId::Bctrl
            )
    }

    pub fn is_conditional_branch(self) -> bool {
        matches!(
            self,
            OpId::Bc
                | OpId::Bdnz
                | OpId::Bdz
                | OpId::Beq
                | OpId::Bge
                | OpId::Bgt
                | OpId::Ble
                | OpId::Blt
                | OpId::Bne
                | OpId::Bns
                | OpId::Bso
                | OpId::Bclr
                | OpId::Bcctr
        )
    }

    pub fn is_unconditional_branch(self) -> bool {
        self.is_branch() && !self.is_conditional_branch()
    }

    pub fn is_load(self) -> bool {
        matches!(
            self,
            OpId::Lbz
                | OpId::Lbzu
                | OpId::Lbzx
                | OpId::Lha
                | OpId::Lhau
                | OpId::Lhax
                | OpId::Lhz
                | OpId::Lhzu
                | OpId::Lhzx
                | OpId::Lwz
                | OpId::Lwzu
                | OpId::Lwzx
                | OpId::Lwzux
                | OpId::Lhbrx
                | OpId::Lwbrx
                | OpId::Lwarx
                | OpId::Lmw
                | OpId::Lfd
                | OpId::Lfdx
                | OpId::Lfs
                | OpId::Lfsx
                | OpId::PsqL
                | OpId::PsqLu
                | OpId::PsqLx
        )
    }

    pub fn is_store(self) -> bool {
        matches!(
            self,
            OpId::Stb
                | OpId::Stbu
                | OpId::Stbx
                | OpId::Sth
                | OpId::Sthu
                | OpId::Sthx
                | OpId::Stw
                | OpId::Stwu
                | OpId::Stwx
                | OpId::Stwux
                | OpId::Sthbrx
                | OpId::Stwbrx
                | OpId::StwcxRc
                | OpId::Stmw
                | OpId::Stfd
                | OpId::Stfdx
                | OpId::Stfiwx
                | OpId::Stfs
                | OpId::Stfsx
                | OpId::PsqSt
                | OpId::PsqStu
                | OpId::PsqStx
        )
    }

    pub fn is_floating_point(self) -> bool {
        matches!(
            self,
            OpId::Fabs
                | OpId::Fadd
                | OpId::Fadds
                | OpId::Fcmpu
                | OpId::Fctiw
                | OpId::Fctiwz
                | OpId::Fdiv
                | OpId::Fdivs
                | OpId::Fmadd
                | OpId::Fmadds
                | OpId::Fmr
                | OpId::Fmsub
                | OpId::Fmsubs
                | OpId::Fmul
                | OpId::Fmuls
                | OpId::Fnabs
                | OpId::Fneg
                | OpId::Fnmadd
                | OpId::Fnmadds
                | OpId::Fnmsub
                | OpId::Fnmsubs
                | OpId::Frsp
                | OpId::Fsel
                | OpId::Fsub
                | OpId::Fsubs
                | OpId::Lfd
                | OpId::Lfdx
                | OpId::Lfs
                | OpId::Lfsx
                | OpId::Stfd
                | OpId::Stfdx
                | OpId::Stfiwx
                | OpId::Stfs
                | OpId::Stfsx
        )
    }

    pub fn is_paired_single(self) -> bool {
        matches!(
            self,
            OpId::PsAbs
                | OpId::PsAdd
                | OpId::PsDiv
                | OpId::PsMadd
                | OpId::PsMadds0
                | OpId::PsMadds1
                | OpId::PsMerge00
                | OpId::PsMerge01
                | OpId::PsMerge10
                | OpId::PsMerge11
                | OpId::PsMr
                | OpId::PsMsub
                | OpId::PsMul
                | OpId::PsMuls0
                | OpId::PsMuls1
                | OpId::PsNabs
                | OpId::PsNeg
                | OpId::PsNmadd
                | OpId::PsNmsub
                | OpId::PsRes
                | OpId::PsRsqrte
                | OpId::PsSel
                | OpId::PsSub
                | OpId::PsSum0
                | OpId::PsSum1
                | OpId::PsqL
                | OpId::PsqLu
                | OpId::PsqLx
                | OpId::PsqSt
                | OpId::PsqStu
                | OpId::PsqStx
        )
    }

    pub fn is_privileged(self) -> bool {
        matches!(self, OpId::Mfmsr | OpId::Mtmsr | OpId::Sc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_masks_are_consistent() {
        // A descriptor whose fixed bits fall outside its mask can never match.
        for op in OPCODES {
            assert_eq!(op.bits & op.mask, op.bits, "{} has bits outside mask", op.name);
        }
    }

    #[test]
    fn table_roundtrip() {
        // Every descriptor's own bit pattern must resolve to a descriptor
        // with the same semantics (an alias earlier in the table is fine).
        for op in OPCODES {
            let found = lookup(op.bits).expect(op.name);
            assert_eq!(found.bits & op.mask, op.bits, "{} resolved to {}", op.name, found.name);
        }
    }

    #[test]
    fn simplified_aliases_win() {
        assert_eq!(lookup(0x6000_0000).unwrap().id, OpId::Nop);
        assert_eq!(lookup(0x3860_0001).unwrap().id, OpId::Li); // li r3, 1
        assert_eq!(lookup(0x3C60_1234).unwrap().id, OpId::Lis); // lis r3, 0x1234
        assert_eq!(lookup(0x4E80_0020).unwrap().id, OpId::Blr);
        assert_eq!(lookup(0x4E80_0420).unwrap().id, OpId::Bctr);
        // addi r3, r4, 1 is not li
        assert_eq!(lookup(0x3864_0001).unwrap().id, OpId::Addi);
    }

    #[test]
    fn conditional_branch_aliases() {
        // bgt cr6, +8 -> BO=12, BI=25
        let word = 0x4199_0008;
        assert_eq!(lookup(word).unwrap().id, OpId::Bgt);
        // ble cr0, +8 -> BO=4, BI=1
        assert_eq!(lookup(0x4081_0008).unwrap().id, OpId::Ble);
        // bne with hint bit set falls back to generic bc
        assert_eq!(lookup(0x40E2_0008).unwrap().id, OpId::Bc);
    }

    #[test]
    fn classification() {
        assert!(OpId::Bc.is_conditional_branch());
        assert!(OpId::Blr.is_unconditional_branch());
        assert!(!OpId::Bl.is_conditional_branch());
        assert!(OpId::Lwz.is_load());
        assert!(OpId::PsqSt.is_store());
        assert!(OpId::PsqSt.is_paired_single());
        assert!(OpId::Fmadds.is_floating_point());
        assert!(OpId::Mtmsr.is_privileged());
        assert!(!OpId::Add.is_branch());
    }
}
