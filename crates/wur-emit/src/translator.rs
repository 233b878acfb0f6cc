//! Per-instruction translation to C++.
//!
//! Each function becomes one `PPC_FUNC_IMPL` body. The body is emitted into
//! a temporary buffer first; local declarations discovered along the way
//! are prepended when the buffer is flushed.

use std::fmt::Write;

use rustc_hash::FxHashSet;
use tracing::warn;
use wur_cfg::Function;
use wur_ppc::{decode, ppc_aa, ppc_bd, ppc_bi, ppc_bo, ppc_li, ppc_lk, ppc_op, Instr, OpId};
use wur_ppc::{OP_B, OP_BC};
use wur_rpx::{synthetic_name, RpxImage, SymbolKind};

use crate::config::{MidAsmHook, RecompilerConfig, SwitchEntry};
use crate::locals::LocalSet;

/// Floating-point mode the emitted code last established. Joining control
/// flow invalidates it, so labels reset to `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FpState {
    Unknown,
    Fpu,
    PairedSingle,
}

/// Result of translating one function.
#[derive(Debug)]
pub struct TranslatedFunction {
    pub code: String,
    /// False when any word failed to translate.
    pub complete: bool,
}

/// Translates discovered functions against one image and configuration.
pub struct Translator<'a> {
    image: &'a RpxImage,
    config: &'a RecompilerConfig,
}

impl<'a> Translator<'a> {
    pub fn new(image: &'a RpxImage, config: &'a RecompilerConfig) -> Self {
        Self { image, config }
    }

    /// Translate `fn_`, or `None` when its bytes are not in the image.
    pub fn translate(&self, fn_: &Function) -> Option<TranslatedFunction> {
        let bytes = self.image.find(fn_.base)?;
        if bytes.len() < fn_.size as usize {
            return None;
        }
        let code = &bytes[..fn_.size as usize];

        let name = match self.image.symbols.get(fn_.base) {
            Some(symbol) => symbol.name.clone(),
            None => synthetic_name(fn_.base),
        };

        let mut emitter = FnEmitter {
            image: self.image,
            config: self.config,
            fn_,
            labels: collect_labels(fn_, code, self.config),
            out: String::new(),
            locals: LocalSet::default(),
            fp_state: FpState::Unknown,
            current_switch: None,
            complete: true,
        };
        emitter.emit_body(code);

        let mut out = String::new();
        writeln!(out, "PPC_FUNC_IMPL(__imp__{name}) {{").unwrap();
        out.push_str("\tPPC_FUNC_PROLOGUE();\n");
        out.push_str(&emitter.locals.declarations());
        out.push_str(&emitter.out);
        out.push_str("}\n\n");
        writeln!(out, "PPC_WEAK_FUNC({name}) {{").unwrap();
        writeln!(out, "\t__imp__{name}(ctx, base);").unwrap();
        out.push_str("}\n\n");

        Some(TranslatedFunction { code: out, complete: emitter.complete })
    }
}

/// First pass: every address the body needs a `loc_` label for.
fn collect_labels(fn_: &Function, code: &[u8], config: &RecompilerConfig) -> FxHashSet<u32> {
    let mut labels = FxHashSet::default();

    for offset in (0..fn_.size).step_by(4) {
        let addr = fn_.base + offset;
        let word = read_word(code, offset as usize);

        if !ppc_lk(word) {
            match ppc_op(word) {
                OP_B => {
                    labels.insert(branch_target(word, addr, ppc_li(word)));
                }
                OP_BC => {
                    labels.insert(branch_target(word, addr, ppc_bd(word)));
                }
                _ => {}
            }
        }

        if let Some(table) = config.switch_tables.get(&addr) {
            labels.extend(table.labels.iter().copied());
            labels.insert(table.default_target);
        }

        if let Some(hook) = config.midasm_hooks.get(&addr) {
            for target in [hook.jump_address, hook.jump_address_on_true, hook.jump_address_on_false]
            {
                if target != 0 {
                    labels.insert(target);
                }
            }
        }
    }

    labels
}

fn branch_target(word: u32, addr: u32, displacement: i32) -> u32 {
    if ppc_aa(word) {
        displacement as u32 & !3
    } else {
        addr.wrapping_add_signed(displacement)
    }
}

#[inline]
fn read_word(code: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([code[offset], code[offset + 1], code[offset + 2], code[offset + 3]])
}

fn label(addr: u32) -> String {
    format!("loc_{addr:08X}")
}

struct FnEmitter<'a> {
    image: &'a RpxImage,
    config: &'a RecompilerConfig,
    fn_: &'a Function,
    labels: FxHashSet<u32>,
    out: String,
    locals: LocalSet,
    fp_state: FpState,
    current_switch: Option<&'a SwitchEntry>,
    complete: bool,
}

impl FnEmitter<'_> {
    fn line(&mut self, text: impl AsRef<str>) {
        self.out.push('\t');
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn emit_body(&mut self, code: &[u8]) {
        let base = self.fn_.base;
        let end = base + self.fn_.size;

        for addr in (base..end).step_by(4) {
            if self.labels.contains(&addr) {
                writeln!(self.out, "{}:", label(addr)).unwrap();
                self.fp_state = FpState::Unknown;
            }

            let word = read_word(code, (addr - base) as usize);
            let ins = decode(word, addr);

            let hook = self.config.midasm_hooks.get(&addr);
            if let Some(hook) = hook.filter(|h| !h.after_instruction) {
                self.emit_hook(hook);
            }

            if self.current_switch.is_none() {
                self.current_switch = self.config.switch_tables.get(&addr);
            }

            match ins.opcode {
                None => {
                    self.line(format!("// INVALID INSTRUCTION: 0x{word:08X}"));
                    if !self.config.treat_unknown_instructions_as_nop {
                        self.complete = false;
                    }
                }
                Some(op) => {
                    self.line(format!("// {ins}"));
                    if !self.emit_instr(&ins) {
                        warn!(
                            address = format_args!("{addr:#010X}"),
                            mnemonic = op.name,
                            "unimplemented instruction"
                        );
                        self.complete = false;
                    }
                }
            }

            if let Some(hook) = hook.filter(|h| h.after_instruction) {
                self.emit_hook(hook);
            }
        }
    }

    // ===== register naming =====

    fn gpr(&mut self, index: u32) -> String {
        let index = index as usize;
        let local = (self.config.non_argument_as_local && matches!(index, 0 | 2 | 11 | 12))
            || (self.config.non_volatile_as_local && index >= 14);
        if local {
            self.locals.r[index] = true;
            format!("r{index}")
        } else {
            format!("ctx.r[{index}]")
        }
    }

    fn fpr(&mut self, index: u32) -> String {
        let index = index as usize;
        if self.config.non_volatile_as_local && index >= 14 {
            self.locals.f[index] = true;
            format!("f{index}")
        } else {
            format!("ctx.f[{index}]")
        }
    }

    fn cr(&mut self, index: u32) -> String {
        let index = index as usize;
        if self.config.cr_as_local {
            self.locals.cr[index] = true;
            format!("cr{index}")
        } else {
            format!("ctx.cr[{index}]")
        }
    }

    fn ctr(&mut self) -> String {
        if self.config.ctr_as_local {
            self.locals.ctr = true;
            "ctr".into()
        } else {
            "ctx.ctr".into()
        }
    }

    fn xer(&mut self) -> String {
        if self.config.xer_as_local {
            self.locals.xer = true;
            "xer".into()
        } else {
            "ctx.xer".into()
        }
    }

    fn reserved(&mut self) -> String {
        if self.config.reserved_as_local {
            self.locals.reserved = true;
            "reserved".into()
        } else {
            "ctx.reserved".into()
        }
    }

    fn temp(&mut self) -> String {
        self.locals.temp = true;
        "temp".into()
    }

    fn ea(&mut self) -> String {
        self.locals.ea = true;
        "ea".into()
    }

    fn ps_temp(&mut self) -> String {
        self.locals.ps_temp = true;
        "ps_temp".into()
    }

    /// Condition register bit name for a BI field value.
    fn cr_bit(&mut self, bi: u32) -> String {
        let field = self.cr(bi >> 2);
        let bit = ["lt", "gt", "eq", "so"][(bi & 3) as usize];
        format!("{field}.{bit}")
    }

    /// Effective address of a displacement-form access. An rA of zero means
    /// the displacement alone.
    fn ea_disp(&mut self, ra: u32, disp: i32) -> String {
        if ra == 0 {
            format!("0x{:X}", disp as u32)
        } else {
            format!("{}.u32 + {}", self.gpr(ra), disp)
        }
    }

    fn ea_indexed(&mut self, ra: u32, rb: u32) -> String {
        if ra == 0 {
            format!("{}.u32", self.gpr(rb))
        } else {
            format!("{}.u32 + {}.u32", self.gpr(ra), self.gpr(rb))
        }
    }

    // ===== floating point mode =====

    fn set_fp_state(&mut self, state: FpState) {
        if self.fp_state == state {
            return;
        }
        let was_unknown = self.fp_state == FpState::Unknown;
        match state {
            FpState::Fpu => {
                if was_unknown {
                    self.line("ctx.fpscr.disableFlushModeUnconditional();");
                } else {
                    self.line("ctx.fpscr.disableFlushMode();");
                }
            }
            FpState::PairedSingle => {
                if was_unknown {
                    self.line("ctx.fpscr.enableFlushModeUnconditional();");
                } else {
                    self.line("ctx.fpscr.enableFlushMode();");
                }
            }
            FpState::Unknown => {}
        }
        self.fp_state = state;
    }

    // ===== calls and branches =====

    /// A call statement for `target`: direct when the symbol is known,
    /// otherwise through the mapping table.
    fn call_stmt(&self, target: u32) -> String {
        match self.image.symbols.get(target).filter(|s| s.kind == SymbolKind::Function) {
            Some(symbol) => format!("{}(ctx, base);", symbol.name),
            None => format!("if (PPCFunc fn = PPCFindFunc(0x{target:X})) fn(ctx, base);"),
        }
    }

    fn emit_call(&mut self, target: u32) {
        let stmt = self.call_stmt(target);
        self.line(stmt);
    }

    /// Statements establishing the branch condition, and the condition
    /// expression itself. `None` means the branch is unconditional.
    fn branch_condition(&mut self, bo: u32, bi: u32) -> Option<String> {
        let mut parts = Vec::new();
        if bo & 0x4 == 0 {
            let ctr = self.ctr();
            self.line(format!("--{ctr}.u64;"));
            let cmp = if bo & 0x2 != 0 { "==" } else { "!=" };
            parts.push(format!("{ctr}.u32 {cmp} 0"));
        }
        if bo & 0x10 == 0 {
            let bit = self.cr_bit(bi);
            if bo & 0x8 != 0 {
                parts.push(bit);
            } else {
                parts.push(format!("!{bit}"));
            }
        }
        match parts.len() {
            0 => None,
            1 => Some(parts.remove(0)),
            _ => Some(parts.join(" && ")),
        }
    }

    /// Lower a branch (with optional condition) to `goto`, or to a call
    /// plus return when the target leaves the function.
    fn emit_branch(&mut self, condition: Option<String>, target: u32) {
        let internal = self.fn_.contains(target);
        match (condition, internal) {
            (None, true) => self.line(format!("goto {};", label(target))),
            (None, false) => {
                self.emit_call(target);
                self.line("return;");
            }
            (Some(cond), true) => self.line(format!("if ({cond}) goto {};", label(target))),
            (Some(cond), false) => {
                self.line(format!("if ({cond}) {{"));
                let stmt = self.call_stmt(target);
                self.line(format!("\t{stmt}"));
                self.line("\treturn;");
                self.line("}");
            }
        }
    }

    // ===== hooks =====

    fn hook_argument(&mut self, register: &str) -> String {
        let name = register.trim();
        if let Some(rest) = name.strip_prefix('r') {
            if let Ok(index) = rest.parse::<u32>() {
                return self.gpr(index);
            }
        }
        if let Some(rest) = name.strip_prefix('f') {
            if let Ok(index) = rest.parse::<u32>() {
                return self.fpr(index);
            }
        }
        if let Some(rest) = name.strip_prefix("cr") {
            if let Ok(index) = rest.parse::<u32>() {
                return self.cr(index);
            }
        }
        match name {
            "ctr" => self.ctr(),
            "xer" => self.xer(),
            "lr" => "ctx.lr".into(),
            "msr" => "ctx.msr".into(),
            "fpscr" => "ctx.fpscr".into(),
            "reserved" => self.reserved(),
            _ => {
                warn!(register = name, "unknown register in mid-asm hook");
                "ctx".into()
            }
        }
    }

    fn emit_hook(&mut self, hook: &MidAsmHook) {
        let args: Vec<String> =
            hook.registers.iter().map(|r| self.hook_argument(r)).collect();
        let call = format!("{}({})", hook.name, args.join(", "));

        let conditional = hook.return_on_true
            || hook.return_on_false
            || hook.jump_address_on_true != 0
            || hook.jump_address_on_false != 0;
        if conditional {
            if hook.return_on_true {
                self.line(format!("if ({call}) return;"));
            } else if hook.jump_address_on_true != 0 {
                self.line(format!("if ({call}) goto {};", label(hook.jump_address_on_true)));
            } else if hook.return_on_false {
                self.line(format!("if (!{call}) return;"));
            } else {
                self.line(format!("if (!{call}) goto {};", label(hook.jump_address_on_false)));
            }
        } else {
            self.line(format!("{call};"));
            if hook.ret {
                self.line("return;");
            } else if hook.jump_address != 0 {
                self.line(format!("goto {};", label(hook.jump_address)));
            }
        }
    }

    // ===== instruction dispatch =====

    /// Emit the statements for one decoded instruction. Returns false when
    /// the opcode has no lowering; a trap is emitted in that case.
    fn emit_instr(&mut self, ins: &Instr) -> bool {
        use OpId::*;
        let id = ins.opcode.expect("decoded").id;
        match id {
            Add => {
                let (d, a, b) = (self.gpr(ins.rd()), self.gpr(ins.ra()), self.gpr(ins.rb()));
                self.line(format!("{d}.u64 = {a}.u64 + {b}.u64;"));
                self.rc_cr0(ins, &d);
            }
            Addc => {
                let (d, a, b) = (self.gpr(ins.rd()), self.gpr(ins.ra()), self.gpr(ins.rb()));
                let xer = self.xer();
                self.line(format!("{xer}.ca = {a}.u32 + {b}.u32 < {a}.u32;"));
                self.line(format!("{d}.u64 = {a}.u64 + {b}.u64;"));
                self.rc_cr0(ins, &d);
            }
            Adde => {
                let (d, a, b) = (self.gpr(ins.rd()), self.gpr(ins.ra()), self.gpr(ins.rb()));
                let (xer, temp) = (self.xer(), self.temp());
                self.line(format!(
                    "{temp}.u8 = ({a}.u32 + {b}.u32 < {a}.u32) | ({a}.u32 + {b}.u32 + {xer}.ca < {xer}.ca);"
                ));
                self.line(format!("{d}.u64 = {a}.u64 + {b}.u64 + {xer}.ca;"));
                self.line(format!("{xer}.ca = {temp}.u8;"));
                self.rc_cr0(ins, &d);
            }
            Addze => {
                let (d, a) = (self.gpr(ins.rd()), self.gpr(ins.ra()));
                let (xer, temp) = (self.xer(), self.temp());
                self.line(format!("{temp}.u8 = {a}.u32 + {xer}.ca < {a}.u32;"));
                self.line(format!("{d}.u64 = {a}.u64 + {xer}.ca;"));
                self.line(format!("{xer}.ca = {temp}.u8;"));
                self.rc_cr0(ins, &d);
            }
            Addi => {
                let (d, a) = (self.gpr(ins.rd()), self.gpr(ins.ra()));
                self.line(format!("{d}.s64 = {a}.s64 + {};", ins.simm()));
            }
            Addic | AddicRc => {
                let (d, a) = (self.gpr(ins.rd()), self.gpr(ins.ra()));
                let xer = self.xer();
                self.line(format!("{xer}.ca = {a}.u32 > 0x{:X};", !(ins.simm() as u32)));
                self.line(format!("{d}.s64 = {a}.s64 + {};", ins.simm()));
                if id == AddicRc {
                    let cr0 = self.cr(0);
                    self.line(format!("{cr0}.compare<int32_t>({d}.s32, 0);"));
                }
            }
            Addis => {
                let (d, a) = (self.gpr(ins.rd()), self.gpr(ins.ra()));
                self.line(format!("{d}.s64 = {a}.s64 + {};", (ins.simm() as i64) << 16));
            }
            Subf => {
                let (d, a, b) = (self.gpr(ins.rd()), self.gpr(ins.ra()), self.gpr(ins.rb()));
                self.line(format!("{d}.s64 = {b}.s64 - {a}.s64;"));
                self.rc_cr0(ins, &d);
            }
            Subfc => {
                let (d, a, b) = (self.gpr(ins.rd()), self.gpr(ins.ra()), self.gpr(ins.rb()));
                let xer = self.xer();
                self.line(format!("{xer}.ca = {b}.u32 >= {a}.u32;"));
                self.line(format!("{d}.s64 = {b}.s64 - {a}.s64;"));
                self.rc_cr0(ins, &d);
            }
            Subfe => {
                let (d, a, b) = (self.gpr(ins.rd()), self.gpr(ins.ra()), self.gpr(ins.rb()));
                let (xer, temp) = (self.xer(), self.temp());
                self.line(format!(
                    "{temp}.u8 = (~{a}.u32 + {b}.u32 < ~{a}.u32) | (~{a}.u32 + {b}.u32 + {xer}.ca < {xer}.ca);"
                ));
                self.line(format!("{d}.u64 = ~{a}.u64 + {b}.u64 + {xer}.ca;"));
                self.line(format!("{xer}.ca = {temp}.u8;"));
                self.rc_cr0(ins, &d);
            }
            Subfic => {
                let (d, a) = (self.gpr(ins.rd()), self.gpr(ins.ra()));
                let xer = self.xer();
                self.line(format!("{xer}.ca = 0x{:X} >= {a}.u32;", ins.simm() as u32));
                self.line(format!("{d}.s64 = {} - {a}.s64;", ins.simm()));
            }
            Neg => {
                let (d, a) = (self.gpr(ins.rd()), self.gpr(ins.ra()));
                self.line(format!("{d}.s64 = -{a}.s64;"));
                self.rc_cr0(ins, &d);
            }
            Mulli => {
                let (d, a) = (self.gpr(ins.rd()), self.gpr(ins.ra()));
                self.line(format!("{d}.s64 = {a}.s64 * {};", ins.simm()));
            }
            Mullw => {
                let (d, a, b) = (self.gpr(ins.rd()), self.gpr(ins.ra()), self.gpr(ins.rb()));
                self.line(format!("{d}.s64 = int64_t({a}.s32) * int64_t({b}.s32);"));
                self.rc_cr0(ins, &d);
            }
            Mulhw => {
                let (d, a, b) = (self.gpr(ins.rd()), self.gpr(ins.ra()), self.gpr(ins.rb()));
                self.line(format!("{d}.s64 = (int64_t({a}.s32) * int64_t({b}.s32)) >> 32;"));
                self.rc_cr0(ins, &d);
            }
            Mulhwu => {
                let (d, a, b) = (self.gpr(ins.rd()), self.gpr(ins.ra()), self.gpr(ins.rb()));
                self.line(format!("{d}.u64 = (uint64_t({a}.u32) * uint64_t({b}.u32)) >> 32;"));
                self.rc_cr0(ins, &d);
            }
            Divw => {
                let (d, a, b) = (self.gpr(ins.rd()), self.gpr(ins.ra()), self.gpr(ins.rb()));
                self.line(format!("{d}.s32 = {a}.s32 / {b}.s32;"));
                self.rc_cr0(ins, &d);
            }
            Divwu => {
                let (d, a, b) = (self.gpr(ins.rd()), self.gpr(ins.ra()), self.gpr(ins.rb()));
                self.line(format!("{d}.u32 = {a}.u32 / {b}.u32;"));
                self.rc_cr0(ins, &d);
            }

            And => self.logic_rr(ins, "{d}.u64 = {s}.u64 & {b}.u64;"),
            Andc => self.logic_rr(ins, "{d}.u64 = {s}.u64 & ~{b}.u64;"),
            Or => self.logic_rr(ins, "{d}.u64 = {s}.u64 | {b}.u64;"),
            Orc => self.logic_rr(ins, "{d}.u64 = {s}.u64 | ~{b}.u64;"),
            Xor => self.logic_rr(ins, "{d}.u64 = {s}.u64 ^ {b}.u64;"),
            Nand => self.logic_rr(ins, "{d}.u64 = ~({s}.u64 & {b}.u64);"),
            Nor => self.logic_rr(ins, "{d}.u64 = ~({s}.u64 | {b}.u64);"),
            Eqv => self.logic_rr(ins, "{d}.u64 = ~({s}.u64 ^ {b}.u64);"),
            Mr => {
                let (d, s) = (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]));
                self.line(format!("{d}.u64 = {s}.u64;"));
                self.rc_cr0(ins, &d);
            }
            Ori => self.logic_imm(ins, "|", ins.uimm() as u64),
            Oris => self.logic_imm(ins, "|", (ins.uimm() as u64) << 16),
            Xori => self.logic_imm(ins, "^", ins.uimm() as u64),
            Xoris => self.logic_imm(ins, "^", (ins.uimm() as u64) << 16),
            AndiRc | AndisRc => {
                let value =
                    if id == AndiRc { ins.uimm() as u64 } else { (ins.uimm() as u64) << 16 };
                let (d, s) = (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]));
                self.line(format!("{d}.u64 = {s}.u64 & 0x{value:X};"));
                let cr0 = self.cr(0);
                self.line(format!("{cr0}.compare<int32_t>({d}.s32, 0);"));
            }
            Slw => {
                let (d, s, b) =
                    (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]), self.gpr(ins.operands[2]));
                self.line(format!(
                    "{d}.u64 = {b}.u8 & 0x20 ? 0 : {s}.u32 << ({b}.u8 & 0x1F);"
                ));
                self.rc_cr0(ins, &d);
            }
            Srw => {
                let (d, s, b) =
                    (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]), self.gpr(ins.operands[2]));
                self.line(format!(
                    "{d}.u64 = {b}.u8 & 0x20 ? 0 : {s}.u32 >> ({b}.u8 & 0x1F);"
                ));
                self.rc_cr0(ins, &d);
            }
            Sraw => {
                let (d, s, b) =
                    (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]), self.gpr(ins.operands[2]));
                let (xer, temp) = (self.xer(), self.temp());
                self.line(format!("{temp}.u32 = {b}.u32 & 0x3F;"));
                self.line(format!(
                    "{xer}.ca = ({s}.s32 < 0) && ({temp}.u32 > 31 ? {s}.u32 != 0 : ({s}.u32 & ((1u << {temp}.u32) - 1)) != 0);"
                ));
                self.line(format!(
                    "{d}.s64 = {temp}.u32 > 31 ? {s}.s32 >> 31 : {s}.s32 >> {temp}.u32;"
                ));
                self.rc_cr0(ins, &d);
            }
            Srawi => {
                let (d, s) = (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]));
                let sh = ins.operands[2];
                let xer = self.xer();
                let mask = if sh == 0 { 0 } else { (1u32 << sh) - 1 };
                self.line(format!(
                    "{xer}.ca = ({s}.s32 < 0) & (({s}.u32 & 0x{mask:X}) != 0);"
                ));
                self.line(format!("{d}.s64 = {s}.s32 >> {sh};"));
                self.rc_cr0(ins, &d);
            }
            Cntlzw => {
                let (d, s) = (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]));
                self.line(format!("{d}.u64 = {s}.u32 == 0 ? 32 : __builtin_clz({s}.u32);"));
                self.rc_cr0(ins, &d);
            }
            Extsb => {
                let (d, s) = (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]));
                self.line(format!("{d}.s64 = {s}.s8;"));
                self.rc_cr0(ins, &d);
            }
            Extsh => {
                let (d, s) = (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]));
                self.line(format!("{d}.s64 = {s}.s16;"));
                self.rc_cr0(ins, &d);
            }
            Rlwinm => {
                let (d, s) = (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]));
                let rotated = rotl_expr(&s, ins.sh());
                let mask = rot_mask(ins.mb(), ins.me());
                self.line(format!("{d}.u64 = {rotated} & 0x{mask:X};"));
                self.rc_cr0(ins, &d);
            }
            Rlwimi => {
                let (d, s) = (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]));
                let rotated = rotl_expr(&s, ins.sh());
                let mask = rot_mask(ins.mb(), ins.me());
                self.line(format!(
                    "{d}.u64 = ({rotated} & 0x{mask:X}) | ({d}.u32 & 0x{:X});",
                    !mask
                ));
                self.rc_cr0(ins, &d);
            }
            Rlwnm => {
                let (d, s, b) =
                    (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]), self.gpr(ins.operands[2]));
                let mask = rot_mask(ins.mb(), ins.me());
                self.line(format!(
                    "{d}.u64 = (({s}.u32 << ({b}.u32 & 0x1F)) | ({s}.u32 >> ((32 - ({b}.u32 & 0x1F)) & 0x1F))) & 0x{mask:X};"
                ));
                self.rc_cr0(ins, &d);
            }

            Cmpw => {
                let (f, a, b) =
                    (self.cr(ins.operands[0]), self.gpr(ins.operands[1]), self.gpr(ins.operands[2]));
                self.line(format!("{f}.compare<int32_t>({a}.s32, {b}.s32);"));
            }
            Cmplw => {
                let (f, a, b) =
                    (self.cr(ins.operands[0]), self.gpr(ins.operands[1]), self.gpr(ins.operands[2]));
                self.line(format!("{f}.compare<uint32_t>({a}.u32, {b}.u32);"));
            }
            Cmpwi => {
                let (f, a) = (self.cr(ins.operands[0]), self.gpr(ins.operands[1]));
                self.line(format!("{f}.compare<int32_t>({a}.s32, {});", ins.simm()));
            }
            Cmplwi => {
                let (f, a) = (self.cr(ins.operands[0]), self.gpr(ins.operands[1]));
                self.line(format!("{f}.compare<uint32_t>({a}.u32, 0x{:X});", ins.uimm()));
            }

            Li => {
                let d = self.gpr(ins.operands[0]);
                self.line(format!("{d}.s64 = {};", ins.simm()));
            }
            Lis => {
                let d = self.gpr(ins.operands[0]);
                self.line(format!("{d}.s64 = {};", (ins.simm() as i64) << 16));
            }
            Nop | Sync | Isync | Eieio | Dcbf | Dcbst | Dcbt | Dcbtst | Icbi => {}
            Dcbz => {
                let expr = self.ea_indexed(ins.ra(), ins.rb());
                let ea = self.ea();
                self.line(format!("{ea} = ({expr}) & ~31u;"));
                for offset in (0..32).step_by(8) {
                    self.line(format!("PPC_STORE_U64({ea} + {offset}, 0);"));
                }
            }

            // Control flow.
            B | Ba => {
                self.emit_branch(None, ins.operands[0]);
            }
            Bl | Bla => {
                self.emit_call(ins.operands[0]);
            }
            Bc | Bdnz | Bdz | Beq | Bge | Bgt | Ble | Blt | Bne | Bns | Bso => {
                let target = branch_target(ins.raw, ins.addr, ppc_bd(ins.raw));
                let condition = self.branch_condition(ppc_bo(ins.raw), ppc_bi(ins.raw));
                if ppc_lk(ins.raw) {
                    // Conditional call.
                    match condition {
                        Some(cond) => {
                            let stmt = self.call_stmt(target);
                            self.line(format!("if ({cond}) {{"));
                            self.line(format!("\t{stmt}"));
                            self.line("}");
                        }
                        None => self.emit_call(target),
                    }
                } else {
                    self.emit_branch(condition, target);
                }
            }
            Blr => self.line("return;"),
            Bclr => {
                let condition = self.branch_condition(ppc_bo(ins.raw), ppc_bi(ins.raw));
                match condition {
                    Some(cond) => self.line(format!("if ({cond}) return;")),
                    None => self.line("return;"),
                }
            }
            Bctr => {
                if let Some(table) = self.current_switch.take() {
                    let selector = self.gpr(table.r);
                    self.line(format!("switch ({selector}.u32) {{"));
                    for (index, &target) in table.labels.iter().enumerate() {
                        self.line(format!("case {index}: goto {};", label(target)));
                    }
                    self.line(format!("default: goto {};", label(table.default_target)));
                    self.line("}");
                } else {
                    let ctr = self.ctr();
                    self.line(format!("PPC_CALL_INDIRECT_FUNC({ctr}.u32);"));
                    self.line("return;");
                }
            }
            Bctrl => {
                let ctr = self.ctr();
                self.line(format!("if (PPCFunc fn = PPCFindFunc({ctr}.u32)) fn(ctx, base);"));
            }
            Blrl => {
                self.line("if (PPCFunc fn = PPCFindFunc(ctx.lr.u32)) fn(ctx, base);");
            }
            Bcctr => {
                let condition = self.branch_condition(ppc_bo(ins.raw), ppc_bi(ins.raw));
                let ctr = self.ctr();
                match condition {
                    Some(cond) => {
                        self.line(format!("if ({cond}) {{"));
                        self.line(format!("\tPPC_CALL_INDIRECT_FUNC({ctr}.u32);"));
                        self.line("}");
                    }
                    None => {
                        self.line(format!("PPC_CALL_INDIRECT_FUNC({ctr}.u32);"));
                        self.line("return;");
                    }
                }
            }

            Cror | Crxor => {
                let (d, a, b) = (ins.operands[0], ins.operands[1], ins.operands[2]);
                let dst = self.cr_bit(d);
                let lhs = self.cr_bit(a);
                let rhs = self.cr_bit(b);
                let op = if id == Cror { "|" } else { "^" };
                self.line(format!("{dst} = {lhs} {op} {rhs};"));
            }
            Mcrf => {
                let (d, s) = (self.cr(ins.crfd()), self.cr(ins.ra() >> 2));
                self.line(format!("{d} = {s};"));
            }
            Mfcr => {
                let d = self.gpr(ins.rd());
                self.line(format!("{d}.u32 = 0;"));
                for i in 0..8 {
                    let field = self.cr(i);
                    self.line(format!("{d}.u32 |= {field}.GetCRField() << {};", 28 - i * 4));
                }
            }
            Mtcrf => {
                let s = self.gpr(ins.rd());
                let crm = ins.crm();
                for i in 0..8u32 {
                    if crm & (0x80 >> i) != 0 {
                        let field = self.cr(i);
                        self.line(format!(
                            "{field}.SetCRField(({s}.u32 >> {}) & 0xF);",
                            28 - i * 4
                        ));
                    }
                }
            }
            Mflr => {
                let d = self.gpr(ins.rd());
                self.line(format!("{d}.u64 = ctx.lr.u64;"));
            }
            Mtlr => {
                let s = self.gpr(ins.rd());
                self.line(format!("ctx.lr.u64 = {s}.u64;"));
            }
            Mfctr => {
                let d = self.gpr(ins.rd());
                let ctr = self.ctr();
                self.line(format!("{d}.u64 = {ctr}.u64;"));
            }
            Mtctr => {
                let s = self.gpr(ins.rd());
                let ctr = self.ctr();
                self.line(format!("{ctr}.u64 = {s}.u64;"));
            }
            Mfmsr => {
                if !self.config.skip_msr {
                    let d = self.gpr(ins.rd());
                    self.line(format!("{d}.u32 = ctx.msr.raw;"));
                }
            }
            Mtmsr => {
                if !self.config.skip_msr {
                    let s = self.gpr(ins.rd());
                    self.line(format!("ctx.msr.raw = {s}.u32;"));
                }
            }

            // Integer loads.
            Lwz => self.load_disp(ins, "u64", "PPC_LOAD_U32"),
            Lbz => self.load_disp(ins, "u64", "PPC_LOAD_U8"),
            Lhz => self.load_disp(ins, "u64", "PPC_LOAD_U16"),
            Lha => {
                let ea = self.ea_disp(ins.operands[1], ins.simm());
                let d = self.gpr(ins.operands[0]);
                self.line(format!("{d}.s64 = int16_t(PPC_LOAD_U16({ea}));"));
            }
            Lwzu | Lbzu | Lhzu | Lhau => {
                let macro_name = match id {
                    Lwzu => "PPC_LOAD_U32",
                    Lbzu => "PPC_LOAD_U8",
                    _ => "PPC_LOAD_U16",
                };
                let a = self.gpr(ins.operands[1]);
                let ea = self.ea();
                self.line(format!("{ea} = {a}.u32 + {};", ins.simm()));
                let d = self.gpr(ins.operands[0]);
                if id == Lhau {
                    self.line(format!("{d}.s64 = int16_t({macro_name}({ea}));"));
                } else {
                    self.line(format!("{d}.u64 = {macro_name}({ea});"));
                }
                self.line(format!("{a}.u32 = {ea};"));
            }
            Lwzx => self.load_indexed(ins, "u64", "PPC_LOAD_U32"),
            Lbzx => self.load_indexed(ins, "u64", "PPC_LOAD_U8"),
            Lhzx => self.load_indexed(ins, "u64", "PPC_LOAD_U16"),
            Lhax => {
                let ea = self.ea_indexed(ins.ra(), ins.rb());
                let d = self.gpr(ins.rd());
                self.line(format!("{d}.s64 = int16_t(PPC_LOAD_U16({ea}));"));
            }
            Lwzux => {
                let a = self.gpr(ins.ra());
                let b = self.gpr(ins.rb());
                let ea = self.ea();
                self.line(format!("{ea} = {a}.u32 + {b}.u32;"));
                let d = self.gpr(ins.rd());
                self.line(format!("{d}.u64 = PPC_LOAD_U32({ea});"));
                self.line(format!("{a}.u32 = {ea};"));
            }
            Lwbrx => {
                let ea = self.ea_indexed(ins.ra(), ins.rb());
                let d = self.gpr(ins.rd());
                self.line(format!("{d}.u64 = __builtin_bswap32(PPC_LOAD_U32({ea}));"));
            }
            Lhbrx => {
                let ea = self.ea_indexed(ins.ra(), ins.rb());
                let d = self.gpr(ins.rd());
                self.line(format!("{d}.u64 = __builtin_bswap16(PPC_LOAD_U16({ea}));"));
            }
            Lwarx => {
                let ea = self.ea_indexed(ins.ra(), ins.rb());
                let reserved = self.reserved();
                self.line(format!("{reserved}.u32 = PPC_LOAD_U32({ea});"));
                let d = self.gpr(ins.rd());
                self.line(format!("{d}.u64 = {reserved}.u32;"));
            }
            Lmw => {
                let expr = self.ea_disp(ins.operands[1], ins.simm());
                let ea = self.ea();
                self.line(format!("{ea} = {expr};"));
                for (offset, r) in (ins.rd()..32).enumerate() {
                    let d = self.gpr(r);
                    self.line(format!("{d}.u64 = PPC_LOAD_U32({ea} + {});", offset * 4));
                }
            }

            // Integer stores.
            Stw => self.store_disp(ins, "u32", "PPC_STORE_U32"),
            Stb => self.store_disp(ins, "u8", "PPC_STORE_U8"),
            Sth => self.store_disp(ins, "u16", "PPC_STORE_U16"),
            Stwu | Stbu | Sthu => {
                let (macro_name, field) = match id {
                    Stwu => ("PPC_STORE_U32", "u32"),
                    Stbu => ("PPC_STORE_U8", "u8"),
                    _ => ("PPC_STORE_U16", "u16"),
                };
                let a = self.gpr(ins.operands[1]);
                let ea = self.ea();
                self.line(format!("{ea} = {a}.u32 + {};", ins.simm()));
                let s = self.gpr(ins.operands[0]);
                self.line(format!("{macro_name}({ea}, {s}.{field});"));
                self.line(format!("{a}.u32 = {ea};"));
            }
            Stwx => self.store_indexed(ins, "u32", "PPC_STORE_U32"),
            Stbx => self.store_indexed(ins, "u8", "PPC_STORE_U8"),
            Sthx => self.store_indexed(ins, "u16", "PPC_STORE_U16"),
            Stwux => {
                let a = self.gpr(ins.ra());
                let b = self.gpr(ins.rb());
                let ea = self.ea();
                self.line(format!("{ea} = {a}.u32 + {b}.u32;"));
                let s = self.gpr(ins.rd());
                self.line(format!("PPC_STORE_U32({ea}, {s}.u32);"));
                self.line(format!("{a}.u32 = {ea};"));
            }
            Stwbrx => {
                let ea = self.ea_indexed(ins.ra(), ins.rb());
                let s = self.gpr(ins.rd());
                self.line(format!("PPC_STORE_U32({ea}, __builtin_bswap32({s}.u32));"));
            }
            Sthbrx => {
                let ea = self.ea_indexed(ins.ra(), ins.rb());
                let s = self.gpr(ins.rd());
                self.line(format!("PPC_STORE_U16({ea}, __builtin_bswap16({s}.u16));"));
            }
            StwcxRc => {
                let expr = self.ea_indexed(ins.ra(), ins.rb());
                let ea = self.ea();
                self.line(format!("{ea} = {expr};"));
                let (cr0, xer, reserved) = (self.cr(0), self.xer(), self.reserved());
                let s = self.gpr(ins.rd());
                self.line(format!("{cr0}.lt = 0;"));
                self.line(format!("{cr0}.gt = 0;"));
                self.line(format!("{cr0}.eq = {reserved}.u32 == PPC_LOAD_U32({ea});"));
                self.line(format!("{cr0}.so = {xer}.so;"));
                self.line(format!("if ({cr0}.eq) PPC_STORE_U32({ea}, {s}.u32);"));
            }
            Stmw => {
                let expr = self.ea_disp(ins.operands[1], ins.simm());
                let ea = self.ea();
                self.line(format!("{ea} = {expr};"));
                for (offset, r) in (ins.rd()..32).enumerate() {
                    let s = self.gpr(r);
                    self.line(format!("PPC_STORE_U32({ea} + {}, {s}.u32);", offset * 4));
                }
            }

            // Scalar floating point.
            Fadd | Fadds => self.fp_arith(ins, "+", id == Fadds),
            Fsub | Fsubs => self.fp_arith(ins, "-", id == Fsubs),
            Fdiv | Fdivs => self.fp_arith(ins, "/", id == Fdivs),
            Fmul | Fmuls => {
                self.set_fp_state(FpState::Fpu);
                let (d, a, c) = (self.fpr(ins.rd()), self.fpr(ins.ra()), self.fpr(ins.rc_field()));
                if id == Fmuls {
                    self.line(format!("{d}.f64 = double(float({a}.f64 * {c}.f64));"));
                } else {
                    self.line(format!("{d}.f64 = {a}.f64 * {c}.f64;"));
                }
            }
            Fmadd | Fmadds | Fmsub | Fmsubs | Fnmadd | Fnmadds | Fnmsub | Fnmsubs => {
                self.set_fp_state(FpState::Fpu);
                let (d, a, b, c) = (
                    self.fpr(ins.rd()),
                    self.fpr(ins.ra()),
                    self.fpr(ins.rb()),
                    self.fpr(ins.rc_field()),
                );
                let op = if matches!(id, Fmadd | Fmadds | Fnmadd | Fnmadds) { "+" } else { "-" };
                let neg = if matches!(id, Fnmadd | Fnmadds | Fnmsub | Fnmsubs) { "-" } else { "" };
                let single = matches!(id, Fmadds | Fmsubs | Fnmadds | Fnmsubs);
                let expr = format!("{neg}({a}.f64 * {c}.f64 {op} {b}.f64)");
                if single {
                    self.line(format!("{d}.f64 = double(float({expr}));"));
                } else {
                    self.line(format!("{d}.f64 = {expr};"));
                }
            }
            Fmr => {
                self.set_fp_state(FpState::Fpu);
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                self.line(format!("{d}.f64 = {b}.f64;"));
            }
            Fneg => {
                self.set_fp_state(FpState::Fpu);
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                self.line(format!("{d}.f64 = -{b}.f64;"));
            }
            Fabs => {
                self.set_fp_state(FpState::Fpu);
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                self.line(format!("{d}.f64 = std::fabs({b}.f64);"));
            }
            Fnabs => {
                self.set_fp_state(FpState::Fpu);
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                self.line(format!("{d}.f64 = -std::fabs({b}.f64);"));
            }
            Frsp => {
                self.set_fp_state(FpState::Fpu);
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                self.line(format!("{d}.f64 = double(float({b}.f64));"));
            }
            Fctiw => {
                self.set_fp_state(FpState::Fpu);
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                self.line(format!("{d}.s64 = int32_t(std::nearbyint({b}.f64));"));
            }
            Fctiwz => {
                self.set_fp_state(FpState::Fpu);
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                self.line(format!("{d}.s64 = int32_t({b}.f64);"));
            }
            Fsel => {
                self.set_fp_state(FpState::Fpu);
                let (d, a, b, c) = (
                    self.fpr(ins.rd()),
                    self.fpr(ins.ra()),
                    self.fpr(ins.rb()),
                    self.fpr(ins.rc_field()),
                );
                self.line(format!("{d}.f64 = {a}.f64 >= 0.0 ? {c}.f64 : {b}.f64;"));
            }
            Fcmpu => {
                self.set_fp_state(FpState::Fpu);
                let (f, a, b) = (self.cr(ins.crfd()), self.fpr(ins.ra()), self.fpr(ins.rb()));
                self.line(format!("{f}.compare(float({a}.f64), float({b}.f64));"));
            }
            Lfs => {
                self.set_fp_state(FpState::Fpu);
                let ea = self.ea_disp(ins.operands[1], ins.simm());
                let d = self.fpr(ins.operands[0]);
                self.line(format!("{d}.f64 = double(std::bit_cast<float>(PPC_LOAD_U32({ea})));"));
            }
            Lfsx => {
                self.set_fp_state(FpState::Fpu);
                let ea = self.ea_indexed(ins.ra(), ins.rb());
                let d = self.fpr(ins.rd());
                self.line(format!("{d}.f64 = double(std::bit_cast<float>(PPC_LOAD_U32({ea})));"));
            }
            Lfd => {
                self.set_fp_state(FpState::Fpu);
                let ea = self.ea_disp(ins.operands[1], ins.simm());
                let d = self.fpr(ins.operands[0]);
                self.line(format!("{d}.u64 = PPC_LOAD_U64({ea});"));
            }
            Lfdx => {
                self.set_fp_state(FpState::Fpu);
                let ea = self.ea_indexed(ins.ra(), ins.rb());
                let d = self.fpr(ins.rd());
                self.line(format!("{d}.u64 = PPC_LOAD_U64({ea});"));
            }
            Stfs => {
                self.set_fp_state(FpState::Fpu);
                let ea = self.ea_disp(ins.operands[1], ins.simm());
                let s = self.fpr(ins.operands[0]);
                self.line(format!("PPC_STORE_U32({ea}, std::bit_cast<uint32_t>(float({s}.f64)));"));
            }
            Stfsx => {
                self.set_fp_state(FpState::Fpu);
                let ea = self.ea_indexed(ins.ra(), ins.rb());
                let s = self.fpr(ins.rd());
                self.line(format!("PPC_STORE_U32({ea}, std::bit_cast<uint32_t>(float({s}.f64)));"));
            }
            Stfd => {
                self.set_fp_state(FpState::Fpu);
                let ea = self.ea_disp(ins.operands[1], ins.simm());
                let s = self.fpr(ins.operands[0]);
                self.line(format!("PPC_STORE_U64({ea}, {s}.u64);"));
            }
            Stfdx => {
                self.set_fp_state(FpState::Fpu);
                let ea = self.ea_indexed(ins.ra(), ins.rb());
                let s = self.fpr(ins.rd());
                self.line(format!("PPC_STORE_U64({ea}, {s}.u64);"));
            }
            Stfiwx => {
                self.set_fp_state(FpState::Fpu);
                let ea = self.ea_indexed(ins.ra(), ins.rb());
                let s = self.fpr(ins.rd());
                self.line(format!("PPC_STORE_U32({ea}, uint32_t({s}.u64));"));
            }

            // Paired singles.
            PsAdd | PsSub | PsMul | PsDiv | PsMadd | PsMsub | PsNmadd | PsNmsub | PsMuls0
            | PsMuls1 | PsMadds0 | PsMadds1 | PsSum0 | PsSum1 | PsMerge00 | PsMerge01
            | PsMerge10 | PsMerge11 | PsMr | PsNeg | PsAbs | PsNabs | PsRes | PsRsqrte
            | PsSel | PsqL | PsqLu | PsqLx | PsqSt | PsqStu | PsqStx => {
                if !self.config.generate_paired_single_support {
                    self.line("__builtin_debugtrap();");
                    return false;
                }
                return self.emit_paired_single(ins, id);
            }

            Sc | Tw | Twi => {
                self.line("__builtin_debugtrap();");
            }
        }
        true
    }

    fn logic_rr(&mut self, ins: &Instr, template: &str) {
        let (d, s, b) =
            (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]), self.gpr(ins.operands[2]));
        let stmt = template.replace("{d}", &d).replace("{s}", &s).replace("{b}", &b);
        self.line(stmt);
        self.rc_cr0(ins, &d);
    }

    /// Record forms compare the result against zero into cr0.
    fn rc_cr0(&mut self, ins: &Instr, dest: &str) {
        if ins.raw & 1 != 0 {
            let cr0 = self.cr(0);
            self.line(format!("{cr0}.compare<int32_t>({dest}.s32, 0);"));
        }
    }

    fn logic_imm(&mut self, ins: &Instr, op: &str, value: u64) {
        let (d, s) = (self.gpr(ins.operands[0]), self.gpr(ins.operands[1]));
        self.line(format!("{d}.u64 = {s}.u64 {op} 0x{value:X};"));
    }

    fn load_disp(&mut self, ins: &Instr, field: &str, macro_name: &str) {
        let ea = self.ea_disp(ins.operands[1], ins.simm());
        let d = self.gpr(ins.operands[0]);
        self.line(format!("{d}.{field} = {macro_name}({ea});"));
    }

    fn load_indexed(&mut self, ins: &Instr, field: &str, macro_name: &str) {
        let ea = self.ea_indexed(ins.ra(), ins.rb());
        let d = self.gpr(ins.rd());
        self.line(format!("{d}.{field} = {macro_name}({ea});"));
    }

    fn store_disp(&mut self, ins: &Instr, field: &str, macro_name: &str) {
        let ea = self.ea_disp(ins.operands[1], ins.simm());
        let s = self.gpr(ins.operands[0]);
        self.line(format!("{macro_name}({ea}, {s}.{field});"));
    }

    fn store_indexed(&mut self, ins: &Instr, field: &str, macro_name: &str) {
        let ea = self.ea_indexed(ins.ra(), ins.rb());
        let s = self.gpr(ins.rd());
        self.line(format!("{macro_name}({ea}, {s}.{field});"));
    }

    fn fp_arith(&mut self, ins: &Instr, op: &str, single: bool) {
        self.set_fp_state(FpState::Fpu);
        let (d, a, b) = (self.fpr(ins.rd()), self.fpr(ins.ra()), self.fpr(ins.rb()));
        if single {
            self.line(format!("{d}.f64 = double(float({a}.f64 {op} {b}.f64));"));
        } else {
            self.line(format!("{d}.f64 = {a}.f64 {op} {b}.f64;"));
        }
    }

    /// Lane-wise lowering against the `ps0`/`ps1` register halves.
    fn emit_paired_single(&mut self, ins: &Instr, id: OpId) -> bool {
        use OpId::*;
        self.set_fp_state(FpState::PairedSingle);

        match id {
            PsAdd | PsSub | PsDiv => {
                let op = match id {
                    PsAdd => "+",
                    PsSub => "-",
                    _ => "/",
                };
                let (d, a, b) = (self.fpr(ins.rd()), self.fpr(ins.ra()), self.fpr(ins.rb()));
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = {a}.ps0 {op} {b}.ps0;"));
                self.line(format!("{t}.ps1 = {a}.ps1 {op} {b}.ps1;"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsMul => {
                let (d, a, c) = (self.fpr(ins.rd()), self.fpr(ins.ra()), self.fpr(ins.rc_field()));
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = {a}.ps0 * {c}.ps0;"));
                self.line(format!("{t}.ps1 = {a}.ps1 * {c}.ps1;"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsMuls0 | PsMuls1 => {
                let lane = if id == PsMuls0 { "ps0" } else { "ps1" };
                let (d, a, c) = (self.fpr(ins.rd()), self.fpr(ins.ra()), self.fpr(ins.rc_field()));
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = {a}.ps0 * {c}.{lane};"));
                self.line(format!("{t}.ps1 = {a}.ps1 * {c}.{lane};"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsMadd | PsMsub | PsNmadd | PsNmsub => {
                let op = if matches!(id, PsMadd | PsNmadd) { "+" } else { "-" };
                let neg = if matches!(id, PsNmadd | PsNmsub) { "-" } else { "" };
                let (d, a, b, c) = (
                    self.fpr(ins.rd()),
                    self.fpr(ins.ra()),
                    self.fpr(ins.rb()),
                    self.fpr(ins.rc_field()),
                );
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = {neg}({a}.ps0 * {c}.ps0 {op} {b}.ps0);"));
                self.line(format!("{t}.ps1 = {neg}({a}.ps1 * {c}.ps1 {op} {b}.ps1);"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsMadds0 | PsMadds1 => {
                let lane = if id == PsMadds0 { "ps0" } else { "ps1" };
                let (d, a, b, c) = (
                    self.fpr(ins.rd()),
                    self.fpr(ins.ra()),
                    self.fpr(ins.rb()),
                    self.fpr(ins.rc_field()),
                );
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = {a}.ps0 * {c}.{lane} + {b}.ps0;"));
                self.line(format!("{t}.ps1 = {a}.ps1 * {c}.{lane} + {b}.ps1;"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsSum0 => {
                let (d, a, b, c) = (
                    self.fpr(ins.rd()),
                    self.fpr(ins.ra()),
                    self.fpr(ins.rb()),
                    self.fpr(ins.rc_field()),
                );
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = {a}.ps0 + {b}.ps1;"));
                self.line(format!("{t}.ps1 = {c}.ps1;"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsSum1 => {
                let (d, a, b, c) = (
                    self.fpr(ins.rd()),
                    self.fpr(ins.ra()),
                    self.fpr(ins.rb()),
                    self.fpr(ins.rc_field()),
                );
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = {c}.ps0;"));
                self.line(format!("{t}.ps1 = {a}.ps0 + {b}.ps1;"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsMerge00 | PsMerge01 | PsMerge10 | PsMerge11 => {
                let (lane_a, lane_b) = match id {
                    PsMerge00 => ("ps0", "ps0"),
                    PsMerge01 => ("ps0", "ps1"),
                    PsMerge10 => ("ps1", "ps0"),
                    _ => ("ps1", "ps1"),
                };
                let (d, a, b) = (self.fpr(ins.rd()), self.fpr(ins.ra()), self.fpr(ins.rb()));
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = {a}.{lane_a};"));
                self.line(format!("{t}.ps1 = {b}.{lane_b};"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsMr => {
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                self.line(format!("{d}.u64 = {b}.u64;"));
            }
            PsNeg => {
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = -{b}.ps0;"));
                self.line(format!("{t}.ps1 = -{b}.ps1;"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsAbs => {
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = std::fabs({b}.ps0);"));
                self.line(format!("{t}.ps1 = std::fabs({b}.ps1);"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsNabs => {
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = -std::fabs({b}.ps0);"));
                self.line(format!("{t}.ps1 = -std::fabs({b}.ps1);"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsRes => {
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = 1.0f / {b}.ps0;"));
                self.line(format!("{t}.ps1 = 1.0f / {b}.ps1;"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsRsqrte => {
                let (d, b) = (self.fpr(ins.rd()), self.fpr(ins.rb()));
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = 1.0f / std::sqrt({b}.ps0);"));
                self.line(format!("{t}.ps1 = 1.0f / std::sqrt({b}.ps1);"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsSel => {
                let (d, a, b, c) = (
                    self.fpr(ins.rd()),
                    self.fpr(ins.ra()),
                    self.fpr(ins.rb()),
                    self.fpr(ins.rc_field()),
                );
                let t = self.ps_temp();
                self.line(format!("{t}.ps0 = {a}.ps0 >= 0.0f ? {c}.ps0 : {b}.ps0;"));
                self.line(format!("{t}.ps1 = {a}.ps1 >= 0.0f ? {c}.ps1 : {b}.ps1;"));
                self.line(format!("{d}.u64 = {t}.u64;"));
            }
            PsqL | PsqLu | PsqLx | PsqStu | PsqSt | PsqStx => {
                return self.emit_quantized(ins, id);
            }
            _ => unreachable!("non paired-single op"),
        }
        true
    }

    /// Quantized load/store. The GQR selects the quantization; the float
    /// format is emitted here and integer dequantization is left to the
    /// runtime's flush-mode configuration.
    fn emit_quantized(&mut self, ins: &Instr, id: OpId) -> bool {
        use OpId::*;
        let (w, gqr) = match id {
            PsqL | PsqLu | PsqSt | PsqStu => (ins.ps_w(), ins.ps_i()),
            _ => (ins.ps_wx(), ins.ps_ix()),
        };
        let update = matches!(id, PsqLu | PsqStu);
        let load = matches!(id, PsqL | PsqLu | PsqLx);

        let ea = if update {
            let a = self.gpr(ins.ra());
            let ea = self.ea();
            self.line(format!("{ea} = {a}.u32 + {};", ins.ps_d()));
            ea
        } else if matches!(id, PsqLx | PsqStx) {
            self.ea_indexed(ins.ra(), ins.rb())
        } else {
            self.ea_disp(ins.ra(), ins.ps_d())
        };

        if self.config.generate_gqr_support {
            self.line(format!("// gqr{gqr}"));
        }

        let reg = self.fpr(ins.rd());
        if load {
            self.line(format!("{reg}.ps0 = std::bit_cast<float>(PPC_LOAD_U32({ea}));"));
            if w == 0 {
                self.line(format!("{reg}.ps1 = std::bit_cast<float>(PPC_LOAD_U32({ea} + 4));"));
            } else {
                self.line(format!("{reg}.ps1 = 1.0f;"));
            }
        } else {
            self.line(format!("PPC_STORE_U32({ea}, std::bit_cast<uint32_t>({reg}.ps0));"));
            if w == 0 {
                self.line(format!("PPC_STORE_U32({ea} + 4, std::bit_cast<uint32_t>({reg}.ps1));"));
            }
        }

        if update {
            let a = self.gpr(ins.ra());
            self.line(format!("{a}.u32 = {ea};"));
        }
        true
    }
}

/// Rotate-left expression for a constant shift.
fn rotl_expr(value: &str, sh: u32) -> String {
    if sh == 0 {
        format!("{value}.u32")
    } else {
        format!("(({value}.u32 << {sh}) | ({value}.u32 >> {}))", 32 - sh)
    }
}

/// PowerPC rotate mask from MB to ME, big-endian bit numbering.
fn rot_mask(mb: u32, me: u32) -> u32 {
    let start = ((1u64 << (32 - mb)) - 1) as u32;
    let end = ((1u64 << (31 - me)) - 1) as u32;
    if mb <= me {
        start & !end
    } else {
        start | !end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wur_rpx::{Section, Symbol, SHF_ALLOC, SHF_EXECINSTR, SHT_PROGBITS};

    fn image_with_code(base: u32, words: &[u32]) -> RpxImage {
        let section = Section {
            name: ".text".into(),
            base,
            size: (words.len() * 4) as u32,
            sh_type: SHT_PROGBITS,
            sh_flags: SHF_ALLOC | SHF_EXECINSTR,
            was_compressed: false,
            data: Some(words.iter().flat_map(|w| w.to_be_bytes()).collect()),
        };
        RpxImage { sections: vec![section], base, ..Default::default() }
    }

    fn translate(words: &[u32], config: &RecompilerConfig) -> TranslatedFunction {
        let base = 0x0200_0000;
        let image = image_with_code(base, words);
        let code: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        let fn_ = Function::analyze(&code, base);
        Translator::new(&image, config).translate(&fn_).expect("translates")
    }

    #[test]
    fn single_blr_is_one_return() {
        let result = translate(&[0x4E80_0020], &RecompilerConfig::default());
        assert!(result.complete);
        assert!(result.code.contains("PPC_FUNC_IMPL(__imp__sub_2000000)"));
        assert!(result.code.contains("\treturn;\n"));
        assert_eq!(result.code.matches("return;").count(), 1);
    }

    #[test]
    fn forward_branch_emits_label_and_goto() {
        // b +8; blr; blr
        let result = translate(&[0x4800_0008, 0x4E80_0020, 0x4E80_0020], &RecompilerConfig::default());
        assert!(result.complete);
        assert!(result.code.contains("goto loc_02000008;"));
        assert!(result.code.contains("loc_02000008:"));
        assert_eq!(result.code.matches("\treturn;\n").count(), 2);
    }

    #[test]
    fn conditional_branch_emits_if() {
        // bne +8; blr; blr
        let result = translate(&[0x4082_0008, 0x4E80_0020, 0x4E80_0020], &RecompilerConfig::default());
        assert!(result.complete);
        assert!(result.code.contains("if (!ctx.cr[0].eq) goto loc_02000008;"));
        assert_eq!(result.code.matches("\treturn;\n").count(), 2);
    }

    #[test]
    fn add_uses_context_registers() {
        // add r3, r4, r5; blr
        let result = translate(&[0x7C64_2A14, 0x4E80_0020], &RecompilerConfig::default());
        assert!(result.code.contains("ctx.r[3].u64 = ctx.r[4].u64 + ctx.r[5].u64;"));
    }

    #[test]
    fn non_volatile_registers_become_locals() {
        // add r14, r15, r16; blr
        let config = RecompilerConfig { non_volatile_as_local: true, ..Default::default() };
        let result = translate(&[0x7DCF_8214, 0x4E80_0020], &config);
        assert!(result.code.contains("PPCRegister r14{};"));
        assert!(result.code.contains("r14.u64 = r15.u64 + r16.u64;"));
    }

    #[test]
    fn loads_and_stores_use_memory_macros() {
        // lwz r3, 8(r1); stw r3, 12(r1); blr
        let result =
            translate(&[0x8061_0008, 0x9061_000C, 0x4E80_0020], &RecompilerConfig::default());
        assert!(result.code.contains("ctx.r[3].u64 = PPC_LOAD_U32(ctx.r[1].u32 + 8);"));
        assert!(result.code.contains("PPC_STORE_U32(ctx.r[1].u32 + 12, ctx.r[3].u32);"));
    }

    #[test]
    fn bdnz_decrements_counter() {
        // bdnz -4 ... need something before; li r3, 0; bdnz -4; blr
        let result =
            translate(&[0x3860_0000, 0x4200_FFFC, 0x4E80_0020], &RecompilerConfig::default());
        assert!(result.code.contains("--ctx.ctr.u64;"));
        assert!(result.code.contains("if (ctx.ctr.u32 != 0) goto loc_02000000;"));
    }

    #[test]
    fn tail_call_lowered_as_call_then_return() {
        let base = 0x0200_0000;
        // Function at base: b +0x20 (outside its own extent).
        let words = [0x4800_0020u32];
        let mut image = image_with_code(base, &words);
        image
            .symbols
            .insert(Symbol::new("helper", base + 0x20, 4, SymbolKind::Function));
        let code: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        let fn_ = Function::analyze(&code, base);
        let config = RecompilerConfig::default();
        let result = Translator::new(&image, &config).translate(&fn_).unwrap();
        assert!(result.code.contains("helper(ctx, base);"));
        assert!(result.code.contains("\treturn;\n"));
    }

    #[test]
    fn switch_table_lowers_to_dense_dispatch() {
        let base = 0x0200_0000;
        // cmplwi cr6, r29, 1; bgt cr6, default; mtctr r0; bctr; case; default
        let words = [
            0x2B1D_0001,
            0x4199_0010,
            0x7C09_03A6,
            0x4E80_0420,
            0x4E80_0020,
            0x4E80_0020,
        ];
        let mut config = RecompilerConfig::default();
        config.switch_tables.insert(
            base + 8,
            SwitchEntry {
                base: base + 8,
                r: 29,
                default_target: base + 0x14,
                labels: vec![base + 0x10, base + 0x14],
            },
        );
        let result = translate(&words, &config);
        assert!(result.complete);
        assert!(result.code.contains("switch (ctx.r[29].u32) {"));
        assert!(result.code.contains("case 0: goto loc_02000010;"));
        assert!(result.code.contains("case 1: goto loc_02000014;"));
        assert!(result.code.contains("default: goto loc_02000014;"));
        assert!(result.code.contains("loc_02000010:"));
        assert!(result.code.contains("loc_02000014:"));
    }

    #[test]
    fn invalid_word_is_commented() {
        let mut config = RecompilerConfig::default();
        let result = translate(&[0x0000_0001, 0x4E80_0020], &config);
        assert!(result.code.contains("// INVALID INSTRUCTION: 0x00000001"));
        assert!(!result.complete);

        config.treat_unknown_instructions_as_nop = true;
        let result = translate(&[0x0000_0001, 0x4E80_0020], &config);
        assert!(result.complete);
    }

    #[test]
    fn fp_mode_switches_once_per_run() {
        // fadd f1, f2, f3; fadd f1, f1, f3; blr
        let result =
            translate(&[0xFC22_182A, 0xFC21_182A, 0x4E80_0020], &RecompilerConfig::default());
        assert_eq!(result.code.matches("disableFlushModeUnconditional").count(), 1);
        assert_eq!(result.code.matches("disableFlushMode();").count(), 0);
    }

    #[test]
    fn paired_single_add_is_lane_wise() {
        // ps_add f1, f2, f3; blr
        let result = translate(
            &[0x1022_182A, 0x4E80_0020],
            &RecompilerConfig { generate_paired_single_support: true, ..Default::default() },
        );
        assert!(result.code.contains("ps_temp.ps0 = ctx.f[2].ps0 + ctx.f[3].ps0;"));
        assert!(result.code.contains("ps_temp.ps1 = ctx.f[2].ps1 + ctx.f[3].ps1;"));
        assert!(result.code.contains("enableFlushModeUnconditional"));
    }

    #[test]
    fn label_resets_fp_state() {
        // fadd f1, f2, f3; b +8; nop; fadd f1, f2, f3; blr
        // The second fadd sits after a label, so the mode is re-established.
        let words = [0xFC22_182A, 0x4800_0008, 0x6000_0000, 0xFC22_182A, 0x4E80_0020];
        let result = translate(&words, &RecompilerConfig::default());
        assert_eq!(result.code.matches("disableFlushModeUnconditional").count(), 2);
    }

    #[test]
    fn midasm_hook_before_and_after() {
        let base = 0x0200_0000;
        let mut config = RecompilerConfig::default();
        config.midasm_hooks.insert(
            base,
            MidAsmHook {
                name: "OnEnter".into(),
                address: base,
                registers: vec!["r3".into()],
                ..Default::default()
            },
        );
        config.midasm_hooks.insert(
            base + 4,
            MidAsmHook {
                name: "AfterAdd".into(),
                address: base + 4,
                after_instruction: true,
                ..Default::default()
            },
        );
        // li r3, 1; add r3, r3, r3; blr
        let result = translate(&[0x3860_0001, 0x7C63_1A14, 0x4E80_0020], &config);
        let on_enter = result.code.find("OnEnter(ctx.r[3]);").unwrap();
        let li = result.code.find("ctx.r[3].s64 = 1;").unwrap();
        let add = result.code.find("ctx.r[3].u64 = ctx.r[3].u64 + ctx.r[3].u64;").unwrap();
        let after = result.code.find("AfterAdd();").unwrap();
        assert!(on_enter < li);
        assert!(add < after);
    }
}
