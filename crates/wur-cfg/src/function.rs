//! Function extent and basic-block reconstruction.
//!
//! Discovery walks forward from offset zero with an explicit stack of
//! pending blocks. Blocks reference each other by index into the function's
//! block vector, which gets resized during the walk, so no borrowed
//! references are held across pushes.

use wur_ppc::{decode, ppc_bd, ppc_bo, ppc_li, ppc_lk, ppc_op, ppc_xop};
use wur_ppc::{OP_B, OP_BC, OP_CTR, XOP_BCCTR, XOP_BCLR};

/// The second word of a compiler-emitted shifted-pointer thunk. Walking
/// through one would wrongly follow the tail target, so it is matched
/// before any analysis.
const SHIFTED_PTR_TAIL_CALL: u32 = 0x0400_0048;

/// One straight-line run of instructions. Offsets are relative to the
/// containing function's base and always multiples of four.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicBlock {
    pub start: u32,
    pub size: u32,
    /// Tentative upper bound set by a sibling that starts right after this
    /// block's range. The walk stops extending once the bound is reached.
    pub projected_size: Option<u32>,
}

impl BasicBlock {
    fn new(start: u32, projected_size: Option<u32>) -> Self {
        Self { start, size: 0, projected_size }
    }

    pub fn end(&self) -> u32 {
        self.start + self.size
    }
}

/// A discovered function: base virtual address, total extent, and its
/// basic blocks sorted by start offset.
#[derive(Clone, Debug, Default)]
pub struct Function {
    pub base: u32,
    pub size: u32,
    pub blocks: Vec<BasicBlock>,
}

const NO_BLOCK: usize = usize::MAX;

impl Function {
    pub fn new(base: u32, size: u32) -> Self {
        Self { base, size, blocks: Vec::new() }
    }

    pub fn is_valid(&self) -> bool {
        self.size > 0
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.base && address < self.base + self.size
    }

    pub fn end_address(&self) -> u32 {
        self.base + self.size
    }

    /// Index of the block containing `address`, or `NO_BLOCK`. Blocks that
    /// have not been extended yet match only their exact start.
    pub fn search_block(&self, address: u32) -> usize {
        if address < self.base {
            return NO_BLOCK;
        }
        for (i, block) in self.blocks.iter().enumerate() {
            let begin = self.base + block.start;
            let end = begin + block.size;
            if begin != end {
                if address >= begin && address < end {
                    return i;
                }
            } else if address == begin {
                return i;
            }
        }
        NO_BLOCK
    }

    /// Reconstruct the function at `base` from at most `code.len()` bytes.
    pub fn analyze(code: &[u8], base: u32) -> Function {
        let mut fn_ = Function::new(base, 0);

        if code.len() >= 8 && read_word(code, 4) == SHIFTED_PTR_TAIL_CALL {
            fn_.size = 8;
            fn_.blocks.push(BasicBlock { start: 0, size: 8, projected_size: None });
            return fn_;
        }

        fn_.blocks.push(BasicBlock::new(0, None));
        // Offset of the branch instruction each block was reached from,
        // used by the fixup pass to tell reachable blocks from fragments.
        let mut parents: Vec<u32> = vec![0];
        let mut stack: Vec<usize> = Vec::with_capacity(32);
        stack.push(0);

        while let Some(&top) = stack.last() {
            let pos = fn_.blocks[top].end();
            if pos as usize + 4 > code.len() {
                // Ran off the analysis window.
                stack.pop();
                continue;
            }
            if let Some(projected) = fn_.blocks[top].projected_size {
                if fn_.blocks[top].size >= projected {
                    // Reached the bound a sibling placed on this range.
                    stack.pop();
                    continue;
                }
            }

            let addr = base + pos;
            let word = read_word(code, pos as usize);
            let op = ppc_op(word);
            let is_link = ppc_lk(word);

            fn_.blocks[top].size += 4;

            if op == OP_BC {
                if is_link {
                    // Conditional call, not a terminator.
                    continue;
                }
                fn_.blocks[top].projected_size = None;
                stack.pop();

                let false_start = pos + 4;
                let target = addr.wrapping_add_signed(ppc_bd(word));
                if target < base {
                    // Backward conditional exits are not chased; keep the
                    // fall-through edge only.
                    if fn_.search_block(base + false_start) == NO_BLOCK {
                        fn_.blocks.push(BasicBlock::new(false_start, None));
                        parents.push(pos);
                        stack.push(fn_.blocks.len() - 1);
                    }
                    continue;
                }
                let true_start = target - base;

                // Push the false edge first so the true edge, typically
                // further away, is walked first and exposes more blocks.
                if fn_.search_block(base + false_start) == NO_BLOCK {
                    let projected = true_start.checked_sub(false_start).filter(|&p| p > 0);
                    fn_.blocks.push(BasicBlock::new(false_start, projected));
                    parents.push(pos);
                    stack.push(fn_.blocks.len() - 1);
                }
                if fn_.search_block(target) == NO_BLOCK {
                    fn_.blocks.push(BasicBlock::new(true_start, None));
                    parents.push(pos);
                    stack.push(fn_.blocks.len() - 1);
                }
            } else if op == OP_B
                || word == 0
                || (op == OP_CTR && matches!(ppc_xop(word), XOP_BCLR | XOP_BCCTR))
            {
                // Direct branch, return, computed branch, or end padding.
                if is_link {
                    continue;
                }
                stack.pop();

                if op == OP_B {
                    let target = addr.wrapping_add_signed(ppc_li(word));
                    if target < base {
                        // A branch below the base is a tail call.
                        continue;
                    }
                    let branch_start = target - base;

                    // Carry the remaining projection over when the target
                    // sits immediately after this block.
                    let cur = &fn_.blocks[top];
                    let continuous = branch_start == cur.end();
                    let projection = match (cur.projected_size, continuous) {
                        (Some(projected), true) => projected.checked_sub(cur.size),
                        _ => None,
                    };

                    if fn_.search_block(target) == NO_BLOCK {
                        fn_.blocks.push(BasicBlock::new(branch_start, projection));
                        parents.push(pos);
                        stack.push(fn_.blocks.len() - 1);
                    }
                } else if op == OP_CTR {
                    // BO bit 4 set means the condition is ignored; clear
                    // means this return or dispatch can fall through.
                    let conditional = ppc_bo(word) & 0x10 == 0;
                    if conditional {
                        let fall_start = pos + 4;
                        if fn_.search_block(base + fall_start) == NO_BLOCK {
                            fn_.blocks.push(BasicBlock::new(fall_start, None));
                            parents.push(pos);
                            stack.push(fn_.blocks.len() - 1);
                        }
                    }
                }
            } else if decode(word, addr).opcode.is_none() {
                // Unrecognized word terminates the block with no successors.
                stack.pop();
            }
        }

        fn_.finish(&parents);
        fn_
    }

    /// Sort blocks, drop fragments that are not justified by a branch in
    /// retained code, and derive the function size.
    ///
    /// A gap before a block is fine when the branch that spawned the block
    /// sits in code already kept (a forward branch over dead words). A
    /// block past a gap whose spawning branch was itself discarded is a
    /// mis-attributed fragment and everything from it on is dropped.
    fn finish(&mut self, parents: &[u32]) {
        if self.blocks.len() > 1 {
            // Blocks that never received an instruction are stubs whose
            // walk ran off the window (forward tail calls and the like).
            let mut order: Vec<usize> =
                (0..self.blocks.len()).filter(|&i| i == 0 || self.blocks[i].size > 0).collect();
            order.sort_by_key(|&i| self.blocks[i].start);

            let mut kept: Vec<BasicBlock> = Vec::with_capacity(order.len());
            let mut kept_end = 0u32;
            for (n, &i) in order.iter().enumerate() {
                let block = self.blocks[i];
                if n > 0 && block.start > kept_end && parents[i] >= kept_end {
                    break;
                }
                kept_end = kept_end.max(block.end());
                kept.push(block);
            }
            self.blocks = kept;
        }

        self.size = self.blocks.iter().map(BasicBlock::end).max().unwrap_or(0);
    }
}

#[inline]
fn read_word(code: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([code[offset], code[offset + 1], code[offset + 2], code[offset + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(ws: &[u32]) -> Vec<u8> {
        ws.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    const BLR: u32 = 0x4E80_0020;

    #[test]
    fn single_return() {
        let code = words(&[BLR]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert_eq!(fn_.size, 4);
        assert_eq!(fn_.blocks, vec![BasicBlock { start: 0, size: 4, projected_size: None }]);
    }

    #[test]
    fn shifted_pointer_tail_call_thunk() {
        let code = words(&[0x4800_0000, 0x0400_0048]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert_eq!(fn_.size, 8);
        assert_eq!(fn_.blocks.len(), 1);
        assert_eq!(fn_.blocks[0].start, 0);
        assert_eq!(fn_.blocks[0].size, 8);
    }

    #[test]
    fn forward_branch_over_dead_word() {
        // b +8; blr; blr -> the branch skips the middle word but the
        // target block stays part of the function.
        let code = words(&[0x4800_0008, BLR, BLR]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert_eq!(fn_.size, 12);
        assert_eq!(fn_.blocks.len(), 2);
        assert_eq!((fn_.blocks[0].start, fn_.blocks[0].size), (0, 4));
        assert_eq!((fn_.blocks[1].start, fn_.blocks[1].size), (8, 4));
    }

    #[test]
    fn conditional_branch_has_two_successors() {
        // bne +8; blr; blr
        let code = words(&[0x4082_0008, BLR, BLR]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert_eq!(fn_.size, 12);
        assert_eq!(fn_.blocks.len(), 3);
        for (i, block) in fn_.blocks.iter().enumerate() {
            assert_eq!(block.start, i as u32 * 4);
            assert_eq!(block.size, 4);
        }
    }

    #[test]
    fn all_zero_word_terminates() {
        let code = words(&[0x3860_0000, 0x0000_0000, BLR]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        // li extends the entry block, the zero word ends it, and nothing
        // chases the padding.
        assert_eq!(fn_.blocks.len(), 1);
        assert_eq!(fn_.size, 8);
    }

    #[test]
    fn forward_branch_past_window_leaves_only_a_stub() {
        // b +0x20 with nothing else in the window: the target block never
        // receives an instruction and must not inflate the extent.
        let code = words(&[0x4800_0020]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert_eq!(fn_.size, 4);
        assert_eq!(fn_.blocks.len(), 1);
    }

    #[test]
    fn tail_call_below_base_does_not_extend() {
        // b -0x1000
        let code = words(&[0x4BFF_F000, BLR]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert_eq!(fn_.size, 4);
        assert_eq!(fn_.blocks.len(), 1);
    }

    #[test]
    fn call_does_not_terminate() {
        // bl +0x100; blr
        let code = words(&[0x4800_0101, BLR]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert_eq!(fn_.size, 8);
        assert_eq!(fn_.blocks.len(), 1);
        assert_eq!(fn_.blocks[0].size, 8);
    }

    #[test]
    fn invalid_word_terminates_without_successors() {
        // 0x00000001 decodes to nothing; the entry block ends there and
        // the trailing return is never attributed to this function.
        let code = words(&[0x3860_0000, 0x0000_0001, BLR]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert_eq!(fn_.blocks.len(), 1);
        assert_eq!(fn_.size, 8);
    }

    #[test]
    fn loop_with_backward_conditional() {
        // 0: li r3, 0
        // 4: addi r3, r3, 1
        // 8: bne -4 (back to 4)
        // c: blr
        let code = words(&[0x3860_0000, 0x3863_0001, 0x4082_FFFC, BLR]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert_eq!(fn_.size, 16);
        // Blocks sorted, non-overlapping, 4-aligned, first at zero.
        assert_eq!(fn_.blocks[0].start, 0);
        for pair in fn_.blocks.windows(2) {
            assert!(pair[0].start < pair[1].start);
            assert!(pair[0].end() <= pair[1].start);
        }
        for block in &fn_.blocks {
            assert_eq!(block.start % 4, 0);
            assert_eq!(block.size % 4, 0);
        }
        assert_eq!(fn_.size, fn_.blocks.iter().map(BasicBlock::end).max().unwrap());
    }

    #[test]
    fn conditional_bctr_spawns_fall_through() {
        // bnectr cr0 (BO=4, BI=2); blr
        let code = words(&[0x4C82_0420, BLR]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert_eq!(fn_.blocks.len(), 2);
        assert_eq!(fn_.size, 8);
    }

    #[test]
    fn fragment_past_unjustified_gap_is_dropped() {
        // The entry block dies on an invalid word at offset 4; the returns
        // at 16 and 20 were never reached from kept code, so a function
        // seeded over the whole window must not claim them.
        // 0: li  4: invalid  8: pad  12: pad  16: blr  20: blr
        let code = words(&[0x3860_0000, 0x0000_0001, 0, 0, BLR, BLR]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert_eq!(fn_.blocks.len(), 1);
        assert_eq!(fn_.size, 8);
    }

    #[test]
    fn conditional_target_past_dead_range_is_kept() {
        // beq +16 jumps over a dead range; the landing block is justified
        // by the branch at offset 0 and survives the fixup.
        let code = words(&[0x4182_0010, BLR, 0, 0, BLR]);
        let fn_ = Function::analyze(&code, 0x0200_0000);
        assert!(fn_.blocks.iter().any(|b| b.start == 16));
        assert_eq!(fn_.size, 20);
    }

    #[test]
    fn search_block_matches_fresh_blocks_exactly() {
        let fn_ = Function {
            base: 0x100,
            size: 8,
            blocks: vec![
                BasicBlock { start: 0, size: 8, projected_size: None },
                BasicBlock { start: 8, size: 0, projected_size: None },
            ],
        };
        assert_eq!(fn_.search_block(0x100), 0);
        assert_eq!(fn_.search_block(0x104), 0);
        assert_eq!(fn_.search_block(0x108), 1);
        assert_eq!(fn_.search_block(0x10C), NO_BLOCK);
        assert_eq!(fn_.search_block(0xFF), NO_BLOCK);
    }
}
