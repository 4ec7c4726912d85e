//! The path engine (§4.4): schedules abstract execution of one method's
//! instruction stream, joining states that reach the same program
//! counter and forking on conditional branches, switches, and
//! exception edges.
//!
//! The engine is monotone-ish but not truly sound without the widening
//! escape hatches below — real methods have loops, and without a cap
//! this would never terminate. [AnalyzerConfig::max_branch_depth] and
//! [AnalyzerConfig::max_sub_count] bound the state explosion by
//! widening (`all_flag`-ing) whatever is still live and cutting the
//! branch short, trading precision for termination.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ahash::{AHashMap, AHashSet};
use offload_dex::dex::CodeItem;
use offload_dex::instr::RawInstruction;

use crate::context::AnalyzerContext;
use crate::errors::AnalyzerError;
use crate::interp::{self, Control};
use crate::value::{MethodAccess, NodeId};

/// One live point of abstract execution: a program counter plus the
/// register bindings interesting to this analysis (everything else is
/// untracked scalar noise and not worth carrying).
#[derive(Debug, Clone)]
pub struct ParseState {
    pub pc: u32,
    pub last_opcode: u8,
    /// Offsets this state has already stepped through, so a branch back
    /// to one of them is recognized as a cycle rather than re-explored.
    pub visited_offsets: AHashSet<u32>,
    /// Set by any instruction that just wrote an object reference;
    /// triggers an immediate handler-lookup-and-fork at that
    /// instruction's own offset, then clears on the forked state.
    pub affects_try: bool,
    pub interest_regs: AHashMap<u16, AHashSet<NodeId>>,
}

impl ParseState {
    pub fn entry(pc: u32) -> ParseState {
        ParseState {
            pc,
            last_opcode: 0,
            visited_offsets: AHashSet::default(),
            affects_try: false,
            interest_regs: AHashMap::default(),
        }
    }

    pub fn bind(&mut self, reg: u16, set: AHashSet<NodeId>) {
        if set.is_empty() {
            self.interest_regs.remove(&reg);
        } else {
            self.interest_regs.insert(reg, set);
        }
    }

    /// A deep copy used when an exception edge forks execution into a
    /// handler: the handler state starts from the same bindings but
    /// with `affects_try` cleared and its own `pc`.
    fn fork_to_handler(&self, handler_pc: u32) -> ParseState {
        ParseState {
            pc: handler_pc,
            last_opcode: 0,
            visited_offsets: self.visited_offsets.clone(),
            affects_try: false,
            interest_regs: self.interest_regs.clone(),
        }
    }

    fn union(&mut self, other: &ParseState) {
        self.affects_try |= other.affects_try;
        self.visited_offsets.extend(other.visited_offsets.iter().copied());
        for (&reg, set) in &other.interest_regs {
            self.interest_regs.entry(reg).or_default().extend(set.iter().copied());
        }
    }
}

/// Orders a worklist so the state with the smallest `pc` is always
/// processed next, per the "always advances the one with smallest pc"
/// scheduling rule.
#[derive(Eq, PartialEq)]
struct Scheduled(Reverse<u32>, usize);

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0).then_with(|| self.1.cmp(&other.1))
    }
}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Drives abstract interpretation of `code` starting at `entry`,
/// mutating `ma`'s graph in place. Returns once every live path has
/// returned, thrown past the method boundary, gone dead, or been
/// widened away.
pub fn parse_method(
    ctx: &mut AnalyzerContext,
    ma: &mut MethodAccess,
    code: &CodeItem,
    entry: ParseState,
) -> Result<(), AnalyzerError> {
    let max_branch_depth = ctx.config.max_branch_depth;
    let max_sub_count = ctx.config.max_sub_count;

    let mut slots: Vec<Option<ParseState>> = vec![Some(entry)];
    let mut heap = BinaryHeap::new();
    heap.push(Scheduled(Reverse(slots[0].as_ref().unwrap().pc), 0));

    // How many times a given pc has been joined into; once this crosses
    // max_branch_depth we give up refining that program point.
    let mut join_counts: AHashMap<u32, usize> = AHashMap::default();
    let mut total_forks: usize = 0;
    let mut widened = false;

    while let Some(Scheduled(Reverse(pc), slot)) = heap.pop() {
        let Some(mut state) = slots[slot].take() else { continue };
        if state.pc != pc {
            // stale entry from before a join touched this slot
            slots[slot] = Some(state);
            continue;
        }

        if widened {
            continue;
        }

        if !state.visited_offsets.insert(state.pc) {
            // cycle: this exact offset was already stepped through on
            // this path, stop exploring it further.
            continue;
        }

        let insn = match RawInstruction::decode(&code.insns, state.pc) {
            Ok(insn) => insn,
            Err(_) => continue,
        };
        state.last_opcode = insn.opcode;

        let control = interp::step(ctx, ma, code, &insn, &mut state)?;

        if state.affects_try {
            if let Some(handler) = code.handler_for_offset(insn.offset) {
                fork_handlers(&mut slots, &mut heap, &state, handler);
            }
            state.affects_try = false;
        }

        total_forks += 1;
        if total_forks > max_sub_count * 64 {
            widen_all_roots(ma);
            widened = true;
            continue;
        }

        match control {
            Control::Advance => {
                let next_pc = insn.offset + insn.width;
                schedule(&mut slots, &mut heap, &mut join_counts, max_branch_depth, next_pc, state, &mut widened, ma);
            }
            Control::Goto(target) => {
                schedule(&mut slots, &mut heap, &mut join_counts, max_branch_depth, target, state, &mut widened, ma);
            }
            Control::Branch(taken, fallthrough) => {
                let taken_state = state.clone();
                schedule(&mut slots, &mut heap, &mut join_counts, max_branch_depth, taken, taken_state, &mut widened, ma);
                schedule(&mut slots, &mut heap, &mut join_counts, max_branch_depth, fallthrough, state, &mut widened, ma);
            }
            Control::Switch(targets, fallthrough) => {
                if targets.len() > max_sub_count {
                    widen_all_roots(ma);
                    widened = true;
                } else {
                    for target in targets {
                        schedule(&mut slots, &mut heap, &mut join_counts, max_branch_depth, target, state.clone(), &mut widened, ma);
                    }
                    schedule(&mut slots, &mut heap, &mut join_counts, max_branch_depth, fallthrough, state, &mut widened, ma);
                }
            }
            Control::Return | Control::Dead => {}
            Control::Throw => {
                if let Some(handler) = code.handler_for_offset(insn.offset) {
                    fork_handlers(&mut slots, &mut heap, &state, handler);
                }
            }
        }
    }

    Ok(())
}

fn fork_handlers(
    slots: &mut Vec<Option<ParseState>>,
    heap: &mut BinaryHeap<Scheduled>,
    state: &ParseState,
    handler: &offload_dex::dex::CatchHandler,
) {
    for pair in &handler.handlers {
        let forked = state.fork_to_handler(pair.addr);
        push_new(slots, heap, forked);
    }
    if let Some(addr) = handler.catch_all_addr {
        let forked = state.fork_to_handler(addr);
        push_new(slots, heap, forked);
    }
}

fn push_new(slots: &mut Vec<Option<ParseState>>, heap: &mut BinaryHeap<Scheduled>, state: ParseState) {
    let pc = state.pc;
    let idx = slots.len();
    slots.push(Some(state));
    heap.push(Scheduled(Reverse(pc), idx));
}

/// Places `state` into the worklist at `pc`, joining it into any other
/// live state already scheduled at the same `pc` (per the "states with
/// identical pc are joined" rule) instead of running both separately.
fn schedule(
    slots: &mut Vec<Option<ParseState>>,
    heap: &mut BinaryHeap<Scheduled>,
    join_counts: &mut AHashMap<u32, usize>,
    max_branch_depth: usize,
    pc: u32,
    mut state: ParseState,
    widened: &mut bool,
    ma: &mut MethodAccess,
) {
    state.pc = pc;

    let count = join_counts.entry(pc).or_insert(0);
    *count += 1;
    if *count > max_branch_depth {
        widen_all_roots(ma);
        *widened = true;
        return;
    }

    // Look for an already-pending (not yet popped) state at the same pc
    // to join into, scanning existing slots. Methods are small enough
    // (bounded by a code_item's insns length) that a linear scan here
    // is cheap relative to the interpretation work itself.
    for existing in slots.iter_mut().flatten() {
        if existing.pc == pc {
            existing.union(&state);
            return;
        }
    }

    push_new(slots, heap, state);
}

fn widen_all_roots(ma: &mut MethodAccess) {
    let roots: Vec<NodeId> = ma
        .args
        .iter()
        .copied()
        .chain(ma.global_classes.values().copied())
        .collect();
    for root in roots {
        ma.arena.widen_all(root);
    }
}
