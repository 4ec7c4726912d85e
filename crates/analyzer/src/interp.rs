//! Per-opcode transfer functions (§4.3): how one instruction mutates a
//! [MethodAccess]'s graph and the currently-live [ParseState]'s register
//! bindings.
//!
//! This module only decides *what happens to the graph*; it has no
//! opinion on scheduling, joins, or exception fan-out — that is
//! [crate::path]'s job. [step] returns a [Control] telling the path
//! engine how `pc` should move from here.

use ahash::AHashSet;
use offload_dex::instr::{parse_packed_switch_payload, parse_sparse_switch_payload, RawInstruction};
use offload_dex::link::InvokeKind;
use offload_dex::dex::CodeItem;

use crate::context::AnalyzerContext;
use crate::driver;
use crate::errors::AnalyzerError;
use crate::path::ParseState;
use crate::value::{MethodAccess, NodeId};

/// How control leaves the instruction just stepped.
pub enum Control {
    /// Ordinary fallthrough to `offset + width`.
    Advance,
    /// Unconditional relocation (`goto*`).
    Goto(u32),
    /// Conditional: `(taken, fallthrough)`.
    Branch(u32, u32),
    /// `packed-switch`/`sparse-switch`: every case target, plus the
    /// fallthrough (the implicit default case).
    Switch(Vec<u32>, u32),
    /// `return*`.
    Return,
    /// `throw`.
    Throw,
    /// A call site resolved to nothing usable (unresolvable symbol);
    /// per §7 the branch is dead code, not a widening event.
    Dead,
}

/// Decodes and applies the effect of the instruction at `insn.offset`.
pub fn step(
    ctx: &mut AnalyzerContext,
    ma: &mut MethodAccess,
    code: &CodeItem,
    insn: &RawInstruction,
    state: &mut ParseState,
) -> Result<Control, AnalyzerError> {
    match insn.opcode {
        0x00 => Ok(Control::Advance),

        // move / move-wide (non-object): drop the destination binding.
        0x01..=0x06 => {
            drop_reg(state, dest_reg(insn));
            Ok(Control::Advance)
        }
        // move-object family: propagate the source binding set.
        0x07..=0x09 => {
            propagate_move(state, dest_reg(insn), insn.b as u16);
            Ok(Control::Advance)
        }

        0x0a | 0x0b => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0x0c => {
            let returns = ma.current_call_returns.clone();
            bind_or_drop(state, insn.a as u16, returns);
            Ok(Control::Advance)
        }
        0x0d => {
            // move-exception: bind a fresh opaque node for the handler's
            // exception register.
            let node = ma.arena.alloc();
            state.bind(insn.a as u16, [node].into_iter().collect());
            Ok(Control::Advance)
        }

        0x0e => Ok(Control::Return),
        0x0f | 0x10 => Ok(Control::Return),
        0x11 => {
            if let Some(bound) = state.interest_regs.get(&(insn.a as u16)) {
                ma.return_objs.extend(bound.iter().copied());
            }
            Ok(Control::Return)
        }

        // const*: literals never carry object footprint.
        0x12..=0x19 => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        // const-string / const-string/jumbo / const-class: opaque,
        // exempt-by-construction values; nothing to track.
        0x1a..=0x1c => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0x1d | 0x1e => Ok(Control::Advance),
        // check-cast: same register, same binding — no-op.
        0x1f => Ok(Control::Advance),
        // instance-of: boolean result.
        0x20 => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        // array-length: int result.
        0x21 => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        // new-instance / new-array: a fresh, unobserved root.
        0x22 | 0x23 => {
            let node = ma.arena.alloc();
            state.bind(insn.a as u16, [node].into_iter().collect());
            Ok(Control::Advance)
        }
        0x24 => {
            widen_call_args(ma, state, &insn.args[..insn.arg_count as usize]);
            ma.current_call_returns.clear();
            state.affects_try = true;
            Ok(Control::Advance)
        }
        0x25 => {
            let regs: Vec<u16> = (insn.range_base..insn.range_base + insn.range_count).collect();
            widen_call_args(ma, state, &regs);
            ma.current_call_returns.clear();
            state.affects_try = true;
            Ok(Control::Advance)
        }
        // fill-array-data: fills a primitive payload, no object flow.
        0x26 => Ok(Control::Advance),
        0x27 => Ok(Control::Throw),

        0x28 => Ok(Control::Goto((insn.offset as i64 + insn.b) as u32)),
        0x29 => Ok(Control::Goto((insn.offset as i64 + insn.b) as u32)),
        0x2a => Ok(Control::Goto((insn.offset as i64 + insn.b) as u32)),

        0x2b => {
            let data_offset = (insn.offset as i64 + insn.b) as u32;
            let (_first_key, targets) = parse_packed_switch_payload(&code.insns, data_offset, insn.offset)?;
            let targets = targets.into_iter().map(|t| t as u32).collect();
            Ok(Control::Switch(targets, insn.offset + insn.width))
        }
        0x2c => {
            let data_offset = (insn.offset as i64 + insn.b) as u32;
            let pairs = parse_sparse_switch_payload(&code.insns, data_offset, insn.offset)?;
            let targets = pairs.into_iter().map(|(_, t)| t as u32).collect();
            Ok(Control::Switch(targets, insn.offset + insn.width))
        }

        // cmp*: numeric result.
        0x2d..=0x31 => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        // if-* (two-register) / if-*z (zero-compare): pure control flow.
        0x32..=0x3d => Ok(Control::Branch((insn.offset as i64 + insn.b) as u32, insn.offset + insn.width)),
        0x3e..=0x43 => Ok(Control::Advance),

        0x44 => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0x45 => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0x46 => {
            let array_reg = insn.b as u16;
            widen_reg(ma, state, array_reg);
            let bound = state.interest_regs.get(&array_reg).cloned().unwrap_or_default();
            bind_or_drop(state, insn.a as u16, bound);
            state.affects_try = true;
            Ok(Control::Advance)
        }
        0x47..=0x4a => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0x4b | 0x4c => Ok(Control::Advance),
        0x4d => {
            let array_reg = insn.b as u16;
            let value_reg = insn.a as u16;
            widen_reg(ma, state, array_reg);
            widen_reg(ma, state, value_reg);
            state.affects_try = true;
            Ok(Control::Advance)
        }
        0x4e..=0x51 => Ok(Control::Advance),

        // iget*/iput* family. Keyed by the field's linker-resolved
        // canonical index (§4.3), not the raw per-dex-file constant-pool
        // operand, so the same field accessed from two different dex
        // files in the classpath lands on the same `field_set` key.
        0x52 => {
            let Ok(index) = resolve_field_index(ctx, ma, insn.b as u32, false) else { return Ok(Control::Dead) };
            touch_instance(ma, state, insn.c as u16, index);
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0x53 => {
            let Ok(index) = resolve_field_index(ctx, ma, insn.b as u32, false) else { return Ok(Control::Dead) };
            touch_instance(ma, state, insn.c as u16, index);
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0x54 => {
            let Ok(index) = resolve_field_index(ctx, ma, insn.b as u32, false) else { return Ok(Control::Dead) };
            let bound = load_instance_object(ma, state, insn.c as u16, index);
            bind_or_drop(state, insn.a as u16, bound);
            state.affects_try = true;
            Ok(Control::Advance)
        }
        0x55..=0x58 => {
            let Ok(index) = resolve_field_index(ctx, ma, insn.b as u32, false) else { return Ok(Control::Dead) };
            touch_instance(ma, state, insn.c as u16, index);
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0x59 | 0x5a => {
            let Ok(index) = resolve_field_index(ctx, ma, insn.b as u32, false) else { return Ok(Control::Dead) };
            store_instance_scalar(ma, state, insn.c as u16, index);
            Ok(Control::Advance)
        }
        0x5b => {
            let Ok(index) = resolve_field_index(ctx, ma, insn.b as u32, false) else { return Ok(Control::Dead) };
            store_instance_object(ma, state, insn.c as u16, index, insn.a as u16);
            state.affects_try = true;
            Ok(Control::Advance)
        }
        0x5c..=0x5f => {
            let Ok(index) = resolve_field_index(ctx, ma, insn.b as u32, false) else { return Ok(Control::Dead) };
            store_instance_scalar(ma, state, insn.c as u16, index);
            Ok(Control::Advance)
        }

        // sget*/sput* family: owner is the class's global node, not a
        // register. Also keyed by the resolved canonical field index.
        0x60 | 0x61 => {
            let Ok((class, index)) = resolve_field(ctx, ma, insn.b as u32, true) else { return Ok(Control::Dead) };
            touch_static(ctx, ma, class, index);
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0x62 => {
            let Ok((class, index)) = resolve_field(ctx, ma, insn.b as u32, true) else { return Ok(Control::Dead) };
            let bound = load_static_object(ctx, ma, class, index);
            bind_or_drop(state, insn.a as u16, bound);
            Ok(Control::Advance)
        }
        0x63..=0x66 => {
            let Ok((class, index)) = resolve_field(ctx, ma, insn.b as u32, true) else { return Ok(Control::Dead) };
            touch_static(ctx, ma, class, index);
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0x67 | 0x68 => {
            let Ok((class, index)) = resolve_field(ctx, ma, insn.b as u32, true) else { return Ok(Control::Dead) };
            touch_static(ctx, ma, class, index);
            Ok(Control::Advance)
        }
        0x69 => {
            let Ok((class, index)) = resolve_field(ctx, ma, insn.b as u32, true) else { return Ok(Control::Dead) };
            store_static_object(ctx, ma, state, class, index, insn.a as u16);
            Ok(Control::Advance)
        }
        0x6a..=0x6d => {
            let Ok((class, index)) = resolve_field(ctx, ma, insn.b as u32, true) else { return Ok(Control::Dead) };
            touch_static(ctx, ma, class, index);
            Ok(Control::Advance)
        }

        0x6e..=0x72 => {
            let kind = invoke_kind_35c(insn.opcode);
            let regs = &insn.args[..insn.arg_count as usize];
            let regs: Vec<u16> = regs.iter().map(|&r| r as u16).collect();
            match driver::invoke(ctx, ma, state, kind, insn.b as u32, &regs)? {
                driver::InvokeOutcome::Resolved => {
                    state.affects_try = true;
                    Ok(Control::Advance)
                }
                driver::InvokeOutcome::UnresolvedSymbol => Ok(Control::Dead),
            }
        }
        0x73 => Ok(Control::Advance),
        0x74..=0x78 => {
            let kind = invoke_kind_3rc(insn.opcode);
            let regs: Vec<u16> = (insn.range_base..insn.range_base + insn.range_count).collect();
            match driver::invoke(ctx, ma, state, kind, insn.b as u32, &regs)? {
                driver::InvokeOutcome::Resolved => {
                    state.affects_try = true;
                    Ok(Control::Advance)
                }
                driver::InvokeOutcome::UnresolvedSymbol => Ok(Control::Dead),
            }
        }
        0x79 | 0x7a => Ok(Control::Advance),

        // unop / binop / binop-2addr / binop-lit16 / binop-lit8: no
        // object ever flows through purely numeric opcodes.
        0x7b..=0x8f => {
            drop_reg(state, dest_reg(insn));
            Ok(Control::Advance)
        }
        0x90..=0xaf => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0xb0..=0xcf => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0xd0..=0xd7 => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0xd8..=0xe2 => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
        0xe3..=0xf9 => Ok(Control::Advance),

        // invoke-polymorphic / invoke-custom: call sites this analyzer
        // cannot resolve statically (method handle / call-site
        // constants); widen whatever registers are involved and move
        // on rather than failing the whole method.
        0xfa => {
            let regs = &insn.args[..insn.arg_count as usize];
            let regs: Vec<u16> = regs.iter().map(|&r| r as u16).collect();
            widen_call_args(ma, state, &regs);
            ma.current_call_returns.clear();
            state.affects_try = true;
            Ok(Control::Advance)
        }
        0xfb => {
            let regs: Vec<u16> = (insn.range_base..insn.range_base + insn.range_count).collect();
            widen_call_args(ma, state, &regs);
            ma.current_call_returns.clear();
            state.affects_try = true;
            Ok(Control::Advance)
        }
        0xfc => {
            let regs = &insn.args[..insn.arg_count as usize];
            let regs: Vec<u16> = regs.iter().map(|&r| r as u16).collect();
            widen_call_args(ma, state, &regs);
            ma.current_call_returns.clear();
            state.affects_try = true;
            Ok(Control::Advance)
        }
        0xfd => {
            let regs: Vec<u16> = (insn.range_base..insn.range_base + insn.range_count).collect();
            widen_call_args(ma, state, &regs);
            ma.current_call_returns.clear();
            state.affects_try = true;
            Ok(Control::Advance)
        }
        0xfe | 0xff => {
            drop_reg(state, insn.a as u16);
            Ok(Control::Advance)
        }
    }
}

fn dest_reg(insn: &RawInstruction) -> u16 {
    insn.a as u16
}

fn drop_reg(state: &mut ParseState, reg: u16) {
    state.interest_regs.remove(&reg);
}

fn bind_or_drop(state: &mut ParseState, reg: u16, set: AHashSet<NodeId>) {
    if set.is_empty() {
        state.interest_regs.remove(&reg);
    } else {
        state.interest_regs.insert(reg, set);
    }
}

fn propagate_move(state: &mut ParseState, dest: u16, src: u16) {
    match state.interest_regs.get(&src).cloned() {
        Some(set) => bind_or_drop(state, dest, set),
        None => drop_reg(state, dest),
    }
}

/// Touches field `field_idx` on every object bound to `obj_reg` purely
/// for bookkeeping (non-reference load/store): ensures the field's
/// canonical child exists so §4.7-style footprint queries see it, but
/// does not change any register binding.
fn touch_instance(ma: &mut MethodAccess, state: &ParseState, obj_reg: u16, field_idx: u32) {
    let Some(objs) = state.interest_regs.get(&obj_reg).cloned() else { return };
    for obj in objs {
        ensure_field(ma, obj, field_idx);
    }
}

fn store_instance_scalar(ma: &mut MethodAccess, state: &ParseState, obj_reg: u16, field_idx: u32) {
    let Some(objs) = state.interest_regs.get(&obj_reg).cloned() else { return };
    for obj in objs {
        let child = ensure_field(ma, obj, field_idx);
        ma.arena.get_mut(obj).null_branch_flags.remove(&field_idx);
        let _ = child;
    }
}

fn load_instance_object(ma: &mut MethodAccess, state: &ParseState, obj_reg: u16, field_idx: u32) -> AHashSet<NodeId> {
    let Some(objs) = state.interest_regs.get(&obj_reg).cloned() else { return AHashSet::default() };
    let mut out = AHashSet::default();
    for obj in objs {
        if ma.arena.any_ancestor_all_flag(obj) {
            continue;
        }
        ensure_field(ma, obj, field_idx);
        if let Some(members) = ma.arena.get(obj).track_set.get(&field_idx) {
            out.extend(members.iter().copied());
        }
    }
    out
}

fn store_instance_object(ma: &mut MethodAccess, state: &ParseState, obj_reg: u16, field_idx: u32, value_reg: u16) {
    let Some(objs) = state.interest_regs.get(&obj_reg).cloned() else { return };
    let values = state.interest_regs.get(&value_reg).cloned().unwrap_or_default();
    for obj in objs {
        replace_field_track(ma, obj, field_idx, &values);
    }
}

fn load_static_object(ctx: &mut AnalyzerContext, ma: &mut MethodAccess, class: offload_dex::link::ClassId, field_idx: u32) -> AHashSet<NodeId> {
    let _ = ctx;
    let owner = ma.global_class_node(class);
    ensure_field(ma, owner, field_idx);
    ma.arena.get(owner).track_set.get(&field_idx).cloned().unwrap_or_default()
}

fn store_static_object(
    ctx: &mut AnalyzerContext,
    ma: &mut MethodAccess,
    state: &ParseState,
    class: offload_dex::link::ClassId,
    field_idx: u32,
    value_reg: u16,
) {
    let _ = ctx;
    let owner = ma.global_class_node(class);
    let values = state.interest_regs.get(&value_reg).cloned().unwrap_or_default();
    replace_field_track(ma, owner, field_idx, &values);
}

fn touch_static(ctx: &mut AnalyzerContext, ma: &mut MethodAccess, class: offload_dex::link::ClassId, field_idx: u32) {
    let _ = ctx;
    let owner = ma.global_class_node(class);
    ensure_field(ma, owner, field_idx);
}

/// Resolves a static field's declaring class and its linker-assigned
/// canonical index (§4.3: "field offsets are computed by the linker and
/// are stable"), so a field reached through two different dex files in
/// the classpath (e.g. an inherited field touched from both a framework
/// class and an APK override) keys onto the same `field_set` slot.
fn resolve_field(
    ctx: &mut AnalyzerContext,
    ma: &MethodAccess,
    field_idx: u32,
    is_static: bool,
) -> Result<(offload_dex::link::ClassId, u32), AnalyzerError> {
    let dex = ctx.linker.method(ma.method).dex;
    let field = if is_static {
        ctx.linker.resolve_static_field(dex, field_idx)?
    } else {
        ctx.linker.resolve_instance_field(dex, field_idx)?
    };
    let linked = ctx.linker.field(field);
    Ok((linked.owner, linked.index))
}

/// Same resolution as [resolve_field], for instance field accesses that
/// only need the canonical index — the owning object is whatever's
/// bound to the instruction's own object register, not a class node.
fn resolve_field_index(ctx: &mut AnalyzerContext, ma: &MethodAccess, field_idx: u32, is_static: bool) -> Result<u32, AnalyzerError> {
    resolve_field(ctx, ma, field_idx, is_static).map(|(_, index)| index)
}

/// Ensures `owner.field_set[field_idx]` exists, creating a fresh
/// canonical child (and seeding `track_set[field_idx]` with it, per
/// invariant 2) on first touch.
pub(crate) fn ensure_field(ma: &mut MethodAccess, owner: NodeId, field_idx: u32) -> NodeId {
    if ma.arena.any_ancestor_all_flag(owner) {
        return owner;
    }
    if let Some(&child) = ma.arena.get(owner).field_set.get(&field_idx) {
        return child;
    }
    let child = ma.arena.alloc_child(owner);
    ma.arena.get_mut(owner).field_set.insert(field_idx, child);
    ma.arena.get_mut(owner).track_set.entry(field_idx).or_default().insert(child);
    child
}

/// `iput-object`-style store: the field's track set is replaced by
/// `values` (always including the canonical child, per invariant 2),
/// and `in_array` propagates from whatever was stored.
fn replace_field_track(ma: &mut MethodAccess, owner: NodeId, field_idx: u32, values: &AHashSet<NodeId>) {
    if ma.arena.any_ancestor_all_flag(owner) {
        return;
    }
    let canonical = ensure_field(ma, owner, field_idx);
    let mut replacement = values.clone();
    replacement.insert(canonical);
    let any_in_array = values.iter().any(|&v| ma.arena.get(v).in_array);
    if any_in_array {
        ma.arena.get_mut(canonical).in_array = true;
    }
    ma.arena.get_mut(owner).track_set.insert(field_idx, replacement);
    ma.arena.get_mut(owner).null_branch_flags.remove(&field_idx);
}

fn widen_reg(ma: &mut MethodAccess, state: &ParseState, reg: u16) {
    let Some(objs) = state.interest_regs.get(&reg) else { return };
    let objs: Vec<NodeId> = objs.iter().copied().collect();
    for obj in objs {
        ma.arena.get_mut(obj).in_array = true;
        ma.arena.widen_all(obj);
    }
}

fn widen_call_args(ma: &mut MethodAccess, state: &ParseState, regs: &[u16]) {
    for &reg in regs {
        if let Some(objs) = state.interest_regs.get(&reg) {
            let objs: Vec<NodeId> = objs.iter().copied().collect();
            for obj in objs {
                ma.arena.widen_all(obj);
            }
        }
    }
}

pub(crate) fn invoke_kind_35c(opcode: u8) -> InvokeKind {
    match opcode {
        0x6e => InvokeKind::Virtual,
        0x6f => InvokeKind::Super,
        0x70 => InvokeKind::Direct,
        0x71 => InvokeKind::Static,
        0x72 => InvokeKind::Interface,
        _ => unreachable!("invoke_kind_35c called with non-invoke opcode"),
    }
}

pub(crate) fn invoke_kind_3rc(opcode: u8) -> InvokeKind {
    match opcode {
        0x74 => InvokeKind::Virtual,
        0x75 => InvokeKind::Super,
        0x76 => InvokeKind::Direct,
        0x77 => InvokeKind::Static,
        0x78 => InvokeKind::Interface,
        _ => unreachable!("invoke_kind_3rc called with non-invoke opcode"),
    }
}
