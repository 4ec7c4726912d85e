//! The global reachability pass (§4.7): a simpler, monotone sibling of
//! the main path engine. It answers two whole-program questions —
//! which static fields are ever touched, and which methods are ever
//! reachable from an entry point — without any of the per-path object
//! modeling `value`/`interp`/`path` do.
//!
//! Because reachability is monotone (a method or field, once reached,
//! stays reached), a cycle in the call graph just needs a visited-set
//! short-circuit; there is no widening to perform.

use ahash::{AHashMap, AHashSet};

use offload_dex::dex::CodeItem;
use offload_dex::instr::{parse_packed_switch_payload, parse_sparse_switch_payload, RawInstruction};
use offload_dex::link::{ClassId, InvokeKind, MethodId};

use crate::context::AnalyzerContext;
use crate::driver;
use crate::errors::AnalyzerError;
use crate::interp::{invoke_kind_35c, invoke_kind_3rc};

/// Accumulated result of a whole-program reachability pass.
#[derive(Debug, Default)]
pub struct Reachability {
    pub reachable_methods: AHashSet<MethodId>,
    /// Per-class set of static-field indices touched by any reachable
    /// method (`sget*`/`sput*`), keyed the same way `LinkedField::index`
    /// is, so this can be read directly as a bitset.
    pub static_field_touches: AHashMap<ClassId, AHashSet<u32>>,
}

impl Reachability {
    pub fn new() -> Reachability {
        Reachability::default()
    }

    /// Walks the call graph from `entry`, recording every method and
    /// static field it can reach.
    pub fn run(&mut self, ctx: &mut AnalyzerContext, entry: MethodId) -> Result<(), AnalyzerError> {
        self.visit_method(ctx, entry)
    }

    fn visit_method(&mut self, ctx: &mut AnalyzerContext, method: MethodId) -> Result<(), AnalyzerError> {
        if !self.reachable_methods.insert(method) {
            return Ok(());
        }

        let linked = ctx.linker.method(method).clone();
        if linked.is_native() || linked.is_abstract() {
            return Ok(());
        }
        let Some(code) = ctx.linker.dex(linked.dex).get_code_item(linked.code_off)? else {
            return Ok(());
        };

        let mut worklist = vec![0u32];
        let mut visited_offsets: AHashSet<u32> = AHashSet::default();

        // Call targets discovered while walking this method's body are
        // collected first and visited after the scan completes, so the
        // borrow on `code`/`ctx.linker` from decoding doesn't overlap
        // with the recursive analysis of a callee.
        let mut calls: Vec<(InvokeKind, u32)> = Vec::new();

        while let Some(pc) = worklist.pop() {
            if !visited_offsets.insert(pc) {
                continue;
            }
            let Ok(insn) = RawInstruction::decode(&code.insns, pc) else { continue };

            if let Some(handler) = code.handler_for_offset(insn.offset) {
                for pair in &handler.handlers {
                    worklist.push(pair.addr);
                }
                if let Some(addr) = handler.catch_all_addr {
                    worklist.push(addr);
                }
            }

            match insn.opcode {
                0x60 | 0x61 | 0x62 | 0x63 | 0x64 | 0x65 | 0x66 | 0x67 | 0x68 | 0x69 | 0x6a | 0x6b | 0x6c | 0x6d => {
                    self.touch_static_field(ctx, linked.dex, insn.b as u32)?;
                    worklist.push(insn.offset + insn.width);
                }
                0x6e..=0x72 => {
                    calls.push((invoke_kind_35c(insn.opcode), insn.b as u32));
                    worklist.push(insn.offset + insn.width);
                }
                0x74..=0x78 => {
                    calls.push((invoke_kind_3rc(insn.opcode), insn.b as u32));
                    worklist.push(insn.offset + insn.width);
                }
                0x28 | 0x29 | 0x2a => {
                    worklist.push((insn.offset as i64 + insn.b) as u32);
                }
                0x32..=0x3d => {
                    worklist.push((insn.offset as i64 + insn.b) as u32);
                    worklist.push(insn.offset + insn.width);
                }
                0x2b => {
                    let data_offset = (insn.offset as i64 + insn.b) as u32;
                    if let Ok((_, targets)) = parse_packed_switch_payload(&code.insns, data_offset, insn.offset) {
                        worklist.extend(targets.into_iter().map(|t| t as u32));
                    }
                    worklist.push(insn.offset + insn.width);
                }
                0x2c => {
                    let data_offset = (insn.offset as i64 + insn.b) as u32;
                    if let Ok(pairs) = parse_sparse_switch_payload(&code.insns, data_offset, insn.offset) {
                        worklist.extend(pairs.into_iter().map(|(_, t)| t as u32));
                    }
                    worklist.push(insn.offset + insn.width);
                }
                0x0e..=0x11 | 0x27 => {}
                _ => {
                    worklist.push(insn.offset + insn.width);
                }
            }
        }

        for (kind, method_idx) in calls {
            self.visit_call_site(ctx, linked.dex, kind, method_idx)?;
        }

        Ok(())
    }

    fn touch_static_field(&mut self, ctx: &mut AnalyzerContext, dex: offload_dex::link::DexId, field_idx: u32) -> Result<(), AnalyzerError> {
        let field = match ctx.linker.resolve_static_field(dex, field_idx) {
            Ok(f) => f,
            Err(_) => return Ok(()),
        };
        let linked_field = ctx.linker.field(field);
        self.static_field_touches.entry(linked_field.owner).or_default().insert(linked_field.index);
        Ok(())
    }

    fn visit_call_site(
        &mut self,
        ctx: &mut AnalyzerContext,
        dex: offload_dex::link::DexId,
        kind: InvokeKind,
        method_idx: u32,
    ) -> Result<(), AnalyzerError> {
        let resolved = match kind {
            InvokeKind::Super => {
                // Whole-program reachability has no single "calling
                // method" context once queued outside its caller's
                // stack frame, so super dispatch here just resolves
                // against the declared owner like a virtual call would
                // from any subclass; this only affects precision of
                // which exact override is marked reachable; static
                // field flow is unaffected.
                ctx.linker.resolve_method(dex, method_idx, InvokeKind::Virtual)
            }
            _ => ctx.linker.resolve_method(dex, method_idx, kind),
        };
        let Ok(resolved) = resolved else { return Ok(()) };

        for target in driver::enumerate_targets(ctx, kind, resolved) {
            self.visit_method(ctx, target)?;
        }
        Ok(())
    }
}
