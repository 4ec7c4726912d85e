//! The inter-procedural driver (§4.5): resolves one `invoke-*` call
//! site to its possible runtime targets, analyzes (or recalls the
//! memoized analysis of) each target, and folds the result back into
//! the caller's graph.

use ahash::{AHashMap, AHashSet};

use offload_dex::dex::AccessFlags;
use offload_dex::link::{ClassId, InvokeKind, MethodId};

use crate::context::AnalyzerContext;
use crate::errors::AnalyzerError;
use crate::path::{self, ParseState};
use crate::value::{MethodAccess, NodeId};

/// Whether a call site actually resolved to something the driver could
/// enumerate targets for, or the symbol itself failed to resolve.
pub(crate) enum InvokeOutcome {
    Resolved,
    /// Unresolvable method symbol (§7): the caller must terminate the
    /// active path rather than advance past this instruction.
    UnresolvedSymbol,
}

/// Steps a single call site: resolves `method_idx` under `kind` against
/// the caller's own dex, enumerates its possible runtime targets,
/// analyzes each, and merges their footprints into `ma`. `regs` are the
/// invoke's argument registers, receiver first for instance dispatch.
pub fn invoke(
    ctx: &mut AnalyzerContext,
    ma: &mut MethodAccess,
    state: &mut ParseState,
    kind: InvokeKind,
    method_idx: u32,
    regs: &[u16],
) -> Result<InvokeOutcome, AnalyzerError> {
    let dex = ctx.linker.method(ma.method).dex;

    let resolved = match kind {
        InvokeKind::Super => {
            let declaring_class = ctx.linker.method(ma.method).owner;
            match ctx.linker.class(declaring_class).super_class {
                Some(super_class) => ctx.linker.resolve_method_in_class(super_class, dex, method_idx),
                None => ctx.linker.resolve_method(dex, method_idx, kind),
            }
        }
        _ => ctx.linker.resolve_method(dex, method_idx, kind),
    };

    let resolved = match resolved {
        Ok(m) => m,
        Err(_) => {
            // Unresolvable symbol (missing dependency jar, obfuscated
            // reflection target, etc): per §7 the active path is
            // terminated, not widened — the branch is dead code.
            return Ok(InvokeOutcome::UnresolvedSymbol);
        }
    };

    let targets = enumerate_targets(ctx, kind, resolved);

    if targets.is_empty() || targets.len() > ctx.config.max_sub_count {
        widen_regs(ma, state, regs);
        ma.current_call_returns.clear();
        return Ok(InvokeOutcome::Resolved);
    }

    let mut combined_returns: AHashSet<NodeId> = AHashSet::default();
    for target in targets {
        if should_widen_target(ctx, target) {
            widen_regs(ma, state, regs);
            continue;
        }
        if ctx.is_on_call_chain(target) {
            // Direct or mutual recursion: widen rather than loop the
            // driver forever re-entering the same method.
            widen_regs(ma, state, regs);
            continue;
        }

        let callee = obtain_method_access(ctx, target)?;
        let returns = merge_method_args(ma, state, regs, &callee);
        combined_returns.extend(returns);
    }
    ma.current_call_returns = combined_returns;
    Ok(InvokeOutcome::Resolved)
}

pub(crate) fn should_widen_target(ctx: &AnalyzerContext, target: MethodId) -> bool {
    let method = ctx.linker.method(target);
    if method.is_native() || method.is_abstract() {
        return true;
    }
    ctx.linker.is_exempt(method.owner)
}

/// Every class a virtual call could actually dispatch to at runtime:
/// the resolved method's declaring class plus every transitive
/// subclass, each contributing whatever method occupies the same
/// vtable slot (inherited or overridden).
pub(crate) fn enumerate_targets(ctx: &AnalyzerContext, kind: InvokeKind, resolved: MethodId) -> Vec<MethodId> {
    match kind {
        InvokeKind::Static | InvokeKind::Direct | InvokeKind::Super => vec![resolved],
        InvokeKind::Virtual => {
            let Some(slot) = ctx.linker.method(resolved).vtable_index else {
                return vec![resolved];
            };
            let owner = ctx.linker.method(resolved).owner;
            let mut targets = AHashSet::default();
            targets.insert(resolved);
            for class in transitive_subclasses(ctx, owner) {
                if let Some(&m) = ctx.linker.class(class).vtable.get(slot as usize) {
                    targets.insert(m);
                }
            }
            targets.into_iter().collect()
        }
        InvokeKind::Interface => {
            let owner = ctx.linker.method(resolved).owner;
            let mut targets = AHashSet::default();
            targets.insert(resolved);
            for implementer in ctx.linker.find_implementers(owner) {
                let class = ctx.linker.class(*implementer);
                if let Some((_, slots)) = class.iftable.iter().find(|(iface, _)| *iface == owner) {
                    if let Some(decl_slot) = ctx.linker.method(resolved).iface_slot {
                        if let Some(&vtable_slot) = slots.get(decl_slot as usize) {
                            if let Some(&m) = class.vtable.get(vtable_slot as usize) {
                                targets.insert(m);
                            }
                        }
                    }
                }
            }
            targets.into_iter().collect()
        }
    }
}

/// `find_subclasses` only returns direct children; virtual dispatch
/// needs the full transitive closure, since any descendant can
/// contribute a vtable override.
pub(crate) fn transitive_subclasses(ctx: &AnalyzerContext, class: ClassId) -> Vec<ClassId> {
    let mut out = Vec::new();
    let mut stack: Vec<ClassId> = ctx.linker.find_subclasses(class).to_vec();
    let mut seen = AHashSet::default();
    while let Some(c) = stack.pop() {
        if !seen.insert(c) {
            continue;
        }
        out.push(c);
        stack.extend(ctx.linker.find_subclasses(c));
    }
    out
}

/// Entry point for analyzing one method directly (the CLI's full
/// footprint pass walks every method in the target APK through this),
/// as opposed to `invoke`'s call-site-driven recursion into it.
pub fn analyze_method(ctx: &mut AnalyzerContext, method: MethodId) -> Result<MethodAccess, AnalyzerError> {
    obtain_method_access(ctx, method)
}

/// Returns the target's analysis, consulting the in-memory cache, then
/// on-disk memoization, before finally parsing it from scratch.
fn obtain_method_access(ctx: &mut AnalyzerContext, target: MethodId) -> Result<MethodAccess, AnalyzerError> {
    if let Some(cached) = ctx.parsed_method_index.get(&target) {
        return Ok(cached.clone());
    }

    if let Some(persistence) = ctx.persistence.as_mut() {
        if let Some(record) = persistence.lookup(&ctx.linker, target)? {
            let graph = persistence.load_graph(record)?;
            let ma = persistence.from_graph(&mut ctx.linker, target, &graph)?;
            ctx.parsed_method_index.insert(target, ma.clone());
            return Ok(ma);
        }
    }

    let ma = parse_method_fresh(ctx, target)?;

    if let Some(persistence) = ctx.persistence.as_mut() {
        let mut for_store = ma.clone();
        persistence.store(&ctx.linker, target, &mut for_store)?;
    }
    ctx.parsed_method_index.insert(target, ma.clone());
    Ok(ma)
}

/// Builds fresh argument roots for `target` (one per object/array
/// parameter, including the receiver) and runs the path engine over
/// its body from scratch.
fn parse_method_fresh(ctx: &mut AnalyzerContext, target: MethodId) -> Result<MethodAccess, AnalyzerError> {
    let method = ctx.linker.method(target).clone();
    let dex_id = method.dex;

    let mut ma = MethodAccess::new(target);

    let code = ctx.linker.dex(dex_id).get_code_item(method.code_off)?;
    let Some(code) = code else {
        // native/abstract: no body to interpret. Reachable parameters
        // are conservatively opaque roots with no further structure.
        return Ok(ma);
    };

    let is_static = method.access_flags.contains(AccessFlags::STATIC);
    let method_item = &ctx.linker.dex(dex_id).method_ids[method.method_idx as usize];
    let shorty = method_item
        .get_prototype(ctx.linker.dex(dex_id))
        .and_then(|p| p.view(ctx.linker.dex(dex_id)).descriptor())
        .map(|s| s.into_owned())
        .unwrap_or_default();

    let mut state = ParseState::entry(0);
    let mut reg = code.registers_size - code.ins_size;

    if !is_static {
        let node = ma.arena.alloc();
        ma.args.push(node);
        state.bind(reg, [node].into_iter().collect());
        reg += 1;
    }

    // shorty[0] is the return type; parameters follow in order.
    for ch in shorty.chars().skip(1) {
        match ch {
            'J' | 'D' => {
                reg += 2;
            }
            'L' => {
                let node = ma.arena.alloc();
                ma.args.push(node);
                state.bind(reg, [node].into_iter().collect());
                reg += 1;
            }
            _ => {
                reg += 1;
            }
        }
    }

    ctx.call_chain.push(target);
    let result = path::parse_method(ctx, &mut ma, &code, state);
    ctx.call_chain.pop();
    result?;

    Ok(ma)
}

fn widen_regs(ma: &mut MethodAccess, state: &ParseState, regs: &[u16]) {
    for &reg in regs {
        if let Some(objs) = state.interest_regs.get(&reg) {
            let objs: Vec<NodeId> = objs.iter().copied().collect();
            for obj in objs {
                ma.arena.widen_all(obj);
            }
        }
    }
}

/// Folds a callee's footprint into the caller's graph at a call site:
/// the callee's argument roots are identified with whatever objects
/// the caller's registers are actually bound to, its `global_classes`
/// roots are identified by `ClassId` with the caller's own, and
/// everything else in the callee's arena is copied across under fresh
/// ids.
///
/// An "address map" (`callee id -> caller id`) is built incrementally
/// as the merge walks the callee graph, so a cyclic callee graph only
/// ever allocates one caller-side node per callee node. Field-set
/// members (the canonical per-field child) are merged first and
/// protected from being overwritten by a track-set member absorbed
/// from a wider, less precise branch of the callee — track_set always
/// contains its field's canonical child (invariant 2), so copying
/// field_set first and then folding track_set into the existing
/// mapping preserves that invariant on the caller's side too.
pub fn merge_method_args(ma: &mut MethodAccess, state: &ParseState, regs: &[u16], callee: &MethodAccess) -> AHashSet<NodeId> {
    let mut addr_map: AHashMap<NodeId, NodeId> = AHashMap::default();

    // Seed the map from the objects actually bound to the caller's
    // argument registers, so the callee's field touches land on the
    // real argument rather than an orphaned node.
    for (i, &callee_root) in callee.args.iter().enumerate() {
        let Some(&reg) = regs.get(i) else { continue };
        let callers = state.interest_regs.get(&reg).cloned().unwrap_or_default();
        match callers.len() {
            // No tracked binding (a non-object value, or an object
            // already widened away): still need a synthesized caller
            // node so the callee's field structure has somewhere to
            // land.
            0 => {
                caller_node_for(ma, &mut addr_map, callee, callee_root);
            }
            1 => {
                let caller_root = callers.into_iter().next().unwrap();
                addr_map.insert(callee_root, caller_root);
            }
            // More than one object could be bound to this register (a
            // join of several branches reaching this call site with
            // different receivers); rather than cloning the callee's
            // substructure onto each candidate, widen every one of
            // them — sound, if less precise, and consistent with how
            // every other multi-target ambiguity in this engine is
            // resolved.
            _ => {
                let proxy = caller_node_for(ma, &mut addr_map, callee, callee_root);
                for obj in callers {
                    ma.arena.widen_all(obj);
                }
                ma.arena.widen_all(proxy);
            }
        }
    }

    for (&class, &callee_root) in &callee.global_classes {
        let caller_root = ma.global_class_node(class);
        addr_map.insert(callee_root, caller_root);
    }

    // Expand the map over every node reachable from a seed, copying
    // field_set edges (and creating their canonical children) before
    // track_set, per the invariant note above.
    let mut frontier: Vec<NodeId> = addr_map.keys().copied().collect();
    let mut seen: AHashSet<NodeId> = frontier.iter().copied().collect();
    while let Some(callee_id) = frontier.pop() {
        let callee_node = callee.arena.get(callee_id);
        let caller_id = addr_map[&callee_id];

        if callee_node.all_flag {
            ma.arena.widen_all(caller_id);
        }
        if callee_node.in_array {
            ma.arena.get_mut(caller_id).in_array = true;
        }

        let field_children: Vec<(u32, NodeId)> = callee_node.field_set.iter().map(|(&f, &c)| (f, c)).collect();
        for (field_idx, callee_child) in field_children {
            let caller_child = caller_node_for(ma, &mut addr_map, callee, callee_child);
            ma.arena.get_mut(caller_id).field_set.entry(field_idx).or_insert(caller_child);
            ma.arena
                .get_mut(caller_id)
                .track_set
                .entry(field_idx)
                .or_default()
                .insert(caller_child);
            if seen.insert(callee_child) {
                frontier.push(callee_child);
            }
        }

        let track_entries: Vec<(u32, Vec<NodeId>)> = callee_node
            .track_set
            .iter()
            .map(|(&f, set)| (f, set.iter().copied().collect()))
            .collect();
        for (field_idx, members) in track_entries {
            for callee_member in members {
                let caller_member = caller_node_for(ma, &mut addr_map, callee, callee_member);
                ma.arena.get_mut(caller_id).track_set.entry(field_idx).or_default().insert(caller_member);
                if seen.insert(callee_member) {
                    frontier.push(callee_member);
                }
            }
        }

        for &null_field in &callee_node.null_branch_flags {
            ma.arena.get_mut(caller_id).null_branch_flags.insert(null_field);
        }
    }

    callee.return_objs.iter().filter_map(|&r| addr_map.get(&r).copied()).collect()
}

fn caller_node_for(
    ma: &mut MethodAccess,
    addr_map: &mut AHashMap<NodeId, NodeId>,
    callee: &MethodAccess,
    callee_id: NodeId,
) -> NodeId {
    if let Some(&caller_id) = addr_map.get(&callee_id) {
        return caller_id;
    }
    let belonging = callee.arena.get(callee_id).belonging;
    let caller_parent = belonging.map(|p| caller_node_for(ma, addr_map, callee, p));
    let caller_id = match caller_parent {
        Some(parent) => ma.arena.alloc_child(parent),
        None => ma.arena.alloc(),
    };
    addr_map.insert(callee_id, caller_id);
    caller_id
}
