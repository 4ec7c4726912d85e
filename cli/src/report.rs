//! Text artifacts for the legacy global-reachability pass (§6):
//! `staticresult.txt`, `offsetresult.txt`, `reachablemethod.txt` and
//! `reachableoffset.txt`. These sit outside `offload_persist` because
//! they describe the reachability pass's own result shape, not the
//! per-method graph memoization format that crate owns.

use std::fs;
use std::path::Path;

use anyhow::Result;
use offload_analyzer::context::AnalyzerContext;
use offload_analyzer::persist_bridge::declaration_index;
use offload_analyzer::reachability::Reachability;

/// Writes the four legacy-mode report files under `dir`, which must
/// already exist (the caller creates `<cache>/<package>/` up front).
pub fn write_reports(dir: &Path, ctx: &AnalyzerContext, result: &Reachability) -> Result<()> {
    write_static_result(dir, ctx, result)?;
    write_offset_result(dir, ctx, result)?;
    write_reachable_method(dir, ctx, result)?;
    write_reachable_offset(dir, ctx, result)?;
    Ok(())
}

fn write_static_result(dir: &Path, ctx: &AnalyzerContext, result: &Reachability) -> Result<()> {
    let mut out = String::new();
    let mut classes: Vec<_> = result.static_field_touches.keys().copied().collect();
    classes.sort_by_key(|c| ctx.linker.class(*c).descriptor.clone());
    for class in classes {
        let descriptor = &ctx.linker.class(class).descriptor;
        let mut indices: Vec<u32> = result.static_field_touches[&class].iter().copied().collect();
        indices.sort_unstable();
        for index in indices {
            out.push_str(descriptor);
            out.push(' ');
            out.push_str(&index.to_string());
            out.push('\n');
        }
    }
    fs::write(dir.join("staticresult.txt"), out)?;
    Ok(())
}

/// Per-class field-touch counts, a coarser summary of the same data as
/// `staticresult.txt`, matching the original's split between a full
/// listing and an at-a-glance offset tally.
fn write_offset_result(dir: &Path, ctx: &AnalyzerContext, result: &Reachability) -> Result<()> {
    let mut out = String::new();
    let mut classes: Vec<_> = result.static_field_touches.keys().copied().collect();
    classes.sort_by_key(|c| ctx.linker.class(*c).descriptor.clone());
    for class in classes {
        let descriptor = &ctx.linker.class(class).descriptor;
        let count = result.static_field_touches[&class].len();
        out.push_str(&format!("{descriptor} {count}\n"));
    }
    fs::write(dir.join("offsetresult.txt"), out)?;
    Ok(())
}

fn write_reachable_method(dir: &Path, ctx: &AnalyzerContext, result: &Reachability) -> Result<()> {
    let mut lines: Vec<String> = result
        .reachable_methods
        .iter()
        .map(|&m| {
            let method = ctx.linker.method(m);
            let class = &ctx.linker.class(method.owner).descriptor;
            let dex = ctx.linker.dex(method.dex);
            let name = dex
                .method_ids
                .get(method.method_idx as usize)
                .and_then(|item| item.get_name(dex))
                .map(|s| s.into_owned())
                .unwrap_or_default();
            format!("{class}->{name}")
        })
        .collect();
    lines.sort();
    let mut out = lines.join("\n");
    out.push('\n');
    fs::write(dir.join("reachablemethod.txt"), out)?;
    Ok(())
}

/// `class method_index` pairs, the offset-keyed counterpart to
/// `reachablemethod.txt` matching how `poff.bin` keys a method.
fn write_reachable_offset(dir: &Path, ctx: &AnalyzerContext, result: &Reachability) -> Result<()> {
    let mut lines: Vec<(String, u32)> = result
        .reachable_methods
        .iter()
        .map(|&m| {
            let method = ctx.linker.method(m);
            let class = ctx.linker.class(method.owner);
            let descriptor = class.descriptor.clone();
            let index = declaration_index(class, m);
            (descriptor, index)
        })
        .collect();
    lines.sort();
    let mut out = String::new();
    for (descriptor, index) in lines {
        out.push_str(&format!("{descriptor} {index}\n"));
    }
    fs::write(dir.join("reachableoffset.txt"), out)?;
    Ok(())
}
