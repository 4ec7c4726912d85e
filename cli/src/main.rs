//! Legacy argv entry point (§6): two modes behind one binary, kept
//! deliberately free of a parsing framework since neither mode's exit
//! contract matches what one provides.
//!
//! `analyze -s <apk>` runs the full per-method footprint pass and
//! memoizes every method's graph under `<cache>/<package>/`.
//! `analyze <apk>` runs the older whole-program reachability pass and
//! writes its four summary reports to the same directory. Any other
//! argument count prints usage and exits 0; a failure to initialize
//! (unreadable APK, missing bootstrap jar, unreadable cache directory)
//! exits non-zero.

mod bootstrap;
mod package_name;
mod report;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use offload_analyzer::context::AnalyzerContext;
use offload_analyzer::driver;
use offload_analyzer::reachability::Reachability;
use offload_analyzer::AnalyzerConfig;
use offload_dex::link::Linker;
use offload_dex::Dex;
use offload_zip::ZipEntry;

use package_name::{resolve_or_file_stem, ManifestPackageNameResolver};

enum Mode {
    FullFootprint,
    LegacyReachability,
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let (mode, apk_path) = match args.len() {
        2 => (Mode::LegacyReachability, args[1].as_str()),
        3 if args[1] == "-s" => (Mode::FullFootprint, args[2].as_str()),
        _ => {
            print_usage(&args[0]);
            return ExitCode::SUCCESS;
        }
    };

    match run(mode, Path::new(apk_path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_usage(program: &str) {
    println!("usage: {program} [-s] <apk>");
    println!("  {program} <apk>       run the whole-program reachability pass");
    println!("  {program} -s <apk>    compute per-method migration footprints");
}

fn run(mode: Mode, apk_path: &Path) -> Result<()> {
    let mut linker = Linker::new();
    bootstrap::load_bootstrap_classpath(&mut linker).context("initializing bootstrap classpath")?;

    let apk_bytes = std::fs::read(apk_path).with_context(|| format!("reading {}", apk_path.display()))?;
    let apk_zip = ZipEntry::new(apk_bytes).with_context(|| format!("parsing {} as a zip archive", apk_path.display()))?;

    let dex_names: Vec<String> = apk_zip.namelist().filter(|n| n.starts_with("classes") && n.ends_with(".dex")).cloned().collect();
    if dex_names.is_empty() {
        anyhow::bail!("{} contains no classes*.dex entry", apk_path.display());
    }

    let mut target_dex_ids = Vec::new();
    for name in &dex_names {
        let (data, _) = apk_zip.read(name)?;
        let dex = Dex::new(data).with_context(|| format!("parsing {name} in {}", apk_path.display()))?;
        if !dex.verify_checksum() {
            log::warn!("{name} in {} failed its adler32 checksum; parsing anyway", apk_path.display());
        }
        target_dex_ids.push(linker.add_dex(dex));
    }

    let resolver = ManifestPackageNameResolver::default();
    let package = resolve_or_file_stem(&resolver, apk_path);

    let base_config = AnalyzerConfig::from_env();
    let package_dir = base_config.cache_dir.join(&package);
    std::fs::create_dir_all(&package_dir).with_context(|| format!("creating cache directory {}", package_dir.display()))?;
    let config = AnalyzerConfig::new(package_dir.clone());

    let mut ctx = AnalyzerContext::new(linker, config).with_persistence().context("opening on-disk memoization store")?;

    let target_classes: Vec<String> = target_dex_ids
        .iter()
        .flat_map(|&dex_id| {
            let dex = ctx.linker.dex(dex_id);
            dex.class_defs.iter().filter_map(|c| c.get_name(dex).map(|s| s.into_owned())).collect::<Vec<_>>()
        })
        .collect();

    match mode {
        Mode::FullFootprint => run_full_footprint(&mut ctx, &target_classes),
        Mode::LegacyReachability => run_legacy_reachability(&mut ctx, &target_classes, &package_dir),
    }
}

/// Analyzes every method declared directly in the target APK's own
/// classes (not the bootstrap classpath), memoizing each one as it
/// goes. Methods reachable only from inherited bootstrap code are
/// still covered transitively through the inter-procedural driver
/// whenever a target method calls into them.
fn run_full_footprint(ctx: &mut AnalyzerContext, target_classes: &[String]) -> Result<()> {
    for descriptor in target_classes {
        let class = ctx.linker.link_class(descriptor)?;
        let methods: Vec<_> = {
            let obj = ctx.linker.class(class);
            obj.direct_methods.iter().chain(obj.virtual_methods.iter()).copied().collect()
        };
        for method in methods {
            if let Err(err) = driver::analyze_method(ctx, method) {
                log::warn!("skipping method in {descriptor}: {err:#}");
            }
        }
    }
    Ok(())
}

/// Every method declared directly in the target APK is treated as a
/// reachability root. Without parsing the manifest for actual
/// component entry points (out of scope here), this is the soundest
/// cheap over-approximation available: anything the real entry points
/// could reach is reachable from some method the APK itself declares.
fn run_legacy_reachability(ctx: &mut AnalyzerContext, target_classes: &[String], package_dir: &Path) -> Result<()> {
    let mut result = Reachability::new();
    for descriptor in target_classes {
        let class = ctx.linker.link_class(descriptor)?;
        let methods: Vec<_> = {
            let obj = ctx.linker.class(class);
            obj.direct_methods.iter().chain(obj.virtual_methods.iter()).copied().collect()
        };
        for method in methods {
            if let Err(err) = result.run(ctx, method) {
                log::warn!("skipping method in {descriptor}: {err:#}");
            }
        }
    }
    report::write_reports(package_dir, ctx, &result)
}
