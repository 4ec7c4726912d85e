//! Bootstrap classpath resolution (§6, SPEC_FULL §2): the nine
//! hard-coded Android framework JARs loaded before the target APK, in
//! the order the original always searched them.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use offload_dex::link::Linker;
use offload_dex::Dex;
use offload_zip::ZipEntry;

/// Hard-coded classpath, core framework jars first, matching
/// `AnalyzeMain.cpp`'s fixed bootstrap list.
pub const BOOTSTRAP_CLASSPATH: &[&str] = &[
    "core",
    "core-junit",
    "bouncycastle",
    "ext",
    "framework",
    "framework2",
    "android.policy",
    "services",
    "apache-xml",
];

/// Default directory the bootstrap jars are expected under; overridable
/// so tests and non-device environments can point at a fixture
/// directory instead of `/system/framework`.
pub const BOOTSTRAP_DIR_ENV: &str = "OFFLOAD_BOOTSTRAP_DIR";
const DEFAULT_BOOTSTRAP_DIR: &str = "/system/framework";

/// Loads every jar in [BOOTSTRAP_CLASSPATH] into `linker`, in order. A
/// missing or unparseable jar is fatal (§7: "unresolvable bootstrap
/// class" is the one documented hard-exit condition).
pub fn load_bootstrap_classpath(linker: &mut Linker) -> Result<()> {
    let base = std::env::var_os(BOOTSTRAP_DIR_ENV).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_BOOTSTRAP_DIR));

    for name in BOOTSTRAP_CLASSPATH {
        let jar_path = base.join(format!("{name}.jar"));
        load_jar(linker, &jar_path).with_context(|| format!("loading bootstrap jar {}", jar_path.display()))?;
    }
    Ok(())
}

/// Extracts and links every `classes*.dex` entry in `jar_path`.
pub fn load_jar(linker: &mut Linker, jar_path: &Path) -> Result<()> {
    let bytes = std::fs::read(jar_path).with_context(|| format!("reading {}", jar_path.display()))?;
    let zip = ZipEntry::new(bytes).with_context(|| format!("parsing {} as a zip archive", jar_path.display()))?;

    let dex_names: Vec<String> = zip.namelist().filter(|n| n.starts_with("classes") && n.ends_with(".dex")).cloned().collect();
    if dex_names.is_empty() {
        bail!("{} contains no classes*.dex entry", jar_path.display());
    }

    for name in dex_names {
        let (data, _) = zip.read(&name)?;
        let dex = Dex::new(data).with_context(|| format!("parsing {name} in {}", jar_path.display()))?;
        linker.add_dex(dex);
    }
    Ok(())
}
