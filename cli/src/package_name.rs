//! Package-name extraction (§6): "via an external badging tool" in the
//! original, kept here as an explicit seam rather than an `aapt`
//! dependency this crate would have to vendor.

use std::path::Path;
use std::process::Command;

/// Resolves an APK's package name, used to namespace on-disk artifacts
/// under `<cache>/<package>/`.
pub trait PackageNameResolver {
    fn resolve(&self, apk_path: &Path) -> Option<String>;
}

/// Shells out to an `aapt`-like badging tool (`aapt dump badging
/// <apk>`, looking for `package: name='...'`). Falls back to the APK's
/// file stem, logged at `warn!`, if the tool is missing or its output
/// doesn't parse — matching the teacher's "never fail the whole run over
/// a best-effort label" posture.
pub struct ManifestPackageNameResolver {
    pub aapt_path: String,
}

impl Default for ManifestPackageNameResolver {
    fn default() -> Self {
        ManifestPackageNameResolver { aapt_path: "aapt".to_string() }
    }
}

impl PackageNameResolver for ManifestPackageNameResolver {
    fn resolve(&self, apk_path: &Path) -> Option<String> {
        let output = Command::new(&self.aapt_path).arg("dump").arg("badging").arg(apk_path).output();
        match output {
            Ok(out) if out.status.success() => {
                let text = String::from_utf8_lossy(&out.stdout);
                text.lines()
                    .find(|l| l.starts_with("package:"))
                    .and_then(|line| line.split("name='").nth(1))
                    .and_then(|rest| rest.split('\'').next())
                    .map(|name| name.to_string())
            }
            _ => None,
        }
    }
}

/// Falls back to the file stem when no badging tool is available.
pub fn resolve_or_file_stem(resolver: &dyn PackageNameResolver, apk_path: &Path) -> String {
    if let Some(name) = resolver.resolve(apk_path) {
        return name;
    }
    log::warn!("package-name badging tool unavailable; falling back to file stem for {}", apk_path.display());
    apk_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "unknown".to_string())
}
