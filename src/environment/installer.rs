//! Miniconda Installer
//!
//! Looks up the vendor installer script for the running platform and runs
//! it in batch mode against a target prefix.
//!
//! # Supported Platforms
//!
//! | platform | arch              |
//! |----------|-------------------|
//! | linux    | x86_64, aarch64   |
//! | darwin   | x86_64, arm64     |

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{info, warn};
use once_cell::sync::Lazy;

use crate::error::{K2sError, Result};
use crate::process::{run_checked, CommandSpec, Toolbox};

const MINICONDA_BASE_URL: &str = "https://repo.anaconda.com/miniconda";

/// Installer script URLs keyed by `(platform, arch)`.
static INSTALLER_URLS: Lazy<HashMap<(&'static str, &'static str), String>> = Lazy::new(|| {
    [
        (("linux", "x86_64"), "Linux-x86_64"),
        (("linux", "aarch64"), "Linux-aarch64"),
        (("darwin", "x86_64"), "MacOSX-x86_64"),
        (("darwin", "arm64"), "MacOSX-arm64"),
    ]
    .into_iter()
    .map(|(key, suffix)| {
        (
            key,
            format!("{}/Miniconda3-latest-{}.sh", MINICONDA_BASE_URL, suffix),
        )
    })
    .collect()
});

/// Platform identifier for the running OS (`macos` is reported as `darwin`).
pub fn current_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Architecture identifier for the running CPU, using the installer's
/// naming on macOS (`aarch64` → `arm64`).
pub fn current_arch() -> &'static str {
    normalize_arch(current_platform(), std::env::consts::ARCH)
}

fn normalize_arch<'a>(platform: &str, arch: &'a str) -> &'a str {
    match (platform, arch) {
        ("darwin", "aarch64") => "arm64",
        _ => arch,
    }
}

/// Returns the installer URL for a platform/arch pair.
///
/// Only `linux` and `darwin` are supported; everything else is an
/// [`K2sError::UnsupportedPlatform`].
pub fn installer_url(platform: &str, arch: &str) -> Result<&'static str> {
    let arch = normalize_arch(platform, arch);

    INSTALLER_URLS
        .iter()
        .find(|((p, a), _)| *p == platform && *a == arch)
        .map(|(_, url)| url.as_str())
        .ok_or_else(|| K2sError::UnsupportedPlatform {
            platform: platform.to_string(),
            arch: arch.to_string(),
        })
}

/// Downloads the installer for the running platform to `script` and runs
/// `bash <script> -b -p <target>`. The script is removed afterwards.
pub fn install_miniconda(toolbox: &dyn Toolbox, script: &Path, target: &Path) -> Result<()> {
    let url = installer_url(current_platform(), current_arch())?;

    toolbox.fetch(url, script)?;

    let cmd = CommandSpec::new("bash")
        .path_arg(script)
        .arg("-b")
        .arg("-p")
        .path_arg(target);
    let result = run_checked(toolbox, &cmd);

    if let Err(e) = fs::remove_file(script) {
        warn!("Failed to clean up installer {}: {}", script.display(), e);
    }

    result?;
    info!("Installed conda at {}", target.display());
    Ok(())
}
