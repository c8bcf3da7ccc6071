//! Release Versioning
//!
//! Turns the current development version (`X.Y.Zdev`) into a tagged
//! release and moves the project on to the next development version.
//!
//! The version lives in `src/<package>/__init__.py` as
//! `__version__ = 'X.Y.Zdev'` and `CHANGELOG.md` carries one `## <version>`
//! heading per release.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, info, warn};

use crate::error::{K2sError, Result};
use crate::process::{run_checked, CommandSpec, Toolbox};

const DEV_SUFFIX: &str = "dev";
const VERSION_ASSIGNMENT: &str = "__version__";
const CHANGELOG: &str = "CHANGELOG.md";

/// A `major.minor.patch` release number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReleaseVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ReleaseVersion {
    /// Parses a development version such as `0.1.3dev`.
    pub fn from_dev(version: &str) -> Result<Self> {
        let release = version.strip_suffix(DEV_SUFFIX).ok_or_else(|| {
            K2sError::InvalidVersion(format!(
                "'{}' is not a development version (expected X.Y.Z{})",
                version, DEV_SUFFIX
            ))
        })?;
        Self::parse(release)
    }

    /// Parses `major.minor.patch`.
    pub fn parse(version: &str) -> Result<Self> {
        let parts = version
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| K2sError::InvalidVersion(version.to_string()))?;

        match parts.as_slice() {
            [major, minor, patch] => Ok(Self {
                major: *major,
                minor: *minor,
                patch: *patch,
            }),
            _ => Err(K2sError::InvalidVersion(version.to_string())),
        }
    }

    /// The development version following this release.
    pub fn next_dev(&self) -> String {
        format!(
            "{}.{}.{}{}",
            self.major,
            self.minor,
            self.patch + 1,
            DEV_SUFFIX
        )
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The file holding `__version__` and the package it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFile {
    pub package: String,
    pub path: PathBuf,
}

impl VersionFile {
    /// Looks for `src/<package>/__init__.py` declaring `__version__`.
    pub fn find(project_root: &Path) -> Result<Self> {
        let src = project_root.join("src");
        let mut candidates: Vec<PathBuf> = fs::read_dir(&src)
            .map_err(|e| K2sError::Task(format!("cannot read {}: {}", src.display(), e)))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_dir())
            .collect();
        candidates.sort();

        for dir in candidates {
            let init = dir.join("__init__.py");
            let Ok(content) = fs::read_to_string(&init) else {
                continue;
            };
            if read_version(&content).is_some() {
                let package = dir
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                debug!("Version file: {}", init.display());
                return Ok(Self { package, path: init });
            }
        }

        Err(K2sError::Task(format!(
            "no src/<package>/__init__.py with {} found under {}",
            VERSION_ASSIGNMENT,
            project_root.display()
        )))
    }

    pub fn read(&self) -> Result<String> {
        let content = fs::read_to_string(&self.path)?;
        read_version(&content).ok_or_else(|| {
            K2sError::Task(format!("{} not found in {}", VERSION_ASSIGNMENT, self.path.display()))
        })
    }

    pub fn write(&self, version: &str) -> Result<()> {
        let content = fs::read_to_string(&self.path)?;
        fs::write(&self.path, replace_version(&content, version))?;
        Ok(())
    }
}

/// Extracts the quoted value of the `__version__` assignment.
pub fn read_version(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(VERSION_ASSIGNMENT)?;
        let value = rest.trim_start().strip_prefix('=')?.trim();
        let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"')?;
        let inner = &value[1..];
        inner.find(quote).map(|end| inner[..end].to_string())
    })
}

/// Rewrites the `__version__` assignment, keeping the rest of the file.
pub fn replace_version(content: &str, version: &str) -> String {
    let mut out: Vec<String> = content
        .lines()
        .map(|line| {
            if read_version(line).is_some() {
                format!("{} = '{}'", VERSION_ASSIGNMENT, version)
            } else {
                line.to_string()
            }
        })
        .collect();

    if content.ends_with('\n') {
        out.push(String::new());
    }
    out.join("\n")
}

/// Replaces the `## <dev>` heading with `## <release> (<date>)`. Returns
/// `None` when there is no such heading.
pub fn stamp_changelog(
    content: &str,
    dev: &str,
    release: &ReleaseVersion,
    date: NaiveDate,
) -> Option<String> {
    let heading = format!("## {}", dev);
    let stamped = format!("## {} ({})", release, date.format("%Y-%m-%d"));

    let mut replaced = false;
    let mut out: Vec<String> = content
        .lines()
        .map(|line| {
            if !replaced && line.trim_end() == heading {
                replaced = true;
                stamped.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        return None;
    }
    if content.ends_with('\n') {
        out.push(String::new());
    }
    Some(out.join("\n"))
}

/// Adds a `## <next>` heading above the most recent release.
pub fn add_changelog_heading(content: &str, next: &str) -> String {
    let heading = format!("## {}\n\n", next);

    match content.find("\n## ") {
        Some(index) => format!("{}{}{}", &content[..=index], heading, &content[index + 1..]),
        None if content.starts_with("## ") => format!("{}{}", heading, content),
        None if content.is_empty() => format!("# CHANGELOG\n\n{}", heading),
        None => format!("{}\n\n{}", content.trim_end(), heading),
    }
}

/// Releases the current development version: rewrites the version and
/// changelog, commits, tags, then bumps to the next development version
/// and commits again. Returns the released version.
pub fn version(toolbox: &dyn Toolbox, project_root: &Path, today: NaiveDate) -> Result<String> {
    let file = VersionFile::find(project_root)?;
    let current = file.read()?;
    let release = ReleaseVersion::from_dev(&current)?;
    let release_str = release.to_string();
    let changelog = project_root.join(CHANGELOG);

    info!("Releasing {} {} (was {})", file.package, release, current);

    file.write(&release_str)?;
    if changelog.exists() {
        let content = fs::read_to_string(&changelog)?;
        match stamp_changelog(&content, &current, &release, today) {
            Some(stamped) => fs::write(&changelog, stamped)?,
            None => warn!(
                "{} has no '## {}' heading, release {} is not stamped",
                CHANGELOG, current, release
            ),
        }
    }

    let message = format!("{} release {}", file.package, release);
    git(toolbox, project_root, &["add", "--all"])?;
    git(toolbox, project_root, &["commit", "-m", message.as_str()])?;
    git(toolbox, project_root, &["tag", "-a", release_str.as_str(), "-m", message.as_str()])?;

    let next = release.next_dev();
    info!("Bumping {} to {}", file.package, next);

    file.write(&next)?;
    let content = if changelog.exists() {
        fs::read_to_string(&changelog)?
    } else {
        String::new()
    };
    fs::write(&changelog, add_changelog_heading(&content, &next))?;

    let bump = format!("Bumps up {} to version {}", file.package, next);
    git(toolbox, project_root, &["add", "--all"])?;
    git(toolbox, project_root, &["commit", "-m", bump.as_str()])?;

    Ok(release_str)
}

fn git(toolbox: &dyn Toolbox, project_root: &Path, args: &[&str]) -> Result<()> {
    let cmd = CommandSpec::new("git")
        .args(args.iter().copied())
        .working_dir(project_root);
    run_checked(toolbox, &cmd)
}
