//! Manifest discovery and loading.
//!
//! Same-runtime packages keep `manifest.json` at the repository root.
//! Cross-runtime packages keep it inside a package subdirectory, identified
//! by a neighbouring build-system file (`pyproject.toml` / `setup.py`).

use std::path::{Path, PathBuf};

use crate::types::TrikManifest;
use crate::validate::{parse_manifest, ManifestError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackageKind {
    SameRuntime,
    CrossRuntime,
}

#[derive(Clone, Debug)]
pub struct ManifestLocation {
    pub manifest_path: PathBuf,
    pub manifest_dir: PathBuf,
    pub kind: PackageKind,
}

/// Locate `manifest.json` inside a trik package directory.
pub fn find_manifest_location(package_dir: &Path) -> Option<ManifestLocation> {
    let root_manifest = package_dir.join("manifest.json");
    if root_manifest.is_file() {
        return Some(ManifestLocation {
            manifest_path: root_manifest,
            manifest_dir: package_dir.to_path_buf(),
            kind: PackageKind::SameRuntime,
        });
    }

    let has_build_file = package_dir.join("pyproject.toml").is_file()
        || package_dir.join("setup.py").is_file();
    if !has_build_file {
        return None;
    }

    let entries = std::fs::read_dir(package_dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name.starts_with('_') {
            continue;
        }
        let sub_manifest = path.join("manifest.json");
        if sub_manifest.is_file() {
            return Some(ManifestLocation {
                manifest_path: sub_manifest,
                manifest_dir: path,
                kind: PackageKind::CrossRuntime,
            });
        }
    }

    None
}

/// Load and validate the manifest for a trik directory.
pub fn load_manifest_dir(trik_dir: &Path) -> Result<(TrikManifest, ManifestLocation), ManifestError> {
    let location = find_manifest_location(trik_dir)
        .ok_or_else(|| ManifestError::NotFound(trik_dir.to_path_buf()))?;

    let text = std::fs::read_to_string(&location.manifest_path)?;
    let raw: serde_json::Value = serde_json::from_str(&text)?;
    let manifest = parse_manifest(&raw).map_err(ManifestError::Invalid)?;

    Ok((manifest, location))
}
