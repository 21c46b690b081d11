//! Bundle path policy.
//!
//! Paths inside a bundle are always relative. Normalization collapses `.`
//! segments and resolves `..` without ever escaping the bundle root.

use std::path::{Component, Path, PathBuf};

use playgate_core::{Error, Result};

/// Normalize a bundle-relative path to its canonical `a/b/c.ext` form.
///
/// Backslashes are treated as separators. Absolute paths (including
/// Windows drive paths) and traversal above the root are rejected.
pub fn normalize_bundle_path(input: &str) -> Result<String> {
    let unified = input.replace('\\', "/");

    if unified.len() >= 2
        && unified.as_bytes()[1] == b':'
        && unified.as_bytes()[0].is_ascii_alphabetic()
    {
        return Err(Error::asset(format!(
            "absolute paths are not allowed in a bundle: {}",
            input
        )));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(Error::asset(format!(
                        "path traversal detected in bundle path: {}",
                        input
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::asset(format!(
                    "absolute paths are not allowed in a bundle: {}",
                    input
                )));
            }
            Component::CurDir => {}
        }
    }

    let parts: Vec<String> = normalized
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return Err(Error::asset(format!("empty bundle path: '{}'", input)));
    }
    Ok(parts.join("/"))
}

/// Resolve a bundle path against a directory root.
pub fn resolve_under(root: &Path, input: &str) -> Result<PathBuf> {
    let relative = normalize_bundle_path(input)?;
    let full = root.join(relative);
    if !full.starts_with(root) {
        return Err(Error::asset(format!(
            "path {} is outside of bundle root {}",
            input,
            root.display()
        )));
    }
    Ok(full)
}
