//! Path normalization utilities for consistent project-path comparison.
//!
//! Handles platform-specific quirks:
//! - macOS/Windows case-insensitive filesystems
//! - Windows backslash separators
//! - Symlink resolution
//! - Trailing slash normalization

use std::path::Path;

/// Normalizes a path for consistent comparison across the codebase.
///
/// This function handles:
/// 1. Separator normalization (backslashes become forward slashes)
/// 2. Trailing slash removal (except for root "/")
/// 3. Case folding on case-insensitive platforms (macOS, Windows)
/// 4. Symlink resolution when the path exists
///
/// # Platform Behavior
///
/// - **macOS/Windows**: Paths are lowercased because the default filesystems
///   are case-insensitive. `/Projects/Amp` and `/projects/amp` refer to the
///   same directory.
/// - **Linux**: Paths are case-sensitive, no lowercasing is applied.
///
/// # Symlink Handling
///
/// When the path exists on disk, symlinks are resolved to their canonical
/// form so `/link` and `/real` match if `/link -> /real`. If the path does
/// not exist, the original path is used unresolved.
pub fn normalize_path_for_comparison(path: &str) -> String {
    let resolved = resolve_symlinks(path);
    normalize_path_for_matching(&resolved)
}

/// Simple path normalization without filesystem access.
///
/// Use this for basic normalization when:
/// - You don't need symlink resolution
/// - You're working with paths that may not exist
/// - Performance is critical (no filesystem calls)
///
/// Still applies separator normalization, trailing slash removal, and case
/// folding on case-insensitive platforms.
pub fn normalize_path_for_matching(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let trimmed = strip_trailing_slashes(&unified);
    apply_case_normalization(&trimmed)
}

/// Derives a human-readable display name from a project path.
///
/// Uses the file stem, so `/projects/amp/amp.kicad_pro` becomes `amp`.
pub fn display_name_from_path(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(path)
        .to_string()
}

/// Strips trailing slashes from a path, preserving root "/".
fn strip_trailing_slashes(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Resolves symlinks if the path exists on disk.
fn resolve_symlinks(path: &str) -> String {
    let path_obj = Path::new(path);

    // Only resolve if the path exists - canonicalize fails on non-existent paths
    if path_obj.exists() {
        if let Ok(canonical) = path_obj.canonicalize() {
            return canonical.to_string_lossy().to_string();
        }
    }

    path.to_string()
}

/// Applies case folding on platforms whose default filesystems are
/// case-insensitive (macOS HFS+/APFS, Windows NTFS).
fn apply_case_normalization(path: &str) -> String {
    #[cfg(any(target_os = "macos", windows))]
    {
        path.to_lowercase()
    }
    #[cfg(not(any(target_os = "macos", windows)))]
    {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slash() {
        assert_eq!(normalize_path_for_matching("/project/"), "/project");
        assert_eq!(normalize_path_for_matching("/project//"), "/project");
    }

    #[test]
    fn preserves_root() {
        assert_eq!(normalize_path_for_matching("/"), "/");
        assert_eq!(normalize_path_for_matching("//"), "/");
    }

    #[test]
    fn unifies_separators() {
        let normalized = normalize_path_for_matching("\\projects\\amp");
        assert_eq!(normalized, "/projects/amp");
    }

    #[test]
    fn normalizes_regular_paths() {
        let result = normalize_path_for_matching("/Projects/Amp/board");
        #[cfg(any(target_os = "macos", windows))]
        assert_eq!(result, "/projects/amp/board");
        #[cfg(not(any(target_os = "macos", windows)))]
        assert_eq!(result, "/Projects/Amp/board");
    }

    #[test]
    #[cfg(target_os = "macos")]
    fn case_insensitive_on_macos() {
        let upper = normalize_path_for_matching("/Projects/Amp");
        let lower = normalize_path_for_matching("/projects/amp");
        let mixed = normalize_path_for_matching("/PROJECTS/aMp");

        assert_eq!(upper, lower);
        assert_eq!(lower, mixed);
    }

    #[test]
    fn resolves_existing_symlinks() {
        use std::fs;
        use tempfile::tempdir;

        let temp = tempdir().unwrap();
        let real_dir = temp.path().join("real");
        let link_path = temp.path().join("link");

        fs::create_dir(&real_dir).unwrap();

        #[cfg(unix)]
        std::os::unix::fs::symlink(&real_dir, &link_path).unwrap();

        #[cfg(unix)]
        {
            let real_normalized = normalize_path_for_comparison(real_dir.to_str().unwrap());
            let link_normalized = normalize_path_for_comparison(link_path.to_str().unwrap());

            assert_eq!(real_normalized, link_normalized);
        }
    }

    #[test]
    fn handles_nonexistent_paths() {
        // Should not panic on non-existent paths
        let result = normalize_path_for_comparison("/this/path/does/not/exist/12345");
        assert!(result.ends_with("12345"));
    }

    #[test]
    fn display_name_uses_file_stem() {
        assert_eq!(
            display_name_from_path("/projects/amp/amp.kicad_pro"),
            "amp"
        );
        assert_eq!(display_name_from_path("/projects/preamp"), "preamp");
    }

    #[test]
    fn display_name_falls_back_to_input() {
        assert_eq!(display_name_from_path("/"), "/");
    }
}
