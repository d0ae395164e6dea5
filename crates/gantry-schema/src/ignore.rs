//! Ignore-pattern matching over tree-relative paths.
//!
//! A pattern excludes a path when it matches the path literally, names its
//! parent directory (with or without a trailing separator), matches any
//! ancestor directory the same way, or matches the whole path as a shell
//! glob. Matching `*` across `/` is intentional: `*.tmp` excludes a `.tmp`
//! file at any depth.

use glob::Pattern;

/// Whether `path` is excluded by any of `patterns`. First match wins.
pub fn is_ignored(patterns: &[String], path: &str) -> bool {
    for pattern in patterns {
        if matches_pattern(pattern, path) {
            return true;
        }
    }
    // Climb toward the root: a path under an ignored directory is ignored.
    match parent(path) {
        Some(dir) => is_ignored(patterns, dir),
        None => false,
    }
}

fn matches_pattern(pattern: &str, path: &str) -> bool {
    if path == pattern {
        return true;
    }
    if let Some(dir) = parent(path) {
        if dir == pattern || pattern.strip_suffix('/') == Some(dir) {
            return true;
        }
    }
    Pattern::new(pattern).is_ok_and(|glob| glob.matches(path))
}

// Parent directory of a relative path; None at the root.
fn parent(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => Some(dir),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn literal_match() {
        assert!(is_ignored(&patterns(&["docs/internal"]), "docs/internal"));
        assert!(!is_ignored(&patterns(&["docs/internal"]), "docs/api"));
    }

    #[test]
    fn parent_directory_is_a_segment_boundary() {
        assert!(is_ignored(&patterns(&["build"]), "build/output.o"));
        assert!(!is_ignored(&patterns(&["build"]), "builder/file"));
    }

    #[test]
    fn trailing_separator_is_equivalent() {
        assert!(is_ignored(&patterns(&["build/"]), "build/output.o"));
    }

    #[test]
    fn ancestors_are_climbed_to_the_root() {
        assert!(is_ignored(&patterns(&["top"]), "top/a/b/c"));
        assert!(!is_ignored(&patterns(&["top"]), "other/top-like/file"));
    }

    #[test]
    fn glob_fallback_crosses_separators() {
        assert!(is_ignored(&patterns(&["*.tmp"]), "a/b/c.tmp"));
        assert!(is_ignored(&patterns(&["*.tmp"]), "c.tmp"));
        assert!(!is_ignored(&patterns(&["*.tmp"]), "a/b/c.txt"));
    }

    #[test]
    fn invalid_glob_never_matches() {
        assert!(!is_ignored(&patterns(&["[unclosed"]), "file"));
    }

    #[test]
    fn empty_pattern_list() {
        assert!(!is_ignored(&[], "anything/at/all"));
    }
}
