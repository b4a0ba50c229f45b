//! Vault path normalization and anchor resolution.
//!
//! Stored paths and user-supplied paths rarely agree byte for byte: separators
//! differ, users type bare file names, and accented names come in composed or
//! decomposed form. Resolution first tries an exact match on the normalized
//! path, then a case- and diacritic-insensitive suffix match that must be
//! unambiguous.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Extension tried when a lookup has none.
const NOTE_EXTENSION: &str = ".md";

/// Normalize a vault-relative path.
///
/// - `\` becomes `/`
/// - empty and `.` segments are dropped
/// - `..` pops the previous segment (never above the root)
/// - no leading or trailing separator
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    segments.join("/")
}

/// Normalized path as a directory key: empty for the root, otherwise with a
/// trailing `/`.
pub fn normalize_dir(path: &str) -> String {
    let normalized = normalize_path(path);
    if normalized.is_empty() {
        normalized
    } else {
        format!("{normalized}/")
    }
}

/// Case- and diacritic-insensitive form of a path, used for fuzzy matching.
pub fn fold_path(path: &str) -> String {
    normalize_path(path)
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Whether two paths name the same note after normalization.
pub fn same_path(a: &str, b: &str) -> bool {
    normalize_path(a) == normalize_path(b)
}

fn has_extension(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .and_then(|name| name.rfind('.'))
        .is_some_and(|idx| idx > 0)
}

fn suffix_matches(candidate: &str, wanted: &str) -> bool {
    candidate == wanted || candidate.ends_with(&format!("/{wanted}"))
}

/// Find the single item whose path matches `wanted`.
///
/// Exact (normalized) matches win. Otherwise a folded suffix match is
/// attempted, also trying `wanted` + `.md` when it has no extension. Returns
/// `None` when nothing matches or the suffix match is ambiguous; choosing
/// among several candidates is the caller's business.
pub fn resolve_unique<'a, T, F>(items: &'a [T], path_of: F, wanted: &str) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    let normalized = normalize_path(wanted);
    if normalized.is_empty() {
        return None;
    }

    if let Some(exact) = items.iter().find(|item| normalize_path(path_of(*item)) == normalized) {
        return Some(exact);
    }

    let folded = fold_path(&normalized);
    let with_ext = (!has_extension(&folded)).then(|| format!("{folded}{NOTE_EXTENSION}"));

    let mut found: Option<&T> = None;
    let mut found_path = String::new();
    for item in items {
        let candidate = fold_path(path_of(item));
        let hit = suffix_matches(&candidate, &folded)
            || with_ext
                .as_deref()
                .is_some_and(|w| suffix_matches(&candidate, w));
        if !hit {
            continue;
        }

        match found {
            // several records for one note are not an ambiguity
            Some(_) if candidate == found_path => {}
            Some(_) => {
                log::debug!("path lookup ambiguous: wanted={wanted:?}");
                return None;
            }
            None => {
                found = Some(item);
                found_path = candidate;
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("dir\\sub\\note.md"), "dir/sub/note.md");
        assert_eq!(normalize_path("/dir//note.md/"), "dir/note.md");
        assert_eq!(normalize_path("./dir/./note.md"), "dir/note.md");
        assert_eq!(normalize_path("a/b/../c.md"), "a/c.md");
        assert_eq!(normalize_path("../../escape.md"), "escape.md");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("./"), "");
    }

    #[test]
    fn test_normalize_dir() {
        assert_eq!(normalize_dir(""), "");
        assert_eq!(normalize_dir("a/b"), "a/b/");
        assert_eq!(normalize_dir("a/b/c/../"), "a/b/");
    }

    #[test]
    fn test_fold_path_strips_case_and_diacritics() {
        assert_eq!(fold_path("dir/ÉCOLE.md"), "dir/ecole.md");
        // decomposed input folds the same way
        assert_eq!(fold_path("E\u{301}cole.md"), "ecole.md");
        assert_eq!(fold_path("Crème Brûlée.md"), "creme brulee.md");
    }

    #[test]
    fn test_resolve_exact_match() {
        let paths = vec!["a/note.md", "b/note.md"];
        let hit = resolve_unique(&paths, |p| *p, "b\\note.md");
        assert_eq!(hit, Some(&"b/note.md"));
    }

    #[test]
    fn test_resolve_suffix_with_diacritics() {
        let paths = vec!["dir/ÉCOLE.md", "dir/other.md"];
        assert_eq!(resolve_unique(&paths, |p| *p, "ecole.md"), Some(&"dir/ÉCOLE.md"));
        assert_eq!(resolve_unique(&paths, |p| *p, "école"), Some(&"dir/ÉCOLE.md"));
    }

    #[test]
    fn test_resolve_requires_segment_boundary() {
        let paths = vec!["dir/preecole.md"];
        assert_eq!(resolve_unique(&paths, |p| *p, "ecole.md"), None);
    }

    #[test]
    fn test_resolve_ambiguous_returns_none() {
        let paths = vec!["a/note.md", "b/note.md"];
        assert_eq!(resolve_unique(&paths, |p| *p, "note.md"), None);
    }

    #[test]
    fn test_resolve_duplicate_records_are_not_ambiguous() {
        let paths = vec!["a/Note.md", "a/Note.md"];
        assert_eq!(resolve_unique(&paths, |p| *p, "note"), Some(&"a/Note.md"));
    }

    #[test]
    fn test_resolve_missing() {
        let paths = vec!["a/note.md"];
        assert_eq!(resolve_unique(&paths, |p| *p, "nothing.md"), None);
        assert_eq!(resolve_unique(&paths, |p| *p, ""), None);
    }

    #[test]
    fn test_same_path() {
        assert!(same_path("./a/b.md", "a\\b.md"));
        assert!(!same_path("a/b.md", "a/B.md"));
    }
}
