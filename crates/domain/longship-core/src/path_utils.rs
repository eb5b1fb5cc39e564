use std::path::{Component, Path, PathBuf};

/// Whether the platform's default filesystem treats names case-insensitively.
pub const CASE_INSENSITIVE_FS: bool = cfg!(any(windows, target_os = "macos"));

pub struct LongshipPath;

impl LongshipPath {
    /// Standardize a server or local path to the wire format: forward slashes, no empty or
    /// `.` segments, no leading or trailing separator. `..` segments are kept so that
    /// [`LongshipPath::verify_safe`] can reject them.
    pub fn normalize(path: &str) -> String {
        path.replace('\\', "/")
            .split('/')
            .filter(|seg| !seg.is_empty() && *seg != ".")
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Comparison key. Folded on Windows and macOS, where `BepInEx/x.dll` and
    /// `bepinex/x.dll` name one file; exact elsewhere, where they are two.
    pub fn canonicalize(path: &str) -> String {
        let normalized = Self::normalize(path);
        if CASE_INSENSITIVE_FS {
            normalized.to_lowercase()
        } else {
            normalized
        }
    }

    /// A path is safe when it is non-empty, relative, carries no drive prefix and has no
    /// parent-directory segment.
    pub fn verify_safe(rel_path: &str) -> bool {
        if rel_path.is_empty() || rel_path.starts_with('/') || rel_path.starts_with('\\') {
            return false;
        }
        // `C:foo` parses as a normal component on unix, reject it everywhere.
        if rel_path.len() > 1 && rel_path.as_bytes()[1] == b':' {
            return false;
        }
        let p = Path::new(rel_path);
        !p.is_absolute()
            && p.components().all(|c| matches!(c, Component::Normal(_)))
            && !rel_path.split(['/', '\\']).any(|seg| seg == "..")
    }

    /// Join a normalized relative path onto `root`, returning `None` when the result would
    /// not be a strict descendant of `root`.
    pub fn resolve_within(root: &Path, rel_path: &str) -> Option<PathBuf> {
        if !Self::verify_safe(rel_path) {
            return None;
        }
        let mut resolved = root.to_path_buf();
        for seg in rel_path.split('/') {
            resolved.push(seg);
        }
        (resolved.starts_with(root) && resolved != root).then_some(resolved)
    }

    /// Proper ancestors of a normalized path, nearest first: `a/b/c` yields `a/b`, `a`.
    pub fn ancestors(rel_path: &str) -> impl Iterator<Item = &str> {
        rel_path
            .char_indices()
            .rev()
            .filter(|(_, c)| *c == '/')
            .map(move |(i, _)| &rel_path[..i])
    }

    /// Component-wise prefix test: `BepInEx/plugins` is under `BepInEx`,
    /// `BepInExtras` is not.
    pub fn is_under_prefix(rel_path: &str, prefix: &str) -> bool {
        let rel = Self::normalize(rel_path);
        let prefix = Self::normalize(prefix);
        if prefix.is_empty() {
            return false;
        }
        rel == prefix
            || rel
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::LongshipPath;
    use std::path::Path;

    #[test]
    fn normalize_strips_server_leading_slash_and_backslashes() {
        assert_eq!(
            LongshipPath::normalize("/BepInEx\\plugins\\a.dll"),
            "BepInEx/plugins/a.dll"
        );
        assert_eq!(LongshipPath::normalize("dir/"), "dir");
        assert_eq!(LongshipPath::normalize("./a//b/./c"), "a/b/c");
        assert_eq!(LongshipPath::normalize("../x"), "../x");
    }

    #[test]
    fn verify_safe_rejects_traversal_and_absolute() {
        assert!(LongshipPath::verify_safe("a/b.txt"));
        assert!(!LongshipPath::verify_safe(""));
        assert!(!LongshipPath::verify_safe("../etc/passwd"));
        assert!(!LongshipPath::verify_safe("a/../../b"));
        assert!(!LongshipPath::verify_safe("/etc/passwd"));
        assert!(!LongshipPath::verify_safe("C:/Windows"));
        assert!(!LongshipPath::verify_safe("..\\evil"));
    }

    #[test]
    fn resolve_within_keeps_results_under_root() {
        let root = Path::new("/games/valheim");
        assert_eq!(
            LongshipPath::resolve_within(root, "BepInEx/a.dll").unwrap(),
            Path::new("/games/valheim/BepInEx/a.dll")
        );
        assert!(LongshipPath::resolve_within(root, "../../etc/passwd").is_none());
        assert!(LongshipPath::resolve_within(root, "").is_none());
    }

    #[test]
    fn prefix_match_is_component_wise() {
        assert!(LongshipPath::is_under_prefix("BepInEx", "BepInEx"));
        assert!(LongshipPath::is_under_prefix("BepInEx/plugins/x.dll", "BepInEx"));
        assert!(!LongshipPath::is_under_prefix("BepInExtras/x.dll", "BepInEx"));
        assert!(!LongshipPath::is_under_prefix("valheim.exe", "BepInEx"));
        assert!(!LongshipPath::is_under_prefix("anything", ""));
    }

    #[test]
    fn canonical_key_folds_case_only_where_the_filesystem_does() {
        let upper = LongshipPath::canonicalize("/BepInEx/plugins/Mod.dll");
        let lower = LongshipPath::canonicalize("BepInEx\\plugins\\mod.dll");
        if super::CASE_INSENSITIVE_FS {
            assert_eq!(upper, lower);
        } else {
            assert_eq!(upper, "BepInEx/plugins/Mod.dll");
            assert_ne!(upper, lower);
        }
    }

    #[test]
    fn ancestors_are_listed_nearest_first() {
        let got: Vec<_> = LongshipPath::ancestors("BepInEx/plugins/a.dll").collect();
        assert_eq!(got, vec!["BepInEx/plugins", "BepInEx"]);
        assert_eq!(LongshipPath::ancestors("top").count(), 0);
    }
}
