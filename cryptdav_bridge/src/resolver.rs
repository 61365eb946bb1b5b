use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

/// Maps protocol paths (always `/`-separated, rooted at the served tree) to
/// host paths under a fixed serving root.
///
/// Resolution is purely lexical: it never touches the filesystem, so the
/// same input always resolves to the same output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// An empty root means the current directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: clean_path(root.as_ref()),
        }
    }

    /// The cleaned serving root. `resolve("/")` returns exactly this path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `None` when the input must be rejected: it contains a NUL
    /// byte, the host separator where that separator is not `/`, or a
    /// segment the host would not treat as a single plain name (such as a
    /// Windows drive prefix like `C:`).
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.contains('\0') {
            return None;
        }
        if MAIN_SEPARATOR != '/' && name.contains(MAIN_SEPARATOR) {
            return None;
        }
        let mut resolved = self.root.clone();
        for segment in slash_clean(name).split('/').filter(|s| !s.is_empty()) {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => resolved.push(segment),
                _ => return None,
            }
        }
        Some(resolved)
    }

    pub fn is_root(&self, path: &Path) -> bool {
        path == self.root
    }
}

/// Lexically cleans `/` + `name`: drops empty and `.` segments and lets `..`
/// consume the previous segment, never climbing above `/`. The result is
/// always rooted and has no trailing slash (except for `/` itself).
pub fn slash_clean(name: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Host-path flavour of [`slash_clean`] for the serving root, which may be
/// relative. Leading `..` of a relative path is kept.
fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slash_clean() {
        let cases = [
            ("", "/"),
            ("/", "/"),
            ("a", "/a"),
            ("/a/b/", "/a/b"),
            ("//a//b", "/a/b"),
            ("/a/./b", "/a/b"),
            ("/a/../b", "/b"),
            ("/..", "/"),
            ("../../etc/passwd", "/etc/passwd"),
            ("/a/b/../../../..", "/"),
            ("/.../x", "/.../x"),
        ];
        for (input, expected) in cases {
            assert_eq!(slash_clean(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_resolve_joins_under_root() {
        let resolver = PathResolver::new("/data");
        assert_eq!(resolver.resolve("/"), Some(PathBuf::from("/data")));
        assert_eq!(resolver.resolve(""), Some(PathBuf::from("/data")));
        assert_eq!(resolver.resolve("/sub"), Some(PathBuf::from("/data/sub")));
        assert_eq!(
            resolver.resolve("a/b/c.txt"),
            Some(PathBuf::from("/data/a/b/c.txt"))
        );
    }

    #[test]
    fn test_parent_segments_stay_inside_root() {
        let resolver = PathResolver::new("/data");
        let inputs = [
            "/../etc/passwd",
            "..",
            "../..",
            "/a/../../..",
            "/a/b/../../../c",
            "./../x/../../y",
            "/..//..//../z",
        ];
        for input in inputs {
            let resolved = resolver.resolve(input).unwrap();
            assert!(
                resolved.starts_with("/data"),
                "{input:?} escaped to {resolved:?}"
            );
            assert!(
                !resolved.components().any(|c| c == Component::ParentDir),
                "{input:?} kept a parent segment: {resolved:?}"
            );
        }
        assert_eq!(
            resolver.resolve("/../etc/passwd"),
            Some(PathBuf::from("/data/etc/passwd"))
        );
    }

    #[test]
    fn test_rejects_nul() {
        let resolver = PathResolver::new("/data");
        assert_eq!(resolver.resolve("/a\0b"), None);
        assert_eq!(resolver.resolve("\0"), None);
        assert_eq!(resolver.resolve("/ok/\0/../x"), None);
    }

    #[cfg(windows)]
    #[test]
    fn test_rejects_native_separator() {
        let resolver = PathResolver::new("C:\\data");
        assert_eq!(resolver.resolve("/a\\..\\..\\b"), None);
    }

    #[cfg(windows)]
    #[test]
    fn test_rejects_drive_prefix_segments() {
        let resolver = PathResolver::new("C:\\data");
        for input in ["/C:/x", "/C:/Windows", "/sub/D:", "D:", "/sub/d:x"] {
            assert_eq!(resolver.resolve(input), None, "{input:?}");
        }
        assert_eq!(
            resolver.resolve("/sub/x"),
            Some(PathBuf::from("C:\\data\\sub\\x"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_colon_is_a_plain_character_on_unix() {
        let resolver = PathResolver::new("/data");
        assert_eq!(
            resolver.resolve("/C:/x"),
            Some(PathBuf::from("/data/C:/x"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_is_a_plain_character_on_unix() {
        let resolver = PathResolver::new("/data");
        assert_eq!(
            resolver.resolve("/a\\b"),
            Some(PathBuf::from("/data/a\\b"))
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let resolver = PathResolver::new("/data");
        for input in ["/x/../y", "a//b/.", "/../..", "", "/\0"] {
            assert_eq!(resolver.resolve(input), resolver.resolve(input));
        }
    }

    #[test]
    fn test_root_is_cleaned() {
        assert_eq!(PathResolver::new("").root(), Path::new("."));
        assert_eq!(PathResolver::new(".").root(), Path::new("."));
        assert_eq!(PathResolver::new("data/./x").root(), Path::new("data/x"));
        assert_eq!(PathResolver::new("data/x/..").root(), Path::new("data"));
        assert_eq!(PathResolver::new("../data").root(), Path::new("../data"));
        assert_eq!(PathResolver::new("/data/").root(), Path::new("/data"));
        assert_eq!(PathResolver::new("/../data").root(), Path::new("/data"));
    }

    #[test]
    fn test_root_detection() {
        let resolver = PathResolver::new("/data/");
        for input in ["/", "", ".", "/..", "/a/..", "//"] {
            let resolved = resolver.resolve(input).unwrap();
            assert!(resolver.is_root(&resolved), "{input:?} -> {resolved:?}");
        }
        assert!(!resolver.is_root(&resolver.resolve("/a").unwrap()));

        let relative = PathResolver::new("");
        assert!(relative.is_root(&relative.resolve("/").unwrap()));
        assert_eq!(relative.resolve("/f"), Some(PathBuf::from("./f")));
    }
}
