//! Lexical path helpers for project-relative paths.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

/// Join `path` onto `base` unless it is already absolute, then normalize.
///
/// Normalization is lexical: `.` segments are dropped and `..` removes the
/// previous segment. Symlinks are not resolved.
#[must_use]
pub fn resolve_against(base: &Utf8Path, path: &str) -> Utf8PathBuf {
    let candidate = Utf8Path::new(path);
    if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&base.join(candidate))
    }
}

/// Lexically normalize a path.
#[must_use]
pub fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_str());
                }
            }
            Utf8Component::Prefix(_) | Utf8Component::RootDir | Utf8Component::Normal(_) => {
                out.push(component.as_str());
            }
        }
    }
    out
}

/// Make `path` absolute against the process working directory.
///
/// Falls back to the path unchanged when the working directory cannot be
/// read or is not UTF-8.
#[must_use]
pub fn absolutize(path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    std::env::current_dir()
        .ok()
        .and_then(|cwd| Utf8PathBuf::try_from(cwd).ok())
        .map_or_else(|| normalize(path), |cwd| normalize(&cwd.join(path)))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("/tmp/project", "./data", "/tmp/project/data")]
    #[case("/tmp/project", "data/../logs", "/tmp/project/logs")]
    #[case("/tmp/project", "../shared", "/tmp/shared")]
    #[case("/tmp/project", "/var/lib/data", "/var/lib/data")]
    #[case("/tmp/project", "/var/./lib//data/", "/var/lib/data")]
    fn resolve_against_cases(#[case] base: &str, #[case] path: &str, #[case] expected: &str) {
        assert_eq!(resolve_against(Utf8Path::new(base), path), expected);
    }

    #[rstest]
    fn absolutize_keeps_absolute_paths() {
        assert_eq!(absolutize(Utf8Path::new("/a/./b")), "/a/b");
    }
}
