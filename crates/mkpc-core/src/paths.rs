//! Path helpers shared by the relinker and the configuration layer.

use std::path::{Component, Path, PathBuf};

/// Compute a relative path from `from_dir` to `to_path`.
///
/// Both arguments must be anchored the same way (both absolute, or both
/// relative to the same root). `.` and `..` components are resolved
/// lexically first, then the function walks up from `from_dir` to the common
/// ancestor and descends into `to_path`.
///
/// Example: `relative_path("app", "libs/libfoo.dylib")` returns
/// `"../libs/libfoo.dylib"`.
pub fn relative_path(from_dir: &Path, to_path: &Path) -> PathBuf {
    let from_components: Vec<_> = normal_components(from_dir);
    let to_components: Vec<_> = normal_components(to_path);

    let common_len = from_components
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common_len..from_components.len() {
        result.push("..");
    }
    for part in &to_components[common_len..] {
        result.push(part);
    }
    result
}

// `a/b/../c` is `a/c`; a leading `..` is kept, and `..` at the root is dropped.
fn normal_components(path: &Path) -> Vec<Component<'_>> {
    let mut components: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                Some(Component::ParentDir | Component::CurDir) | None => {
                    components.push(component);
                }
            },
            _ => components.push(component),
        }
    }
    components
}

/// Render a relative path with `/` separators, as dyld expects.
pub fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Platform file name of the shared library linked as `-l<name>`.
pub fn shared_library_filename(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.dll")
    } else if cfg!(target_os = "macos") {
        format!("lib{name}.dylib")
    } else {
        format!("lib{name}.so")
    }
}

/// File name component of a load-path record.
pub fn install_name_basename(install_name: &str) -> &str {
    install_name.rsplit('/').next().unwrap_or(install_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_same_dir() {
        let result = relative_path(Path::new("/a/b/c"), Path::new("/a/b/c/file"));
        assert_eq!(result, PathBuf::from("file"));
    }

    #[test]
    fn test_relative_path_cross_dir() {
        let result = relative_path(Path::new("app"), Path::new("libs/libfoo.dylib"));
        assert_eq!(result, PathBuf::from("../libs/libfoo.dylib"));
    }

    #[test]
    fn test_relative_path_from_root() {
        let result = relative_path(Path::new(""), Path::new("libs/libfoo.dylib"));
        assert_eq!(result, PathBuf::from("libs/libfoo.dylib"));
    }

    #[test]
    fn test_relative_path_ignores_cur_dir() {
        let result = relative_path(Path::new("./a/b"), Path::new("a/c/libx.dylib"));
        assert_eq!(result, PathBuf::from("../c/libx.dylib"));
    }

    #[test]
    fn test_relative_path_collapses_parent_dir() {
        let result = relative_path(
            Path::new("app"),
            Path::new("foo/pkgconfig/../lib/libfoo.dylib"),
        );
        assert_eq!(result, PathBuf::from("../foo/lib/libfoo.dylib"));

        let result = relative_path(Path::new("a/b/../c"), Path::new("a/c/libx.dylib"));
        assert_eq!(result, PathBuf::from("libx.dylib"));
    }

    #[test]
    fn test_relative_path_parent_dir_at_root() {
        let result = relative_path(Path::new("/a"), Path::new("/../a/lib/libx.dylib"));
        assert_eq!(result, PathBuf::from("lib/libx.dylib"));
    }

    #[test]
    fn test_to_posix() {
        let path = PathBuf::from("..").join("libs").join("libfoo.dylib");
        assert_eq!(to_posix(&path), "../libs/libfoo.dylib");
    }

    #[test]
    #[cfg(target_os = "macos")]
    fn test_shared_library_filename_macos() {
        assert_eq!(shared_library_filename("foo"), "libfoo.dylib");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_shared_library_filename_linux() {
        assert_eq!(shared_library_filename("foo"), "libfoo.so");
    }

    #[test]
    fn test_install_name_basename() {
        assert_eq!(install_name_basename("/build/tmp/libfoo.dylib"), "libfoo.dylib");
        assert_eq!(install_name_basename("@rpath/libfoo.dylib"), "libfoo.dylib");
        assert_eq!(install_name_basename("libfoo.dylib"), "libfoo.dylib");
    }
}
