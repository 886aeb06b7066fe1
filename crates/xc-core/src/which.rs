//! `PATH` search for executable programs, built on the `which` crate.

use std::ffi::OsStr;
use std::path::PathBuf;

/// Search every entry of `PATH` for an executable named `name`, returning
/// every match in `PATH` order (possibly empty).
pub fn which(name: &str) -> Vec<PathBuf> {
    which_in(name, std::env::var_os("PATH").as_deref())
}

/// Like [`which`] but takes an explicit `PATH` value, for testability.
pub fn which_in(name: &str, path_var: Option<&OsStr>) -> Vec<PathBuf> {
    let Some(path_var) = path_var else {
        return Vec::new();
    };
    let cwd = std::env::current_dir().ok();
    match ::which::which_in_all(name, Some(path_var), cwd.unwrap_or_default()) {
        Ok(matches) => matches.collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::tempdir;

    fn make_executable(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn test_which_finds_executable_on_path() {
        let dir = tempdir().unwrap();
        let exe = make_executable(dir.path(), "my-tool");
        let path_var = OsString::from(dir.path());
        let found = which_in("my-tool", Some(&path_var));
        assert_eq!(found, vec![exe]);
    }

    #[test]
    fn test_which_nonexistent_is_empty() {
        let dir = tempdir().unwrap();
        let path_var = OsString::from(dir.path());
        assert!(which_in("a-program-name-that-no-one-would-ever-use", Some(&path_var)).is_empty());
    }

    #[test]
    fn test_which_skips_non_executable_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("not-executable");
        fs::write(&path, "data").unwrap();
        let path_var = OsString::from(dir.path());
        assert!(which_in("not-executable", Some(&path_var)).is_empty());
    }

    #[test]
    fn test_which_searches_multiple_entries_in_order() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let exe_a = make_executable(dir_a.path(), "dup-tool");
        let _exe_b = make_executable(dir_b.path(), "dup-tool");

        let mut path_var = OsString::from(dir_a.path());
        path_var.push(":");
        path_var.push(dir_b.path());

        let found = which_in("dup-tool", Some(&path_var));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], exe_a);
    }

    #[test]
    fn test_which_no_path_env_is_empty() {
        assert!(which_in("anything", None).is_empty());
    }
}
