//! Start-up verification of the external tools the hunter shells out to

use crate::config::Config;
use log::error;
use std::env;
use std::ffi::OsStr;
use std::path::Path;

const ALWAYS_REQUIRED: &[&str] = &["pgrep", "ps", "top"];
const DOCKER_REQUIRED: &[&str] = &["bash", "lsns", "docker", "stat"];

/// Binaries needed to run with this configuration
pub fn required_binaries(config: &Config) -> Vec<String> {
    let mut binaries: Vec<String> = ALWAYS_REQUIRED.iter().map(|b| b.to_string()).collect();
    if !config.trace.dry_run {
        binaries.push(config.tracer.program.clone());
    }
    if config.trace.docker {
        binaries.extend(DOCKER_REQUIRED.iter().map(|b| b.to_string()));
    }
    binaries
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Whether `binary` resolves to an executable, searching `search_path` for bare names
pub fn find_in(binary: &str, search_path: Option<&OsStr>) -> bool {
    if binary.contains('/') {
        return is_executable(Path::new(binary));
    }
    search_path
        .map(|paths| env::split_paths(paths).any(|dir| is_executable(&dir.join(binary))))
        .unwrap_or(false)
}

/// Required binaries that cannot be found on `PATH`; each one is logged
pub fn missing_binaries(config: &Config) -> Vec<String> {
    let search_path = env::var_os("PATH");
    required_binaries(config)
        .into_iter()
        .filter(|binary| {
            let found = find_in(binary, search_path.as_deref());
            if !found {
                error!("required binary not found: {}", binary);
            }
            !found
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn install(dir: &TempDir, name: &str, mode: u32) {
        let path = dir.path().join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_required_binaries_default() {
        let config = Config::default();
        assert_eq!(required_binaries(&config), vec!["pgrep", "ps", "top", "phpspy"]);
    }

    #[test]
    fn test_required_binaries_dry_run_with_docker() {
        let mut config = Config::default();
        config.trace.dry_run = true;
        config.trace.docker = true;

        assert_eq!(
            required_binaries(&config),
            vec!["pgrep", "ps", "top", "bash", "lsns", "docker", "stat"]
        );
    }

    #[test]
    fn test_find_in_search_path() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        install(&second, "phpspy", 0o755);
        install(&first, "notes", 0o644);
        let paths = env::join_paths([first.path(), second.path()]).unwrap();

        assert!(find_in("phpspy", Some(paths.as_os_str())));
        assert!(!find_in("notes", Some(paths.as_os_str())));
        assert!(!find_in("pgrep", Some(paths.as_os_str())));
        assert!(!find_in("phpspy", None));
        assert!(!find_in("phpspy", Some(OsStr::new(""))));
    }

    #[test]
    fn test_find_in_explicit_path() {
        let dir = TempDir::new().unwrap();
        install(&dir, "tracer", 0o755);
        let explicit = dir.path().join("tracer");

        assert!(find_in(explicit.to_str().unwrap(), None));
        assert!(!find_in("/nonexistent/tracer", None));
    }
}
