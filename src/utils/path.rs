use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use log::error;

fn is_executable_file(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Resolves a command name to an executable path.
///
/// Names containing `/` are validated in place; bare names are probed
/// against each `PATH` directory in order. Returns `None` when nothing
/// matches.
pub fn resolve_executable(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    if name.contains('/') {
        return is_executable_file(Path::new(name)).then(|| name.to_string());
    }
    let env_path = match env::var("PATH") {
        Ok(path) => path,
        Err(e) => {
            error!("autosh: error with env PATH: {:?}", e);
            return None;
        }
    };
    for dir in env_path.split(':') {
        if dir.is_empty() {
            continue;
        }
        let candidate = Path::new(dir).join(name);
        if is_executable_file(&candidate) {
            return Some(candidate.to_string_lossy().into_owned());
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_common_command() {
        let path = resolve_executable("sh").unwrap();
        assert!(path.ends_with("/sh"), "got {}", path);
        assert!(is_executable_file(Path::new(&path)));
    }

    #[test]
    fn test_absolute_path_validated_in_place() {
        assert_eq!(resolve_executable("/bin/sh"), Some("/bin/sh".to_string()));
        assert_eq!(resolve_executable("/no/such/binary"), None);
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(resolve_executable("definitely-not-a-command-xyz"), None);
        assert_eq!(resolve_executable(""), None);
    }

    #[test]
    fn test_directory_is_not_executable_file() {
        // /tmp is executable but not a regular file.
        assert_eq!(resolve_executable("/tmp"), None);
    }
}
