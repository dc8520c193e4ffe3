//! Path resolution for dockhand
//!
//! # Environment Variables
//!
//! - `DOCKHAND_STATE_DIR` - Override the state directory
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `DOCKHAND_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/dockhand` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\dockhand`
//!    - macOS/Linux: `~/.local/state/dockhand`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "DOCKHAND_STATE_DIR";

/// Name of the state file inside the state directory
pub const STATE_FILE: &str = "state.json";

/// Get the dockhand state directory path
pub fn state_dir() -> Result<PathBuf> {
    state_dir_with(|key| std::env::var(key).ok())
}

/// Same as [`state_dir`] with a custom environment lookup
pub fn state_dir_with<F>(env: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    // 1. Check environment variable override
    if let Some(dir) = env(ENV_STATE_DIR).filter(|d| !d.is_empty()) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    // 2. Check XDG_STATE_HOME
    if let Some(xdg_state) = env("XDG_STATE_HOME").filter(|d| !d.is_empty()) {
        let path = PathBuf::from(xdg_state).join("dockhand");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    // 3. Platform default
    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join("dockhand");
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("dockhand");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Resolve the state file: an explicit path wins over the state directory
pub fn state_file(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(&path.to_string_lossy())),
        None => Ok(state_dir()?.join(STATE_FILE)),
    }
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables leave the input unchanged.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_state_dir_env_override() {
        let env = env_of(&[
            (ENV_STATE_DIR, "/custom/state/path"),
            ("XDG_STATE_HOME", "/tmp/xdg"),
        ]);
        assert_eq!(state_dir_with(env).unwrap(), PathBuf::from("/custom/state/path"));
    }

    #[test]
    fn test_state_dir_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        let env = env_of(&[(ENV_STATE_DIR, "~/ops/dockhand")]);
        assert_eq!(state_dir_with(env).unwrap(), home.join("ops").join("dockhand"));
    }

    #[test]
    fn test_xdg_state_home() {
        let env = env_of(&[("XDG_STATE_HOME", "/tmp/xdg-state-test")]);
        assert_eq!(
            state_dir_with(env).unwrap(),
            PathBuf::from("/tmp/xdg-state-test/dockhand")
        );
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let env = env_of(&[(ENV_STATE_DIR, ""), ("XDG_STATE_HOME", "/tmp/xdg")]);
        assert_eq!(state_dir_with(env).unwrap(), PathBuf::from("/tmp/xdg/dockhand"));
    }

    #[cfg(unix)]
    #[test]
    fn test_default_state_dir_unix() {
        let result = state_dir_with(env_of(&[])).unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join(".local").join("state").join("dockhand"));
    }

    #[test]
    fn test_explicit_state_file_wins() {
        let path = state_file(Some(Path::new("/srv/dockhand/prod.json"))).unwrap();
        assert_eq!(path, PathBuf::from("/srv/dockhand/prod.json"));
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/test/path");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("test").join("path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }
}
