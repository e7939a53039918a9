//!
//! Platform-native path resolution for DialectMux configuration.
//!
//! - Linux/Unix: XDG Base Directory layout (~/.config/dialectmux)
//! - macOS: Application Support directories (~/Library/...)
//! - Windows: Known Folder system (%APPDATA%, %PROGRAMDATA%)
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use crate::error::{ProxyError, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/* --- constants ------------------------------------------------------------------------------- */

/// Application name for directory resolution
pub const APP_NAME: &str = "dialectmux";
/// Organization qualifier for directory resolution
const ORGANIZATION: &str = "com";
/// Organization name for directory resolution
const ORG_NAME: &str = "SkyCorp";
/// File name of the main configuration file in every location
pub const CONFIG_FILE_NAME: &str = "config.toml";

/* --- public functions ------------------------------------------------------------------------ */

/// Get the user configuration directory for DialectMux
///
/// Returns the platform-appropriate configuration directory:
/// - Linux: ~/.config/dialectmux/
/// - macOS: ~/Library/Application Support/com.SkyCorp.dialectmux/
/// - Windows: %APPDATA%/SkyCorp/dialectmux/config/
///
/// Creates the directory if it doesn't exist.
///
/// # Returns
/// * `Ok(PathBuf)` - Path to user configuration directory
/// * `Err(ProxyError)` - Unable to determine or create config directory
pub fn user_config_dir() -> Result<PathBuf> {
    let project_dirs = get_project_dirs()?;
    let config_dir = project_dirs.config_dir();

    ensure_directory_exists(config_dir)?;
    Ok(config_dir.to_path_buf())
}

/// Get the system configuration directory for DialectMux
///
/// - Linux: /etc/dialectmux/
/// - macOS: /Library/Preferences/dialectmux/
/// - Windows: %PROGRAMDATA%/dialectmux/
///
/// Note: Does NOT create the directory (requires admin privileges)
pub fn system_config_dir() -> Result<PathBuf> {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Ok(PathBuf::from("/etc").join(APP_NAME))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(PathBuf::from("/Library/Preferences").join(APP_NAME))
    }

    #[cfg(windows)]
    {
        std::env::var("PROGRAMDATA").map(|path| PathBuf::from(path).join(APP_NAME)).map_err(|_| {
            ProxyError::Config("PROGRAMDATA environment variable not found".to_string())
        })
    }
}

/// Get the default user configuration file path
///
/// Creates parent directories if they don't exist.
pub fn user_config_file() -> Result<PathBuf> {
    Ok(user_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Get the system configuration file path
pub fn system_config_file() -> Result<PathBuf> {
    Ok(system_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand tilde (~) and environment variables in file paths
///
/// # Arguments
/// * `path` - Path string that may contain ~ or environment variables
///
/// # Returns
/// * `Ok(PathBuf)` - Expanded path
/// * `Err(ProxyError)` - Path expansion failed
///
/// # Examples
/// ```rust
/// use dialectmux::config::paths::expand_path;
///
/// let expanded = expand_path("/etc/dialectmux/config.toml").unwrap();
/// assert_eq!(expanded.to_string_lossy(), "/etc/dialectmux/config.toml");
/// ```
pub fn expand_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path_str = path.as_ref().to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        return match directories::UserDirs::new() {
            Some(dirs) => Ok(dirs.home_dir().join(rest)),
            None => Err(ProxyError::Config(
                "Unable to determine user home directory for tilde expansion".to_string(),
            )),
        };
    }

    if path_str.contains('$') {
        let expanded = shellexpand::full(&path_str).map_err(|e| {
            ProxyError::Config(format!(
                "Failed to expand environment variables in path '{}': {}",
                path_str, e
            ))
        })?;
        return Ok(PathBuf::from(expanded.as_ref()));
    }

    Ok(path.as_ref().to_path_buf())
}

/// Check if a configuration file exists and is readable
///
/// Verifies that the specified configuration file:
/// 1. Exists on the filesystem
/// 2. Is a regular file (not a directory)
/// 3. Has read permissions for the current user
pub fn validate_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ProxyError::Config(format!(
            "Configuration file '{}' does not exist",
            path.display()
        )));
    }

    if !path.is_file() {
        return Err(ProxyError::Config(format!(
            "Configuration path '{}' exists but is not a regular file",
            path.display()
        )));
    }

    std::fs::File::open(path).map_err(|e| {
        ProxyError::Config(format!(
            "Configuration file '{}' exists but cannot be read: {}\n\
             \n\
             Please check file permissions. You can fix this with: chmod 644 '{}'",
            path.display(),
            e,
            path.display()
        ))
    })?;

    Ok(())
}

/// Get all possible configuration file paths in precedence order
///
/// 1. User configuration file (~/.config/dialectmux/config.toml)
/// 2. System configuration file (/etc/dialectmux/config.toml)
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(user_config) = user_config_file() {
        paths.push(user_config);
    }

    if let Ok(system_config) = system_config_file() {
        paths.push(system_config);
    }

    paths
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if path.exists() {
        if !path.is_dir() {
            return Err(ProxyError::Config(format!(
                "Path '{}' exists but is not a directory",
                path.display()
            )));
        }
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|e| {
        ProxyError::Config(format!(
            "Failed to create configuration directory '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(())
}

/* --- private functions ----------------------------------------------------------------------- */

/// Get ProjectDirs instance for DialectMux
fn get_project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from(ORGANIZATION, ORG_NAME, APP_NAME).ok_or_else(|| {
        ProxyError::Config(
            "Unable to determine user directories. \
             Please ensure your user account has a valid home directory."
                .to_string(),
        )
    })
}

/* --- tests ----------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_system_config_file_name() {
        let system_file = system_config_file().expect("Should resolve system config path");
        assert_eq!(system_file.file_name().unwrap(), CONFIG_FILE_NAME);

        #[cfg(all(unix, not(target_os = "macos")))]
        assert_eq!(system_file, PathBuf::from("/etc/dialectmux/config.toml"));
    }

    #[test]
    fn test_tilde_expansion() {
        temp_env::with_var("HOME", Some("/home/tester"), || {
            let expanded = expand_path("~/test/path").expect("Should expand tilde");
            assert!(!expanded.to_string_lossy().contains('~'), "Tilde should be expanded");
        });

        let absolute = expand_path("/absolute/path").expect("Should handle absolute path");
        assert_eq!(absolute, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("DIALECTMUX_TEST_ROOT", Some("/srv/mux"), || {
            let expanded =
                expand_path("$DIALECTMUX_TEST_ROOT/config.toml").expect("Should expand variable");
            assert_eq!(expanded, PathBuf::from("/srv/mux/config.toml"));
        });
    }

    #[test]
    fn test_validate_config_file() {
        let result = validate_config_file("/non/existent/file.toml");
        assert!(result.is_err());

        let temp_dir = TempDir::new().unwrap();
        let temp_file = temp_dir.path().join("test.toml");
        fs::write(&temp_file, "test content").unwrap();
        assert!(validate_config_file(&temp_file).is_ok());

        // A directory is not a config file
        assert!(validate_config_file(temp_dir.path()).is_err());
    }

    #[test]
    fn test_ensure_directory_exists() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");

        ensure_directory_exists(&nested).expect("Should create nested directories");
        assert!(nested.is_dir());

        let file = temp_dir.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(ensure_directory_exists(&file).is_err());
    }
}
