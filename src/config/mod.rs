pub mod parse;
pub mod types;
pub mod window;

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use parse::{load_config, ConfigError, ConfigOverrides};
pub use types::{Config, HarvestConfig, NotifyConfig, OutputConfig, ServiceConfig, StagingBackend, StagingConfig};
pub use window::TimeWindow;

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
    })
}

/// Expands environment variables in a string.
/// Supports $env{VAR_NAME} syntax.
/// If an environment variable is not set, it's left unchanged.
pub fn expand_env_vars(text: &str) -> String {
    env_var_pattern()
        .replace_all(text, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string()
}

/// Names of `$env{...}` references still present after expansion, sorted and deduplicated.
pub fn unexpanded_env_vars(text: &str) -> Vec<String> {
    let mut vars: Vec<String> = env_var_pattern()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect();
    vars.sort();
    vars.dedup();
    vars
}

/// Expands tilde (~) in paths to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Resolves the config file path. Returns the first existing path from:
/// 1. Explicit path (if provided, with tilde expansion)
/// 2. ~/.config/logharvest/config.yml
/// 3. /etc/logharvest/config.yml
///
/// A missing config file is not an error; every setting can come from flags.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".config/logharvest/config.yml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from("/etc/logharvest/config.yml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_expand_env_vars_single() {
        std::env::set_var("LOGHARVEST_TEST_VAR", "secret");
        let result = expand_env_vars("token: $env{LOGHARVEST_TEST_VAR}");
        assert_eq!(result, "token: secret");
        std::env::remove_var("LOGHARVEST_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_unset_left_alone() {
        let result = expand_env_vars("token: $env{LOGHARVEST_NOT_SET_ANYWHERE}");
        assert_eq!(result, "token: $env{LOGHARVEST_NOT_SET_ANYWHERE}");
        assert_eq!(
            unexpanded_env_vars(&result),
            vec!["LOGHARVEST_NOT_SET_ANYWHERE".to_string()]
        );
    }

    #[test]
    fn test_unexpanded_env_vars_dedup() {
        let vars = unexpanded_env_vars("$env{B} $env{A} $env{B}");
        assert_eq!(vars, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_expand_tilde_with_path() {
        let expanded = expand_tilde(Path::new("~/harvest/out"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("harvest/out"));
        }
    }

    #[test]
    fn test_expand_tilde_no_expansion() {
        assert_eq!(expand_tilde(Path::new("/var/tmp")), Path::new("/var/tmp"));
        assert_eq!(expand_tilde(Path::new("relative/tmp")), Path::new("relative/tmp"));
    }
}
