use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate_first;

const CONFIG_FILE: &str = "config.toml";
const PROJECT_DIR: &str = ".tspdbg";

/// Written to `<config_dir>/config.toml` the first time it is missing.
const DEFAULT_CONFIG_CONTENT: &str = r#"# tspdbg configuration
# Uncomment a setting to override its default.

# [debugger]
# command = "kic-debug"
# args = []
# stack_timeout_ms = 5000

# [markers]
# channel_tag = "dbg"
# prompt = "TSP>"
# continuation = ["\n>>>>", ">>>>"]

# [log]
# level = "info"
# file = "/path/to/tspdbg.log"
"#;

/// Load the effective configuration.
///
/// Built-in defaults are overlaid with `<config_dir>/config.toml`, which is
/// created with commented defaults when missing, and then with the nearest
/// `.tspdbg/config.toml` at or above `project_dir`. The result is validated.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join(CONFIG_FILE);

    if !global_path.exists() {
        fs::create_dir_all(config_dir)?;
        fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        info!("Created default config at {}", global_path.display());
    }

    let mut config = Config::default();

    let global = fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global) {
        config = merge_configs(&config, &global)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        debug!("Merging project config {}", project_path.display());
        let project = fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project)?;
    }

    validate_first(&config)?;
    Ok(config)
}

/// Load one explicit config file over the defaults.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    let config = merge_configs(&Config::default(), &content)?;
    validate_first(&config)?;
    Ok(config)
}

/// Nearest `.tspdbg/config.toml` at or above `start`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR).join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#')
    })
}
