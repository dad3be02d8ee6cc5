use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::roles::RoleMapping;

/// One Kramerius instance the engine may pull content from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    pub base_url: String,
}

/// Engine configuration, loaded once at startup. `max_processes` is not
/// hot-reloadable; changing it requires a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Worker pool capacity of the dispatcher.
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,

    /// Kramerius instances keyed by the name batches refer to.
    #[serde(default)]
    pub instances: HashMap<String, InstanceConfig>,

    /// Mapping from external role names to editor capabilities.
    #[serde(default)]
    pub permissions: RoleMapping,
}

fn default_max_processes() -> usize {
    num_cpus::get().max(1)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_processes: default_max_processes(),
            instances: HashMap::new(),
            permissions: RoleMapping::default(),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.max_processes == 0 {
        return Err(ConfigError::Validation {
            message: "maxProcesses must be at least 1".to_string(),
        });
    }

    for (name, instance) in &config.instances {
        if instance.base_url.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("instance '{}' has an empty baseUrl", name),
            });
        }
    }

    Ok(())
}
