//! shadowcode configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (SHADOWCODE_ENABLED, SHADOWCODE_POLYMORPHIC)
//! 3. Config file (TOML)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use shadowcode::util::config::ShadowConfig;
//!
//! let config = ShadowConfig::from_toml_str("warmup_calls = 2").unwrap();
//! assert_eq!(config.warmup_calls, 2);
//! assert!(config.polymorphic);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 启用开关的环境变量
pub const ENV_ENABLED: &str = "SHADOWCODE_ENABLED";
/// 多态缓存开关的环境变量
pub const ENV_POLYMORPHIC: &str = "SHADOWCODE_POLYMORPHIC";

/// 影子字节码配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowConfig {
    /// 是否创建影子字节码
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 调用次数超过该值后创建影子字节码
    #[serde(default)]
    pub warmup_calls: u64,
    /// 是否允许单态调用点升级为多态
    #[serde(default = "default_true")]
    pub polymorphic: bool,
    /// 多态缓存容量
    #[serde(default = "default_polymorphic_size")]
    pub polymorphic_size: usize,
    /// L1 与多态表的容量上限
    #[serde(default = "default_max_cache_slots")]
    pub max_cache_slots: usize,
    /// 条目失效次数超过该值后调用点去优化
    #[serde(default = "default_miss_threshold")]
    pub miss_threshold: u32,
}

fn default_true() -> bool {
    true
}

fn default_polymorphic_size() -> usize {
    4
}

fn default_max_cache_slots() -> usize {
    256
}

fn default_miss_threshold() -> u32 {
    1000
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warmup_calls: 0,
            polymorphic: true,
            polymorphic_size: default_polymorphic_size(),
            max_cache_slots: default_max_cache_slots(),
            miss_threshold: default_miss_threshold(),
        }
    }
}

impl ShadowConfig {
    /// 从 TOML 文本解析
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ShadowConfig = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    /// 应用进程环境变量
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// 应用覆盖项（`lookup` 按变量名取值）
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_ENABLED) {
            self.enabled = parse_bool(ENV_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_POLYMORPHIC) {
            self.polymorphic = parse_bool(ENV_POLYMORPHIC, &value)?;
        }
        Ok(())
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.polymorphic_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "polymorphic_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.max_cache_slots == 0 || self.max_cache_slots > 256 {
            return Err(ConfigError::InvalidValue {
                key: "max_cache_slots".to_string(),
                value: self.max_cache_slots.to_string(),
            });
        }
        Ok(self)
    }
}

fn parse_bool(
    key: &str,
    value: &str,
) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// 加载配置：文件（可选）→ 环境变量
///
/// `path` 为 `None` 或文件不存在时使用默认值。
pub fn load_config(path: Option<&Path>) -> Result<ShadowConfig, ConfigError> {
    let mut config = match path {
        Some(path) if path.exists() => {
            let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
            ShadowConfig::from_toml_str(&content)?
        }
        _ => ShadowConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

/// 保存配置
pub fn save_config(
    config: &ShadowConfig,
    path: &Path,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(ConfigError::IoError)?;
        }
    }
    let content = config.to_toml_string()?;
    fs::write(path, content).map_err(ConfigError::IoError)?;
    Ok(())
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(toml::de::Error),
    SerializeError(toml::ser::Error),
    InvalidValue { key: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Config parse error: {}", e),
            ConfigError::SerializeError(e) => write!(f, "Config serialize error: {}", e),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value for '{}': {}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests;
