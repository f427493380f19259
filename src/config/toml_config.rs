use crate::utils::error::{Result, YardError};
use crate::utils::validation::{validate_path, validate_positive_number, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YardConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub yard: YardSettings,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    #[default]
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "./yard-data/yard.json".to_string()
}

/// 堆場規則設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YardSettings {
    /// 建立區塊時未指定層數的預設值
    #[serde(default = "default_tiers")]
    pub default_tiers: u32,
    #[serde(default = "default_max_block_name_len")]
    pub max_block_name_len: usize,
    /// 放櫃時格位被他人搶先的重試次數
    #[serde(default = "default_placement_attempts")]
    pub placement_attempts: usize,
    /// 單一區塊的格位上限
    #[serde(default = "default_max_block_capacity")]
    pub max_block_capacity: u64,
}

impl Default for YardSettings {
    fn default() -> Self {
        Self {
            default_tiers: default_tiers(),
            max_block_name_len: default_max_block_name_len(),
            placement_attempts: default_placement_attempts(),
            max_block_capacity: default_max_block_capacity(),
        }
    }
}

fn default_tiers() -> u32 {
    4
}

fn default_max_block_name_len() -> usize {
    10
}

fn default_placement_attempts() -> usize {
    3
}

fn default_max_block_capacity() -> u64 {
    10_000
}

/// `yard.max_block_capacity` 可設定的最大值
pub const BLOCK_CAPACITY_CEILING: u64 = 1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub json: Option<bool>,
    pub level: Option<String>,
}

impl YardConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(YardError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 檔案存在才載入，否則使用預設值
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| YardError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${YARD_DATA_DIR})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| YardError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn json_logging(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }

    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or("info")
    }
}

impl Validate for YardConfig {
    fn validate(&self) -> Result<()> {
        validate_positive_number("yard.default_tiers", self.yard.default_tiers as usize, 1)?;
        validate_positive_number("yard.max_block_name_len", self.yard.max_block_name_len, 1)?;
        validate_positive_number("yard.placement_attempts", self.yard.placement_attempts, 1)?;

        if self.yard.max_block_capacity < u64::from(self.yard.default_tiers)
            || self.yard.max_block_capacity > BLOCK_CAPACITY_CEILING
        {
            return Err(YardError::InvalidConfigValueError {
                field: "yard.max_block_capacity".to_string(),
                value: self.yard.max_block_capacity.to_string(),
                reason: format!(
                    "Value must be between yard.default_tiers ({}) and {}",
                    self.yard.default_tiers, BLOCK_CAPACITY_CEILING
                ),
            });
        }

        if self.store.kind == StoreKind::Json {
            validate_path("store.path", &self.store.path)?;
        }

        if let Some(level) = self.logging.as_ref().and_then(|l| l.level.as_deref()) {
            let valid_levels = ["trace", "debug", "info", "warn", "error"];
            if !valid_levels.contains(&level) {
                return Err(YardError::InvalidConfigValueError {
                    field: "logging.level".to_string(),
                    value: level.to_string(),
                    reason: format!("Valid levels: {}", valid_levels.join(", ")),
                });
            }
        }

        Ok(())
    }
}
