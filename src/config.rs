//! Application configuration module / 应用配置模块
//!
//! Loaded from config.json in the working directory; a default file is
//! written on first run / 首次运行时创建默认配置文件

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::search::snippet::DEFAULT_PREVIEW_LENGTH;

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration / 服务器配置
    pub server: ServerConfig,
    /// Database configuration / 数据库配置
    pub database: DatabaseConfig,
    /// Search configuration / 搜索配置
    pub search: SearchConfig,
}

/// Server configuration / 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration / 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Data directory path / 数据目录路径
    pub data_dir: String,
    /// Database file (relative to data_dir) / 数据库文件
    pub db_file: String,
}

/// Search tuning / 搜索配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Hits gathered per content type before the global merge / 每个类型的候选上限
    pub max_candidates_per_type: usize,
    pub default_limit: usize,
    pub max_limit: usize,
    /// Preview window in characters / 摘要长度
    pub preview_length: usize,
    pub suggestion_limit: usize,
    pub popular_tag_limit: usize,
    pub autocomplete_limit: usize,
    /// Deadline for one search request / 单次搜索超时（毫秒）
    pub query_timeout_ms: u64,
    /// Use the FTS5 index; false forces the legacy scan / 是否启用全文索引
    pub native_index: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8280,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            db_file: "knowhub.db".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_candidates_per_type: 200,
            default_limit: 20,
            max_limit: 100,
            preview_length: DEFAULT_PREVIEW_LENGTH,
            suggestion_limit: 20,
            popular_tag_limit: 20,
            autocomplete_limit: 10,
            query_timeout_ms: 5000,
            native_index: true,
        }
    }
}

impl AppConfig {
    /// Database URL; `DATABASE_URL` wins when set / 获取数据库URL
    pub fn get_database_url(&self) -> String {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                return url;
            }
        }
        let db_path = Path::new(&self.database.data_dir).join(&self.database.db_file);
        format!("sqlite:{}?mode=rwc", db_path.to_string_lossy())
    }

    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(&self.database.data_dir)
    }

    /// 获取服务器绑定地址
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Get the config file path / 获取配置文件路径
pub fn get_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load config.json from the working directory / 加载配置文件
pub fn load_config() -> anyhow::Result<AppConfig> {
    load_config_from(&get_config_path())
}

/// Load a config file, creating it with defaults when missing / 不存在则创建默认配置
pub fn load_config_from(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    } else {
        let config = AppConfig::default();
        save_config_to(&config, path)?;
        tracing::info!("Created default configuration at {:?}", path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
pub fn save_config_to(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write config file {:?}", path))?;
    Ok(())
}
