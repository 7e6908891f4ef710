//! 配置管理模块
//!
//! 提供同步层配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [pool]
//! warm_recorders = 4    # 池创建时预热的录制器数量
//! auto_begin = true     # Get 时自动进入录制状态
//!
//! [debug]
//! debug_names = true    # 资源与录制器的调试命名
//!
//! [logging]
//! level = "info"        # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};

/// 同步层配置
///
/// 包含了命令录制器池和诊断所需的所有配置项。
/// 可以从配置文件加载，也可以通过代码构建。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 命令录制器池配置
    #[serde(default)]
    pub pool: PoolConfig,

    /// 调试配置
    #[serde(default)]
    pub debug: DebugConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 命令录制器池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// 池创建时预热的录制器数量
    ///
    /// 预热的录制器直接进入可复用分区，避免首帧的分配峰值。
    #[serde(default = "default_warm_recorders")]
    pub warm_recorders: u32,

    /// `get` 取出录制器时是否自动进入录制状态
    #[serde(default = "default_auto_begin")]
    pub auto_begin: bool,
}

/// 调试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    /// 是否为资源与录制器保留调试名称
    #[serde(default = "default_debug_names")]
    pub debug_names: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_warm_recorders() -> u32 { 0 }
fn default_auto_begin() -> bool { true }
fn default_debug_names() -> bool { true }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "distrhi.log".to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            debug: DebugConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            warm_recorders: default_warm_recorders(),
            auto_begin: default_auto_begin(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            debug_names: default_debug_names(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    ///
    /// 成功返回 `Config` 实例，失败返回错误
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    ///
    /// 返回 `Config` 实例
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    ///
    /// 成功返回 `Ok(())`，失败返回错误
    #[allow(dead_code)]
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// # 参数
    ///
    /// * `args` - 命令行参数迭代器
    ///
    /// # 说明
    ///
    /// 支持的参数：
    /// - `--warm <value>`: 设置池预热录制器数量
    /// - `--no-auto-begin`: 取出录制器时不自动进入录制状态
    /// - `--no-debug-names`: 关闭调试命名
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--no-auto-begin") {
            self.pool.auto_begin = false;
        }

        if args.iter().any(|a| a == "--no-debug-names") {
            self.debug.debug_names = false;
        }

        if let Some(idx) = args.iter().position(|a| a == "--warm") {
            if let Some(warm_str) = args.get(idx + 1) {
                if let Ok(warm) = warm_str.parse() {
                    self.pool.warm_recorders = warm;
                }
            }
        }
    }

    /// 验证配置的有效性
    ///
    /// # 返回值
    ///
    /// 配置有效返回 `Ok(())`，否则返回错误
    pub fn validate(&self) -> Result<()> {
        // 预热数量上限：预热只是为了摊平首帧分配，过大的值说明配置写错了
        if self.pool.warm_recorders > 64 {
            return Err(ConfigError::InvalidValue {
                field: "pool.warm_recorders".to_string(),
                reason: "Warm recorder count must be 64 or fewer".to_string(),
            }.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pool.warm_recorders, 0);
        assert!(config.pool.auto_begin);
        assert!(config.debug.debug_names);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.pool.warm_recorders = 128;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args(["--warm", "8", "--no-auto-begin"]);
        assert_eq!(config.pool.warm_recorders, 8);
        assert!(!config.pool.auto_begin);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str("[pool]\nwarm_recorders = 2\n").unwrap();
        assert_eq!(config.pool.warm_recorders, 2);
        // 其余段落回落到默认值
        assert!(config.pool.auto_begin);
        assert_eq!(config.logging.level, LogLevel::Info);
    }
}
