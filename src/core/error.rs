//! 错误处理模块
//!
//! 定义了同步层中使用的统一错误类型。
//!
//! # 设计原则
//!
//! - 为每种错误类型提供清晰的上下文信息
//! - 支持错误链（error source）
//! - 易于模式匹配和错误处理
//! - 契约违规（如 before == after 的转换请求）不走错误路径，直接断言失败

use std::fmt;

/// 同步层统一的 Result 类型
///
/// 所有可能返回错误的函数都应该使用这个类型。
pub type Result<T> = std::result::Result<T, DistRhiError>;

/// DistRHI 同步层的错误类型
///
/// 包含了命令录制、提交和配置过程中可能遇到的各种错误情况。
#[derive(Debug)]
pub enum DistRhiError {
    /// 配置错误
    Config(ConfigError),

    /// 图形 API 错误
    Graphics(GraphicsError),

    /// IO 错误
    Io(std::io::Error),

    /// 日志系统错误
    Log(String),

    /// 初始化错误
    Initialization(String),

    /// 运行时错误
    Runtime(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置项缺失
    MissingField(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug)]
pub enum GraphicsError {
    /// 设备创建失败
    DeviceCreation(String),

    /// 资源创建失败（如原生命令缓冲区分配失败）
    ResourceCreation(String),

    /// 命令记录失败（begin/end 状态不合法等）
    CommandExecution(String),

    /// 命令队列拒绝提交
    Submission(String),
}

impl fmt::Display for DistRhiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistRhiError::Config(e) => write!(f, "Configuration error: {}", e),
            DistRhiError::Graphics(e) => write!(f, "Graphics error: {}", e),
            DistRhiError::Io(e) => write!(f, "IO error: {}", e),
            DistRhiError::Log(msg) => write!(f, "Log error: {}", msg),
            DistRhiError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
            DistRhiError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {}", field),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::DeviceCreation(msg) => write!(f, "Device creation failed: {}", msg),
            GraphicsError::ResourceCreation(msg) => write!(f, "Resource creation failed: {}", msg),
            GraphicsError::CommandExecution(msg) => write!(f, "Command execution failed: {}", msg),
            GraphicsError::Submission(msg) => write!(f, "Queue submission failed: {}", msg),
        }
    }
}

impl std::error::Error for DistRhiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DistRhiError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for GraphicsError {}

// 实现 From trait 以便于错误转换
impl From<std::io::Error> for DistRhiError {
    fn from(err: std::io::Error) -> Self {
        DistRhiError::Io(err)
    }
}

impl From<ConfigError> for DistRhiError {
    fn from(err: ConfigError) -> Self {
        DistRhiError::Config(err)
    }
}

impl From<GraphicsError> for DistRhiError {
    fn from(err: GraphicsError) -> Self {
        DistRhiError::Graphics(err)
    }
}
