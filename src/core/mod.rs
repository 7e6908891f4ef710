//! 核心功能模块
//!
//! 本模块提供了同步层的基础功能，包括日志系统、配置管理和错误处理。
//! 这些模块独立于具体的图形 API，可以在任何后端中使用。
//!
//! # 模块组织
//!
//! - `log`：日志系统，提供结构化的日志记录功能
//! - `config`：配置管理，支持从配置文件加载同步层设置
//! - `error`：错误处理，定义统一的错误类型
//!
//! # 设计理念
//!
//! Core 模块参考了 DistEngine (C++) 的设计：
//! - **模块化**：清晰的职责划分
//! - **可复用**：与具体渲染 API 解耦
//! - **高性能**：使用 Rust 的零成本抽象

pub mod log;
pub mod config;
pub mod error;

// 重新导出常用类型，方便使用
pub use error::{Result, DistRhiError};
pub use config::Config;
