//! Logger module for shadowcode
//!
//! 输出格式为 `[LEVEL] message`，写到 stderr。级别可由 `SHADOWCODE_LOG` 环境变量覆盖。
//!
//! # Usage
//!
//! ```rust
//! use shadowcode::util::logger::{self, LogLevel};
//!
//! logger::init_with_level(logger::level_from_env(LogLevel::Info));
//! tracing::info!("Hello, {}", "world");
//! ```

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{layer::SubscriberExt, Layer, Registry};

#[cfg(test)]
mod tests;

/// 覆盖日志级别的环境变量
pub const LOG_ENV: &str = "SHADOWCODE_LOG";

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// 无法识别的级别名
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// 命令行开关对应的级别
pub fn level_for(verbose: bool) -> LogLevel {
    if verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// `SHADOWCODE_LOG` 给出的级别；未设置或无法识别时使用 `default`
pub fn level_from_env(default: LogLevel) -> LogLevel {
    parse_level(std::env::var(LOG_ENV).ok().as_deref(), default)
}

fn parse_level(
    value: Option<&str>,
    default: LogLevel,
) -> LogLevel {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// 安装全局订阅者；已有订阅者时返回错误
pub fn try_init_with_level(level: LogLevel) -> Result<(), TryInitError> {
    let filter = LevelFilter::from_level(level.into());

    // [LEVEL] 前缀，无时间、无模块路径、无颜色
    let layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false)
        .with_level(true)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(filter);

    Registry::default().with(layer).try_init()
}

/// Initialize logger with custom level
///
/// 已经初始化过时保持原有的订阅者。
pub fn init_with_level(level: LogLevel) {
    if let Err(err) = try_init_with_level(level) {
        tracing::debug!("logger not reinstalled at {:?}: {}", level, err);
    }
}

/// Initialize logger with default configuration (INFO level)
pub fn init() {
    init_with_level(LogLevel::Info);
}
