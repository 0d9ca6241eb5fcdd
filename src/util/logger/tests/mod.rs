//! Logger tests

use super::*;

#[cfg(test)]
mod level_tests {
    use super::*;

    #[test]
    fn test_level_conversion() {
        assert_eq!(tracing::Level::from(LogLevel::Trace), tracing::Level::TRACE);
        assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
    }

    #[test]
    fn test_parse_level_names() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!(" WARNING ".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(
            "loud".parse::<LogLevel>().unwrap_err().to_string(),
            "unknown log level 'loud'"
        );
    }

    #[test]
    fn test_env_value_falls_back_to_default() {
        assert_eq!(parse_level(Some("error"), LogLevel::Info), LogLevel::Error);
        assert_eq!(parse_level(Some("bogus"), LogLevel::Info), LogLevel::Info);
        assert_eq!(parse_level(None, LogLevel::Warn), LogLevel::Warn);
        assert_eq!(level_for(true), LogLevel::Debug);
        assert_eq!(level_for(false), LogLevel::Info);
    }
}

#[cfg(test)]
mod init_tests {
    use super::*;

    #[test]
    fn test_second_install_reports_error() {
        init_with_level(LogLevel::Debug);
        // 全局订阅者已存在（本测试或其他测试安装）
        assert!(try_init_with_level(LogLevel::Info).is_err());
        init();
        tracing::debug!("logger initialized");
    }
}
