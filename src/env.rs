//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量管理，所有变量以 `READER_TRANSLATE_` 为前缀

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }

    /// 仅在变量已设置时解析，未设置时返回 `None`
    fn lookup() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "READER_TRANSLATE_LOG_LEVEL";
        const DEFAULT: Option<String> = None;

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }
}

/// 翻译相关环境变量
pub mod translation {
    use super::*;

    /// 目标语言
    pub struct TargetLang;
    impl EnvVar<String> for TargetLang {
        const NAME: &'static str = "READER_TRANSLATE_TARGET_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Target language for translation (e.g. es, zh, pt-BR)";

        fn parse(value: &str) -> EnvResult<String> {
            parse_language(value, Self::NAME)
        }
    }

    /// 源语言
    pub struct SourceLang;
    impl EnvVar<String> for SourceLang {
        const NAME: &'static str = "READER_TRANSLATE_SOURCE_LANG";
        const DEFAULT: Option<String> = None;

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("auto".to_string()),
            }
        }
        const DESCRIPTION: &'static str = "Source language for translation ('auto' for detection)";

        fn parse(value: &str) -> EnvResult<String> {
            if value.trim().eq_ignore_ascii_case("auto") {
                return Ok("auto".to_string());
            }
            parse_language(value, Self::NAME)
        }
    }

    /// 块硬上限
    pub struct ChunkMaxChars;
    impl EnvVar<usize> for ChunkMaxChars {
        const NAME: &'static str = "READER_TRANSLATE_CHUNK_MAX_CHARS";
        const DEFAULT: Option<usize> = Some(8000);
        const DESCRIPTION: &'static str = "Hard ceiling of characters per translation chunk";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 500, 50000)
        }
    }

    /// 预翻译开关
    pub struct PrefetchEnabled;
    impl EnvVar<bool> for PrefetchEnabled {
        const NAME: &'static str = "READER_TRANSLATE_PREFETCH_ENABLED";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Pre-translate neighbouring chunks in the background";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 缓存相关环境变量
pub mod cache {
    use super::*;

    /// 缓存启用状态
    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "READER_TRANSLATE_CACHE_ENABLED";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Persist translated chunks on disk";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    /// 缓存文件路径
    pub struct Path;
    impl EnvVar<String> for Path {
        const NAME: &'static str = "READER_TRANSLATE_CACHE_PATH";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Chunk cache database file (supports ~)";

        fn parse(value: &str) -> EnvResult<String> {
            let path = value.trim();
            if path.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Path cannot be empty".to_string(),
                });
            }
            Ok(path.to_string())
        }
    }

    /// 本地缓存大小
    pub struct LocalCacheSize;
    impl EnvVar<usize> for LocalCacheSize {
        const NAME: &'static str = "READER_TRANSLATE_CACHE_LOCAL_SIZE";
        const DEFAULT: Option<usize> = Some(64);
        const DESCRIPTION: &'static str = "In-memory LRU size (number of chunks)";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 100000)
        }
    }
}

/// 排版相关环境变量
pub mod layout {
    use super::*;

    /// 每页二分搜索窗口
    pub struct MaxPageChars;
    impl EnvVar<usize> for MaxPageChars {
        const NAME: &'static str = "READER_TRANSLATE_MAX_PAGE_CHARS";
        const DEFAULT: Option<usize> = Some(5000);
        const DESCRIPTION: &'static str = "Upper bound of the per-page binary search window";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 16, 1_000_000)
        }
    }

    /// 分页超时
    pub struct PaginationTimeout;
    impl EnvVar<Duration> for PaginationTimeout {
        const NAME: &'static str = "READER_TRANSLATE_PAGINATION_TIMEOUT";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(30));
        const DESCRIPTION: &'static str = "Wall-clock pagination budget in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            let seconds: u64 = value.parse().map_err(|_| EnvError {
                variable: Self::NAME.to_string(),
                message: "Must be a valid number of seconds".to_string(),
            })?;

            if seconds == 0 {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Timeout must be greater than 0".to_string(),
                });
            }

            if seconds > 600 {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Timeout too long (max 600 seconds)".to_string(),
                });
            }

            Ok(Duration::from_secs(seconds))
        }
    }
}

/// 辅助函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_language(value: &str, var_name: &str) -> EnvResult<String> {
    let lang = value.trim();
    let valid = (2..=8).contains(&lang.len())
        && lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Invalid language code '{}'", value),
        });
    }
    Ok(lang.to_string())
}

/// 生成环境变量文档（Markdown 表格）
pub fn generate_env_docs() -> String {
    let rows: &[(&str, &str)] = &[
        (core::LogLevel::NAME, core::LogLevel::DESCRIPTION),
        (translation::TargetLang::NAME, translation::TargetLang::DESCRIPTION),
        (translation::SourceLang::NAME, translation::SourceLang::DESCRIPTION),
        (translation::ChunkMaxChars::NAME, translation::ChunkMaxChars::DESCRIPTION),
        (translation::PrefetchEnabled::NAME, translation::PrefetchEnabled::DESCRIPTION),
        (cache::Enabled::NAME, cache::Enabled::DESCRIPTION),
        (cache::Path::NAME, cache::Path::DESCRIPTION),
        (cache::LocalCacheSize::NAME, cache::LocalCacheSize::DESCRIPTION),
        (layout::MaxPageChars::NAME, layout::MaxPageChars::DESCRIPTION),
        (layout::PaginationTimeout::NAME, layout::PaginationTimeout::DESCRIPTION),
    ];

    let mut docs = String::from("| Variable | Description |\n|---|---|\n");
    for (name, description) in rows {
        docs.push_str(&format!("| `{}` | {} |\n", name, description));
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("Yes", "X").unwrap());
        assert!(!parse_bool("off", "X").unwrap());
        assert!(parse_bool("maybe", "X").is_err());
    }

    #[test]
    fn test_parse_positive_usize_bounds() {
        assert_eq!(parse_positive_usize("42", "X", 1, 100).unwrap(), 42);
        assert!(parse_positive_usize("0", "X", 1, 100).is_err());
        assert!(parse_positive_usize("101", "X", 1, 100).is_err());
        assert!(parse_positive_usize("abc", "X", 1, 100).is_err());
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(translation::TargetLang::parse(" es ").unwrap(), "es");
        assert_eq!(translation::TargetLang::parse("pt-BR").unwrap(), "pt-BR");
        assert!(translation::TargetLang::parse("x").is_err());
        assert_eq!(translation::SourceLang::parse("AUTO").unwrap(), "auto");
    }

    #[test]
    fn test_pagination_timeout_parse() {
        assert_eq!(
            layout::PaginationTimeout::parse("12").unwrap(),
            Duration::from_secs(12)
        );
        assert!(layout::PaginationTimeout::parse("0").is_err());
    }

    #[test]
    fn test_env_docs_lists_every_variable() {
        let docs = generate_env_docs();
        assert!(docs.contains("READER_TRANSLATE_CACHE_PATH"));
        assert!(docs.contains("READER_TRANSLATE_PAGINATION_TIMEOUT"));
    }
}
