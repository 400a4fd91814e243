//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。前台请求路径上的错误会返回给调用方，
//! 预翻译（后台）路径上的同类错误只记录日志。

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// 翻译后端不可用
    #[error("翻译服务不可用: {0}")]
    ProviderUnavailable(String),

    /// 翻译后端不支持该语言
    #[error("翻译服务不支持语言: {language}")]
    ProviderUnsupportedLanguage { language: String },

    /// 页面标记在翻译往返中被破坏，无法切出页面
    #[error("页面提取失败: {0}")]
    ExtractionFailure(String),

    /// 缓存读写错误
    #[error("缓存IO错误: {0}")]
    CacheIoFailure(String),

    /// 分页超时
    #[error("分页超时: {0}")]
    PaginationTimeout(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::ProviderUnavailable(_) => true,
            TranslationError::ExtractionFailure(_) => true,
            TranslationError::CacheIoFailure(_) => true,
            TranslationError::ProviderUnsupportedLanguage { .. } => false,
            TranslationError::PaginationTimeout(_) => false,
            TranslationError::ConfigError(_) => false,
            TranslationError::InvalidInput(_) => false,
            TranslationError::SerializationError(_) => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ProviderUnavailable(_) => ErrorSeverity::Error,
            TranslationError::ProviderUnsupportedLanguage { .. } => ErrorSeverity::Error,
            TranslationError::ExtractionFailure(_) => ErrorSeverity::Warning,
            TranslationError::CacheIoFailure(_) => ErrorSeverity::Warning,
            TranslationError::PaginationTimeout(_) => ErrorSeverity::Warning,
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ProviderUnavailable(_)
            | TranslationError::ProviderUnsupportedLanguage { .. } => ErrorCategory::Provider,
            TranslationError::ExtractionFailure(_) => ErrorCategory::Extraction,
            TranslationError::CacheIoFailure(_) => ErrorCategory::Cache,
            TranslationError::PaginationTimeout(_) => ErrorCategory::Layout,
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let append = |msg: &mut String| {
            let new_msg = format!("{} (上下文: {})", msg, context);
            *msg = new_msg;
        };

        match &mut self {
            TranslationError::ProviderUnavailable(msg)
            | TranslationError::ExtractionFailure(msg)
            | TranslationError::CacheIoFailure(msg)
            | TranslationError::PaginationTimeout(msg)
            | TranslationError::ConfigError(msg)
            | TranslationError::InvalidInput(msg)
            | TranslationError::SerializationError(msg)
            | TranslationError::InternalError(msg) => append(msg),
            TranslationError::ProviderUnsupportedLanguage { .. } => {}
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Provider,
    Extraction,
    Cache,
    Layout,
    Configuration,
    Input,
    Serialization,
    Internal,
}

/// 标准错误转换
impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::CacheIoFailure(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

impl From<redb::Error> for TranslationError {
    fn from(error: redb::Error) -> Self {
        TranslationError::CacheIoFailure(format!("存储引擎错误: {}", error))
    }
}

impl From<tokio::task::JoinError> for TranslationError {
    fn from(error: tokio::task::JoinError) -> Self {
        TranslationError::InternalError(format!("后台任务失败: {}", error))
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误，不改变错误本身
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }

    /// 创建缓存错误
    pub fn cache_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::CacheIoFailure(msg.to_string())
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::ConfigError(msg.to_string())
    }

    /// 创建输入验证错误
    pub fn validation_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::InvalidInput(msg.to_string())
    }

    /// 创建提取错误
    pub fn extraction_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::ExtractionFailure(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = TranslationError::CacheIoFailure("disk full".to_string());
        assert!(err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Cache);
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = TranslationError::ProviderUnsupportedLanguage {
            language: "tlh".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Provider);
        assert!(err.to_string().contains("tlh"));
    }

    #[test]
    fn test_with_context() {
        let err = TranslationError::ExtractionFailure("missing marker".to_string())
            .with_context("page 4");
        assert!(err.to_string().contains("missing marker"));
        assert!(err.to_string().contains("page 4"));
    }

    #[test]
    fn test_io_error_maps_to_cache_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TranslationError = io.into();
        assert!(matches!(err, TranslationError::CacheIoFailure(_)));
    }
}
