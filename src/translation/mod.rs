//! 翻译模块
//!
//! 按块翻译书籍页面并缓存结果：
//! - **core**: 面向阅读器的翻译服务
//! - **pipeline**: 块边界规划和页面标记编解码
//! - **storage**: 块模型、块缓存和持久化后端
//! - **provider**: 翻译后端契约和按语言对管理的注册表
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reader_translate::translation::{
//!     ChunkCacheStore, MockProvider, ProviderRegistry, RedbBackend, TranslationConfig,
//!     TranslationService,
//! };
//!
//! # async fn example(pages: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = TranslationConfig::default_with_lang("es");
//! let backend = Arc::new(RedbBackend::open(config.cache_path())?);
//! let store = ChunkCacheStore::open(backend, config.local_cache_size).await?;
//! let registry = Arc::new(ProviderRegistry::shared(Arc::new(MockProvider::new())));
//! let service = TranslationService::new(config, store, registry)?;
//!
//! let page = service.get_page_translation("book", 0, &pages[0], "es", &pages).await?;
//! service.pre_translate_nearby_chunks("book", 0, "es", Arc::new(pages));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 配置管理模块 - 块大小、预翻译、缓存和分页配置
pub mod config;

/// 核心翻译服务模块
pub mod core;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 块边界规划和页面标记
pub mod pipeline;

/// 翻译后端
pub mod provider;

/// 块模型和缓存
pub mod storage;

// ============================================================================
// 核心API导出
// ============================================================================

pub use core::{ServiceStats, ServiceStatsSnapshot, TranslationService};

pub use config::{constants, ConfigManager, TranslationConfig};

pub use error::{ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};

pub use pipeline::{ChunkPlanner, CombinedText, PageMarkerCodec, PlannerConfig};

pub use provider::{
    LanguagePair, MockProvider, ProviderFactory, ProviderRegistry, SharedProviderFactory,
    TranslationProvider,
};

pub use storage::{
    CacheBackend, CacheStats, Chunk, ChunkCacheStore, ChunkSpan, MemoryBackend, PageMapping,
    RedbBackend, CACHE_SCHEMA_VERSION,
};
