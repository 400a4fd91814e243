//! 翻译系统核心模块
//!
//! 组合块规划、页面标记、块缓存和翻译后端，为阅读器提供按页翻译的服务。
//!
//! ## 模块依赖关系
//!
//! ```text
//! TranslationService (service.rs)
//!     ├── ChunkPlanner (pipeline/planner.rs)
//!     ├── PageMarkerCodec (pipeline/markers.rs)
//!     ├── ChunkCacheStore (storage/cache.rs)
//!     │       └── CacheBackend (storage/backend.rs)
//!     └── ProviderRegistry (provider.rs)
//! ```

pub mod service;

/// 阅读器翻译服务 - 主要的对外接口
pub use service::TranslationService;

/// 服务运行统计信息
pub use service::{ServiceStats, ServiceStatsSnapshot};
