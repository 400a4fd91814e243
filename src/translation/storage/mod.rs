//! 存储模块
//!
//! 提供翻译块模型、块缓存和持久化后端。

pub mod backend;
pub mod cache;
pub mod chunk;

pub use backend::{CacheBackend, MemoryBackend, Namespace, RedbBackend, WriteOp};
pub use cache::{CacheStats, ChunkCacheStore, KeyGuard, KeyedLocks, CACHE_SCHEMA_VERSION};
pub use chunk::{chunk_key, join_pages, page_key, Chunk, ChunkSpan, PageMapping};
