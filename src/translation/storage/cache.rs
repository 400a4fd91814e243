//! 翻译块缓存
//!
//! 两级结构：进程内 LRU 层在前，`CacheBackend` 持久层在后。
//!
//! - 块记录与其全部页面映射在同一批写入中提交，块先于映射写入
//! - 清除时先删映射再删块，清除后不会有映射指向已删除的块
//! - 初始化时比较持久化的缓存版本，不一致（包括缺失）即清空全部缓存
//! - 同一键的写入串行化，不同键可以并发写入

use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use dashmap::DashMap;
use lru::LruCache;
use serde::Deserialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::backend::{CacheBackend, Namespace, WriteOp};
use super::chunk::{page_key, Chunk, PageMapping};
use crate::translation::error::{TranslationError, TranslationResult};

/// 缓存结构版本，块记录格式变化时递增
pub const CACHE_SCHEMA_VERSION: u32 = 1;

const VERSION_KEY: &str = "cache_schema_version";

// ============================================================================
// 键级锁
// ============================================================================

/// 按键加锁，没有持有者的锁自动回收
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// 键级锁守卫
pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取 `key` 上的锁，等待其它持有者释放
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mutex = self.locks.entry(key.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// 当前是否有人持有或等待 `key` 上的锁
    pub fn is_locked(&self, key: &str) -> bool {
        self.locks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.owner
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

// ============================================================================
// 缓存统计
// ============================================================================

/// 缓存统计信息
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub total_chunks: usize,
    pub total_mappings: usize,
    pub per_book_chunk_counts: BTreeMap<String, usize>,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 清除时只需要块记录的归属字段
#[derive(Deserialize)]
struct ChunkOwner {
    book_id: String,
    target_language: String,
}

// ============================================================================
// 块缓存
// ============================================================================

/// 翻译块缓存
#[derive(Clone)]
pub struct ChunkCacheStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    backend: Arc<dyn CacheBackend>,
    local: Option<Mutex<LruCache<String, Chunk>>>,
    write_locks: KeyedLocks,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChunkCacheStore {
    /// 打开缓存并做版本检查
    pub async fn open(
        backend: Arc<dyn CacheBackend>,
        local_cache_size: usize,
    ) -> TranslationResult<Self> {
        Self::open_with_version(backend, local_cache_size, CACHE_SCHEMA_VERSION).await
    }

    /// 以指定结构版本打开缓存
    pub async fn open_with_version(
        backend: Arc<dyn CacheBackend>,
        local_cache_size: usize,
        version: u32,
    ) -> TranslationResult<Self> {
        let local = NonZeroUsize::new(local_cache_size).map(|size| Mutex::new(LruCache::new(size)));
        let store = Self {
            inner: Arc::new(StoreInner {
                backend,
                local,
                write_locks: KeyedLocks::new(),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        };

        let stored = store.schema_version().await?;
        if stored != Some(version) {
            tracing::info!(
                "缓存版本不匹配 ({:?} -> {})，清空全部缓存",
                stored,
                version
            );
            store.clear_all().await?;
            store
                .inner
                .backend
                .write_batch(vec![WriteOp::put(
                    Namespace::Meta,
                    VERSION_KEY,
                    version.to_string().into_bytes(),
                )])
                .await?;
        }

        tracing::debug!(
            "块缓存已就绪: 后端 {}, 版本 {}",
            store.inner.backend.name(),
            version
        );
        Ok(store)
    }

    /// 持久化的缓存版本
    pub async fn schema_version(&self) -> TranslationResult<Option<u32>> {
        let raw = self.inner.backend.get(Namespace::Meta, VERSION_KEY).await?;
        Ok(raw.and_then(|bytes| String::from_utf8(bytes).ok()?.trim().parse().ok()))
    }

    /// 写入块记录并刷新块内每一页的映射
    pub async fn put(&self, chunk: &Chunk) -> TranslationResult<()> {
        if !chunk.is_consistent() {
            return Err(TranslationError::InvalidInput(format!(
                "块 {} 的分页偏移与页面范围不一致",
                chunk.chunk_id
            )));
        }

        let _guard = self.inner.write_locks.lock(&chunk.chunk_id).await;

        let mut ops = Vec::with_capacity(chunk.span().len() + 1);
        ops.push(WriteOp::put(
            Namespace::Chunks,
            chunk.chunk_id.clone(),
            serde_json::to_vec(chunk)?,
        ));
        for mapping in chunk.mappings() {
            ops.push(WriteOp::put(
                Namespace::Pages,
                mapping.key(),
                serde_json::to_vec(&mapping)?,
            ));
        }
        self.inner.backend.write_batch(ops).await?;

        if let Some(local) = &self.inner.local {
            local.lock().await.put(chunk.chunk_id.clone(), chunk.clone());
        }

        tracing::debug!(
            "缓存块 {} (页 {}-{})",
            chunk.chunk_id,
            chunk.start_page_index,
            chunk.end_page_index
        );
        Ok(())
    }

    /// 按块 ID 读取
    pub async fn get(&self, chunk_id: &str) -> TranslationResult<Option<Chunk>> {
        if let Some(local) = &self.inner.local {
            if let Some(chunk) = local.lock().await.get(chunk_id) {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(chunk.clone()));
            }
        }

        let Some(bytes) = self.inner.backend.get(Namespace::Chunks, chunk_id).await? else {
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let chunk: Chunk = serde_json::from_slice(&bytes)?;
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        if let Some(local) = &self.inner.local {
            local.lock().await.put(chunk_id.to_string(), chunk.clone());
        }
        Ok(Some(chunk))
    }

    /// 通过页面映射读取页面所属的块
    ///
    /// 映射指向的块已不存在时删除该映射并返回 `None`。
    pub async fn get_for_page(
        &self,
        book_id: &str,
        page_index: usize,
        language: &str,
    ) -> TranslationResult<Option<Chunk>> {
        let key = page_key(book_id, page_index, language);
        let Some(bytes) = self.inner.backend.get(Namespace::Pages, &key).await? else {
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let mapping: PageMapping = serde_json::from_slice(&bytes)?;
        match self.get(&mapping.chunk_id).await? {
            Some(chunk) if chunk.span().contains(page_index) => Ok(Some(chunk)),
            _ => {
                tracing::warn!("页面映射 {} 指向无效块 {}，已删除", key, mapping.chunk_id);
                self.inner
                    .backend
                    .write_batch(vec![WriteOp::delete(Namespace::Pages, key)])
                    .await?;
                Ok(None)
            }
        }
    }

    /// 页面是否已有译文
    pub async fn is_translated(
        &self,
        book_id: &str,
        page_index: usize,
        language: &str,
    ) -> TranslationResult<bool> {
        Ok(self
            .get_for_page(book_id, page_index, language)
            .await?
            .map_or(false, |chunk| chunk.is_translated()))
    }

    /// 清除一本书的全部缓存，返回删除的块数
    pub async fn clear_book(&self, book_id: &str) -> TranslationResult<usize> {
        let removed = self.clear_matching(|book, _| book == book_id).await?;
        tracing::info!("已清除书籍 {} 的 {} 个缓存块", book_id, removed);
        Ok(removed)
    }

    /// 清除一本书某个语言的缓存，返回删除的块数
    pub async fn clear_book_language(&self, book_id: &str, language: &str) -> TranslationResult<usize> {
        let removed = self
            .clear_matching(|book, lang| book == book_id && lang == language)
            .await?;
        tracing::info!(
            "已清除书籍 {} 语言 {} 的 {} 个缓存块",
            book_id,
            language,
            removed
        );
        Ok(removed)
    }

    /// 清空全部块和映射
    pub async fn clear_all(&self) -> TranslationResult<()> {
        self.inner.backend.clear().await?;
        if let Some(local) = &self.inner.local {
            local.lock().await.clear();
        }
        tracing::info!("已清空全部翻译缓存");
        Ok(())
    }

    /// 统计信息
    pub async fn stats(&self) -> TranslationResult<CacheStats> {
        let chunks = self.inner.backend.scan(Namespace::Chunks).await?;
        let total_mappings = self.inner.backend.len(Namespace::Pages).await?;

        let mut per_book_chunk_counts = BTreeMap::new();
        for (key, bytes) in &chunks {
            match serde_json::from_slice::<ChunkOwner>(bytes) {
                Ok(owner) => *per_book_chunk_counts.entry(owner.book_id).or_insert(0) += 1,
                Err(e) => tracing::warn!("无法解析块记录 {}: {}", key, e),
            }
        }

        Ok(CacheStats {
            total_chunks: chunks.len(),
            total_mappings,
            per_book_chunk_counts,
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    async fn clear_matching<F>(&self, matches: F) -> TranslationResult<usize>
    where
        F: Fn(&str, &str) -> bool,
    {
        let mut ops = Vec::new();

        for (key, bytes) in self.inner.backend.scan(Namespace::Pages).await? {
            match serde_json::from_slice::<PageMapping>(&bytes) {
                Ok(mapping) if matches(&mapping.book_id, &mapping.language) => {
                    ops.push(WriteOp::delete(Namespace::Pages, key));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("无法解析页面映射 {}: {}", key, e),
            }
        }

        let mut removed = HashSet::new();
        for (key, bytes) in self.inner.backend.scan(Namespace::Chunks).await? {
            match serde_json::from_slice::<ChunkOwner>(&bytes) {
                Ok(owner) if matches(&owner.book_id, &owner.target_language) => {
                    ops.push(WriteOp::delete(Namespace::Chunks, key.clone()));
                    removed.insert(key);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("无法解析块记录 {}: {}", key, e),
            }
        }

        self.inner.backend.write_batch(ops).await?;

        if let Some(local) = &self.inner.local {
            let mut local = local.lock().await;
            for key in &removed {
                local.pop(key);
            }
        }

        Ok(removed.len())
    }
}
