//! 翻译服务核心实现
//!
//! 本模块把块规划、页面标记、块缓存和翻译后端组合成面向阅读器的翻译服务。
//!
//! ## 请求流程
//!
//! 1. 通过页面映射查询缓存，命中且能切出该页译文时直接返回
//! 2. 未命中时规划包含该页的块，构建带标记的合并原文
//! 3. 整块调用一次翻译后端，写入缓存
//! 4. 从块译文中切出请求的页面
//!
//! 同一块的并发请求在块 ID 上排队，后到的请求复用先到请求的结果，
//! 不会重复调用翻译后端。
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reader_translate::translation::{
//!     ChunkCacheStore, MemoryBackend, MockProvider, ProviderRegistry, TranslationConfig,
//!     TranslationService,
//! };
//!
//! # async fn example(pages: Vec<String>) -> reader_translate::translation::TranslationResult<()> {
//! let store = ChunkCacheStore::open(Arc::new(MemoryBackend::new()), 64).await?;
//! let registry = Arc::new(ProviderRegistry::shared(Arc::new(MockProvider::new())));
//! let service = TranslationService::new(TranslationConfig::default_with_lang("es"), store, registry)?;
//!
//! let translated = service
//!     .get_page_translation("book-1", 5, &pages[5], "es", &pages)
//!     .await?;
//! println!("{}", translated);
//! # Ok(())
//! # }
//! ```

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::translation::{
    config::TranslationConfig,
    error::{TranslationError, TranslationResult},
    pipeline::planner::ChunkPlanner,
    provider::{LanguagePair, ProviderRegistry},
    storage::{cache::KeyedLocks, Chunk, ChunkCacheStore},
};

/// 阅读器翻译服务
///
/// 服务本身是一个 `Arc` 句柄，克隆开销很小，预翻译任务持有它的克隆在后台运行。
///
/// ## 错误规则
///
/// - 前台请求的后端错误返回给调用方，调用方可以重试或显示原文
/// - 预翻译的错误只记录日志
/// - 缓存读取失败按未命中处理；写入失败时仍然返回已经得到的译文
#[derive(Clone)]
pub struct TranslationService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    /// 块缓存
    store: ChunkCacheStore,

    /// 语言对到后端句柄的注册表
    registry: Arc<ProviderRegistry>,

    /// 块边界规划器
    planner: ChunkPlanner,

    /// 服务配置
    config: TranslationConfig,

    /// 正在翻译的块，键为块 ID
    in_flight: KeyedLocks,

    /// 运行统计
    stats: ServiceStats,
}

impl TranslationService {
    /// 创建翻译服务
    ///
    /// # 参数
    ///
    /// * `config` - 服务配置，块大小、预翻译偏移和缓存开关都从这里读取
    /// * `store` - 已完成版本检查的块缓存
    /// * `registry` - 翻译后端注册表
    ///
    /// # 错误
    ///
    /// 配置验证失败时返回 `ConfigError`。
    pub fn new(
        config: TranslationConfig,
        store: ChunkCacheStore,
        registry: Arc<ProviderRegistry>,
    ) -> TranslationResult<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(ServiceInner {
                store,
                registry,
                planner: ChunkPlanner::new(config.planner_config()),
                config,
                in_flight: KeyedLocks::new(),
                stats: ServiceStats::default(),
            }),
        })
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &ChunkCacheStore {
        &self.inner.store
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.inner.registry
    }

    pub fn planner(&self) -> &ChunkPlanner {
        &self.inner.planner
    }

    /// 获取统计信息
    pub fn get_stats(&self) -> &ServiceStats {
        &self.inner.stats
    }

    /// 获取一页的译文
    ///
    /// # 参数
    ///
    /// * `book_id` - 书籍标识
    /// * `page_index` - 页码（从 0 开始）
    /// * `original_page_text` - 该页原文，必须与 `all_pages[page_index]` 相同
    /// * `target_language` - 目标语言
    /// * `all_pages` - 当前排版下的全部页面
    ///
    /// # 返回值
    ///
    /// 该页的译文。只含空白的页面原样返回，不调用后端。
    ///
    /// # 错误
    ///
    /// - 页码越界或原文与页面数组不一致时返回 `InvalidInput`
    /// - 翻译后端失败时原样返回后端错误，此时不会写入缓存
    pub async fn get_page_translation(
        &self,
        book_id: &str,
        page_index: usize,
        original_page_text: &str,
        target_language: &str,
        all_pages: &[String],
    ) -> TranslationResult<String> {
        let started = Instant::now();
        let stats = &self.inner.stats;
        stats.inc_page_requests();

        let Some(page) = all_pages.get(page_index) else {
            return Err(TranslationError::InvalidInput(format!(
                "页码 {} 超出范围 (共 {} 页)",
                page_index,
                all_pages.len()
            )));
        };
        if page != original_page_text {
            return Err(TranslationError::InvalidInput(format!(
                "第 {} 页原文与页面数组不一致",
                page_index
            )));
        }

        if original_page_text.trim().is_empty() {
            stats.inc_empty_pages();
            return Ok(original_page_text.to_string());
        }

        if let Some(text) = self
            .cached_page(book_id, page_index, original_page_text, target_language)
            .await
        {
            stats.inc_cache_hits();
            metrics::counter!("reader_translate_cache_hits_total").increment(1);
            tracing::debug!("第 {} 页命中缓存", page_index);
            return Ok(text);
        }

        stats.inc_cache_misses();
        metrics::counter!("reader_translate_cache_misses_total").increment(1);

        let span = self.inner.planner.plan(all_pages, page_index)?;
        let chunk = Chunk::plan(book_id, all_pages, span, target_language)?;
        let chunk = self.translate_chunk(chunk).await?;

        let text = chunk.extract_translated_page(page_index)?;
        stats.add_processing_time(started.elapsed());
        Ok(text)
    }

    /// 后台预翻译当前页前后的块
    ///
    /// 向前 `prefetch_lookahead` 页、向后 `prefetch_lookbehind` 页各估计一个目标页，
    /// 越界或已有缓存的目标跳过，其余各启动一个后台任务。任务中的错误只记录日志。
    ///
    /// # 返回值
    ///
    /// 已启动任务的句柄，调用方可以忽略，也可以等待它们完成。
    pub fn pre_translate_nearby_chunks(
        &self,
        book_id: &str,
        current_page_index: usize,
        target_language: &str,
        all_pages: Arc<Vec<String>>,
    ) -> Vec<JoinHandle<()>> {
        let config = &self.inner.config;
        if !config.prefetch_enabled {
            return Vec::new();
        }

        let targets = [
            current_page_index.checked_add(config.prefetch_lookahead),
            current_page_index.checked_sub(config.prefetch_lookbehind),
        ];

        targets
            .into_iter()
            .flatten()
            .filter(|&target| target != current_page_index && target < all_pages.len())
            .map(|target| {
                let service = self.clone();
                let book_id = book_id.to_string();
                let language = target_language.to_string();
                let pages = Arc::clone(&all_pages);
                self.inner.stats.inc_prefetch_spawned();

                tokio::spawn(async move {
                    match service.prefetch_page(&book_id, target, &language, &pages).await {
                        Ok(true) => tracing::debug!("预翻译第 {} 页完成", target),
                        Ok(false) => tracing::debug!("第 {} 页已有缓存，跳过预翻译", target),
                        Err(e) => {
                            service.inner.stats.inc_prefetch_failures();
                            metrics::counter!("reader_translate_prefetch_failures_total")
                                .increment(1);
                            tracing::warn!("预翻译第 {} 页失败: {}", target, e);
                        }
                    }
                })
            })
            .collect()
    }

    /// 关闭全部翻译后端
    pub async fn close(&self) -> TranslationResult<()> {
        self.inner.registry.close_all().await
    }

    /// 预翻译一页，返回是否真的执行了翻译
    async fn prefetch_page(
        &self,
        book_id: &str,
        page_index: usize,
        target_language: &str,
        all_pages: &[String],
    ) -> TranslationResult<bool> {
        let page = &all_pages[page_index];
        if page.trim().is_empty()
            || self
                .cached_page(book_id, page_index, page, target_language)
                .await
                .is_some()
        {
            return Ok(false);
        }

        self.get_page_translation(book_id, page_index, page, target_language, all_pages)
            .await?;
        Ok(true)
    }

    /// 从缓存中取出一页的译文
    ///
    /// 缓存块中该页的原文必须与当前原文相同；读取失败、原文不一致或切分失败都按未命中处理。
    async fn cached_page(
        &self,
        book_id: &str,
        page_index: usize,
        original_page_text: &str,
        target_language: &str,
    ) -> Option<String> {
        if !self.inner.config.cache_enabled {
            return None;
        }

        let chunk = match self
            .inner
            .store
            .get_for_page(book_id, page_index, target_language)
            .await
        {
            Ok(Some(chunk)) if chunk.is_translated() => chunk,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!("读取第 {} 页缓存失败，按未命中处理: {}", page_index, e);
                return None;
            }
        };

        match chunk.original_page(page_index) {
            Ok(original) if original == original_page_text => {}
            _ => {
                tracing::debug!("缓存块 {} 的原文与当前第 {} 页不一致", chunk.chunk_id, page_index);
                return None;
            }
        }

        match chunk.extract_translated_page(page_index) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!("从缓存块 {} 切分第 {} 页失败: {}", chunk.chunk_id, page_index, e);
                None
            }
        }
    }

    /// 整块翻译并写入缓存
    ///
    /// 在块 ID 上加锁；拿到锁后先复查缓存，其它请求已经完成同一块时直接复用。
    async fn translate_chunk(&self, mut chunk: Chunk) -> TranslationResult<Chunk> {
        let inner = &self.inner;
        let _guard = inner.in_flight.lock(&chunk.chunk_id).await;

        if inner.config.cache_enabled {
            match inner.store.get(&chunk.chunk_id).await {
                Ok(Some(existing))
                    if existing.is_translated() && existing.content_hash == chunk.content_hash =>
                {
                    inner.stats.inc_coalesced_requests();
                    tracing::debug!("块 {} 已由其它请求翻译", chunk.chunk_id);
                    return Ok(existing);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("复查块 {} 缓存失败: {}", chunk.chunk_id, e),
            }
        }

        let source_language = inner.config.source_lang();
        let pair = LanguagePair::new(source_language, &chunk.target_language);
        let provider = inner.registry.open(&pair)?;

        let started = Instant::now();
        inner.stats.inc_provider_calls();
        metrics::counter!("reader_translate_provider_calls_total").increment(1);

        let translated = provider
            .translate(&chunk.original_text, &chunk.target_language, source_language)
            .await
            .map_err(|e| {
                inner.stats.inc_errors();
                tracing::warn!("块 {} 翻译失败: {}", chunk.chunk_id, e);
                e
            })?;

        let chars = chunk.page_break_offsets.last().copied().unwrap_or(0);
        chunk.mark_translated(translated);
        inner.stats.add_chars_translated(chars);
        tracing::info!(
            "块 {} 翻译完成: 页 {}-{}, {} 字符, 耗时 {:?}",
            chunk.chunk_id,
            chunk.start_page_index,
            chunk.end_page_index,
            chars,
            started.elapsed()
        );

        if inner.config.cache_enabled {
            if let Err(e) = inner.store.put(&chunk).await {
                inner.stats.inc_cache_write_failures();
                tracing::warn!("写入块 {} 失败，下次访问时重试: {}", chunk.chunk_id, e);
            }
        }

        Ok(chunk)
    }
}

/// 翻译服务运行统计
///
/// 所有字段都是原子类型，前台请求和后台预翻译任务并发更新。
#[derive(Debug, Default)]
pub struct ServiceStats {
    /// 页面翻译请求数
    pub page_requests: AtomicUsize,

    /// 缓存命中次数
    pub cache_hits: AtomicUsize,

    /// 缓存未命中次数
    pub cache_misses: AtomicUsize,

    /// 只含空白、直接返回的页面数
    pub empty_pages: AtomicUsize,

    /// 翻译后端调用次数
    pub provider_calls: AtomicUsize,

    /// 等待其它请求完成同一块后复用结果的次数
    pub coalesced_requests: AtomicUsize,

    /// 已翻译字符总数
    pub chars_translated: AtomicUsize,

    /// 启动的预翻译任务数
    pub prefetch_spawned: AtomicUsize,

    /// 失败的预翻译任务数
    pub prefetch_failures: AtomicUsize,

    /// 缓存写入失败次数
    pub cache_write_failures: AtomicUsize,

    /// 后端错误次数
    pub errors_encountered: AtomicUsize,

    /// 未命中请求的总处理时间（微秒）
    pub processing_time: AtomicU64,
}

impl ServiceStats {
    pub fn inc_page_requests(&self) {
        self.page_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_empty_pages(&self) {
        self.empty_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_provider_calls(&self) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_coalesced_requests(&self) {
        self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_chars_translated(&self, count: usize) {
        self.chars_translated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_prefetch_spawned(&self) {
        self.prefetch_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_prefetch_failures(&self) {
        self.prefetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_write_failures(&self) {
        self.cache_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors_encountered.fetch_add(1, Ordering::Relaxed);
    }

    /// 添加处理时间
    pub fn add_processing_time(&self, duration: Duration) {
        self.processing_time
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// 获取统计数据快照
    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        ServiceStatsSnapshot {
            page_requests: self.page_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            empty_pages: self.empty_pages.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            chars_translated: self.chars_translated.load(Ordering::Relaxed),
            prefetch_spawned: self.prefetch_spawned.load(Ordering::Relaxed),
            prefetch_failures: self.prefetch_failures.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
            errors_encountered: self.errors_encountered.load(Ordering::Relaxed),
            processing_time: Duration::from_micros(self.processing_time.load(Ordering::Relaxed)),
        }
    }
}

/// 统计数据的不可变快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceStatsSnapshot {
    pub page_requests: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub empty_pages: usize,
    pub provider_calls: usize,
    pub coalesced_requests: usize,
    pub chars_translated: usize,
    pub prefetch_spawned: usize,
    pub prefetch_failures: usize,
    pub cache_write_failures: usize,
    pub errors_encountered: usize,
    pub processing_time: Duration,
}

impl ServiceStatsSnapshot {
    /// 缓存命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
