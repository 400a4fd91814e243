// 块缓存持久化集成测试

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use reader_translate::translation::storage::{Namespace, WriteOp};
use reader_translate::translation::{
    CacheBackend, ChunkCacheStore, MemoryBackend, MockProvider, ProviderRegistry,
    TranslationError, TranslationResult, TranslationService, CACHE_SCHEMA_VERSION,
};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{config_for, TestDataGenerator, TestEnvironment};

const BOOK: &str = "harbour";

#[tokio::test]
async fn test_clear_book_language_keeps_other_languages() {
    let env = TestEnvironment::memory(MockProvider::new(), config_for("es")).await;
    let pages = TestDataGenerator::book(12, 1000);

    env.translate(BOOK, 5, "es", &pages).await;
    env.translate(BOOK, 5, "fr", &pages).await;
    env.translate("lighthouse", 5, "es", &pages).await;

    let removed = env
        .store
        .clear_book_language(BOOK, "es")
        .await
        .expect("clear");
    assert_eq!(removed, 1);

    for page in 4..=7 {
        assert!(!env.store.is_translated(BOOK, page, "es").await.expect("es"));
        assert!(env.store.is_translated(BOOK, page, "fr").await.expect("fr"));
        assert!(env
            .store
            .is_translated("lighthouse", page, "es")
            .await
            .expect("other book"));
    }

    let stats = env.store.stats().await.expect("stats");
    assert_eq!(stats.total_chunks, 2);
    assert_eq!(stats.total_mappings, 8);
    assert_eq!(stats.per_book_chunk_counts.get(BOOK), Some(&1));
}

#[tokio::test]
async fn test_clear_book_removes_every_language() {
    let env = TestEnvironment::memory(MockProvider::new(), config_for("es")).await;
    let pages = TestDataGenerator::book(12, 1000);

    env.translate(BOOK, 0, "es", &pages).await;
    env.translate(BOOK, 9, "es", &pages).await;
    env.translate(BOOK, 0, "fr", &pages).await;

    assert_eq!(env.store.clear_book(BOOK).await.expect("clear"), 3);
    let stats = env.store.stats().await.expect("stats");
    assert_eq!(stats.total_chunks, 0);
    assert_eq!(stats.total_mappings, 0);

    // 清除后重新请求会再次翻译
    env.translate(BOOK, 0, "es", &pages).await;
    assert_eq!(env.mock.call_count(), 4);
}

#[tokio::test]
async fn test_schema_version_bump_wipes_cache() {
    let backend = Arc::new(MemoryBackend::new());
    let pages = TestDataGenerator::book(12, 1000);

    let env = TestEnvironment::with_backend(MockProvider::new(), config_for("es"), backend.clone())
        .await;
    env.translate(BOOK, 5, "es", &pages).await;
    assert_eq!(
        env.store.schema_version().await.expect("version"),
        Some(CACHE_SCHEMA_VERSION)
    );

    // 相同版本重新打开，数据保留
    let same = ChunkCacheStore::open(backend.clone(), 16).await.expect("reopen");
    assert!(same.is_translated(BOOK, 5, "es").await.expect("lookup"));

    // 新版本打开时清空
    let bumped = ChunkCacheStore::open_with_version(backend.clone(), 16, CACHE_SCHEMA_VERSION + 1)
        .await
        .expect("bump");
    assert!(!bumped.is_translated(BOOK, 5, "es").await.expect("lookup"));
    assert_eq!(bumped.stats().await.expect("stats").total_chunks, 0);
    assert_eq!(
        bumped.schema_version().await.expect("version"),
        Some(CACHE_SCHEMA_VERSION + 1)
    );
}

#[tokio::test]
async fn test_redb_cache_survives_restart() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("cache").join("chunks.redb");
    let pages = TestDataGenerator::book(12, 1000);

    {
        let env = TestEnvironment::redb(MockProvider::new(), config_for("es"), &path).await;
        env.translate(BOOK, 5, "es", &pages).await;
        assert_eq!(env.mock.call_count(), 1);
        env.service.close().await.expect("close");
    }

    let env = TestEnvironment::redb(MockProvider::new(), config_for("es"), &path).await;
    assert_eq!(env.store.backend_name(), "redb");
    for page in 4..=7 {
        assert_eq!(env.translate(BOOK, page, "es", &pages).await, pages[page].to_uppercase());
    }
    assert_eq!(env.mock.call_count(), 0);

    let stats = env.store.stats().await.expect("stats");
    assert_eq!(stats.total_chunks, 1);
    assert_eq!(stats.total_mappings, 4);
}

// ============================================================================
// 故障后端
// ============================================================================

/// 可以按需让读或写失败的内存后端
#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyBackend {
    fn io_error(op: &str) -> TranslationError {
        TranslationError::CacheIoFailure(format!("模拟{}失败", op))
    }
}

#[async_trait]
impl CacheBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn get(&self, namespace: Namespace, key: &str) -> TranslationResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::io_error("读取"));
        }
        self.inner.get(namespace, key).await
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> TranslationResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::io_error("写入"));
        }
        self.inner.write_batch(ops).await
    }

    async fn scan(&self, namespace: Namespace) -> TranslationResult<Vec<(String, Vec<u8>)>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::io_error("扫描"));
        }
        self.inner.scan(namespace).await
    }

    async fn clear(&self) -> TranslationResult<()> {
        self.inner.clear().await
    }
}

async fn flaky_service(
    backend: Arc<FlakyBackend>,
    mock: Arc<MockProvider>,
) -> TranslationService {
    // 不启用进程内 LRU，让每次读取都经过后端
    let store = ChunkCacheStore::open(backend, 0).await.expect("open store");
    TranslationService::new(
        config_for("es"),
        store,
        Arc::new(ProviderRegistry::shared(mock)),
    )
    .expect("service")
}

#[tokio::test]
async fn test_write_failure_still_returns_translation() {
    let backend = Arc::new(FlakyBackend::default());
    let mock = Arc::new(MockProvider::new());
    let service = flaky_service(backend.clone(), mock.clone()).await;
    let pages = TestDataGenerator::book(12, 1000);

    backend.fail_writes.store(true, Ordering::SeqCst);
    let translated = service
        .get_page_translation(BOOK, 5, &pages[5], "es", &pages)
        .await
        .expect("translation despite write failure");
    assert_eq!(translated, pages[5].to_uppercase());
    assert_eq!(service.get_stats().snapshot().cache_write_failures, 1);
    assert!(!service.store().is_translated(BOOK, 5, "es").await.expect("lookup"));

    // 写入恢复后下一次请求补写缓存
    backend.fail_writes.store(false, Ordering::SeqCst);
    service
        .get_page_translation(BOOK, 5, &pages[5], "es", &pages)
        .await
        .expect("retry");
    assert_eq!(mock.call_count(), 2);
    assert!(service.store().is_translated(BOOK, 5, "es").await.expect("lookup"));
}

#[tokio::test]
async fn test_read_failure_counts_as_miss() {
    let backend = Arc::new(FlakyBackend::default());
    let mock = Arc::new(MockProvider::new());
    let service = flaky_service(backend.clone(), mock.clone()).await;
    let pages = TestDataGenerator::book(12, 1000);

    service
        .get_page_translation(BOOK, 5, &pages[5], "es", &pages)
        .await
        .expect("first");

    backend.fail_reads.store(true, Ordering::SeqCst);
    let translated = service
        .get_page_translation(BOOK, 5, &pages[5], "es", &pages)
        .await
        .expect("translation despite read failure");
    assert_eq!(translated, pages[5].to_uppercase());
    assert_eq!(mock.call_count(), 2);

    let snapshot = service.get_stats().snapshot();
    assert_eq!(snapshot.cache_misses, 2);
    assert_eq!(snapshot.cache_hits, 0);
}
