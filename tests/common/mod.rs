// 集成测试公共模块
//
// 提供测试书籍、服务环境和断言辅助

use std::path::Path;
use std::sync::Arc;

use reader_translate::translation::{
    CacheBackend, ChunkCacheStore, ChunkSpan, MemoryBackend, MockProvider, ProviderRegistry,
    RedbBackend, TranslationConfig, TranslationService,
};

/// 测试数据生成器
pub struct TestDataGenerator;

impl TestDataGenerator {
    const SENTENCES: [&'static str; 6] = [
        "The harbour was quiet before the storm arrived.",
        "Sailors mended their nets and watched the grey horizon.",
        "Nobody spoke of the ship that had not returned.",
        "A lantern swung above the tavern door in the wind.",
        "Children ran along the pier chasing gulls and shadows.",
        "Old Maren counted the bells from the distant chapel.",
    ];

    /// 生成一本书：每页恰好 `chars_per_page` 个 ASCII 字符，以句号结尾、大写字母开头
    pub fn book(pages: usize, chars_per_page: usize) -> Vec<String> {
        (0..pages)
            .map(|page| {
                let mut text = format!("Page {} begins here.", page);
                let mut i = page;
                while text.len() < chars_per_page {
                    text.push(' ');
                    text.push_str(Self::SENTENCES[i % Self::SENTENCES.len()]);
                    i += 1;
                }
                text.truncate(chars_per_page - 1);
                if text.ends_with(' ') {
                    text.pop();
                    text.push('s');
                }
                text.push('.');
                text
            })
            .collect()
    }

    /// 没有段落和换行的长文本
    pub fn flat_text(chars: usize) -> String {
        let mut text = String::with_capacity(chars + 64);
        let mut i = 0;
        while text.len() < chars {
            text.push_str(Self::SENTENCES[i % Self::SENTENCES.len()]);
            text.push(' ');
            i += 1;
        }
        text.truncate(chars);
        text
    }

    /// 多段落文本
    pub fn paragraphs(count: usize) -> String {
        (0..count)
            .map(|p| {
                (0..4)
                    .map(|s| Self::SENTENCES[(p + s) % Self::SENTENCES.len()])
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// 测试环境：模拟后端 + 块缓存 + 翻译服务
pub struct TestEnvironment {
    pub mock: Arc<MockProvider>,
    pub store: ChunkCacheStore,
    pub service: TranslationService,
}

impl TestEnvironment {
    /// 内存缓存
    pub async fn memory(mock: MockProvider, config: TranslationConfig) -> Self {
        Self::with_backend(mock, config, Arc::new(MemoryBackend::new())).await
    }

    /// redb 缓存
    pub async fn redb(mock: MockProvider, config: TranslationConfig, path: &Path) -> Self {
        let backend = RedbBackend::open(path).expect("open redb backend");
        Self::with_backend(mock, config, Arc::new(backend)).await
    }

    pub async fn with_backend(
        mock: MockProvider,
        config: TranslationConfig,
        backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let mock = Arc::new(mock);
        let store = ChunkCacheStore::open(backend, config.local_cache_size)
            .await
            .expect("open chunk store");
        let registry = Arc::new(ProviderRegistry::shared(mock.clone()));
        let service =
            TranslationService::new(config, store.clone(), registry).expect("create service");

        Self {
            mock,
            store,
            service,
        }
    }

    /// 翻译一页
    pub async fn translate(&self, book: &str, page: usize, lang: &str, pages: &[String]) -> String {
        self.service
            .get_page_translation(book, page, &pages[page], lang, pages)
            .await
            .expect("page translation")
    }
}

/// 默认配置，目标语言为 `lang`
pub fn config_for(lang: &str) -> TranslationConfig {
    TranslationConfig::default_with_lang(lang)
}

/// 断言辅助
pub struct AssertionHelper;

impl AssertionHelper {
    /// 块内每一页都已翻译
    pub async fn assert_span_translated(
        store: &ChunkCacheStore,
        book: &str,
        span: ChunkSpan,
        lang: &str,
    ) {
        for page in span.pages() {
            assert!(
                store
                    .is_translated(book, page, lang)
                    .await
                    .expect("is_translated"),
                "page {} should be translated",
                page
            );
        }
    }
}
