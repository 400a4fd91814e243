//! 翻译后端
//!
//! 核心只依赖 `TranslationProvider` 这一契约：整段翻译和语言检测。
//! 每个语言对的后端句柄由 `ProviderRegistry` 显式打开和关闭。

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::markers::strip_markers;

/// 翻译后端
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// 后端名称
    fn name(&self) -> &str;

    /// 翻译整段文本，`source_language` 为 `None` 时由后端自行检测
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        source_language: Option<&str>,
    ) -> TranslationResult<String>;

    /// 检测文本语言
    async fn detect_language(&self, text: &str) -> TranslationResult<String>;

    /// 释放后端资源
    async fn close(&self) -> TranslationResult<()> {
        Ok(())
    }
}

/// 语言对
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LanguagePair {
    /// 源语言，`None` 表示自动检测
    pub source: Option<String>,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: Option<&str>, target: &str) -> Self {
        Self {
            source: source.map(str::to_string),
            target: target.to_string(),
        }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{}",
            self.source.as_deref().unwrap_or("auto"),
            self.target
        )
    }
}

/// 为语言对创建后端
pub trait ProviderFactory: Send + Sync {
    fn create(&self, pair: &LanguagePair) -> TranslationResult<Arc<dyn TranslationProvider>>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&LanguagePair) -> TranslationResult<Arc<dyn TranslationProvider>> + Send + Sync,
{
    fn create(&self, pair: &LanguagePair) -> TranslationResult<Arc<dyn TranslationProvider>> {
        self(pair)
    }
}

/// 所有语言对共用同一个后端
pub struct SharedProviderFactory {
    provider: Arc<dyn TranslationProvider>,
}

impl SharedProviderFactory {
    pub fn new(provider: Arc<dyn TranslationProvider>) -> Self {
        Self { provider }
    }
}

impl ProviderFactory for SharedProviderFactory {
    fn create(&self, _pair: &LanguagePair) -> TranslationResult<Arc<dyn TranslationProvider>> {
        Ok(Arc::clone(&self.provider))
    }
}

/// 按语言对管理的后端句柄
pub struct ProviderRegistry {
    factory: Arc<dyn ProviderFactory>,
    handles: DashMap<LanguagePair, Arc<dyn TranslationProvider>>,
}

impl ProviderRegistry {
    pub fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            factory,
            handles: DashMap::new(),
        }
    }

    /// 所有语言对共用 `provider`
    pub fn shared(provider: Arc<dyn TranslationProvider>) -> Self {
        Self::new(Arc::new(SharedProviderFactory::new(provider)))
    }

    /// 取得语言对的后端，首次使用时创建
    pub fn open(&self, pair: &LanguagePair) -> TranslationResult<Arc<dyn TranslationProvider>> {
        match self.handles.entry(pair.clone()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let provider = self.factory.create(pair)?;
                tracing::info!("打开翻译后端 {} ({})", provider.name(), pair);
                entry.insert(Arc::clone(&provider));
                Ok(provider)
            }
        }
    }

    pub fn get(&self, pair: &LanguagePair) -> Option<Arc<dyn TranslationProvider>> {
        self.handles.get(pair).map(|entry| Arc::clone(entry.value()))
    }

    pub fn is_open(&self, pair: &LanguagePair) -> bool {
        self.handles.contains_key(pair)
    }

    /// 当前打开的语言对
    pub fn open_pairs(&self) -> Vec<LanguagePair> {
        let mut pairs: Vec<LanguagePair> = self.handles.iter().map(|e| e.key().clone()).collect();
        pairs.sort();
        pairs
    }

    /// 关闭语言对的后端，返回是否曾经打开
    pub async fn close(&self, pair: &LanguagePair) -> TranslationResult<bool> {
        let Some((_, provider)) = self.handles.remove(pair) else {
            return Ok(false);
        };
        provider.close().await?;
        tracing::info!("关闭翻译后端 {} ({})", provider.name(), pair);
        Ok(true)
    }

    /// 关闭全部后端，单个失败不影响其它后端
    pub async fn close_all(&self) -> TranslationResult<()> {
        let mut first_error = None;
        for pair in self.open_pairs() {
            if let Err(e) = self.close(&pair).await {
                tracing::warn!("关闭翻译后端 {} 失败: {}", pair, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

// ============================================================================
// 确定性模拟后端
// ============================================================================

/// 确定性模拟后端
///
/// 把 ASCII 字母转成大写，其它字符（包括页面标记）原样保留。
#[derive(Debug, Default)]
pub struct MockProvider {
    strip_markers: bool,
    supported_languages: Option<HashSet<String>>,
    delay: Option<Duration>,
    failing: AtomicBool,
    calls: AtomicUsize,
    closed: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟会剥掉不可见字符的后端
    pub fn stripping_markers(mut self) -> Self {
        self.strip_markers = true;
        self
    }

    pub fn with_supported_languages(mut self, languages: &[&str]) -> Self {
        self.supported_languages = Some(languages.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 切换故障模式
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `translate` 调用次数
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        _source_language: Option<&str>,
    ) -> TranslationResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(TranslationError::ProviderUnavailable(
                "模拟后端处于故障模式".to_string(),
            ));
        }

        if let Some(supported) = &self.supported_languages {
            if !supported.contains(target_language) {
                return Err(TranslationError::ProviderUnsupportedLanguage {
                    language: target_language.to_string(),
                });
            }
        }

        let translated: String = text.chars().map(|c| c.to_ascii_uppercase()).collect();
        if self.strip_markers {
            Ok(strip_markers(&translated))
        } else {
            Ok(translated)
        }
    }

    async fn detect_language(&self, text: &str) -> TranslationResult<String> {
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        if letters == 0 {
            return Err(TranslationError::InvalidInput("无法检测空文本的语言".to_string()));
        }
        let ascii = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
        Ok(if ascii * 2 >= letters { "en" } else { "und" }.to_string())
    }

    async fn close(&self) -> TranslationResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::pipeline::markers::PageMarkerCodec;

    #[tokio::test]
    async fn test_mock_keeps_markers() {
        let provider = MockProvider::new();
        let marked = PageMarkerCodec::insert_markers("hola", 3);
        let out = provider.translate(&marked, "es", None).await.unwrap();
        assert_eq!(PageMarkerCodec::extract_page(&out, 3).unwrap(), "HOLA");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_stripping_markers() {
        let provider = MockProvider::new().stripping_markers();
        let marked = PageMarkerCodec::insert_markers("hola", 3);
        let out = provider.translate(&marked, "es", None).await.unwrap();
        assert_eq!(out, "HOLA");
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let provider = MockProvider::new().with_supported_languages(&["es"]);
        assert!(matches!(
            provider.translate("x", "fr", None).await,
            Err(TranslationError::ProviderUnsupportedLanguage { .. })
        ));

        provider.set_failing(true);
        assert!(matches!(
            provider.translate("x", "es", None).await,
            Err(TranslationError::ProviderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_detect_language() {
        let provider = MockProvider::new();
        assert_eq!(provider.detect_language("hello").await.unwrap(), "en");
        assert_eq!(provider.detect_language("こんにちは").await.unwrap(), "und");
        assert!(provider.detect_language("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let mock = Arc::new(MockProvider::new());
        let registry = ProviderRegistry::shared(mock.clone());
        let es = LanguagePair::new(None, "es");
        let fr = LanguagePair::new(Some("en"), "fr");

        let a = registry.open(&es).unwrap();
        let b = registry.open(&es).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        registry.open(&fr).unwrap();
        assert_eq!(registry.open_pairs(), vec![es.clone(), fr.clone()]);

        assert!(registry.close(&es).await.unwrap());
        assert!(!registry.close(&es).await.unwrap());
        assert!(mock.is_closed());

        registry.close_all().await.unwrap();
        assert!(registry.open_pairs().is_empty());
    }

    #[tokio::test]
    async fn test_closure_factory() {
        let registry = ProviderRegistry::new(Arc::new(|pair: &LanguagePair| {
            if pair.target == "xx" {
                return Err(TranslationError::ProviderUnsupportedLanguage {
                    language: pair.target.clone(),
                });
            }
            Ok(Arc::new(MockProvider::new()) as Arc<dyn TranslationProvider>)
        }));

        assert!(registry.open(&LanguagePair::new(None, "es")).is_ok());
        assert!(registry.open(&LanguagePair::new(None, "xx")).is_err());
        assert!(!registry.is_open(&LanguagePair::new(None, "xx")));
    }

    #[test]
    fn test_language_pair_display() {
        assert_eq!(LanguagePair::new(None, "es").to_string(), "auto->es");
        assert_eq!(LanguagePair::new(Some("en"), "fr").to_string(), "en->fr");
    }
}
