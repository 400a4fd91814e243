//! 翻译块数据模型
//!
//! 块是一段连续页面组成的翻译单元。块 ID 由 `(书, 起始页, 结束页, 语言)`
//! 确定性生成；页面映射把 `(书, 页, 语言)` 指向所属块。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::translation::config::constants::PAGE_SEPARATOR;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::markers::{strip_markers, PageMarkerCodec};

/// 闭区间页码范围 `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
}

impl ChunkSpan {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// 页数，至少为 1
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, page_index: usize) -> bool {
        (self.start..=self.end).contains(&page_index)
    }

    pub fn pages(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// 块记录键
pub fn chunk_key(book_id: &str, span: ChunkSpan, language: &str) -> String {
    format!("{}_chunk_{}_{}_{}", book_id, span.start, span.end, language)
}

/// 页面映射键
pub fn page_key(book_id: &str, page_index: usize, language: &str) -> String {
    format!("{}_page_{}_{}", book_id, page_index, language)
}

/// 页面映射条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMapping {
    pub book_id: String,
    pub page_index: usize,
    pub language: String,
    pub chunk_id: String,
}

impl PageMapping {
    pub fn key(&self) -> String {
        page_key(&self.book_id, self.page_index, &self.language)
    }
}

/// 翻译块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub book_id: String,
    pub start_page_index: usize,
    pub end_page_index: usize,
    /// 带页面标记的合并原文
    pub original_text: String,
    pub translated_text: Option<String>,
    /// 每页在无标记逻辑文本中的结束偏移
    pub page_break_offsets: Vec<usize>,
    pub target_language: String,
    pub translated_at: Option<DateTime<Utc>>,
    /// 无标记逻辑原文的 blake3 哈希
    pub content_hash: String,
}

impl Chunk {
    /// 由页面数组构建未翻译的块
    pub fn plan<S: AsRef<str>>(
        book_id: &str,
        pages: &[S],
        span: ChunkSpan,
        target_language: &str,
    ) -> TranslationResult<Self> {
        if span.end >= pages.len() {
            return Err(TranslationError::InvalidInput(format!(
                "块范围 [{}, {}] 超出页面数 {}",
                span.start,
                span.end,
                pages.len()
            )));
        }

        let combined = PageMarkerCodec::build_combined(pages, span);
        let content_hash = blake3::hash(join_pages(&pages[span.start..=span.end]).as_bytes())
            .to_hex()
            .to_string();

        Ok(Self {
            chunk_id: chunk_key(book_id, span, target_language),
            book_id: book_id.to_string(),
            start_page_index: span.start,
            end_page_index: span.end,
            original_text: combined.marked_text,
            translated_text: None,
            page_break_offsets: combined.page_break_offsets,
            target_language: target_language.to_string(),
            translated_at: None,
            content_hash,
        })
    }

    pub fn span(&self) -> ChunkSpan {
        ChunkSpan::new(self.start_page_index, self.end_page_index)
    }

    pub fn is_translated(&self) -> bool {
        self.translated_text.is_some()
    }

    /// 记录译文，块只会被翻译一次
    pub fn mark_translated(&mut self, translated_text: String) {
        self.translated_text = Some(translated_text);
        self.translated_at = Some(Utc::now());
    }

    /// 块内所有页面的映射条目
    pub fn mappings(&self) -> Vec<PageMapping> {
        self.span()
            .pages()
            .map(|page_index| PageMapping {
                book_id: self.book_id.clone(),
                page_index,
                language: self.target_language.clone(),
                chunk_id: self.chunk_id.clone(),
            })
            .collect()
    }

    /// 块内保存的某页原文
    pub fn original_page(&self, page_index: usize) -> TranslationResult<String> {
        self.check_contains(page_index)?;
        PageMarkerCodec::extract_page(&self.original_text, page_index)
    }

    /// 无标记的逻辑原文
    pub fn logical_text(&self) -> String {
        strip_markers(&self.original_text)
    }

    /// 取出某页的译文
    ///
    /// 译文保留了该页标记时按标记切分，否则按分页偏移比例恢复。
    pub fn extract_translated_page(&self, page_index: usize) -> TranslationResult<String> {
        self.check_contains(page_index)?;
        let translated = self.translated_text.as_deref().ok_or_else(|| {
            TranslationError::ExtractionFailure(format!("块 {} 尚未翻译", self.chunk_id))
        })?;

        if PageMarkerCodec::extract_page_indices(translated).contains(&page_index) {
            return PageMarkerCodec::extract_page(translated, page_index);
        }

        tracing::warn!(
            "块 {} 的译文缺少第 {} 页标记，按分页偏移恢复",
            self.chunk_id,
            page_index
        );
        PageMarkerCodec::extract_by_offsets(
            translated,
            &self.page_break_offsets,
            page_index - self.start_page_index,
        )
    }

    /// 检查结构不变式：偏移个数等于页数且严格递增
    pub fn is_consistent(&self) -> bool {
        self.page_break_offsets.len() == self.span().len()
            && self.page_break_offsets.windows(2).all(|w| w[0] < w[1])
            && self.chunk_id == chunk_key(&self.book_id, self.span(), &self.target_language)
    }

    fn check_contains(&self, page_index: usize) -> TranslationResult<()> {
        if self.span().contains(page_index) {
            Ok(())
        } else {
            Err(TranslationError::InvalidInput(format!(
                "页 {} 不在块 {} 中",
                page_index, self.chunk_id
            )))
        }
    }
}

/// 把块内页面按规范分隔符连接
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}
