//! 分页引擎
//!
//! 把整本书的文本切成一页页适配视口的字符串：
//!
//! 1. 在 `[start, start + max_page_chars]` 窗口内二分搜索能放下的最长文本
//! 2. 从搜索结果向回收缩到更自然的断点：句末 > 空行 > 词边界 > 任意句末符号
//! 3. 保证每页至少前进一个字符
//! 4. 页首的换行串归入上一页页尾，下一页从正文开始
//! 5. 超过时间预算时把剩余文本作为最后一页输出
//!
//! 所有页面按顺序拼接后与输入逐字节相同。

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::measure::{TextMeasurer, TextStyle};
use crate::translation::config::constants;
use crate::translation::error::{TranslationError, TranslationResult};

/// 高度比较容差
const HEIGHT_EPSILON: f32 = 0.01;

/// 视口
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    /// 四周内边距
    pub padding: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            padding: 0.0,
        }
    }

    pub fn with_padding(mut self, padding: f32) -> Self {
        self.padding = padding;
        self
    }

    /// 可用排版宽度
    pub fn content_width(&self) -> f32 {
        (self.width - 2.0 * self.padding).max(1.0)
    }

    /// 每页高度预算
    pub fn height_budget(&self) -> f32 {
        (self.height - 2.0 * self.padding).max(0.0)
    }
}

/// 分页调优参数
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOptions {
    /// 二分搜索窗口上限（字符）
    pub max_page_chars: usize,
    /// 断点回溯窗口（字符）
    pub refine_lookback_chars: usize,
    /// 分页时间预算
    pub timeout: Duration,
    /// 超时时返回 `PaginationTimeout` 而不是降级
    pub strict_timeout: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            max_page_chars: constants::DEFAULT_MAX_PAGE_CHARS,
            refine_lookback_chars: constants::DEFAULT_REFINE_LOOKBACK_CHARS,
            timeout: constants::DEFAULT_PAGINATION_TIMEOUT,
            strict_timeout: false,
        }
    }
}

/// 分页结果
#[derive(Debug, Clone)]
pub struct PaginationOutcome {
    pub pages: Vec<String>,
    /// 是否因超时把剩余文本合并成了最后一页
    pub timed_out: bool,
    pub elapsed: Duration,
}

/// 分页器
#[derive(Clone)]
pub struct Paginator {
    measurer: Arc<dyn TextMeasurer>,
    viewport: Viewport,
    style: TextStyle,
    options: LayoutOptions,
}

impl Paginator {
    pub fn new(measurer: Arc<dyn TextMeasurer>, viewport: Viewport, style: TextStyle) -> Self {
        Self {
            measurer,
            viewport,
            style,
            options: LayoutOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LayoutOptions) -> Self {
        self.options = options;
        self
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// 测量一段文本在当前视口下的高度
    pub fn measure(&self, text: &str) -> f32 {
        self.measurer
            .measure(text, &self.style, self.viewport.content_width())
    }

    /// 文本是否放得进一页
    pub fn fits(&self, text: &str) -> bool {
        self.measure(text) <= self.viewport.height_budget() + HEIGHT_EPSILON
    }

    /// 惰性逐页迭代，计时从创建迭代器开始
    pub fn pages<'a>(&'a self, text: &'a str) -> Pages<'a> {
        Pages::new(self, text)
    }

    /// 分页并收集全部页面
    pub fn paginate(&self, text: &str) -> TranslationResult<Vec<String>> {
        Ok(self.paginate_detailed(text)?.pages)
    }

    /// 分页并返回超时信息
    pub fn paginate_detailed(&self, text: &str) -> TranslationResult<PaginationOutcome> {
        let started = Instant::now();
        let mut pages = self.pages(text);
        let collected: Vec<String> = pages.by_ref().collect();
        let timed_out = pages.timed_out();

        if timed_out && self.options.strict_timeout {
            return Err(TranslationError::PaginationTimeout(format!(
                "{} 页后超过 {:?} 预算",
                collected.len().saturating_sub(1),
                self.options.timeout
            )));
        }

        tracing::debug!(
            "分页完成: {} 字符 -> {} 页, 耗时 {:?}",
            text.len(),
            collected.len(),
            started.elapsed()
        );

        Ok(PaginationOutcome {
            pages: collected,
            timed_out,
            elapsed: started.elapsed(),
        })
    }
}

/// 页面迭代器
///
/// 有限、不可重启：耗尽后始终返回 `None`。
pub struct Pages<'a> {
    paginator: &'a Paginator,
    text: &'a str,
    chars: Vec<char>,
    /// 第 i 个字符的字节偏移，末尾额外存放 `text.len()`
    offsets: Vec<usize>,
    cursor: usize,
    started: Instant,
    timed_out: bool,
}

impl<'a> Pages<'a> {
    fn new(paginator: &'a Paginator, text: &'a str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let offsets = text
            .char_indices()
            .map(|(idx, _)| idx)
            .chain(std::iter::once(text.len()))
            .collect();

        Self {
            paginator,
            text,
            chars,
            offsets,
            cursor: 0,
            started: Instant::now(),
            timed_out: false,
        }
    }

    /// 是否触发了超时降级
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.offsets[start]..self.offsets[end]]
    }

    fn fits(&self, start: usize, end: usize) -> bool {
        self.paginator.fits(self.slice(start, end))
    }

    /// 二分搜索能放下的最大 end（字符下标）
    fn fit_end(&self, start: usize) -> usize {
        let len = self.chars.len();
        let window = self.paginator.options.max_page_chars.max(1);
        let upper = len.min(start + window);

        if self.fits(start, upper) {
            if upper < len {
                tracing::debug!("第 {} 字符处的页被搜索窗口 {} 截断", start, window);
            }
            return upper;
        }

        // 不变式: lo 放得下, hi 放不下
        let mut lo = start;
        let mut hi = upper;
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.fits(start, mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// 从 end 向回寻找更好的断点
    fn refine_end(&self, start: usize, end: usize) -> usize {
        let lookback = self.paginator.options.refine_lookback_chars;
        let floor = (start + 1).max(end.saturating_sub(lookback));
        if end <= floor {
            return end;
        }
        let chars = &self.chars;

        // 句末符号后接空白，空白留在本页
        for p in (floor..end).rev() {
            if chars[p].is_whitespace() && is_sentence_terminator(chars[p - 1]) {
                return p + 1;
            }
        }

        // 空行，从换行串开头断开
        for p in (floor..end).rev() {
            if chars[p] == '\n' && chars[p - 1] == '\n' {
                let mut cut = p - 1;
                while cut > start && chars[cut - 1] == '\n' {
                    cut -= 1;
                }
                if cut > start {
                    return cut;
                }
            }
        }

        // 词边界
        for p in (floor..end).rev() {
            if chars[p].is_whitespace() {
                return p + 1;
            }
        }

        // 任意句末符号
        for p in (floor..end).rev() {
            if is_sentence_terminator(chars[p]) {
                return p + 1;
            }
        }

        end
    }
}

impl<'a> Iterator for Pages<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let len = self.chars.len();
        if self.cursor >= len {
            return None;
        }

        let start = self.cursor;
        if self.started.elapsed() >= self.paginator.options.timeout {
            if !self.timed_out {
                tracing::warn!(
                    "分页超过 {:?} 预算，剩余 {} 字符作为最后一页",
                    self.paginator.options.timeout,
                    len - start
                );
            }
            self.timed_out = true;
            self.cursor = len;
            return Some(self.slice(start, len).to_string());
        }

        let mut end = self.fit_end(start);
        if end < len {
            end = self.refine_end(start, end);
        }
        if end <= start {
            end = start + 1;
        }

        // 紧随其后的换行串在放得下时归入本页页尾，放不下的部分留在下一页页首
        while end < len && matches!(self.chars[end], '\n' | '\r') && self.fits(start, end + 1) {
            end += 1;
        }

        self.cursor = end;
        Some(self.slice(start, end).to_string())
    }
}

fn is_sentence_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}
