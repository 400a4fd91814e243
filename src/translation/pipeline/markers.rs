//! 页面标记编解码
//!
//! 块内每一页用一对不可见标记包裹，标记里用零宽字符二进制编码页码：
//!
//! - 起始标记: `U+2063` + 位串 + `U+2063`
//! - 结束标记: `U+2064` + 位串 + `U+2064`
//! - 位串: `U+200B` 表示 0，`U+200C` 表示 1
//!
//! 合并文本按页码顺序把带标记的页面用 `"\n\n"` 连接，整体送往翻译后端；
//! 译文回来后按标记切回每一页。后端剥掉了标记字符时，按记录的分页偏移
//! 做比例映射恢复页面边界。

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::translation::config::constants::PAGE_SEPARATOR;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::storage::chunk::ChunkSpan;

const START_FENCE: char = '\u{2063}';
const END_FENCE: char = '\u{2064}';
const BIT_ZERO: char = '\u{200B}';
const BIT_ONE: char = '\u{200C}';

/// 比例映射时吸附到分隔符的容差（占译文长度的比例）
const SNAP_TOLERANCE_RATIO: f64 = 0.1;

static MARKER_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

fn marker_regex() -> TranslationResult<&'static Regex> {
    MARKER_REGEX
        .get_or_init(|| {
            Regex::new(r"([\x{2063}\x{2064}])([\x{200B}\x{200C}]{1,64})([\x{2063}\x{2064}])").ok()
        })
        .as_ref()
        .ok_or_else(|| TranslationError::InternalError("页面标记正则编译失败".to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Start,
    End,
}

/// 文本中的一个标记
#[derive(Debug, Clone, Copy)]
struct MarkerToken {
    kind: MarkerKind,
    page_index: usize,
    /// 标记在文本中的字节范围
    start: usize,
    end: usize,
}

/// 合并后的块文本
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedText {
    /// 带标记的合并文本，送往翻译后端
    pub marked_text: String,
    /// 每页在无标记逻辑文本中的结束偏移（字符），严格递增
    pub page_break_offsets: Vec<usize>,
}

/// 页面标记编解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct PageMarkerCodec;

impl PageMarkerCodec {
    /// 用页码标记包裹页面文本
    pub fn insert_markers(text: &str, page_index: usize) -> String {
        let bits = encode_bits(page_index);
        let mut marked = String::with_capacity(text.len() + bits.len() * 2 + 12);
        marked.push(START_FENCE);
        marked.push_str(&bits);
        marked.push(START_FENCE);
        marked.push_str(text);
        marked.push(END_FENCE);
        marked.push_str(&bits);
        marked.push(END_FENCE);
        marked
    }

    /// 取出指定页的文本
    ///
    /// 文本中没有任何标记时原样返回；缺少结束标记时读到下一个起始标记为止。
    pub fn extract_page(text: &str, page_index: usize) -> TranslationResult<String> {
        let tokens = scan_markers(text)?;
        if tokens.is_empty() {
            return Ok(text.to_string());
        }

        let (pos, open) = tokens
            .iter()
            .enumerate()
            .find(|(_, t)| t.kind == MarkerKind::Start && t.page_index == page_index)
            .ok_or_else(|| {
                TranslationError::ExtractionFailure(format!("未找到第 {} 页的起始标记", page_index))
            })?;

        let close = tokens[pos + 1..].iter().find(|t| {
            (t.kind == MarkerKind::End && t.page_index == page_index) || t.kind == MarkerKind::Start
        });

        let content_end = match close {
            Some(token) if token.kind == MarkerKind::End => token.start,
            Some(token) => {
                tracing::debug!("第 {} 页缺少结束标记，截至下一页起始标记", page_index);
                token.start
            }
            None => text.len(),
        };

        Ok(strip_markers(&text[open.end..content_end]))
    }

    /// 列出文本中出现的页码
    pub fn extract_page_indices(text: &str) -> BTreeSet<usize> {
        match scan_markers(text) {
            Ok(tokens) => tokens
                .into_iter()
                .filter(|t| t.kind == MarkerKind::Start)
                .map(|t| t.page_index)
                .collect(),
            Err(e) => {
                tracing::warn!("扫描页面标记失败: {}", e);
                BTreeSet::new()
            }
        }
    }

    /// 文本中是否含有任何标记字符
    pub fn has_markers(text: &str) -> bool {
        scan_markers(text).map_or(false, |tokens| !tokens.is_empty())
    }

    /// 按页码顺序合并块内页面
    pub fn build_combined<S: AsRef<str>>(pages: &[S], span: ChunkSpan) -> CombinedText {
        let separator = PAGE_SEPARATOR.chars().count();
        let mut marked_text = String::new();
        let mut page_break_offsets = Vec::with_capacity(span.len());
        let mut logical_len = 0;

        for index in span.start..=span.end {
            let page = pages[index].as_ref();
            if index > span.start {
                marked_text.push_str(PAGE_SEPARATOR);
                logical_len += separator;
            }
            marked_text.push_str(&Self::insert_markers(page, index));
            logical_len += page.chars().count();
            page_break_offsets.push(logical_len);
        }

        CombinedText {
            marked_text,
            page_break_offsets,
        }
    }

    /// 标记被剥离后，按分页偏移比例恢复第 `position` 页（块内相对位置）
    ///
    /// 每个切点按 `offset / 原文总长` 映射到译文中，再吸附到容差范围内最近的
    /// 段落分隔符，其次是空白。
    pub fn extract_by_offsets(
        text: &str,
        page_break_offsets: &[usize],
        position: usize,
    ) -> TranslationResult<String> {
        if position >= page_break_offsets.len() {
            return Err(TranslationError::ExtractionFailure(format!(
                "块内位置 {} 超出分页偏移范围 ({})",
                position,
                page_break_offsets.len()
            )));
        }

        let cleaned: Vec<char> = strip_markers(text).chars().collect();
        let total = page_break_offsets.last().copied().unwrap_or(0);
        if page_break_offsets.len() == 1 || total == 0 {
            return Ok(cleaned.iter().collect::<String>().trim().to_string());
        }

        let len = cleaned.len();
        let tolerance = ((len as f64) * SNAP_TOLERANCE_RATIO).ceil() as usize;
        let mut cuts = Vec::with_capacity(page_break_offsets.len() + 1);
        cuts.push(0);
        for &offset in &page_break_offsets[..page_break_offsets.len() - 1] {
            let target = ((offset as f64 / total as f64) * len as f64).round() as usize;
            let previous = cuts.last().copied().unwrap_or(0);
            cuts.push(snap_cut(&cleaned, target, tolerance).max(previous));
        }
        cuts.push(len);

        let slice: String = cleaned[cuts[position]..cuts[position + 1]].iter().collect();
        let page = slice.trim().to_string();

        let separator = PAGE_SEPARATOR.chars().count();
        let original_len = if position == 0 {
            page_break_offsets[0]
        } else {
            page_break_offsets[position]
                .saturating_sub(page_break_offsets[position - 1] + separator)
        };
        if page.is_empty() && original_len > 0 {
            return Err(TranslationError::ExtractionFailure(format!(
                "比例映射后块内第 {} 页为空",
                position
            )));
        }

        Ok(page)
    }
}

/// 去掉文本中完整的标记
///
/// 只删除能识别为标记的字符序列，正文里单独出现的零宽字符（如波斯文的 ZWNJ）原样保留。
pub fn strip_markers(text: &str) -> String {
    match scan_markers(text) {
        Ok(tokens) => splice_out(text, &tokens),
        Err(e) => {
            tracing::warn!("扫描页面标记失败，保留原文: {}", e);
            text.to_string()
        }
    }
}

fn splice_out(text: &str, tokens: &[MarkerToken]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for token in tokens {
        out.push_str(&text[last..token.start]);
        last = token.end;
    }
    out.push_str(&text[last..]);
    out
}

fn encode_bits(page_index: usize) -> String {
    format!("{:b}", page_index)
        .chars()
        .map(|b| if b == '1' { BIT_ONE } else { BIT_ZERO })
        .collect()
}

fn decode_bits(bits: &str) -> Option<usize> {
    let binary: String = bits
        .chars()
        .map(|c| if c == BIT_ONE { '1' } else { '0' })
        .collect();
    usize::from_str_radix(&binary, 2).ok()
}

fn scan_markers(text: &str) -> TranslationResult<Vec<MarkerToken>> {
    let regex = marker_regex()?;
    let mut tokens = Vec::new();

    for caps in regex.captures_iter(text) {
        let (Some(whole), Some(open), Some(bits), Some(close)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        if open.as_str() != close.as_str() {
            continue;
        }
        let Some(page_index) = decode_bits(bits.as_str()) else {
            continue;
        };

        let kind = if open.as_str().starts_with(START_FENCE) {
            MarkerKind::Start
        } else {
            MarkerKind::End
        };
        tokens.push(MarkerToken {
            kind,
            page_index,
            start: whole.start(),
            end: whole.end(),
        });
    }

    Ok(tokens)
}

/// 在 `target` 附近寻找切点：段落分隔符优先，其次空白，找不到时原样返回
fn snap_cut(chars: &[char], target: usize, tolerance: usize) -> usize {
    let target = target.min(chars.len());
    let lo = target.saturating_sub(tolerance);
    let hi = (target + tolerance).min(chars.len());

    let nearest = |accept: &dyn Fn(usize) -> bool| -> Option<usize> {
        (0..=tolerance)
            .flat_map(|d| [target.checked_sub(d), Some(target + d)])
            .flatten()
            .filter(|&p| p >= lo && p <= hi)
            .find(|&p| accept(p))
    };

    let paragraph = nearest(&|p| p >= 2 && chars[p - 1] == '\n' && chars[p - 2] == '\n');
    if let Some(cut) = paragraph {
        return cut;
    }

    nearest(&|p| p >= 1 && chars[p - 1].is_whitespace()).unwrap_or(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages() -> Vec<String> {
        vec![
            "First page text.".to_string(),
            "Second page, longer than the first one.".to_string(),
            "Third.".to_string(),
        ]
    }

    #[test]
    fn test_markers_are_invisible() {
        let marked = PageMarkerCodec::insert_markers("hello", 5);
        assert!(marked.contains("hello"));
        assert_eq!(strip_markers(&marked), "hello");
        assert!(PageMarkerCodec::has_markers(&marked));
        assert!(!PageMarkerCodec::has_markers("hello"));
        assert!(marked.chars().filter(|c| c.is_ascii()).eq("hello".chars()));
    }

    #[test]
    fn test_extract_single_page() {
        let marked = PageMarkerCodec::insert_markers("hello world", 12);
        assert_eq!(PageMarkerCodec::extract_page(&marked, 12).unwrap(), "hello world");
        assert!(matches!(
            PageMarkerCodec::extract_page(&marked, 3),
            Err(TranslationError::ExtractionFailure(_))
        ));
    }

    #[test]
    fn test_zero_width_text_survives_round_trip() {
        let pages = vec![
            "\u{200C}Intro\u{200B} page.\u{200C}".to_string(),
            "می\u{200C}خواهم a word-joined page.".to_string(),
            "東京\u{200B}大阪".to_string(),
        ];
        let span = ChunkSpan::new(0, 2);
        let combined = PageMarkerCodec::build_combined(&pages, span);

        for (i, page) in pages.iter().enumerate() {
            assert_eq!(&PageMarkerCodec::extract_page(&combined.marked_text, i).unwrap(), page);
        }
        assert_eq!(strip_markers(&combined.marked_text), pages.join(PAGE_SEPARATOR));
        assert!(!PageMarkerCodec::has_markers(&pages[1]));

        // 标记被剥离后按偏移恢复也保留零宽字符
        let stripped = strip_markers(&combined.marked_text);
        for (position, page) in pages.iter().enumerate() {
            let recovered =
                PageMarkerCodec::extract_by_offsets(&stripped, &combined.page_break_offsets, position)
                    .unwrap();
            assert_eq!(&recovered, page);
        }
    }

    #[test]
    fn test_extract_without_markers_returns_text() {
        assert_eq!(PageMarkerCodec::extract_page("plain", 0).unwrap(), "plain");
    }

    #[test]
    fn test_page_indices() {
        let combined = PageMarkerCodec::build_combined(&pages(), ChunkSpan::new(0, 2));
        let indices = PageMarkerCodec::extract_page_indices(&combined.marked_text);
        assert_eq!(indices.into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_page_sum_invariant() {
        let pages = pages();
        let span = ChunkSpan::new(0, 2);
        let combined = PageMarkerCodec::build_combined(&pages, span);

        let extracted: Vec<String> = (span.start..=span.end)
            .map(|i| PageMarkerCodec::extract_page(&combined.marked_text, i).unwrap())
            .collect();
        assert_eq!(extracted.join(PAGE_SEPARATOR), pages.join(PAGE_SEPARATOR));
        assert_eq!(strip_markers(&combined.marked_text), pages.join(PAGE_SEPARATOR));
    }

    #[test]
    fn test_offsets_are_cumulative() {
        let combined = PageMarkerCodec::build_combined(&pages(), ChunkSpan::new(1, 2));
        assert_eq!(combined.page_break_offsets, vec![39, 47]);
    }

    #[test]
    fn test_missing_end_marker_reads_to_next_page() {
        let text = format!(
            "{}{}",
            PageMarkerCodec::insert_markers("alpha", 0),
            PageMarkerCodec::insert_markers("beta", 1)
        );
        let broken = text.replacen(END_FENCE, "", 2);
        assert_eq!(PageMarkerCodec::extract_page(&broken, 0).unwrap(), "alpha");
    }

    #[test]
    fn test_offset_fallback_snaps_to_paragraphs() {
        let pages = pages();
        let combined = PageMarkerCodec::build_combined(&pages, ChunkSpan::new(0, 2));
        let translated = strip_markers(&combined.marked_text).to_uppercase();

        for (position, page) in pages.iter().enumerate() {
            let recovered =
                PageMarkerCodec::extract_by_offsets(&translated, &combined.page_break_offsets, position)
                    .unwrap();
            assert_eq!(recovered, page.to_uppercase());
        }
    }

    #[test]
    fn test_offset_fallback_with_longer_translation() {
        let offsets = vec![12, 22];
        let translated = "Erste Seite hier\n\nZweite Seite";
        assert_eq!(
            PageMarkerCodec::extract_by_offsets(translated, &offsets, 0).unwrap(),
            "Erste Seite hier"
        );
        assert_eq!(
            PageMarkerCodec::extract_by_offsets(translated, &offsets, 1).unwrap(),
            "Zweite Seite"
        );
    }
}
