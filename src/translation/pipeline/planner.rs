//! 块边界规划器
//!
//! 把连续的页面分组为翻译块，一个块整体送往翻译后端以保留上下文。
//!
//! ## 规则
//!
//! - 块大小按页面字符数加页面之间分隔符长度计算
//! - 下一页会让块超过硬上限时停止扩展
//! - 块已达到最小值且下一页会超过理想值时，若两页之间是段落边界则停止
//! - 单页超过硬上限时自成一块
//!
//! 分块从第 0 页开始顺序扫描，同一份页面数组永远得到同一组互不相交的块，
//! 因此 `plan(pages, i) == plan(pages, j)` 对块内任意 `j` 成立，块 ID 可以用作缓存键。
//! 块不会从请求页向两侧扩展：上面的规则只在扫描时从每个块的起始页向后增长时生效，
//! 请求页所在的块就是扫描结果中包含它的那一块。

use crate::translation::config::constants;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::storage::chunk::ChunkSpan;

/// 块大小参数（字符）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    pub min_chars: usize,
    pub ideal_chars: usize,
    pub max_chars: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_chars: constants::CHUNK_MIN_CHARS,
            ideal_chars: constants::CHUNK_IDEAL_CHARS,
            max_chars: constants::CHUNK_MAX_CHARS,
        }
    }
}

/// 块边界规划器
#[derive(Debug, Clone, Default)]
pub struct ChunkPlanner {
    config: PlannerConfig,
}

impl ChunkPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// 计算包含 `page_index` 的块范围
    pub fn plan<S: AsRef<str>>(&self, pages: &[S], page_index: usize) -> TranslationResult<ChunkSpan> {
        if page_index >= pages.len() {
            return Err(TranslationError::InvalidInput(format!(
                "页码 {} 超出范围 (共 {} 页)",
                page_index,
                pages.len()
            )));
        }

        let spans = self.partition(pages);
        let pos = spans
            .binary_search_by(|span| {
                if span.end < page_index {
                    std::cmp::Ordering::Less
                } else if span.start > page_index {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .map_err(|_| {
                TranslationError::InternalError(format!("页码 {} 不在任何块中", page_index))
            })?;

        let span = spans[pos];
        tracing::debug!(
            "页 {} 规划到块 [{}, {}], {} 字符",
            page_index,
            span.start,
            span.end,
            self.span_chars(pages, span)
        );
        Ok(span)
    }

    /// 把整本书划分为有序、互不相交、覆盖全部页面的块
    pub fn partition<S: AsRef<str>>(&self, pages: &[S]) -> Vec<ChunkSpan> {
        let lengths: Vec<usize> = pages.iter().map(|p| p.as_ref().chars().count()).collect();
        let separator = constants::PAGE_SEPARATOR.chars().count();

        let mut spans = Vec::new();
        let mut start = 0;
        while start < pages.len() {
            let mut end = start;
            let mut size = lengths[start];

            while end + 1 < pages.len() {
                let grown = size + separator + lengths[end + 1];
                if grown > self.config.max_chars {
                    break;
                }
                if size >= self.config.min_chars
                    && grown > self.config.ideal_chars
                    && is_paragraph_boundary(pages[end].as_ref(), pages[end + 1].as_ref())
                {
                    break;
                }
                size = grown;
                end += 1;
            }

            spans.push(ChunkSpan::new(start, end));
            start = end + 1;
        }

        spans
    }

    /// 块内容字符数（含页面分隔符）
    pub fn span_chars<S: AsRef<str>>(&self, pages: &[S], span: ChunkSpan) -> usize {
        let separator = constants::PAGE_SEPARATOR.chars().count();
        let body: usize = pages[span.start..=span.end]
            .iter()
            .map(|p| p.as_ref().chars().count())
            .sum();
        body + separator * (span.len() - 1)
    }
}

/// 上一页以句末符号结尾且下一页以大写字母开头
pub fn is_paragraph_boundary(current: &str, next: &str) -> bool {
    let ends_sentence = current
        .trim_end()
        .chars()
        .last()
        .map_or(false, |c| matches!(c, '.' | '!' | '?'));
    let starts_upper = next
        .trim_start()
        .chars()
        .next()
        .map_or(false, char::is_uppercase);

    ends_sentence && starts_upper
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(len: usize, ends_sentence: bool) -> String {
        let mut body = String::from("A");
        body.push_str(&"x".repeat(len - 2));
        body.push(if ends_sentence { '.' } else { 'y' });
        body
    }

    #[test]
    fn test_paragraph_boundary() {
        assert!(is_paragraph_boundary("It ended.  ", "\nThen"));
        assert!(is_paragraph_boundary("Really?", "Yes"));
        assert!(!is_paragraph_boundary("It ended", "Then"));
        assert!(!is_paragraph_boundary("It ended.", "then"));
        assert!(!is_paragraph_boundary("", "Then"));
    }

    #[test]
    fn test_partition_covers_all_pages() {
        let pages: Vec<String> = (0..30).map(|i| page(1200, i % 3 == 0)).collect();
        let spans = ChunkPlanner::default().partition(&pages);

        assert_eq!(spans.first().unwrap().start, 0);
        assert_eq!(spans.last().unwrap().end, 29);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
    }

    #[test]
    fn test_hard_limit_never_exceeded() {
        let planner = ChunkPlanner::default();
        let pages: Vec<String> = (0..40).map(|i| page(900 + (i * 137) % 1500, false)).collect();
        for span in planner.partition(&pages) {
            assert!(planner.span_chars(&pages, span) <= 8000);
        }
    }

    #[test]
    fn test_stops_at_paragraph_boundary_after_minimum() {
        // 1500 * 3 + 4 = 4504 >= 3000，再加一页 6006 > 5000
        let pages: Vec<String> = (0..6).map(|_| page(1500, true)).collect();
        let spans = ChunkPlanner::default().partition(&pages);
        assert_eq!(spans[0], ChunkSpan::new(0, 2));
        assert_eq!(spans[1], ChunkSpan::new(3, 5));
    }

    #[test]
    fn test_grows_to_hard_limit_without_boundary() {
        // 5 * 1500 + 8 = 7508，第 6 页会到 9010
        let pages: Vec<String> = (0..8).map(|_| page(1500, false)).collect();
        let spans = ChunkPlanner::default().partition(&pages);
        assert_eq!(spans[0], ChunkSpan::new(0, 4));
    }

    #[test]
    fn test_oversized_page_is_its_own_chunk() {
        let pages = vec![page(1000, false), page(9000, false), page(1000, false)];
        let spans = ChunkPlanner::default().partition(&pages);
        assert_eq!(
            spans,
            vec![ChunkSpan::new(0, 0), ChunkSpan::new(1, 1), ChunkSpan::new(2, 2)]
        );
    }

    #[test]
    fn test_plan_is_deterministic_within_span() {
        let planner = ChunkPlanner::default();
        let pages: Vec<String> = (0..25).map(|i| page(700 + (i * 311) % 1900, i % 4 == 1)).collect();

        for i in 0..pages.len() {
            let span = planner.plan(&pages, i).unwrap();
            assert!(span.contains(i));
            for j in span.start..=span.end {
                assert_eq!(planner.plan(&pages, j).unwrap(), span);
            }
        }
    }

    #[test]
    fn test_plan_rejects_out_of_range() {
        let pages = vec!["one".to_string()];
        assert!(matches!(
            ChunkPlanner::default().plan(&pages, 1),
            Err(TranslationError::InvalidInput(_))
        ));
    }
}
