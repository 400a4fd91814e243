//! 文本测量
//!
//! 排版引擎本身不懂字体，只依赖宿主 UI 工具包注入的测量能力：
//! 给定文本、样式和最大宽度，返回排版后的高度。

/// 字体度量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    /// 字号（与视口同单位）
    pub font_size: f32,
    /// 行高倍数，缺省为 1.2
    pub line_height: Option<f32>,
}

impl TextStyle {
    pub fn new(font_size: f32) -> Self {
        Self {
            font_size,
            line_height: None,
        }
    }

    pub fn with_line_height(mut self, line_height: f32) -> Self {
        self.line_height = Some(line_height);
        self
    }

    /// 单行高度
    pub fn line_height_px(&self) -> f32 {
        self.font_size * self.line_height.unwrap_or(1.2)
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self::new(16.0)
    }
}

/// 宿主提供的文本测量能力
///
/// 实现必须对前缀单调：`measure(text[..a]) <= measure(text[..b])`（`a <= b`），
/// 分页的二分搜索依赖这一点。
pub trait TextMeasurer: Send + Sync {
    /// 测量 `text` 在 `max_width` 宽度下排版后的高度
    fn measure(&self, text: &str, style: &TextStyle, max_width: f32) -> f32;
}

/// 等宽字体测量器
///
/// 固定字宽、贪心按词换行、超长单词硬折行、显式 `\n` 换行。
/// 末尾的换行不占高度。用于命令行和测试，不依赖任何 UI 工具包。
#[derive(Debug, Clone, Copy)]
pub struct MonospaceMeasurer {
    /// 字宽与字号之比
    pub advance_ratio: f32,
}

impl MonospaceMeasurer {
    pub fn new(advance_ratio: f32) -> Self {
        Self { advance_ratio }
    }

    /// 每行可容纳的字符数
    pub fn columns(&self, style: &TextStyle, max_width: f32) -> usize {
        let advance = (style.font_size * self.advance_ratio).max(f32::EPSILON);
        ((max_width / advance).floor() as usize).max(1)
    }

    /// 计算文本需要的行数
    pub fn line_count(&self, text: &str, columns: usize) -> usize {
        let text = text.trim_end_matches(['\n', '\r']);
        if text.is_empty() {
            return 0;
        }

        text.split('\n')
            .map(|line| wrapped_lines(line.trim_end_matches('\r'), columns))
            .sum()
    }
}

impl Default for MonospaceMeasurer {
    fn default() -> Self {
        Self::new(0.6)
    }
}

impl TextMeasurer for MonospaceMeasurer {
    fn measure(&self, text: &str, style: &TextStyle, max_width: f32) -> f32 {
        let columns = self.columns(style, max_width);
        self.line_count(text, columns) as f32 * style.line_height_px()
    }
}

/// 单个逻辑行折行后的行数
fn wrapped_lines(line: &str, columns: usize) -> usize {
    let mut lines = 1;
    let mut col = 0;

    for word in line.split(' ') {
        let len = word.chars().count();
        let needed = if col == 0 { len } else { len + 1 };
        if col + needed <= columns {
            col += needed;
            continue;
        }

        if col > 0 {
            lines += 1;
        }

        let mut remaining = len;
        while remaining > columns {
            lines += 1;
            remaining -= columns;
        }
        col = remaining;
    }

    lines
}
