//! 翻译管道模块
//!
//! 提供块边界规划和页面标记编解码

pub mod markers;
pub mod planner;

// 重新导出主要类型
pub use markers::{strip_markers, CombinedText, PageMarkerCodec};
pub use planner::{is_paragraph_boundary, ChunkPlanner, PlannerConfig};
