//! # Reader Translate
//!
//! 电子书阅读器的分页与按块翻译缓存引擎。
//!
//! ## 模块组织
//!
//! - `layout` - 按视口和字体度量把全文切分成页面
//! - `translation` - 块规划、页面标记、块缓存和翻译服务
//! - `env` - 类型安全的环境变量

pub mod env;
pub mod layout;
pub mod translation;

// Re-export commonly used items for convenience
pub use layout::{LayoutOptions, MonospaceMeasurer, Paginator, TextMeasurer, TextStyle, Viewport};
pub use translation::{TranslationConfig, TranslationError, TranslationResult, TranslationService};
