//! 排版模块
//!
//! 根据视口尺寸和字体度量把书籍全文切分成页面。

pub mod measure;
pub mod paginator;

pub use measure::{MonospaceMeasurer, TextMeasurer, TextStyle};
pub use paginator::{LayoutOptions, Pages, PaginationOutcome, Paginator, Viewport};
