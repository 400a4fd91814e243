//! 翻译配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, TranslationConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 块规划相关
    pub const CHUNK_MIN_CHARS: usize = 3000;
    pub const CHUNK_IDEAL_CHARS: usize = 5000;
    pub const CHUNK_MAX_CHARS: usize = 8000;

    // 预翻译偏移
    pub const PREFETCH_LOOKAHEAD: usize = 3;
    pub const PREFETCH_LOOKBEHIND: usize = 5;

    // 分页相关
    pub const DEFAULT_MAX_PAGE_CHARS: usize = 5000;
    pub const DEFAULT_REFINE_LOOKBACK_CHARS: usize = 400;
    pub const DEFAULT_PAGINATION_TIMEOUT: Duration = Duration::from_secs(30);

    // 缓存设置
    pub const DEFAULT_LOCAL_CACHE_SIZE: usize = 64;
    pub const DEFAULT_CACHE_PATH: &str = "~/.cache/reader-translate/chunks.redb";

    /// 块内页面之间的规范段落分隔符
    pub const PAGE_SEPARATOR: &str = "\n\n";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "reader-translate.toml",
        ".reader-translate.toml",
        "~/.config/reader-translate/config.toml",
        "/etc/reader-translate/config.toml",
    ];
}
