//! 简化的配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::env::EnvVar;
use crate::layout::LayoutOptions;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::planner::PlannerConfig;

/// 翻译配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    // 基础配置
    pub target_lang: String,
    pub source_lang: String,

    // 块规划
    pub chunk_min_chars: usize,
    pub chunk_ideal_chars: usize,
    pub chunk_max_chars: usize,

    // 预翻译
    pub prefetch_enabled: bool,
    pub prefetch_lookahead: usize,
    pub prefetch_lookbehind: usize,

    // 缓存配置
    pub cache_enabled: bool,
    pub cache_path: String,
    pub local_cache_size: usize,

    // 分页配置
    pub max_page_chars: usize,
    pub refine_lookback_chars: usize,
    pub pagination_timeout_secs: u64,
    pub strict_pagination_timeout: bool,
}

impl TranslationConfig {
    /// 创建带指定语言的默认配置
    pub fn default_with_lang(target_lang: &str) -> Self {
        Self {
            target_lang: target_lang.to_string(),
            ..Self::default()
        }
    }

    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.target_lang.trim().is_empty() {
            return Err(TranslationError::ConfigError("目标语言不能为空".to_string()));
        }

        if self.chunk_min_chars == 0 {
            return Err(TranslationError::ConfigError("块最小字符数不能为0".to_string()));
        }

        if self.chunk_min_chars > self.chunk_ideal_chars
            || self.chunk_ideal_chars > self.chunk_max_chars
        {
            return Err(TranslationError::ConfigError(format!(
                "块大小必须满足 min <= ideal <= max: {} / {} / {}",
                self.chunk_min_chars, self.chunk_ideal_chars, self.chunk_max_chars
            )));
        }

        if self.cache_enabled && self.local_cache_size == 0 {
            return Err(TranslationError::ConfigError(
                "启用缓存时缓存大小不能为0".to_string(),
            ));
        }

        if self.max_page_chars == 0 {
            return Err(TranslationError::ConfigError("分页窗口不能为0".to_string()));
        }

        if self.pagination_timeout_secs == 0 {
            return Err(TranslationError::ConfigError("分页超时不能为0".to_string()));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    ///
    /// 只有显式设置的变量才会覆盖配置文件中的值，无效值记录警告后忽略。
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{cache, layout, translation};

        if let Some(target_lang) = env_override::<String, translation::TargetLang>() {
            self.target_lang = target_lang;
        }

        if let Some(source_lang) = env_override::<String, translation::SourceLang>() {
            self.source_lang = source_lang;
        }

        if let Some(max_chars) = env_override::<usize, translation::ChunkMaxChars>() {
            if max_chars != self.chunk_max_chars {
                tracing::info!("环境变量覆盖块硬上限: {}", max_chars);
                self.chunk_max_chars = max_chars;
            }
        }

        if let Some(enabled) = env_override::<bool, translation::PrefetchEnabled>() {
            self.prefetch_enabled = enabled;
        }

        if let Some(enabled) = env_override::<bool, cache::Enabled>() {
            self.cache_enabled = enabled;
        }

        if let Some(path) = env_override::<String, cache::Path>() {
            tracing::info!("环境变量覆盖缓存路径: {}", path);
            self.cache_path = path;
        }

        if let Some(size) = env_override::<usize, cache::LocalCacheSize>() {
            self.local_cache_size = size;
        }

        if let Some(window) = env_override::<usize, layout::MaxPageChars>() {
            self.max_page_chars = window;
        }

        if let Some(timeout) = env_override::<Duration, layout::PaginationTimeout>() {
            self.pagination_timeout_secs = timeout.as_secs();
        }
    }

    /// 源语言，`auto` 表示交给后端检测
    pub fn source_lang(&self) -> Option<&str> {
        match self.source_lang.as_str() {
            "" | "auto" => None,
            lang => Some(lang),
        }
    }

    /// 展开 `~` 后的缓存路径
    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.cache_path).as_ref())
    }

    pub fn pagination_timeout(&self) -> Duration {
        Duration::from_secs(self.pagination_timeout_secs)
    }

    /// 块规划参数
    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            min_chars: self.chunk_min_chars,
            ideal_chars: self.chunk_ideal_chars,
            max_chars: self.chunk_max_chars,
        }
    }

    /// 分页参数
    pub fn layout_options(&self) -> LayoutOptions {
        LayoutOptions {
            max_page_chars: self.max_page_chars,
            refine_lookback_chars: self.refine_lookback_chars,
            timeout: self.pagination_timeout(),
            strict_timeout: self.strict_pagination_timeout,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            target_lang: "zh".to_string(),
            source_lang: "auto".to_string(),

            chunk_min_chars: constants::CHUNK_MIN_CHARS,
            chunk_ideal_chars: constants::CHUNK_IDEAL_CHARS,
            chunk_max_chars: constants::CHUNK_MAX_CHARS,

            prefetch_enabled: true,
            prefetch_lookahead: constants::PREFETCH_LOOKAHEAD,
            prefetch_lookbehind: constants::PREFETCH_LOOKBEHIND,

            cache_enabled: true,
            cache_path: constants::DEFAULT_CACHE_PATH.to_string(),
            local_cache_size: constants::DEFAULT_LOCAL_CACHE_SIZE,

            max_page_chars: constants::DEFAULT_MAX_PAGE_CHARS,
            refine_lookback_chars: constants::DEFAULT_REFINE_LOOKBACK_CHARS,
            pagination_timeout_secs: constants::DEFAULT_PAGINATION_TIMEOUT.as_secs(),
            strict_pagination_timeout: false,
        }
    }
}

/// 读取已设置的环境变量
fn env_override<T, V: EnvVar<T>>() -> Option<T> {
    match V::lookup()? {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("忽略无效的环境变量: {}", e);
            None
        }
    }
}

/// 简化的配置管理器
pub struct ConfigManager {
    config: TranslationConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// 创建新的配置管理器
    ///
    /// 依次加载 `.env`、配置文件、环境变量覆盖，最后验证。
    pub fn new() -> TranslationResult<Self> {
        Self::load_dotenv();

        let (mut config, source) = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config, source })
    }

    /// 从指定文件创建配置管理器
    pub fn from_path<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        let path = path.as_ref();
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self {
            config,
            source: Some(path.to_path_buf()),
        })
    }

    /// 获取配置
    pub fn get_config(&self) -> &TranslationConfig {
        &self.config
    }

    /// 配置来源文件（使用默认值时为 None）
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn load_config() -> TranslationResult<(TranslationConfig, Option<PathBuf>)> {
        for path in constants::CONFIG_PATHS {
            let expanded_path = PathBuf::from(shellexpand::tilde(path).as_ref());
            if expanded_path.exists() {
                tracing::info!("加载配置文件: {}", expanded_path.display());
                let config = Self::load_from_file(&expanded_path)?;
                return Ok((config, Some(expanded_path)));
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok((TranslationConfig::default(), None))
    }

    /// 从指定文件加载配置
    fn load_from_file(path: &Path) -> TranslationResult<TranslationConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        let is_toml = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            toml::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析TOML配置失败: {}", e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析JSON配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件内容
    pub fn example_config() -> TranslationResult<String> {
        toml::to_string_pretty(&TranslationConfig::default())
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))
    }

    /// 生成示例配置文件
    pub fn generate_example_config<P: AsRef<Path>>(path: P) -> TranslationResult<()> {
        let content = Self::example_config()?;
        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;
        Ok(())
    }
}
