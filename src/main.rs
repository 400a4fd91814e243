//! reader-translate 命令行入口

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use reader_translate::env::{self, EnvVar};
use reader_translate::layout::{MonospaceMeasurer, Paginator, TextStyle, Viewport};
use reader_translate::translation::error::helpers::log_error;
use reader_translate::translation::{
    ChunkCacheStore, ConfigManager, MockProvider, ProviderRegistry,
    RedbBackend, TranslationConfig, TranslationError, TranslationResult, TranslationService,
};

#[derive(Parser)]
#[command(name = "reader-translate")]
#[command(version, about = "Paginate books and translate them chunk by chunk", long_about = None)]
#[command(after_help = "EXAMPLES:
    reader-translate paginate book.txt --width 400 --height 600
    reader-translate translate book.txt --book moby --lang es --page 12
    reader-translate clear --book moby --lang es")]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split a text file into viewport-sized pages
    Paginate {
        /// Plain text input
        input: PathBuf,

        #[command(flatten)]
        layout: LayoutArgs,

        /// Print pages as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Translate pages of a text file through the chunk cache
    Translate {
        /// Plain text input
        input: PathBuf,

        /// Book identifier used in cache keys
        #[arg(short, long)]
        book: String,

        /// Target language (defaults to the configured one)
        #[arg(short, long)]
        lang: Option<String>,

        /// Page to translate
        #[arg(short, long, default_value_t = 0, conflicts_with = "all")]
        page: usize,

        /// Translate every page
        #[arg(long)]
        all: bool,

        /// Cache database path
        #[arg(long, value_name = "FILE")]
        cache: Option<PathBuf>,

        /// Simulate a backend that strips invisible characters
        #[arg(long)]
        strip_markers: bool,

        #[command(flatten)]
        layout: LayoutArgs,
    },

    /// Show cache statistics
    Stats {
        /// Cache database path
        #[arg(long, value_name = "FILE")]
        cache: Option<PathBuf>,
    },

    /// Remove cached chunks
    Clear {
        /// Cache database path
        #[arg(long, value_name = "FILE")]
        cache: Option<PathBuf>,

        /// Only this book
        #[arg(short, long)]
        book: Option<String>,

        /// Only this language (requires --book)
        #[arg(short, long, requires = "book")]
        lang: Option<String>,
    },

    /// Print an example configuration
    Config {
        /// Print environment variable documentation instead
        #[arg(long = "env")]
        env_docs: bool,
    },
}

#[derive(Args, Clone, Copy)]
struct LayoutArgs {
    /// Viewport width
    #[arg(long, default_value_t = 600.0)]
    width: f32,

    /// Viewport height
    #[arg(long, default_value_t = 800.0)]
    height: f32,

    /// Padding on every side
    #[arg(long, default_value_t = 0.0)]
    padding: f32,

    /// Font size
    #[arg(long, default_value_t = 16.0)]
    font_size: f32,

    /// Line height multiplier
    #[arg(long)]
    line_height: Option<f32>,
}

impl LayoutArgs {
    fn paginator(&self, config: &TranslationConfig) -> Paginator {
        let mut style = TextStyle::new(self.font_size);
        if let Some(line_height) = self.line_height {
            style = style.with_line_height(line_height);
        }

        Paginator::new(
            Arc::new(MonospaceMeasurer::default()),
            Viewport::new(self.width, self.height).with_padding(self.padding),
            style,
        )
        .with_options(config.layout_options())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_error(&e);
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let level = env::core::LogLevel::get().unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> TranslationResult<TranslationConfig> {
    let manager = match path {
        Some(path) => ConfigManager::from_path(path)?,
        None => ConfigManager::new()?,
    };
    Ok(manager.get_config().clone())
}

async fn open_store(
    config: &TranslationConfig,
    cache: Option<PathBuf>,
) -> TranslationResult<ChunkCacheStore> {
    let path = cache.unwrap_or_else(|| config.cache_path());
    let backend = Arc::new(RedbBackend::open(path)?);
    ChunkCacheStore::open(backend, config.local_cache_size).await
}

async fn run(cli: Cli) -> TranslationResult<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Paginate {
            input,
            layout,
            json,
        } => {
            let text = std::fs::read_to_string(&input)?;
            let outcome = layout.paginator(&config).paginate_detailed(&text)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.pages)?);
            } else {
                for (index, page) in outcome.pages.iter().enumerate() {
                    let preview: String = page.chars().take(60).collect();
                    println!(
                        "{:>5}  {:>6} chars  {}",
                        index,
                        page.chars().count(),
                        preview.replace('\n', " ")
                    );
                }
                println!("{} pages in {:?}", outcome.pages.len(), outcome.elapsed);
                if outcome.timed_out {
                    println!("pagination timed out, last page holds the remaining text");
                }
            }
        }

        Command::Translate {
            input,
            book,
            lang,
            page,
            all,
            cache,
            strip_markers,
            layout,
        } => {
            if let Some(lang) = lang {
                config.target_lang = lang;
            }
            let language = config.target_lang.clone();

            let text = std::fs::read_to_string(&input)?;
            let pages = Arc::new(layout.paginator(&config).paginate(&text)?);
            if pages.is_empty() {
                return Err(TranslationError::InvalidInput(format!(
                    "{} 没有可翻译的内容",
                    input.display()
                )));
            }

            let mut provider = MockProvider::new();
            if strip_markers {
                provider = provider.stripping_markers();
            }
            let registry = Arc::new(ProviderRegistry::shared(Arc::new(provider)));
            let store = open_store(&config, cache).await?;
            let service = TranslationService::new(config, store, registry)?;

            let targets: Vec<usize> = if all { (0..pages.len()).collect() } else { vec![page] };
            let mut prefetches = Vec::new();
            for index in targets {
                let original = pages.get(index).ok_or_else(|| {
                    TranslationError::InvalidInput(format!(
                        "页码 {} 超出范围 (共 {} 页)",
                        index,
                        pages.len()
                    ))
                })?;
                let translated = service
                    .get_page_translation(&book, index, original, &language, &pages)
                    .await?;
                println!("--- page {} ---\n{}", index, translated);

                if !all {
                    prefetches =
                        service.pre_translate_nearby_chunks(&book, index, &language, Arc::clone(&pages));
                }
            }
            futures::future::join_all(prefetches).await;

            let snapshot = service.get_stats().snapshot();
            eprintln!(
                "requests: {}, provider calls: {}, hit rate: {:.1}%",
                snapshot.page_requests,
                snapshot.provider_calls,
                snapshot.hit_rate() * 100.0
            );
            service.close().await?;
        }

        Command::Stats { cache } => {
            let store = open_store(&config, cache).await?;
            let stats = store.stats().await?;
            println!("chunks:   {}", stats.total_chunks);
            println!("mappings: {}", stats.total_mappings);
            for (book, count) in &stats.per_book_chunk_counts {
                println!("  {}: {} chunks", book, count);
            }
        }

        Command::Clear { cache, book, lang } => {
            let store = open_store(&config, cache).await?;
            match (book, lang) {
                (Some(book), Some(lang)) => {
                    let removed = store.clear_book_language(&book, &lang).await?;
                    println!("removed {} chunks for {} ({})", removed, book, lang);
                }
                (Some(book), None) => {
                    let removed = store.clear_book(&book).await?;
                    println!("removed {} chunks for {}", removed, book);
                }
                _ => {
                    store.clear_all().await?;
                    println!("cache cleared");
                }
            }
        }

        Command::Config { env_docs } => {
            if env_docs {
                print!("{}", env::generate_env_docs());
            } else {
                print!("{}", ConfigManager::example_config()?);
            }
        }
    }

    Ok(())
}
