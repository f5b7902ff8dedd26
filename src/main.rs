// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use rand::Rng;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use lingoflow::app_config::{self, Config, ServiceKind};
use lingoflow::errors::{AppError, TranslationError};
use lingoflow::storage::{KeyValueStore, SqliteStore};
use lingoflow::translation::{BatchEntry, BatchOutcome, BatchTranslator, RateLimiter, Translate, TranslationCache};

/// CLI Wrapper for ServiceKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliService {
    Ollama,
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    #[value(name = "lmstudio")]
    LMStudio,
    #[value(name = "deepl")]
    DeepL,
    Google,
}

impl From<CliService> for ServiceKind {
    fn from(cli_service: CliService) -> Self {
        match cli_service {
            CliService::Ollama => ServiceKind::Ollama,
            CliService::OpenAI => ServiceKind::OpenAI,
            CliService::Anthropic => ServiceKind::Anthropic,
            CliService::LMStudio => ServiceKind::LMStudio,
            CliService::DeepL => ServiceKind::DeepL,
            CliService::Google => ServiceKind::Google,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a JSON file of keyed texts through an external command
    Translate(TranslateArgs),

    /// Run a batch against a simulated service and report what the pipeline did
    Simulate(SimulateArgs),

    /// Inspect or clear the persistent translation cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Generate shell completions for lingoflow
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Print cache statistics
    Stats,
    /// Remove every cached translation
    Clear,
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// JSON input: an array of {"key", "text"} objects or a {key: text} object
    #[arg(value_name = "INPUT_JSON")]
    input_path: PathBuf,

    /// Command translating one text from stdin to stdout (e.g. "trans -b :fr")
    #[arg(long)]
    command: String,

    /// Write the {key: translation} result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Translation service whose profile governs concurrency
    #[arg(short, long, value_enum)]
    service: Option<CliService>,

    /// Source language code (e.g., 'en', 'es', 'fr')
    #[arg(long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'en', 'es', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Skip the persistent cache for this run
    #[arg(long)]
    no_cache: bool,

    /// Override the service's request quota (requests per minute)
    #[arg(long, value_name = "N")]
    requests_per_minute: Option<usize>,
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Number of entries in the batch
    #[arg(long, default_value_t = 200)]
    entries: usize,

    /// Mean latency of one simulated call, in milliseconds
    #[arg(long, default_value_t = 200)]
    latency_ms: u64,

    /// Probability that a simulated call fails
    #[arg(long, default_value_t = 0.05)]
    failure_rate: f64,

    /// Translation service whose profile governs concurrency
    #[arg(short, long, value_enum)]
    service: Option<CliService>,
}

/// lingoflow - batch translation orchestration
///
/// Translates large sets of keyed texts through rate-limited services,
/// translating each distinct text once and tuning concurrency on the fly.
#[derive(Parser, Debug)]
#[command(name = "lingoflow")]
#[command(version)]
#[command(about = "Batch translation orchestrator with caching and adaptive concurrency")]
#[command(long_about = "lingoflow translates batches of keyed texts through a translation service.

EXAMPLES:
    lingoflow translate strings.json --command \"trans -b :fr\"   # Translate through a CLI tool
    lingoflow translate strings.json --command ./mt.sh -o fr.json
    lingoflow simulate --entries 500 --failure-rate 0.2         # Watch the adaptive manager
    lingoflow cache stats                                       # Inspect the persistent cache
    lingoflow completions bash > lingoflow.bash                 # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // The logger itself passes everything; log::max_level does the filtering
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji and ANSI colour for log level
    fn decoration(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("❌ ", "1;31"),
            Level::Warn => ("🚧 ", "1;33"),
            Level::Info => (" ", "1;32"),
            Level::Debug => ("🔍 ", "1;36"),
            Level::Trace => ("📋 ", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (emoji, colour) = Self::decoration(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", colour, now, emoji, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Translator piping each text through an external command
struct CommandTranslator {
    program: String,
    args: Vec<String>,
}

impl CommandTranslator {
    fn parse(command_line: &str) -> Result<Self> {
        let mut parts = split_command_line(command_line)?.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("--command must name a program"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Split a command line into words, honouring single quotes, double quotes
/// and backslash escapes the way a POSIX shell does
fn split_command_line(command_line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = command_line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => return Err(anyhow!("--command ends with a dangling escape")),
            },
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, '\\') => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    in_word = true;
                }
                None => return Err(anyhow!("--command ends with a dangling escape")),
            },
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(anyhow!("--command has an unterminated {} quote", q));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[async_trait]
impl Translate for CommandTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranslationError::NetworkFailure(format!("failed to start {}: {}", self.program, e)))?;

        // Feed stdin from its own task so a chatty child cannot block on a full stdout pipe
        let writer = child.stdin.take().map(|mut stdin| {
            let input = text.to_string();
            tokio::spawn(async move { stdin.write_all(input.as_bytes()).await })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| TranslationError::NetworkFailure(format!("command failed: {}", e)))?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // The child may exit without reading all of its input
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => {
                    return Err(TranslationError::NetworkFailure(format!("failed to write input: {}", e)));
                }
                Err(e) => {
                    return Err(TranslationError::NetworkFailure(format!("input writer failed: {}", e)));
                }
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranslationError::VendorRejected(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let translation = String::from_utf8(output.stdout)
            .map_err(|e| TranslationError::MalformedResponse(format!("output is not UTF-8: {}", e)))?;
        let translation = translation.trim_end_matches(['\r', '\n']).to_string();

        if translation.trim().is_empty() && !text.trim().is_empty() {
            return Err(TranslationError::MalformedResponse("empty translation".to_string()));
        }
        Ok(translation)
    }
}

/// Translator with random latency and failures
struct SimulatedTranslator {
    latency_ms: u64,
    failure_rate: f64,
}

#[async_trait]
impl Translate for SimulatedTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        let (delay, fails) = {
            let mut rng = rand::rng();
            let jitter = rng.random_range(0.5..1.5);
            (
                Duration::from_millis((self.latency_ms as f64 * jitter) as u64),
                rng.random_bool(self.failure_rate.clamp(0.0, 1.0)),
            )
        };

        tokio::time::sleep(delay).await;
        if fails {
            return Err(TranslationError::NetworkFailure("simulated failure".to_string()));
        }
        Ok(format!("[{}]", text))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "lingoflow", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = Config::load_or_create(&cli.config_path)?;
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }
    log::set_max_level(config.log_level.to_level_filter());

    match cli.command {
        Commands::Translate(args) => run_translate(config, args).await,
        Commands::Simulate(args) => run_simulate(config, args).await,
        Commands::Cache { action } => run_cache(config, action),
        Commands::Completions { .. } => Ok(()),
    }
}

async fn run_translate(mut config: Config, args: TranslateArgs) -> Result<()> {
    if let Some(service) = args.service {
        config.service = service.into();
    }
    if let Some(source_language) = args.source_language {
        config.source_language = source_language;
    }
    if let Some(target_language) = args.target_language {
        config.target_language = target_language;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }
    config.validate().context("Configuration validation failed")?;

    let entries = read_entries(&args.input_path)
        .with_context(|| format!("Failed to read entries from {}", args.input_path.display()))?;
    info!("Loaded {} entries from {}", entries.len(), args.input_path.display());

    let translator: Arc<dyn Translate> = Arc::new(CommandTranslator::parse(&args.command)?);
    let cache = open_cache(&config)?;
    cache.spawn_sweep();

    let mut batch = BatchTranslator::from_config(&config, cache.clone());
    if let Some(requests) = args.requests_per_minute {
        info!("Limiting {} to {} requests per minute", config.service, requests);
        batch = batch.with_rate_limiter(Some(RateLimiter::new(requests.max(1), Duration::from_secs(60))));
    }
    batch.spawn_health_check();

    let progress_bar = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}%"))
        .map_err(|e| anyhow!("Failed to create progress bar style: {}", e))?;
    progress_bar.set_style(style.progress_chars("█▓▒░"));

    let on_progress = |percent: f64| progress_bar.set_position(percent.round() as u64);
    let outcome = batch.translate_batch(&entries, translator, Some(&on_progress)).await;
    progress_bar.finish_and_clear();

    if let Err(e) = cache.dispose() {
        warn!("Failed to persist translation cache: {}", e);
    }

    write_results(&outcome, args.output.as_deref())?;
    report_outcome(&outcome)
}

async fn run_simulate(mut config: Config, args: SimulateArgs) -> Result<()> {
    if let Some(service) = args.service {
        config.service = service.into();
    }
    config.validate().context("Configuration validation failed")?;

    // Roughly a quarter of the entries repeat an earlier text
    let distinct = (args.entries * 3 / 4).max(1);
    let entries: Vec<BatchEntry> = (0..args.entries)
        .map(|i| BatchEntry::new(format!("entry.{}", i), format!("Sample text number {}", i % distinct)))
        .collect();

    let translator: Arc<dyn Translate> = Arc::new(SimulatedTranslator {
        latency_ms: args.latency_ms,
        failure_rate: args.failure_rate,
    });
    let batch = BatchTranslator::from_config(&config, TranslationCache::in_memory(config.cache.clone()));
    batch.spawn_health_check();

    let start_config = batch.manager().current_config();
    let outcome = batch.translate_batch(&entries, translator, None).await;
    let end_config = batch.manager().current_config();

    println!("Service:        {}", config.service.display_name());
    println!("Keys:           {}", outcome.stats.total_keys);
    println!("Unique texts:   {}", outcome.stats.unique_texts);
    println!("Translated:     {}", outcome.stats.translated);
    println!("Failed:         {}", outcome.stats.failed);
    println!("Duration:       {:?}", outcome.stats.duration);
    println!("Condition:      {}", batch.manager().evaluate_condition());
    println!("Emergency:      {}", batch.manager().is_emergency());
    println!(
        "Concurrency:    {} -> {}",
        start_config.max_concurrent, end_config.max_concurrent
    );
    println!(
        "Interval:       {}ms -> {}ms",
        start_config.rate_limit_interval_ms, end_config.rate_limit_interval_ms
    );

    Ok(())
}

fn run_cache(config: Config, action: CacheAction) -> Result<()> {
    let cache = open_persistent_cache(&config)?;

    match action {
        CacheAction::Stats => {
            let expired = cache.cleanup_expired();
            if expired > 0 {
                info!("Dropped {} expired cached translations", expired);
            }
            let stats = cache.stats();
            println!("Entries:        {}", stats.total_entries);
            println!("Total hits:     {}", stats.total_hits);
            println!("Memory:         {} bytes", stats.memory_estimate);
            if let Some(oldest) = stats.oldest_entry {
                println!("Oldest:         {:?} ({})", oldest.text, format_timestamp(oldest.last_touched_at));
            }
            if let Some(most_used) = stats.most_used_entry {
                println!("Most used:      {:?} ({} hits)", most_used.text, most_used.hit_count);
            }
        }
        CacheAction::Clear => {
            let removed = cache.len();
            cache.clear();
            cache.dispose().context("Failed to persist cleared cache")?;
            info!("Removed {} cached translations", removed);
        }
    }

    Ok(())
}

/// Open the cache described by the configuration
fn open_cache(config: &Config) -> Result<TranslationCache> {
    if !config.cache.enabled {
        return Ok(TranslationCache::in_memory(config.cache.clone()));
    }
    open_persistent_cache(config)
}

fn open_persistent_cache(config: &Config) -> Result<TranslationCache> {
    let store = match &config.cache.database_path {
        Some(path) => SqliteStore::new(path)?,
        None => SqliteStore::new_default()?,
    };
    let store: Arc<dyn KeyValueStore> = Arc::new(store);

    let mut cache_config = config.cache.clone();
    cache_config.enabled = true;
    Ok(TranslationCache::with_store(cache_config, store))
}

/// Read entries from a JSON array of {key, text} objects or a {key: text} object
fn read_entries(path: &Path) -> Result<Vec<BatchEntry>, AppError> {
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| AppError::File(format!("invalid JSON: {}", e)))?;

    match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)
            .map_err(|e| AppError::File(format!("expected [{{\"key\", \"text\"}}] entries: {}", e))),
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(key, text)| match text {
                serde_json::Value::String(text) => Ok(BatchEntry::new(key, text)),
                other => Err(AppError::File(format!("value of '{}' is not a string: {}", key, other))),
            })
            .collect(),
        other => Err(AppError::File(format!(
            "expected an array or an object, found {}",
            other
        ))),
    }
}

fn write_results(outcome: &BatchOutcome, output: Option<&Path>) -> Result<()> {
    let translations: BTreeMap<String, String> = outcome.translations().into_iter().collect();
    let json = serde_json::to_string_pretty(&translations).context("Failed to serialize translations")?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write translations to {}", path.display()))?;
            info!("Wrote {} translations to {}", translations.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn report_outcome(outcome: &BatchOutcome) -> Result<()> {
    for (key, e) in outcome.failures() {
        error!("{}: {}", key, e);
    }

    let stats = &outcome.stats;
    info!(
        "Translated {} of {} keys ({} from cache) in {:?}",
        stats.total_keys - stats.failed_keys,
        stats.total_keys,
        stats.cache_hits,
        stats.duration
    );

    if outcome.success {
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} keys failed to translate",
            stats.failed_keys,
            stats.total_keys
        ))
    }
}

fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}
