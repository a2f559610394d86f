// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, debug, error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use syncread::api::ArticleApi;
use syncread::api::http::HttpArticleApi;
use syncread::app_config::{self, Config};
use syncread::audio::checksum::{self, ChecksumManifest};
use syncread::audio::{AudioDecoder, SymphoniaDecoder};
use syncread::editing::batch;
use syncread::editing::waveform::{WaveformLayout, compute_envelope};
use syncread::{ArticleAnnotations, SentenceIndex, SentenceKey, TimeWindow};

static SENTENCE_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[Pp]?(\d+):[Ss]?(\d+)$").unwrap());

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
    /// Check a local audio part file against the article's checksum manifest
    Verify {
        /// Audio part file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Zero-based part index
        #[arg(short, long)]
        part: usize,

        /// Article annotations JSON carrying `audio_part_checksums`
        #[arg(short, long, conflicts_with = "expected")]
        annotations: Option<PathBuf>,

        /// Expected SHA-256 digest, instead of reading it from annotations
        #[arg(short, long)]
        expected: Option<String>,
    },

    /// Decode an audio file and compute the waveform envelope of a time window
    Envelope {
        /// Audio file (mp3 or wav)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Window start in milliseconds
        #[arg(long)]
        start_ms: i64,

        /// Window end in milliseconds
        #[arg(long)]
        end_ms: i64,

        /// Print every column instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Spread a sentence's window evenly over a range of sentences
    Distribute {
        /// Article annotations JSON
        #[arg(short, long)]
        annotations: PathBuf,

        /// First sentence of the range, as PARAGRAPH:SENTENCE
        #[arg(long)]
        from: String,

        /// Last sentence of the range, whose window is distributed
        #[arg(long)]
        to: String,

        /// Send the new windows to the server instead of only printing them
        #[arg(long)]
        commit: bool,
    },

    /// Store the reading location of an article on the server
    SaveLocation {
        /// Sentence to save, as PARAGRAPH:SENTENCE
        #[arg(value_name = "SENTENCE")]
        at: String,
    },

    /// Download one audio part of the article from the server
    FetchPart {
        /// Zero-based part index
        #[arg(long, default_value_t = 0)]
        part: usize,

        /// Where to write the audio
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Request the part as an attachment rather than the streaming URL
        #[arg(long)]
        download: bool,
    },

    /// Generate shell completions for syncread
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// syncread - sentence/audio synchronization tools
///
/// Command line access to the timestamp engine of the read-along reader.
#[derive(Parser, Debug)]
#[command(name = "syncread")]
#[command(version)]
#[command(about = "Sentence/audio synchronization and timestamp editing")]
#[command(long_about = "syncread checks narration files, inspects waveforms and edits sentence timestamps.

EXAMPLES:
    syncread verify part2.mp3 --part 1 -a article.json   # Check a downloaded part
    syncread envelope full.mp3 --start-ms 1000 --end-ms 2500
    syncread distribute -a article.json --from 3:0 --to 3:4
    syncread --article 42 distribute -a article.json --from 3:0 --to 3:4 --commit
    syncread --article 42 save-location 3:2
    syncread completions bash > syncread.bash

CONFIGURATION:
    Configuration is read from syncread.json in the working directory, or from the
    per-user config directory. A default file is created if none exists.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config_path: Option<PathBuf>,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,

    /// Reader server root URL
    #[arg(long, global = true, env = "SYNCREAD_SERVER")]
    server: Option<String>,

    /// Article id for server operations
    #[arg(long, global = true)]
    article: Option<i64>,
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
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI colour for log level
    fn get_colour_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let level = record.level();
            let _ = writeln!(
                std::io::stderr(),
                "{}{} {} {}\x1B[0m",
                Self::get_colour_for_level(level),
                now,
                Self::get_emoji_for_level(level),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Info until the config says otherwise
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "syncread", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli)?;
    log::set_max_level(config.log_level.to_level_filter());
    debug!("Effective configuration: {:?}", config);

    let result = match cli.command {
        Commands::Verify {
            file,
            part,
            annotations,
            expected,
        } => run_verify(&file, part, annotations.as_deref(), expected).await,
        Commands::Envelope {
            file,
            start_ms,
            end_ms,
            json,
        } => run_envelope(&config, &file, start_ms, end_ms, json).await,
        Commands::Distribute {
            annotations,
            from,
            to,
            commit,
        } => run_distribute(&config, &annotations, &from, &to, commit).await,
        Commands::SaveLocation { at } => run_save_location(&config, &at).await,
        Commands::FetchPart {
            part,
            output,
            download,
        } => run_fetch_part(&config, part, &output, download).await,
        Commands::Completions { .. } => Ok(()),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

/// Load the configuration and apply command line overrides
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let path = cli.config_path.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&path)?;

    if let Some(level) = &cli.log_level {
        config.log_level = level.clone().into();
    }
    if let Some(server) = &cli.server {
        config.server.base_url = server.clone();
    }
    if let Some(article) = cli.article {
        config.server.article_id = article;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn parse_sentence_key(value: &str) -> Result<SentenceKey> {
    let captures = SENTENCE_KEY
        .captures(value.trim())
        .ok_or_else(|| anyhow!("Expected PARAGRAPH:SENTENCE, got '{}'", value))?;
    let paragraph = captures[1].parse().context("Paragraph index out of range")?;
    let sentence = captures[2].parse().context("Sentence index out of range")?;
    Ok(SentenceKey::new(paragraph, sentence))
}

fn read_annotations(path: &Path) -> Result<ArticleAnnotations> {
    let file = File::open(path).with_context(|| format!("Failed to open annotations: {:?}", path))?;
    let annotations: ArticleAnnotations = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse annotations: {:?}", path))?;
    Ok(annotations)
}

fn http_api(config: &Config) -> Result<HttpArticleApi> {
    if config.server.article_id <= 0 {
        return Err(anyhow!("An article id is required, pass --article or set server.article_id"));
    }
    let api = HttpArticleApi::new(
        &config.server.base_url,
        config.server.article_id,
        config.server.timeout_secs,
    )?;
    Ok(api)
}

async fn run_verify(file: &Path, part: usize, annotations: Option<&Path>, expected: Option<String>) -> Result<()> {
    let expected = match (expected, annotations) {
        (Some(digest), _) => digest,
        (None, Some(path)) => {
            let annotations = read_annotations(path)?;
            let manifest = ChecksumManifest::parse(annotations.audio_part_checksums.as_deref());
            manifest
                .expected_for(part)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("The manifest has no checksum for part {}", part + 1))?
        }
        (None, None) => return Err(anyhow!("Pass --expected or --annotations")),
    };

    let actual = checksum::sha256_file(file).await?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        info!("Part {} matches: {}", part + 1, actual);
        Ok(())
    } else {
        Err(anyhow!(
            "Part {} does not match: expected {}, got {}",
            part + 1,
            expected.trim(),
            actual
        ))
    }
}

async fn run_envelope(config: &Config, file: &Path, start_ms: i64, end_ms: i64, json: bool) -> Result<()> {
    let window = TimeWindow::new(start_ms, end_ms)?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read audio file: {:?}", file))?;
    let audio = tokio::task::spawn_blocking(move || SymphoniaDecoder.decode(&bytes))
        .await
        .context("Decoder task failed")??;
    info!(
        "Decoded {:?}: {} channel(s), {} Hz, {:.0}ms",
        file,
        audio.channel_count(),
        audio.sample_rate(),
        audio.duration_ms()
    );
    if (end_ms as f64) > audio.duration_ms() {
        warn!("Window ends after the audio ({:.0}ms); the tail is flat", audio.duration_ms());
    }

    let layout = WaveformLayout::compute(window, &config.waveform);
    let envelope = compute_envelope(audio.primary_channel(), audio.sample_rate(), &layout);

    if json {
        println!("{}", serde_json::to_string(&envelope)?);
    } else {
        let peak = envelope.iter().copied().fold(0.0f32, f32::max);
        println!(
            "{} columns at {:.2} ms/px ({}x{} px), peak {:.3}",
            envelope.len(),
            layout.ms_per_pixel,
            layout.width,
            layout.height,
            peak
        );
    }
    Ok(())
}

async fn run_distribute(config: &Config, annotations: &Path, from: &str, to: &str, commit: bool) -> Result<()> {
    let beginning = parse_sentence_key(from)?;
    let ending = parse_sentence_key(to)?;
    let annotations = read_annotations(annotations)?;
    let mut index = SentenceIndex::from_annotations(&annotations)?;

    if !commit {
        for planned in batch::plan_distribution(&index, beginning, ending)? {
            println!(
                "{}\t{}\t{}",
                planned.key, planned.window.start_ms, planned.window.end_ms
            );
        }
        return Ok(());
    }

    let api = http_api(config)?;
    let updates = batch::distribute(&mut index, beginning, ending, &api).await?;
    for update in &updates {
        println!("{}\t{}\t{}", update.id, update.new_start_ms, update.new_end_ms);
    }
    info!("Committed {} timestamp updates", updates.len());
    Ok(())
}

async fn run_save_location(config: &Config, at: &str) -> Result<()> {
    let key = parse_sentence_key(at)?;
    let api = http_api(config)?;
    api.save_location(key.into()).await?;
    info!("Saved reading location {} for article {}", key, config.server.article_id);
    Ok(())
}

async fn run_fetch_part(config: &Config, part: usize, output: &Path, download: bool) -> Result<()> {
    let api = http_api(config)?;
    let bytes = if download {
        api.download_part(part).await?
    } else {
        api.fetch_audio_part(part).await?
    };
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write audio part: {:?}", output))?;
    info!("Wrote part {} ({} bytes) to {:?}", part + 1, bytes.len(), output);
    Ok(())
}
