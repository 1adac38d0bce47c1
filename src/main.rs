use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use actready_audit::{ask, run_scan, ChatError, ChatSession, ScanLimits, ScanOptions};
use actready_core::audit::{AuditOutcome, AuditResult};
use actready_core::provider::StreamOptions;
use actready_index::{ingest_file, EmbedderConfig, IngestOptions, OpenAiEmbedder, SqliteVectorIndex};
use actready_llm::{OpenAiConfig, OpenAiProvider, ReliableConfig, ReliableProvider};
use actready_settings::{api_key_from_env, load_settings, load_settings_from_path, Settings};
use actready_telemetry::{init_telemetry, TelemetryConfig};

/// Exit code for a scan that produced a failure diagnostic instead of a report.
const EXIT_AUDIT_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(name = "actready", version, about = "EU AI Act readiness audits for source repositories")]
struct Cli {
    /// Settings file (default: ~/.actready/settings.json)
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Log level for stderr output (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clone a repository, audit a sample of its sources and print the report
    Scan {
        url: String,
        /// Also write the report JSON to this file
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        #[arg(long)]
        max_files: Option<usize>,
        #[arg(long)]
        max_lines: Option<usize>,
    },
    /// Split, embed and store a plain-text copy of the regulation
    Ingest {
        #[arg(value_name = "TEXT_FILE")]
        path: PathBuf,
    },
    /// Interactive questions about the regulation or a saved report
    Chat {
        /// Ground the conversation in a report written by `scan --out`
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut settings = match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }

    init_telemetry(&TelemetryConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
    ));
    if api_key_from_env().is_none() {
        warn!("OPENAI_API_KEY is not set; requests are sent without credentials");
    }

    match cli.command {
        Command::Scan {
            url,
            out,
            max_files,
            max_lines,
        } => scan(&settings, &url, out.as_deref(), max_files, max_lines).await,
        Command::Ingest { path } => ingest(&settings, &path).await,
        Command::Chat { report } => chat(&settings, report.as_deref()).await,
    }
}

async fn scan(
    settings: &Settings,
    url: &str,
    out: Option<&Path>,
    max_files: Option<usize>,
    max_lines: Option<usize>,
) -> Result<ExitCode> {
    let index = open_index(settings)?;
    if index.count()? == 0 {
        warn!(path = %index.path().display(), "retrieval index is empty; run `actready ingest` first");
    }
    let provider = build_provider(settings)?;

    let options = ScanOptions {
        limits: ScanLimits {
            max_files: max_files.unwrap_or(settings.scan.max_files),
            max_lines: max_lines.unwrap_or(settings.scan.max_lines),
            max_skipped: settings.scan.max_skipped,
            extensions: settings.scan.extensions.clone(),
        },
        generation: generation_options(settings),
    };

    let outcome = match run_scan(url, &provider, &index, &options).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match &outcome {
        AuditOutcome::Report(report) => {
            if let Some(path) = out {
                let json = serde_json::to_string_pretty(report)?;
                tokio::fs::write(path, json)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!(path = %path.display(), "report written");
            }
            Ok(ExitCode::SUCCESS)
        }
        AuditOutcome::Failure(failure) => {
            eprintln!("audit failed: {}", failure.error);
            if out.is_some() {
                warn!("no report produced; output file not written");
            }
            Ok(ExitCode::from(EXIT_AUDIT_FAILURE))
        }
    }
}

async fn ingest(settings: &Settings, path: &Path) -> Result<ExitCode> {
    let index = open_index(settings)?;
    let options = IngestOptions {
        chunk_size: settings.index.chunk_size,
        chunk_overlap: settings.index.chunk_overlap,
        batch_size: settings.embeddings.batch_size,
    };
    let report = ingest_file(&index, path, &options)
        .await
        .with_context(|| format!("failed to ingest {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

async fn chat(settings: &Settings, report: Option<&Path>) -> Result<ExitCode> {
    let mut session = match report {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let report: AuditResult = serde_json::from_str(&text)
                .with_context(|| format!("{} is not a valid audit report", path.display()))?;
            ChatSession::grounded(report)
        }
        None => ChatSession::general(),
    };
    let index = open_index(settings)?;
    let provider = build_provider(settings)?;
    let options = generation_options(settings);

    eprintln!("Ask about the EU AI Act. /clear resets the conversation, /exit quits.");
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = read_question(&mut lines, tokio::signal::ctrl_c()).await else {
            println!();
            break;
        };
        let line = line?;
        let question = line.trim();
        match question {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                session.clear();
                continue;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let answer = ask(
            &mut session,
            question,
            &provider,
            &index,
            &options,
            &cancel,
            |fragment| {
                print!("{fragment}");
                let _ = std::io::stdout().flush();
            },
        );
        let result = interruptible(answer, &cancel, tokio::signal::ctrl_c()).await;
        println!();

        match result {
            Ok(_) => {}
            Err(ChatError::Cancelled) => eprintln!("(cancelled)"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Next input line, or `None` at end of input or when `interrupt` fires first.
async fn read_question<S, I>(lines: &mut S, interrupt: I) -> Option<std::io::Result<String>>
where
    S: Stream<Item = std::io::Result<String>> + Unpin,
    I: Future,
{
    tokio::select! {
        line = lines.next() => line,
        _ = interrupt => None,
    }
}

/// Drive `answer` to completion; if `interrupt` fires first, cancel it and
/// wait for it to wind down so the session is left untouched.
async fn interruptible<F, I>(answer: F, cancel: &CancellationToken, interrupt: I) -> Result<String, ChatError>
where
    F: Future<Output = Result<String, ChatError>>,
    I: Future,
{
    tokio::pin!(answer);
    tokio::select! {
        result = &mut answer => result,
        _ = interrupt => {
            cancel.cancel();
            answer.await
        }
    }
}

fn open_index(settings: &Settings) -> Result<SqliteVectorIndex> {
    let embedder = OpenAiEmbedder::new(EmbedderConfig {
        base_url: settings.embeddings.base_url.clone(),
        model: settings.embeddings.model.clone(),
        api_key: api_key_from_env(),
    })?;
    SqliteVectorIndex::open(&settings.index.db_path, Arc::new(embedder))
        .with_context(|| format!("failed to open index {}", settings.index.db_path.display()))
}

fn build_provider(settings: &Settings) -> Result<ReliableProvider<OpenAiProvider>> {
    let provider = OpenAiProvider::new(OpenAiConfig {
        base_url: settings.llm.base_url.clone(),
        model: settings.llm.model.clone(),
        api_key: api_key_from_env(),
    })?;
    let retry = ReliableConfig {
        max_retries: settings.retry.max_retries,
        base_delay: Duration::from_millis(settings.retry.base_delay_ms),
        max_delay: Duration::from_millis(settings.retry.max_delay_ms),
        ..ReliableConfig::default()
    };
    Ok(ReliableProvider::new(provider, retry))
}

fn generation_options(settings: &Settings) -> StreamOptions {
    StreamOptions {
        max_tokens: settings.llm.max_tokens,
        temperature: Some(settings.llm.temperature),
        ..StreamOptions::default()
    }
}
