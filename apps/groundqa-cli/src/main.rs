use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use groundqa_core::config::{Config, LoggingSettings, Settings};
use groundqa_core::input::QueryValidator;
use groundqa_core::types::ScoredPassage;
use groundqa_llm::{backend_from_settings, LlmBackend};
use groundqa_rag::messages::{UserMessage, NO_RESULTS};
use groundqa_rag::{health, Pipeline, QaService, RateLimiter, ReplyStatus, ResultCache};

const USAGE: &str = "Usage:
  groundqa ask <question> [--category C] [--top-k N] [--client ID] [--sources-only]
  groundqa health [--json]
  groundqa models";

/// `GROUNDQA_LOG` wins over `logging.level`. Output goes to stderr.
fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_env("GROUNDQA_LOG")
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_target(false).with_writer(std::io::stderr)).init();
    }
}

struct AskArgs {
    question: String,
    category: Option<String>,
    top_k: Option<i64>,
    client: String,
    sources_only: bool,
}

fn parse_ask(args: &[String]) -> Result<AskArgs> {
    let mut parsed = AskArgs { question: String::new(), category: None, top_k: None, client: "cli".into(), sources_only: false };
    let mut words = Vec::new();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--category" => parsed.category = Some(it.next().ok_or_else(|| anyhow!("--category needs a value"))?.clone()),
            "--top-k" => {
                let v = it.next().ok_or_else(|| anyhow!("--top-k needs a value"))?;
                parsed.top_k = Some(v.parse().with_context(|| format!("--top-k: '{v}' is not an integer"))?);
            }
            "--client" => parsed.client = it.next().ok_or_else(|| anyhow!("--client needs a value"))?.clone(),
            "--sources-only" => parsed.sources_only = true,
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            word => words.push(word.to_string()),
        }
    }
    parsed.question = words.join(" ");
    Ok(parsed)
}

fn print_sources(sources: &[ScoredPassage]) {
    if sources.is_empty() {
        return;
    }
    println!("\nSources ({}):", sources.len());
    for (i, s) in sources.iter().enumerate() {
        let preview: String = s.text().chars().take(280).collect();
        let ellipsis = if s.text().chars().count() > 280 { "..." } else { "" };
        println!("  {}. [{}] {}  distance={:.4}", i + 1, s.category(), s.topic(), s.distance);
        println!("     {preview}{ellipsis}");
    }
}

fn build_pipeline(settings: &Settings, base: &std::path::Path) -> Result<Arc<Pipeline>> {
    let cache = Arc::new(ResultCache::from_settings(&settings.cache));
    let pipeline = Pipeline::from_settings(settings, base, cache).context("failed to start the answering pipeline")?;
    Ok(Arc::new(pipeline))
}

fn ask(settings: &Settings, base: &std::path::Path, args: &[String]) -> Result<()> {
    let args = parse_ask(args)?;
    let pipeline = build_pipeline(settings, base)?;
    let top_k = args.top_k.unwrap_or(i64::try_from(settings.retrieval.default_top_k).unwrap_or(i64::MAX));

    if args.sources_only {
        let validator = QueryValidator::new(settings.input.max_query_length)?;
        let top_k = usize::try_from(top_k.max(0)).unwrap_or(0);
        let sources = validator
            .clean(&args.question)
            .and_then(|question| pipeline.retrieve_only(&question, args.category.as_deref(), top_k));
        match sources {
            Ok(sources) if sources.is_empty() => println!("{NO_RESULTS}"),
            Ok(sources) => print_sources(&sources),
            Err(e) => println!("{}", e.user_message()),
        }
        return Ok(());
    }

    let service = QaService::new(
        Arc::clone(&pipeline),
        Arc::new(RateLimiter::from_settings(&settings.rate_limit)),
        QueryValidator::new(settings.input.max_query_length)?,
    );
    let reply = service.ask(&args.client, &args.question, args.category.as_deref(), top_k);
    if let Some(notice) = &reply.notice {
        eprintln!("note: {notice} Showing a summary of the retrieved passages.");
    }
    println!("{}", reply.text);
    if reply.status == ReplyStatus::Answered {
        print_sources(&reply.sources);
    }
    Ok(())
}

fn health_cmd(settings: &Settings, base: &std::path::Path, args: &[String]) -> Result<()> {
    let started = Instant::now();
    let pipeline = build_pipeline(settings, base)?;
    let report = health::check(&pipeline, started);
    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("status: {:?}", report.status);
    println!("index: {} passages, dim {}", report.index.passages, report.index.dim);
    println!(
        "llm: {} / {} ({})",
        report.llm.provider,
        report.llm.model,
        if report.llm.available { "available" } else { "unavailable" }
    );
    println!(
        "cache: enabled={} size={}/{} ttl={}s",
        report.cache.enabled, report.cache.size, report.cache.max_size, report.cache.ttl_secs
    );
    println!("checked at {}", report.checked_at.to_rfc3339());
    Ok(())
}

fn models(settings: &Settings) -> Result<()> {
    let backend = backend_from_settings(&settings.llm)?;
    let models = backend.list_models();
    if models.is_empty() {
        eprintln!("{} reported no models; is the service running?", backend.name());
    }
    for m in models {
        println!("{m}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = Config::load()?;
    let settings = config.settings()?;
    init_tracing(&settings.logging);
    tracing::debug!(env = config.env_name(), "configuration loaded");
    let base = env::current_dir()?;

    match command.as_str() {
        "ask" => ask(&settings, &base, &args[1..]),
        "health" => health_cmd(&settings, &base, &args[1..]),
        "models" => models(&settings),
        other => {
            eprintln!("unknown command '{other}'\n{USAGE}");
            std::process::exit(2);
        }
    }
}
