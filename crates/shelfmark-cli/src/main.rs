use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use shelfmark_catalog::batch;
use shelfmark_catalog::{
    AbortSignal, CoverOutcome, IdType, IdentificationResolver, IdentifyRequest, Outcome,
};
use shelfmark_core::models::identifiers::ISBN;
use shelfmark_core::{CanonicalRecord, LookupConfig};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "shelfmark",
    about = "Identify books and fetch covers from the product catalog",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting SHELFMARK_JSON=1.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify a book and print its metadata.
    Identify {
        #[command(flatten)]
        book: BookSelector,
    },

    /// Download a book's cover image.
    Cover {
        #[command(flatten)]
        book: BookSelector,
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Look up many identifiers at once and fill the record cache.
    Batch {
        /// Identifiers separated by commas, semicolons or whitespace.
        ids: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information.
    Version,
}

#[derive(Args)]
struct BookSelector {
    #[arg(long)]
    title: Option<String>,
    #[arg(long, action = clap::ArgAction::Append)]
    author: Vec<String>,
    #[arg(long)]
    isbn: Option<String>,
    /// Catalog vendor id (ASIN).
    #[arg(long)]
    asin: Option<String>,
    /// Per-call timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
}

impl BookSelector {
    fn request(&self, config: &LookupConfig) -> IdentifyRequest {
        let mut req = IdentifyRequest::new();
        if let Some(title) = &self.title {
            req = req.with_title(title.as_str());
        }
        for author in &self.author {
            req = req.with_author(author.as_str());
        }
        if let Some(isbn) = &self.isbn {
            req = req.with_identifier(ISBN, isbn.as_str());
        }
        if let Some(asin) = &self.asin {
            req = req.with_identifier(config.vendor_id_key(), asin.as_str());
        }
        if let Some(secs) = self.timeout {
            req = req.with_timeout(Duration::from_secs(secs));
        }
        req
    }
}

// ─── Config Actions ──────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all config values (secret key redacted).
    List,
    /// Print the config file path.
    Path,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let start = Instant::now();
    let cli = Cli::parse();

    let json_output = cli.json || std::env::var("SHELFMARK_JSON").as_deref() == Ok("1");
    let timing = std::env::var("SHELFMARK_TIMING").as_deref() == Ok("1");

    let config = LookupConfig::load()?;
    if timing {
        eprintln!("[timing] config loaded in {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
    }

    match cli.command {
        // ── Identify ───────────────────────────────────────────────────────

        Commands::Identify { book } => {
            let resolver = IdentificationResolver::from_config(&config)?;
            let abort = abort_on_ctrl_c();
            let identification = resolver.identify(&book.request(&config), &abort).await?;
            let dur = start.elapsed().as_millis();

            match &identification.outcome {
                Outcome::Emitted(_) => {
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "ok",
                            "data": { "items": identification.records, "total": identification.records.len() },
                            "meta": { "duration_ms": dur }
                        }))?;
                    } else {
                        for record in &identification.records {
                            print_record(record);
                        }
                    }
                }
                outcome => fail(json_output, outcome, dur)?,
            }
        }

        // ── Cover ──────────────────────────────────────────────────────────

        Commands::Cover { book, output } => {
            let resolver = IdentificationResolver::from_config(&config)?;
            let abort = abort_on_ctrl_c();
            let req = book.request(&config);
            if req.title.is_none() && req.identifiers.is_empty() {
                fail(json_output, &Outcome::InsufficientInput, start.elapsed().as_millis())?;
            }

            let outcome = resolver.download_cover(&req, &abort).await?;
            let dur = start.elapsed().as_millis();
            match outcome {
                CoverOutcome::Downloaded { url, bytes } => {
                    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&output, &bytes)?;
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "ok",
                            "data": { "url": url, "path": output, "bytes": bytes.len() },
                            "meta": { "duration_ms": dur }
                        }))?;
                    } else {
                        println!("Saved cover to {} ({} bytes)", output.display(), bytes.len());
                    }
                }
                CoverOutcome::Failed(message) => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"error","error":"cover_failed","message":message,"meta":{"duration_ms":dur}}))?;
                    } else {
                        eprintln!("{message}");
                    }
                    std::process::exit(1);
                }
                CoverOutcome::Cancelled => {
                    eprintln!("Cancelled");
                    std::process::exit(1);
                }
            }
        }

        // ── Batch ──────────────────────────────────────────────────────────

        Commands::Batch { ids, file } => {
            let text = match (ids, file) {
                (Some(ids), _) => ids,
                (None, Some(path)) => std::fs::read_to_string(&path)?,
                (None, None) => {
                    let path = config.batch_file();
                    match std::fs::read_to_string(&path) {
                        Ok(text) => text,
                        Err(_) => {
                            eprintln!("No identifiers given and {} not found", path.display());
                            std::process::exit(2);
                        }
                    }
                }
            };

            let plan = batch::plan(&text);
            if plan.isbns.is_empty() && plan.vendor_ids.is_empty() {
                eprintln!("No ISBNs or vendor ids found in input");
                std::process::exit(2);
            }

            let resolver = IdentificationResolver::from_config(&config)?;
            let mut report = resolver.bulk_lookup(&plan.isbns, IdType::Isbn).await?;
            report.merge(resolver.bulk_lookup(&plan.vendor_ids, IdType::Asin).await?);
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "report": report, "unrecognized": plan.unrecognized },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("Batch lookup:");
                println!("  Written:       {}", report.written);
                println!("  Skipped:       {}", report.skipped);
                println!("  Lost:          {}", report.lost);
                println!("  Failed chunks: {}", report.failed_chunks);
                if !plan.unrecognized.is_empty() {
                    println!("  Unrecognized:  {}", plan.unrecognized.join(", "));
                }
            }
        }

        // ── Config ─────────────────────────────────────────────────────────

        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::List => {
                    let kv = config_key_values(&config);
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":kv,"meta":{"duration_ms":dur}}))?;
                    } else {
                        for (k, v) in &kv {
                            println!("{k} = {v}");
                        }
                    }
                }
                ConfigAction::Path => {
                    let path = LookupConfig::config_path();
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":path,"exists":path.exists()},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("{}", path.display());
                    }
                }
            }
        }

        // ── Version ────────────────────────────────────────────────────────

        Commands::Version => {
            let version = env!("CARGO_PKG_VERSION");
            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":{"version":version},"meta":{"duration_ms":dur}}))?;
            } else {
                println!("shelfmark v{version}");
            }
        }
    }

    if timing {
        eprintln!("[timing] total {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

/// Report a non-success outcome and exit: 2 for unusable input, 1 otherwise.
fn fail(json_output: bool, outcome: &Outcome, dur: u128) -> Result<()> {
    let (error, code) = match outcome {
        Outcome::InsufficientInput => ("insufficient_input", 2),
        Outcome::EmptyNoMatch => ("not_found", 1),
        Outcome::AbandonedOnFault { .. } => ("catalog_fault", 1),
        Outcome::Emitted(_) => return Ok(()),
    };
    let message = outcome.user_message().unwrap_or_default();
    if json_output {
        print_json(&serde_json::json!({"status":"error","error":error,"message":message,"meta":{"duration_ms":dur}}))?;
    } else {
        eprintln!("{message}");
    }
    std::process::exit(code);
}

/// Abort signal tripped by Ctrl-C.
fn abort_on_ctrl_c() -> AbortSignal {
    let abort = AbortSignal::new();
    let handle = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    abort
}

fn print_record(record: &CanonicalRecord) {
    println!("[{}] {}", record.source_relevance, record.title);
    if !record.authors.is_empty() {
        println!("    Authors:     {}", record.authors.join(" & "));
    }
    for (kind, value) in record.identifiers.iter() {
        println!("    {:<12} {value}", format!("{kind}:"));
    }
    if let Some(publisher) = &record.publisher {
        println!("    Publisher:   {publisher}");
    }
    if let Some(date) = record.pubdate {
        println!("    Published:   {date}");
    }
    if let Some(series) = &record.series {
        println!("    Series:      {} #{}", series.name, series.index);
    }
    if !record.languages.is_empty() {
        println!("    Languages:   {}", record.languages.join(", "));
    }
    if !record.tags.is_empty() {
        println!("    Tags:        {}", record.tags.join(", "));
    }
    if let Some(url) = &record.cover_url {
        println!("    Cover:       {url}");
    }
}

fn config_key_values(config: &LookupConfig) -> BTreeMap<&'static str, String> {
    let redact = |v: &str| if v.is_empty() { String::new() } else { "********".to_string() };
    let mut map = BTreeMap::new();
    map.insert("credentials.access_key", config.credentials.access_key.clone());
    map.insert("credentials.secret_key", redact(&config.credentials.secret_key));
    map.insert("credentials.associate_tag", config.credentials.associate_tag.clone());
    map.insert("catalog.region", config.catalog.region.to_string());
    map.insert(
        "catalog.endpoint",
        config.catalog.endpoint.clone().unwrap_or_default(),
    );
    map.insert("catalog.search_index", config.catalog.search_index.clone());
    map.insert("catalog.max_qps", config.catalog.max_qps.to_string());
    map.insert("catalog.timeout_secs", config.catalog.timeout_secs.to_string());
    map.insert("catalog.max_search_pages", config.catalog.max_search_pages.to_string());
    map.insert("catalog.throttle_retries", config.catalog.throttle_retries.to_string());
    map.insert("resolution.preferred_binding", config.resolution.preferred_binding.clone());
    map.insert(
        "resolution.disable_title_author_search",
        config.resolution.disable_title_author_search.to_string(),
    );
    map.insert(
        "resolution.disable_api_calls",
        config.resolution.disable_api_calls.to_string(),
    );
    map.insert("cache.enabled", config.cache.enabled.to_string());
    map.insert("cache.directory", config.cache.directory.to_string_lossy().to_string());
    map
}
