use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use proxy_validator::{
    tui::ProxyCheckerApp, ExportFormatter, ExportKind, HttpProbe, PoolConfig, ProbeConfig,
    ProxyParser, ProxyType, RecordSet, TypeSelection, ValidationPool,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How often progress is logged in non-interactive mode
const PROGRESS_INTERVAL_SECS: u64 = 2;

/// A concurrent proxy list validator
#[derive(Parser)]
#[command(name = "proxy-validator")]
#[command(about = "Check proxy lists concurrently and export the working ones")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a proxy list and print the normalized records
    Parse {
        /// Input .txt file containing proxies
        input: PathBuf,
        /// Proxy type (auto, http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "auto")]
        proxy_type: String,
    },
    /// Check proxies and export the working ones
    Check {
        /// Input .txt file containing proxies
        input: PathBuf,
        /// Proxy type (auto, http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "auto")]
        proxy_type: String,
        /// Number of concurrent checks
        #[arg(short = 'n', long, default_value = "10",
              value_parser = clap::value_parser!(u64).range(1..))]
        threads: u64,
        /// Timeout in seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
        /// URL to test proxies against
        #[arg(long, default_value = proxy_validator::proxy::probe::DEFAULT_TEST_URL)]
        test_url: String,
        /// ip-api compatible endpoint for geo lookups
        #[arg(long, default_value = proxy_validator::proxy::geo::DEFAULT_GEO_ENDPOINT)]
        geo_url: String,
        /// MMDB file to use for geo lookups instead of the HTTP endpoint
        #[arg(long)]
        mmdb: Option<String>,
        /// Export format (simple, original, detailed, enhanced, csv)
        #[arg(short, long, default_value = "enhanced")]
        format: String,
        /// Directory to write the export file into; prints to stdout if omitted
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Show the interactive progress view
        #[arg(long)]
        tui: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Check { tui: true, .. } => "warn",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Parse { input, proxy_type } => {
            let selection = parse_type_selection(&proxy_type)?;
            let report = ProxyParser::parse_file(&input, selection)?;

            info!(
                parsed = report.records.len(),
                skipped = report.skipped,
                "parsed proxy list {:?}",
                input
            );
            for record in &report.records {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.id,
                    record.proxy_type,
                    record.address.url(record.proxy_type),
                    record.original_text
                );
            }
        }
        Commands::Check {
            input,
            proxy_type,
            threads,
            timeout,
            test_url,
            geo_url,
            mmdb,
            format,
            output_dir,
            tui,
        } => {
            let selection = parse_type_selection(&proxy_type)?;
            let kind: ExportKind = format.parse().map_err(|e: String| anyhow!(e))?;

            let report = ProxyParser::parse_file(&input, selection)?;
            if report.skipped > 0 {
                warn!(skipped = report.skipped, "lines matched no proxy format");
            }
            if report.records.is_empty() {
                return Err(anyhow!("no proxies found in {:?}", input));
            }
            info!(count = report.records.len(), "loaded proxies from {:?}", input);

            let mut probe_config = ProbeConfig::new()
                .with_test_url(test_url)
                .with_geo_endpoint(geo_url);
            if let Some(path) = mmdb {
                probe_config = probe_config.with_mmdb_path(path);
            }
            let probe = HttpProbe::with_config(probe_config)?;

            let pool_config = PoolConfig::new()
                .with_concurrency(threads as usize)
                .with_timeout_secs(timeout);
            let pool = ValidationPool::new(probe, pool_config);

            let records = RecordSet::new(report.records);
            let handle = pool.start(&records);

            if tui {
                let mut app =
                    ProxyCheckerApp::new(records.clone(), handle.aggregator(), handle.canceller());
                app.run().await?;
            } else {
                let canceller = handle.canceller();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received, stopping run");
                        canceller.cancel();
                    }
                });

                let aggregator = handle.aggregator();
                tokio::spawn(async move {
                    let mut ticker =
                        tokio::time::interval(Duration::from_secs(PROGRESS_INTERVAL_SECS));
                    ticker.tick().await;
                    loop {
                        ticker.tick().await;
                        let s = aggregator.snapshot();
                        if !s.running {
                            break;
                        }
                        info!(
                            "progress {}% ({}/{}) working: {} failed: {} in flight: {}",
                            s.progress_percent, s.checked, s.total, s.working, s.failed, s.checking
                        );
                    }
                });
            }

            let summary = handle.wait().await;
            info!(
                checked = summary.checked,
                working = summary.working,
                failed = summary.failed,
                "validation finished"
            );

            export_working(&records, kind, output_dir)?;
        }
    }

    Ok(())
}

fn export_working(records: &RecordSet, kind: ExportKind, output_dir: Option<PathBuf>) -> Result<()> {
    let working = records.working();
    if working.is_empty() {
        warn!("no working proxies to export");
        return Ok(());
    }

    let formatter = ExportFormatter::at(Utc::now());
    let content = formatter.format(&working, kind);

    match output_dir {
        Some(dir) => {
            let path = dir.join(kind.file_name(formatter.generated_at()));
            std::fs::write(&path, content)
                .with_context(|| format!("failed to write export to {:?}", path))?;
            println!(
                "Exported {} working proxies in {} format ({}) to {:?}",
                working.len(),
                kind.description(),
                kind.mime_type(),
                path
            );
        }
        None => println!("{}", content),
    }

    Ok(())
}

fn parse_type_selection(s: &str) -> Result<TypeSelection> {
    match s.to_lowercase().as_str() {
        "auto" => Ok(TypeSelection::Auto),
        "http" => Ok(ProxyType::Http.into()),
        "https" => Ok(ProxyType::Https.into()),
        "socks4" => Ok(ProxyType::Socks4.into()),
        "socks5" => Ok(ProxyType::Socks5.into()),
        _ => Err(anyhow!(
            "Invalid proxy type: {}. Use: auto, http, https, socks4, socks5",
            s
        )),
    }
}
