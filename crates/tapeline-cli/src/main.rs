//! `tapeline` operator tool.
//!
//! ```text
//! tapeline verify BTC-USD.jsonl
//! tapeline replay BTC-USD.jsonl --config exchange.json --depth 5
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tapeline_audit::{AuditRecord, JsonLinesStore, replay};
use tapeline_matchcore::{BookSnapshot, digest_hex};
use tapeline_types::{ExchangeConfig, SymbolConfig, constants};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tapeline", version = constants::VERSION)]
#[command(about = "Verify and replay Tapeline audit logs")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the hash chain of a JSON-lines audit file
    Verify {
        file: PathBuf,
    },

    /// Rebuild the book from an audit file and print its state
    Replay {
        file: PathBuf,

        /// Exchange config holding the symbol's settings. Defaults are used
        /// when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Price levels to print per side.
        #[arg(long, default_value_t = constants::DEFAULT_SNAPSHOT_DEPTH)]
        depth: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Verify { file } => {
            let summary = verify(&file)?;
            println!("{summary}");
        }
        Commands::Replay {
            file,
            config,
            depth,
        } => {
            let summary = replay_file(&file, config.as_deref(), depth)?;
            println!("{summary}");
        }
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load(file: &Path) -> anyhow::Result<Vec<AuditRecord>> {
    JsonLinesStore::read(file).with_context(|| format!("reading {}", file.display()))
}

fn verify(file: &Path) -> anyhow::Result<String> {
    let records = load(file)?;
    let Some(head) = records.last() else {
        return Ok(format!("{}: empty log", file.display()));
    };
    info!(file = %file.display(), records = records.len(), "chain verified");
    Ok(format!(
        "{}: OK\n  symbol:   {}\n  records:  {}\n  head:     {}",
        file.display(),
        head.symbol,
        records.len(),
        head.hash_hex()
    ))
}

fn replay_file(file: &Path, config: Option<&Path>, depth: usize) -> anyhow::Result<String> {
    let records = load(file)?;
    let Some(first) = records.first() else {
        bail!("{}: nothing to replay", file.display());
    };
    let symbol = first.symbol.clone();

    let symbol_config = match config {
        Some(path) => {
            let exchange = ExchangeConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            exchange
                .symbol(&symbol)
                .cloned()
                .with_context(|| format!("{symbol} is not configured in {}", path.display()))?
        }
        None => SymbolConfig::new(symbol.as_str()),
    };

    let outcome = replay(&records, &symbol_config).context("replay failed")?;
    let mut out = format!(
        "{symbol}: replayed {} records ({} inputs)\n  trades:       {}\n  trade root:   {}\n  book digest:  {}\n",
        records.len(),
        outcome.inputs,
        outcome.trades.len(),
        digest_hex(&outcome.trade_root),
        digest_hex(&outcome.book_digest),
    );
    out.push_str(&render_book(&outcome.engine.snapshot(depth)));
    Ok(out)
}

fn render_book(book: &BookSnapshot) -> String {
    let mut out = String::new();
    let last = book
        .last_trade_price
        .map_or_else(|| "-".to_owned(), |p| p.to_string());
    out.push_str(&format!("  last trade:   {last}{}\n", if book.halted { " (halted)" } else { "" }));
    for level in book.asks.iter().rev() {
        out.push_str(&format!("  ask {:>12} x {:<10} ({})\n", level.price.0, level.quantity.0, level.orders));
    }
    out.push_str("  ---\n");
    for level in &book.bids {
        out.push_str(&format!("  bid {:>12} x {:<10} ({})\n", level.price.0, level.quantity.0, level.orders));
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tapeline_audit::{AuditLog, AuditStore};
    use tapeline_matchcore::MatchingEngine;
    use tapeline_types::*;

    use super::*;

    /// Write a small session for BTC-USD and return the file path.
    fn write_session(dir: &Path) -> PathBuf {
        let config = SymbolConfig::new("BTC-USD").with_breaker(BreakerConfig::disabled());
        let mut engine = MatchingEngine::new(config);
        let mut log = AuditLog::new(Symbol::new("BTC-USD"));
        for (side, price, qty) in [(Side::Sell, 101, 5), (Side::Sell, 102, 5), (Side::Buy, 101, 2), (Side::Buy, 99, 1)] {
            let now = Utc::now();
            let order = Order::dummy_limit(side, Price(price), Quantity(qty));
            let outcome = engine.submit(order.clone(), now).unwrap();
            log.append(AuditEvent::Accepted { order, at: now }, now).unwrap();
            for event in outcome.events {
                log.append(AuditEvent::Engine(event), now).unwrap();
            }
        }
        let path = dir.join("BTC-USD.jsonl");
        JsonLinesStore::open(&path).unwrap().persist(log.records()).unwrap();
        path
    }

    #[test]
    fn verify_reports_head() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(dir.path());
        let summary = verify(&path).unwrap();
        assert!(summary.contains("OK"));
        assert!(summary.contains("BTC-USD"));
    }

    #[test]
    fn verify_fails_on_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(dir.path());
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replacen("\"quantity\":5", "\"quantity\":6", 1)).unwrap();
        assert!(verify(&path).is_err());
    }

    #[test]
    fn replay_prints_book() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(dir.path());
        let summary = replay_file(&path, None, 5).unwrap();
        assert!(summary.contains("4 inputs"));
        assert!(summary.contains("trades:       1"));
        assert!(summary.contains("last trade:   101"));
    }

    #[test]
    fn replay_needs_the_symbol_in_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(dir.path());
        let config = dir.path().join("exchange.json");
        std::fs::write(&config, r#"{"symbols":[{"symbol":"ETH-USD"}]}"#).unwrap();
        assert!(replay_file(&path, Some(&config), 5).is_err());
    }

    #[test]
    fn cli_parses() {
        let cli = Cli::try_parse_from(["tapeline", "--json-logs", "replay", "a.jsonl", "--depth", "3"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Commands::Replay { depth: 3, config: None, .. }));
    }
}
