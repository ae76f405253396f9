//! polyindex - command line front-end
//!
//! # Usage
//!
//! ```bash
//! # Scan a workspace
//! polyindex scan --workspace /path/to/repo
//!
//! # Find a symbol and its references
//! polyindex symbols Store
//! polyindex refs Store --direction incoming
//!
//! # Unreachable symbols, stale files and files that are both
//! polyindex dead-code
//! polyindex stale --stale-days 120
//! polyindex candidates
//!
//! # Raw tool call
//! polyindex tool session_open '{"session_id": "a"}'
//! ```
//!
//! `--json` prints machine-readable output. Results go to stdout, logs and
//! errors to stderr. Exit codes: 0 = success, 1 = error.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use polyindex::{
    AmbiguityPolicy, ConfigOverrides, DeadCodeSummary, DeletionCandidate, Dependency,
    IndexState, ScanSummary, StaleFilesReport, Symbol, ToolCall, dispatch,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "polyindex")]
#[command(version)]
#[command(about = "Multi-language code index: cross-language graph, dead code, stale files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace directory to analyze
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// How to resolve references matching several symbols
    #[arg(long, global = true, value_enum)]
    ambiguity: Option<Ambiguity>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Ambiguity {
    Nearest,
    KeepAll,
    UniqueOnly,
}

impl From<Ambiguity> for AmbiguityPolicy {
    fn from(value: Ambiguity) -> Self {
        match value {
            Ambiguity::Nearest => Self::Nearest,
            Ambiguity::KeepAll => Self::KeepAll,
            Ambiguity::UniqueOnly => Self::UniqueOnly,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the workspace and print graph statistics
    Scan,

    /// Find symbol definitions by name
    Symbols {
        /// Simple or qualified name (`src/store.ts::Store`)
        name: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show edges into or out of a symbol
    Refs {
        name: String,

        #[arg(short, long, value_enum, default_value = "incoming")]
        direction: Direction,
    },

    /// Report unreachable symbols
    DeadCode {
        /// Maximum symbols to print
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },

    /// Report files without recent commits
    Stale {
        #[arg(long)]
        stale_days: Option<i64>,
    },

    /// Stale files that also declare unreachable symbols
    Candidates {
        #[arg(long)]
        stale_days: Option<i64>,
    },

    /// Invoke a tool by name with JSON arguments
    Tool {
        name: String,

        /// JSON object of named options
        #[arg(default_value = "{}")]
        arguments: String,
    },

    /// Scan, then re-scan whenever files change (Ctrl-C to stop)
    #[cfg(feature = "watch")]
    Watch {
        /// Debounce window in milliseconds
        #[arg(long, default_value = "500")]
        debounce_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only to stderr to keep stdout clean)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let workspace = cli.workspace.clone();
    let workspace = workspace.canonicalize().unwrap_or(workspace);

    match run_command(&cli, &workspace).await {
        Ok(output) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_human_readable(&output);
            }
            Ok(())
        }
        Err(e) => {
            if cli.json {
                let err = serde_json::json!({
                    "error": format!("{e:#}")
                });
                eprintln!("{}", serde_json::to_string_pretty(&err)?);
            } else {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}

async fn run_command(cli: &Cli, workspace: &Path) -> Result<Output> {
    let overrides = ConfigOverrides {
        ambiguity: cli.ambiguity.map(Into::into),
        ..Default::default()
    };
    let state = IndexState::open(workspace, &overrides)
        .with_context(|| format!("Failed to open workspace {}", workspace.display()))?;

    match &cli.command {
        Commands::Scan => {
            let summary = state.rescan().await.context("Scan failed")?;
            Ok(Output::Scan {
                workspace: workspace.display().to_string(),
                summary,
            })
        }

        Commands::Symbols { name, limit } => {
            state.rescan().await.context("Scan failed")?;
            let graph = state.graph();
            let mut results: Vec<Symbol> = match graph.find_by_qualified_name(name) {
                Some(symbol) => vec![symbol.clone()],
                None => graph.find_by_name(name).into_iter().cloned().collect(),
            };
            results.truncate(*limit);
            Ok(Output::Symbols {
                query: name.clone(),
                results,
            })
        }

        Commands::Refs { name, direction } => {
            state.rescan().await.context("Scan failed")?;
            let graph = state.graph();
            let symbols: Vec<&Symbol> = match graph.find_by_qualified_name(name) {
                Some(symbol) => vec![symbol],
                None => graph.find_by_name(name),
            };
            if symbols.is_empty() {
                anyhow::bail!("No symbol named {name:?}");
            }

            let mut results = Vec::new();
            for symbol in symbols {
                let edges = match direction {
                    Direction::Incoming => graph.incoming(symbol.id),
                    Direction::Outgoing => graph.outgoing(symbol.id),
                };
                results.extend(edges.into_iter().map(|edge| RefResult::new(&graph, edge)));
            }
            Ok(Output::Refs {
                symbol: name.clone(),
                direction: match direction {
                    Direction::Incoming => "incoming",
                    Direction::Outgoing => "outgoing",
                },
                results,
            })
        }

        Commands::DeadCode { limit } => {
            state.rescan().await.context("Scan failed")?;
            let report = state.dead_code();
            Ok(Output::DeadCode {
                summary: report.summary,
                symbols: report.unreachable.into_iter().take(*limit).collect(),
            })
        }

        Commands::Stale { stale_days } => {
            state.rescan().await.context("Scan failed")?;
            let overrides = ConfigOverrides {
                stale_days: *stale_days,
                ..overrides
            };
            let report = state.stale_files(&overrides).await?;
            Ok(Output::Stale { report })
        }

        Commands::Candidates { stale_days } => {
            state.rescan().await.context("Scan failed")?;
            let overrides = ConfigOverrides {
                stale_days: *stale_days,
                ..overrides
            };
            let candidates = state.deletion_candidates(&overrides).await?;
            Ok(Output::Candidates { candidates })
        }

        Commands::Tool { name, arguments } => {
            let arguments: serde_json::Value =
                serde_json::from_str(arguments).context("Tool arguments must be JSON")?;
            let result = dispatch(&state, &ToolCall::new(name.clone(), arguments)).await?;
            Ok(Output::Tool {
                tool: name.clone(),
                result,
            })
        }

        #[cfg(feature = "watch")]
        Commands::Watch { debounce_ms } => {
            let state = std::sync::Arc::new(state);
            let summary = state.rescan().await.context("Scan failed")?;
            eprintln!(
                "Watching {} ({} files, {} symbols)",
                workspace.display(),
                summary.stats.files,
                summary.stats.symbols
            );
            let handle = polyindex::watch::spawn_watcher(
                std::sync::Arc::clone(&state),
                std::time::Duration::from_millis(*debounce_ms),
            )?;
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            handle.stop();
            let summary = state.last_scan().unwrap_or(summary);
            Ok(Output::Scan {
                workspace: workspace.display().to_string(),
                summary,
            })
        }
    }
}

#[derive(serde::Serialize)]
#[serde(tag = "type")]
enum Output {
    Scan {
        workspace: String,
        summary: ScanSummary,
    },
    Symbols {
        query: String,
        results: Vec<Symbol>,
    },
    Refs {
        symbol: String,
        direction: &'static str,
        results: Vec<RefResult>,
    },
    DeadCode {
        summary: DeadCodeSummary,
        symbols: Vec<Symbol>,
    },
    Stale {
        report: StaleFilesReport,
    },
    Candidates {
        candidates: Vec<DeletionCandidate>,
    },
    Tool {
        tool: String,
        result: serde_json::Value,
    },
}

#[derive(serde::Serialize)]
struct RefResult {
    source: String,
    target: Option<String>,
    reference: String,
    kind: String,
    confidence: String,
    cross_language: bool,
    line: usize,
}

impl RefResult {
    fn new(graph: &polyindex::ProjectGraph, edge: &Dependency) -> Self {
        let qualified = |id| graph.get(id).map(|s: &Symbol| s.qualified_name.clone());
        Self {
            source: qualified(edge.source).unwrap_or_else(|| edge.source.to_string()),
            target: edge.target.and_then(qualified),
            reference: edge.reference.to_string(),
            kind: edge.kind.to_string(),
            confidence: format!("{:?}", edge.confidence).to_lowercase(),
            cross_language: edge.cross_language,
            line: edge.line,
        }
    }
}

fn print_symbol(s: &Symbol) {
    println!(
        "  {} ({}, {}) at {}:{}",
        s.qualified_name,
        s.kind,
        s.language,
        s.file.display(),
        s.lines.start
    );
}

fn print_human_readable(output: &Output) {
    match output {
        Output::Scan { workspace, summary } => {
            let stats = &summary.stats;
            println!(
                "Scanned {} files, {} symbols, {} edges in {}ms",
                stats.files, stats.symbols, stats.edges, summary.elapsed_ms
            );
            println!(
                "  {} dangling, {} cross-language, {} entry files",
                stats.dangling_edges, stats.cross_language_edges, stats.entry_files
            );
            if !summary.parse_failures.is_empty() {
                println!("Parse failures:");
                for failure in &summary.parse_failures {
                    println!("  {failure}");
                }
            }
            println!("Workspace: {workspace}");
        }
        Output::Symbols { query, results } => {
            println!("Symbol: \"{query}\"");
            println!("Found {} matches:", results.len());
            for s in results {
                print_symbol(s);
            }
        }
        Output::Refs {
            symbol,
            direction,
            results,
        } => {
            println!("{direction} references of \"{symbol}\":");
            println!("Found {} edges:", results.len());
            for r in results {
                let target = r.target.as_deref().unwrap_or("<unresolved>");
                let cross = if r.cross_language { " cross-language" } else { "" };
                println!(
                    "  {} -> {} [{} {}{}] line {} ({})",
                    r.source, target, r.kind, r.confidence, cross, r.line, r.reference
                );
            }
        }
        Output::DeadCode { summary, symbols } => {
            println!("Dead code analysis:");
            println!(
                "  {} symbols, {} roots, {} reachable, {} unreachable, {} dangling edges",
                summary.total_symbols,
                summary.roots,
                summary.reachable,
                summary.unreachable,
                summary.dangling_edges
            );
            if !symbols.is_empty() {
                println!("Unreachable:");
                for s in symbols {
                    print_symbol(s);
                }
            }
        }
        Output::Stale { report } => {
            println!(
                "Stale files (no commits for more than {} days): {}",
                report.stale_days,
                report.stale_files.len()
            );
            for f in &report.stale_files {
                println!("  {:>5} days  {}", f.days_idle, f.path.display());
            }
            if !report.untracked.is_empty() {
                println!("Untracked: {}", report.untracked.len());
                for path in &report.untracked {
                    println!("  {}", path.display());
                }
            }
            if let Some(first) = report.diagnostics.first() {
                eprintln!(
                    "warning: history lookup failed for {} files: {}",
                    report.diagnostics.len(),
                    first.message
                );
            }
        }
        Output::Candidates { candidates } => {
            println!("Deletion candidates: {}", candidates.len());
            for c in candidates {
                println!(
                    "  {} ({} unreachable symbols, idle {} days)",
                    c.path.display(),
                    c.unreachable_symbols,
                    c.days_idle
                );
            }
        }
        Output::Tool { result, .. } => match serde_json::to_string_pretty(result) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Error: {e}"),
        },
    }
}
