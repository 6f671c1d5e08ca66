//! Binary entry point for the deeprepo CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Build the dependency graph reachable from an entry file
//! deeprepo --workspace ./project scan --entry main.py --out graph.json --dot graph.dot
//!
//! # Order the graph leaves-first
//! deeprepo order --input graph.json --out processed.json
//!
//! # Print node and edge statistics
//! deeprepo summary --input graph.json
//! ```
//!
//! Results are printed as JSON on stdout. Logs go to stderr.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::info;

use deeprepo::config::{CliOverrides, ScanConfig};
use deeprepo::error::{DeepRepoError, ErrorResponse, OutputErrorCode};
use deeprepo::lsp::LspClient;
use deeprepo::preprocess::{parse_raw_graph, summarize, Preprocessor};
use deeprepo::scanner::Scanner;
use deeprepo::text::path_to_uri;

/// Dependency-ordered symbol graphs through a language server.
#[derive(Parser, Debug)]
#[command(name = "deeprepo", version, about = "Dependency-ordered code graphs via LSP")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Workspace root directory (default: current directory).
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the graph reachable from an entry file.
    Scan {
        /// Entry file, relative to the workspace or absolute.
        #[arg(long)]
        entry: PathBuf,
        /// Where to write the serialized node list.
        #[arg(long, default_value = "graph.json")]
        out: PathBuf,
        /// Also write a Graphviz rendering.
        #[arg(long)]
        dot: Option<PathBuf>,
        /// Also write a `{nodes, edges}` JSON rendering.
        #[arg(long)]
        visual: Option<PathBuf>,
        /// Language server command line, whitespace separated.
        #[arg(long)]
        server_command: Option<String>,
        /// Per-request timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Language profile to use.
        #[arg(long)]
        language: Option<String>,
    },
    /// Order a serialized graph so dependencies come first.
    Order {
        #[arg(long)]
        input: PathBuf,
        /// Write the ordered graph here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print node and edge statistics for a serialized graph.
    Summary {
        #[arg(long)]
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level, cli.global.log_json);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // errors go to stdout as JSON, like results
            let _ = emit(&serde_json::to_value(&response).unwrap_or_default());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel, json: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

fn execute(cli: Cli) -> Result<(), DeepRepoError> {
    match cli.command {
        Command::Scan {
            entry,
            out,
            dot,
            visual,
            server_command,
            timeout_ms,
            language,
        } => {
            let overrides = CliOverrides {
                language,
                server_command: server_command
                    .map(|s| s.split_whitespace().map(str::to_string).collect()),
                request_timeout_ms: timeout_ms,
            };
            execute_scan(&cli.global, &entry, &out, dot.as_deref(), visual.as_deref(), &overrides)
        }
        Command::Order { input, out } => execute_order(&input, out.as_deref()),
        Command::Summary { input } => execute_summary(&input),
    }
}

fn workspace_root(global: &GlobalArgs) -> Result<PathBuf, DeepRepoError> {
    let root = match &global.workspace {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    fs::canonicalize(&root).map_err(|e| {
        DeepRepoError::invalid_args(format!("workspace {}: {}", root.display(), e))
    })
}

fn execute_scan(
    global: &GlobalArgs,
    entry: &Path,
    out: &Path,
    dot: Option<&Path>,
    visual: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<(), DeepRepoError> {
    let root = workspace_root(global)?;
    let entry = fs::canonicalize(root.join(entry)).map_err(|e| {
        DeepRepoError::invalid_args(format!("entry {}: {}", entry.display(), e))
    })?;

    let config = ScanConfig::resolve(&root, overrides)?;
    let profile = config.profile()?;
    let command = config.command(&profile);

    let mut client = LspClient::start(&command, &root, &profile, config.client_options())?;

    let root_uri = path_to_uri(&root);
    let mut scanner = Scanner::new(&mut client, &profile, &root_uri, config.scan_options());
    let scanned = scanner.scan(&path_to_uri(&entry)).map(|_| ());
    let stats = scanner.stats();
    let graph = scanner.into_graph();

    // stop the server before reporting, whatever the scan outcome
    let stopped = client.shutdown();
    scanned?;
    stopped?;

    graph.save_raw(out)?;
    if let Some(path) = dot {
        fs::write(path, graph.to_dot())?;
    }
    if let Some(path) = visual {
        fs::write(path, graph.to_visual_json()?)?;
    }
    info!(out = %out.display(), nodes = graph.len(), "graph written");

    emit(&json!({
        "status": "ok",
        "out": out.display().to_string(),
        "stats": stats,
        "summary": graph.summary(),
    }))
}

fn execute_order(input: &Path, out: Option<&Path>) -> Result<(), DeepRepoError> {
    let mut preprocessor = Preprocessor::new(input);
    let graph = preprocessor.load()?;

    match out {
        Some(path) => {
            graph.save(path)?;
            emit(&json!({
                "status": "ok",
                "out": path.display().to_string(),
                "nodes": graph.len(),
            }))
        }
        None => {
            let mut stdout = io::stdout();
            writeln!(stdout, "{}", graph.to_json()?)?;
            Ok(())
        }
    }
}

fn execute_summary(input: &Path) -> Result<(), DeepRepoError> {
    let text = fs::read_to_string(input)
        .map_err(|e| DeepRepoError::Io {
            message: format!("{}: {}", input.display(), e),
        })?;
    let raw = parse_raw_graph(&text)?;
    emit(&json!({
        "status": "ok",
        "summary": summarize(&raw),
    }))
}

fn emit(value: &serde_json::Value) -> Result<(), DeepRepoError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| DeepRepoError::internal(e.to_string()))?;
    writeln!(io::stdout(), "{}", text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_defaults() {
        let cli = Cli::try_parse_from(["deeprepo", "scan", "--entry", "main.py"]).unwrap();
        match cli.command {
            Command::Scan {
                entry,
                out,
                dot,
                server_command,
                timeout_ms,
                ..
            } => {
                assert_eq!(entry, PathBuf::from("main.py"));
                assert_eq!(out, PathBuf::from("graph.json"));
                assert!(dot.is_none());
                assert!(server_command.is_none());
                assert!(timeout_ms.is_none());
            }
            _ => panic!("expected Scan"),
        }
        assert!(matches!(cli.global.log_level, LogLevel::Warn));
        assert!(!cli.global.log_json);
    }

    #[test]
    fn scan_with_overrides() {
        let cli = Cli::try_parse_from([
            "deeprepo",
            "--workspace",
            "/tmp/project",
            "scan",
            "--entry",
            "app/main.py",
            "--server-command",
            "pylsp --verbose",
            "--timeout-ms",
            "500",
            "--dot",
            "g.dot",
        ])
        .unwrap();
        assert_eq!(cli.global.workspace, Some(PathBuf::from("/tmp/project")));
        match cli.command {
            Command::Scan {
                server_command,
                timeout_ms,
                dot,
                ..
            } => {
                assert_eq!(server_command.as_deref(), Some("pylsp --verbose"));
                assert_eq!(timeout_ms, Some(500));
                assert_eq!(dot, Some(PathBuf::from("g.dot")));
            }
            _ => panic!("expected Scan"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "deeprepo",
            "summary",
            "--input",
            "graph.json",
            "--log-level",
            "debug",
            "--log-json",
        ])
        .unwrap();
        assert!(matches!(cli.global.log_level, LogLevel::Debug));
        assert!(cli.global.log_json);
        assert!(matches!(cli.command, Command::Summary { .. }));
    }

    #[test]
    fn order_output_is_optional() {
        let cli = Cli::try_parse_from(["deeprepo", "order", "--input", "graph.json"]).unwrap();
        match cli.command {
            Command::Order { input, out } => {
                assert_eq!(input, PathBuf::from("graph.json"));
                assert!(out.is_none());
            }
            _ => panic!("expected Order"),
        }
    }

    #[test]
    fn scan_requires_entry() {
        assert!(Cli::try_parse_from(["deeprepo", "scan"]).is_err());
    }

    #[test]
    fn summary_reads_raw_graph() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(
            &path,
            r#"[{"index":0,"type":"Function","name":"a","uri":"/a.py","code_content":"","dependencies":[],"dependencies_count":0}]"#,
        )
        .unwrap();
        execute_summary(&path).unwrap();
        assert!(matches!(
            execute_summary(&dir.path().join("missing.json")),
            Err(DeepRepoError::Io { .. })
        ));
    }

    #[test]
    fn order_reports_cycles_as_graph_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(
            &path,
            r#"[{"index":0,"type":"Function","name":"a","uri":"/a.py","dependencies":[1],"dependencies_count":1},
                {"index":1,"type":"Function","name":"b","uri":"/b.py","dependencies":[0],"dependencies_count":1}]"#,
        )
        .unwrap();
        let err = execute_order(&path, Some(&dir.path().join("out.json"))).unwrap_err();
        assert_eq!(OutputErrorCode::from(&err), OutputErrorCode::GraphIntegrity);
    }
}
