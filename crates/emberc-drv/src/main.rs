use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use emberc_drv::{Config, Session};

/// Ember bootstrap compiler.
#[derive(Parser)]
#[command(name = "emberc", version, about = "Ember bootstrap compiler")]
struct Cli {
    /// Source files to compile
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Enable AST and element-graph dumps and the post-run state dump
    #[arg(long)]
    verbose: bool,

    /// File to write the Graphviz AST graph to (with --verbose)
    #[arg(long)]
    ast_graph: Option<PathBuf>,

    /// File to write the Graphviz element graph to (with --verbose)
    #[arg(long)]
    dom_graph: Option<PathBuf>,

    /// Terp heap size in bytes
    #[arg(long, default_value_t = 2 * 1024 * 1024)]
    heap_size: usize,

    /// Terp stack size in bytes
    #[arg(long, default_value_t = 64 * 1024)]
    stack_size: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config {
        verbose: cli.verbose,
        ast_graph_file: cli.ast_graph.clone(),
        dom_graph_file: cli.dom_graph.clone(),
        heap_size: cli.heap_size,
        stack_size: cli.stack_size,
    };

    let mut session = Session::new(config).context("unable to create session")?;
    for path in &cli.sources {
        session
            .add_source_file(path)
            .with_context(|| format!("unable to load '{}'", path.display()))?;
    }

    let mut ok = session.compile();
    if ok {
        ok = session.execute();
    }

    for rendered in session.rendered_diagnostics() {
        eprintln!("{rendered}");
    }

    // Dumps still happen on failure so accumulated output is inspectable.
    if cli.verbose {
        if let Some(path) = &cli.ast_graph {
            session
                .write_ast_graph_file(path)
                .with_context(|| format!("unable to write '{}'", path.display()))?;
        }
        if let Some(path) = &cli.dom_graph {
            session
                .write_dom_graph_file(path)
                .with_context(|| format!("unable to write '{}'", path.display()))?;
        }
        eprintln!("{}", session.state_dump());
    }

    if !ok || session.is_failed() {
        std::process::exit(1);
    }
    Ok(())
}
