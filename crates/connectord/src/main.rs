//! Connector daemon entry point (C15): parses CLI arguments, loads
//! configuration, wires the feed pipeline, the document-serving HTTP
//! side, and the push drivers together, and runs until shutdown.

mod fs_adaptor;
mod logging;
mod run;

use std::path::PathBuf;

use clap::Parser;

use crate::logging::DiagnosticFormat;

/// Connector daemon: bridges a content repository to a search
/// appliance by pushing document identifiers over the feed protocol
/// and serving document content back on request.
#[derive(Debug, Parser)]
#[command(name = "connectord", about, version)]
struct Opt {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Root directory served by the bundled filesystem adaptor.
    #[arg(long, default_value = "./content")]
    adaptor_root: PathBuf,

    /// Directory where diagnostic log files will be placed.
    ///
    /// If omitted, diagnostics will be printed to stderr.
    #[arg(long)]
    diag_log_dir: Option<PathBuf>,

    /// How diagnostic logs render. full, compact and pretty are
    /// intended for human consumption; json is machine readable.
    #[arg(long, default_value = "full")]
    diag_format: DiagnosticFormat,

    /// Whether to enable the diagnostic tokio console.
    #[arg(long)]
    tokio_console: bool,
}

fn main() -> anyhow::Result<()> {
    let opts = Opt::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async move {
            run::run(run::RunOpts {
                config_path: opts.config,
                adaptor_root: opts.adaptor_root,
                diag_log_dir: opts.diag_log_dir,
                diag_format: opts.diag_format,
                tokio_console: opts.tokio_console,
            })
            .await
        })
}
