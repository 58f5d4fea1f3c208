//! pyjs-build - builds Python distributions and the py-js externals

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use pyjs_cli::cmd;
use pyjs_cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.config.as_deref();
    match &cli.command {
        Commands::Build { target, stages } => cmd::build::build(&cli.root, config, target, stages),
        Commands::Recipe { name, stages } => cmd::build::recipe(&cli.root, config, name, stages),
        Commands::List => {
            cmd::list::list();
            Ok(())
        }
        Commands::Relocate {
            binary,
            dest,
            exec_ref,
            rpath,
            staticlibs_dir,
        } => cmd::relocate::relocate(
            binary,
            dest,
            &cmd::relocate::Options {
                exec_ref: exec_ref.as_deref(),
                rpath: rpath.as_deref(),
                staticlibs_dir: staticlibs_dir.as_deref(),
            },
        ),
    }
}
