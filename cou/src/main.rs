#![deny(missing_docs)]

//! CLI binary interface for cou

use std::sync::Arc;

use clap::Parser;
use cou::config::Tunables;
use cou::engine::{spawn_signal_listener, ConsolePrompt, InterruptState, Prompt};
use cou::errors::CouError;

use crate::cli::{Cli, Commands};

mod cli;

fn main() {
    let cli = Cli::parse();

    // Failing to open the log file must not keep an upgrade from running.
    let _guard = match cou::logging::init(cli.verbose, cli.quiet) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("warning: failed to set up logging: {err}");
            None
        }
    };

    std::process::exit(real_main(&cli));
}

fn real_main(cli: &Cli) -> i32 {
    // One worker: the engine is a cooperative scheduler over concurrent
    // tasks, not a thread pool.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("initializing tokio runtime failed");

    match runtime.block_on(run(cli)) {
        Ok(()) => 0,
        Err(err) => {
            let code = err.exit_code();
            let report = miette::Report::new(err);
            eprintln!("{report:?}");
            code
        }
    }
}

async fn run(cli: &Cli) -> Result<(), CouError> {
    let config = cli.to_config()?;
    let tunables = Tunables::from_env();
    let client = cou_juju::CliJuju::new(config.model.clone());

    match &cli.command {
        Commands::Plan(_) => cou::do_plan(&client, &config, &tunables).await,
        Commands::Upgrade(_) => {
            let interrupts = InterruptState::new();
            let _listener = spawn_signal_listener(interrupts.clone());
            let prompt: Option<Arc<dyn Prompt>> = if config.auto_approve {
                None
            } else {
                Some(Arc::new(ConsolePrompt))
            };
            cou::do_upgrade(&client, &config, &tunables, prompt, interrupts).await
        }
    }
}
