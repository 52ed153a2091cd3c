use clap::Parser;
use offtrac::cli::commands::{self, CommandContext};
use offtrac::cli::{Cli, Commands, RemoteArgs};
use offtrac::config::CliOverrides;
use offtrac::logging::init_logging;
use offtrac::{OfftracError, StructuredError};
use std::io::{self, IsTerminal};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let remote = match &cli.command {
        Commands::Sync(args) => Some(args),
        Commands::Update(args) => Some(&args.remote),
        _ => None,
    };
    let ctx = CommandContext {
        overrides: build_cli_overrides(&cli, remote),
        json: cli.json,
        quiet: cli.quiet,
    };

    let result = match &cli.command {
        Commands::Init => commands::init::execute(&ctx),
        Commands::Sync(_) => commands::sync::execute(&ctx),
        Commands::Reindex(args) => commands::reindex::execute(args.full, &ctx),
        Commands::Update(args) => commands::update::execute(args.full, &ctx),
        Commands::Report(args) => commands::report::execute(args, &ctx),
        Commands::Reports => commands::reports::execute(&ctx),
        Commands::Status => commands::status::execute(&ctx),
        Commands::Completions(args) => commands::completions::execute(args),
    };

    if let Err(e) = result {
        handle_error(&e, cli.json, cli.no_color);
    }
}

/// Print the error (JSON with `--json`, colored text on a terminal) and exit.
fn handle_error(err: &OfftracError, json_mode: bool, no_color: bool) -> ! {
    let structured = StructuredError::from_error(err);

    if json_mode {
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        let use_color = !no_color && io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(err.exit_code());
}

fn build_cli_overrides(cli: &Cli, remote: Option<&RemoteArgs>) -> CliOverrides {
    CliOverrides {
        root: cli.root.clone(),
        url: remote.and_then(|r| r.url.clone()),
        user: remote.and_then(|r| r.user.clone()),
        batch_size: remote.and_then(|r| r.batch_size),
    }
}
