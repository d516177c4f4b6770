use clap::{CommandFactory, Parser, Subcommand};
use libimgq::config::{ColorChoice, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod format;

/// Environment variable overriding the `-v` log level.
const LOG_ENV: &str = "IMGQ_LOG";

/// imgq - Container Image Query
///
/// Finds the images of a registry repository matching a tag pattern,
/// platforms and labels, newest first.
#[derive(Parser, Debug)]
#[command(name = "imgq")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to $IMGQ_CONFIG, then <config dir>/imgq/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Control colored output: auto, always, never
    #[arg(long, global = true, value_parser = ["auto", "always", "never"])]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the images of a repository
    Query {
        /// Repository, e.g. ghcr.io/org/app or localhost:5000/alpine
        repository: String,
        /// Tag pattern: a literal tag, or a regex between slashes
        #[arg(short, long, default_value = "/.*/")]
        tag: String,
        /// Required platform as os/arch (repeatable, any may match)
        #[arg(short, long = "platform")]
        platforms: Vec<String>,
        /// Required label as key=value (repeatable, all must match)
        #[arg(short, long = "label")]
        labels: Vec<String>,
        /// Keep only the newest image
        #[arg(long)]
        most_recent: bool,
        /// Output format: pretty, json, yaml
        #[arg(short, long, value_parser = ["pretty", "json", "yaml"])]
        format: Option<String>,
        /// Print only digest references
        #[arg(short, long)]
        quiet: bool,
    },
    /// List the tags of a repository selected by a pattern
    Tags {
        /// Repository, e.g. ghcr.io/org/app
        repository: String,
        /// Tag pattern: a literal tag, or a regex between slashes
        #[arg(short, long, default_value = "/.*/")]
        tag: String,
        /// Output format: pretty, json, yaml
        #[arg(short, long, value_parser = ["pretty", "json", "yaml"])]
        format: Option<String>,
    },
    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Display version information
    Version,
}

/// Maps `-v` occurrences to a default log level.
fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(log_level(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Version => {
            println!("{}", commands::version_string());
            return;
        }
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
            return;
        }
        _ => {}
    }

    let cli_color = cli.color.as_deref().map(ColorChoice::from);
    let config_path = context::default_config_path(cli.config);
    let ctx = match context::AppContext::build(config_path.as_deref(), cli_color) {
        Ok(ctx) => ctx,
        Err(e) => {
            let color = context::use_color(cli_color.unwrap_or_default());
            format::error(&e.to_string(), color);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Query {
            repository,
            tag,
            platforms,
            labels,
            most_recent,
            format,
            quiet,
        } => {
            let args = commands::QueryArgs {
                repository,
                tag,
                platforms,
                labels,
                most_recent,
                format: format.as_deref().map(OutputFormat::from),
                quiet,
            };
            commands::handle_query(&ctx, args).await
        }
        Commands::Tags {
            repository,
            tag,
            format,
        } => {
            let format = format.as_deref().map(OutputFormat::from);
            commands::handle_tags(&ctx, &repository, &tag, format).await
        }
        Commands::Completion { .. } | Commands::Version => 0,
    };

    std::process::exit(code);
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
