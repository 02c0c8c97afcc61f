//! Warden CLI - Query repository permissions and branch protection.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod fixture;

use commands::{Context, MergeOptions, PushOptions};

/// Exit code of a check that was denied.
const EXIT_DENIED: i32 = 2;

/// Warden - Repository authorization
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Site fixture (YAML)
    #[arg(short, long, global = true, default_value = "warden.yaml")]
    fixture: PathBuf,

    /// Authorization settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a user's permission on a repository
    Permission {
        /// Repository as owner/name
        repo: String,
        /// User name (default: anonymous)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Check whether a push to a branch is allowed
    CheckPush {
        /// Repository as owner/name
        repo: String,
        /// Target branch
        branch: String,
        /// Pushing user
        #[arg(short, long)]
        user: String,
        /// Push through a deploy key owned by the user
        #[arg(long)]
        deploy_key: bool,
        /// Force-push
        #[arg(long)]
        force: bool,
        /// Delete the branch
        #[arg(long)]
        delete: bool,
        /// Changed file (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
    },

    /// Check whether a pull request may be merged
    CheckMerge {
        /// Repository as owner/name
        repo: String,
        /// Base branch
        branch: String,
        /// Merging user
        #[arg(short, long)]
        user: String,
        /// Head commit of the pull request
        #[arg(long)]
        head: String,
        /// Review as user=state[@commit] (repeatable, oldest first)
        #[arg(long = "review")]
        reviews: Vec<String>,
        /// Head branch is behind the base branch
        #[arg(long)]
        behind: bool,
        /// Head commit signature is not verified
        #[arg(long)]
        unsigned: bool,
        /// Changed file (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
    },

    /// Suggest required status check contexts for a branch
    Contexts {
        /// Repository as owner/name
        repo: String,
        /// Branch name
        branch: String,
    },

    /// List protected and unprotected branches
    Rules {
        /// Repository as owner/name
        repo: String,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("warden_auth={log_level},warden_cli={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_DENIED),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Runs one command. Returns false when a check was denied.
fn run(cli: Cli) -> anyhow::Result<bool> {
    if let Commands::Version = cli.command {
        println!("warden {}", env!("CARGO_PKG_VERSION"));
        return Ok(true);
    }

    let ctx = Context::load(&cli.fixture, cli.config.as_deref(), cli.json)
        .with_context(|| format!("failed to load site from {}", cli.fixture.display()))?;

    let allowed = match cli.command {
        Commands::Permission { repo, user } => {
            commands::permission(&ctx, &repo, user.as_deref())?;
            true
        }
        Commands::CheckPush {
            repo,
            branch,
            user,
            deploy_key,
            force,
            delete,
            files,
        } => commands::check_push(
            &ctx,
            &repo,
            &branch,
            &user,
            PushOptions {
                deploy_key,
                force,
                delete,
                files,
            },
        )?,
        Commands::CheckMerge {
            repo,
            branch,
            user,
            head,
            reviews,
            behind,
            unsigned,
            files,
        } => commands::check_merge(
            &ctx,
            &repo,
            &branch,
            &user,
            MergeOptions {
                head,
                reviews,
                behind,
                unsigned,
                files,
            },
        )?,
        Commands::Contexts { repo, branch } => {
            commands::contexts(&ctx, &repo, &branch)?;
            true
        }
        Commands::Rules { repo } => {
            commands::rules(&ctx, &repo)?;
            true
        }
        Commands::Version => true,
    };

    Ok(allowed)
}
