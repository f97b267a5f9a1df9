mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "grader-cli")]
#[command(about = "Grader CLI - Judge submissions locally and manage assignment configuration", long_about = None)]
struct Cli {
    /// Assignment configuration file (defaults to $GRADER_CONFIG or config/assignments.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Judge one submission directory against an assignment
    Judge {
        /// Assignment id (e.g., A1)
        #[arg(short, long)]
        assignment: String,

        /// Path to the unpacked submission
        #[arg(short, long)]
        submission: PathBuf,

        /// Print the full report as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Check the configuration and every fixture directory
    Validate,

    /// List configured assignments
    List,

    /// Initialize a new grader project
    Init {
        /// Project path
        #[arg(short, long, default_value = ".")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Judge {
            assignment,
            submission,
            json,
        } => {
            commands::judge_submission(cli.config.as_deref(), &assignment, &submission, json).await?;
        }
        Commands::Validate => {
            commands::validate(cli.config.as_deref())?;
        }
        Commands::List => {
            commands::list_assignments(cli.config.as_deref())?;
        }
        Commands::Init { path } => {
            commands::init_project(&path).await?;
        }
    }

    Ok(())
}
