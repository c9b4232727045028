use anyhow::Context;
use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use gerrit_leaderboard::leaderboard::{self, DEFAULT_TIME_PERIOD, PROJECT_ALL};
use gerrit_leaderboard::serve::Dashboard;
use gerrit_leaderboard::{load, sync, Config, Database};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gerrit-leaderboard")]
#[command(author, version, about = "Gerrit review leaderboard: who reviews the most merged changes")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: nearest .leaderboard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the web dashboard
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Don't sync with Gerrit on page loads
        #[arg(long)]
        no_sync: bool,
    },

    /// Pull newly merged changes from Gerrit
    Sync,

    /// Print the leaderboard
    Show {
        /// Project name, or "all"
        #[arg(long, default_value = PROJECT_ALL)]
        project: String,

        /// Time period: "1 Week", "1 Month", "3 Months" or "6 Months"
        #[arg(long, default_value = DEFAULT_TIME_PERIOD)]
        period: String,

        /// Use stored data only
        #[arg(long)]
        no_sync: bool,
    },

    /// Print open changes per reviewer for each project
    Load,

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Completion { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "gerrit-leaderboard", &mut std::io::stdout());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading configuration")?;

    match cli.command {
        Command::Serve { host, port, no_sync } => {
            let db = open_db()?;
            let dashboard = Dashboard::new(db, config);
            let dashboard = if no_sync { dashboard.without_sync() } else { dashboard };
            dashboard
                .serve(&host, port)
                .with_context(|| format!("serving on {}:{}", host, port))?;
        }

        Command::Sync => {
            let db = open_db()?;
            let summary = sync::pull_and_store_changes(&db, &config.fetch)?;
            println!(
                "{} {} new of {} fetched in {} page(s), window from {}",
                "Synced:".green().bold(),
                summary.stored,
                summary.fetched,
                summary.pages,
                summary.window_start.format("%Y-%m-%d")
            );
        }

        Command::Show { project, period, no_sync } => {
            let db = open_db()?;
            if !no_sync {
                sync::pull_and_store_changes(&db, &config.fetch)?;
            }
            let board = leaderboard::build(&db, &project, &period, Utc::now())?;

            println!(
                "{}  project: {}  period: {}  since {}",
                "Review Leaderboard".bold(),
                board.project.cyan(),
                board.time_period.cyan(),
                board.window_start.format("%Y-%m-%d")
            );
            if board.reviewers.is_empty() {
                println!("{}", "No reviews in this period".dimmed());
            } else {
                println!("{}", format!("{:>3}  {:<32} {:>8} {:>9}", "#", "Reviewer", "Reviews", "Comments").dimmed());
                for (i, r) in board.reviewers.iter().enumerate() {
                    println!("{:>3}  {:<32} {:>8} {:>9}", i + 1, r.name, r.review_count, r.comment_count);
                }
            }
        }

        Command::Load => {
            let load = load::fetch_open_load(&config.fetch);
            if load.is_empty() {
                println!("{}", "No open changes with reviewers".dimmed());
            }
            for (project, reviewers) in &load {
                println!("{}", project.bold());
                let mut reviewers: Vec<_> = reviewers.iter().collect();
                reviewers.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
                for (name, count) in reviewers {
                    println!("  {:<32} {:>4}", name, count);
                }
            }
        }

        Command::Completion { .. } => {}
    }

    Ok(())
}

fn open_db() -> anyhow::Result<Database> {
    let path = Database::db_path();
    Database::open().with_context(|| format!("opening database {}", path.display()))
}
