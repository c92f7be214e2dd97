//! interview-judge daemon
//!
//! Serves the judge as an MCP tool over stdio, or judges a single submission
//! JSON and prints the verdict.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use interview_judge::{mcp, Judge, JudgeConfig, Submission};

#[derive(Parser, Debug)]
#[command(name = "judge-daemon")]
#[command(about = "Judge coding-interview submissions against their test cases")]
struct Args {
    /// Run in stdio mode (for MCP clients)
    #[arg(long, conflicts_with = "submission")]
    stdio: bool,

    /// Judge one submission JSON file ("-" for stdin) and print the verdict
    #[arg(long, value_name = "FILE")]
    submission: Option<PathBuf>,

    /// Points the question is worth, used for the printed score
    #[arg(long, requires = "submission")]
    points: Option<f64>,

    /// JSON config file (defaults to JUDGE_CONFIG or built-in defaults)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr so stdout is free for MCP protocol)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => JudgeConfig::from_file(path),
        None => JudgeConfig::from_env(),
    }
    .context("Failed to load configuration")?;

    info!(
        test_timeout_ms = config.sandbox.test_timeout_ms,
        process_timeout_ms = config.process.timeout_ms,
        python = %config.process.python,
        "Loaded configuration"
    );

    let judge = Judge::new(config);

    if args.stdio {
        mcp::serve_stdio(judge).await?;
    } else if let Some(path) = &args.submission {
        let submission = read_submission(path)?;
        let verdict = judge.judge(&submission).await;
        let summary = verdict.summary(submission.test_cases.len(), args.points);

        let mut report = serde_json::to_value(&verdict).context("Failed to encode verdict")?;
        report["summary"] = json!(summary);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        anyhow::bail!("Pass --stdio or --submission <FILE>");
    }

    Ok(())
}

fn read_submission(path: &Path) -> Result<Submission> {
    let json = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read submission from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read submission {}", path.display()))?
    };
    serde_json::from_str(&json).context("Failed to parse submission JSON")
}
