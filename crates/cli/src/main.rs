//! Portability CLI - Command-line interface for the Portability Transfer Engine

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";

#[derive(Parser)]
#[command(name = "portability")]
#[command(about = "Portability Transfer Engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "PORTABILITY_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a transfer job
    Create {
        /// Service to export from (e.g. flickr)
        #[arg(short, long)]
        export: String,

        /// Service to import into (e.g. smugmug)
        #[arg(short, long)]
        import: String,

        /// Data type (PHOTOS, VIDEOS, CALENDAR, ...)
        #[arg(short = 't', long, default_value = "PHOTOS")]
        data_type: String,
    },

    /// Start authorization for one side of a job
    Auth {
        /// Job ID
        job_id: String,

        #[arg(value_enum)]
        mode: Mode,
    },

    /// Show job status
    Status {
        /// Job ID
        job_id: String,
    },

    /// Cancel a job
    Cancel {
        /// Job ID
        job_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Export,
    Import,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Export => "EXPORT",
            Mode::Import => "IMPORT",
        }
    }
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct CreateResult {
    job_id: String,
    state: String,
    encoded_job_id: String,
}

#[derive(Deserialize, Tabled)]
struct StatusResult {
    job_id: String,
    export_service: String,
    import_service: String,
    data_type: String,
    state: String,
    bytes_transferred: i64,
    #[tabled(display_with = "display_reason")]
    failure_reason: Option<String>,
}

fn display_reason(reason: &Option<String>) -> String {
    reason.clone().unwrap_or_else(|| "-".to_string())
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Create {
            export,
            import,
            data_type,
        } => {
            let params = json!({
                "export_service": export,
                "import_service": import,
                "data_type": data_type,
            });

            let result = call_rpc(&cli.rpc_url, "transfer.create.v1", params).await?;
            let created: CreateResult = serde_json::from_value(result)?;

            println!("{}", "✓ Job created".green().bold());
            println!();
            println!("{}", Table::new(vec![created]));
        }

        Commands::Auth { job_id, mode } => {
            let params = json!({
                "job_id": job_id,
                "mode": mode.as_str(),
            });

            let result = call_rpc(&cli.rpc_url, "auth.initiate.v1", params).await?;

            println!(
                "{}",
                format!("✓ {} authorization started", mode.as_str()).green().bold()
            );
            println!("  {} {}", "State:".bold(), result["state"].as_str().unwrap_or("-"));
            println!("  {} {}", "Open in a browser:".bold(), result["auth_url"].as_str().unwrap_or("-"));
        }

        Commands::Status { job_id } => {
            let result = call_rpc(&cli.rpc_url, "job.get.v1", json!({ "job_id": job_id })).await?;
            let status: StatusResult = serde_json::from_value(result)?;

            let state = match status.state.as_str() {
                "COMPLETE" => status.state.green(),
                "ERROR" => status.state.red(),
                _ => status.state.yellow(),
            };
            println!("{} {}", "Job".cyan().bold(), state.bold());
            println!();
            println!("{}", Table::new(vec![status]));
        }

        Commands::Cancel { job_id } => {
            let result = call_rpc(&cli.rpc_url, "job.cancel.v1", json!({ "job_id": job_id })).await?;

            println!("{}", format!("✓ Cancellation requested for {}", job_id).green().bold());
            println!("  {} {}", "State:".bold(), result["state"].as_str().unwrap_or("-"));
        }
    }

    Ok(())
}
