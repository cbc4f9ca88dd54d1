use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tally", about = "Tally attendance daemon CLI")]
struct Cli {
    /// Base URL of the tallyd HTTP API.
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    api: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Show recently accepted attendance events
    Recent,
    /// Download the attendance log as CSV
    Export {
        /// Output file
        #[arg(short, long, default_value = "attendance_log.csv")]
        output: PathBuf,
    },
    /// List enrolled identities
    List,
    /// Enroll or update an identity
    Enroll {
        /// Stable identity id (e.g., an employee code)
        #[arg(long)]
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// JSON file containing the encoding as an array of floats
        #[arg(long)]
        encoding_file: PathBuf,
    },
    /// Remove an enrolled identity
    Remove {
        /// Identity id to remove
        id: String,
    },
    /// Reload identity encodings from the store
    Reload,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let api = cli.api.trim_end_matches('/');

    match cli.command {
        Commands::Status => {
            print_json(get(&client, &format!("{api}/api/health")).await?)?;
        }
        Commands::Recent => {
            print_json(get(&client, &format!("{api}/api/attendance/recent")).await?)?;
        }
        Commands::Export { output } => {
            let bytes = client
                .get(format!("{api}/api/attendance/export"))
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("wrote {}", output.display());
        }
        Commands::List => {
            print_json(get(&client, &format!("{api}/api/employees")).await?)?;
        }
        Commands::Enroll {
            id,
            name,
            encoding_file,
        } => {
            let raw = std::fs::read_to_string(&encoding_file)
                .with_context(|| format!("reading {}", encoding_file.display()))?;
            let encoding: Vec<f32> = serde_json::from_str(&raw)
                .context("encoding file must be a JSON array of numbers")?;
            let body = serde_json::json!({
                "id": id,
                "display_name": name,
                "encoding": encoding,
            });
            let response: serde_json::Value = client
                .post(format!("{api}/api/employees"))
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            print_json(response)?;
        }
        Commands::Remove { id } => {
            let response: serde_json::Value = client
                .delete(format!("{api}/api/employees/{id}"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            print_json(response)?;
        }
        Commands::Reload => {
            let response: serde_json::Value = client
                .post(format!("{api}/api/employees/reload"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            print_json(response)?;
        }
    }

    Ok(())
}

async fn get(client: &reqwest::Client, url: &str) -> Result<serde_json::Value> {
    Ok(client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?)
}

fn print_json(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
