use clap::{Parser, Subcommand};
use serde_json::Value;

use upstream_mediator::security::identity::{normalize_identity, CallerKey};

#[derive(Parser)]
#[command(name = "mediator-cli")]
#[command(about = "Operator CLI for the upstream mediator", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show breaker state and in-flight executions
    Health,
    /// Print the store keys derived for a caller identity
    Key {
        identity: String,

        #[arg(long, default_value = "mediator")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Health => {
            let res = reqwest::Client::new()
                .get(format!("{}/health", cli.url))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Key { identity, prefix } => {
            let key = CallerKey::from_identity(&identity);
            println!("normalized: {}", normalize_identity(&identity));
            println!("digest:     {}", key.digest());
            println!("cache key:  {}", key.scoped(&prefix, "cache"));
            println!("rate key:   {}", key.scoped(&prefix, "rate"));
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: mediator returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
