use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "tierwatch-cli")]
#[command(about = "Operator CLI for the tierwatch admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081", env = "TIERWATCH_URL")]
    url: String,

    #[arg(short, long, env = "TIERWATCH_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Overall status
    Status,
    /// Quorum and rotation per tier
    Tiers,
    /// All members with health and role
    Members,
    /// Recent health transitions
    Events,
    /// Recent alerts
    Alerts,
    /// Pending incidents
    Incidents {
        /// Include resolved incidents
        #[arg(long)]
        all: bool,
    },
    /// Acknowledge an incident
    Ack { id: String },
    /// Resolve an incident
    Resolve {
        id: String,
        #[arg(short, long)]
        note: Option<String>,
    },
    /// Restart a web or app member and re-probe it
    Restart { member: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Tiers => client.get(format!("{}/admin/tiers", base)),
        Commands::Members => client.get(format!("{}/admin/members", base)),
        Commands::Events => client.get(format!("{}/admin/events", base)),
        Commands::Alerts => client.get(format!("{}/admin/alerts", base)),
        Commands::Incidents { all } => client
            .get(format!("{}/admin/incidents", base))
            .query(&[("all", all)]),
        Commands::Ack { id } => client.post(format!("{}/admin/incidents/{}/ack", base, id)),
        Commands::Resolve { id, note } => client
            .post(format!("{}/admin/incidents/{}/resolve", base, id))
            .json(&serde_json::json!({ "note": note })),
        Commands::Restart { member } => client.post(format!("{}/admin/members/{}/restart", base, member)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
