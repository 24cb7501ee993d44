use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "perimeter-cli")]
#[command(about = "Management CLI for the storefront perimeter", long_about = None)]
struct Cli {
    #[arg(short, long, env = "PERIMETER_ADMIN_URL", default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "PERIMETER_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check perimeter status
    Status,
    /// Show store sizes
    Stats,
    /// List blocked addresses
    Blocked,
    /// Release every blocked address now
    Amnesty,
    /// Drop one rate limit window, e.g. "login:1.2.3.4"
    ClearRateLimit { identifier: String },
    /// Show recent audit events
    Audit {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path) = match &cli.command {
        Commands::Status => (Method::GET, "/admin/status".to_string()),
        Commands::Stats => (Method::GET, "/admin/stats".to_string()),
        Commands::Blocked => (Method::GET, "/admin/blocked".to_string()),
        Commands::Amnesty => (Method::POST, "/admin/amnesty".to_string()),
        Commands::ClearRateLimit { identifier } => {
            (Method::DELETE, format!("/admin/rate-limits/{}", identifier))
        }
        Commands::Audit { limit } => (Method::GET, format!("/admin/audit?limit={}", limit)),
    };

    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
