use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use umami_tracker::config::Config;
use umami_tracker::head;
use umami_tracker::tracking::{DownloadRequest, DownloadTracker, TrackingOutcome};

#[derive(Parser)]
#[command(name = "umami-tracker-admin")]
#[command(about = "Umami download tracker admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the head markup injected into HTML pages
    ScriptTag,
    /// Log in to the analytics collector and verify the token
    Login,
    /// Send a download event for a path, as the middleware would
    Track {
        /// Request path, e.g. /dataset/d1/resource/r1/download/file.csv
        path: String,
        /// Host header to report when no hostname is configured
        #[arg(long)]
        host: Option<String>,
        /// User-Agent forwarded to the collector
        #[arg(long)]
        user_agent: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid analytics configuration")?;

    match cli.command {
        Commands::ScriptTag => {
            println!("{}", head::head_end(&config.analytics));
        }
        Commands::Login => {
            let tracker = DownloadTracker::from_config(&config.analytics)?;
            let tokens = tracker.tokens();
            if !tokens.has_credentials() {
                bail!("CKAN_UMAMI_ANALYTICS_USERNAME and CKAN_UMAMI_ANALYTICS_PASSWORD are not set");
            }

            let token = tokens
                .ensure_valid_token()
                .await
                .context("login to analytics collector failed")?;
            let valid = tokens
                .is_token_valid(&token)
                .await
                .context("token verification request failed")?;

            if !valid {
                bail!("collector issued a token that it does not accept");
            }
            println!("✅ Logged in to {}", config.analytics.base_url);
        }
        Commands::Track {
            path,
            host,
            user_agent,
        } => {
            let tracker = DownloadTracker::from_config(&config.analytics)?;
            let request = DownloadRequest {
                path,
                host,
                user_agent,
            };

            match tracker.handle_request(&request).await {
                TrackingOutcome::Sent => println!("✅ Download event sent"),
                TrackingOutcome::NotApplicable => {
                    println!("ℹ️  '{}' is not a resource download path", request.path);
                }
                TrackingOutcome::Failed => bail!("download event was not delivered (see log)"),
            }
        }
    }

    Ok(())
}
