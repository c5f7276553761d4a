//! reminder-relay - Command line entry point for the reminder relay

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

use reminder_relay::config::Settings;
use reminder_relay::App;

#[derive(Debug, Parser)]
#[command(name = "reminder-relay", version, about = "Deliver medication reminders over Gmail")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one reminder and print the response.
    Send(SendArgs),
    /// Show whether Gmail delivery is ready.
    Status,
    /// Show recent dispatch outcomes.
    History {
        /// Number of outcomes to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Debug, clap::Args)]
struct SendArgs {
    /// Recipient address; the configured fallback is used when omitted.
    #[arg(long)]
    to: Option<String>,
    #[arg(long)]
    subject: Option<String>,
    /// Message body, plain text or HTML.
    #[arg(long)]
    body: Option<String>,
    /// Medication name for the reminder template.
    #[arg(long)]
    item: Option<String>,
    #[arg(long)]
    time: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    dosage: Option<String>,
    /// Name shown as the sender in the message footer.
    #[arg(long)]
    contact_name: Option<String>,
}

impl SendArgs {
    fn into_payload(self) -> Value {
        let fields = [
            ("recipient", self.to),
            ("subject", self.subject),
            ("body", self.body),
            ("item", self.item),
            ("time", self.time),
            ("status", self.status),
            ("dosage", self.dosage),
            ("contact_name", self.contact_name),
        ];
        let payload: Map<String, Value> = fields
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key.to_string(), json!(v))))
            .collect();
        Value::Object(payload)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;
    let app = App::from_settings(&settings).context("failed to start reminder relay")?;

    let output = match cli.command {
        Command::Send(args) => {
            let response = app.send_reminder(args.into_payload()).await?;
            serde_json::to_string_pretty(&response)?
        }
        Command::Status => serde_json::to_string_pretty(&app.gmail_status().await)?,
        Command::History { limit } => {
            serde_json::to_string_pretty(&app.recent_outcomes(limit).await?)?
        }
    };
    println!("{output}");
    Ok(())
}
