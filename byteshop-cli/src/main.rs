use std::{fmt, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use byteshop_client::{
    ByteShopClient, ByteShopConfig, PurchaseError, PurchaseRequest, PurchaseResult, PurchaseStage,
    ServerEnvironment, MIN_NUMBER_OF_BYTES,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

/// Exit status when cool bytes need a certificate first.
const EXIT_NOT_COOL_ENOUGH: u8 = 2;

#[derive(Parser)]
#[command(name = "byteshop", about = "Buy storage bytes from a Byte Shop server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request an invoice and pay it with the local wallet.
    Buy(BuyArgs),
    /// List the known Byte Shop servers.
    Servers(ServersArgs),
}

#[derive(Args)]
struct BuyArgs {
    /// Number of bytes to buy (the shop sells at least 10).
    #[arg(long)]
    bytes: u64,
    /// Buy cool bytes (requires a certificate).
    #[arg(long)]
    cool: bool,
    /// Shop URL. Picked from the wallet's network when omitted.
    #[arg(long)]
    server_url: Option<String>,
    /// Description attached to the payment.
    #[arg(long)]
    description: Option<String>,
    /// Local wallet service URL.
    #[arg(long)]
    wallet_url: Option<String>,
    /// Request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ServersArgs {
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "byteshop=info,byteshop_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Buy(args) => buy(args).await,
        Commands::Servers(args) => servers(args).map(|_| ExitCode::SUCCESS),
    }
}

fn load_config(args: &BuyArgs) -> Result<ByteShopConfig> {
    let mut config = ByteShopConfig::from_env().context("invalid BYTESHOP_* environment")?;
    if let Some(url) = &args.server_url {
        config = config.with_server_url(url).context("invalid --server-url")?;
    }
    if let Some(url) = &args.wallet_url {
        config = config.with_wallet_url(url).context("invalid --wallet-url")?;
    }
    if let Some(description) = &args.description {
        config = config.with_description(description.clone());
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs.max(1)));
    }
    Ok(config)
}

async fn buy(args: BuyArgs) -> Result<ExitCode> {
    if args.bytes > 0 && args.bytes < MIN_NUMBER_OF_BYTES {
        info!(
            bytes = args.bytes,
            minimum = MIN_NUMBER_OF_BYTES,
            "byte count below the shop minimum, the server will refuse it"
        );
    }

    let config = load_config(&args)?;
    let client = ByteShopClient::connect(config).context("failed to set up the purchase client")?;

    let (stages, mut progress) = watch::channel(PurchaseStage::Idle);
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let stage = progress.borrow_and_update().clone();
            if stage.is_loading() {
                info!(stage = %stage, "waiting on shop or wallet");
            } else {
                info!(stage = %stage, "purchase progress");
            }
        }
    });

    let outcome = client
        .purchase_with_progress(PurchaseRequest::new(args.bytes, args.cool), &stages)
        .await;
    drop(stages);
    let _ = reporter.await;

    match outcome {
        Ok(result) => {
            output(&Receipt::from(result), args.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_not_cool_enough() => {
            output(&Failure::from(&err), args.json)?;
            Ok(ExitCode::from(EXIT_NOT_COOL_ENOUGH))
        }
        Err(err) if args.json => {
            output(&Failure::from(&err), true)?;
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err).context("purchase failed"),
    }
}

fn servers(args: ServersArgs) -> Result<()> {
    let list = ServerList(
        ServerEnvironment::ALL
            .iter()
            .map(|env| ServerEntry {
                name: env.name(),
                url: env.url(),
            })
            .collect(),
    );
    output(&list, args.json)
}

fn output<T>(summary: &T, json: bool) -> Result<()>
where
    T: Serialize + fmt::Display,
{
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print!("{}", summary);
    }
    Ok(())
}

#[derive(Serialize)]
struct Receipt {
    status: &'static str,
    bytes: String,
    note: String,
}

impl From<PurchaseResult> for Receipt {
    fn from(result: PurchaseResult) -> Self {
        Self {
            status: "success",
            bytes: result.bytes,
            note: result.note,
        }
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Purchase complete")?;
        writeln!(f, "bytes: {}", self.bytes)?;
        if !self.note.is_empty() {
            writeln!(f, "note: {}", self.note)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Failure {
    status: &'static str,
    code: String,
    description: String,
    #[serde(rename = "coolcertURL", skip_serializing_if = "Option::is_none")]
    certificate_url: Option<String>,
}

impl From<&PurchaseError> for Failure {
    fn from(err: &PurchaseError) -> Self {
        Self {
            status: "error",
            code: err.code().to_string(),
            description: err.to_string(),
            certificate_url: err.certificate_url().map(str::to_string),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.certificate_url {
            Some(url) => {
                writeln!(f, "You need a certificate to buy cool bytes.")?;
                writeln!(f, "Get one at {}, then try again.", url)
            }
            None => writeln!(f, "{} ({})", self.description, self.code),
        }
    }
}

#[derive(Serialize)]
struct ServerEntry {
    name: &'static str,
    url: &'static str,
}

#[derive(Serialize)]
#[serde(transparent)]
struct ServerList(Vec<ServerEntry>);

impl fmt::Display for ServerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.0 {
            writeln!(f, "{:<12} {}", entry.name, entry.url)?;
        }
        Ok(())
    }
}
