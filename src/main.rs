//! `sipay` command line entrypoint.
//!
//! Runs one gateway operation and prints the resulting JSON body to stdout.
//!
//! Exit status:
//! - `0` - the operation completed;
//! - `2` - `/auth` did not grant an id, the printed body is its answer;
//! - `1` - configuration, transport or gateway error.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `SIPAY_CONFIG` selects the config file (default `sipay.json`)
//! - `RUST_LOG` controls log verbosity (logs go to stderr)

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::process::ExitCode;

use sipay_rs::config::SipayConfig;
use sipay_rs::error::SipayError;
use sipay_rs::request::Params;
use sipay_rs::sipay::{
    Cancelation, CardLookup, DeleteCard, Outcome, Payment, Refund, RefundById, StoreCard,
    TokenizationPayment, TokenizationRefund,
};
use sipay_rs::util::Telemetry;

#[derive(Parser, Debug)]
#[command(name = "sipay")]
#[command(about = "Sipay ecommerce gateway client", version)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "SIPAY_CONFIG", default_value = "sipay.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a card in the gateway vault
    StoreCard(StoreCard),
    /// Look up a stored card with a previously granted idstorage
    Card(CardLookup),
    /// Remove a stored card
    DeleteCard(DeleteCard),
    /// Charge a stored card
    TokenizationPayment(TokenizationPayment),
    /// Refund a charge made on a stored card
    TokenizationRefund(TokenizationRefund),
    /// Charge a card that is not stored
    Payment(Payment),
    /// Refund a charge made on a card that is not stored
    Refund(Refund),
    /// Refund an earlier transaction by its id
    RefundById(RefundById),
    /// Cancel an earlier transaction
    Cancelation(Cancelation),
}

async fn run(cli: Cli) -> Result<Outcome, SipayError> {
    let config = SipayConfig::load_from_path(&cli.config)?;
    let sipay = config.sipay()?;
    tracing::info!(
        environment = %config.environment(),
        config = %cli.config.display(),
        "Sipay client ready"
    );

    match cli.command {
        Command::StoreCard(args) => sipay.store_card(args).await,
        Command::Card(args) => sipay.card(args).await.map(Outcome::Completed),
        Command::DeleteCard(args) => sipay.delete_card(args).await,
        Command::TokenizationPayment(args) => sipay.tokenization_payment(args).await,
        Command::TokenizationRefund(args) => sipay.tokenization_refund(args).await,
        Command::Payment(args) => sipay.payment(args).await,
        Command::Refund(args) => sipay.refund(args).await,
        Command::RefundById(args) => sipay.refund_by_id(args).await,
        Command::Cancelation(args) => sipay.cancelation(args).await,
    }
}

fn print_body(body: &Params) {
    match serde_json::to_string_pretty(body) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::error!(error = %err, "Failed to serialize response body"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env variables
    dotenv().ok();

    let _telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(outcome) => {
            print_body(outcome.body());
            if outcome.is_completed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(SipayError::Response(err)) => {
            tracing::error!(kind = %err.kind(), code = err.code(), "{err}");
            print_body(err.response_data());
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
