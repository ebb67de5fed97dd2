//! cgate
//!
//! Command line access to the C'Gate gateway: generate payment references,
//! query and refund transactions, and print USSD dial strings.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use anyhow::{Context, Result};
use cgate_client::{BankDirectory, CoralPayClient};
use cgate_config::AppConfig;
use cgate_logging::init_console_logging;
use cgate_types::{InvokeReferenceRequest, RefundPaymentRequest, StatusQueryRequest};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cgate", version, about = "C'Gate payment gateway client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a payment reference
    Invoke {
        #[arg(long)]
        channel: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        trace_id: Option<String>,
        #[arg(long)]
        transaction_type: Option<String>,
        #[arg(long)]
        sub_merchant_name: Option<String>,
        #[arg(long)]
        terminal_id: Option<String>,
    },
    /// Query the status of a transaction
    Status {
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        transaction_id: String,
        #[arg(long)]
        terminal_id: Option<String>,
    },
    /// Refund a payment
    Refund {
        #[arg(long)]
        reference: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        transaction_id: String,
        #[arg(long)]
        terminal_id: Option<String>,
    },
    /// List banks that support USSD payment
    Banks,
    /// Print the USSD dial string for a bank and reference
    Ussd { bank: String, reference: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn connect() -> Result<CoralPayClient> {
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    init_console_logging("cgate", config.log_level());
    info!(env = ?config.env, base_url = %config.base_url, "Configuration loaded");
    CoralPayClient::from_app_config(&config).context("Failed to create gateway client")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Invoke {
            channel,
            amount,
            trace_id,
            transaction_type,
            sub_merchant_name,
            terminal_id,
        } => {
            let client = connect()?;
            let response = client
                .invoke_reference(InvokeReferenceRequest {
                    channel,
                    amount,
                    trace_id,
                    transaction_type,
                    sub_merchant_name,
                    terminal_id,
                })
                .await
                .context("Invoke reference failed")?;
            print_json(&response)?;
        }
        Command::Status {
            amount,
            transaction_id,
            terminal_id,
        } => {
            let client = connect()?;
            let response = client
                .query_transaction(StatusQueryRequest {
                    amount,
                    transaction_id,
                    terminal_id,
                })
                .await
                .context("Status query failed")?;
            print_json(&response)?;
        }
        Command::Refund {
            reference,
            amount,
            transaction_id,
            terminal_id,
        } => {
            let client = connect()?;
            let response = client
                .refund_payment(RefundPaymentRequest {
                    reference,
                    amount,
                    transaction_id,
                    terminal_id,
                })
                .await
                .context("Refund failed")?;
            print_json(&response)?;
        }
        Command::Banks => {
            init_console_logging("cgate", "warn");
            print_json(&BankDirectory::new().list())?;
        }
        Command::Ussd { bank, reference } => {
            init_console_logging("cgate", "warn");
            let dial = BankDirectory::new()
                .interpolate(&bank, &reference)
                .context("Cannot build USSD string")?;
            println!("{}", dial);
        }
    }

    Ok(())
}
