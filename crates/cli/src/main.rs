//! Spoti Boost CLI - database migrations and panel maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run panel database migrations
//! spoti-cli migrate
//!
//! # Purge expired payment staging records once
//! spoti-cli purge-payment-bins
//!
//! # Create a reseller account
//! spoti-cli user create -e reseller@example.com -n "Reseller Name"
//!
//! # Inspect or adjust a balance
//! spoti-cli balance show -e reseller@example.com
//! spoti-cli balance credit -e reseller@example.com -a 5000 -r "REFUND:ORDER-991"
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `purge-payment-bins` - Delete staging records past the 24 hour window
//! - `user create` - Create panel accounts
//! - `balance show|credit|debit` - Read the ledger or apply manual adjustments

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::balance::Adjustment;

#[derive(Parser)]
#[command(name = "spoti-cli")]
#[command(author, version, about = "Spoti Boost panel CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run panel database migrations
    Migrate,
    /// Delete expired payment staging records
    PurgePaymentBins,
    /// Manage panel accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Inspect or adjust account balances
    Balance {
        #[command(subcommand)]
        action: BalanceAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new account with a zero balance
    Create {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long, default_value = "")]
        name: String,
    },
}

#[derive(Subcommand)]
enum BalanceAction {
    /// Show balance and recent ledger entries
    Show {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
    /// Add funds to an account
    Credit {
        #[command(flatten)]
        adjustment: AdjustmentArgs,
    },
    /// Take funds from an account
    Debit {
        #[command(flatten)]
        adjustment: AdjustmentArgs,
    },
}

#[derive(clap::Args)]
struct AdjustmentArgs {
    /// Account email address
    #[arg(short, long)]
    email: String,

    /// Amount in TZS
    #[arg(short, long)]
    amount: String,

    /// Ledger reference recorded with the entry
    #[arg(short, long)]
    reference: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::panel().await?,
        Commands::PurgePaymentBins => {
            commands::maintenance::purge_payment_bins().await?;
        }
        Commands::User { action } => match action {
            UserAction::Create { email, name } => {
                commands::balance::create_user(&email, &name).await?;
            }
        },
        Commands::Balance { action } => match action {
            BalanceAction::Show { email } => commands::balance::show(&email).await?,
            BalanceAction::Credit { adjustment } => {
                adjust(Adjustment::Credit, adjustment).await?;
            }
            BalanceAction::Debit { adjustment } => {
                adjust(Adjustment::Debit, adjustment).await?;
            }
        },
    }
    Ok(())
}

async fn adjust(
    direction: Adjustment,
    args: AdjustmentArgs,
) -> Result<(), commands::CommandError> {
    commands::balance::adjust(direction, &args.email, &args.amount, &args.reference).await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_balance_credit() {
        let cli = Cli::try_parse_from([
            "spoti-cli", "balance", "credit", "-e", "a@b.co", "-a", "5000", "-r", "REFUND:1",
        ]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Balance {
                action: BalanceAction::Credit { .. }
            })
        ));
    }

    #[test]
    fn test_parses_purge_payment_bins() {
        let cli = Cli::try_parse_from(["spoti-cli", "purge-payment-bins"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::PurgePaymentBins)
        ));
    }
}
