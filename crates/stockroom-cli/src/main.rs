//! Operator binary for a Stockroom ledger.
//!
//! Every command opens the configured SQLite store and acts as the
//! configured operator.
//!
//! # Usage
//!
//! ```
//! stockroom --config stockroom.toml verify
//! stockroom balance --technician 6f1c…
//! stockroom adjust --technician 6f1c… --article 9a0e… --op add --quantity 12
//! ```

mod settings;

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde::Serialize;
use settings::Settings;
use stockroom_core::{
  stock::{AdjustOperation, AdjustStock, DeclareUsage, MovementQuery},
  store::{AuditStore, DemandStore, LedgerStore, TransferStore},
  transfer::NewTransfer,
};
use stockroom_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Stockroom ledger operator tool")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "stockroom.toml", env = "STOCKROOM_CONFIG")]
  config: PathBuf,

  /// Print results as JSON.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the database and its schema if missing.
  Init,
  /// Re-hash the audit chain and report any break.
  Verify,
  /// Show a technician's balances.
  Balance {
    #[arg(long)]
    technician: Uuid,
  },
  /// List ledger movements in commit order.
  Movements {
    #[arg(long)]
    technician: Option<Uuid>,
    #[arg(long)]
    article:    Option<Uuid>,
    #[arg(long)]
    demand:     Option<Uuid>,
    #[arg(long)]
    limit:      Option<usize>,
  },
  /// Correct a technician's balance.
  Adjust {
    #[arg(long)]
    technician: Uuid,
    #[arg(long)]
    article:    Uuid,
    #[arg(long, value_enum)]
    op:         Op,
    #[arg(long)]
    quantity:   Decimal,
    #[arg(long)]
    reason:     Option<String>,
  },
  /// Record field usage on a technician's behalf.
  Usage {
    #[arg(long)]
    technician:  Uuid,
    #[arg(long)]
    article:     Uuid,
    #[arg(long)]
    quantity:    Decimal,
    #[arg(long)]
    location:    String,
    #[arg(long)]
    notes:       Option<String>,
    #[arg(long)]
    reservation: Option<Uuid>,
  },
  /// Move stock from one technician to another.
  Transfer {
    #[arg(long)]
    from:     Uuid,
    #[arg(long)]
    to:       Uuid,
    #[arg(long)]
    article:  Uuid,
    #[arg(long)]
    quantity: Decimal,
    #[arg(long)]
    notes:    Option<String>,
  },
  /// Issue a handover PIN for a demand that is ready for handover.
  IssuePin {
    #[arg(long)]
    demand: Uuid,
  },
}

#[derive(Clone, Copy, ValueEnum)]
enum Op {
  Add,
  Remove,
  Set,
}

impl From<Op> for AdjustOperation {
  fn from(op: Op) -> Self {
    match op {
      Op::Add => Self::Add,
      Op::Remove => Self::Remove,
      Op::Set => Self::Set,
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store_path = settings.store_path();
  let store = SqliteStore::open(&store_path, settings.policy.clone())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_directory(settings.directory());

  run(cli.command, cli.json, &settings, &store).await
}

async fn run(
  command: Command,
  json: bool,
  settings: &Settings,
  store: &SqliteStore,
) -> anyhow::Result<()> {
  match command {
    Command::Init => {
      tracing::info!(path = ?settings.store_path(), "store ready");
    }

    Command::Verify => {
      let report = store.verify_chain().await.context("failed to verify audit chain")?;
      if json {
        print_json(&report)?;
      } else {
        println!("{} events, {} verified", report.total, report.verified);
        for b in &report.breaks {
          println!("  break at seq {}: {:?}", b.seq, b.kind);
        }
      }
      if !report.is_intact() {
        bail!("audit chain is broken");
      }
    }

    Command::Balance { technician } => {
      let levels = store.list_stock(technician).await.context("failed to list stock")?;
      if json {
        print_json(&levels)?;
      } else {
        for l in &levels {
          println!(
            "{}  balance {:>10}  reserved {:>10}  available {:>10}",
            l.article_id,
            l.balance,
            l.reserved_qty,
            l.available()
          );
        }
      }
    }

    Command::Movements { technician, article, demand, limit } => {
      let query = MovementQuery {
        technician_id: technician,
        article_id: article,
        demand_id: demand,
        limit,
      };
      let movements = store.movements(query).await.context("failed to list movements")?;
      if json {
        print_json(&movements)?;
      } else {
        for m in &movements {
          println!(
            "{}  {}  {:<12} {:>10} -> {:>10}  {}",
            m.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            m.technician_id,
            m.reason.as_str(),
            m.delta,
            m.balance_after,
            m.article_id
          );
        }
      }
    }

    Command::Adjust { technician, article, op, quantity, reason } => {
      let operator = settings.operator()?;
      let input = AdjustStock {
        technician_id: technician,
        article_id: article,
        operation: op.into(),
        quantity,
        reason,
      };
      let outcome = store.adjust_stock(operator, input).await.context("adjustment rejected")?;
      report_outcome(json, &outcome, outcome.balance_after)?;
    }

    Command::Usage { technician, article, quantity, location, notes, reservation } => {
      let operator = settings.operator()?;
      let input = DeclareUsage {
        technician_id: technician,
        article_id: article,
        quantity,
        location_text: location,
        notes,
        reservation_id: reservation,
      };
      let outcome = store.declare_usage(operator, input).await.context("usage rejected")?;
      report_outcome(json, &outcome, outcome.balance_after)?;
    }

    Command::Transfer { from, to, article, quantity, notes } => {
      let operator = settings.operator()?;
      let input = NewTransfer {
        from_technician_id: from,
        to_technician_id: to,
        article_id: article,
        quantity,
        notes,
      };
      let receipt = store.transfer(operator, input).await.context("transfer rejected")?;
      if json {
        print_json(&receipt)?;
      } else {
        println!(
          "transfer {}: source now {}, destination now {}",
          receipt.transfer_id, receipt.issue.balance_after, receipt.receipt.balance_after
        );
      }
    }

    Command::IssuePin { demand } => {
      let operator = settings.operator()?;
      let issued = store
        .issue_handover_pin(operator, demand)
        .await
        .context("failed to issue handover PIN")?;
      if json {
        print_json(&issued)?;
      } else {
        println!("PIN {} (expires {})", issued.pin, issued.expires_at.to_rfc3339());
      }
    }
  }

  Ok(())
}

fn report_outcome<T: Serialize>(json: bool, outcome: &T, balance: Decimal) -> anyhow::Result<()> {
  if json {
    print_json(outcome)
  } else {
    println!("balance now {balance}");
    Ok(())
  }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value).context("failed to encode output")?);
  Ok(())
}
