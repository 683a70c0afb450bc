//! Nightly maintenance jobs, run against the same database as the API.
//!
//!   maintenance update-delayed
//!   maintenance recalculate-doses [--treatment-id ID] [--product-id ID] [--field-id ID] [--dry-run]
//!   maintenance recalculate-costs [--product-id ID] [--dry-run]

use agroplan_api::config::Config;
use agroplan_api::treatments::services::{
    MaintenanceFilter, MaintenanceReport, promote_delayed, recalculate_costs, recalculate_doses,
};
use clap::{Parser, Subcommand};
use console::style;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "maintenance", about = "Farm data maintenance jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mark pending treatments whose scheduled date has passed as delayed
    UpdateDelayed,
    /// Re-derive line-item quantities and prices from their stored doses
    RecalculateDoses {
        #[arg(long)]
        treatment_id: Option<Uuid>,
        #[arg(long)]
        product_id: Option<Uuid>,
        #[arg(long)]
        field_id: Option<Uuid>,
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-sync line-item unit prices to the product catalog
    RecalculateCosts {
        #[arg(long)]
        product_id: Option<Uuid>,
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

fn print_report(job: &str, report: &MaintenanceReport, dry_run: bool) {
    let prefix = if dry_run { "[dry run] " } else { "" };
    println!(
        "{}{}: {} updated, {} unchanged, {} errors",
        prefix,
        style(job).bold(),
        style(report.updated).green(),
        report.unchanged,
        if report.errors > 0 {
            style(report.errors).red()
        } else {
            style(report.errors)
        }
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = Config::from_env();
    let db_url = config
        .db_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("DB_URL is not configured"))?;
    let db = Database::connect(db_url).await?;
    Migrator::up(&db, None).await?;

    match cli.command {
        Command::UpdateDelayed => {
            let report = promote_delayed(&db).await?;
            print_report("update-delayed", &report, false);
        }
        Command::RecalculateDoses {
            treatment_id,
            product_id,
            field_id,
            dry_run,
        } => {
            let filter = MaintenanceFilter {
                treatment_id,
                product_id,
                field_id,
            };
            let report = recalculate_doses(&db, &filter, dry_run).await?;
            print_report("recalculate-doses", &report, dry_run);
        }
        Command::RecalculateCosts {
            product_id,
            dry_run,
        } => {
            let report = recalculate_costs(&db, product_id, dry_run).await?;
            print_report("recalculate-costs", &report, dry_run);
        }
    }

    Ok(())
}
