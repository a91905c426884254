use crate::config::AppConfig;
use allotter::{
    Allocation, AllocationOutcome, Candidate, Identity, IdentityStatus, ImportSummary, PoolKey,
    Service, SheetImport, StatsReport, UnlockReport,
};
use anyhow::{Context, bail};
use clap::Subcommand;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Claim the remaining allowance of an identity in a pool.
    Allocate {
        pool: PoolKey,
        identity: Identity,
        /// Free-text label stored next to each claimed record.
        #[arg(long, default_value = "")]
        label: String,
    },

    /// Import values from a text file (one per line) or an xlsx workbook.
    ///
    /// A workbook contributes the first column of its first sheet, or with
    /// `--all-sheets` every sheet whose name maps to a pool.
    Import {
        #[arg(long, required_unless_present = "all_sheets", conflicts_with = "all_sheets")]
        pool: Option<PoolKey>,
        #[arg(long)]
        all_sheets: bool,
        file: PathBuf,
    },

    /// Write pools to an xlsx workbook: every record of every pool, or only
    /// the values claimed by one identity.
    Export {
        #[arg(long)]
        identity: Option<Identity>,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Free and claimed counts per pool.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Inspect or change the status of an identity.
    Status {
        #[command(subcommand)]
        action: StatusCommand,
    },

    /// Register an identity as pending approval.
    RequestAccess { identity: Identity },

    /// Lift the ban of an identity.
    Unban { identity: Identity },

    /// Inspect or change extra allowances.
    Limit {
        #[command(subcommand)]
        action: LimitCommand,
    },

    /// Grant another base-limit batch in every pool the identity exhausted.
    Unlock { identity: Identity },

    /// Delete every record of every pool.
    Clear {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Manage the manager roster.
    Manager {
        #[command(subcommand)]
        action: ManagerCommand,
    },

    /// Count distinct visitors, optionally recording one first.
    Visits { identity: Option<Identity> },
}

#[derive(Subcommand, Debug, Clone)]
pub enum StatusCommand {
    Get { identity: Identity },
    Set {
        identity: Identity,
        status: IdentityStatus,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum LimitCommand {
    Get { identity: Identity, pool: PoolKey },
    Set {
        identity: Identity,
        pool: PoolKey,
        value: u64,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ManagerCommand {
    /// Add an identity. The first manager can be added without `--actor`.
    Add { identity: Identity },
    List,
}

pub async fn run(config: &AppConfig, service: &Service) -> anyhow::Result<()> {
    match &config.command {
        Command::Allocate {
            pool,
            identity,
            label,
        } => {
            let allocation = service.allocate(pool, *identity, label).await?;
            print_allocation(&allocation);
        }
        Command::Import {
            pool,
            all_sheets,
            file,
        } => {
            let actor = config.actor()?;
            if *all_sheets {
                let bytes = read_xlsx(file)?;
                for result in service.import_all_xlsx(actor, bytes).await? {
                    print_sheet_import(&result);
                }
            } else if let Some(pool) = pool {
                let summary = if is_xlsx(file) {
                    service.import_xlsx(actor, pool, read_xlsx(file)?).await?
                } else {
                    service.import(actor, pool, read_lines(file)?).await?
                };
                print_import(&summary);
            }
        }
        Command::Export { identity, output } => {
            let actor = config.actor()?;
            let workbook = match identity {
                Some(identity) => {
                    let export = service.export_for_identity(actor, *identity).await?;
                    for (pool, count) in &export.counts {
                        println!("{pool}: {count}");
                    }
                    println!("total: {}", export.total());
                    export.workbook
                }
                None => service.export_all(actor).await?,
            };
            fs::write(output, workbook.to_xlsx()?)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("written to {}", output.display());
        }
        Command::Stats { json } => {
            let stats = service.get_stats().await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }
        Command::Status { action } => match action {
            StatusCommand::Get { identity } => match service.get_status(*identity).await? {
                Some(status) => println!("{identity}: {status}"),
                None => println!("{identity}: unknown"),
            },
            StatusCommand::Set { identity, status } => {
                service
                    .set_status(config.actor()?, *identity, *status)
                    .await?;
                println!("{identity}: {status}");
            }
        },
        Command::RequestAccess { identity } => {
            let status = service.request_access(*identity).await?;
            println!("{identity}: {status}");
        }
        Command::Unban { identity } => {
            if service.unban(config.actor()?, *identity).await? {
                println!("{identity}: approved");
            } else {
                println!("{identity} is not banned");
            }
        }
        Command::Limit { action } => match action {
            LimitCommand::Get { identity, pool } => {
                let (extra, total) = service.allowance(*identity, pool).await?;
                println!("{identity} in {pool}: extra {extra}, allowance {total}");
            }
            LimitCommand::Set {
                identity,
                pool,
                value,
            } => {
                service
                    .set_extra_limit(config.actor()?, *identity, pool, *value)
                    .await?;
                println!("{identity} in {pool}: extra {value}");
            }
        },
        Command::Unlock { identity } => {
            let report = service.unlock(config.actor()?, *identity).await?;
            print_unlock(*identity, &report);
        }
        Command::Clear { yes } => {
            if !*yes {
                bail!("refusing to delete every record without --yes");
            }
            let removed = service.clear_all_pools(config.actor()?).await?;
            println!("removed {removed} records");
        }
        Command::Manager { action } => match action {
            ManagerCommand::Add { identity } => {
                // without --actor only the very first manager can be added
                let actor = config.actor.unwrap_or(*identity);
                if service.add_manager(actor, *identity).await? {
                    println!("{identity} is now a manager");
                } else {
                    println!("{identity} already is a manager");
                }
            }
            ManagerCommand::List => {
                for manager in service.managers().await? {
                    println!("{manager}");
                }
            }
        },
        Command::Visits { identity } => {
            if let Some(identity) = identity {
                if service.record_visit(*identity).await? {
                    println!("first visit of {identity}");
                }
            }
            println!("{} distinct visitors", service.visitor_count().await?);
        }
    }
    Ok(())
}

fn is_xlsx(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"))
}

fn read_xlsx(path: &Path) -> anyhow::Result<Vec<u8>> {
    if !is_xlsx(path) {
        bail!("{} is not an .xlsx workbook", path.display());
    }
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_lines(path: &Path) -> anyhow::Result<Vec<Candidate>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(text.lines().map(Candidate::from).collect())
}

fn print_allocation(allocation: &Allocation) {
    match allocation.outcome {
        AllocationOutcome::Granted => {
            for value in &allocation.values {
                println!("{value}");
            }
            eprintln!(
                "granted {} from {} ({} of {} left)",
                allocation.values.len(),
                allocation.pool,
                allocation.free,
                allocation.total
            );
            if allocation.low_stock() {
                eprintln!("warning: {} is running low", allocation.pool);
            }
        }
        AllocationOutcome::QuotaExhausted => eprintln!(
            "quota exhausted in {}: holding {} of {}",
            allocation.pool, allocation.held, allocation.allowance
        ),
        AllocationOutcome::InsufficientSupply => eprintln!(
            "not enough free records in {}: {} free",
            allocation.pool, allocation.free
        ),
    }
}

fn print_import(summary: &ImportSummary) {
    println!(
        "{}: added {}, skipped {}",
        summary.pool,
        summary.added,
        summary.skipped()
    );
}

fn print_sheet_import(result: &SheetImport) {
    match result {
        SheetImport::Imported(summary) => print_import(summary),
        SheetImport::Empty { sheet } => println!("{sheet}: no values"),
        SheetImport::UnknownSheet { sheet } => println!("{sheet}: not a pool, skipped"),
        SheetImport::Failed { sheet, reason } => eprintln!("{sheet}: failed: {reason}"),
    }
}

fn print_unlock(identity: Identity, report: &UnlockReport) {
    if report.is_empty() {
        println!("{identity} holds nothing");
        return;
    }
    for (pool, granted) in &report.unlocked {
        println!("{pool}: +{granted}");
    }
    for (pool, remaining) in &report.skipped {
        println!("{pool}: {remaining} still available");
    }
}

fn print_stats(stats: &StatsReport) {
    println!(
        "{:<12} {:>8} {:>8} {:>6} {:>6} {:>6}",
        "pool", "free", "total", "day", "week", "month"
    );
    for pool in &stats.pools {
        println!(
            "{:<12} {:>8} {:>8} {:>6} {:>6} {:>6}",
            pool.name, pool.free, pool.total, pool.claimed.day, pool.claimed.week, pool.claimed.month
        );
    }
    let claimed = stats.total_claimed();
    println!(
        "{:<12} {:>8} {:>8} {:>6} {:>6} {:>6}",
        "all",
        stats.total_free(),
        stats.total_records(),
        claimed.day,
        claimed.week,
        claimed.month
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn xlsx_is_detected_by_extension() {
        assert!(is_xlsx(Path::new("upload.xlsx")));
        assert!(is_xlsx(Path::new("UPLOAD.XLSX")));
        assert!(!is_xlsx(Path::new("upload.csv")));
        assert!(!is_xlsx(Path::new("upload")));
    }

    #[test]
    fn text_files_yield_one_candidate_per_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "@one\n\n@two").unwrap();
        let candidates = read_lines(file.path()).unwrap();
        assert_eq!(
            candidates,
            [
                Candidate::from("@one"),
                Candidate::from(""),
                Candidate::from("@two")
            ]
        );
    }

    #[test]
    fn workbooks_must_be_xlsx() {
        let err = read_xlsx(Path::new("upload.csv")).unwrap_err();
        assert!(err.to_string().contains("not an .xlsx"));
    }
}
