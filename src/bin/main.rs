use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use account_hygiene::snapshot::{ImageList, OrphanFinder, SnapshotList, VolumeList};
use account_hygiene::utilization::{underutilized_instances, CheckResultResponse};
use account_hygiene::{
    produce_linked_reports, read_json, split_report, AccountId, BillingConfig, LinkedAccounts, MirrorFetcher,
    ReportType, YearMonth,
};

/// Account hygiene and cost reporting for AWS accounts
#[derive(Debug, Parser)]
#[clap(version)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch a consolidated billing report and split it by linked account
    Billing {
        /// Directory holding a mirror of the S3 bucket the billing reports are stored in
        #[clap(short, long)]
        bucket: PathBuf,
        /// The consolidated billing account owning the reports
        #[clap(short, long, env = "MASTER_ACCOUNT_ID")]
        master_account: AccountId,
        /// Year and month (yyyy-mm) to pull the billing info from, defaults to the current month
        #[clap(long = "ym")]
        year_month: Option<YearMonth>,
        /// Type of report
        #[clap(short = 't', long = "type", default_value_t)]
        report_type: ReportType,
        /// Where to save the outputs
        #[clap(short = 'd', long, default_value = "results")]
        outdir: PathBuf,
        /// Accounts to pull out billing info for, comma separated
        #[clap(short = 'l', long)]
        linked_accounts: LinkedAccounts,
        /// Remove the downloaded report files afterwards, the default
        #[clap(long, name = "cleanup", overrides_with = "no-cleanup")]
        cleanup: bool,
        /// Keep the downloaded report files
        #[clap(long, name = "no-cleanup", overrides_with = "cleanup")]
        no_cleanup: bool,
    },
    /// Split a local billing report by linked account
    Split {
        /// The path to the billing report CSV file
        report: PathBuf,
        /// Where to save the outputs
        #[clap(short = 'd', long, default_value = "results")]
        outdir: PathBuf,
        /// Accounts to pull out billing info for, comma separated
        #[clap(short = 'l', long)]
        linked_accounts: LinkedAccounts,
    },
    /// List snapshots whose image or source volume no longer exists
    OrphanedSnapshots {
        /// The account owning the snapshots
        #[clap(short, long, env = "AWS_ACCOUNT_ID")]
        account: AccountId,
        /// Output of `aws ec2 describe-images --owners self`
        #[clap(long)]
        images: PathBuf,
        /// Output of `aws ec2 describe-volumes`
        #[clap(long)]
        volumes: PathBuf,
        /// Output of `aws ec2 describe-snapshots --owner-ids <account>`
        #[clap(long)]
        snapshots: PathBuf,
    },
    /// List EC2 instances flagged by the low utilization Trusted Advisor check
    Underutilized {
        /// Output of `aws support describe-trusted-advisor-check-result --check-id Qch7DwouX1`
        check_result: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("account_hygiene=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Billing {
            bucket,
            master_account,
            year_month,
            report_type,
            outdir,
            linked_accounts,
            cleanup,
            no_cleanup,
        } => {
            let config = BillingConfig {
                master_account_id: master_account,
                report_type,
                year_month: year_month.unwrap_or_else(YearMonth::current),
                outdir,
                linked_accounts,
                // the later of both flags wins, leaving the other unset
                cleanup: cleanup || !no_cleanup,
            };
            let outcome = produce_linked_reports(&config, &MirrorFetcher::new(bucket))?;
            log_skipped(&outcome.stats);
        }
        Command::Split {
            report,
            outdir,
            linked_accounts,
        } => {
            std::fs::create_dir_all(&outdir)?;
            let outcome = split_report(&report, &linked_accounts, &outdir)?;
            for (account, path) in &outcome.outputs {
                info!(%account, path = %path.display(), "wrote linked account report");
            }
            log_skipped(&outcome.stats);
        }
        Command::OrphanedSnapshots {
            account,
            images,
            volumes,
            snapshots,
        } => {
            let images: ImageList = read_json(&images, "image list")?;
            let volumes: VolumeList = read_json(&volumes, "volume list")?;
            let snapshots: SnapshotList = read_json(&snapshots, "snapshot list")?;
            let finder = OrphanFinder::new(account, &images.images, &volumes.volumes);

            let mut writer = csv::WriterBuilder::new()
                .has_headers(true)
                .from_writer(std::io::stdout());
            for orphan in finder.find(&snapshots.snapshots) {
                info!("{}", orphan);
                writer.serialize(orphan)?;
            }
            writer.flush()?;
        }
        Command::Underutilized { check_result } => {
            let response: CheckResultResponse = read_json(&check_result, "trusted advisor check result")?;
            info!("EC2 instances that are under 10% utilized");

            let mut writer = csv::WriterBuilder::new()
                .has_headers(true)
                .from_writer(std::io::stdout());
            for instance in underutilized_instances(&response.result) {
                writer.serialize(instance)?;
            }
            writer.flush()?;
        }
    }

    Ok(())
}

fn log_skipped(stats: &account_hygiene::PartitionStats) {
    info!(
        unrequested = stats.unrequested,
        malformed = stats.malformed,
        "skipped billing rows"
    );
}
