use std::path::PathBuf;

use tracing::info;

use crate::partition::{split_report, PartitionError, SplitOutcome};
use crate::report::{
    remove_downloads, unzip_report, FetchError, FetchedReport, ReportFetcher, ReportKey, ReportType, YearMonth,
};
use crate::{AccountId, LinkedAccounts};

/// Possible errors to occur while producing linked account billing reports
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
}

/// Everything needed to produce the billing reports of some linked accounts
#[derive(Clone, Debug)]
pub struct BillingConfig {
    /// The consolidated billing account the reports belong to
    pub master_account_id: AccountId,
    pub report_type: ReportType,
    pub year_month: YearMonth,
    /// The directory downloads and results are placed in
    pub outdir: PathBuf,
    pub linked_accounts: LinkedAccounts,
    /// Remove the downloaded report and its archive afterwards
    pub cleanup: bool,
}

impl BillingConfig {
    pub fn report_key(&self) -> ReportKey {
        ReportKey {
            master_account_id: self.master_account_id.clone(),
            report_type: self.report_type.clone(),
            year_month: self.year_month,
        }
    }
}

/// Fetches the configured report and splits it by linked account
///
/// Detailed reports are unzipped before splitting. Downloads are only removed
/// after a successful split, so a failed run leaves them for inspection.
/// Files the fetcher didn't create, like a mirror object inside the output
/// directory, are never removed.
pub fn produce_linked_reports<F>(config: &BillingConfig, fetcher: &F) -> Result<SplitOutcome, BillingError>
where
    F: ReportFetcher + ?Sized,
{
    let key = config.report_key();
    let FetchedReport { path, downloaded } = fetcher.fetch(&key, &config.outdir)?;

    let mut downloads = Vec::new();
    if downloaded {
        downloads.push(path.clone());
    }
    let report = match config.report_type.is_detailed() {
        true => {
            let report = unzip_report(&path, &config.outdir)?;
            downloads.push(report.clone());
            report
        }
        false => path,
    };

    let outcome = split_report(&report, &config.linked_accounts, &config.outdir)?;
    for (account, rows) in &outcome.stats.rows {
        info!(%account, rows, "wrote linked account report");
    }

    if config.cleanup {
        remove_downloads(&downloads)?;
    }

    Ok(outcome)
}
