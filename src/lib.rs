pub use self::{
    account::{AccountError, AccountId, LinkedAccounts},
    billing::{produce_linked_reports, BillingConfig, BillingError},
    input::{read_json, InputError},
    partition::{partition, split_report, strip_wrapping_quote, PartitionError, PartitionStats, SplitOutcome},
    report::{FetchError, FetchedReport, MirrorFetcher, ReportFetcher, ReportKey, ReportType, YearMonth},
};

mod account;
mod billing;
mod input;
pub mod partition;
pub mod report;
pub mod snapshot;
pub mod utilization;
