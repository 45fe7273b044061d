use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{AccountId, LinkedAccounts};

/// The zero based column holding the linked account id
pub const LINKED_ACCOUNT_COLUMN: usize = 2;

/// Possible errors to occur while partitioning a billing report
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("No linked accounts were requested")]
    NoAccounts,
    #[error("The billing report is empty and has no header line")]
    MissingHeader,
    #[error("The billing report path `{0}` has no file name")]
    InvalidReportPath(PathBuf),
    #[error("Failed to open `{path}`")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read the billing report")]
    Read(#[source] io::Error),
    #[error("Failed to write the report of account {account}")]
    Write {
        account: String,
        #[source]
        source: io::Error,
    },
}

/// Counters collected during one partitioning run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionStats {
    /// The number of rows written per requested account, header excluded
    pub rows: BTreeMap<AccountId, usize>,
    /// Rows belonging to accounts that were not requested
    pub unrequested: usize,
    /// Lines with less than three fields, or a non UTF-8 account field
    pub malformed: usize,
}

/// The result of splitting a report file
#[derive(Debug)]
pub struct SplitOutcome {
    pub stats: PartitionStats,
    /// The output file of every requested account
    pub outputs: BTreeMap<AccountId, PathBuf>,
}

/// Removes a leading and a trailing double quote from a field
///
/// Both ends are checked independently, so `"123` and `123"` become `123`,
/// while an unquoted field is returned unchanged.
pub fn strip_wrapping_quote(field: &str) -> &str {
    let field = field.strip_prefix('"').unwrap_or(field);
    field.strip_suffix('"').unwrap_or(field)
}

/// Extracts the de-quoted linked account id of a data line
///
/// Returns `None` for lines with less than three comma separated fields, or
/// whose account field isn't valid UTF-8.
pub fn linked_account_field(line: &[u8]) -> Option<&str> {
    let content = trim_line_ending(line);
    let field = content
        .split(|byte| *byte == b',')
        .nth(LINKED_ACCOUNT_COLUMN)?;
    let field = std::str::from_utf8(field).ok()?;

    Some(strip_wrapping_quote(field))
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Redistributes the rows of a billing report into one sink per account
///
/// The header line is written unmodified to every sink. Every following line
/// is written, byte for byte, to the sink of its linked account, or dropped if
/// there's no sink for that account. Malformed lines are logged and skipped.
pub fn partition<R, W>(
    mut input: R,
    sinks: &mut BTreeMap<AccountId, W>,
) -> Result<PartitionStats, PartitionError>
where
    R: BufRead,
    W: Write,
{
    if sinks.is_empty() {
        return Err(PartitionError::NoAccounts);
    }

    let mut stats = PartitionStats {
        rows: sinks.keys().map(|account| (account.clone(), 0)).collect(),
        ..PartitionStats::default()
    };

    let mut line = Vec::new();
    if input.read_until(b'\n', &mut line).map_err(PartitionError::Read)? == 0 {
        return Err(PartitionError::MissingHeader);
    }
    for (account, sink) in sinks.iter_mut() {
        write_line(sink, account.as_str(), &line)?;
    }

    let mut line_number = 1;
    loop {
        line.clear();
        if input.read_until(b'\n', &mut line).map_err(PartitionError::Read)? == 0 {
            break;
        }
        line_number += 1;

        let account = match linked_account_field(&line) {
            Some(account) => account,
            None => {
                warn!(line = line_number, "skipping malformed billing line");
                stats.malformed += 1;
                continue;
            }
        };

        match sinks.get_mut(account) {
            Some(sink) => {
                write_line(sink, account, &line)?;
                if let Some(rows) = stats.rows.get_mut(account) {
                    *rows += 1;
                }
            }
            None => stats.unrequested += 1,
        }
    }

    debug!(lines = line_number, "billing report exhausted");
    Ok(stats)
}

fn write_line<W: Write>(sink: &mut W, account: &str, line: &[u8]) -> Result<(), PartitionError> {
    sink.write_all(line).map_err(|source| PartitionError::Write {
        account: account.to_owned(),
        source,
    })
}

/// The path of an account's report: `<account-id>-<report basename>` in `outdir`
pub fn output_path(outdir: &Path, account: &AccountId, report: &Path) -> Result<PathBuf, PartitionError> {
    let basename = report
        .file_name()
        .ok_or_else(|| PartitionError::InvalidReportPath(report.to_owned()))?;
    let mut name = std::ffi::OsString::from(format!("{}-", account));
    name.push(basename);

    Ok(outdir.join(name))
}

/// Splits a billing report file into one file per linked account
///
/// All output files are created before the report is read. They are flushed
/// once the report is exhausted, and closed on every exit path. If the split
/// fails, the output files created so far are removed again.
pub fn split_report(
    report: &Path,
    accounts: &LinkedAccounts,
    outdir: &Path,
) -> Result<SplitOutcome, PartitionError> {
    info!(report = %report.display(), "parsing billing report");

    let input = File::open(report).map_err(|source| PartitionError::Open {
        path: report.to_owned(),
        source,
    })?;

    let mut outputs = BTreeMap::new();
    match write_outputs(input, report, accounts, outdir, &mut outputs) {
        Ok(stats) => Ok(SplitOutcome { stats, outputs }),
        Err(e) => {
            remove_outputs(&outputs);
            Err(e)
        }
    }
}

// the sinks are dropped, and with that closed, before this returns
fn write_outputs(
    input: File,
    report: &Path,
    accounts: &LinkedAccounts,
    outdir: &Path,
    outputs: &mut BTreeMap<AccountId, PathBuf>,
) -> Result<PartitionStats, PartitionError> {
    let mut sinks = BTreeMap::new();
    for account in accounts {
        let path = output_path(outdir, account, report)?;
        let file = File::create(&path).map_err(|source| PartitionError::Open {
            path: path.clone(),
            source,
        })?;
        sinks.insert(account.clone(), BufWriter::new(file));
        outputs.insert(account.clone(), path);
    }

    let stats = partition(BufReader::new(input), &mut sinks)?;

    for (account, sink) in sinks.iter_mut() {
        sink.flush().map_err(|source| PartitionError::Write {
            account: account.to_string(),
            source,
        })?;
    }

    Ok(stats)
}

fn remove_outputs(outputs: &BTreeMap<AccountId, PathBuf>) {
    for path in outputs.values() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to remove incomplete report");
        }
    }
}
