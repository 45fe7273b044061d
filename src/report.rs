use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Datelike;
use tracing::{debug, info};

use crate::AccountId;

/// The report type used when none is specified
pub const DEFAULT_REPORT_TYPE: &str = "aws-billing-detailed-line-items-with-resources-and-tags";

/// Possible errors to occur while retrieving a billing report
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Unable to find billing report `{key}` for {year_month}")]
    NotFound { key: String, year_month: YearMonth },
    #[error("I/O error on `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error("The archive `{archive}` does not contain `{entry}`")]
    MissingArchiveEntry { archive: PathBuf, entry: String },
}

impl FetchError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_owned(),
            source,
        }
    }
}

/// Possible errors to occur while parsing a year and month
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("`{0}` is not a valid year and month, expected yyyy-mm")]
pub struct YearMonthError(String);

/// The billing period of a report
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: u16,
    month: u8,
}

impl YearMonth {
    pub fn new(year: u16, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then(|| Self { year, month })
    }

    /// The current month in local time
    pub fn current() -> Self {
        let now = chrono::Local::now();
        Self {
            year: now.year().clamp(0, 9999) as u16,
            month: now.month() as u8,
        }
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }
}

impl FromStr for YearMonth {
    type Err = YearMonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || YearMonthError(s.to_owned());

        let (year, month) = s.split_once('-').ok_or_else(error)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(error());
        }
        if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(error());
        }

        let year = year.parse().map_err(|_| error())?;
        let month = month.parse().map_err(|_| error())?;
        Self::new(year, month).ok_or_else(error)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// The type of a billing report, like `aws-billing-csv` or `aws-cost-allocation`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReportType(String);

impl ReportType {
    pub fn new(report_type: impl Into<String>) -> Self {
        Self(report_type.into())
    }

    /// Detailed reports are stored zip compressed
    pub fn is_detailed(&self) -> bool {
        self.0.contains("detailed")
    }
}

impl Default for ReportType {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_TYPE)
    }
}

impl FromStr for ReportType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one billing report of a consolidated billing account
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportKey {
    pub master_account_id: AccountId,
    pub report_type: ReportType,
    pub year_month: YearMonth,
}

impl ReportKey {
    /// The name of the report object: `<master>-<type>-<yyyy-mm>.csv`
    ///
    /// Detailed reports carry an additional `.zip` extension.
    pub fn object_key(&self) -> String {
        let key = format!(
            "{}-{}-{}.csv",
            self.master_account_id, self.report_type, self.year_month,
        );
        match self.report_type.is_detailed() {
            true => key + ".zip",
            false => key,
        }
    }
}

/// A billing report made available in the output directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedReport {
    pub path: PathBuf,
    /// `false` if `path` is the source object itself and must not be removed
    pub downloaded: bool,
}

/// A source of billing reports
pub trait ReportFetcher {
    /// Places the report identified by `key` into `outdir`
    fn fetch(&self, key: &ReportKey, outdir: &Path) -> Result<FetchedReport, FetchError>;
}

/// Fetches reports from a local mirror of the billing bucket
///
/// Objects are expected as plain files named after their key directly inside
/// the mirror directory.
#[derive(Clone, Debug)]
pub struct MirrorFetcher {
    root: PathBuf,
}

impl MirrorFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ReportFetcher for MirrorFetcher {
    fn fetch(&self, key: &ReportKey, outdir: &Path) -> Result<FetchedReport, FetchError> {
        let object_key = key.object_key();
        let source = self.root.join(&object_key);
        if !source.is_file() {
            return Err(FetchError::NotFound {
                key: object_key,
                year_month: key.year_month,
            });
        }

        fs::create_dir_all(outdir).map_err(FetchError::io(outdir))?;
        let destination = outdir.join(&object_key);
        // copying a file onto itself truncates it
        if same_file(&source, &destination)? {
            debug!(report = %source.display(), "billing report already in the output directory");
            return Ok(FetchedReport {
                path: source,
                downloaded: false,
            });
        }

        info!(destination = %destination.display(), "downloading billing report");
        fs::copy(&source, &destination).map_err(FetchError::io(&destination))?;

        Ok(FetchedReport {
            path: destination,
            downloaded: true,
        })
    }
}

fn same_file(a: &Path, b: &Path) -> Result<bool, FetchError> {
    if !b.exists() {
        return Ok(false);
    }
    let a = fs::canonicalize(a).map_err(FetchError::io(a))?;
    let b = fs::canonicalize(b).map_err(FetchError::io(b))?;

    Ok(a == b)
}

/// Extracts the billing report from a zip archive into `outdir`
///
/// The report is the entry named like the archive without its `.zip`
/// extension. Archives without such an entry, but with exactly one CSV file,
/// are accepted as well. The extracted file always receives the archive's
/// name without `.zip`, and existing files are overwritten.
pub fn unzip_report(archive: &Path, outdir: &Path) -> Result<PathBuf, FetchError> {
    let archive_name = archive
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let report_name = archive_name
        .strip_suffix(".zip")
        .unwrap_or(archive_name)
        .to_owned();
    let missing = || FetchError::MissingArchiveEntry {
        archive: archive.to_owned(),
        entry: report_name.clone(),
    };
    if report_name.is_empty() {
        return Err(missing());
    }

    let file = File::open(archive).map_err(FetchError::io(archive))?;
    let mut zip = zip::ZipArchive::new(file)?;

    let entry_name = match zip.file_names().any(|name| name == report_name) {
        true => report_name.clone(),
        false => {
            let mut csv_entries = zip.file_names().filter(|name| name.ends_with(".csv"));
            match (csv_entries.next(), csv_entries.next()) {
                (Some(name), None) => name.to_owned(),
                _ => return Err(missing()),
            }
        }
    };
    debug!(archive = %archive.display(), entry = %entry_name, "extracting billing report");

    let mut entry = zip.by_name(&entry_name)?;
    let destination = outdir.join(&report_name);
    let mut output = File::create(&destination).map_err(FetchError::io(&destination))?;
    io::copy(&mut entry, &mut output).map_err(FetchError::io(&destination))?;

    Ok(destination)
}

/// Removes downloaded or extracted files, ignoring missing ones
pub fn remove_downloads(paths: &[PathBuf]) -> Result<(), FetchError> {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed download"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(FetchError::io(path)(e)),
        }
    }

    Ok(())
}
