//! These structs provide the CLI interface for the expense CLI.

use crate::llm::Provider;
use crate::model::Category;
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing::level_filters::LevelFilter;

/// expense: turn everyday notes and receipt photos into validated expense records.
///
/// Free text such as "Dinner at Olive Garden forty-five dollars" is sent through two language
/// model calls, one that extracts the expense and one that normalizes it, followed by a strict
/// schema check. Receipt images are read with OCR first. Validated expenses can be saved to a
/// local SQLite database.
///
/// Set the API key for your provider in the environment variable named in config.json, e.g.
/// GEMINI_API_KEY.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory, the configuration file and the expense database.
    ///
    /// This is the first command you should run. By default the data directory is
    /// $HOME/expense; pass --expense-home or set EXPENSE_HOME to put it somewhere else.
    Init(InitArgs),
    /// Parse a free-text expense, e.g. "Uber to the airport 32 dollars yesterday".
    Parse(ParseArgs),
    /// Read a receipt image and parse the expense on it.
    Receipt(ReceiptArgs),
    /// Enter an expense by hand, without a language model. Use this when parsing fails.
    Add(AddArgs),
    /// Check a JSON expense record file against the expense schema.
    Validate(ValidateArgs),
    /// List saved expenses, newest first.
    List(ListArgs),
    /// Delete one of your saved expenses by its id.
    Delete(DeleteArgs),
    /// Show how much was spent per category, optionally for a single month.
    Totals(TotalsArgs),
    /// Check that the configured language model is reachable.
    Check,
    /// Print the JSON schema of a validated expense record.
    Schema,
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where expense data and configuration is held. Defaults to ~/expense
    #[arg(long, env = "EXPENSE_HOME", default_value_t = default_expense_home())]
    expense_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, expense_home: PathBuf) -> Self {
        Self {
            log_level,
            expense_home: expense_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn expense_home(&self) -> &DisplayPath {
        &self.expense_home
    }
}

/// Args for the `expense init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The language model provider.
    #[arg(long, value_enum, default_value_t = Provider::Gemini)]
    provider: Provider,

    /// The text model to use instead of the provider's default.
    #[arg(long)]
    model: Option<String>,
}

impl InitArgs {
    pub fn new(provider: Provider, model: Option<String>) -> Self {
        Self { provider, model }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// Args for the `expense parse` command.
#[derive(Debug, Parser, Clone)]
pub struct ParseArgs {
    /// The expense, in your own words.
    text: String,

    /// The date relative expressions such as "yesterday" are resolved against, as YYYY-MM-DD.
    /// Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Save the expense to the database if it validates.
    #[arg(long)]
    save: bool,
}

impl ParseArgs {
    pub fn new(text: impl Into<String>, date: Option<NaiveDate>, save: bool) -> Self {
        Self {
            text: text.into(),
            date,
            save,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn save(&self) -> bool {
        self.save
    }
}

/// Args for the `expense receipt` command.
#[derive(Debug, Parser, Clone)]
pub struct ReceiptArgs {
    /// Path to a JPEG, PNG, GIF or WebP image of the receipt.
    path: PathBuf,

    /// The image's MIME type, e.g. image/jpeg. Inferred from the file extension when omitted.
    #[arg(long)]
    mime_type: Option<String>,

    /// The reference date as YYYY-MM-DD. Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Save the expense to the database if it validates.
    #[arg(long)]
    save: bool,
}

impl ReceiptArgs {
    pub fn new(
        path: impl Into<PathBuf>,
        mime_type: Option<String>,
        date: Option<NaiveDate>,
        save: bool,
    ) -> Self {
        Self {
            path: path.into(),
            mime_type,
            date,
            save,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn save(&self) -> bool {
        self.save
    }
}

/// Args for the `expense add` command.
#[derive(Debug, Parser, Clone)]
pub struct AddArgs {
    /// The amount, e.g. 12.50 or $1,200.
    #[arg(long, allow_hyphen_values = true)]
    amount: String,

    /// One of Food, Transportation, Entertainment, Shopping, Bills, Healthcare, Education, Other.
    #[arg(long)]
    category: String,

    /// YYYY-MM-DD, or an expression such as "yesterday" or "Feb 17". Defaults to today.
    #[arg(long)]
    date: Option<String>,

    /// What the expense was for.
    #[arg(long)]
    description: Option<String>,
}

impl AddArgs {
    pub fn new(
        amount: impl Into<String>,
        category: impl Into<String>,
        date: Option<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            amount: amount.into(),
            category: category.into(),
            date,
            description,
        }
    }

    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Args for the `expense validate` command.
#[derive(Debug, Parser, Clone)]
pub struct ValidateArgs {
    /// A JSON file holding one expense object.
    file: PathBuf,
}

impl ValidateArgs {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

/// How many expenses `expense list` shows when `--limit` is not given.
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Args for the `expense list` command.
#[derive(Debug, Parser, Clone)]
pub struct ListArgs {
    /// Only show this category.
    #[arg(long, value_enum)]
    category: Option<Category>,

    /// Only show expenses on or after this date, as YYYY-MM-DD.
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Only show expenses on or before this date, as YYYY-MM-DD.
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Show at most this many expenses.
    #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
    limit: u32,

    /// Show expenses of every owner, not just the configured one.
    #[arg(long)]
    all_owners: bool,
}

impl ListArgs {
    /// A `limit` of `None` means `DEFAULT_LIST_LIMIT`.
    pub fn new(
        category: Option<Category>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        limit: Option<u32>,
        all_owners: bool,
    ) -> Self {
        Self {
            category,
            from,
            to,
            limit: limit.unwrap_or(DEFAULT_LIST_LIMIT),
            all_owners,
        }
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn from(&self) -> Option<NaiveDate> {
        self.from
    }

    pub fn to(&self) -> Option<NaiveDate> {
        self.to
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn all_owners(&self) -> bool {
        self.all_owners
    }
}

/// Args for the `expense delete` command.
#[derive(Debug, Parser, Clone)]
pub struct DeleteArgs {
    /// The id printed when the expense was saved.
    id: String,
}

impl DeleteArgs {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Args for the `expense totals` command.
#[derive(Debug, Parser, Clone)]
pub struct TotalsArgs {
    /// Only count expenses in this month, as YYYY-MM.
    #[arg(long, value_parser = parse_month)]
    month: Option<NaiveDate>,

    /// Count expenses of every owner, not just the configured one.
    #[arg(long)]
    all_owners: bool,
}

impl TotalsArgs {
    /// `month` is any day in the month. It is stored as the first of the month.
    pub fn new(month: Option<NaiveDate>, all_owners: bool) -> Self {
        Self {
            month: month.and_then(|d| d.with_day(1)),
            all_owners,
        }
    }

    /// The first day of the selected month.
    pub fn month(&self) -> Option<NaiveDate> {
        self.month
    }

    pub fn all_owners(&self) -> bool {
        self.all_owners
    }
}

/// Parses `YYYY-MM` into the first day of that month.
fn parse_month(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
        .map_err(|_| format!("'{s}' is not a month in YYYY-MM format"))
}

fn default_expense_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("expense"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --expense-home or EXPENSE_HOME instead of relying on the \
                default expense home directory.",
            );
            PathBuf::from("expense")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
