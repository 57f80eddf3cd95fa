//! Types that represent the core data model, such as `Amount`, `Category` and the record types.
mod amount;
mod category;
mod record;

pub use amount::{Amount, AmountError};
pub use category::Category;
pub(crate) use record::{iso_date, json_type, parse_object};
pub use record::{CandidateRecord, MalformedJson, NormalizedRecord, RawRecord, ValidatedRecord};
