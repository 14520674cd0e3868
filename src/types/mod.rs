mod buildup;
mod config;
mod context;
mod lookup;
mod result;
mod value;

pub use buildup::{Buildup, BuildupOperation};
pub use config::{Config, EvalMode};
pub use context::EvalContext;
pub use lookup::{Lookup, LookupKey, MapLookup, RangeEntry, RangeLookup, TaxBracket};
pub use result::EvalResult;
pub use value::Value;
