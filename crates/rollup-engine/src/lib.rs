//! Group-by/sum aggregation over flat record sets.
//!
//! Given records with named scalar fields and a [`GroupingSpec`], the engine produces one output
//! record per distinct combination of category values, with the requested value fields summed
//! across the rows of each group.
//!
//! The pipeline for one spec is:
//! - [`SchemaProbe`] checks the requested names against the first record.
//! - [`compose_key`] / [`GroupKey`] derive each record's group identity.
//! - [`AccumulatorStore`] folds records into per-group accumulators.
//! - [`materialize`] flattens the store into a [`ResultSet`].
//!
//! Every call returns a fresh result set; nothing is retained between calls, so independent specs
//! can run concurrently over the same records (see [`aggregate_many`]).

#![forbid(unsafe_code)]

mod engine;
mod key;
mod parallel;
mod record;
mod result;
mod schema;
mod store;
mod value;

pub use crate::engine::{
    aggregate, aggregate_many, aggregate_many_with, aggregate_with, AggregateError,
    AggregateOptions, AggregateResult, LogProgress, NoProgress, ProgressEvent, ProgressSink,
};
pub use crate::key::{compose_key, GroupKey, KeyMode, KeyPart, KEY_SEPARATOR};
pub use crate::record::Record;
pub use crate::result::{materialize, Group, ResultSet};
pub use crate::schema::{FieldRole, GroupingSpec, SchemaProbe, ValidatedField};
pub use crate::store::AccumulatorStore;
pub use crate::value::Value;
