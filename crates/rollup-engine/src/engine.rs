use std::fmt;

use thiserror::Error;

use crate::key::KeyMode;
use crate::parallel;
use crate::record::Record;
use crate::result::{materialize, ResultSet};
use crate::schema::{GroupingSpec, SchemaProbe};
use crate::store::AccumulatorStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// There is no record to take the schema from.
    #[error("cannot aggregate an empty dataset")]
    EmptyDataset,
    #[error("shard size must be at least one row")]
    InvalidShardSize,
    /// [`AccumulatorStore::merge`] was given a store not built with
    /// [`AccumulatorStore::for_shard`].
    #[error("only shard stores can be merged into another store")]
    NotAShardStore,
}

pub type AggregateResult<T> = Result<T, AggregateError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    pub key_mode: KeyMode,
    /// Split the input into contiguous shards of this many rows, accumulate each shard on its own
    /// and merge the partial stores in input order. The result is identical to a single scan.
    ///
    /// `None` scans the input once. `Some(0)` is rejected.
    pub shard_rows: Option<usize>,
}

/// Advisory notifications emitted around each grouping run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent<'a> {
    /// Emitted before the schema is probed.
    Started { spec: &'a GroupingSpec },
    /// Emitted after the result set is materialized.
    Finished {
        spec: &'a GroupingSpec,
        groups: usize,
        rows: usize,
    },
}

impl fmt::Display for ProgressEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Started { spec } => write!(f, "grouping by {}", spec.describe()),
            ProgressEvent::Finished { spec, groups, rows } => write!(
                f,
                "grouped {rows} records into {groups} groups by {}",
                spec.describe()
            ),
        }
    }
}

pub trait ProgressSink: Sync {
    fn on_event(&self, event: &ProgressEvent<'_>);
}

/// Forwards progress events to the `log` facade at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_event(&self, event: &ProgressEvent<'_>) {
        log::info!("{event}");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_event(&self, _event: &ProgressEvent<'_>) {}
}

/// Groups `records` by `spec.category_keys` and sums `spec.value_keys` within each group.
///
/// The first record defines the schema: requested names it does not carry are dropped from the
/// output (see [`ResultSet::unknown_fields`]). Groups appear in the order their keys were first
/// seen.
pub fn aggregate(records: &[Record], spec: &GroupingSpec) -> AggregateResult<ResultSet> {
    aggregate_with(records, spec, &AggregateOptions::default(), &LogProgress)
}

pub fn aggregate_with(
    records: &[Record],
    spec: &GroupingSpec,
    options: &AggregateOptions,
    progress: &dyn ProgressSink,
) -> AggregateResult<ResultSet> {
    progress.on_event(&ProgressEvent::Started { spec });

    if options.shard_rows == Some(0) {
        return Err(AggregateError::InvalidShardSize);
    }
    let sample = records.first().ok_or(AggregateError::EmptyDataset)?;
    let probe = SchemaProbe::validate(sample, spec);

    let store = match options.shard_rows {
        Some(shard_rows) if shard_rows < records.len() => {
            let shards: Vec<(usize, &[Record])> = records.chunks(shard_rows).enumerate().collect();
            log::debug!(
                "accumulating {} records in {} shards of up to {shard_rows} rows",
                records.len(),
                shards.len()
            );
            let partials = parallel::map_ordered(&shards, |&(idx, shard)| {
                // Only stores merged into an earlier one need to track replays.
                let store = if idx == 0 {
                    AccumulatorStore::new(spec, probe.clone(), options.key_mode)
                } else {
                    AccumulatorStore::for_shard(spec, probe.clone(), options.key_mode)
                };
                accumulate(store, shard)
            });
            let mut partials = partials.into_iter();
            let mut store = partials
                .next()
                .unwrap_or_else(|| AccumulatorStore::new(spec, probe.clone(), options.key_mode));
            for partial in partials {
                store.merge(partial)?;
            }
            store
        }
        _ => accumulate(AccumulatorStore::new(spec, probe, options.key_mode), records),
    };

    let result = materialize(store);
    progress.on_event(&ProgressEvent::Finished {
        spec,
        groups: result.len(),
        rows: records.len(),
    });
    Ok(result)
}

/// Runs several independent groupings over the same records.
///
/// Results are returned in `specs` order. With the `parallel` feature the specs run concurrently;
/// they share only the read-only input.
pub fn aggregate_many(
    records: &[Record],
    specs: &[GroupingSpec],
    options: &AggregateOptions,
) -> Vec<AggregateResult<ResultSet>> {
    aggregate_many_with(records, specs, options, &LogProgress)
}

pub fn aggregate_many_with(
    records: &[Record],
    specs: &[GroupingSpec],
    options: &AggregateOptions,
    progress: &dyn ProgressSink,
) -> Vec<AggregateResult<ResultSet>> {
    parallel::map_ordered(specs, |spec| {
        aggregate_with(records, spec, options, progress)
    })
}

fn accumulate(mut store: AccumulatorStore, records: &[Record]) -> AccumulatorStore {
    for record in records {
        store.update(record);
    }
    store
}
