use std::collections::HashMap;

use crate::engine::{AggregateError, AggregateResult};
use crate::key::{compose_key, GroupKey, KeyMode};
use crate::record::Record;
use crate::result::{self, ResultSet};
use crate::schema::{FieldRole, GroupingSpec, SchemaProbe, ValidatedField};
use crate::value::Value;

/// Folds one numeric row value into a field's running state, as `(state || 0) + x`.
///
/// Blank, `false`, empty text, `0` and NaN count as zero and `true` counts as one. Non-empty text
/// is not a number: the number's text form is appended to it, and every later number keeps
/// appending.
fn add_number(current: Option<Value>, x: f64) -> Value {
    match current {
        None | Some(Value::Blank) | Some(Value::Bool(false)) => Value::Number(0.0 + x),
        Some(Value::Bool(true)) => Value::Number(1.0 + x),
        Some(Value::Number(total)) if total == 0.0 || total.is_nan() => Value::Number(0.0 + x),
        Some(Value::Number(total)) => Value::Number(total + x),
        Some(Value::Text(text)) if text.is_empty() => Value::Number(0.0 + x),
        Some(Value::Text(mut text)) => {
            text.push_str(&Value::Number(x).to_key_string());
            Value::Text(text)
        }
    }
}

/// How one field of a shard's group relates to the state it inherits from earlier rows.
#[derive(Debug, Clone, PartialEq)]
enum Replay {
    /// Numbers folded in while the field still carried the inherited state, in row order.
    Numbers(Vec<f64>),
    /// The field was overwritten; its state no longer depends on earlier rows.
    Overwritten,
}

impl Replay {
    fn record(&mut self, numeric: Option<f64>) {
        match numeric {
            None => *self = Replay::Overwritten,
            Some(x) => {
                if let Replay::Numbers(xs) = self {
                    xs.push(x);
                }
            }
        }
    }

    fn then(&mut self, later: Replay) {
        match later {
            Replay::Overwritten => *self = Replay::Overwritten,
            Replay::Numbers(xs) => {
                if let Replay::Numbers(own) = self {
                    own.extend(xs);
                }
            }
        }
    }
}

/// In-progress output record for one group.
#[derive(Debug, Clone)]
pub(crate) struct Accumulator {
    pub(crate) display_key: String,
    pub(crate) rows: usize,
    values: Vec<Option<Value>>,
    /// Present only in stores built with [`AccumulatorStore::for_shard`].
    replay: Option<Vec<Replay>>,
}

impl Accumulator {
    fn new(display_key: String, field_count: usize, track_replay: bool) -> Self {
        Self {
            display_key,
            rows: 0,
            values: vec![None; field_count],
            replay: track_replay.then(|| vec![Replay::Numbers(Vec::new()); field_count]),
        }
    }

    fn apply(&mut self, fields: &[ValidatedField], record: &Record) {
        self.rows += 1;
        for (idx, field) in fields.iter().enumerate() {
            let value = record.get_or_blank(&field.name);
            let numeric = match (field.role, value) {
                (FieldRole::Value, Value::Number(x)) => Some(*x),
                _ => None,
            };

            let slot = &mut self.values[idx];
            *slot = Some(match numeric {
                Some(x) => add_number(slot.take(), x),
                None => value.clone(),
            });
            if let Some(replay) = self.replay.as_mut() {
                replay[idx].record(numeric);
            }
        }
    }

    /// Replays a shard accumulator for the same group on top of this one.
    fn absorb(&mut self, later: Accumulator, later_replay: Vec<Replay>) {
        self.rows += later.rows;
        for (idx, (value, replay)) in later.values.into_iter().zip(later_replay).enumerate() {
            let slot = &mut self.values[idx];
            match &replay {
                Replay::Overwritten => *slot = value,
                Replay::Numbers(xs) => {
                    for &x in xs {
                        *slot = Some(add_number(slot.take(), x));
                    }
                }
            }
            if let Some(own) = self.replay.as_mut() {
                own[idx].then(replay);
            }
        }
    }

    pub(crate) fn to_record(&self, fields: &[ValidatedField]) -> Record {
        fields
            .iter()
            .zip(&self.values)
            .map(|(field, value)| (field.name.clone(), value.clone().unwrap_or_default()))
            .collect()
    }
}

/// Insertion-ordered map from group key to accumulator.
///
/// Built once per aggregation call. Groups are kept in the order their keys were first seen.
#[derive(Debug, Clone)]
pub struct AccumulatorStore {
    key_mode: KeyMode,
    category_keys: Vec<String>,
    probe: SchemaProbe,
    track_replay: bool,
    index: HashMap<GroupKey, usize>,
    groups: Vec<Accumulator>,
}

impl AccumulatorStore {
    /// `probe` must come from [`SchemaProbe::validate`] against the same `spec`.
    pub fn new(spec: &GroupingSpec, probe: SchemaProbe, key_mode: KeyMode) -> Self {
        Self::build(spec, probe, key_mode, false)
    }

    /// A store for a contiguous slice of the input that can later be merged into the store of
    /// the rows before it (see [`AccumulatorStore::merge`]).
    ///
    /// Keeps, per group and value field, the numbers seen before the field's first overwrite.
    pub fn for_shard(spec: &GroupingSpec, probe: SchemaProbe, key_mode: KeyMode) -> Self {
        Self::build(spec, probe, key_mode, true)
    }

    fn build(spec: &GroupingSpec, probe: SchemaProbe, key_mode: KeyMode, track_replay: bool) -> Self {
        Self {
            key_mode,
            category_keys: spec.category_keys.clone(),
            probe,
            track_replay,
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    /// Folds one record into its group.
    ///
    /// A value field whose value in this row is numeric is added to the group's state (see
    /// `add_number` for how a non-numeric state is coerced). Every other field (category fields,
    /// and value fields holding a non-numeric value in this row) is overwritten with the row's
    /// value, so the outcome for mixed columns depends on scan order.
    pub fn update(&mut self, record: &Record) {
        let key = GroupKey::for_record(record, &self.category_keys, self.key_mode);
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let display_key = match &key {
                    GroupKey::Composite(s) => s.clone(),
                    GroupKey::Typed(_) => compose_key(record, &self.category_keys),
                };
                let slot = self.groups.len();
                self.groups.push(Accumulator::new(
                    display_key,
                    self.probe.fields.len(),
                    self.track_replay,
                ));
                self.index.insert(key, slot);
                slot
            }
        };

        self.groups[slot].apply(&self.probe.fields, record);
    }

    /// Folds a shard store built from the rows immediately following this store's rows.
    ///
    /// The result is identical to scanning both row ranges with one store. Groups first seen in
    /// `later` are appended after the existing ones. Both stores must have been built for the same
    /// spec, and `later` must come from [`AccumulatorStore::for_shard`].
    pub fn merge(&mut self, later: AccumulatorStore) -> AggregateResult<()> {
        if !later.track_replay {
            return Err(AggregateError::NotAShardStore);
        }
        debug_assert_eq!(self.probe, later.probe);
        debug_assert_eq!(self.key_mode, later.key_mode);

        let mut later_keys: Vec<(GroupKey, usize)> = later.index.into_iter().collect();
        later_keys.sort_unstable_by_key(|(_, slot)| *slot);

        for ((key, _), mut incoming) in later_keys.into_iter().zip(later.groups) {
            match self.index.get(&key) {
                Some(&slot) => {
                    let replay = incoming.replay.take().unwrap_or_default();
                    self.groups[slot].absorb(incoming, replay);
                }
                None => {
                    if !self.track_replay {
                        incoming.replay = None;
                    }
                    let slot = self.groups.len();
                    self.groups.push(incoming);
                    self.index.insert(key, slot);
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn probe(&self) -> &SchemaProbe {
        &self.probe
    }

    /// Materializes the current state without consuming the store.
    pub fn snapshot(&self) -> ResultSet {
        result::materialize_ref(&self.probe, &self.groups)
    }

    pub(crate) fn into_parts(self) -> (SchemaProbe, Vec<Accumulator>) {
        (self.probe, self.groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn sample() -> Record {
        Record::from([("segment", Value::from("A")), ("sales", Value::from(0))])
    }

    fn spec() -> GroupingSpec {
        GroupingSpec::new(["segment"], ["sales"])
    }

    fn store(key_mode: KeyMode) -> AccumulatorStore {
        AccumulatorStore::new(&spec(), SchemaProbe::validate(&sample(), &spec()), key_mode)
    }

    fn shard() -> AccumulatorStore {
        AccumulatorStore::for_shard(
            &spec(),
            SchemaProbe::validate(&sample(), &spec()),
            KeyMode::Composite,
        )
    }

    fn row(segment: &str, sales: impl Into<Value>) -> Record {
        Record::from([("segment", Value::from(segment)), ("sales", sales.into())])
    }

    fn sales_of(store: &AccumulatorStore) -> Vec<Value> {
        store
            .snapshot()
            .records()
            .map(|r| r.get_or_blank("sales").clone())
            .collect()
    }

    fn scan(rows: &[Record]) -> AccumulatorStore {
        let mut store = store(KeyMode::Composite);
        rows.iter().for_each(|r| store.update(r));
        store
    }

    #[test]
    fn sums_numeric_values_per_group() {
        let mut store = store(KeyMode::Composite);
        store.update(&row("A", 10));
        store.update(&row("B", 7));
        store.update(&row("A", 5));
        assert_eq!(store.len(), 2);
        assert_eq!(sales_of(&store), vec![Value::from(15), Value::from(7)]);
    }

    #[test]
    fn non_numeric_value_overwrites_the_sum() {
        let store = scan(&[row("A", 5), row("A", "N/A")]);
        assert_eq!(sales_of(&store), vec![Value::from("N/A")]);
    }

    #[test]
    fn numbers_after_text_are_appended_as_text() {
        let store = scan(&[row("A", "N/A"), row("A", 5), row("A", 2)]);
        assert_eq!(sales_of(&store), vec![Value::from("N/A52")]);

        let store = scan(&[row("A", "x"), row("A", 1.5), row("A", -3)]);
        assert_eq!(sales_of(&store), vec![Value::from("x1.5-3")]);
    }

    #[test]
    fn number_after_true_counts_it_as_one() {
        let store = scan(&[row("A", true), row("A", 5)]);
        assert_eq!(sales_of(&store), vec![Value::from(6)]);
    }

    #[test]
    fn number_after_falsy_overwrite_starts_from_zero() {
        for falsy in [Value::Blank, Value::from(""), Value::from(false)] {
            let store = scan(&[row("A", 4), row("A", falsy.clone()), row("A", 5), row("A", 2)]);
            assert_eq!(sales_of(&store), vec![Value::from(7)], "{falsy:?}");
        }
    }

    #[test]
    fn nan_total_counts_as_zero_for_the_next_number() {
        let store = scan(&[row("A", 1), row("A", f64::NAN)]);
        assert!(sales_of(&store)[0].as_number().is_some_and(f64::is_nan));

        let store = scan(&[row("A", 1), row("A", f64::NAN), row("A", 3)]);
        assert_eq!(sales_of(&store), vec![Value::from(3)]);
    }

    #[test]
    fn snapshot_does_not_consume_state() {
        let mut store = store(KeyMode::Typed);
        store.update(&row("A", 1));
        let first = store.snapshot();
        assert_eq!(first, store.snapshot());
        store.update(&row("A", 1));
        assert_eq!(sales_of(&store), vec![Value::from(2)]);
    }

    #[test]
    fn merge_matches_sequential_scan_at_every_split() {
        let rows = vec![
            row("A", 1),
            row("B", 2),
            row("A", "N/A"),
            row("C", 4),
            row("A", 3),
            row("B", Value::Blank),
            row("C", true),
            row("A", 0.25),
            row("D", 6),
            row("C", 5),
            row("B", 7),
            row("D", ""),
            row("D", 8),
        ];
        let sequential = scan(&rows).snapshot();

        for split in 0..=rows.len() {
            let mut head = store(KeyMode::Composite);
            let mut tail = shard();
            rows[..split].iter().for_each(|r| head.update(r));
            rows[split..].iter().for_each(|r| tail.update(r));
            head.merge(tail).unwrap();
            assert_eq!(head.snapshot(), sequential, "split at {split}");
        }
    }

    #[test]
    fn later_shard_numbers_append_to_earlier_text() {
        let mut head = store(KeyMode::Composite);
        head.update(&row("A", "N/A"));
        let mut tail = shard();
        tail.update(&row("A", 5));
        tail.update(&row("A", 2));
        head.merge(tail).unwrap();
        assert_eq!(sales_of(&head), vec![Value::from("N/A52")]);
    }

    #[test]
    fn merged_shard_stores_stay_mergeable() {
        let rows = [row("A", true), row("A", 2), row("A", "x"), row("A", 3), row("A", 4)];
        let sequential = scan(&rows).snapshot();

        let mut middle = shard();
        rows[1..3].iter().for_each(|r| middle.update(r));
        let mut last = shard();
        rows[3..].iter().for_each(|r| last.update(r));
        middle.merge(last).unwrap();

        let mut head = store(KeyMode::Composite);
        head.update(&rows[0]);
        head.merge(middle).unwrap();
        assert_eq!(head.snapshot(), sequential);
    }

    #[test]
    fn merge_requires_a_shard_store() {
        let mut head = store(KeyMode::Composite);
        head.update(&row("A", 1));
        let mut plain = store(KeyMode::Composite);
        plain.update(&row("A", 2));
        assert_eq!(head.merge(plain), Err(AggregateError::NotAShardStore));
    }
}
