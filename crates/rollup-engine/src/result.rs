use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::record::Record;
use crate::schema::SchemaProbe;
use crate::store::{Accumulator, AccumulatorStore};

/// One output group.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Composite key string (display form, even when grouping used typed keys).
    pub key: String,
    /// Number of input records folded into this group.
    pub rows: usize,
    pub record: Record,
}

/// Output of one aggregation run: groups in first-seen key order.
///
/// Serializes as a plain array of the group records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    unknown_fields: Vec<String>,
    groups: Vec<Group>,
}

impl ResultSet {
    /// Field names present on every output record, category fields first.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Requested field names that were dropped because the dataset does not have them.
    pub fn unknown_fields(&self) -> &[String] {
        &self.unknown_fields
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Group> {
        self.groups.iter()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.groups.iter().map(|g| &g.record)
    }

    /// Looks up a group by its composite key string.
    ///
    /// With typed keys several groups can share a display key; the first one is returned.
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.groups
            .iter()
            .find(|g| g.key == key)
            .map(|g| &g.record)
    }

    pub fn into_records(self) -> Vec<Record> {
        self.groups.into_iter().map(|g| g.record).collect()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Group;
    type IntoIter = std::slice::Iter<'a, Group>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.groups.len()))?;
        for group in &self.groups {
            seq.serialize_element(&group.record)?;
        }
        seq.end()
    }
}

/// Flattens a finished store into its result set.
pub fn materialize(store: AccumulatorStore) -> ResultSet {
    let (probe, accumulators) = store.into_parts();
    let groups = accumulators
        .into_iter()
        .map(|acc| Group {
            record: acc.to_record(&probe.fields),
            rows: acc.rows,
            key: acc.display_key,
        })
        .collect();
    ResultSet {
        columns: probe.column_names(),
        unknown_fields: probe.unknown,
        groups,
    }
}

pub(crate) fn materialize_ref(probe: &SchemaProbe, accumulators: &[Accumulator]) -> ResultSet {
    ResultSet {
        columns: probe.column_names(),
        unknown_fields: probe.unknown.clone(),
        groups: accumulators
            .iter()
            .map(|acc| group_from(acc, probe))
            .collect(),
    }
}

fn group_from(acc: &Accumulator, probe: &SchemaProbe) -> Group {
    Group {
        key: acc.display_key.clone(),
        rows: acc.rows,
        record: acc.to_record(&probe.fields),
    }
}
