use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Caller-chosen grouping: which fields identify a group and which fields are summed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingSpec {
    #[serde(default)]
    pub category_keys: Vec<String>,
    #[serde(default)]
    pub value_keys: Vec<String>,
}

impl GroupingSpec {
    pub fn new<C, V>(category_keys: C, value_keys: V) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            category_keys: category_keys.into_iter().map(Into::into).collect(),
            value_keys: value_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Short human-readable form used in progress messages.
    pub fn describe(&self) -> String {
        format!(
            "categoryKeys [{}] and valueKeys [{}]",
            self.category_keys.join(", "),
            self.value_keys.join(", ")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldRole {
    Category,
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedField {
    pub name: String,
    pub role: FieldRole,
}

/// Outcome of checking a [`GroupingSpec`] against a sample record.
///
/// Requested names the sample does not carry are dropped rather than rejected, so callers can
/// ask for speculative groupings without checking the schema first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaProbe {
    pub fields: Vec<ValidatedField>,
    pub unknown: Vec<String>,
}

impl SchemaProbe {
    /// Category fields come first, then value fields, each in request order. A name keeps the
    /// first role it was validated under.
    pub fn validate(sample: &Record, spec: &GroupingSpec) -> Self {
        let mut probe = SchemaProbe::default();

        let requested = spec
            .category_keys
            .iter()
            .map(|name| (name, FieldRole::Category))
            .chain(spec.value_keys.iter().map(|name| (name, FieldRole::Value)));

        for (name, role) in requested {
            if !sample.contains_field(name) {
                if !probe.unknown.contains(name) {
                    probe.unknown.push(name.clone());
                }
                continue;
            }
            if probe.fields.iter().any(|f| f.name == *name) {
                continue;
            }
            probe.fields.push(ValidatedField {
                name: name.clone(),
                role,
            });
        }

        if !probe.unknown.is_empty() {
            log::warn!(
                "ignoring fields missing from the dataset schema: [{}]",
                probe.unknown.join(", ")
            );
        }

        probe
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}
