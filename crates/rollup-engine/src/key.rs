use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::value::Value;

/// Separator placed between category values in a composite key.
pub const KEY_SEPARATOR: char = '_';

/// How records are assigned to groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyMode {
    /// Group by the `_`-joined string form of the category values.
    ///
    /// This is lossy: `"a_b" + "c"` collides with `"a" + "b_c"`, and the number `1` collides with
    /// the text `"1"`.
    #[default]
    Composite,
    /// Group by the typed tuple of category values. No separator or type collisions.
    Typed,
}

/// Joins the string forms of `record`'s values at `category_keys` with [`KEY_SEPARATOR`].
///
/// Uses the full requested key list; names the record does not carry contribute an empty
/// segment.
pub fn compose_key(record: &Record, category_keys: &[String]) -> String {
    let mut key = String::new();
    for (idx, name) in category_keys.iter().enumerate() {
        if idx > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(&record.get_or_blank(name).to_key_string());
    }
    key
}

/// One typed component of a [`GroupKey::Typed`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Blank,
    Number(u64),
    Text(String),
    Bool(bool),
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Blank => KeyPart::Blank,
            Value::Number(n) => KeyPart::Number(Value::canonical_number_bits(*n)),
            Value::Text(s) => KeyPart::Text(s.clone()),
            Value::Bool(b) => KeyPart::Bool(*b),
        }
    }
}

/// Identity of a group inside an accumulator store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Composite(String),
    Typed(Vec<KeyPart>),
}

impl GroupKey {
    pub fn for_record(record: &Record, category_keys: &[String], mode: KeyMode) -> Self {
        match mode {
            KeyMode::Composite => GroupKey::Composite(compose_key(record, category_keys)),
            KeyMode::Typed => GroupKey::Typed(
                category_keys
                    .iter()
                    .map(|name| KeyPart::from(record.get_or_blank(name)))
                    .collect(),
            ),
        }
    }
}
