use serde_json::Value;

/// Column suffix naming the field used to find an existing piece to update.
pub const KEY_MARKER: &str = ":key";

/// One input row, keyed by column name, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

/// The key column of a record, with the marker already stripped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyColumn<'a> {
    pub field: &'a str,
    pub value: &'a Value,
}

impl KeyColumn<'_> {
    /// The lookup value as text, or `None` when the column is blank.
    pub fn lookup_value(&self) -> Option<String> {
        match self.value {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Columns by field name, the key marker stripped. `slug` and `slug:key`
    /// both come out as `slug`.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().map(|(n, v)| (strip_key_marker(n), v))
    }

    /// The first column carrying the key marker, if any.
    pub fn key(&self) -> Option<KeyColumn<'_>> {
        self.iter().find_map(|(name, value)| {
            name.strip_suffix(KEY_MARKER)
                .map(|field| KeyColumn { field, value })
        })
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

pub fn strip_key_marker(name: &str) -> &str {
    name.strip_suffix(KEY_MARKER).unwrap_or(name)
}
