use chrono::NaiveDate;
use itertools::Itertools;
use serde_json::Value;

use crate::import::{ConversionMode, Record, RecordError};
use crate::pieces::{slugify, Piece};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Slug,
    Boolean,
    Integer,
    Float,
    /// Comma-separated in text, an array in form input.
    Tags,
    /// `YYYY-MM-DD`.
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// The fields a piece type accepts, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Title, slug, publication and trash state, and tags.
    pub fn pieces() -> Self {
        Self::new(vec![
            Field::new("title", FieldKind::String),
            Field::new("slug", FieldKind::Slug),
            Field::new("published", FieldKind::Boolean),
            Field::new("trash", FieldKind::Boolean),
            Field::new("tags", FieldKind::Tags),
        ])
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Converts the schema fields present in `record` onto `piece`. Fields the
    /// record doesn't mention are left as they are; columns the schema doesn't
    /// know are ignored. A field given both plainly and as the key column is
    /// rejected rather than letting column order decide.
    pub fn convert(
        &self,
        mode: ConversionMode,
        record: &Record,
        piece: &mut Piece,
    ) -> Result<(), RecordError> {
        if let Some(name) = record.fields().map(|(name, _)| name).duplicates().next() {
            return Err(RecordError::convert(name, "column appears more than once"));
        }

        for (name, raw) in record.fields() {
            let Some(field) = self.field(name) else {
                continue;
            };
            let value = convert_value(field, mode, raw)
                .map_err(|message| RecordError::convert(&field.name, message))?;
            piece.set(&field.name, value);
        }
        Ok(())
    }
}

fn convert_value(field: &Field, mode: ConversionMode, raw: &Value) -> Result<Value, String> {
    match (mode, raw) {
        (_, Value::String(s)) => from_text(field.kind, s),
        (ConversionMode::String, other) => from_text(field.kind, &other.to_string()),
        (ConversionMode::Form, structured) => from_form(field.kind, structured),
    }
}

fn from_text(kind: FieldKind, text: &str) -> Result<Value, String> {
    let text = text.trim();
    if text.is_empty() {
        // blank cells clear the field, except where a value is mandatory
        return match kind {
            FieldKind::Boolean => Ok(Value::Bool(false)),
            FieldKind::Tags => Ok(Value::Array(Vec::new())),
            _ => Ok(Value::Null),
        };
    }

    match kind {
        FieldKind::String => Ok(Value::from(text)),
        FieldKind::Slug => Ok(Value::from(slugify(text))),
        FieldKind::Boolean => parse_bool(text).map(Value::Bool),
        FieldKind::Integer => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("{text:?} is not an integer")),
        FieldKind::Float => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("{text:?} is not a number")),
        FieldKind::Tags => Ok(Value::from(
            text.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unique()
                .collect_vec(),
        )),
        FieldKind::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(|d| Value::from(d.format("%Y-%m-%d").to_string()))
            .map_err(|_| format!("{text:?} is not a YYYY-MM-DD date")),
    }
}

fn from_form(kind: FieldKind, value: &Value) -> Result<Value, String> {
    match (kind, value) {
        (_, Value::Null) => from_text(kind, ""),
        (FieldKind::Boolean, Value::Bool(_)) => Ok(value.clone()),
        (FieldKind::Integer, Value::Number(n)) => n
            .as_i64()
            .map(Value::from)
            .ok_or_else(|| format!("{n} is not an integer")),
        (FieldKind::Float, Value::Number(_)) => Ok(value.clone()),
        (FieldKind::Tags, Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                other => Err(format!("tag {other} is not a string")),
            })
            .filter_ok(|t| !t.is_empty())
            .collect::<Result<Vec<_>, _>>()
            .map(|tags| Value::from(tags.into_iter().unique().collect_vec())),
        (kind, other) => from_text(kind, &other.to_string()),
    }
}

fn parse_bool(text: &str) -> Result<bool, String> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err(format!("{text:?} is not a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::pieces()
            .with_field(Field::new("price", FieldKind::Float))
            .with_field(Field::new("stock", FieldKind::Integer))
            .with_field(Field::new("released", FieldKind::Date))
    }

    #[test]
    fn converts_only_present_fields() {
        let mut piece = Piece::new();
        piece.slug = "keep-me".to_string();
        let record: Record = [
            ("title", "Cheese #00001"),
            ("published", "no"),
            ("tags", "soft, french,soft"),
            ("unknown", "ignored"),
        ]
        .into_iter()
        .collect();

        schema()
            .convert(ConversionMode::String, &record, &mut piece)
            .unwrap();

        assert_eq!(piece.title, "Cheese #00001");
        assert_eq!(piece.slug, "keep-me");
        assert!(!piece.published);
        assert_eq!(piece.get("tags"), Some(json!(["soft", "french"])));
        assert_eq!(piece.get("unknown"), None);
    }

    #[test]
    fn key_column_converts_as_its_field() {
        let mut piece = Piece::new();
        let record: Record = [("slug:key", "Brie De Meaux")].into_iter().collect();
        schema()
            .convert(ConversionMode::String, &record, &mut piece)
            .unwrap();
        assert_eq!(piece.slug, "brie-de-meaux");
    }

    #[test]
    fn field_and_key_column_together_are_rejected() {
        let mut piece = Piece::new();
        let record: Record = [("slug:key", "brie"), ("title", "Brie"), ("slug", "camembert")]
            .into_iter()
            .collect();
        let err = schema()
            .convert(ConversionMode::String, &record, &mut piece)
            .unwrap_err();
        assert_eq!(err.to_string(), "slug: column appears more than once");
        assert_eq!(piece.slug, "");
    }

    #[test]
    fn text_conversion_errors_name_the_field() {
        let mut piece = Piece::new();
        let record: Record = [("stock", "lots")].into_iter().collect();
        let err = schema()
            .convert(ConversionMode::String, &record, &mut piece)
            .unwrap_err();
        assert_eq!(err.to_string(), "stock: \"lots\" is not an integer");

        let record: Record = [("released", "31/12/2024")].into_iter().collect();
        assert!(schema()
            .convert(ConversionMode::String, &record, &mut piece)
            .is_err());
    }

    #[test]
    fn blank_text_clears_optional_fields() {
        let mut piece = Piece::new();
        piece.set("price", json!(3.5));
        let record: Record = [("price", ""), ("trash", "")].into_iter().collect();
        schema()
            .convert(ConversionMode::String, &record, &mut piece)
            .unwrap();
        assert_eq!(piece.get("price"), None);
        assert!(!piece.trash);
    }

    #[test]
    fn form_mode_takes_structured_values() {
        let mut piece = Piece::new();
        let record: Record = [
            ("trash", json!(true)),
            ("stock", json!(12)),
            ("price", json!(2.25)),
            ("tags", json!(["a", " b ", "a"])),
            ("released", json!("2024-02-29")),
        ]
        .into_iter()
        .collect();

        schema()
            .convert(ConversionMode::Form, &record, &mut piece)
            .unwrap();

        assert!(piece.trash);
        assert_eq!(piece.get("stock"), Some(json!(12)));
        assert_eq!(piece.get("price"), Some(json!(2.25)));
        assert_eq!(piece.get("tags"), Some(json!(["a", "b"])));
        assert_eq!(piece.get("released"), Some(json!("2024-02-29")));

        let record: Record = [("stock", json!(1.5))].into_iter().collect();
        assert!(schema()
            .convert(ConversionMode::Form, &record, &mut piece)
            .is_err());
    }
}
