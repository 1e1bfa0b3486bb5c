//! Map city-specific raw records onto canonical records.
//!
//! Each city publishes its datasets with its own column names. A
//! [`SchemaMap`] describes, per dataset, how to classify a row into a
//! [`RecordType`], where to find the property identifier and timestamp, and
//! which columns to keep under which canonical names. City differences live
//! entirely in this configuration.
//!
//! Rows that cannot be classified are rejected with a [`SchemaError`] and the
//! batch carries on. Individual columns that are unmapped or cannot be
//! converted are dropped with a warning.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::{debug, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CanonicalRecord, FieldValue, PropertyId, RawRecord, RawValue, RecordType};

const NAIVE_DATETIME_FORMATS: [&str; 3] =
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];
const NAIVE_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Target type for a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum FieldKind {
    /// Whole number.
    Integer,
    /// Floating-point number.
    Float,
    /// Free text.
    Text,
    /// Boolean flag; accepts `true`/`false`, `yes`/`no`, `y`/`n` and `1`/`0`.
    Boolean,
    /// Point in time, parsed like the record timestamp.
    Timestamp,
}

/// Canonical name and type for one raw column.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldMapping {
    /// Name the value is stored under in the canonical payload.
    pub canonical: String,
    /// Type the raw value is converted to.
    pub kind: FieldKind,
}

impl FieldMapping {
    /// Build a mapping.
    pub fn new(canonical: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            canonical: canonical.into(),
            kind,
        }
    }
}

/// How to read one dataset.
///
/// The record type comes from `record_type_field` when that column holds a
/// value listed in `record_type_values` (matched case-insensitively) or a
/// canonical record type name. Otherwise the fixed `record_type` applies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SourceSchema {
    /// Record type used for every row of the dataset.
    pub record_type: Option<RecordType>,
    /// Column whose value selects the record type per row.
    pub record_type_field: Option<String>,
    /// Column values mapped to record types, compared ignoring ASCII case.
    pub record_type_values: BTreeMap<String, RecordType>,
    /// Column holding the property identifier.
    pub property_id_field: String,
    /// Column holding the event timestamp.
    pub timestamp_field: String,
    /// Raw column name to canonical mapping.
    pub fields: BTreeMap<String, FieldMapping>,
}

impl SourceSchema {
    /// Schema assigning every row the same record type.
    pub fn fixed(
        record_type: RecordType,
        property_id_field: impl Into<String>,
        timestamp_field: impl Into<String>,
    ) -> Self {
        Self {
            record_type: Some(record_type),
            property_id_field: property_id_field.into(),
            timestamp_field: timestamp_field.into(),
            ..Self::default()
        }
    }

    /// Add a column mapping, consuming and returning the schema.
    #[must_use]
    pub fn with_field(
        mut self,
        raw: impl Into<String>,
        canonical: impl Into<String>,
        kind: FieldKind,
    ) -> Self {
        self.fields
            .insert(raw.into(), FieldMapping::new(canonical, kind));
        self
    }

    /// Select the record type from a column, consuming and returning the schema.
    #[must_use]
    pub fn with_record_type_field(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = (String, RecordType)>,
    ) -> Self {
        self.record_type_field = Some(field.into());
        self.record_type_values = values
            .into_iter()
            .map(|(value, kind)| (value.to_lowercase(), kind))
            .collect();
        self
    }

    fn classify(&self, source: &str, raw: &RawRecord) -> Result<RecordType, SchemaError> {
        let selector = self
            .record_type_field
            .as_ref()
            .and_then(|field| raw.fields.get(field))
            .and_then(RawValue::to_text);
        if let Some(value) = selector.as_deref() {
            let mapped = self
                .record_type_values
                .iter()
                .find(|(candidate, _)| candidate.eq_ignore_ascii_case(value));
            if let Some((_, kind)) = mapped {
                return Ok(*kind);
            }
            if let Ok(kind) = value.parse::<RecordType>() {
                return Ok(kind);
            }
        }
        self.record_type
            .ok_or_else(|| SchemaError::UnclassifiedRecordType {
                source_name: source.to_owned(),
                value: selector,
            })
    }
}

/// Dataset name to [`SourceSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct SchemaMap {
    sources: BTreeMap<String, SourceSchema>,
}

impl SchemaMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the schema for a dataset, consuming and returning the map.
    #[must_use]
    pub fn with_source(mut self, name: impl Into<String>, schema: SourceSchema) -> Self {
        self.insert(name, schema);
        self
    }

    /// Register the schema for a dataset.
    pub fn insert(&mut self, name: impl Into<String>, schema: SourceSchema) {
        self.sources.insert(name.into(), schema);
    }

    /// Look up the schema for a dataset.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SourceSchema> {
        self.sources.get(name)
    }

    /// Iterate over dataset names and schemas.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SourceSchema)> {
        self.sources
            .iter()
            .map(|(name, schema)| (name.as_str(), schema))
    }

    /// Normalize a single raw record.
    ///
    /// # Errors
    /// Returns [`SchemaError`] when the record's dataset is unknown, its
    /// record type cannot be classified, or its property id or timestamp is
    /// missing or unreadable.
    pub fn normalize_record(&self, raw: &RawRecord) -> Result<CanonicalRecord, SchemaError> {
        let schema = self
            .sources
            .get(&raw.source)
            .ok_or_else(|| SchemaError::UnknownSource {
                source_name: raw.source.clone(),
            })?;
        let record_type = schema.classify(&raw.source, raw)?;
        let property_id = raw
            .fields
            .get(&schema.property_id_field)
            .filter(|value| !value.is_blank())
            .and_then(RawValue::to_text)
            .ok_or_else(|| SchemaError::MissingPropertyId {
                source_name: raw.source.clone(),
                field: schema.property_id_field.clone(),
            })?;
        let timestamp_raw = raw.fields.get(&schema.timestamp_field);
        let timestamp = timestamp_raw.and_then(parse_timestamp).ok_or_else(|| {
            SchemaError::InvalidTimestamp {
                source_name: raw.source.clone(),
                field: schema.timestamp_field.clone(),
                value: timestamp_raw.and_then(RawValue::to_text),
            }
        })?;

        let mut record = CanonicalRecord::new(PropertyId::new(property_id), record_type, timestamp);
        for (name, value) in &raw.fields {
            if name == &schema.property_id_field
                || name == &schema.timestamp_field
                || schema.record_type_field.as_ref() == Some(name)
            {
                continue;
            }
            if value.is_blank() {
                debug!("Dropped blank field: source={}, field={name}", raw.source);
                continue;
            }
            let Some(mapping) = schema.fields.get(name) else {
                warn!(
                    "Dropped unmapped field: source={}, field={name}",
                    raw.source
                );
                continue;
            };
            match convert(value, mapping.kind) {
                Some(converted) => record = record.with_field(mapping.canonical.clone(), converted),
                None => warn!(
                    "Dropped field with unconvertible value: source={}, field={name}, kind={:?}, value={value:?}",
                    raw.source, mapping.kind
                ),
            }
        }
        Ok(record)
    }
}

/// A raw record the normalizer skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    /// Position of the record in the input batch.
    pub index: usize,
    /// Why it was skipped.
    pub error: SchemaError,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalized {
    /// Canonical records in input order.
    pub records: Vec<CanonicalRecord>,
    /// Records skipped because they could not be classified.
    pub rejected: Vec<RejectedRecord>,
}

/// Error raised when a raw record cannot be classified.
///
/// These errors are per record: the normalizer skips the record and keeps
/// going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// No schema is configured for the record's dataset.
    #[error("no schema configured for source '{source_name}'")]
    UnknownSource {
        /// Dataset name found on the record.
        source_name: String,
    },
    /// The record type could not be determined.
    #[error("cannot classify record type for source '{source_name}' (value {value:?})")]
    UnclassifiedRecordType {
        /// Dataset name.
        source_name: String,
        /// Value of the selector column, when present.
        value: Option<String>,
    },
    /// The property identifier column is missing or blank.
    #[error("record from '{source_name}' has no property id in column '{field}'")]
    MissingPropertyId {
        /// Dataset name.
        source_name: String,
        /// Expected column.
        field: String,
    },
    /// The timestamp column is missing or unreadable.
    #[error("record from '{source_name}' has invalid timestamp {value:?} in column '{field}'")]
    InvalidTimestamp {
        /// Dataset name.
        source_name: String,
        /// Expected column.
        field: String,
        /// Raw value, when present.
        value: Option<String>,
    },
}

/// Normalize a batch of raw records.
///
/// Records that fail classification are logged, collected in
/// [`Normalized::rejected`], and skipped. The input is not modified.
///
/// # Examples
/// ```
/// use nuisance_core::{normalize, FieldKind, RawRecord, RawValue, RecordType, SchemaMap, SourceSchema};
///
/// let schema = SchemaMap::new().with_source(
///     "complaints",
///     SourceSchema::fixed(RecordType::Complaint, "parcel", "opened")
///         .with_field("type", "category", FieldKind::Text),
/// );
/// let raw = vec![
///     RawRecord::new("complaints")
///         .with("parcel", RawValue::Text("P1".into()))
///         .with("opened", RawValue::Text("2024-05-01".into()))
///         .with("type", RawValue::Text("Noise".into())),
///     RawRecord::new("unknown"),
/// ];
/// let normalized = normalize(&raw, &schema);
/// assert_eq!(normalized.records.len(), 1);
/// assert_eq!(normalized.rejected.len(), 1);
/// ```
#[must_use]
pub fn normalize(raw_records: &[RawRecord], schema_map: &SchemaMap) -> Normalized {
    let mut normalized = Normalized::default();
    for (index, raw) in raw_records.iter().enumerate() {
        match schema_map.normalize_record(raw) {
            Ok(record) => normalized.records.push(record),
            Err(error) => {
                warn!("Skipped raw record: index={index} ({error})");
                normalized.rejected.push(RejectedRecord { index, error });
            }
        }
    }
    normalized
}

/// Parse a timestamp from RFC 3339, common date formats, or Unix seconds.
///
/// Naive values are taken as UTC.
///
/// # Examples
/// ```
/// use nuisance_core::{RawValue, parse_timestamp};
///
/// let parsed = parse_timestamp(&RawValue::Text("2024-06-01".to_owned()));
/// assert_eq!(parsed.map(|at| at.to_rfc3339()).as_deref(), Some("2024-06-01T00:00:00+00:00"));
/// assert!(parse_timestamp(&RawValue::Bool(true)).is_none());
/// ```
#[must_use]
pub fn parse_timestamp(value: &RawValue) -> Option<DateTime<Utc>> {
    match value {
        RawValue::Integer(seconds) => Utc.timestamp_opt(*seconds, 0).single(),
        RawValue::Text(text) => parse_timestamp_text(text.trim()),
        RawValue::Null | RawValue::Bool(_) | RawValue::Float(_) => None,
    }
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    NAIVE_DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(text, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    })
}

#[expect(
    clippy::float_arithmetic,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "integer columns may arrive as whole floats and are checked before casting"
)]
fn convert(value: &RawValue, kind: FieldKind) -> Option<FieldValue> {
    match (kind, value) {
        (FieldKind::Integer, RawValue::Integer(number)) => Some(FieldValue::Integer(*number)),
        (FieldKind::Integer, RawValue::Float(number))
            if number.is_finite() && number.fract() == 0.0 && number.abs() < 9.0e15 =>
        {
            Some(FieldValue::Integer(*number as i64))
        }
        (FieldKind::Integer, RawValue::Text(text)) => {
            text.trim().parse().ok().map(FieldValue::Integer)
        }
        (FieldKind::Integer, RawValue::Bool(flag)) => Some(FieldValue::Integer(i64::from(*flag))),
        (FieldKind::Float, RawValue::Integer(number)) => Some(FieldValue::Float(*number as f64)),
        (FieldKind::Float, RawValue::Float(number)) if number.is_finite() => {
            Some(FieldValue::Float(*number))
        }
        (FieldKind::Float, RawValue::Text(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map(FieldValue::Float),
        (FieldKind::Text, other) => other.to_text().map(FieldValue::Text),
        (FieldKind::Boolean, RawValue::Bool(flag)) => Some(FieldValue::Boolean(*flag)),
        (FieldKind::Boolean, RawValue::Integer(0)) => Some(FieldValue::Boolean(false)),
        (FieldKind::Boolean, RawValue::Integer(1)) => Some(FieldValue::Boolean(true)),
        (FieldKind::Boolean, RawValue::Text(text)) => parse_flag(text).map(FieldValue::Boolean),
        (FieldKind::Timestamp, other) => parse_timestamp(other).map(FieldValue::Timestamp),
        _ => None,
    }
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}
