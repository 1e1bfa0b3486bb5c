//! Raw and canonical record shapes.
//!
//! [`RawRecord`]s arrive from city datasets with arbitrary field names.
//! The normalizer turns them into [`CanonicalRecord`]s, which are immutable
//! and form the append-only input ledger for feature construction.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::PropertyId;

/// Kind of event a canonical record describes.
///
/// # Examples
/// ```
/// use nuisance_core::RecordType;
///
/// assert_eq!("complaint".parse::<RecordType>(), Ok(RecordType::Complaint));
/// assert_eq!(RecordType::EnforcementAction.as_str(), "enforcement_action");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum RecordType {
    /// A nuisance complaint (noise, parking, trash, ...).
    Complaint,
    /// A rental licence or permit event.
    Permit,
    /// Static property attributes such as bedroom count.
    PropertyAttribute,
    /// A citation or other enforcement action.
    EnforcementAction,
}

impl RecordType {
    /// Every record type in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Complaint,
        Self::Permit,
        Self::PropertyAttribute,
        Self::EnforcementAction,
    ];

    /// Return the record type as a `snake_case` `&str`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complaint => "complaint",
            Self::Permit => "permit",
            Self::PropertyAttribute => "property_attribute",
            Self::EnforcementAction => "enforcement_action",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| format!("unknown record type '{s}'"))
    }
}

/// Typed payload value carried by a canonical record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(tag = "kind", content = "value", rename_all = "snake_case")
)]
pub enum FieldValue {
    /// Whole number.
    Integer(i64),
    /// Floating-point number.
    Float(f64),
    /// Free text.
    Text(String),
    /// Boolean flag.
    Boolean(bool),
    /// Point in time.
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Numeric view of the value, when one exists.
    ///
    /// Booleans map to `0.0`/`1.0`; text and timestamps have no numeric view.
    #[expect(
        clippy::cast_precision_loss,
        reason = "payload integers are small counts and codes"
    )]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Boolean(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            Self::Text(_) | Self::Timestamp(_) => None,
        }
    }

    /// Boolean view of the value, when one exists.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(flag) => Some(*flag),
            Self::Integer(value) => Some(*value != 0),
            Self::Float(_) | Self::Text(_) | Self::Timestamp(_) => None,
        }
    }

    /// Text view of the value, when one exists.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A normalized, source-agnostic input event.
///
/// Records are immutable once built; [`CanonicalRecord::with_field`]
/// consumes the record and returns a new one so construction reads
/// fluently.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use nuisance_core::{CanonicalRecord, FieldValue, PropertyId, RecordType};
///
/// let at = Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap();
/// let record = CanonicalRecord::new(PropertyId::from("P1"), RecordType::Complaint, at)
///     .with_field("category", FieldValue::Text("noise".into()));
/// assert_eq!(record.field("category").and_then(FieldValue::as_text), Some("noise"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CanonicalRecord {
    property_id: PropertyId,
    record_type: RecordType,
    timestamp: DateTime<Utc>,
    payload: BTreeMap<String, FieldValue>,
}

impl CanonicalRecord {
    /// Create a record with an empty payload.
    #[must_use]
    pub const fn new(
        property_id: PropertyId,
        record_type: RecordType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            property_id,
            record_type,
            timestamp,
            payload: BTreeMap::new(),
        }
    }

    /// Return a copy of the record with `name` set to `value`.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.payload.insert(name.into(), value);
        self
    }

    /// Property the record belongs to.
    #[must_use]
    pub const fn property_id(&self) -> &PropertyId {
        &self.property_id
    }

    /// Kind of event.
    #[must_use]
    pub const fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// When the event happened.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Look up a payload field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.payload.get(name)
    }

    /// Borrow the full payload.
    #[must_use]
    pub const fn payload(&self) -> &BTreeMap<String, FieldValue> {
        &self.payload
    }
}

/// Untyped value as read from a source dataset.
///
/// Deserializes directly from JSON scalars.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
pub enum RawValue {
    /// Explicit null or an empty cell.
    Null,
    /// Boolean cell.
    Bool(bool),
    /// Integer cell.
    Integer(i64),
    /// Floating-point cell.
    Float(f64),
    /// Text cell.
    Text(String),
}

impl RawValue {
    /// Report whether the value carries no information.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.trim().is_empty(),
            Self::Bool(_) | Self::Integer(_) | Self::Float(_) => false,
        }
    }

    /// Render scalar values as text, e.g. for identifiers stored as numbers.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(flag) => Some(flag.to_string()),
            Self::Integer(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Text(text) => Some(text.trim().to_owned()),
        }
    }
}

/// One row from a city dataset before normalization.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawRecord {
    /// Name of the dataset the row came from, used to pick a schema.
    pub source: String,
    /// Column name to cell value.
    pub fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    /// Create an empty row for `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a cell, consuming and returning the row.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: RawValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}
