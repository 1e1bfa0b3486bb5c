//! Record provider backed by a city's JSON Lines datasets.

use std::collections::BTreeMap;

use log::{info, warn};
use nuisance_core::{
    PropertyId, ProviderError, RawRecord, RawValue, RecordProvider, SourceSchema, TimeWindow,
    parse_timestamp,
};

use crate::config::CityConfig;
use crate::dataset::{DatasetError, load_jsonl};

/// Serves raw rows from datasets loaded into memory.
///
/// Rows are indexed by the property id column named in each dataset's
/// schema. Rows without a property id cannot be attributed to any property
/// and are dropped at load time. Rows whose timestamp cannot be parsed are
/// always returned so the normalizer can reject and count them.
#[derive(Debug, Clone, Default)]
pub struct FileRecordProvider {
    rows: BTreeMap<PropertyId, Vec<IndexedRow>>,
    unattributed: usize,
}

#[derive(Debug, Clone)]
struct IndexedRow {
    record: RawRecord,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

impl FileRecordProvider {
    /// Load every dataset listed in `config`.
    ///
    /// # Errors
    /// Returns [`DatasetError`] when a dataset cannot be read.
    pub fn from_config(config: &CityConfig) -> Result<Self, DatasetError> {
        let mut provider = Self::default();
        for (name, dataset) in &config.datasets {
            let records = load_jsonl(&dataset.path, name)?;
            provider.extend(&dataset.schema, records);
        }
        if provider.unattributed > 0 {
            warn!(
                "dropped {} rows without a property id",
                provider.unattributed
            );
        }
        info!(
            "indexed records for {} properties in {}",
            provider.rows.len(),
            config.city_name
        );
        Ok(provider)
    }

    /// Index `records` read with `schema`.
    pub fn extend(&mut self, schema: &SourceSchema, records: impl IntoIterator<Item = RawRecord>) {
        for record in records {
            let property_id = record
                .fields
                .get(&schema.property_id_field)
                .filter(|value| !value.is_blank())
                .and_then(RawValue::to_text);
            let Some(id) = property_id else {
                self.unattributed += 1;
                continue;
            };
            let timestamp = record
                .fields
                .get(&schema.timestamp_field)
                .and_then(parse_timestamp);
            self.rows
                .entry(PropertyId::new(id))
                .or_default()
                .push(IndexedRow { record, timestamp });
        }
    }

    /// Every property with at least one row, in sorted order.
    #[must_use]
    pub fn property_ids(&self) -> Vec<PropertyId> {
        self.rows.keys().cloned().collect()
    }

    /// Total number of indexed rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// Rows dropped because they named no property.
    #[must_use]
    pub const fn unattributed_rows(&self) -> usize {
        self.unattributed
    }
}

impl RecordProvider for FileRecordProvider {
    fn fetch(
        &self,
        property_id: &PropertyId,
        window: TimeWindow,
    ) -> Result<Vec<RawRecord>, ProviderError> {
        Ok(self
            .rows
            .get(property_id)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.timestamp.is_none_or(|at| window.contains(at)))
                    .map(|row| row.record.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use nuisance_core::RecordType;
    use rstest::rstest;

    fn row(id: Option<&str>, date: &str) -> RawRecord {
        let base = RawRecord::new("complaints").with("date", RawValue::Text(date.to_owned()));
        match id {
            Some(value) => base.with("property_id", RawValue::Text(value.to_owned())),
            None => base,
        }
    }

    fn provider() -> FileRecordProvider {
        let schema = SourceSchema::fixed(RecordType::Complaint, "property_id", "date");
        let mut provider = FileRecordProvider::default();
        provider.extend(
            &schema,
            [
                row(Some("P1"), "2024-01-10"),
                row(Some("P1"), "2024-06-20"),
                row(Some("P1"), "not a date"),
                row(Some("P2"), "2023-01-01"),
                row(None, "2024-01-10"),
            ],
        );
        provider
    }

    #[rstest]
    fn indexes_rows_by_property() {
        let provider = provider();
        assert_eq!(
            provider.property_ids(),
            vec![PropertyId::from("P1"), PropertyId::from("P2")]
        );
        assert_eq!(provider.row_count(), 4);
        assert_eq!(provider.unattributed_rows(), 1);
    }

    #[rstest]
    fn filters_by_window_but_keeps_undated_rows() {
        let end = Utc
            .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .single()
            .expect("valid date");
        let rows = provider()
            .fetch(&PropertyId::from("P1"), TimeWindow::lookback(end, 365))
            .expect("fetch rows");
        let dates: Vec<_> = rows
            .iter()
            .filter_map(|row| row.fields.get("date").and_then(RawValue::to_text))
            .collect();
        assert_eq!(dates, vec!["2024-01-10".to_owned(), "not a date".to_owned()]);
    }

    #[rstest]
    fn unknown_properties_have_no_rows() {
        let end = Utc
            .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .single()
            .expect("valid date");
        let rows = provider()
            .fetch(&PropertyId::from("P9"), TimeWindow::lookback(end, 30))
            .expect("fetch rows");
        assert!(rows.is_empty());
    }
}
