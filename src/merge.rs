// src/merge.rs
//
// Combines the two per-source snapshots into one unified view keyed by
// "Symbol". Records missing the key are dropped as data-quality filtering,
// not treated as an error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feed::{RawSnapshot, Record, SourceId};

/// Field carrying the merge key in upstream records.
pub const KEY_FIELD: &str = "Symbol";

/// Which source(s) contributed to a merged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Api1,
    Api2,
    Both,
}

/// One merged record on the wire: the winning source's fields flattened,
/// plus provenance and (when both sources reported it) the second source's
/// raw copy under `api2_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedRecord {
    #[serde(flatten)]
    pub fields: Record,
    pub source: SourceTag,
    pub sources: Vec<SourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api2_data: Option<Record>,
}

impl MergedRecord {
    pub fn reported_by(&self, id: SourceId) -> bool {
        self.sources.contains(&id)
    }
}

/// Point-in-time unified view of both sources, one entry per distinct symbol.
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedSnapshot {
    pub timestamp: DateTime<Utc>,
    pub records: BTreeMap<String, MergedRecord>,
}

impl UnifiedSnapshot {
    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn count_for(&self, id: SourceId) -> usize {
        self.records.values().filter(|r| r.reported_by(id)).count()
    }

    pub fn overlap(&self) -> usize {
        self.records.values().filter(|r| r.sources.len() > 1).count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Build the unified snapshot. Source 1 is inserted first; a symbol reported
/// by both keeps source 1's fields, accumulates provenance, and embeds the
/// source 2 record under `api2_data`. Always well-formed, even when both
/// inputs are absent.
pub fn merge(api1: Option<RawSnapshot>, api2: Option<RawSnapshot>) -> UnifiedSnapshot {
    let mut records: BTreeMap<String, MergedRecord> = BTreeMap::new();

    for record in record_rows(api1) {
        let Some(symbol) = symbol_of(&record) else {
            continue;
        };
        records.insert(
            symbol,
            MergedRecord {
                fields: record,
                source: SourceTag::Api1,
                sources: vec![SourceId::Api1],
                api2_data: None,
            },
        );
    }

    for record in record_rows(api2) {
        let Some(symbol) = symbol_of(&record) else {
            continue;
        };
        match records.get_mut(&symbol) {
            Some(existing) => {
                existing.sources.push(SourceId::Api2);
                existing.source = SourceTag::Both;
                existing.api2_data = Some(record);
            }
            None => {
                records.insert(
                    symbol,
                    MergedRecord {
                        fields: record,
                        source: SourceTag::Api2,
                        sources: vec![SourceId::Api2],
                        api2_data: None,
                    },
                );
            }
        }
    }

    UnifiedSnapshot {
        timestamp: Utc::now(),
        records,
    }
}

/// Normalize a raw payload to its record list: an object contributes its
/// `data` array, a bare array contributes itself, anything else is empty.
fn record_rows(raw: Option<RawSnapshot>) -> Vec<Record> {
    let rows = match raw {
        Some(Value::Array(rows)) => rows,
        Some(Value::Object(mut obj)) => match obj.remove("data") {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    rows.into_iter()
        .filter_map(|row| match row {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect()
}

fn symbol_of(record: &Record) -> Option<String> {
    match record.get(KEY_FIELD) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stock(symbol: &str, price: &str) -> Value {
        json!({ "Symbol": symbol, "Last Traded Price": price })
    }

    #[test]
    fn disjoint_keys_counts_add_up() {
        let api1 = json!({ "data": [stock("AAA", "10"), stock("BBB", "20")] });
        let api2 = json!({ "data": [stock("CCC", "30")] });

        let snapshot = merge(Some(api1), Some(api2));
        assert_eq!(snapshot.total(), 3);
        assert_eq!(snapshot.count_for(SourceId::Api1), 2);
        assert_eq!(snapshot.count_for(SourceId::Api2), 1);
        assert_eq!(snapshot.overlap(), 0);
    }

    #[test]
    fn shared_key_accumulates_provenance_and_embeds_api2_copy() {
        let api1 = json!({ "data": [stock("XYZ", "10")] });
        let api2 = json!({ "data": [json!({ "Symbol": "XYZ", "Last Traded Price": "11", "Volume": 5 })] });

        let snapshot = merge(Some(api1), Some(api2));
        assert_eq!(snapshot.overlap(), 1);

        let rec = &snapshot.records["XYZ"];
        assert_eq!(rec.source, SourceTag::Both);
        assert_eq!(rec.sources, vec![SourceId::Api1, SourceId::Api2]);
        // Source 1's fields win on the top level.
        assert_eq!(rec.fields["Last Traded Price"], json!("10"));
        // Source 2's raw record is embedded, not merged.
        let embedded = rec.api2_data.as_ref().expect("api2_data present");
        assert_eq!(embedded["Last Traded Price"], json!("11"));
        assert_eq!(embedded["Volume"], json!(5));
    }

    #[test]
    fn absent_source_equals_empty_list() {
        let api1 = json!({ "data": [stock("AAA", "10")] });

        let with_absent = merge(Some(api1.clone()), None);
        let with_empty = merge(Some(api1), Some(json!({ "data": [] })));

        assert_eq!(with_absent.total(), with_empty.total());
        assert_eq!(
            with_absent.records.keys().collect::<Vec<_>>(),
            with_empty.records.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn both_absent_yields_empty_snapshot() {
        let snapshot = merge(None, None);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.total(), 0);
        assert_eq!(snapshot.count_for(SourceId::Api1), 0);
        assert_eq!(snapshot.count_for(SourceId::Api2), 0);
        assert_eq!(snapshot.overlap(), 0);
    }

    #[test]
    fn records_without_symbol_are_skipped() {
        let api1 = json!({ "data": [
            json!({ "Last Traded Price": "10" }),
            json!({ "Symbol": "", "Last Traded Price": "11" }),
            stock("OK", "12"),
        ]});

        let snapshot = merge(Some(api1), None);
        assert_eq!(snapshot.total(), 1);
        assert!(snapshot.records.contains_key("OK"));
    }

    #[test]
    fn bare_array_and_non_list_payloads() {
        // A bare array is accepted as the record list.
        let snapshot = merge(Some(json!([stock("AAA", "1")])), None);
        assert_eq!(snapshot.total(), 1);

        // An object without a `data` array contributes nothing.
        let snapshot = merge(Some(json!({ "status": "ok" })), None);
        assert!(snapshot.is_empty());

        // Scalars contribute nothing either.
        let snapshot = merge(Some(json!("nope")), None);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn merged_record_wire_format() {
        let api1 = json!({ "data": [stock("XYZ", "10")] });
        let api2 = json!({ "data": [stock("XYZ", "11")] });

        let snapshot = merge(Some(api1), Some(api2));
        let wire = serde_json::to_value(&snapshot.records["XYZ"]).unwrap();

        assert_eq!(wire["Symbol"], json!("XYZ"));
        assert_eq!(wire["source"], json!("both"));
        assert_eq!(wire["sources"], json!(["api1", "api2"]));
        assert_eq!(wire["api2_data"]["Last Traded Price"], json!("11"));
    }
}
