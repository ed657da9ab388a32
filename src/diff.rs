// src/diff.rs
//
// Compares two consecutive unified snapshots and keeps only the records whose
// tracked price moved. Symbols present in just one of the two snapshots are
// never reported; the first value a symbol ever shows is established silently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feed::Record;
use crate::merge::{MergedRecord, UnifiedSnapshot};

/// Numeric field whose movement is broadcast.
pub const TRACKED_FIELD: &str = "Last Traded Price";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Increase,
    Decrease,
}

/// One changed record: the current merged record plus movement metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateChange {
    #[serde(flatten)]
    pub record: MergedRecord,
    pub previous_rate: f64,
    pub change_type: ChangeDirection,
    pub change_amount: f64,
    pub change_percent: f64,
}

pub type ChangeSet = BTreeMap<String, RateChange>;

/// Compute the change-set between `current` and `previous`. `None` means
/// nothing to broadcast: no previous snapshot yet, or no tracked value moved.
pub fn diff(current: &UnifiedSnapshot, previous: Option<&UnifiedSnapshot>) -> Option<ChangeSet> {
    let previous = previous?;

    let mut changed = ChangeSet::new();
    for (symbol, cur) in &current.records {
        let Some(prev) = previous.records.get(symbol) else {
            continue;
        };
        // A tracked value that fails to parse on either side skips the
        // record for this comparison; a missing field counts as zero.
        let (Some(cur_rate), Some(prev_rate)) =
            (tracked_rate(&cur.fields), tracked_rate(&prev.fields))
        else {
            continue;
        };
        if cur_rate == prev_rate {
            continue;
        }

        let amount = cur_rate - prev_rate;
        changed.insert(
            symbol.clone(),
            RateChange {
                record: cur.clone(),
                previous_rate: prev_rate,
                change_type: if amount > 0.0 {
                    ChangeDirection::Increase
                } else {
                    ChangeDirection::Decrease
                },
                change_amount: amount,
                // Division-by-zero guard: a move away from exactly 0 is
                // reported as 0%, matching the upstream contract.
                change_percent: if prev_rate == 0.0 {
                    0.0
                } else {
                    amount / prev_rate * 100.0
                },
            },
        );
    }

    if changed.is_empty() {
        None
    } else {
        Some(changed)
    }
}

fn tracked_rate(record: &Record) -> Option<f64> {
    match record.get(TRACKED_FIELD) {
        None => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge;
    use serde_json::json;

    fn snapshot_of(rows: Vec<Value>) -> UnifiedSnapshot {
        merge(Some(json!({ "data": rows })), None)
    }

    fn stock(symbol: &str, price: &str) -> Value {
        json!({ "Symbol": symbol, "Last Traded Price": price })
    }

    #[test]
    fn no_previous_means_no_changes() {
        let current = snapshot_of(vec![stock("AAA", "10")]);
        assert!(diff(&current, None).is_none());
    }

    #[test]
    fn unchanged_values_produce_none() {
        let prev = snapshot_of(vec![stock("AAA", "10")]);
        let cur = snapshot_of(vec![stock("AAA", "10")]);
        assert!(diff(&cur, Some(&prev)).is_none());
    }

    #[test]
    fn price_move_reports_direction_amount_and_percent() {
        let prev = snapshot_of(vec![stock("X", "10")]);
        let cur = snapshot_of(vec![stock("X", "12")]);

        let changes = diff(&cur, Some(&prev)).expect("one change");
        let change = &changes["X"];
        assert_eq!(change.previous_rate, 10.0);
        assert_eq!(change.change_type, ChangeDirection::Increase);
        assert!((change.change_amount - 2.0).abs() < f64::EPSILON);
        assert!((change.change_percent - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn decrease_is_tagged_as_decrease() {
        let prev = snapshot_of(vec![stock("X", "12")]);
        let cur = snapshot_of(vec![stock("X", "10")]);

        let changes = diff(&cur, Some(&prev)).expect("one change");
        assert_eq!(changes["X"].change_type, ChangeDirection::Decrease);
        assert!((changes["X"].change_amount + 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn no_phantom_entries_for_new_or_delisted_symbols() {
        let prev = snapshot_of(vec![stock("OLD", "10"), stock("KEPT", "5")]);
        let cur = snapshot_of(vec![stock("NEW", "99"), stock("KEPT", "6")]);

        let changes = diff(&cur, Some(&prev)).expect("only the common symbol");
        assert_eq!(changes.len(), 1);
        assert!(changes.contains_key("KEPT"));
    }

    #[test]
    fn percent_is_zero_when_previous_rate_is_zero() {
        let prev = snapshot_of(vec![stock("Z", "0")]);
        let cur = snapshot_of(vec![stock("Z", "5")]);

        let changes = diff(&cur, Some(&prev)).expect("one change");
        assert_eq!(changes["Z"].change_percent, 0.0);
        assert!((changes["Z"].change_amount - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unparseable_rate_skips_the_record() {
        let prev = snapshot_of(vec![stock("BAD", "10"), stock("OK", "1")]);
        let cur = snapshot_of(vec![stock("BAD", "n/a"), stock("OK", "2")]);

        let changes = diff(&cur, Some(&prev)).expect("only the parseable record");
        assert_eq!(changes.len(), 1);
        assert!(changes.contains_key("OK"));
    }

    #[test]
    fn missing_tracked_field_counts_as_zero() {
        let prev = snapshot_of(vec![json!({ "Symbol": "M" })]);
        let cur = snapshot_of(vec![stock("M", "3")]);

        let changes = diff(&cur, Some(&prev)).expect("zero to three is a change");
        assert_eq!(changes["M"].previous_rate, 0.0);
        assert_eq!(changes["M"].change_percent, 0.0);
    }

    #[test]
    fn numeric_json_values_are_accepted() {
        let prev = snapshot_of(vec![json!({ "Symbol": "N", "Last Traded Price": 10 })]);
        let cur = snapshot_of(vec![json!({ "Symbol": "N", "Last Traded Price": 10.5 })]);

        let changes = diff(&cur, Some(&prev)).expect("one change");
        assert!((changes["N"].change_amount - 0.5).abs() < 1e-9);
    }

    #[test]
    fn change_wire_format_uses_camel_case() {
        let prev = snapshot_of(vec![stock("X", "10")]);
        let cur = snapshot_of(vec![stock("X", "12")]);

        let changes = diff(&cur, Some(&prev)).unwrap();
        let wire = serde_json::to_value(&changes).unwrap();

        assert_eq!(wire["X"]["previousRate"], json!(10.0));
        assert_eq!(wire["X"]["changeType"], json!("increase"));
        assert_eq!(wire["X"]["changeAmount"], json!(2.0));
        assert_eq!(wire["X"]["changePercent"], json!(20.0));
        // The current record's fields ride along, flattened.
        assert_eq!(wire["X"]["Symbol"], json!("X"));
        assert_eq!(wire["X"]["source"], json!("api1"));
    }
}
