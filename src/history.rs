//! Market-value history: the one structure that survives between runs.
//!
//! On disk the baseline is `{ "<playerId>": { "dd/mm/yyyy": value, ... }, ... }`.
//! Merging is first-write-wins per date, so re-running the harvester only ever
//! appends newly elapsed days and never rewrites a day already recorded.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::EntityId;

/// Day key format used in the persisted baseline.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub value: i64,
}

/// Date-ordered `date -> value` series; at most one value per date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySeries(BTreeMap<NaiveDate, i64>);

impl HistorySeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every point whose date is absent; existing dates are left untouched.
    /// Returns the number of dates added.
    pub fn merge<I>(&mut self, fresh: I) -> usize
    where
        I: IntoIterator<Item = HistoryPoint>,
    {
        let mut added = 0;
        for point in fresh {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.0.entry(point.date) {
                slot.insert(point.value);
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn latest(&self) -> Option<(NaiveDate, i64)> {
        self.0.iter().next_back().map(|(d, v)| (*d, *v))
    }

    #[cfg(test)]
    pub fn get(&self, date: &NaiveDate) -> Option<i64> {
        self.0.get(date).copied()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &i64)> {
        self.0.iter()
    }
}

/// The baseline plus every fresh entry whose date it does not already hold.
pub fn merge<I>(mut baseline: HistorySeries, fresh: I) -> HistorySeries
where
    I: IntoIterator<Item = HistoryPoint>,
{
    baseline.merge(fresh);
    baseline
}

impl Serialize for HistorySeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.0
                .iter()
                .map(|(date, value)| (date.format(DATE_FORMAT).to_string(), value)),
        )
    }
}

impl<'de> Deserialize<'de> for HistorySeries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, i64>::deserialize(deserializer)?;
        let mut series = BTreeMap::new();
        for (key, value) in raw {
            let date = NaiveDate::parse_from_str(&key, DATE_FORMAT)
                .map_err(|e| serde::de::Error::custom(format!("bad history date {key:?}: {e}")))?;
            series.insert(date, value);
        }
        Ok(Self(series))
    }
}

/// Every entity's series, keyed by entity ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryBaseline(BTreeMap<EntityId, HistorySeries>);

impl HistoryBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a freshly fetched fragment for one entity. Returns dates added.
    pub fn merge_entity<I>(&mut self, id: EntityId, fresh: I) -> usize
    where
        I: IntoIterator<Item = HistoryPoint>,
    {
        let before = self.0.remove(&id).unwrap_or_else(HistorySeries::new);
        let known = before.len();
        let merged = merge(before, fresh);
        let added = merged.len() - known;
        self.0.insert(id, merged);
        added
    }

    pub fn series(&self, id: EntityId) -> Option<&HistorySeries> {
        self.0.get(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.0.len()
    }

    pub fn point_count(&self) -> usize {
        self.0.values().map(HistorySeries::len).sum()
    }
}

/// Normalize an API timestamp to its calendar day. Accepts RFC 3339 with any
/// offset or fractional precision (the date is taken as written, not shifted to
/// UTC), naive date-times, bare ISO dates and the baseline's own `dd/mm/yyyy`.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    if let Some(date) = s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
        return Some(date);
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}
