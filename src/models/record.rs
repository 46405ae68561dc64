use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::HashSet;

/// Separator for the all-values identity key. Never appears in cell text
/// coming out of a rendered table.
const KEY_SEPARATOR: char = '\u{1f}';

/// One table row: an ordered mapping from column name to cell value.
///
/// Serializes as a flat JSON object with the columns in table order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    cells: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: Vec<(String, String)>) -> Self {
        Self { cells }
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.cells.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Identity key for deduplication across re-rendered rows.
    ///
    /// Uses the designated key column when one is configured and present in
    /// this record, otherwise the concatenation of all cell values.
    pub fn identity_key(&self, key_column: Option<&str>) -> String {
        if let Some(column) = key_column {
            if let Some(value) = self.get(column) {
                if !value.is_empty() {
                    return value.to_string();
                }
            }
        }

        let mut key = String::new();
        for (_, value) in &self.cells {
            key.push_str(value);
            key.push(KEY_SEPARATOR);
        }
        key
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Insertion-ordered set of unique records.
///
/// Invariant: no two records with the same identity key, even when the
/// underlying table re-renders rows it already produced. Serializes as a
/// JSON array of row objects.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    records: Vec<Record>,
    seen: HashSet<String>,
    key_column: Option<String>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deduplicate on one designated unique column instead of all values.
    pub fn with_key_column(column: impl Into<String>) -> Self {
        Self {
            key_column: Some(column.into()),
            ..Self::default()
        }
    }

    /// Insert a record if its identity key is new. Returns whether the
    /// record was added.
    pub fn insert(&mut self, record: Record) -> bool {
        let key = record.identity_key(self.key_column.as_deref());
        if self.seen.insert(key) {
            self.records.push(record);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.records.len()))?;
        for record in &self.records {
            seq.serialize_element(record)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, &str)]) -> Record {
        Record::from_cells(
            cells
                .iter()
                .map(|(c, v)| (c.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_record_preserves_column_order() {
        let record = row(&[("Name", "Widget"), ("Price", "9.99"), ("Stock", "3")]);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"Name":"Widget","Price":"9.99","Stock":"3"}"#);
    }

    #[test]
    fn test_identity_key_uses_all_values_by_default() {
        let a = row(&[("Name", "Widget"), ("Price", "9.99")]);
        let b = row(&[("Name", "Widget"), ("Price", "10.99")]);
        assert_ne!(a.identity_key(None), b.identity_key(None));
        assert_eq!(a.identity_key(None), a.clone().identity_key(None));
    }

    #[test]
    fn test_identity_key_separator_prevents_value_shifting() {
        let a = row(&[("A", "ab"), ("B", "c")]);
        let b = row(&[("A", "a"), ("B", "bc")]);
        assert_ne!(a.identity_key(None), b.identity_key(None));
    }

    #[test]
    fn test_identity_key_prefers_designated_column() {
        let a = row(&[("ID", "42"), ("Name", "Widget")]);
        let b = row(&[("ID", "42"), ("Name", "Widget (renamed)")]);
        assert_eq!(a.identity_key(Some("ID")), b.identity_key(Some("ID")));
        assert_ne!(a.identity_key(None), b.identity_key(None));
    }

    #[test]
    fn test_identity_key_falls_back_when_column_missing() {
        let record = row(&[("Name", "Widget")]);
        assert_eq!(record.identity_key(Some("ID")), record.identity_key(None));
    }

    #[test]
    fn test_collection_rejects_duplicate_keys() {
        let mut collection = Collection::new();
        assert!(collection.insert(row(&[("Name", "Widget")])));
        assert!(!collection.insert(row(&[("Name", "Widget")])));
        assert!(collection.insert(row(&[("Name", "Gadget")])));
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_collection_keeps_insertion_order() {
        let mut collection = Collection::new();
        collection.insert(row(&[("Name", "C")]));
        collection.insert(row(&[("Name", "A")]));
        collection.insert(row(&[("Name", "B")]));

        let names: Vec<&str> = collection
            .iter()
            .map(|r| r.get("Name").unwrap())
            .collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_collection_with_key_column_ignores_other_cells() {
        let mut collection = Collection::with_key_column("ID");
        assert!(collection.insert(row(&[("ID", "1"), ("Name", "Widget")])));
        assert!(!collection.insert(row(&[("ID", "1"), ("Name", "Widget v2")])));
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.records()[0].get("Name"), Some("Widget"));
    }

    #[test]
    fn test_collection_serializes_as_array_of_objects() {
        let mut collection = Collection::new();
        collection.insert(row(&[("Name", "Widget"), ("Price", "9.99")]));
        collection.insert(row(&[("Name", "Gadget"), ("Price", "1.50")]));

        let json = serde_json::to_string(&collection).unwrap();
        assert_eq!(
            json,
            r#"[{"Name":"Widget","Price":"9.99"},{"Name":"Gadget","Price":"1.50"}]"#
        );
    }
}
