use crate::model::ProductRecord;
use std::collections::HashSet;

/// Accepted records, deduplicated by identity
///
/// Insertion order is preserved and the first record seen for an identity is
/// the one kept.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    records: Vec<ProductRecord>,
    seen: HashSet<String>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record unless its identity is already present
    ///
    /// # Returns
    ///
    /// * `true` - The record was added
    /// * `false` - A record with the same identity was already present; the
    ///   incoming one was discarded
    pub fn merge(&mut self, record: ProductRecord) -> bool {
        if !self.seen.insert(record.identity.clone()) {
            tracing::trace!("Duplicate listing {} discarded", record.identity);
            return false;
        }
        self.records.push(record);
        true
    }

    /// Merges every record, returning how many were added
    pub fn extend<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = ProductRecord>,
    {
        records
            .into_iter()
            .fold(0, |added, record| added + usize::from(self.merge(record)))
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.seen.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProductRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<ProductRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ProductRecord;
    type IntoIter = std::slice::Iter<'a, ProductRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
