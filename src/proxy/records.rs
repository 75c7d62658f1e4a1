//! The loaded proxy list, shared between the pool and readers

use crate::proxy::models::{ProxyRecord, ProxyStatus, TypeSelection};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared, index-addressed list of proxy records
///
/// Each record sits behind its own lock so readers never block the whole list.
/// Cloning is cheap and yields another handle onto the same records.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Arc<Vec<Mutex<ProxyRecord>>>,
}

impl RecordSet {
    /// Take ownership of freshly parsed records
    ///
    /// Ids are reassigned to list positions so lookups by id stay valid.
    pub fn new(records: Vec<ProxyRecord>) -> Self {
        let records = records
            .into_iter()
            .enumerate()
            .map(|(id, mut record)| {
                record.id = id;
                Mutex::new(record)
            })
            .collect();

        Self {
            records: Arc::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Lock a single record
    pub(crate) fn lock(&self, id: usize) -> Option<MutexGuard<'_, ProxyRecord>> {
        self.records
            .get(id)
            .map(|record| record.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn each_mut(&self, mut f: impl FnMut(&mut ProxyRecord)) {
        for record in self.records.iter() {
            let mut guard = record.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut *guard);
        }
    }

    /// Copy of a single record
    pub fn get(&self, id: usize) -> Option<ProxyRecord> {
        self.lock(id).map(|record| record.clone())
    }

    /// Copy of every record in list order
    pub fn snapshot(&self) -> Vec<ProxyRecord> {
        self.records
            .iter()
            .map(|record| record.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }

    /// Copy of the records currently marked working, in list order
    pub fn working(&self) -> Vec<ProxyRecord> {
        self.snapshot()
            .into_iter()
            .filter(ProxyRecord::is_working)
            .collect()
    }

    /// Number of records in the given state
    pub fn count(&self, status: ProxyStatus) -> usize {
        self.records
            .iter()
            .filter(|record| record.lock().unwrap_or_else(PoisonError::into_inner).status == status)
            .count()
    }

    /// Retype every loaded record after the type selector changes
    pub fn apply_type_selection(&self, selection: TypeSelection) {
        self.each_mut(|record| record.proxy_type = selection.resolve(&record.original_text));
    }

    /// Put every record back to pending, whatever its previous state
    pub fn reset_all(&self) {
        self.each_mut(ProxyRecord::reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProxyType;
    use crate::proxy::parser::ProxyParser;

    fn load(content: &str) -> RecordSet {
        RecordSet::new(ProxyParser::parse_string(content, TypeSelection::Auto).records)
    }

    #[test]
    fn test_apply_type_selection() {
        let records = load("socks5://1.1.1.1:1080\n2.2.2.2:8080\n");

        records.apply_type_selection(TypeSelection::Fixed(ProxyType::Socks4));
        assert!(records
            .snapshot()
            .iter()
            .all(|r| r.proxy_type == ProxyType::Socks4));

        records.apply_type_selection(TypeSelection::Auto);
        let types: Vec<_> = records.snapshot().iter().map(|r| r.proxy_type).collect();
        assert_eq!(types, vec![ProxyType::Socks5, ProxyType::Http]);
    }

    #[test]
    fn test_reset_and_working_filter() {
        let records = load("1.1.1.1:80\n2.2.2.2:80\n3.3.3.3:80\n");
        for (id, status) in [(0, ProxyStatus::Working), (2, ProxyStatus::Failed)] {
            let mut record = records.lock(id).unwrap();
            record.status = status;
            record.latency_ms = Some(50);
        }

        let working = records.working();
        assert_eq!(working.len(), 1);
        assert_eq!(working[0].id, 0);
        assert_eq!(records.count(ProxyStatus::Failed), 1);

        records.reset_all();
        assert_eq!(records.count(ProxyStatus::Pending), 3);
        assert!(records.snapshot().iter().all(|r| r.latency_ms.is_none()));
    }

    #[test]
    fn test_clones_share_records() {
        let records = load("1.1.1.1:80\n");
        let other = records.clone();
        records.lock(0).unwrap().status = ProxyStatus::Checking;
        assert_eq!(other.get(0).unwrap().status, ProxyStatus::Checking);
        assert!(other.get(1).is_none());
    }
}
