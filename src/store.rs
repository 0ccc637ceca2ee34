use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Category, Record, Severity, Status, ValidatedRecord};

/// Errors surfaced by the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A write payload failed a record invariant.
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// No record exists with the requested identifier.
    #[error("RCA not found")]
    NotFound,
}

/// Filter for listing records. Supplied fields combine by AND.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category: Option<Category>,
    pub severity: Option<Severity>,
    pub status: Option<Status>,
}

impl ListFilter {
    pub fn matches(&self, record: &Record) -> bool {
        self.category.is_none_or(|c| record.category == c)
            && self.severity.is_none_or(|s| record.severity == s)
            && self.status.is_none_or(|s| record.status == s)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatBucket {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentRecord {
    pub id: Uuid,
    pub title: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub by_category: Vec<StatBucket>,
    pub by_severity: Vec<StatBucket>,
    pub by_status: Vec<StatBucket>,
    pub total: usize,
    #[serde(rename = "recentRCAs")]
    pub recent_rcas: Vec<RecentRecord>,
}

/// In-process document store for RCA records: an in-memory collection with
/// atomic JSON persistence. The store is the only shared mutable resource;
/// updates are last-writer-wins with no cross-request coordination.
#[derive(Clone)]
pub struct RecordStore {
    records: Arc<RwLock<Vec<Record>>>,
    db_path: PathBuf,
}

impl RecordStore {
    /// Open the store, loading any previously persisted records.
    pub fn open(db_path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let records = if db_path.exists() {
            let data = std::fs::read_to_string(&db_path)?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(Self {
            records: Arc::new(RwLock::new(records)),
            db_path,
        })
    }

    /// Persist the record list to disk (atomic write via temp file + rename).
    fn persist(&self) {
        let records = self.records.read();
        if let Ok(data) = serde_json::to_string_pretty(&*records) {
            let tmp_path = self.db_path.with_extension("json.tmp");
            if std::fs::write(&tmp_path, &data).is_ok() {
                let _ = std::fs::rename(&tmp_path, &self.db_path);
            }
        }
    }

    pub fn create(&self, input: ValidatedRecord) -> Record {
        let now = Utc::now();
        let record = Record {
            id: Uuid::new_v4(),
            title: input.title,
            category: input.category,
            symptoms: input.symptoms,
            root_cause: input.root_cause,
            solution: input.solution,
            prevention: input.prevention,
            severity: input.severity,
            status: input.status,
            tags: input.tags,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };

        {
            let mut records = self.records.write();
            records.push(record.clone());
        }
        self.persist();
        record
    }

    pub fn get(&self, id: Uuid) -> Result<Record, StoreError> {
        let records = self.records.read();
        records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// Replace the mutable fields of a record, bumping `updated_at` and
    /// preserving identity and creation time.
    pub fn update(&self, id: Uuid, input: ValidatedRecord) -> Result<Record, StoreError> {
        let updated = {
            let mut records = self.records.write();
            let record = records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or(StoreError::NotFound)?;

            record.title = input.title;
            record.category = input.category;
            record.symptoms = input.symptoms;
            record.root_cause = input.root_cause;
            record.solution = input.solution;
            record.prevention = input.prevention;
            record.severity = input.severity;
            record.status = input.status;
            record.tags = input.tags;
            record.created_by = input.created_by;
            record.updated_at = Utc::now();
            record.clone()
        };
        self.persist();
        Ok(updated)
    }

    pub fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        {
            let mut records = self.records.write();
            let before = records.len();
            records.retain(|r| r.id != id);
            if records.len() == before {
                return Err(StoreError::NotFound);
            }
        }
        self.persist();
        Ok(())
    }

    /// Filtered, sorted page of records plus the total match count.
    /// Pages are 1-indexed; `sort_by` falls back to createdAt for unknown
    /// field names and `order` is descending unless it is "asc".
    pub fn list(
        &self,
        filter: &ListFilter,
        sort_by: &str,
        order: &str,
        page: usize,
        limit: usize,
    ) -> (Vec<Record>, usize) {
        let records = self.records.read();
        let mut matched: Vec<Record> = records.iter().filter(|r| filter.matches(r)).cloned().collect();

        let asc = order == "asc";
        match sort_by {
            "title" => matched.sort_by(|a, b| a.title.cmp(&b.title)),
            "category" => matched.sort_by(|a, b| a.category.to_string().cmp(&b.category.to_string())),
            "severity" => matched.sort_by(|a, b| a.severity.cmp(&b.severity)),
            "status" => matched.sort_by(|a, b| a.status.to_string().cmp(&b.status.to_string())),
            "updatedAt" => matched.sort_by(|a, b| a.updated_at.cmp(&b.updated_at)),
            _ => matched.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }
        if !asc {
            matched.reverse();
        }

        let total = matched.len();
        let page = page.max(1);
        // page is caller-supplied; saturate so an absurd page yields an
        // empty page instead of overflowing the skip
        let skip = (page - 1).saturating_mul(limit);
        let page_items = matched.into_iter().skip(skip).take(limit).collect();
        (page_items, total)
    }

    /// Snapshot of all records, newest unordered. Used by the fallback
    /// search tier and the solver.
    pub fn all(&self) -> Vec<Record> {
        self.records.read().clone()
    }

    pub fn count(&self) -> usize {
        self.records.read().len()
    }

    /// The `n` most recently created records, optionally within a category.
    pub fn recent(&self, category: Option<Category>, n: usize) -> Vec<Record> {
        let records = self.records.read();
        let mut matched: Vec<Record> = records
            .iter()
            .filter(|r| category.is_none_or(|c| r.category == c))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(n);
        matched
    }

    /// Aggregate counts by category, severity and status, plus the five
    /// most recent records. Empty buckets are omitted.
    pub fn stats(&self) -> Stats {
        let records = self.records.read();

        let by_category = Category::ALL
            .iter()
            .map(|c| StatBucket {
                name: c.to_string(),
                count: records.iter().filter(|r| r.category == *c).count(),
            })
            .filter(|b| b.count > 0)
            .collect();

        let by_severity = Severity::ALL
            .iter()
            .map(|s| StatBucket {
                name: s.to_string(),
                count: records.iter().filter(|r| r.severity == *s).count(),
            })
            .filter(|b| b.count > 0)
            .collect();

        let by_status = Status::ALL
            .iter()
            .map(|s| StatBucket {
                name: s.to_string(),
                count: records.iter().filter(|r| r.status == *s).count(),
            })
            .filter(|b| b.count > 0)
            .collect();

        let mut recent: Vec<&Record> = records.iter().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let recent_rcas = recent
            .into_iter()
            .take(5)
            .map(|r| RecentRecord {
                id: r.id,
                title: r.title.clone(),
                category: r.category,
                created_at: r.created_at,
            })
            .collect();

        Stats {
            by_category,
            by_severity,
            by_status,
            total: records.len(),
            recent_rcas,
        }
    }

    /// Remove every record. Used by the seed binary.
    pub fn clear(&self) {
        self.records.write().clear();
        self.persist();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordInput;

    fn store() -> (RecordStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("records.json")).unwrap();
        (store, dir)
    }

    fn input(title: &str, category: &str) -> ValidatedRecord {
        RecordInput {
            title: title.into(),
            category: category.into(),
            symptoms: "some symptoms".into(),
            root_cause: "some cause".into(),
            solution: "some fix".into(),
            ..RecordInput::default()
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_create_assigns_id_and_timestamps() {
        let (store, _dir) = store();
        let record = store.create(input("A", "Server"));
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(store.get(record.id).unwrap().title, "A");
    }

    #[test]
    fn test_get_unknown_id_is_not_found() {
        let (store, _dir) = store();
        assert!(matches!(
            store.get(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_update_bumps_updated_at_and_keeps_created_at() {
        let (store, _dir) = store();
        let record = store.create(input("A", "Server"));
        let updated = store.update(record.id, input("B", "Network")).unwrap();
        assert_eq!(updated.id, record.id);
        assert_eq!(updated.created_at, record.created_at);
        assert_eq!(updated.title, "B");
        assert!(updated.updated_at >= record.updated_at);
    }

    #[test]
    fn test_delete_is_permanent() {
        let (store, _dir) = store();
        let record = store.create(input("A", "Server"));
        store.delete(record.id).unwrap();
        assert!(store.get(record.id).is_err());
        assert!(matches!(
            store.delete(record.id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let id = {
            let store = RecordStore::open(path.clone()).unwrap();
            store.create(input("Persisted", "App")).id
        };
        let reopened = RecordStore::open(path).unwrap();
        assert_eq!(reopened.get(id).unwrap().title, "Persisted");
    }

    #[test]
    fn test_list_filters_combine_with_and() {
        let (store, _dir) = store();
        store.create(input("A", "Server"));
        store.create(input("B", "Database"));

        let filter = ListFilter {
            category: Some(Category::Database),
            ..ListFilter::default()
        };
        let (items, total) = store.list(&filter, "createdAt", "desc", 1, 10);
        assert_eq!(total, 1);
        assert_eq!(items[0].title, "B");
    }

    #[test]
    fn test_list_default_sort_is_created_at_desc() {
        let (store, _dir) = store();
        store.create(input("first", "Server"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.create(input("second", "Server"));

        let (items, _) = store.list(&ListFilter::default(), "createdAt", "desc", 1, 10);
        assert_eq!(items[0].title, "second");
    }

    #[test]
    fn test_pagination_23_records_limit_10() {
        let (store, _dir) = store();
        for i in 0..23 {
            store.create(input(&format!("r{i}"), "Other"));
        }
        let filter = ListFilter::default();
        let (p1, total) = store.list(&filter, "createdAt", "desc", 1, 10);
        let (p2, _) = store.list(&filter, "createdAt", "desc", 2, 10);
        let (p3, _) = store.list(&filter, "createdAt", "desc", 3, 10);
        assert_eq!(total, 23);
        assert_eq!(p1.len(), 10);
        assert_eq!(p2.len(), 10);
        assert_eq!(p3.len(), 3);
        assert_eq!(total.div_ceil(10), 3);
    }

    #[test]
    fn test_list_huge_page_returns_empty_page() {
        let (store, _dir) = store();
        store.create(input("only", "Server"));

        let filter = ListFilter::default();
        let (items, total) = store.list(&filter, "createdAt", "desc", usize::MAX, 10);
        assert_eq!(total, 1);
        assert!(items.is_empty());

        let (items, _) = store.list(&filter, "createdAt", "desc", usize::MAX, usize::MAX);
        assert!(items.is_empty());
    }

    #[test]
    fn test_stats_buckets_and_recent() {
        let (store, _dir) = store();
        store.create(input("A", "Server"));
        store.create(input("B", "Server"));
        store.create(input("C", "Database"));

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        let server = stats.by_category.iter().find(|b| b.name == "Server").unwrap();
        assert_eq!(server.count, 2);
        // No Network records, so no Network bucket
        assert!(!stats.by_category.iter().any(|b| b.name == "Network"));
        assert_eq!(stats.recent_rcas.len(), 3);
    }

    #[test]
    fn test_recent_respects_category() {
        let (store, _dir) = store();
        for i in 0..7 {
            store.create(input(&format!("s{i}"), "Server"));
        }
        store.create(input("db", "Database"));

        let recent = store.recent(Some(Category::Server), 5);
        assert_eq!(recent.len(), 5);
        assert!(recent.iter().all(|r| r.category == Category::Server));
    }
}
