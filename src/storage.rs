use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::court::{validate_region, ComplexRecord, CourtStatus, PointData};
use crate::error::{CourtError, Result};
use crate::now_ms;

/// Result of a committed status transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    Written,
    /// The persisted status already matched; nothing was written.
    NoOp,
}

/// Persistent store of complex documents.
///
/// Every mutation is a read-modify-write of one complex document guarded by
/// the document's revision. A write that finds the revision moved fails with
/// `TransactionConflict` instead of overwriting the other writer.
pub trait CourtStore: Send + Sync {
    fn load_complex(&self, id: &str) -> Result<ComplexRecord>;

    /// All readable complexes. Malformed documents are logged and skipped.
    fn list_complexes(&self) -> Result<Vec<ComplexRecord>>;

    /// Insert or replace a complex document.
    fn put_complex(&self, record: &ComplexRecord) -> Result<()>;

    /// Mark courts configured with the given region points.
    /// Returns the number of courts updated.
    fn save_regions(&self, id: &str, regions: &[(String, Vec<PointData>)]) -> Result<usize>;

    fn update_court_status(
        &self,
        id: &str,
        court: &str,
        desired: CourtStatus,
        updated_at_ms: i64,
    ) -> Result<TransactionOutcome>;
}

/// Set one court's status inside a loaded document.
/// Returns false when the persisted status already matches.
fn apply_status(
    record: &mut ComplexRecord,
    court: &str,
    desired: CourtStatus,
    updated_at_ms: i64,
) -> Result<bool> {
    let id = record.id.clone();
    let entry = record
        .court_mut(court)
        .ok_or_else(|| CourtError::not_found(format!("court '{}' in complex {}", court, id)))?;
    if entry.status == desired {
        return Ok(false);
    }
    entry.status = desired;
    entry.last_updated_status = updated_at_ms;
    Ok(true)
}

fn apply_regions(record: &mut ComplexRecord, regions: &[(String, Vec<PointData>)]) -> Result<usize> {
    for (court, points) in regions {
        let id = record.id.clone();
        let entry = record
            .court_mut(court)
            .ok_or_else(|| CourtError::not_found(format!("court '{}' in complex {}", court, id)))?;
        entry.is_configured = true;
        entry.region_points = Some(points.clone());
    }
    Ok(regions.len())
}

fn validate_regions(regions: &[(String, Vec<PointData>)]) -> Result<()> {
    for (court, points) in regions {
        validate_region(points)
            .map_err(|e| CourtError::region(format!("court '{}': {}", court, e)))?;
    }
    Ok(())
}

fn open_db_connection(db_path: &str) -> Result<Connection> {
    let conn = if db_path.starts_with("file:") {
        Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )
    } else {
        Connection::open(db_path)
    };
    conn.map_err(|e| CourtError::network(format!("failed to open {}: {}", db_path, e)))
}

pub struct SqliteCourtStore {
    conn: Mutex<Connection>,
}

impl SqliteCourtStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_db_connection(db_path)?;
        conn.busy_timeout(Duration::from_millis(500))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.lock()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS complexes (
              id TEXT PRIMARY KEY,
              payload_json TEXT NOT NULL,
              revision INTEGER NOT NULL DEFAULT 0,
              updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CourtError::network("store connection lock poisoned"))
    }

    /// Current revision and document, if the complex exists.
    pub fn read_with_revision(&self, id: &str) -> Result<Option<(i64, ComplexRecord)>> {
        let conn = self.lock()?;
        read_row(&conn, id)
    }

    /// Replace a document only if its revision is still `expected_revision`.
    pub fn write_if_revision(&self, record: &ComplexRecord, expected_revision: i64) -> Result<()> {
        let conn = self.lock()?;
        write_row(&conn, record, expected_revision)
    }

    fn read_modify_write<T>(
        &self,
        id: &str,
        modify: impl FnOnce(&mut ComplexRecord) -> Result<Option<T>>,
        unchanged: T,
    ) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let (revision, mut record) = read_row(&tx, id)?
            .ok_or_else(|| CourtError::not_found(format!("complex {}", id)))?;
        let Some(result) = modify(&mut record)? else {
            tx.commit()?;
            return Ok(unchanged);
        };
        write_row(&tx, &record, revision)?;
        tx.commit()?;
        Ok(result)
    }
}

fn read_row(conn: &Connection, id: &str) -> Result<Option<(i64, ComplexRecord)>> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT revision, payload_json FROM complexes WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    row.map(|(revision, json)| Ok((revision, ComplexRecord::from_json(id, &json)?)))
        .transpose()
}

fn write_row(conn: &Connection, record: &ComplexRecord, expected_revision: i64) -> Result<()> {
    let payload = record.to_json()?;
    let changed = conn.execute(
        "UPDATE complexes SET payload_json = ?1, revision = revision + 1, updated_at = ?2 \
         WHERE id = ?3 AND revision = ?4",
        params![payload, now_ms(), record.id, expected_revision],
    )?;
    if changed == 0 {
        return Err(CourtError::conflict(format!(
            "complex {} changed since revision {}",
            record.id, expected_revision
        )));
    }
    Ok(())
}

impl CourtStore for SqliteCourtStore {
    fn load_complex(&self, id: &str) -> Result<ComplexRecord> {
        let conn = self.lock()?;
        read_row(&conn, id)?
            .map(|(_, record)| record)
            .ok_or_else(|| CourtError::config(format!("complex {} not found", id)))
    }

    fn list_complexes(&self) -> Result<Vec<ComplexRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, payload_json FROM complexes ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, json) = row?;
            match ComplexRecord::from_json(&id, &json) {
                Ok(record) => out.push(record),
                Err(e) => log::warn!("skipping complex {}: {}", id, e),
            }
        }
        Ok(out)
    }

    fn put_complex(&self, record: &ComplexRecord) -> Result<()> {
        record.validate()?;
        let payload = record.to_json()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO complexes (id, payload_json, revision, updated_at) VALUES (?1, ?2, 0, ?3) \
             ON CONFLICT(id) DO UPDATE SET payload_json = excluded.payload_json, \
             revision = complexes.revision + 1, updated_at = excluded.updated_at",
            params![record.id, payload, now_ms()],
        )?;
        Ok(())
    }

    fn save_regions(&self, id: &str, regions: &[(String, Vec<PointData>)]) -> Result<usize> {
        validate_regions(regions)?;
        self.read_modify_write(id, |record| apply_regions(record, regions).map(Some), 0)
    }

    fn update_court_status(
        &self,
        id: &str,
        court: &str,
        desired: CourtStatus,
        updated_at_ms: i64,
    ) -> Result<TransactionOutcome> {
        self.read_modify_write(
            id,
            |record| {
                let changed = apply_status(record, court, desired, updated_at_ms)?;
                Ok(changed.then_some(TransactionOutcome::Written))
            },
            TransactionOutcome::NoOp,
        )
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCourtStore {
    complexes: Mutex<HashMap<String, (i64, ComplexRecord)>>,
}

impl InMemoryCourtStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_complex(record: ComplexRecord) -> Result<Self> {
        let store = Self::new();
        store.put_complex(&record)?;
        Ok(store)
    }

    pub fn revision(&self, id: &str) -> Option<i64> {
        self.lock().ok()?.get(id).map(|(revision, _)| *revision)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, (i64, ComplexRecord)>>> {
        self.complexes
            .lock()
            .map_err(|_| CourtError::network("store lock poisoned"))
    }
}

impl CourtStore for InMemoryCourtStore {
    fn load_complex(&self, id: &str) -> Result<ComplexRecord> {
        self.lock()?
            .get(id)
            .map(|(_, record)| record.clone())
            .ok_or_else(|| CourtError::config(format!("complex {} not found", id)))
    }

    fn list_complexes(&self) -> Result<Vec<ComplexRecord>> {
        let mut out: Vec<ComplexRecord> =
            self.lock()?.values().map(|(_, record)| record.clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn put_complex(&self, record: &ComplexRecord) -> Result<()> {
        record.validate()?;
        let mut complexes = self.lock()?;
        let revision = complexes.get(&record.id).map_or(0, |(rev, _)| rev + 1);
        complexes.insert(record.id.clone(), (revision, record.clone()));
        Ok(())
    }

    fn save_regions(&self, id: &str, regions: &[(String, Vec<PointData>)]) -> Result<usize> {
        validate_regions(regions)?;
        let mut complexes = self.lock()?;
        let (revision, record) = complexes
            .get_mut(id)
            .ok_or_else(|| CourtError::not_found(format!("complex {}", id)))?;
        let mut updated = record.clone();
        let count = apply_regions(&mut updated, regions)?;
        *record = updated;
        *revision += 1;
        Ok(count)
    }

    fn update_court_status(
        &self,
        id: &str,
        court: &str,
        desired: CourtStatus,
        updated_at_ms: i64,
    ) -> Result<TransactionOutcome> {
        let mut complexes = self.lock()?;
        let (revision, record) = complexes
            .get_mut(id)
            .ok_or_else(|| CourtError::not_found(format!("complex {}", id)))?;
        if !apply_status(record, court, desired, updated_at_ms)? {
            return Ok(TransactionOutcome::NoOp);
        }
        *revision += 1;
        Ok(TransactionOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::court::CourtRecord;

    fn complex() -> ComplexRecord {
        let mut court = CourtRecord::new("Court 1");
        court.is_configured = true;
        court.region_points = Some(vec![
            PointData { x: 0.1, y: 0.1 },
            PointData { x: 0.9, y: 0.1 },
            PointData { x: 0.5, y: 0.9 },
        ]);
        ComplexRecord {
            id: "riverside".to_string(),
            name: "Riverside".to_string(),
            courts: vec![court, CourtRecord::new("Court 2")],
        }
    }

    #[test]
    fn in_memory_status_write_then_noop() {
        let store = InMemoryCourtStore::with_complex(complex()).unwrap();
        assert_eq!(store.revision("riverside"), Some(0));

        let outcome = store
            .update_court_status("riverside", "Court 1", CourtStatus::InUse, 42)
            .unwrap();
        assert_eq!(outcome, TransactionOutcome::Written);
        assert_eq!(store.revision("riverside"), Some(1));

        let court = store.load_complex("riverside").unwrap();
        let court = court.court("Court 1").unwrap();
        assert_eq!(court.status, CourtStatus::InUse);
        assert_eq!(court.last_updated_status, 42);

        let outcome = store
            .update_court_status("riverside", "Court 1", CourtStatus::InUse, 99)
            .unwrap();
        assert_eq!(outcome, TransactionOutcome::NoOp);
        assert_eq!(store.revision("riverside"), Some(1));
    }

    #[test]
    fn in_memory_missing_records() {
        let store = InMemoryCourtStore::with_complex(complex()).unwrap();
        assert!(matches!(
            store.update_court_status("nowhere", "Court 1", CourtStatus::InUse, 1),
            Err(CourtError::RecordNotFound(_))
        ));
        assert!(matches!(
            store.update_court_status("riverside", "Court 9", CourtStatus::InUse, 1),
            Err(CourtError::RecordNotFound(_))
        ));
        assert!(matches!(
            store.load_complex("nowhere"),
            Err(CourtError::ConfigLoadError(_))
        ));
    }

    #[test]
    fn in_memory_save_regions_is_all_or_nothing() {
        let store = InMemoryCourtStore::with_complex(complex()).unwrap();
        let square = vec![
            PointData { x: 0.0, y: 0.0 },
            PointData { x: 1.0, y: 0.0 },
            PointData { x: 1.0, y: 1.0 },
            PointData { x: 0.0, y: 1.0 },
        ];
        let err = store
            .save_regions(
                "riverside",
                &[
                    ("Court 2".to_string(), square.clone()),
                    ("Court 7".to_string(), square.clone()),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, CourtError::RecordNotFound(_)));
        let record = store.load_complex("riverside").unwrap();
        assert!(!record.court("Court 2").unwrap().is_configured);

        let count = store
            .save_regions("riverside", &[("Court 2".to_string(), square)])
            .unwrap();
        assert_eq!(count, 1);
        let record = store.load_complex("riverside").unwrap();
        assert!(record.court("Court 2").unwrap().is_watchable());
    }

    #[test]
    fn sqlite_revision_conflict() {
        let store = SqliteCourtStore::open(":memory:").unwrap();
        store.put_complex(&complex()).unwrap();

        let (revision, mut stale) = store.read_with_revision("riverside").unwrap().unwrap();
        assert_eq!(revision, 0);
        store
            .update_court_status("riverside", "Court 2", CourtStatus::InUse, 5)
            .unwrap();

        stale.courts[0].status = CourtStatus::InUse;
        assert!(matches!(
            store.write_if_revision(&stale, revision),
            Err(CourtError::TransactionConflict(_))
        ));
        let record = store.load_complex("riverside").unwrap();
        assert_eq!(record.court("Court 1").unwrap().status, CourtStatus::Available);
        assert_eq!(record.court("Court 2").unwrap().status, CourtStatus::InUse);
    }
}
