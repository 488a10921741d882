use super::{CollectionBackend, Namespace, StoredCollection, COLLECTION_SCHEMA_VERSION};
use crate::errors::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// In-memory backend for tests and demos. Reads and writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<Namespace, StoredCollection>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw stored blob, bypassing the ledger.
    pub fn stored(&self, namespace: Namespace) -> Option<StoredCollection> {
        self.collections().ok()?.get(&namespace).cloned()
    }

    /// Plants a raw blob as if another client had written it.
    pub fn put_raw(&self, namespace: Namespace, records_json: &str, schema_version: i64) -> AppResult<()> {
        let mut collections = self.collections()?;
        let revision = collections.get(&namespace).map_or(0, |stored| stored.revision) + 1;
        collections.insert(
            namespace,
            StoredCollection {
                records_json: records_json.to_string(),
                revision,
                schema_version,
            },
        );
        Ok(())
    }

    fn collections(&self) -> AppResult<MutexGuard<'_, HashMap<Namespace, StoredCollection>>> {
        self.collections
            .lock()
            .map_err(|_| AppError::Internal("memory backend mutex poisoned".to_string()))
    }

    fn check_read(&self) -> AppResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Storage("simulated read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Storage("simulated write failure".to_string()));
        }
        Ok(())
    }
}

impl CollectionBackend for MemoryBackend {
    fn read_collection(&self, namespace: Namespace) -> AppResult<Option<StoredCollection>> {
        self.check_read()?;
        Ok(self.collections()?.get(&namespace).cloned())
    }

    fn seed_collection(&self, namespace: Namespace, records_json: &str) -> AppResult<StoredCollection> {
        self.check_write()?;
        let mut collections = self.collections()?;
        let stored = collections.entry(namespace).or_insert_with(|| StoredCollection {
            records_json: records_json.to_string(),
            revision: 1,
            schema_version: COLLECTION_SCHEMA_VERSION,
        });
        Ok(stored.clone())
    }

    fn write_collection(
        &self,
        namespace: Namespace,
        records_json: &str,
        expected_revision: Option<i64>,
    ) -> AppResult<i64> {
        self.check_write()?;
        let mut collections = self.collections()?;
        let current_revision = collections.get(&namespace).map_or(0, |stored| stored.revision);

        if let Some(expected) = expected_revision {
            if expected != current_revision {
                return Err(AppError::Conflict(format!(
                    "{} changed since it was read (expected revision {}, found {})",
                    namespace, expected, current_revision
                )));
            }
        }

        let next_revision = current_revision + 1;
        collections.insert(
            namespace,
            StoredCollection {
                records_json: records_json.to_string(),
                revision: next_revision,
                schema_version: COLLECTION_SCHEMA_VERSION,
            },
        );
        Ok(next_revision)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryBackend;
    use crate::errors::AppError;
    use crate::store::{CollectionBackend, Namespace};

    #[test]
    fn failed_write_leaves_collection_untouched() {
        let backend = MemoryBackend::new();
        backend
            .write_collection(Namespace::Revenue, "[\"a\"]", Some(0))
            .expect("write");

        backend.set_fail_writes(true);
        let err = backend
            .write_collection(Namespace::Revenue, "[\"b\"]", Some(1))
            .expect_err("write should fail");
        assert!(matches!(err, AppError::Storage(_)));

        let stored = backend.stored(Namespace::Revenue).expect("stored");
        assert_eq!(stored.records_json, "[\"a\"]");
        assert_eq!(stored.revision, 1);
    }

    #[test]
    fn expected_zero_requires_empty_namespace() {
        let backend = MemoryBackend::new();
        backend
            .seed_collection(Namespace::LeadFunnel, "[]")
            .expect("seed");

        let err = backend
            .write_collection(Namespace::LeadFunnel, "[1]", Some(0))
            .expect_err("namespace already exists");
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
