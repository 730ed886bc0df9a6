//! Document record persistence.
//!
//! Records are written once at signing time and read back by id during
//! verification. Storage itself is an external concern; [`DocumentStore`] is
//! the seam, with an in-memory and a JSON-file implementation provided.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::barcode::QrPayload;
use crate::error::{Error, Result};
use crate::signatures::{DocumentHash, SignatureRecord};

/// Descriptive data stored alongside a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Issuing party
    pub issuer: String,
    /// Document title
    pub title: String,
    /// Id of the signing key
    pub key_id: String,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// Pages in the original document
    pub page_count: usize,
    /// Size of the original document in bytes
    pub original_size: usize,
    /// Hash of the stamped output. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamped_hash: Option<DocumentHash>,
}

/// Everything recorded about a signed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document identifier
    pub document_id: String,
    /// Hash of the original upload; the value the signature covers
    pub original_hash: DocumentHash,
    /// Signature over `original_hash`
    pub signature: SignatureRecord,
    /// Payload embedded in the QR stamp
    pub qr_payload: QrPayload,
    /// Descriptive metadata
    pub metadata: RecordMetadata,
}

/// Cancellation and deadline for a record lookup.
///
/// The lookup is the only interruptible step of verification; stores check
/// the context before and after touching storage.
#[derive(Debug, Clone, Default)]
pub struct LookupContext {
    cancelled: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl LookupContext {
    /// A context that never cancels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel when `flag` becomes true.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(flag);
        self
    }

    /// Give up `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Give up at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fail with `Cancelled` if the flag is set or the deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.cancelled.as_ref().is_some_and(|flag| flag.load(Ordering::Acquire)) {
            return Err(Error::Cancelled("Lookup cancelled by caller".to_string()));
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Error::Cancelled("Lookup deadline exceeded".to_string()));
        }
        Ok(())
    }
}

/// Storage for [`DocumentRecord`]s keyed by document id.
pub trait DocumentStore: Send + Sync {
    /// Fetch the record for `document_id`; `NotFound` if there is none.
    fn get(&self, document_id: &str, ctx: &LookupContext) -> Result<DocumentRecord>;

    /// Store a new record. Records are immutable: saving an existing id fails.
    fn save(&self, record: &DocumentRecord) -> Result<()>;
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, DocumentRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, document_id: &str, ctx: &LookupContext) -> Result<DocumentRecord> {
        ctx.check()?;
        let record = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document_id)
            .cloned();
        ctx.check()?;
        record.ok_or_else(|| Error::NotFound(document_id.to_string()))
    }

    fn save(&self, record: &DocumentRecord) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&record.document_id) {
            return Err(Error::Store(format!("Record {} already exists", record.document_id)));
        }
        records.insert(record.document_id.clone(), record.clone());
        Ok(())
    }
}

/// Store keeping one `<document_id>.json` file per record in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::Store(format!("Cannot create record directory {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, document_id: &str) -> Result<PathBuf> {
        let valid = !document_id.is_empty()
            && document_id.len() <= 128
            && document_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::Validation(format!("Invalid document id: {:?}", document_id)));
        }
        Ok(self.dir.join(format!("{}.json", document_id)))
    }
}

impl DocumentStore for JsonFileStore {
    fn get(&self, document_id: &str, ctx: &LookupContext) -> Result<DocumentRecord> {
        let path = self.path_for(document_id)?;
        ctx.check()?;
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(Error::NotFound(document_id.to_string()));
            },
            Err(e) => return Err(Error::Store(format!("Cannot read {}: {}", path.display(), e))),
        };
        ctx.check()?;
        let record: DocumentRecord = serde_json::from_slice(&data)
            .map_err(|e| Error::Store(format!("Corrupt record {}: {}", path.display(), e)))?;
        if record.document_id != document_id {
            return Err(Error::Store(format!(
                "Record {} holds id {}",
                path.display(),
                record.document_id
            )));
        }
        Ok(record)
    }

    fn save(&self, record: &DocumentRecord) -> Result<()> {
        let path = self.path_for(&record.document_id)?;
        let json = serde_json::to_vec_pretty(record)?;

        let temp_path = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new().write(true).create_new(true).open(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
            // Hard-link so an existing record is never replaced.
            fs::hard_link(&temp_path, &path)
        };
        let result = write();
        let _ = fs::remove_file(&temp_path);

        match result {
            Ok(()) => {
                log::debug!("Saved record {} to {}", record.document_id, path.display());
                Ok(())
            },
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                Err(Error::Store(format!("Record {} already exists", record.document_id)))
            },
            Err(e) => Err(Error::Store(format!("Cannot write {}: {}", path.display(), e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::HASH_LEN;

    fn record(id: &str) -> DocumentRecord {
        let hash = DocumentHash::new([9; HASH_LEN]);
        let signature = SignatureRecord {
            signature: vec![1, 2, 3, 4],
            hash,
            algorithm: "RSASSA-PSS-SHA256".to_string(),
            key_id: "k1".to_string(),
            signed_at: Utc::now(),
        };
        DocumentRecord {
            document_id: id.to_string(),
            original_hash: hash,
            qr_payload: QrPayload::for_signature(id, &signature),
            signature,
            metadata: RecordMetadata {
                issuer: "Registrar".to_string(),
                title: "Transcript".to_string(),
                key_id: "k1".to_string(),
                created_at: Utc::now(),
                page_count: 1,
                original_size: 1234,
                stamped_hash: None,
            },
        }
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let saved = record("doc-1");
        store.save(&saved).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("doc-1", &LookupContext::new()).unwrap(), saved);
        assert!(matches!(
            store.get("doc-2", &LookupContext::new()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_records_are_immutable() {
        let store = MemoryStore::new();
        store.save(&record("doc-1")).unwrap();
        assert!(matches!(store.save(&record("doc-1")), Err(Error::Store(_))));
    }

    #[test]
    fn test_cancelled_lookup() {
        let store = MemoryStore::new();
        store.save(&record("doc-1")).unwrap();

        let flag = Arc::new(AtomicBool::new(true));
        let ctx = LookupContext::new().with_cancel_flag(flag.clone());
        assert!(matches!(store.get("doc-1", &ctx), Err(Error::Cancelled(_))));

        flag.store(false, Ordering::Release);
        assert!(store.get("doc-1", &ctx).is_ok());
    }

    #[test]
    fn test_expired_deadline() {
        let store = MemoryStore::new();
        let ctx = LookupContext::new().with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(matches!(store.get("doc-1", &ctx), Err(Error::Cancelled(_))));
    }

    #[test]
    fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("records")).unwrap();
        let original = record("3f2b-doc");
        store.save(&original).unwrap();
        assert!(dir.path().join("records/3f2b-doc.json").exists());

        let loaded = store.get("3f2b-doc", &LookupContext::new()).unwrap();
        assert_eq!(loaded, original);

        assert!(matches!(store.save(&original), Err(Error::Store(_))));
        assert!(matches!(
            store.get("missing", &LookupContext::new()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_json_file_store_rejects_path_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.get("../etc/passwd", &LookupContext::new()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_json_file_store_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
        assert!(matches!(
            store.get("bad", &LookupContext::new()),
            Err(Error::Store(_))
        ));
    }
}
