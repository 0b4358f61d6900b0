use tracing::debug;

use crate::document::to_payload;
use crate::validate::{validate_key, validate_payload_key};
use crate::{DocumentRef, DocumentStore, Record, Stream, StoreError, User, WriteOp};

/// How `save` decides between creating and replacing a document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SaveStrategy {
    /// Look the key up, then issue exactly one create or replace. Two
    /// concurrent saves of a new key can both create.
    ReadThenWrite,
    /// Hand insert-or-replace to the store as one operation keyed by the
    /// unique index. Records that already carry an id are replaced directly.
    #[default]
    Atomic,
}

impl SaveStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveStrategy::ReadThenWrite => "read-then-write",
            SaveStrategy::Atomic => "atomic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "read-then-write" | "read_then_write" => Some(SaveStrategy::ReadThenWrite),
            "atomic" => Some(SaveStrategy::Atomic),
            _ => None,
        }
    }
}

/// Application service exposing get-by-key and upsert for users and streams.
///
/// It stays generic over the document store so tests can plug in the
/// in-memory store and callers can share one client handle between several
/// services.
pub struct RecordStore<S: DocumentStore> {
    store: S,
    strategy: SaveStrategy,
}

impl<S: DocumentStore> RecordStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_strategy(store, SaveStrategy::default())
    }

    pub fn with_strategy(store: S, strategy: SaveStrategy) -> Self {
        Self { store, strategy }
    }

    pub fn strategy(&self) -> SaveStrategy {
        self.strategy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn get_user(&self, login: &str) -> Result<Option<User>, StoreError> {
        self.get(login).await
    }

    pub async fn save_user(&self, user: &User) -> Result<User, StoreError> {
        self.save(user).await
    }

    pub async fn get_stream(&self, stream_date: &str) -> Result<Option<Stream>, StoreError> {
        self.get(stream_date).await
    }

    pub async fn save_stream(&self, stream: &Stream) -> Result<Stream, StoreError> {
        self.save(stream).await
    }

    /// Fetch the record whose unique key equals `key`.
    pub async fn get<R: Record>(&self, key: &str) -> Result<Option<R>, StoreError> {
        validate_key(R::COLLECTION, key)?;
        let index = R::COLLECTION.unique_index();
        debug!(index, key, "record lookup");
        self.store
            .find_first(index, key)
            .await?
            .map(|doc| doc.into_record())
            .transpose()
    }

    /// Create or replace `record`, keyed by its id when set and otherwise by
    /// its unique key.
    pub async fn save<R: Record>(&self, record: &R) -> Result<R, StoreError> {
        validate_key(R::COLLECTION, record.key())?;
        let collection = R::COLLECTION;
        let data = to_payload(record)?;
        validate_payload_key(collection, record.key(), &data)?;

        let doc = match self.strategy {
            SaveStrategy::ReadThenWrite => {
                let existing = self
                    .store
                    .find_first(collection.unique_index(), record.key())
                    .await
                    .map_err(|e| StoreError::Lookup(Box::new(e)))?;

                let target = match (record.id(), existing) {
                    (Some(id), _) => Some(DocumentRef::in_collection(collection, id)),
                    (None, Some(doc)) => Some(doc.reference),
                    (None, None) => None,
                };

                match target {
                    Some(reference) => {
                        debug!(collection = collection.name(), id = reference.id(), "replacing document");
                        self.store
                            .replace(&reference, data)
                            .await
                            .map_err(|e| StoreError::write(WriteOp::Update, e))?
                    }
                    None => {
                        debug!(collection = collection.name(), key = record.key(), "creating document");
                        self.store
                            .create(collection, data)
                            .await
                            .map_err(|e| StoreError::write(WriteOp::Create, e))?
                    }
                }
            }
            SaveStrategy::Atomic => match record.id() {
                Some(id) => {
                    let reference = DocumentRef::in_collection(collection, id);
                    debug!(collection = collection.name(), id, "replacing document");
                    self.store
                        .replace(&reference, data)
                        .await
                        .map_err(|e| StoreError::write(WriteOp::Update, e))?
                }
                None => {
                    debug!(collection = collection.name(), key = record.key(), "upserting document");
                    self.store
                        .upsert_by_index(collection, record.key(), data)
                        .await
                        .map_err(|e| StoreError::write(WriteOp::Upsert, e))?
                }
            },
        };

        doc.into_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::InMemoryStore;
    use crate::{Collection, Document, Payload};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts reads and writes and can be told to fail either.
    #[derive(Default)]
    struct ProbeStore {
        inner: InMemoryStore,
        reads: AtomicUsize,
        writes: AtomicUsize,
        fail_reads: bool,
        fail_writes: bool,
    }

    impl ProbeStore {
        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentStore for ProbeStore {
        async fn find_first(&self, index: &str, term: &str) -> Result<Option<Document>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_reads {
                return Err(StoreError::Database("connection reset".into()));
            }
            self.inner.find_first(index, term).await
        }

        async fn create(&self, collection: Collection, data: Payload) -> Result<Document, StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(StoreError::Database("write rejected".into()));
            }
            self.inner.create(collection, data).await
        }

        async fn replace(
            &self,
            reference: &DocumentRef,
            data: Payload,
        ) -> Result<Document, StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(StoreError::Database("write rejected".into()));
            }
            self.inner.replace(reference, data).await
        }
    }

    fn read_then_write<S: DocumentStore>(store: S) -> RecordStore<S> {
        RecordStore::with_strategy(store, SaveStrategy::ReadThenWrite)
    }

    #[tokio::test]
    async fn get_user_on_empty_store_is_none() {
        let svc = RecordStore::new(InMemoryStore::new());
        assert!(svc.get_user("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_lifecycle_with_both_strategies() {
        for strategy in [SaveStrategy::ReadThenWrite, SaveStrategy::Atomic] {
            let svc = RecordStore::with_strategy(InMemoryStore::new(), strategy);
            assert!(svc.get_user("alice").await.unwrap().is_none());

            let created = svc
                .save_user(&User::new("alice").with_attribute("bio", "hi"))
                .await
                .unwrap();
            let id = created.id.clone().expect("generated id");
            assert_eq!(created.login, "alice");
            assert_eq!(created.attributes.get("bio"), Some(&json!("hi")));

            let fetched = svc.get_user("alice").await.unwrap().unwrap();
            assert_eq!(fetched, created);

            let updated = svc
                .save_user(&User::new("alice").with_id(id.clone()).with_attribute("bio", "updated"))
                .await
                .unwrap();
            assert_eq!(updated.id.as_deref(), Some(id.as_str()));
            assert_eq!(updated.attributes.get("bio"), Some(&json!("updated")));
            assert_eq!(svc.store().len(Collection::Users).unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn save_without_id_updates_existing_login() {
        for strategy in [SaveStrategy::ReadThenWrite, SaveStrategy::Atomic] {
            let svc = RecordStore::with_strategy(InMemoryStore::new(), strategy);
            let first = svc.save_user(&User::new("bob")).await.unwrap();
            let second = svc
                .save_user(&User::new("bob").with_attribute("bio", "again"))
                .await
                .unwrap();
            assert_eq!(first.id, second.id);
            assert_eq!(svc.store().len(Collection::Users).unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn streams_are_keyed_by_stream_date() {
        let svc = RecordStore::new(InMemoryStore::new());
        let saved = svc
            .save_stream(&Stream::new("2024-01-01").with_attribute("title", "kickoff"))
            .await
            .unwrap();
        let fetched = svc.get_stream("2024-01-01").await.unwrap().unwrap();
        assert_eq!(fetched, saved);
        assert!(svc.get_stream("2024-01-02").await.unwrap().is_none());
        assert!(svc.get_user("2024-01-01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_then_write_issues_one_read_and_one_write() {
        let svc = read_then_write(ProbeStore::default());
        let created = svc.save_user(&User::new("carol")).await.unwrap();
        assert_eq!((svc.store().reads(), svc.store().writes()), (1, 1));

        svc.save_user(&created).await.unwrap();
        assert_eq!((svc.store().reads(), svc.store().writes()), (2, 2));
    }

    #[tokio::test]
    async fn failed_lookup_aborts_without_writing() {
        let svc = read_then_write(ProbeStore {
            fail_reads: true,
            ..Default::default()
        });
        let err = svc.save_user(&User::new("dave")).await.unwrap_err();
        assert!(matches!(err, StoreError::Lookup(_)));
        assert_eq!(svc.store().writes(), 0);
    }

    #[tokio::test]
    async fn write_failures_name_their_branch() {
        let svc = read_then_write(ProbeStore {
            fail_writes: true,
            ..Default::default()
        });
        let err = svc.save_user(&User::new("erin")).await.unwrap_err();
        assert!(matches!(err, StoreError::Write { op: WriteOp::Create, .. }));

        let err = svc.save_user(&User::new("erin").with_id("1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Write { op: WriteOp::Update, .. }));
    }

    #[tokio::test]
    async fn replace_of_unknown_id_is_not_found() {
        let svc = RecordStore::new(InMemoryStore::new());
        let err = svc
            .save_user(&User::new("frank").with_id("12345"))
            .await
            .unwrap_err();
        match err {
            StoreError::Write { op: WriteOp::Update, source } => {
                assert!(matches!(*source, StoreError::NotFound(_)))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn blank_keys_are_rejected_before_any_io() {
        let svc = read_then_write(ProbeStore::default());
        assert!(matches!(svc.get_user(" ").await, Err(StoreError::InvalidKey(_))));
        assert!(matches!(
            svc.save_stream(&Stream::new("")).await,
            Err(StoreError::InvalidKey(_))
        ));
        assert_eq!(svc.store().reads(), 0);
    }

    #[tokio::test]
    async fn key_named_attribute_cannot_redirect_a_save() {
        for strategy in [SaveStrategy::ReadThenWrite, SaveStrategy::Atomic] {
            let svc = RecordStore::with_strategy(ProbeStore::default(), strategy);
            let hijack = User::new("alice").with_attribute("login", "bob");
            for _ in 0..2 {
                let err = svc.save_user(&hijack).await.unwrap_err();
                assert!(matches!(err, StoreError::InvalidKey(_)), "got {err}");
            }
            let err = svc
                .save_stream(&Stream::new("2024-01-01").with_attribute("streamDate", "2024-02-02"))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)));
            assert_eq!((svc.store().reads(), svc.store().writes()), (0, 0));
            assert!(svc.store().inner.is_empty(Collection::Users).unwrap());

            // Repeating the real key as an attribute is harmless.
            let saved = svc
                .save_user(&User::new("alice").with_attribute("login", "alice"))
                .await
                .unwrap();
            assert_eq!(saved.login, "alice");
            assert_eq!(svc.get_user("alice").await.unwrap(), Some(saved));
            assert!(svc.get_user("bob").await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn atomic_upsert_does_not_duplicate_under_concurrency() {
        let svc = Arc::new(RecordStore::new(InMemoryStore::new()));
        let mut handles = Vec::new();
        for i in 0..16 {
            let svc = Arc::clone(&svc);
            handles.push(tokio::spawn(async move {
                svc.save_user(&User::new("grace").with_attribute("n", i)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(svc.store().len(Collection::Users).unwrap(), 1);
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!(SaveStrategy::parse("atomic"), Some(SaveStrategy::Atomic));
        assert_eq!(SaveStrategy::parse("READ-THEN-WRITE"), Some(SaveStrategy::ReadThenWrite));
        assert_eq!(SaveStrategy::parse("read_then_write"), Some(SaveStrategy::ReadThenWrite));
        assert_eq!(SaveStrategy::parse("optimistic"), None);
        assert_eq!(SaveStrategy::default(), SaveStrategy::Atomic);
    }
}
