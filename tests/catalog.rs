use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use crossbeam_utils::thread;
use rand::seq::SliceRandom;
use shelf::{
    AllocatorConfig, Backoff, Catalog, CatalogConfig, CatalogEngine, ErrorKind, KvStore, NewBook,
    Result, SequenceNamespace, ShelfError,
};
use tempfile::TempDir;

fn dune() -> NewBook {
    NewBook {
        title: "Dune".to_string(),
        authors: vec!["Frank Herbert".to_string()],
        isbn: Some("9780441013593".to_string()),
        publisher: Some("Ace".to_string()),
        category: Some("Fiction".to_string()),
        published_year: Some(1965),
        total_copies: 3,
    }
}

#[test]
fn books_get_sequential_identifiers() -> Result<()> {
    let dir = TempDir::new()?;
    let catalog = Catalog::new(KvStore::open(dir.path())?);
    let ns = SequenceNamespace::new("IRO-2025-");

    let first = catalog.create_book_in(&ns, dune())?;
    let second = catalog.create_book_in(&ns, NewBook::titled("Emma"))?;
    assert_eq!(first.id, "IRO-2025-000001");
    assert_eq!(second.id, "IRO-2025-000002");
    assert_eq!(first.available_copies, 3);

    assert_eq!(catalog.get_book("IRO-2025-000001")?, Some(first));
    Ok(())
}

#[test]
fn create_book_numbers_within_the_current_year() -> Result<()> {
    let dir = TempDir::new()?;
    let catalog = Catalog::new(KvStore::open(dir.path())?);

    let book = catalog.create_book(dune())?;
    assert_eq!(book.id, format!("IRO-{}-000001", Utc::now().year()));
    Ok(())
}

#[test]
fn custom_tag_and_width() -> Result<()> {
    let dir = TempDir::new()?;
    let config = CatalogConfig {
        tag: "MAG".to_string(),
        width: 4,
        ..CatalogConfig::default()
    };
    let catalog = Catalog::with_config(KvStore::open(dir.path())?, config);

    let book = catalog.create_book(NewBook::titled("Granta 1"))?;
    assert_eq!(book.id, format!("MAG-{}-0001", Utc::now().year()));
    Ok(())
}

#[test]
fn removed_identifiers_are_not_reissued() -> Result<()> {
    let dir = TempDir::new()?;
    let catalog = Catalog::new(KvStore::open(dir.path())?);
    let ns = SequenceNamespace::new("IRO-2025-");

    catalog.create_book_in(&ns, NewBook::titled("Dune"))?;
    let emma = catalog.create_book_in(&ns, NewBook::titled("Emma"))?;
    catalog.remove_book(&emma.id)?;

    assert_eq!(catalog.get_book(&emma.id)?, None);
    assert!(matches!(catalog.remove_book(&emma.id), Err(ShelfError::KeyNotFound)));

    let next = catalog.create_book_in(&ns, NewBook::titled("Ulysses"))?;
    assert_eq!(next.id, "IRO-2025-000003");

    let titles: Vec<String> = catalog
        .list_books("IRO-2025-")?
        .into_iter()
        .map(|book| book.title)
        .collect();
    assert_eq!(titles, vec!["Dune", "Ulysses"]);
    Ok(())
}

#[test]
fn update_keeps_identifier() -> Result<()> {
    let dir = TempDir::new()?;
    let catalog = Catalog::new(KvStore::open(dir.path())?);
    let ns = SequenceNamespace::new("IRO-2025-");

    let mut book = catalog.create_book_in(&ns, dune())?;
    book.available_copies = 1;
    catalog.update_book(&book)?;
    assert_eq!(catalog.get_book(&book.id)?.map(|b| b.available_copies), Some(1));

    book.available_copies = 4;
    assert!(matches!(catalog.update_book(&book), Err(ShelfError::Command(_))));

    let mut stranger = book.clone();
    stranger.id = "IRO-2025-000099".to_string();
    assert!(matches!(catalog.update_book(&stranger), Err(ShelfError::KeyNotFound)));
    Ok(())
}

#[test]
fn peeking_does_not_reserve() -> Result<()> {
    let dir = TempDir::new()?;
    let catalog = Catalog::new(KvStore::open(dir.path())?);
    let ns = SequenceNamespace::new("IRO-2025-");

    assert_eq!(catalog.peek_next_id(&ns)?, "IRO-2025-000001");
    assert_eq!(catalog.peek_next_id(&ns)?, "IRO-2025-000001");
    assert_eq!(catalog.create_book_in(&ns, dune())?.id, "IRO-2025-000001");
    Ok(())
}

/// An engine that hides its most recent inserts from the allocator's reads, so the
/// allocator keeps handing out identifiers that a concurrent writer already took.
#[derive(Clone)]
struct LaggingReads {
    inner: KvStore,
    stale_reads: Arc<AtomicU32>,
}

impl LaggingReads {
    fn stale(&self) -> bool {
        self.stale_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl CatalogEngine for LaggingReads {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn insert_new(&self, key: String, value: String) -> Result<()> {
        self.inner.insert_new(key, value)
    }

    fn set(&self, key: String, value: String) -> Result<()> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }

    fn contains(&self, key: &str) -> Result<bool> {
        if self.stale() {
            return Ok(false);
        }
        self.inner.contains(key)
    }

    fn last_key_with_prefix(&self, prefix: &str) -> Result<Option<String>> {
        if self.stale() {
            return Ok(None);
        }
        self.inner.last_key_with_prefix(prefix)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        self.inner.scan_prefix(prefix)
    }
}

#[test]
fn lost_insert_race_is_retried() -> Result<()> {
    let dir = TempDir::new()?;
    let stale_reads = Arc::new(AtomicU32::new(0));
    let engine = LaggingReads {
        inner: KvStore::open(dir.path())?,
        stale_reads: stale_reads.clone(),
    };
    let catalog = Catalog::new(engine);
    let ns = SequenceNamespace::new("IRO-2025-");
    catalog.create_book_in(&ns, NewBook::titled("Dune"))?;

    // the first round resolves and probes against stale state, so its insert collides
    stale_reads.store(2, Ordering::SeqCst);
    let book = catalog.create_book_in(&ns, NewBook::titled("Emma"))?;
    assert_eq!(book.id, "IRO-2025-000002");
    assert_eq!(catalog.get_book("IRO-2025-000001")?.map(|b| b.title), Some("Dune".to_string()));
    Ok(())
}

#[test]
fn persistent_insert_conflicts_surface_as_unavailable() -> Result<()> {
    let dir = TempDir::new()?;
    let stale_reads = Arc::new(AtomicU32::new(0));
    let engine = LaggingReads {
        inner: KvStore::open(dir.path())?,
        stale_reads: stale_reads.clone(),
    };
    let catalog = Catalog::new(engine);
    let ns = SequenceNamespace::new("IRO-2025-");
    catalog.create_book_in(&ns, NewBook::titled("Dune"))?;

    stale_reads.store(u32::MAX, Ordering::SeqCst);
    let err = catalog
        .create_book_in(&ns, NewBook::titled("Emma"))
        .expect_err("every round collides");
    assert!(matches!(err, ShelfError::DuplicateKey(ref id) if id == "IRO-2025-000001"));
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    Ok(())
}

#[test]
fn concurrent_writers_never_share_an_identifier() -> Result<()> {
    let dir = TempDir::new()?;
    let config = CatalogConfig {
        insert_attempts: 50,
        allocator: AllocatorConfig {
            max_attempts: 50,
            backoff: Backoff::Exponential {
                base: std::time::Duration::from_micros(100),
                max: std::time::Duration::from_millis(5),
            },
        },
        ..CatalogConfig::default()
    };
    let catalog = Catalog::with_config(KvStore::open(dir.path())?, config);
    let ns = SequenceNamespace::new("IRO-2025-");

    let mut titles: Vec<String> = (0..80).map(|i| format!("Volume {}", i)).collect();
    titles.shuffle(&mut rand::thread_rng());

    let mut ids: Vec<String> = thread::scope(|s| {
        let handles: Vec<_> = titles
            .chunks(20)
            .map(|chunk| {
                let catalog = catalog.clone();
                let ns = ns.clone();
                s.spawn(move |_| -> Result<Vec<String>> {
                    chunk
                        .iter()
                        .map(|title| Ok(catalog.create_book_in(&ns, NewBook::titled(title.clone()))?.id))
                        .collect()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("writer panicked"))
            .collect::<Result<Vec<Vec<String>>>>()
    })
    .expect("scope panicked")?
    .into_iter()
    .flatten()
    .collect();

    ids.sort();
    let expected: Vec<String> = (1..=80).map(|n| format!("IRO-2025-{:06}", n)).collect();
    assert_eq!(ids, expected);
    assert_eq!(catalog.list_books("IRO-2025-")?.len(), 80);
    Ok(())
}

#[test]
fn client_prefix_over_a_longer_namespace_is_a_bad_request() -> Result<()> {
    let dir = TempDir::new()?;
    let catalog = Catalog::new(KvStore::open(dir.path())?);
    catalog.create_book_in(&SequenceNamespace::new("IRO-2025-"), dune())?;

    let err = catalog.peek_next_id_for("IRO-").expect_err("IRO- covers IRO-2025-");
    assert!(matches!(err, ShelfError::Parsing(_)), "{:?}", err);
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    assert_eq!(catalog.peek_next_id_for("IRO-2025-")?, "IRO-2025-000002");
    assert_eq!(catalog.peek_next_id_for("IRO-2026-")?, "IRO-2026-000001");
    Ok(())
}

#[test]
fn non_numeric_identifier_in_own_namespace_is_an_internal_fault() -> Result<()> {
    let dir = TempDir::new()?;
    let store = KvStore::open(dir.path())?;
    store.insert_new("IRO-2025-draft".to_string(), "null".to_string())?;
    let catalog = Catalog::new(store);

    let err = catalog
        .create_book_in(&SequenceNamespace::new("IRO-2025-"), dune())
        .expect_err("greatest identifier is not numeric");
    assert!(matches!(err, ShelfError::CorruptIdentifier(ref id) if id == "IRO-2025-draft"));
    assert_eq!(err.kind(), ErrorKind::Internal);
    Ok(())
}

#[test]
fn error_kinds_separate_faults_from_bad_input() {
    assert_eq!(ShelfError::Internal("no log reader for gen 3".to_string()).kind(), ErrorKind::Internal);
    assert_eq!(ShelfError::Command("unexpected response".to_string()).kind(), ErrorKind::BadRequest);
    assert_eq!(ShelfError::Parsing("bad prefix".to_string()).kind(), ErrorKind::BadRequest);
    assert_eq!(ShelfError::KeyNotFound.kind(), ErrorKind::NotFound);
}

#[test]
fn zero_insert_attempts_still_inserts_once() -> Result<()> {
    let dir = TempDir::new()?;
    let config = CatalogConfig {
        insert_attempts: 0,
        ..CatalogConfig::default()
    };
    let catalog = Catalog::with_config(KvStore::open(dir.path())?, config);

    let book = catalog.create_book_in(&SequenceNamespace::new("IRO-2025-"), dune())?;
    assert_eq!(book.id, "IRO-2025-000001");
    Ok(())
}
