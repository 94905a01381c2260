use shelf::{
    Allocator, Catalog, CatalogEngine, ErrorKind, NewBook, Result, SequenceNamespace, ShelfError,
    SledCatalogEngine,
};
use tempfile::TempDir;

fn open(dir: &TempDir) -> Result<SledCatalogEngine> {
    Ok(SledCatalogEngine::new(sled::open(dir.path())?))
}

#[test]
fn insert_new_rejects_existing_key() -> Result<()> {
    let dir = TempDir::new()?;
    let engine = open(&dir)?;

    engine.insert_new("IRO-2025-000001".to_string(), "first".to_string())?;
    match engine.insert_new("IRO-2025-000001".to_string(), "second".to_string()) {
        Err(ShelfError::DuplicateKey(key)) => assert_eq!(key, "IRO-2025-000001"),
        other => panic!("expected DuplicateKey, got {:?}", other),
    }
    assert_eq!(engine.get("IRO-2025-000001")?, Some("first".to_string()));
    Ok(())
}

#[test]
fn set_overwrites_and_remove_deletes() -> Result<()> {
    let dir = TempDir::new()?;
    let engine = open(&dir)?;

    engine.set("IRO-2025-000001".to_string(), "first".to_string())?;
    engine.set("IRO-2025-000001".to_string(), "second".to_string())?;
    assert_eq!(engine.get("IRO-2025-000001")?, Some("second".to_string()));

    engine.remove("IRO-2025-000001")?;
    assert!(!engine.contains("IRO-2025-000001")?);
    assert!(matches!(engine.remove("IRO-2025-000001"), Err(ShelfError::KeyNotFound)));
    Ok(())
}

#[test]
fn prefix_queries_stay_within_the_prefix() -> Result<()> {
    let dir = TempDir::new()?;
    let engine = open(&dir)?;
    for key in ["IRO-2024-000900", "IRO-2025-000002", "IRO-2025-000010", "IRO-2025-000001", "IRO-2026-000001"] {
        engine.insert_new(key.to_string(), "{}".to_string())?;
    }

    assert_eq!(
        engine.last_key_with_prefix("IRO-2025-")?,
        Some("IRO-2025-000010".to_string())
    );
    assert_eq!(engine.last_key_with_prefix("IRO-2027-")?, None);
    let keys: Vec<String> = engine
        .scan_prefix("IRO-2025-")?
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    assert_eq!(keys, vec!["IRO-2025-000001", "IRO-2025-000002", "IRO-2025-000010"]);
    Ok(())
}

#[test]
fn allocates_sequentially_over_sled() -> Result<()> {
    let dir = TempDir::new()?;
    let engine = open(&dir)?;
    let ns = SequenceNamespace::new("IRO-2025-");
    let allocator = Allocator::default();

    assert_eq!(allocator.allocate(&engine, &ns)?, "IRO-2025-000001");
    engine.insert_new("IRO-2025-000001".to_string(), "{}".to_string())?;
    assert_eq!(allocator.allocate(&engine, &ns)?, "IRO-2025-000002");
    Ok(())
}

#[test]
fn catalog_over_sled_survives_reopen() -> Result<()> {
    let dir = TempDir::new()?;
    let ns = SequenceNamespace::new("IRO-2025-");
    {
        let catalog = Catalog::new(open(&dir)?);
        catalog.create_book_in(&ns, NewBook::titled("Dune"))?;
        catalog.create_book_in(&ns, NewBook::titled("Emma"))?;
    }

    let catalog = Catalog::new(open(&dir)?);
    let book = catalog.create_book_in(&ns, NewBook::titled("Ulysses"))?;
    assert_eq!(book.id, "IRO-2025-000003");
    assert_eq!(catalog.list_books("IRO-2025-")?.len(), 3);
    Ok(())
}

#[test]
fn unreadable_stored_bytes_are_an_internal_fault() -> Result<()> {
    let dir = TempDir::new()?;
    let db = sled::open(dir.path())?;
    db.insert("IRO-2025-000001", vec![0xff, 0xfe, 0xfd])?;
    let engine = SledCatalogEngine::new(db);

    let err = engine.get("IRO-2025-000001").expect_err("bytes are not UTF-8");
    assert!(matches!(err, ShelfError::Internal(_)), "{:?}", err);
    assert_eq!(err.kind(), ErrorKind::Internal);
    Ok(())
}
