use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

use dropshelf_core::convert::epub_writer::FIXED_MODIFIED;
use dropshelf_core::convert::{write_epub, Chapter, EpubBook};
use dropshelf_core::format::AUTO_CONVERT_MOBI;
use dropshelf_core::storage::ImportStatus;
use dropshelf_core::{import_existing, AppConfig, ImportEngine, ImportOrchestrator, SqliteCatalog};

struct Setup {
    _tmp: TempDir,
    drop_dir: PathBuf,
    config: AppConfig,
    catalog: Arc<SqliteCatalog>,
}

fn setup() -> Setup {
    let tmp = tempdir().unwrap();
    let drop_dir = tmp.path().join("drop");
    fs::create_dir_all(&drop_dir).unwrap();
    let mut config = AppConfig::new(&drop_dir, tmp.path().join("library"));
    config.watch.poll_interval_ms = 20;
    config.watch.stable_duration_ms = 0;
    Setup {
        _tmp: tmp,
        drop_dir,
        config,
        catalog: Arc::new(SqliteCatalog::open_in_memory().unwrap()),
    }
}

fn engine_for(setup: &Setup) -> ImportEngine {
    let orchestrator = ImportOrchestrator::new(&setup.config, setup.catalog.clone(), setup.catalog.clone());
    ImportEngine::spawn(setup.config.clone(), Arc::new(orchestrator))
}

fn write_book(path: &std::path::Path, title: &str) {
    let chapters = vec![Chapter {
        title: Some("One".to_string()),
        paragraphs: vec![format!("The text of {}", title)],
    }];
    write_epub(
        path,
        &EpubBook {
            identifier: title,
            title,
            author: "Tester",
            language: "en",
            chapters: &chapters,
            modified: FIXED_MODIFIED,
        },
    )
    .unwrap();
}

/// Poll `check` until it holds or five seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_engine_imports_settled_file_and_forgets_it() {
    let s = setup();
    let source = s.drop_dir.join("arrival.epub");
    write_book(&source, "Arrival");

    let engine = engine_for(&s);
    engine.start().await.unwrap();

    let catalog = s.catalog.clone();
    assert!(
        eventually(|| {
            let catalog = catalog.clone();
            async move { catalog.database().unwrap().count_books().unwrap() == 1 }
        })
        .await,
        "book was never imported"
    );
    let source = &source;
    assert!(eventually(|| async move { !source.exists() }).await);
    let engine_ref = &engine;
    assert!(
        eventually(|| async move { engine_ref.status().await.unwrap().processed_count == 0 }).await,
        "processed path should leave the registry"
    );

    let status = engine.status().await.unwrap();
    assert!(status.is_running);
    assert_eq!(status.watched_dir, s.drop_dir);
    assert_eq!(status.failed_count, 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_failed_file_is_suppressed_until_retry() {
    let s = setup();
    s.catalog.set_flag(AUTO_CONVERT_MOBI, false).unwrap();
    let source = s.drop_dir.join("old.mobi");
    fs::write(&source, b"BOOKMOBI").unwrap();

    let engine = engine_for(&s);
    engine.start().await.unwrap();

    let engine_ref = &engine;
    assert!(
        eventually(|| async move { engine_ref.status().await.unwrap().failed_count == 1 }).await,
        "mobi should be marked failed"
    );
    assert!(source.exists());

    // Several more polls must not import it again
    tokio::time::sleep(Duration::from_millis(200)).await;
    let errors = |c: &SqliteCatalog| {
        c.database()
            .unwrap()
            .count_import_history(ImportStatus::Error)
            .unwrap()
    };
    assert_eq!(errors(&s.catalog), 1);

    let cleared = engine.retry_failed().await.unwrap();
    assert_eq!(cleared, vec![source.clone()]);

    let catalog = s.catalog.clone();
    assert!(
        eventually(|| {
            let catalog = catalog.clone();
            async move { errors(&catalog) == 2 }
        })
        .await,
        "retry should run the import again"
    );

    engine.shutdown().await;
}

#[tokio::test]
async fn test_trigger_scan_while_stopped() {
    let s = setup();
    write_book(&s.drop_dir.join("manual.epub"), "Manual");

    let engine = engine_for(&s);
    // First sighting only seeds the stability tracker
    assert_eq!(engine.trigger_scan().await.unwrap(), 0);
    assert_eq!(engine.trigger_scan().await.unwrap(), 1);
    assert!(!engine.status().await.unwrap().is_running);

    let catalog = s.catalog.clone();
    assert!(
        eventually(|| {
            let catalog = catalog.clone();
            async move { catalog.database().unwrap().count_books().unwrap() == 1 }
        })
        .await
    );
    engine.shutdown().await;
}

#[tokio::test]
async fn test_import_existing_skips_stability() {
    let s = setup();
    write_book(&s.drop_dir.join("one.epub"), "One");
    write_book(&s.drop_dir.join("two.epub"), "Two");
    fs::write(s.drop_dir.join("readme.md"), "not a book").unwrap();

    let orchestrator = ImportOrchestrator::new(&s.config, s.catalog.clone(), s.catalog.clone());
    let outcomes = import_existing(&s.config, &orchestrator).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|(_, r)| r.success && !r.is_duplicate));
    assert_eq!(s.catalog.database().unwrap().count_books().unwrap(), 2);
    assert!(s.drop_dir.join("readme.md").exists());
}
