mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{ConcurrencyTrackingEmbedder, DIM, RecordingEmbedder, ShortBatchEmbedder, UnreachableEmbedder, handbook};
use docqa_rag::{
    Chunker, Document, INDEX_FILE_NAME, IndexStore, Indexer, RagConfig, RagError,
    RecursiveChunker, TextFileSource,
};

#[tokio::test]
async fn passage_count_matches_chunker_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = RagConfig::builder().chunk_size(40).chunk_overlap(8).build().unwrap();
    let document = Document::from_pages(
        "guide",
        ["Enrolment opens in June. Fees are due in July. ".repeat(6), "Housing is on campus.".into()],
    );

    let indexer = Indexer::builder()
        .config(config.clone())
        .embedding_provider(common::hash_embedder())
        .build()
        .unwrap();
    let summary = indexer.build_index(&document, dir.path()).await.unwrap();

    let expected = RecursiveChunker::from_config(&config).chunk(&document).unwrap().len();
    assert_eq!(summary.passage_count, expected);
    assert_eq!(summary.storage_path, dir.path());
    assert!(dir.path().join(INDEX_FILE_NAME).is_file());

    let index = indexer.store().load(dir.path()).await.unwrap();
    assert_eq!(index.len(), expected);
    assert_eq!(index.dimensions(), DIM);
}

#[tokio::test]
async fn embeds_in_configured_batches() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(RecordingEmbedder::default());
    let config = RagConfig::builder().chunk_size(10).chunk_overlap(0).embed_batch_size(2).build().unwrap();
    // five 10-char words -> five passages
    let document = Document::from_pages("d", ["aaaaaaaaa bbbbbbbbb ccccccccc ddddddddd eeeeeeeee"]);

    let indexer = Indexer::builder().config(config).embedding_provider(embedder.clone()).build().unwrap();
    let summary = indexer.build_index(&document, dir.path()).await.unwrap();

    assert_eq!(summary.passage_count, 5);
    assert_eq!(*embedder.batches.lock().await, vec![2, 2, 1]);
}

#[tokio::test]
async fn empty_document_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let storage = dir.path().join("index");
    let indexer = Indexer::builder().embedding_provider(common::hash_embedder()).build().unwrap();

    let err = indexer
        .build_index(&Document::from_pages("blank", ["   ", ""]), &storage)
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::EmptyDocument));
    assert!(!storage.exists());
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_index() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(IndexStore::new());
    let first = common::build(&handbook(), dir.path(), store.clone()).await;

    let broken = Indexer::builder()
        .embedding_provider(Arc::new(UnreachableEmbedder))
        .store(store.clone())
        .build()
        .unwrap();
    let err = broken
        .build_index(&Document::from_pages("other", ["Entirely new content."]), dir.path())
        .await
        .unwrap_err();
    assert!(err.is_transient());

    // a fresh store forces a read from disk
    let reloaded = IndexStore::new().load(dir.path()).await.unwrap();
    assert_eq!(reloaded.len(), first);
    assert_eq!(reloaded.entries()[0].passage.document_id, "handbook");
}

#[tokio::test]
async fn short_embedding_batch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let indexer = Indexer::builder().embedding_provider(Arc::new(ShortBatchEmbedder)).build().unwrap();

    let err = indexer.build_index(&handbook(), dir.path()).await.unwrap_err();

    assert!(matches!(err, RagError::Embedding { .. }));
    assert!(!dir.path().join(INDEX_FILE_NAME).exists());
}

#[tokio::test]
async fn rebuild_replaces_index() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(IndexStore::new());
    common::build(&handbook(), dir.path(), store.clone()).await;
    common::build(&Document::from_pages("v2", ["Only one page now."]), dir.path(), store.clone()).await;

    let index = store.load(dir.path()).await.unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index.entries()[0].passage.document_id, "v2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_builds_of_one_path_run_in_turn() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(ConcurrencyTrackingEmbedder::default());
    let config = RagConfig::builder().chunk_size(40).chunk_overlap(0).embed_batch_size(2).build().unwrap();
    let indexer = Arc::new(
        Indexer::builder().config(config.clone()).embedding_provider(embedder.clone()).build().unwrap(),
    );
    let spring = Document::from_pages("spring", vec!["Spring courses start in February. ".repeat(8); 3]);
    let autumn = Document::from_pages("autumn", vec!["Autumn courses start in September. ".repeat(8); 4]);

    let builds: Vec<_> = [spring.clone(), autumn.clone()]
        .into_iter()
        .map(|document| {
            let indexer = indexer.clone();
            let path = dir.path().to_path_buf();
            tokio::spawn(async move { indexer.build_index(&document, &path).await })
        })
        .collect();
    for build in builds {
        build.await.unwrap().unwrap();
    }

    assert_eq!(embedder.max_in_flight.load(Ordering::SeqCst), 1);

    let index = IndexStore::new().load(dir.path()).await.unwrap();
    let winner = index.entries()[0].passage.document_id.clone();
    assert!(index.entries().iter().all(|e| e.passage.document_id == winner));
    let expected = if winner == "spring" { &spring } else { &autumn };
    let chunks = RecursiveChunker::from_config(&config).chunk(expected).unwrap();
    assert_eq!(index.len(), chunks.len());
}

#[tokio::test]
async fn unreadable_source_is_not_reported_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = dir.path().join("scan.txt");
    tokio::fs::write(&doc_path, b"Tuition \xff\xfe due").await.unwrap();
    let indexer = Indexer::builder().embedding_provider(common::hash_embedder()).build().unwrap();

    let err = indexer
        .build_from_source(&TextFileSource::new(), &doc_path, &dir.path().join("index"))
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::SourceUnreadable { .. }));
    assert!(!dir.path().join("index").exists());
}

#[tokio::test]
async fn builds_from_text_file() {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = dir.path().join("handbook.txt");
    tokio::fs::write(&doc_path, "First page.\x0cSecond page.").await.unwrap();
    let storage = dir.path().join("faiss_index");

    let indexer = Indexer::builder().embedding_provider(common::hash_embedder()).build().unwrap();
    let summary = indexer.build_from_source(&TextFileSource::new(), &doc_path, &storage).await.unwrap();

    assert_eq!(summary.passage_count, 2);
    let index = indexer.store().load(&storage).await.unwrap();
    assert_eq!(index.entries()[1].passage.source_page, 2);
    assert_eq!(index.entries()[1].passage.document_id, "handbook");
}

#[tokio::test]
async fn missing_source_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let indexer = Indexer::builder().embedding_provider(common::hash_embedder()).build().unwrap();

    let err = indexer
        .build_from_source(&TextFileSource::new(), &dir.path().join("nope.txt"), dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::SourceNotFound { .. }));
}

#[test]
fn builder_requires_embedding_provider() {
    assert!(matches!(Indexer::builder().build(), Err(RagError::Configuration(_))));
}
