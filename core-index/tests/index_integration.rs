//! Integration tests for the grouping index
//!
//! These tests run the backend against an in-memory store and feed its
//! ordered event stream into a model:
//! - Initial population through the SQLite repository
//! - Compilation placement before and after classification
//! - Container and divider pruning as songs leave
//! - Draining the event loop until the backend is dropped

use core_index::{CollectionModel, GroupBy, Grouping, IndexChange};
use core_library::{CollectionEvent, Directory, Song};
use core_runtime::config::IndexSettings;
use core_runtime::events::{EventBus, OrderedReceiver};
use core_sync::CollectionBackend;
use std::sync::Arc;

async fn backend() -> CollectionBackend {
    let db = core_library::CollectionDatabase::open_in_memory().await.unwrap();
    CollectionBackend::new(db, EventBus::with_default_capacity())
}

fn tagged(dir: &Directory, file: &str, artist: &str, album: &str) -> Song {
    Song {
        artist: artist.to_string(),
        album: album.to_string(),
        title: file.to_string(),
        directory_id: Some(dir.id),
        ..Song::new(format!("file://{}/{album}/{file}.flac", dir.path))
    }
}

fn model_for(backend: &CollectionBackend, grouping: Grouping) -> CollectionModel {
    CollectionModel::new(
        Arc::new(backend.song_repository()),
        grouping,
        IndexSettings::default(),
    )
}

fn artist_album() -> Grouping {
    Grouping::new(GroupBy::AlbumArtist, GroupBy::Album, GroupBy::None)
}

/// Apply everything already queued on `rx`.
fn drain(
    model: &mut CollectionModel,
    rx: &mut OrderedReceiver<CollectionEvent>,
) -> Vec<IndexChange> {
    let mut changes = Vec::new();
    while let Ok(event) = rx.try_recv() {
        changes.extend(model.handle_event(&event));
    }
    changes
}

#[tokio::test]
async fn test_population_places_forced_compilation_under_various_artists() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let compilation = Song {
        compilation_on: true,
        ..tagged(&dir, "01", "A", "Hits")
    };
    backend
        .add_or_update_songs(&[compilation, tagged(&dir, "01", "B", "Solo")])
        .await
        .unwrap();

    let mut model = model_for(&backend, artist_album());
    model.init();
    model.finish_init().await.unwrap();

    let index = model.index();
    assert_eq!(index.song_count(), 2);
    assert!(index.container(&["A"]).is_none());
    assert!(index.container(&["B"]).is_some());
    let various = index.various_artists(index.root()).unwrap();
    assert_eq!(index.child_songs(various).len(), 1);
}

#[tokio::test]
async fn test_classification_moves_album_under_various_artists() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let mut rx = backend.subscribe_ordered();

    let mut model = model_for(&backend, artist_album());
    model.init();
    model.finish_init().await.unwrap();

    backend
        .add_or_update_songs(&[tagged(&dir, "01", "A", "X"), tagged(&dir, "02", "B", "X")])
        .await
        .unwrap();
    drain(&mut model, &mut rx);
    assert!(model.index().container(&["A"]).is_some());
    assert!(model.index().container(&["B"]).is_some());

    backend.classify_compilations().await.unwrap();
    drain(&mut model, &mut rx);

    let index = model.index();
    assert!(index.container(&["A"]).is_none());
    assert!(index.container(&["B"]).is_none());
    assert!(index.divider("a").is_none());
    assert!(index.divider("b").is_none());
    let various = index.various_artists(index.root()).unwrap();
    assert_eq!(index.child_songs(various).len(), 2);
    assert_eq!(index.song_count(), 2);
}

#[tokio::test]
async fn test_deleting_songs_prunes_containers() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let songs: Vec<Song> = (0..20)
        .map(|i| tagged(&dir, &format!("{i:02}"), "A", "X"))
        .collect();
    let outcome = backend.add_or_update_songs(&songs).await.unwrap();

    let mut model = model_for(&backend, artist_album());
    model.init();
    model.finish_init().await.unwrap();
    let mut rx = backend.subscribe_ordered();

    let stored = outcome.delta.added;
    backend.delete_songs(&stored[..19]).await.unwrap();
    drain(&mut model, &mut rx);
    assert!(model.index().container(&["A"]).is_some());
    assert!(model.index().divider("a").is_some());

    backend.delete_songs(&stored[19..]).await.unwrap();
    drain(&mut model, &mut rx);
    assert!(model.index().container(&["A"]).is_none());
    assert!(model.index().divider("a").is_none());
    assert_eq!(model.index().song_count(), 0);
}

#[tokio::test]
async fn test_statistics_update_in_place() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let outcome = backend
        .add_or_update_songs(&[tagged(&dir, "01", "A", "X")])
        .await
        .unwrap();
    let id = outcome.delta.added[0].id;

    let mut model = model_for(&backend, Grouping::default());
    model.init();
    model.finish_init().await.unwrap();
    let mut rx = backend.subscribe_ordered();

    backend.increment_play_count(id).await.unwrap();
    let changes = drain(&mut model, &mut rx);

    let node = model.index().song_node(id).unwrap();
    assert_eq!(changes, vec![IndexChange::Updated { node }]);
    assert_eq!(model.index().song(node).unwrap().playcount, 1);
}

#[tokio::test]
async fn test_run_follows_backend_until_dropped() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let rx = backend.subscribe_ordered();
    let mut model = model_for(&backend, artist_album());
    model.init();

    let remove = backend
        .add_or_update_songs(&[tagged(&dir, "01", "A", "X"), tagged(&dir, "02", "A", "Y")])
        .await
        .unwrap()
        .delta
        .added;
    backend.delete_songs(&remove[..1]).await.unwrap();
    drop(backend);

    let handled = model.run(rx, |_| {}).await.unwrap();
    assert!(handled >= 2);
    assert_eq!(model.index().song_count(), 1);
    assert!(model.index().container(&["A", "X"]).is_none());
    assert!(model.index().container(&["A", "Y"]).is_some());
}
