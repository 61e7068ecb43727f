//! Integration tests for the collection backend
//!
//! These tests drive the public backend API against an in-memory store:
//! - Reconciliation idempotence and match-by-song-id updates
//! - Compilation classification and user overrides
//! - Directory lifecycle, expiry and bulk reset
//! - Rollback on failure with no notification

use core_library::{CollectionDatabase, CollectionEvent, QueryOptions, Song};
use core_runtime::events::{EventBus, OrderedReceiver};
use core_sync::{CollectionBackend, SyncError, WriteStats};
use std::time::Duration;

async fn backend() -> CollectionBackend {
    let db = CollectionDatabase::open_in_memory().await.unwrap();
    CollectionBackend::new(db, EventBus::with_default_capacity())
}

fn tagged(url: &str, artist: &str, album: &str, directory_id: i64) -> Song {
    Song {
        artist: artist.to_string(),
        album: album.to_string(),
        title: url.rsplit('/').next().unwrap_or_default().to_string(),
        directory_id: Some(directory_id),
        ..Song::new(url)
    }
}

/// Next event that is not a counts refresh.
async fn next_change(rx: &mut OrderedReceiver<CollectionEvent>) -> CollectionEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event within timeout")
            .expect("bus open");
        if !matches!(event, CollectionEvent::CountsUpdated { .. }) {
            return event;
        }
    }
}

fn assert_effective_invariant(song: &Song) {
    assert_eq!(
        song.compilation_effective,
        (song.compilation || song.compilation_detected || song.compilation_on)
            && !song.compilation_off,
        "compilation_effective out of sync for {}",
        song.url
    );
}

#[tokio::test]
async fn test_reapplying_batch_is_idempotent() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();

    let batch: Vec<Song> = (1..=3)
        .map(|n| Song {
            song_id: format!("id-{n}"),
            ..tagged(&format!("file:///music/A/X/0{n}.flac"), "A", "X", dir.id)
        })
        .collect();

    let first = backend.add_or_update_songs(&batch).await.unwrap();
    assert_eq!(first.writes.inserts, 3);

    let second = backend.add_or_update_songs(&batch).await.unwrap();
    assert!(second.delta.is_empty());
    assert_eq!(second.writes, WriteStats::default());
}

#[tokio::test]
async fn test_song_id_match_updates_in_place() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let original = Song {
        song_id: "abc".to_string(),
        ..tagged("file:///music/A/X/01.flac", "A", "X", dir.id)
    };
    let stored = backend.add_or_update_songs(&[original.clone()]).await.unwrap();
    let stored_id = stored.delta.added[0].id;

    let mut events = backend.subscribe_ordered();
    let changed = Song {
        album: "Y".to_string(),
        ..original
    };
    let outcome = backend.add_or_update_songs(&[changed]).await.unwrap();

    assert_eq!(outcome.writes, WriteStats { inserts: 0, updates: 1, deletes: 0 });
    assert_eq!(outcome.delta.removed.len(), 1);
    assert_eq!(outcome.delta.added.len(), 1);
    assert_eq!(outcome.delta.removed[0].album, "X");
    assert_eq!(outcome.delta.added[0].album, "Y");
    assert_eq!(outcome.delta.added[0].id, stored_id);

    match next_change(&mut events).await {
        CollectionEvent::SongsChanged { delta } => assert_eq!(delta, outcome.delta),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_update_keeps_statistics() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let original = Song {
        song_id: "abc".to_string(),
        ..tagged("file:///music/A/X/01.flac", "A", "X", dir.id)
    };
    let id = backend.add_or_update_songs(&[original.clone()]).await.unwrap().delta.added[0].id;
    backend.increment_play_count(id).await.unwrap();
    backend.update_songs_rating(&[id], 0.8).await.unwrap();

    let retagged = Song {
        title: "New title".to_string(),
        ..original
    };
    backend.add_or_update_songs(&[retagged]).await.unwrap();

    let stored = backend.get_song_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.title, "New title");
    assert_eq!(stored.playcount, 1);
    assert!((stored.rating - 0.8).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_failed_batch_rolls_back_without_emitting() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let mut events = backend.subscribe_ordered();

    let batch = vec![
        tagged("file:///music/A/X/01.flac", "A", "X", dir.id),
        Song {
            url: String::new(),
            ..tagged("", "B", "X", dir.id)
        },
    ];
    let err = backend.add_or_update_songs(&batch).await.unwrap_err();
    assert!(matches!(err, SyncError::Storage(_)));

    assert!(backend
        .get_all_songs(&QueryOptions::default())
        .await
        .unwrap()
        .is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_scenario_compilation_detected_then_cleared() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let outcome = backend
        .add_or_update_songs(&[
            tagged("file:///music/X/01.flac", "A", "X", dir.id),
            tagged("file:///music/X/02.flac", "B", "X", dir.id),
        ])
        .await
        .unwrap();

    let delta = backend.classify_compilations().await.unwrap();
    assert_eq!(delta.added.len(), 2);
    assert_eq!(delta.removed.len(), 2);
    for song in backend.get_all_songs(&QueryOptions::default()).await.unwrap() {
        assert!(song.compilation_detected);
        assert!(song.compilation_effective);
        assert_effective_invariant(&song);
    }

    // Second pass changes nothing
    assert!(backend.classify_compilations().await.unwrap().is_empty());

    backend
        .delete_songs(&outcome.delta.added[1..])
        .await
        .unwrap();
    let delta = backend.classify_compilations().await.unwrap();
    assert_eq!(delta.added.len(), 1);
    let remaining = &delta.added[0];
    assert_eq!(remaining.artist, "A");
    assert!(!remaining.compilation_detected);
    assert!(!remaining.compilation_effective);
}

#[tokio::test]
async fn test_classification_spans_more_ids_than_sqlite_binds() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();

    let batch: Vec<Song> = (0..33_000)
        .map(|n| {
            let artist = if n % 2 == 0 { "A" } else { "B" };
            tagged(&format!("file:///music/X/{n:05}.flac"), artist, "X", dir.id)
        })
        .collect();
    let outcome = backend.add_or_update_songs(&batch).await.unwrap();
    assert_eq!(outcome.writes.inserts, 33_000);

    let delta = backend.classify_compilations().await.unwrap();
    assert_eq!(delta.added.len(), 33_000);
    assert_eq!(delta.removed.len(), 33_000);
    assert!(delta.added.iter().all(|s| s.compilation_effective));
    assert!(delta.added.windows(2).all(|w| w[0].id < w[1].id));

    // Stable after one pass
    assert!(backend.classify_compilations().await.unwrap().is_empty());

    let ids: Vec<i64> = outcome.delta.added.iter().map(|s| s.id).collect();
    assert_eq!(backend.get_songs_by_id(&ids).await.unwrap().len(), 33_000);
    assert_eq!(backend.update_songs_rating(&ids, 0.5).await.unwrap().len(), 33_000);
    assert_eq!(backend.delete_songs(&outcome.delta.added).await.unwrap(), 33_000);
}

#[tokio::test]
async fn test_classifier_is_case_sensitive() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    backend
        .add_or_update_songs(&[
            tagged("file:///music/Gold/01.flac", "abba", "Gold", dir.id),
            tagged("file:///music/Gold/02.flac", "ABBA", "Gold", dir.id),
        ])
        .await
        .unwrap();

    let delta = backend.classify_compilations().await.unwrap();
    assert_eq!(delta.added.len(), 2);
    assert!(delta.added.iter().all(|s| s.compilation_detected));
}

#[tokio::test]
async fn test_force_compilation_overrides_detection() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    backend
        .add_or_update_songs(&[
            tagged("file:///music/X/01.flac", "A", "X", dir.id),
            tagged("file:///music/X/02.flac", "B", "X", dir.id),
        ])
        .await
        .unwrap();
    backend.classify_compilations().await.unwrap();

    let delta = backend
        .force_compilation("X", &["A".to_string()], false)
        .await
        .unwrap();
    assert_eq!(delta.added.len(), 1);
    let forced = &delta.added[0];
    assert!(forced.compilation_detected);
    assert!(forced.compilation_off);
    assert!(!forced.compilation_effective);
    assert_effective_invariant(forced);

    let delta = backend.force_compilation("X", &[], true).await.unwrap();
    assert_eq!(delta.added.len(), 2);
    for song in &delta.added {
        assert!(song.compilation_on && !song.compilation_off);
        assert!(song.compilation_effective);
        assert_effective_invariant(song);
    }
}

#[tokio::test]
async fn test_remove_directory_cascades() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let other = backend.add_directory("/other").await.unwrap();
    backend
        .add_or_update_songs(&[
            tagged("file:///music/01.flac", "A", "X", dir.id),
            tagged("file:///music/02.flac", "A", "X", dir.id),
            tagged("file:///other/01.flac", "B", "Y", other.id),
        ])
        .await
        .unwrap();

    let mut events = backend.subscribe_ordered();
    backend.remove_directory(&dir).await.unwrap();

    match next_change(&mut events).await {
        CollectionEvent::SongsChanged { delta } => {
            assert_eq!(delta.removed.len(), 2);
            assert!(delta.added.is_empty());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(
        next_change(&mut events).await,
        CollectionEvent::DirectoryDeleted { directory: dir.clone() }
    );

    let left = backend.get_all_songs(&QueryOptions::default()).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].directory_id, Some(other.id));
    assert_eq!(backend.directories().await.unwrap(), vec![other]);

    // Songs for a directory that is gone are skipped
    let late = backend
        .add_or_update_songs(&[tagged("file:///music/03.flac", "A", "X", dir.id)])
        .await
        .unwrap();
    assert!(!late.is_changed());
}

#[tokio::test]
async fn test_change_directory_path_rewrites_locations() {
    let backend = backend().await;
    let dir = backend.add_directory("/old").await.unwrap();
    backend
        .add_or_update_songs(&[tagged("file:///old/A/01.flac", "A", "X", dir.id)])
        .await
        .unwrap();

    backend
        .change_directory_path(dir.id, "/old", "/new")
        .await
        .unwrap();

    let songs = backend.find_songs_in_directory(dir.id).await.unwrap();
    assert_eq!(songs[0].url, "file:///new/A/01.flac");
    assert_eq!(backend.directories().await.unwrap()[0].path, "/new");
}

#[tokio::test]
async fn test_mark_unavailable_and_expire() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let outcome = backend
        .add_or_update_songs(&[
            Song {
                lastseen: 1_000,
                ..tagged("file:///music/01.flac", "A", "X", dir.id)
            },
            tagged("file:///music/02.flac", "A", "X", dir.id),
        ])
        .await
        .unwrap();
    let gone = outcome.delta.added[0].clone();

    assert_eq!(backend.mark_songs_unavailable(&[gone.clone()], true).await.unwrap(), 1);
    assert_eq!(backend.mark_songs_unavailable(&[gone.clone()], true).await.unwrap(), 0);
    assert_eq!(
        backend.get_all_songs(&QueryOptions::default()).await.unwrap().len(),
        1
    );

    // Available songs are stamped, the unavailable one keeps its old stamp
    let expired = backend
        .clone()
        .with_expiry_days(1)
        .update_last_seen(dir.id)
        .await
        .unwrap();
    assert_eq!(expired, 1);
    assert!(backend.get_song_by_id(gone.id).await.unwrap().is_none());

    let kept = backend.find_songs_in_directory(dir.id).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert!(kept[0].lastseen > 1_000);
}

#[tokio::test]
async fn test_full_reconciliation_deletes_missing() {
    let backend = backend().await;
    let remote = |id: &str, album: &str| Song {
        song_id: id.to_string(),
        artist: "A".to_string(),
        album: album.to_string(),
        title: id.to_string(),
        ..Song::new(format!("remote://track/{id}"))
    };

    backend
        .update_songs_by_song_id(&[remote("1", "X"), remote("2", "X")])
        .await
        .unwrap();
    let outcome = backend
        .update_songs_by_song_id(&[remote("1", "X"), remote("3", "Y")])
        .await
        .unwrap();

    assert_eq!(outcome.writes, WriteStats { inserts: 1, updates: 0, deletes: 1 });
    assert_eq!(outcome.delta.removed[0].song_id, "2");
    assert!(backend.get_song_by_song_id("2").await.unwrap().is_none());
    assert!(backend.get_song_by_song_id("3").await.unwrap().is_some());
}

#[tokio::test]
async fn test_statistics_emit_slight_changes() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    let id = backend
        .add_or_update_songs(&[tagged("file:///music/01.flac", "A", "X", dir.id)])
        .await
        .unwrap()
        .delta
        .added[0]
        .id;

    let mut events = backend.subscribe_ordered();
    backend.increment_play_count(id).await.unwrap();
    match next_change(&mut events).await {
        CollectionEvent::SongsSlightlyChanged { songs } => {
            assert_eq!(songs.len(), 1);
            assert_eq!(songs[0].playcount, 1);
            assert!(songs[0].lastplayed > 0);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    backend.increment_skip_count(id).await.unwrap();
    let reset = backend.reset_statistics(id).await.unwrap().unwrap();
    assert_eq!((reset.playcount, reset.skipcount, reset.lastplayed), (0, 0, -1));

    let updated = backend.update_play_count("A", "01.flac", 7).await.unwrap();
    assert_eq!(updated[0].playcount, 7);
}

#[tokio::test]
async fn test_delete_all_resets() {
    let backend = backend().await;
    let dir = backend.add_directory("/music").await.unwrap();
    backend
        .add_or_update_songs(&[tagged("file:///music/01.flac", "A", "X", dir.id)])
        .await
        .unwrap();

    let mut events = backend.subscribe_ordered();
    assert_eq!(backend.delete_all().await.unwrap(), 1);
    assert_eq!(next_change(&mut events).await, CollectionEvent::DatabaseReset);

    let counts = backend.update_total_counts().await.unwrap();
    assert_eq!(counts.songs, 0);
}
