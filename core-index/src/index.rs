//! # Collection Index
//!
//! In-memory tree of the collection grouped by up to three dimensions.
//!
//! ## Overview
//!
//! ```text
//! Root
//! ├── Divider "B"
//! ├── Container "The Beatles"            level 0
//! │   └── Container "Abbey Road"         level 1
//! │       ├── Song "Come Together"
//! │       └── Song "Something"
//! └── Container "Various artists"        level 0, compilations
//! ```
//!
//! Containers are created when their first song arrives and pruned as soon
//! as their last descendant leaves. Dividers exist only while some top-level
//! container maps to them.
//!
//! The index is maintained incrementally through [`CollectionIndex::apply`].
//! It must be fed from a single ordered source: applying a removal before
//! the insertion it undoes leaves the key maps inconsistent.
//!
//! Every mutation returns the [`IndexChange`]s an observer needs to follow
//! along, in the order they happened.

use crate::divider::{divider_display_text, divider_key};
use crate::grouping::{GroupBy, Grouping, GROUPING_LEVELS};
use crate::node::{Node, NodeArena, NodeId, NodeKind};
use crate::text::{
    container_display_text, container_key, container_sort_text, container_summary,
    song_display_text, sort_text, sort_text_for_song, text_or_unknown, VARIOUS_ARTISTS,
    VARIOUS_ARTISTS_SORT,
};
use core_library::{QueryOptions, Song, SongDelta};
use core_runtime::config::IndexSettings;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Text of the placeholder shown while the collection loads.
pub const LOADING_TEXT: &str = "Loading...";

/// Joins the per-level parts of a node key. Never occurs in tag text.
const KEY_SEPARATOR: char = '\u{1f}';

/// A structural change observers must replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexChange {
    Inserted { parent: NodeId, node: NodeId },
    /// `node` is already freed when this is reported.
    Removed { parent: NodeId, node: NodeId },
    /// A song was replaced in place; the tree shape is unchanged.
    Updated { node: NodeId },
    /// The whole tree was rebuilt. Observers re-read from the root.
    Reset,
}

#[derive(Debug)]
pub struct CollectionIndex {
    arena: NodeArena,
    root: NodeId,
    grouping: Grouping,
    settings: IndexSettings,
    filter: QueryOptions,
    container_nodes: [HashMap<String, NodeId>; GROUPING_LEVELS],
    song_nodes: HashMap<i64, NodeId>,
    divider_nodes: HashMap<String, NodeId>,
    loading_indicator: Option<NodeId>,
}

impl Default for CollectionIndex {
    fn default() -> Self {
        Self::new(Grouping::default(), IndexSettings::default())
    }
}

impl CollectionIndex {
    pub fn new(grouping: Grouping, settings: IndexSettings) -> Self {
        let mut arena = NodeArena::new();
        let root = arena.insert(Node::new(NodeKind::Root));
        Self {
            arena,
            root,
            grouping,
            settings,
            filter: QueryOptions::default(),
            container_nodes: Default::default(),
            song_nodes: HashMap::new(),
            divider_nodes: HashMap::new(),
            loading_indicator: None,
        }
    }

    pub fn with_filter(mut self, filter: QueryOptions) -> Self {
        self.filter = filter;
        self
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn grouping(&self) -> Grouping {
        self.grouping
    }

    pub fn settings(&self) -> IndexSettings {
        self.settings
    }

    pub fn filter(&self) -> &QueryOptions {
        &self.filter
    }

    /// Regroup. The tree is emptied and must be repopulated.
    pub fn set_grouping(&mut self, grouping: Grouping) -> Vec<IndexChange> {
        self.grouping = grouping;
        self.reset()
    }

    /// Change display settings. The tree is emptied and must be repopulated.
    pub fn set_settings(&mut self, settings: IndexSettings) -> Vec<IndexChange> {
        self.settings = settings;
        self.reset()
    }

    /// Filter applied to incoming songs. Songs already indexed stay.
    pub fn set_filter(&mut self, filter: QueryOptions) {
        self.filter = filter;
    }

    // ========================================================================
    // Rebuilds
    // ========================================================================

    /// Drop every node and index entry.
    pub fn reset(&mut self) -> Vec<IndexChange> {
        self.arena.clear();
        self.root = self.arena.insert(Node::new(NodeKind::Root));
        for level in &mut self.container_nodes {
            level.clear();
        }
        self.song_nodes.clear();
        self.divider_nodes.clear();
        self.loading_indicator = None;
        vec![IndexChange::Reset]
    }

    /// Empty the tree and show a loading placeholder under the root.
    pub fn begin_loading(&mut self) -> Vec<IndexChange> {
        let mut changes = self.reset();
        let node = Node {
            parent: Some(self.root),
            display_text: LOADING_TEXT.to_string(),
            ..Node::new(NodeKind::LoadingIndicator)
        };
        let id = self.arena.insert(node);
        self.loading_indicator = Some(id);
        changes.push(IndexChange::Inserted {
            parent: self.root,
            node: id,
        });
        changes
    }

    /// Replace the tree with `songs`, reported as a single reset.
    pub fn finish_loading(&mut self, songs: &[Song]) -> Vec<IndexChange> {
        let changes = self.reset();
        self.songs_discovered(songs);
        changes
    }

    pub fn is_loading(&self) -> bool {
        self.loading_indicator.is_some()
    }

    // ========================================================================
    // Incremental maintenance
    // ========================================================================

    /// Apply a delta: removals first, then additions.
    pub fn apply(&mut self, delta: &SongDelta) -> Vec<IndexChange> {
        let mut changes = self.songs_deleted(&delta.removed);
        changes.extend(self.songs_discovered(&delta.added));
        changes
    }

    /// Insert songs, creating the containers and dividers they need.
    ///
    /// Songs outside the filter and songs already present are skipped.
    pub fn songs_discovered(&mut self, songs: &[Song]) -> Vec<IndexChange> {
        let mut changes = Vec::new();
        for song in songs {
            if !self.filter.matches(song) {
                continue;
            }
            if self.song_nodes.contains_key(&song.id) {
                debug!(song_id = song.id, "Song already indexed, skipping");
                continue;
            }

            let container = self.resolve_container(song, &mut changes);
            self.insert_song(container, song, &mut changes);
        }
        changes
    }

    /// Remove songs, then prune containers and dividers left empty.
    pub fn songs_deleted(&mut self, songs: &[Song]) -> Vec<IndexChange> {
        let mut changes = Vec::new();
        let mut maybe_empty: BTreeSet<NodeId> = BTreeSet::new();

        for song in songs {
            let Some(id) = self.song_nodes.remove(&song.id) else {
                if self.is_loading() || !self.filter.matches(song) {
                    debug!(song_id = song.id, "Removed song was not indexed");
                } else {
                    warn!(
                        song_id = song.id,
                        url = %song.url,
                        "Removed song was not indexed, ignoring"
                    );
                }
                continue;
            };
            let Some(node) = self.arena.remove(id) else {
                warn!(song_id = song.id, "Song node missing from arena");
                continue;
            };
            if let Some(parent) = node.parent {
                if parent != self.root {
                    maybe_empty.insert(parent);
                }
                changes.push(IndexChange::Removed { parent, node: id });
            }
        }

        let mut divider_keys: BTreeSet<String> = BTreeSet::new();
        while !maybe_empty.is_empty() {
            for id in std::mem::take(&mut maybe_empty) {
                let prunable = self
                    .arena
                    .get(id)
                    .is_some_and(|node| node.is_container() && node.children.is_empty());
                if !prunable {
                    continue;
                }
                let Some(node) = self.arena.remove(id) else {
                    continue;
                };

                if node.is_compilation_artist_node {
                    if let Some(parent) = node.parent.and_then(|p| self.arena.get_mut(p)) {
                        parent.compilation_artist_node = None;
                    }
                } else if let Some(level) = node.container_level {
                    self.container_nodes[level].remove(&node.key);
                }

                if node.container_level == Some(0) {
                    if let Some(key) = node.divider_key {
                        divider_keys.insert(key);
                    }
                }

                if let Some(parent) = node.parent {
                    if parent != self.root {
                        maybe_empty.insert(parent);
                    }
                    changes.push(IndexChange::Removed { parent, node: id });
                }
            }
        }

        for key in divider_keys {
            let in_use = self.container_nodes[0].values().any(|id| {
                self.arena
                    .get(*id)
                    .and_then(|node| node.divider_key.as_deref())
                    == Some(key.as_str())
            });
            if in_use {
                continue;
            }
            if let Some(id) = self.divider_nodes.remove(&key) {
                self.arena.remove(id);
                changes.push(IndexChange::Removed {
                    parent: self.root,
                    node: id,
                });
            }
        }

        changes
    }

    /// Replace song snapshots in place, for statistics and rating updates.
    pub fn songs_slightly_changed(&mut self, songs: &[Song]) -> Vec<IndexChange> {
        let mut changes = Vec::new();
        for song in songs {
            let Some(id) = self.song_nodes.get(&song.id).copied() else {
                continue;
            };
            if let Some(node) = self.arena.get_mut(id) {
                node.metadata = Some(song.clone());
                changes.push(IndexChange::Updated { node: id });
            }
        }
        changes
    }

    fn resolve_container(&mut self, song: &Song, changes: &mut Vec<IndexChange>) -> NodeId {
        let grouping = self.grouping;
        let mut container = self.root;

        for (level, group_by) in grouping.levels().enumerate() {
            if group_by.is_artist() && self.settings.show_various_artists && song.is_compilation() {
                container = self.various_artists_container(container, level, group_by, changes);
                continue;
            }

            let key = self.child_key(container, &container_key(group_by, song));
            let existing = self.container_nodes[level].get(&key).copied();
            container = match existing {
                Some(id) => id,
                None => self.create_container(container, level, group_by, key, song, changes),
            };
        }
        container
    }

    fn child_key(&self, parent: NodeId, part: &str) -> String {
        match self.arena.get(parent) {
            Some(node) if parent != self.root && !node.key.is_empty() => {
                format!("{}{KEY_SEPARATOR}{part}", node.key)
            }
            _ => part.to_string(),
        }
    }

    fn various_artists_container(
        &mut self,
        parent: NodeId,
        level: usize,
        group_by: GroupBy,
        changes: &mut Vec<IndexChange>,
    ) -> NodeId {
        if let Some(existing) = self.arena.get(parent).and_then(|n| n.compilation_artist_node) {
            return existing;
        }

        let node = Node {
            parent: Some(parent),
            key: self.child_key(parent, VARIOUS_ARTISTS),
            display_text: VARIOUS_ARTISTS.to_string(),
            sort_text: VARIOUS_ARTISTS_SORT.to_string(),
            container_level: Some(level),
            group_by,
            is_compilation_artist_node: true,
            ..Node::new(NodeKind::Container)
        };
        let id = self.arena.insert(node);
        if let Some(parent_node) = self.arena.get_mut(parent) {
            parent_node.compilation_artist_node = Some(id);
        }
        changes.push(IndexChange::Inserted { parent, node: id });
        id
    }

    fn create_container(
        &mut self,
        parent: NodeId,
        level: usize,
        group_by: GroupBy,
        key: String,
        song: &Song,
        changes: &mut Vec<IndexChange>,
    ) -> NodeId {
        let summary = container_summary(group_by, song);
        let mut sort_text = container_sort_text(group_by, song);

        let divider = if level == 0 && self.settings.show_dividers {
            divider_key(group_by, &sort_text, &summary)
        } else {
            None
        };
        if let Some(divider) = &divider {
            sort_text = format!("{divider} {sort_text}");
        }

        let node = Node {
            parent: Some(parent),
            key: key.clone(),
            display_text: container_display_text(group_by, song),
            sort_text,
            container_level: Some(level),
            group_by,
            metadata: Some(summary),
            divider_key: divider.clone(),
            ..Node::new(NodeKind::Container)
        };
        let id = self.arena.insert(node);
        self.container_nodes[level].insert(key, id);
        changes.push(IndexChange::Inserted { parent, node: id });

        if let Some(divider) = divider {
            self.ensure_divider(group_by, divider, changes);
        }
        id
    }

    fn ensure_divider(&mut self, group_by: GroupBy, key: String, changes: &mut Vec<IndexChange>) {
        if self.divider_nodes.contains_key(&key) {
            return;
        }
        let node = Node {
            parent: Some(self.root),
            display_text: divider_display_text(group_by, &key),
            sort_text: format!("{key}  "),
            group_by,
            divider_key: Some(key.clone()),
            key: key.clone(),
            ..Node::new(NodeKind::Divider)
        };
        let id = self.arena.insert(node);
        self.divider_nodes.insert(key, id);
        changes.push(IndexChange::Inserted {
            parent: self.root,
            node: id,
        });
    }

    fn insert_song(&mut self, container: NodeId, song: &Song, changes: &mut Vec<IndexChange>) {
        let under_top_level = self
            .arena
            .get(container)
            .and_then(|n| n.container_level)
            == Some(0);
        let sort = if under_top_level && !self.grouping.get(0).is_album() {
            sort_text(&song.title)
        } else {
            sort_text_for_song(song)
        };

        let node = Node {
            parent: Some(container),
            key: self.child_key(container, &text_or_unknown(&song.title)),
            display_text: song_display_text(song),
            sort_text: sort,
            metadata: Some(song.clone()),
            ..Node::new(NodeKind::Song)
        };
        let id = self.arena.insert(node);
        self.song_nodes.insert(song.id, id);
        changes.push(IndexChange::Inserted {
            parent: container,
            node: id,
        });
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).and_then(|n| n.parent)
    }

    /// Children of `id` ordered by sort text.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.arena.get(id) else {
            return Vec::new();
        };
        let mut children: Vec<(&str, NodeId)> = node
            .children
            .iter()
            .filter_map(|child| self.arena.get(*child).map(|n| (n.sort_text.as_str(), *child)))
            .collect();
        children.sort_by(|a, b| a.0.cmp(b.0));
        children.into_iter().map(|(_, child)| child).collect()
    }

    /// Song backing a leaf.
    pub fn song(&self, id: NodeId) -> Option<&Song> {
        self.arena.get(id).and_then(Node::song)
    }

    /// Every song below `id` in display order, each once.
    pub fn child_songs(&self, id: NodeId) -> Vec<Song> {
        let mut songs = Vec::new();
        let mut seen = HashSet::new();
        self.collect_songs(id, &mut songs, &mut seen);
        songs
    }

    fn collect_songs(&self, id: NodeId, songs: &mut Vec<Song>, seen: &mut HashSet<i64>) {
        if let Some(song) = self.song(id) {
            if seen.insert(song.id) {
                songs.push(song.clone());
            }
            return;
        }
        for child in self.children(id) {
            self.collect_songs(child, songs, seen);
        }
    }

    pub fn song_node(&self, song_id: i64) -> Option<NodeId> {
        self.song_nodes.get(&song_id).copied()
    }

    /// Container reached by following `path`, one key per grouping level
    /// starting at the top. "Various artists" containers are not
    /// registered; see [`Self::various_artists`].
    pub fn container(&self, path: &[&str]) -> Option<NodeId> {
        let level = path.len().checked_sub(1)?;
        let key = path.join(&KEY_SEPARATOR.to_string());
        self.container_nodes.get(level)?.get(&key).copied()
    }

    pub fn various_artists(&self, parent: NodeId) -> Option<NodeId> {
        self.arena.get(parent).and_then(|n| n.compilation_artist_node)
    }

    pub fn divider(&self, key: &str) -> Option<NodeId> {
        self.divider_nodes.get(key).copied()
    }

    // ========================================================================
    // Counts
    // ========================================================================

    pub fn song_count(&self) -> usize {
        self.song_nodes.len()
    }

    /// Containers including "Various artists" nodes.
    pub fn container_count(&self) -> usize {
        let others = 1
            + self.song_nodes.len()
            + self.divider_nodes.len()
            + usize::from(self.is_loading());
        self.arena.len().saturating_sub(others)
    }

    pub fn divider_count(&self) -> usize {
        self.divider_nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: i64, artist: &str, album: &str, title: &str) -> Song {
        Song {
            id,
            artist: artist.to_string(),
            album: album.to_string(),
            title: title.to_string(),
            track: id as i32,
            ..Song::new(format!("file:///m/{artist}/{album}/{id}.flac"))
        }
    }

    fn texts(index: &CollectionIndex, id: NodeId) -> Vec<String> {
        index
            .children(id)
            .into_iter()
            .map(|child| index.node(child).unwrap().display_text.clone())
            .collect()
    }

    fn by_artist_album() -> CollectionIndex {
        CollectionIndex::new(
            Grouping::new(GroupBy::AlbumArtist, GroupBy::Album, GroupBy::None),
            IndexSettings::default(),
        )
    }

    #[test]
    fn test_builds_grouped_tree() {
        let mut index = by_artist_album();
        index.songs_discovered(&[
            song(1, "The Beatles", "Abbey Road", "Something"),
            song(2, "The Beatles", "Abbey Road", "Come Together"),
            song(3, "ABBA", "Gold", "Waterloo"),
        ]);

        assert_eq!(texts(&index, index.root()), vec!["A", "ABBA", "B", "The Beatles"]);
        let beatles = index.container(&["The Beatles"]).unwrap();
        let abbey = index.container(&["The Beatles", "Abbey Road"]).unwrap();
        assert_eq!(index.parent(abbey), Some(beatles));
        assert_eq!(texts(&index, abbey), vec!["Something", "Come Together"]);

        assert_eq!(index.song_count(), 3);
        assert_eq!(index.container_count(), 4);
        assert_eq!(index.divider_count(), 2);
    }

    #[test]
    fn test_compilation_goes_under_various_artists() {
        let mut index = by_artist_album();
        let compilation = Song {
            compilation_on: true,
            compilation_effective: true,
            ..song(1, "A", "Hits", "One")
        };
        index.songs_discovered(&[compilation]);

        assert!(index.container(&["A"]).is_none());
        let various = index.various_artists(index.root()).unwrap();
        let node = index.node(various).unwrap();
        assert_eq!(node.display_text, "Various artists");
        assert_eq!(node.container_level, Some(0));
        assert_eq!(texts(&index, various), vec!["Hits"]);
        assert_eq!(index.divider_count(), 0);

        let leaf = index.song_node(1).unwrap();
        assert_eq!(index.node(leaf).unwrap().display_text, "A - One");
    }

    #[test]
    fn test_various_artists_can_be_disabled() {
        let mut index = CollectionIndex::new(
            Grouping::new(GroupBy::AlbumArtist, GroupBy::Album, GroupBy::None),
            IndexSettings {
                show_various_artists: false,
                show_dividers: false,
            },
        );
        let compilation = Song {
            compilation_on: true,
            ..song(1, "A", "Hits", "One")
        };
        index.songs_discovered(&[compilation]);

        assert!(index.container(&["A"]).is_some());
        assert!(index.various_artists(index.root()).is_none());
        assert_eq!(index.divider_count(), 0);
    }

    #[test]
    fn test_last_song_prunes_container_and_divider() {
        let mut index = by_artist_album();
        let songs: Vec<Song> = (1..=500).map(|i| song(i, "A", "X", &format!("t{i}"))).collect();
        index.songs_discovered(&songs);

        index.songs_deleted(&songs[..499]);
        assert!(index.container(&["A"]).is_some());
        assert!(index.divider("a").is_some());
        assert_eq!(index.song_count(), 1);

        let changes = index.songs_deleted(&songs[499..]);
        assert!(index.container(&["A"]).is_none());
        assert!(index.container(&["A", "X"]).is_none());
        assert!(index.divider("a").is_none());
        assert_eq!(changes.len(), 4);
        assert!(index.children(index.root()).is_empty());
    }

    #[test]
    fn test_shared_divider_survives_sibling_removal() {
        let mut index = by_artist_album();
        let abba = song(1, "ABBA", "Gold", "Waterloo");
        let aha = song(2, "a-ha", "Hunting High", "Take On Me");
        index.songs_discovered(&[abba.clone(), aha]);

        index.songs_deleted(&[abba]);
        assert!(index.divider("a").is_some());
        assert_eq!(texts(&index, index.root()), vec!["A", "a-ha"]);
    }

    #[test]
    fn test_emptied_various_artists_clears_slot() {
        let mut index = by_artist_album();
        let compilation = Song {
            compilation_detected: true,
            ..song(1, "A", "Hits", "One")
        };
        index.songs_discovered(&[compilation.clone()]);
        index.songs_deleted(&[compilation]);

        assert!(index.various_artists(index.root()).is_none());
        assert_eq!(index.container_count(), 0);
    }

    #[test]
    fn test_update_moves_song_between_containers() {
        let mut index = by_artist_album();
        let before = song(1, "A", "X", "One");
        index.songs_discovered(&[before.clone()]);

        let after = Song {
            album: "Y".to_string(),
            ..before.clone()
        };
        index.apply(&SongDelta::new(vec![after], vec![before]));

        assert!(index.container(&["A", "X"]).is_none());
        assert!(index.container(&["A", "Y"]).is_some());
        assert_eq!(index.song_count(), 1);
    }

    #[test]
    fn test_duplicate_and_unknown_songs_are_ignored() {
        let mut index = by_artist_album();
        let s = song(1, "A", "X", "One");
        index.songs_discovered(&[s.clone()]);
        assert!(index.songs_discovered(&[s]).is_empty());

        let changes = index.songs_deleted(&[song(99, "B", "Y", "Ghost")]);
        assert!(changes.is_empty());
        assert_eq!(index.song_count(), 1);
    }

    #[test]
    fn test_filter_limits_discovery() {
        let mut index =
            by_artist_album().with_filter(QueryOptions::default().with_filter("beatles"));
        index.songs_discovered(&[
            song(1, "The Beatles", "Help", "Help"),
            song(2, "ABBA", "Gold", "Waterloo"),
        ]);
        assert_eq!(index.song_count(), 1);
        assert!(index.container(&["ABBA"]).is_none());
    }

    #[test]
    fn test_slight_change_keeps_shape() {
        let mut index = by_artist_album();
        let s = song(1, "A", "X", "One");
        index.songs_discovered(&[s.clone()]);
        let node = index.song_node(1).unwrap();

        let played = Song { playcount: 5, ..s };
        let changes = index.songs_slightly_changed(&[played]);
        assert_eq!(changes, vec![IndexChange::Updated { node }]);
        assert_eq!(index.song(node).unwrap().playcount, 5);
    }

    #[test]
    fn test_flat_grouping_puts_songs_under_root() {
        let mut index = CollectionIndex::new(Grouping::flat(), IndexSettings::default());
        index.songs_discovered(&[song(1, "A", "X", "One"), song(2, "B", "Y", "Two")]);
        assert_eq!(index.children(index.root()).len(), 2);
        assert_eq!(index.container_count(), 0);
        assert_eq!(index.divider_count(), 0);
    }

    #[test]
    fn test_songs_sort_by_title_under_artist_only_grouping() {
        let mut index = CollectionIndex::new(
            Grouping::new(GroupBy::Artist, GroupBy::None, GroupBy::None),
            IndexSettings::default(),
        );
        index.songs_discovered(&[song(1, "A", "X", "Zebra"), song(2, "A", "X", "apple")]);
        let artist = index.container(&["A"]).unwrap();
        assert_eq!(texts(&index, artist), vec!["apple", "Zebra"]);
    }

    #[test]
    fn test_year_dividers_bucket_by_decade() {
        let mut index = CollectionIndex::new(
            Grouping::new(GroupBy::Year, GroupBy::None, GroupBy::None),
            IndexSettings::default(),
        );
        let dated = |id, year| Song {
            year,
            ..song(id, "A", "X", "t")
        };
        index.songs_discovered(&[dated(1, 1969), dated(2, 1965), dated(3, 1971), dated(4, 0)]);

        assert_eq!(index.divider_count(), 3);
        assert_eq!(
            texts(&index, index.root()),
            vec!["Unknown", "Unknown", "1960", "1965", "1969", "1970", "1971"]
        );
    }

    #[test]
    fn test_child_songs_in_display_order() {
        let mut index = by_artist_album();
        index.songs_discovered(&[
            song(2, "A", "X", "Two"),
            song(1, "A", "X", "One"),
            song(3, "A", "Y", "Three"),
        ]);
        let artist = index.container(&["A"]).unwrap();
        let ids: Vec<i64> = index.child_songs(artist).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_loading_placeholder() {
        let mut index = by_artist_album();
        let changes = index.begin_loading();
        assert_eq!(changes[0], IndexChange::Reset);
        assert!(index.is_loading());
        assert_eq!(texts(&index, index.root()), vec![LOADING_TEXT]);

        let changes = index.finish_loading(&[song(1, "A", "X", "One")]);
        assert_eq!(changes, vec![IndexChange::Reset]);
        assert!(!index.is_loading());
        assert_eq!(index.song_count(), 1);
        assert_eq!(index.container_count(), 2);
    }

    #[test]
    fn test_leaf_count_tracks_live_songs() {
        let mut index = CollectionIndex::default();
        let mut live: Vec<Song> = Vec::new();
        for round in 0..10i64 {
            let added: Vec<Song> = (0..7)
                .map(|i| {
                    let id = round * 7 + i;
                    song(id, &format!("Artist {}", id % 4), &format!("Album {}", id % 3), "t")
                })
                .collect();
            let removed: Vec<Song> = live
                .iter()
                .filter(|s| s.id % 3 == round % 3)
                .cloned()
                .collect();
            live.retain(|s| s.id % 3 != round % 3);
            live.extend(added.iter().cloned());

            index.apply(&SongDelta::new(added, removed));
            assert_eq!(index.song_count(), live.len());
        }

        for level in 0..2 {
            for id in index.container_nodes[level].values() {
                assert!(!index.child_songs(*id).is_empty());
            }
        }
    }

    #[test]
    fn test_dashes_in_tags_do_not_merge_containers() {
        let mut index = by_artist_album();
        let first = Song {
            album_artist: "A-B".to_string(),
            ..song(1, "A-B", "C", "One")
        };
        let second = Song {
            album_artist: "A".to_string(),
            ..song(2, "A", "B-C", "Two")
        };
        index.songs_discovered(&[first, second]);

        let a = index.container(&["A"]).unwrap();
        let ab = index.container(&["A-B"]).unwrap();
        let b_c = index.container(&["A", "B-C"]).unwrap();
        let c = index.container(&["A-B", "C"]).unwrap();
        assert_ne!(b_c, c);
        assert_eq!(index.parent(b_c), Some(a));
        assert_eq!(index.parent(c), Some(ab));

        for level in 0..2 {
            for id in index.container_nodes[level].values() {
                assert!(!index.child_songs(*id).is_empty());
            }
        }
        assert_eq!(index.child_songs(a)[0].id, 2);
        assert_eq!(index.child_songs(ab)[0].id, 1);
    }
}
