//! # Collection Model
//!
//! Drives a [`CollectionIndex`] from the store.
//!
//! ## Population
//!
//! [`CollectionModel::init`] empties the index, shows the loading
//! placeholder and runs the population query on a background task. Each
//! call bumps an `init_id`; a result tagged with an older id is dropped, so
//! changing the filter twice in quick succession never shows the first
//! result.
//!
//! ## Events
//!
//! Backend events are applied through [`CollectionModel::handle_event`] in
//! the order they were emitted. [`CollectionModel::run`] does this for an
//! ordered subscription until the backend goes away.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut model = CollectionModel::new(Arc::new(repository), Grouping::default(), settings);
//! model.init();
//! model.finish_init().await?;
//! model.run(backend.subscribe_ordered(), |changes| view.replay(changes)).await?;
//! ```

use crate::error::{IndexError, Result};
use crate::grouping::Grouping;
use crate::index::{CollectionIndex, IndexChange};
use core_library::repositories::SongRepository;
use core_library::{
    CollectionCounts, CollectionEvent, CollectionQuery, QueryMode, QueryOptions, Song,
};
use core_runtime::config::IndexSettings;
use core_runtime::events::OrderedReceiver;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

struct Population {
    init_id: u64,
    handle: JoinHandle<core_library::Result<Vec<Song>>>,
}

pub struct CollectionModel {
    index: CollectionIndex,
    options: QueryOptions,
    repository: Arc<dyn SongRepository>,
    counts: CollectionCounts,
    init_id: u64,
    population: Option<Population>,
}

impl std::fmt::Debug for CollectionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionModel")
            .field("index", &self.index)
            .field("options", &self.options)
            .field("counts", &self.counts)
            .field("init_id", &self.init_id)
            .field("populating", &self.population.is_some())
            .finish()
    }
}

impl CollectionModel {
    pub fn new(
        repository: Arc<dyn SongRepository>,
        grouping: Grouping,
        settings: IndexSettings,
    ) -> Self {
        Self {
            index: CollectionIndex::new(grouping, settings),
            options: QueryOptions::default(),
            repository,
            counts: CollectionCounts::default(),
            init_id: 0,
            population: None,
        }
    }

    pub fn index(&self) -> &CollectionIndex {
        &self.index
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Latest counters received from the backend.
    pub fn counts(&self) -> CollectionCounts {
        self.counts
    }

    pub fn init_id(&self) -> u64 {
        self.init_id
    }

    pub fn is_populating(&self) -> bool {
        self.population.is_some()
    }

    /// Start repopulating the index in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn init(&mut self) -> Vec<IndexChange> {
        self.init_id += 1;
        if let Some(stale) = self.population.take() {
            stale.handle.abort();
        }

        self.index.set_filter(self.options.clone());
        let changes = self.index.begin_loading();

        let repository = Arc::clone(&self.repository);
        let query = CollectionQuery::from_options(&self.options);
        let handle = tokio::spawn(async move { repository.query(&query).await });
        self.population = Some(Population {
            init_id: self.init_id,
            handle,
        });

        debug!(init_id = self.init_id, "Collection population started");
        changes
    }

    /// Wait for the running population and apply it.
    ///
    /// On a query failure the loading placeholder is cleared and the error
    /// returned; the index stays empty until the next [`Self::init`].
    #[instrument(skip(self), fields(init_id = self.init_id))]
    pub async fn finish_init(&mut self) -> Result<Vec<IndexChange>> {
        let Some(population) = self.population.take() else {
            return Ok(Vec::new());
        };

        let songs = match population.handle.await {
            Ok(Ok(songs)) => songs,
            Ok(Err(e)) => {
                error!(error = %e, "Collection population query failed");
                self.index.reset();
                return Err(e.into());
            }
            Err(e) => {
                self.index.reset();
                return Err(IndexError::Task(e.to_string()));
            }
        };
        Ok(self.apply_population(population.init_id, songs))
    }

    /// Apply a population result tagged `init_id`. Results from an older
    /// [`Self::init`] are dropped.
    pub fn apply_population(&mut self, init_id: u64, songs: Vec<Song>) -> Vec<IndexChange> {
        if init_id != self.init_id {
            debug!(init_id, current = self.init_id, "Dropping stale population");
            return Vec::new();
        }
        info!(songs = songs.len(), init_id, "Collection populated");
        self.index.finish_loading(&songs)
    }

    /// Apply one backend event.
    pub fn handle_event(&mut self, event: &CollectionEvent) -> Vec<IndexChange> {
        match event {
            CollectionEvent::SongsChanged { delta } => self.index.apply(delta),
            CollectionEvent::SongsSlightlyChanged { songs } => {
                self.index.songs_slightly_changed(songs)
            }
            CollectionEvent::CountsUpdated { counts } => {
                self.counts = *counts;
                Vec::new()
            }
            CollectionEvent::DatabaseReset => {
                self.counts = CollectionCounts::default();
                self.index.reset()
            }
            CollectionEvent::DirectoryDiscovered { .. }
            | CollectionEvent::DirectoryDeleted { .. } => Vec::new(),
        }
    }

    // ========================================================================
    // View configuration
    // ========================================================================

    pub fn set_grouping(&mut self, grouping: Grouping) -> Vec<IndexChange> {
        self.index.set_grouping(grouping);
        self.init()
    }

    pub fn set_settings(&mut self, settings: IndexSettings) -> Vec<IndexChange> {
        self.index.set_settings(settings);
        self.init()
    }

    /// Only show songs added within the last `seconds`.
    pub fn set_filter_age(&mut self, seconds: Option<i64>) -> Vec<IndexChange> {
        self.options.set_max_age(seconds);
        self.init()
    }

    pub fn set_filter_text(&mut self, text: Option<String>) -> Vec<IndexChange> {
        self.options.set_filter(text);
        self.init()
    }

    pub fn set_query_mode(&mut self, mode: QueryMode) -> Vec<IndexChange> {
        self.options.set_query_mode(mode);
        self.init()
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Apply events from `receiver` until every sender is gone, handing each
    /// batch of changes to `observer`. A pending population is applied first.
    ///
    /// Returns the number of events applied.
    pub async fn run<F>(
        &mut self,
        mut receiver: OrderedReceiver<CollectionEvent>,
        mut observer: F,
    ) -> Result<usize>
    where
        F: FnMut(&[IndexChange]),
    {
        if self.population.is_some() {
            let changes = self.finish_init().await?;
            observer(&changes);
        }

        let mut handled = 0;
        while let Some(event) = receiver.recv().await {
            let changes = self.handle_event(&event);
            if !changes.is_empty() {
                observer(&changes);
            }
            handled += 1;
        }

        debug!(handled, "Event channel closed");
        Ok(handled)
    }
}
