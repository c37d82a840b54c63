use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::identifiers::Isbn;
use crate::models::{
    ClassifiedCandidate, DeletedSeries, DeletedVolume, RegisteredVolume, SeriesId, Volume,
};
use crate::reconcile::{mark_not_owned, mark_owned, merge_volume};

const DEFAULT_CAPACITY: usize = 64;

/// A change to the owned collection. Views subscribe and patch what they show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LibraryEvent {
    VolumeRegistered(RegisteredVolume),
    /// When `remaining_count` is zero the series was removed as well.
    VolumeDeleted(DeletedVolume),
    SeriesDeleted(DeletedSeries),
    /// A registration found the volume already stored, possibly added by
    /// another writer since the view last looked.
    OwnershipConfirmed { isbn: Isbn, series_id: SeriesId },
}

impl LibraryEvent {
    /// Patch a displayed candidate list. Returns how many entries changed.
    pub fn apply_to_candidates(&self, candidates: &mut [ClassifiedCandidate]) -> usize {
        match self {
            Self::VolumeRegistered(registered) => mark_owned(candidates, &registered.volume.isbn),
            Self::OwnershipConfirmed { isbn, .. } => mark_owned(candidates, isbn),
            Self::VolumeDeleted(deleted) => mark_not_owned(candidates, &deleted.isbn),
            Self::SeriesDeleted(deleted) => deleted
                .isbns
                .iter()
                .map(|isbn| mark_not_owned(candidates, isbn))
                .sum(),
        }
    }

    /// Patch the displayed volume list of `series_id`, keeping display order.
    pub fn apply_to_volumes(&self, series_id: SeriesId, volumes: &mut Vec<Volume>) {
        match self {
            Self::VolumeRegistered(registered) if registered.series.id == series_id => {
                merge_volume(volumes, registered.volume.clone());
            }
            Self::VolumeDeleted(deleted) if deleted.series_id == series_id => {
                volumes.retain(|volume| volume.isbn != deleted.isbn);
            }
            Self::SeriesDeleted(deleted) if deleted.series_id == series_id => volumes.clear(),
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LibraryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of subscribers reached; zero is not an error.
    pub fn publish(&self, event: LibraryEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("library event published with no subscribers");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
