use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::guard::{Admission, InteractionId, RegistrationGuard, RegistrationState};
use crate::config::AppConfig;
use crate::error::{ErrorKind, Result, ShelfError};
use crate::events::{EventBus, LibraryEvent};
use crate::identifiers::Isbn;
use crate::models::{DeletedSeries, DeletedVolume, NewSeries, NewVolume, RegisteredVolume, SeriesId};
use crate::reconcile::CatalogProvider;
use crate::storage::LibraryStore;

/// How one registration attempt ended.
#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RegistrationOutcome {
    Success(RegisteredVolume),
    /// The ISBN is already in the library. Informational, not an error.
    Conflict { isbn: Isbn, series_id: SeriesId },
    RecentlyProcessed {
        isbn: Isbn,
        #[serde(with = "duration_secs")]
        retry_after: Duration,
    },
    /// The input or the catalog answer can never succeed as is.
    Rejected {
        #[serde(serialize_with = "error_message")]
        error: ShelfError,
    },
    /// A transient or internal failure; the user may retry explicitly.
    Failure {
        #[serde(serialize_with = "error_message")]
        error: ShelfError,
    },
    /// Another submission from the same context was still running.
    Dropped,
}

impl RegistrationOutcome {
    /// State to present. A dropped submission leaves the context submitting.
    pub fn state(&self) -> RegistrationState {
        match self {
            Self::Success(_) => RegistrationState::Success,
            Self::Conflict { .. } => RegistrationState::Conflict,
            Self::RecentlyProcessed { .. } => RegistrationState::RecentlyProcessed,
            Self::Rejected { .. } => RegistrationState::Rejected,
            Self::Failure { .. } => RegistrationState::Failure,
            Self::Dropped => RegistrationState::Submitting,
        }
    }

    /// The ISBN now known to be in the library, for reclassifying visible candidates.
    pub fn owned_isbn(&self) -> Option<&Isbn> {
        match self {
            Self::Success(registered) => Some(&registered.volume.isbn),
            Self::Conflict { isbn, .. } => Some(isbn),
            _ => None,
        }
    }

    /// `Ok(None)` for a dropped submission.
    pub fn into_result(self) -> Result<Option<RegisteredVolume>> {
        match self {
            Self::Success(registered) => Ok(Some(registered)),
            Self::Dropped => Ok(None),
            Self::Conflict { isbn, series_id } => Err(ShelfError::AlreadyExists {
                isbn: isbn.to_string(),
                series_id,
            }),
            Self::RecentlyProcessed { isbn, retry_after } => Err(ShelfError::RecentlyProcessed {
                isbn: isbn.to_string(),
                retry_after,
            }),
            Self::Rejected { error } | Self::Failure { error } => Err(error),
        }
    }

    fn from_error(error: ShelfError) -> Self {
        match error.kind() {
            ErrorKind::UpstreamUnavailable | ErrorKind::Internal => Self::Failure { error },
            _ => Self::Rejected { error },
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

fn error_message<S: serde::Serializer>(
    error: &ShelfError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Adds and removes volumes, guarding against double submission and
/// announcing every change on the event bus.
pub struct Registrar {
    catalog: Arc<dyn CatalogProvider>,
    store: Arc<dyn LibraryStore>,
    guard: RegistrationGuard,
    events: EventBus,
}

impl Registrar {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        store: Arc<dyn LibraryStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            guard: RegistrationGuard::new(config.cooldown()),
            events: EventBus::default(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register the volume identified by `raw` on behalf of `context`.
    ///
    /// Invalid identifiers are rejected before the guard so they never
    /// start a cooldown. Every admitted attempt, whatever its outcome,
    /// starts the cooldown for its ISBN.
    pub async fn register(&self, context: InteractionId, raw: &str) -> RegistrationOutcome {
        let isbn = match Isbn::parse(raw) {
            Ok(isbn) => isbn,
            Err(error) => return RegistrationOutcome::Rejected { error },
        };

        let ticket = match self.guard.admit(context, &isbn) {
            Admission::Admitted(ticket) => ticket,
            Admission::Dropped => return RegistrationOutcome::Dropped,
            Admission::RecentlyProcessed { retry_after } => {
                return RegistrationOutcome::RecentlyProcessed { isbn, retry_after };
            }
        };

        let outcome = self.submit(&isbn).await;
        ticket.complete();
        outcome
    }

    async fn submit(&self, isbn: &Isbn) -> RegistrationOutcome {
        match self.store.find_volume(isbn) {
            Ok(Some(existing)) => {
                debug!(isbn = %isbn, series_id = existing.series_id, "volume already registered");
                return self.conflict(isbn, existing.series_id);
            }
            Ok(None) => {}
            Err(error) => return RegistrationOutcome::from_error(error),
        }

        let metadata = match self.catalog.volume_metadata(isbn).await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!(
                    isbn = %isbn,
                    catalog = self.catalog.name(),
                    retryable = error.is_retryable(),
                    %error,
                    "catalog metadata unavailable for registration"
                );
                return RegistrationOutcome::from_error(error);
            }
        };

        let series = NewSeries {
            title: metadata.title,
            author: metadata.author,
            publisher: metadata.publisher,
        };
        let volume = NewVolume {
            isbn: isbn.clone(),
            volume_number: metadata.volume_number,
            cover_url: metadata.cover_url,
        };

        match self.store.insert_volume(&series, &volume) {
            Ok(registered) => {
                info!(
                    isbn = %isbn,
                    series_id = registered.series.id,
                    title = %registered.series.title,
                    "registered volume"
                );
                self.events
                    .publish(LibraryEvent::VolumeRegistered(registered.clone()));
                RegistrationOutcome::Success(registered)
            }
            // lost a race with another writer
            Err(ShelfError::AlreadyExists { series_id, .. }) => self.conflict(isbn, series_id),
            Err(error) => RegistrationOutcome::from_error(error),
        }
    }

    /// Views may still show the volume as missing, so a conflict is announced too.
    fn conflict(&self, isbn: &Isbn, series_id: SeriesId) -> RegistrationOutcome {
        self.events.publish(LibraryEvent::OwnershipConfirmed {
            isbn: isbn.clone(),
            series_id,
        });
        RegistrationOutcome::Conflict {
            isbn: isbn.clone(),
            series_id,
        }
    }

    pub fn delete_volume(&self, raw: &str) -> Result<DeletedVolume> {
        let isbn = Isbn::parse(raw)?;
        let deleted = self.store.delete_volume(&isbn)?;
        info!(
            isbn = %deleted.isbn,
            series_id = deleted.series_id,
            remaining = deleted.remaining_count,
            "deleted volume"
        );
        self.events.publish(LibraryEvent::VolumeDeleted(deleted.clone()));
        Ok(deleted)
    }

    pub fn delete_series(&self, series_id: SeriesId) -> Result<DeletedSeries> {
        let deleted = self.store.delete_series_with_volumes(series_id)?;
        info!(series_id, deleted = deleted.deleted_count, "deleted series");
        self.events.publish(LibraryEvent::SeriesDeleted(deleted.clone()));
        Ok(deleted)
    }
}
