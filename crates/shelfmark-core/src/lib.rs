pub mod config;
pub mod error;
pub mod events;
pub mod identifiers;
pub mod models;
pub mod reconcile;
pub mod registration;
pub mod storage;

pub use config::AppConfig;
pub use error::{ErrorKind, ExitCode, Result, ShelfError, UpstreamFailure};
pub use events::{EventBus, LibraryEvent};
pub use identifiers::{Isbn, extract_isbn_from_text};
pub use models::*;

pub use reconcile::{CatalogProvider, EditionFilter, Reconciler};
pub use registration::{InteractionId, Registrar, RegistrationOutcome, RegistrationState};

pub use storage::database::{ConnectionPool, open_database, open_in_memory};
pub use storage::repositories::{
    Repository, SeriesRepository, SqliteSeriesRepository, SqliteVolumeRepository,
    VolumeRepository,
};
pub use storage::{Library, LibraryStore};
