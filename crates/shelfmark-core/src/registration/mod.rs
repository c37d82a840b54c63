mod guard;
mod service;

pub use guard::{Admission, InteractionId, RegistrationGuard, RegistrationState, SubmissionTicket};
pub use service::{Registrar, RegistrationOutcome};
