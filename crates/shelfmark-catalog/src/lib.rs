pub mod error;
pub mod http;
pub mod ndl;

pub use error::{CatalogError, Result};
pub use http::{RequestPolicy, RetryingClient};
pub use ndl::{NDL_UPSTREAM, NdlClient};
