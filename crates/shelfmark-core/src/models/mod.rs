pub mod candidate;
pub mod series;
pub mod volume;

pub use candidate::*;
pub use series::*;
pub use volume::*;
