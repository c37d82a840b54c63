pub mod extract;
pub mod isbn;

pub use extract::extract_isbn_from_text;
pub use isbn::Isbn;
