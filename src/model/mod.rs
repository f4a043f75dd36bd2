pub mod documents;
pub mod schema;

pub use documents::*;
pub use schema::*;
