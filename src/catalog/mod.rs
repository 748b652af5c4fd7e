pub mod encar;
pub mod traits;
pub mod types;

pub use encar::EncarClient;
pub use traits::{CatalogProvider, ListingSource};
