mod memory;
mod models;
mod schema;
mod store;
mod trait_def;

pub use memory::MemoryLibraryStore;
pub use models::{ResumeCursor, UserLibraryRecord};
pub use store::SqliteLibraryStore;
pub use trait_def::LibraryStore;

#[cfg(feature = "mock")]
pub use trait_def::MockLibraryStore;
