//! In-memory adapters: deployed process definitions and a static identity directory.

pub mod identity_directory;
pub mod process_registry;

pub use identity_directory::StaticIdentityDirectory;
pub use process_registry::InMemoryProcessRegistry;
