//! Service layer: one mutation pipeline over arbitrary collections.
//! - `ItemsService` runs create/read/update/upsert/delete for a collection.
//! - `FilesService` and `UsersService` specialize it for system collections.
//! - Collaborators (schema, permissions, events, cache, storage, fetch) are traits
//!   wired through `ServiceContext`.

pub mod errors;
pub mod context;
pub mod schema;
pub mod permissions;
pub mod events;
pub mod cache;
pub mod storage;
pub mod fetch;
pub mod mutation;
pub mod items;
pub mod files;
pub mod users;
pub mod bootstrap;
mod payload;
mod sql;
#[cfg(test)]
pub mod test_support;
#[cfg(test)]
mod tests;

pub use context::ServiceContext;
pub use errors::ServiceError;
pub use files::FilesService;
pub use items::{ItemsService, QueryOptions};
pub use mutation::{MutationContext, MutationOptions, MutationTracker, UserIntegrityCheckFlag};
pub use users::UsersService;
