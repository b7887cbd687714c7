//! Migrator creating the system tables the service layer writes to directly.
//! User collections are not managed here.
pub use sea_orm_migration::prelude::*;

mod m20240601_000001_create_roles;
mod m20240601_000002_create_users;
mod m20240601_000003_create_files;
mod m20240601_000004_create_revisions;
mod m20240601_000005_add_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_roles::Migration),
            Box::new(m20240601_000002_create_users::Migration),
            Box::new(m20240601_000003_create_files::Migration),
            Box::new(m20240601_000004_create_revisions::Migration),
            // Indexes should always be applied last
            Box::new(m20240601_000005_add_indexes::Migration),
        ]
    }
}
