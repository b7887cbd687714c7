//! Create `directus_roles`.
//!
//! `admin_access` and `app_access` drive the user integrity counts.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(string_len(Roles::Id, 36).primary_key())
                    .col(string_len(Roles::Name, 128).not_null())
                    .col(boolean(Roles::AdminAccess).not_null().default(false))
                    .col(boolean(Roles::AppAccess).not_null().default(true))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Roles::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Roles {
    #[sea_orm(iden = "directus_roles")]
    Table,
    Id,
    Name,
    AdminAccess,
    AppAccess,
}
