//! Lookup indexes: users by role, revisions by (collection, item).
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx_directus_users_role")
                    .table(Users::Table)
                    .col(Users::Role)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_directus_revisions_item")
                    .table(Revisions::Table)
                    .col(Revisions::Collection)
                    .col(Revisions::Item)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_directus_revisions_item").table(Revisions::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_directus_users_role").table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    #[sea_orm(iden = "directus_users")]
    Table,
    Role,
}

#[derive(DeriveIden)]
enum Revisions {
    #[sea_orm(iden = "directus_revisions")]
    Table,
    Collection,
    Item,
}
