//! Create `directus_revisions`: one row per mutated item of a tracked collection.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Revisions::Table)
                    .if_not_exists()
                    .col(pk_auto(Revisions::Id))
                    .col(string_len(Revisions::Action, 16).not_null())
                    .col(string_len(Revisions::Collection, 64).not_null())
                    .col(string_len(Revisions::Item, 255).not_null())
                    .col(text_null(Revisions::Data))
                    .col(text_null(Revisions::Delta))
                    .col(string_len(Revisions::CreatedAt, 64).not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Revisions::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Revisions {
    #[sea_orm(iden = "directus_revisions")]
    Table,
    Id,
    Action,
    Collection,
    Item,
    Data,
    Delta,
    CreatedAt,
}
