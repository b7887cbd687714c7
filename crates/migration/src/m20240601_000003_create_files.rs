//! Create `directus_files`.
//!
//! `filename_disk` is the object key inside the named `storage` location.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Files::Table)
                    .if_not_exists()
                    .col(string_len(Files::Id, 36).primary_key())
                    .col(string_len(Files::Storage, 64).not_null())
                    .col(string_len_null(Files::FilenameDisk, 255))
                    .col(string_len(Files::FilenameDownload, 255).not_null())
                    .col(string_len_null(Files::Title, 255))
                    .col(string_len_null(Files::Type, 255))
                    .col(big_integer_null(Files::Filesize))
                    .col(string_len_null(Files::UploadedOn, 64))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Files::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Files {
    #[sea_orm(iden = "directus_files")]
    Table,
    Id,
    Storage,
    FilenameDisk,
    FilenameDownload,
    Title,
    Type,
    Filesize,
    UploadedOn,
}
