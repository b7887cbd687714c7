//! Create `directus_users` with a nullable FK to `directus_roles`.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(string_len(Users::Id, 36).primary_key())
                    .col(string_len_null(Users::Email, 255).unique_key())
                    .col(string_len_null(Users::FirstName, 128))
                    .col(string_len_null(Users::LastName, 128))
                    .col(string_len(Users::Status, 16).not_null().default("active"))
                    .col(string_len_null(Users::Role, 36))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_directus_users_role")
                            .from(Users::Table, Users::Role)
                            .to(Roles::Table, Roles::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Users::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Users {
    #[sea_orm(iden = "directus_users")]
    Table,
    Id,
    Email,
    FirstName,
    LastName,
    Status,
    Role,
}

#[derive(DeriveIden)]
enum Roles {
    #[sea_orm(iden = "directus_roles")]
    Table,
    Id,
}
