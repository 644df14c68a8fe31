use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Progress::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Progress::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Progress::UserId).string())
                    .col(
                        ColumnDef::new(Progress::Kind)
                            .string()
                            .not_null()
                            .default("generic"),
                    )
                    .col(
                        ColumnDef::new(Progress::Total)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Progress::Current)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Progress::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Progress::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Progress::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Progress {
    Table,
    Id,
    UserId,
    Kind,
    Total,
    Current,
    CreatedAt,
    UpdatedAt,
}
