use sea_orm_migration::prelude::*;

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
                    .col(ColumnDef::new(Users::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Settings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Settings::UserId).string().not_null())
                    .col(ColumnDef::new(Settings::Code).string().not_null())
                    .col(ColumnDef::new(Settings::Value).text())
                    .primary_key(Index::create().col(Settings::UserId).col(Settings::Code))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_settings_user")
                            .from(Settings::Table, Settings::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Currencies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Currencies::UserId).string().not_null())
                    .col(ColumnDef::new(Currencies::Code).string().not_null())
                    .col(ColumnDef::new(Currencies::Name).string().not_null())
                    .primary_key(Index::create().col(Currencies::UserId).col(Currencies::Code))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_currencies_user")
                            .from(Currencies::Table, Currencies::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Categories::UserId).string().not_null())
                    .col(ColumnDef::new(Categories::Code).string().not_null())
                    .col(ColumnDef::new(Categories::Name).string().not_null())
                    .col(
                        ColumnDef::new(Categories::Color)
                            .string()
                            .not_null()
                            .default("#000000"),
                    )
                    .col(ColumnDef::new(Categories::LlmPrompt).text())
                    .col(ColumnDef::new(Categories::CreatedAt).timestamp().not_null())
                    .primary_key(Index::create().col(Categories::UserId).col(Categories::Code))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_categories_user")
                            .from(Categories::Table, Categories::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Projects::UserId).string().not_null())
                    .col(ColumnDef::new(Projects::Code).string().not_null())
                    .col(ColumnDef::new(Projects::Name).string().not_null())
                    .col(
                        ColumnDef::new(Projects::Color)
                            .string()
                            .not_null()
                            .default("#000000"),
                    )
                    .col(ColumnDef::new(Projects::LlmPrompt).text())
                    .col(ColumnDef::new(Projects::CreatedAt).timestamp().not_null())
                    .primary_key(Index::create().col(Projects::UserId).col(Projects::Code))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_user")
                            .from(Projects::Table, Projects::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Fields::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Fields::UserId).string().not_null())
                    .col(ColumnDef::new(Fields::Code).string().not_null())
                    .col(ColumnDef::new(Fields::Name).string().not_null())
                    .col(
                        ColumnDef::new(Fields::Type)
                            .string()
                            .not_null()
                            .default("string"),
                    )
                    .col(ColumnDef::new(Fields::LlmPrompt).text())
                    .col(ColumnDef::new(Fields::Options).json())
                    .col(
                        ColumnDef::new(Fields::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Fields::IsVisibleInList)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Fields::IsVisibleInAnalysis)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Fields::IsRequired)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Fields::IsExtra)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Fields::CreatedAt).timestamp().not_null())
                    .primary_key(Index::create().col(Fields::UserId).col(Fields::Code))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_fields_user")
                            .from(Fields::Table, Fields::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Files::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Files::Id).string().not_null())
                    .col(ColumnDef::new(Files::UserId).string().not_null())
                    .col(ColumnDef::new(Files::Filename).string().not_null())
                    .col(ColumnDef::new(Files::Path).string().not_null())
                    .col(ColumnDef::new(Files::Mimetype).string().not_null())
                    .col(ColumnDef::new(Files::Metadata).json())
                    .col(
                        ColumnDef::new(Files::IsReviewed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Files::IsSplitted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Files::CachedParseResult).json())
                    .col(ColumnDef::new(Files::CreatedAt).timestamp().not_null())
                    .primary_key(Index::create().col(Files::UserId).col(Files::Id))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_files_user")
                            .from(Files::Table, Files::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Transactions::Id).string().not_null())
                    .col(ColumnDef::new(Transactions::UserId).string().not_null())
                    .col(ColumnDef::new(Transactions::Name).string())
                    .col(ColumnDef::new(Transactions::Description).text())
                    .col(ColumnDef::new(Transactions::Merchant).string())
                    .col(ColumnDef::new(Transactions::Note).text())
                    .col(ColumnDef::new(Transactions::Text).text())
                    .col(ColumnDef::new(Transactions::Type).string())
                    .col(ColumnDef::new(Transactions::Total).big_integer())
                    .col(ColumnDef::new(Transactions::CurrencyCode).string())
                    .col(ColumnDef::new(Transactions::ConvertedTotal).big_integer())
                    .col(ColumnDef::new(Transactions::ConvertedCurrencyCode).string())
                    .col(ColumnDef::new(Transactions::IssuedAt).timestamp())
                    .col(ColumnDef::new(Transactions::CategoryCode).string())
                    .col(ColumnDef::new(Transactions::ProjectCode).string())
                    .col(ColumnDef::new(Transactions::Files).json().not_null())
                    .col(ColumnDef::new(Transactions::Extra).json())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(Transactions::UserId)
                            .col(Transactions::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transactions_user")
                            .from(Transactions::Table, Transactions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_user_issued_at")
                    .table(Transactions::Table)
                    .col(Transactions::UserId)
                    .col(Transactions::IssuedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Files::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Fields::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Categories::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Currencies::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Settings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Settings {
    Table,
    UserId,
    Code,
    Value,
}

#[derive(DeriveIden)]
enum Currencies {
    Table,
    UserId,
    Code,
    Name,
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    UserId,
    Code,
    Name,
    Color,
    LlmPrompt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    UserId,
    Code,
    Name,
    Color,
    LlmPrompt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Fields {
    Table,
    UserId,
    Code,
    Name,
    Type,
    LlmPrompt,
    Options,
    Position,
    IsVisibleInList,
    IsVisibleInAnalysis,
    IsRequired,
    IsExtra,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Files {
    Table,
    Id,
    UserId,
    Filename,
    Path,
    Mimetype,
    Metadata,
    IsReviewed,
    IsSplitted,
    CachedParseResult,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    UserId,
    Name,
    Description,
    Merchant,
    Note,
    Text,
    Type,
    Total,
    CurrencyCode,
    ConvertedTotal,
    ConvertedCurrencyCode,
    IssuedAt,
    CategoryCode,
    ProjectCode,
    Files,
    Extra,
    CreatedAt,
    UpdatedAt,
}
