use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CandyMachines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CandyMachines::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CandyMachines::CandyMachineId)
                            .string_len(128)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(CandyMachines::CreatorAddress).string_len(128))
                    .col(
                        ColumnDef::new(CandyMachines::Status)
                            .string_len(16)
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(CandyMachines::ItemsMinted)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(CandyMachines::CollectionUri).text())
                    .col(ColumnDef::new(CandyMachines::NftUris).json_binary().not_null())
                    // Client-supplied fields without a dedicated column
                    .col(ColumnDef::new(CandyMachines::Extra).json_binary().not_null())
                    .col(
                        ColumnDef::new(CandyMachines::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CandyMachines::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Listing by status, newest first
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_candy_machines_status_created")
                    .table(CandyMachines::Table)
                    .col(CandyMachines::Status)
                    .col(CandyMachines::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Creator dashboards
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_candy_machines_creator")
                    .table(CandyMachines::Table)
                    .col(CandyMachines::CreatorAddress)
                    .col(CandyMachines::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CandyMachines::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CandyMachines {
    Table,
    Id,
    CandyMachineId,
    CreatorAddress,
    Status,
    ItemsMinted,
    CollectionUri,
    NftUris,
    Extra,
    CreatedAt,
    UpdatedAt,
}
