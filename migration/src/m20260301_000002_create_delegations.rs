use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

use crate::m20260301_000001_create_census_tables::DelegationSettings;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Delegations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Delegations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Delegations::SettingId).big_integer().not_null())
                    .col(ColumnDef::new(Delegations::GranterId).big_integer().not_null())
                    .col(ColumnDef::new(Delegations::GranteeId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Delegations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Delegations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .check(Expr::col(Delegations::GranterId).ne(Expr::col(Delegations::GranteeId)))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_delegations_setting")
                            .from(Delegations::Table, Delegations::SettingId)
                            .to(DelegationSettings::Table, DelegationSettings::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // One delegation per granter and setting.
        manager
            .create_index(
                Index::create()
                    .name("idx_delegations_setting_granter")
                    .table(Delegations::Table)
                    .col(Delegations::SettingId)
                    .col(Delegations::GranterId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_delegations_setting_grantee")
                    .table(Delegations::Table)
                    .col(Delegations::SettingId)
                    .col(Delegations::GranteeId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Delegations::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Delegations {
    Table,
    Id,
    SettingId,
    GranterId,
    GranteeId,
    CreatedAt,
    UpdatedAt,
}
