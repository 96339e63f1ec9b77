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
                    .table(DelegationSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DelegationSettings::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DelegationSettings::OrganizationId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DelegationSettings::Title).json_binary().not_null())
                    .col(
                        ColumnDef::new(DelegationSettings::Description)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DelegationSettings::MaxGrants)
                            .small_integer()
                            .not_null()
                            .check(Expr::col(DelegationSettings::MaxGrants).gt(0)),
                    )
                    .col(
                        ColumnDef::new(DelegationSettings::AuthorizationMethod)
                            .string_len(16)
                            .not_null()
                            .default("both"),
                    )
                    .col(
                        ColumnDef::new(DelegationSettings::Active)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DelegationSettings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DelegationSettings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_delegation_settings_organization")
                    .table(DelegationSettings::Table)
                    .col(DelegationSettings::OrganizationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DelegationPonderations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DelegationPonderations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DelegationPonderations::SettingId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DelegationPonderations::Name)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DelegationPonderations::Weight)
                            .double()
                            .not_null()
                            .default(1.0)
                            .check(Expr::col(DelegationPonderations::Weight).gt(0)),
                    )
                    .col(
                        ColumnDef::new(DelegationPonderations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DelegationPonderations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ponderations_setting")
                            .from(DelegationPonderations::Table, DelegationPonderations::SettingId)
                            .to(DelegationSettings::Table, DelegationSettings::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ponderations_setting_name")
                    .table(DelegationPonderations::Table)
                    .col(DelegationPonderations::SettingId)
                    .col(DelegationPonderations::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DelegationParticipants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DelegationParticipants::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DelegationParticipants::SettingId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DelegationParticipants::Email)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DelegationParticipants::Phone)
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DelegationParticipants::UserId)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DelegationParticipants::PonderationId)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DelegationParticipants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DelegationParticipants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participants_setting")
                            .from(DelegationParticipants::Table, DelegationParticipants::SettingId)
                            .to(DelegationSettings::Table, DelegationSettings::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participants_ponderation")
                            .from(
                                DelegationParticipants::Table,
                                DelegationParticipants::PonderationId,
                            )
                            .to(DelegationPonderations::Table, DelegationPonderations::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_participants_setting_user")
                    .table(DelegationParticipants::Table)
                    .col(DelegationParticipants::SettingId)
                    .col(DelegationParticipants::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_participants_setting_email")
                    .table(DelegationParticipants::Table)
                    .col(DelegationParticipants::SettingId)
                    .col(DelegationParticipants::Email)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DelegationParticipants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DelegationPonderations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DelegationSettings::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum DelegationSettings {
    Table,
    Id,
    OrganizationId,
    Title,
    Description,
    MaxGrants,
    AuthorizationMethod,
    Active,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DelegationPonderations {
    Table,
    Id,
    SettingId,
    Name,
    Weight,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DelegationParticipants {
    Table,
    Id,
    SettingId,
    Email,
    Phone,
    UserId,
    PonderationId,
    CreatedAt,
    UpdatedAt,
}
