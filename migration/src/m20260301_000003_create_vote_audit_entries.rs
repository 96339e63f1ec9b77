use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only: rows are never updated or deleted.
        manager
            .create_table(
                Table::create()
                    .table(VoteAuditEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoteAuditEntries::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VoteAuditEntries::VoteId).big_integer().not_null())
                    .col(
                        ColumnDef::new(VoteAuditEntries::QuestionId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteAuditEntries::Event)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteAuditEntries::VoterUid)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(VoteAuditEntries::ActorId).big_integer().null())
                    .col(
                        ColumnDef::new(VoteAuditEntries::DelegationId)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(VoteAuditEntries::CreatedAt)
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
                    .name("idx_vote_audit_entries_vote")
                    .table(VoteAuditEntries::Table)
                    .col(VoteAuditEntries::VoteId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vote_audit_entries_delegation")
                    .table(VoteAuditEntries::Table)
                    .col(VoteAuditEntries::DelegationId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoteAuditEntries::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum VoteAuditEntries {
    Table,
    Id,
    VoteId,
    QuestionId,
    Event,
    VoterUid,
    ActorId,
    DelegationId,
    CreatedAt,
}
