pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_census_tables;
mod m20260301_000002_create_delegations;
mod m20260301_000003_create_vote_audit_entries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_census_tables::Migration),
            Box::new(m20260301_000002_create_delegations::Migration),
            Box::new(m20260301_000003_create_vote_audit_entries::Migration),
        ]
    }
}
