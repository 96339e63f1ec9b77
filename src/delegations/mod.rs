//! Granter to grantee edges inside a setting.
//!
//! A granter holds at most one delegation per setting and a grantee at most
//! `max_grants`. The grantee cap is count based, so creation locks the
//! setting row for the whole check-then-insert.

use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr, TransactionTrait,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::census::fixed_now;
use crate::entities::{delegation, setting, user};
use crate::resolver::{self, GovernedResource};

#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("granter is not eligible for this setting")]
    InvalidGranter,
    #[error("grantee is not eligible for this delegation")]
    InvalidGrantee,
    #[error("granter already delegated in this setting")]
    DuplicateGranter,
    #[error("grantee already holds the maximum of {max_grants} delegations")]
    GranteeCapExceeded { max_grants: i16 },
    #[error("grantee already voted on behalf of the granter")]
    GranteeAlreadyVoted,
    #[error("setting {0} not found")]
    SettingNotFound(i64),
    #[error("delegation {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl DelegationError {
    /// Field the failure is reported against, if it is a validation failure.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidGranter | Self::DuplicateGranter => Some("granter_id"),
            Self::InvalidGrantee | Self::GranteeCapExceeded { .. } => Some("grantee_id"),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidGranter | Self::InvalidGrantee => "invalid",
            Self::DuplicateGranter => "taken",
            Self::GranteeCapExceeded { .. } => "too_many_grants",
            Self::GranteeAlreadyVoted => "grantee_already_voted",
            Self::SettingNotFound(_) | Self::NotFound(_) => "not_found",
            Self::Database(_) => "database",
        }
    }
}

/// Existing edges touching the requested granter and grantee in the setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExistingGrants {
    pub by_granter: u64,
    pub to_grantee: u64,
}

/// Rules for a new edge, evaluated against already loaded rows.
pub fn check_delegation(
    setting: &setting::Model,
    granter: Option<&user::Model>,
    grantee: Option<&user::Model>,
    existing: ExistingGrants,
) -> Result<(), DelegationError> {
    let granter = granter
        .filter(|user| user.deleted_at.is_none())
        .ok_or(DelegationError::InvalidGranter)?;
    let grantee = grantee
        .filter(|user| user.deleted_at.is_none())
        .ok_or(DelegationError::InvalidGrantee)?;

    if granter.id == grantee.id {
        return Err(DelegationError::InvalidGrantee);
    }
    if granter.organization_id != setting.organization_id {
        return Err(DelegationError::InvalidGranter);
    }
    if grantee.organization_id != granter.organization_id {
        return Err(DelegationError::InvalidGrantee);
    }
    if existing.by_granter > 0 {
        return Err(DelegationError::DuplicateGranter);
    }
    let max_grants = setting.max_grants;
    if existing.to_grantee >= u64::try_from(max_grants).unwrap_or(0) {
        return Err(DelegationError::GranteeCapExceeded { max_grants });
    }
    Ok(())
}

pub async fn create_delegation(
    db: &DatabaseConnection,
    setting_id: i64,
    granter_id: i64,
    grantee_id: i64,
) -> Result<delegation::Model, DelegationError> {
    let txn = db.begin().await?;

    let setting = setting::Entity::find_by_id(setting_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or(DelegationError::SettingNotFound(setting_id))?;
    let granter = user::Entity::find_by_id(granter_id).one(&txn).await?;
    let grantee = user::Entity::find_by_id(grantee_id).one(&txn).await?;

    let by_granter = delegation::Entity::find()
        .filter(delegation::Column::SettingId.eq(setting_id))
        .filter(delegation::Column::GranterId.eq(granter_id))
        .count(&txn)
        .await?;
    let to_grantee = delegation::Entity::find()
        .filter(delegation::Column::SettingId.eq(setting_id))
        .filter(delegation::Column::GranteeId.eq(grantee_id))
        .count(&txn)
        .await?;

    if let Err(err) = check_delegation(
        &setting,
        granter.as_ref(),
        grantee.as_ref(),
        ExistingGrants {
            by_granter,
            to_grantee,
        },
    ) {
        warn!(setting_id, granter_id, grantee_id, %err, "Refused delegation");
        return Err(err);
    }

    let now = fixed_now();
    let created = delegation::ActiveModel {
        id: NotSet,
        setting_id: Set(setting_id),
        granter_id: Set(granter_id),
        grantee_id: Set(grantee_id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await
    .map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => DelegationError::DuplicateGranter,
        _ => DelegationError::Database(err),
    })?;

    txn.commit().await?;
    info!(
        delegation_id = created.id,
        setting_id, granter_id, grantee_id, "Created delegation"
    );
    Ok(created)
}

/// Whether the grantee already cast a ballot through this delegation.
// TODO: join vote_audit_entries on delegation_id once removal after voting must be blocked.
pub fn grantee_voted(_delegation: &delegation::Model) -> bool {
    false
}

pub async fn delete_delegation<C: ConnectionTrait>(db: &C, id: i64) -> Result<(), DelegationError> {
    let existing = delegation::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(DelegationError::NotFound(id))?;
    if grantee_voted(&existing) {
        warn!(delegation_id = id, "Refused to delete used delegation");
        return Err(DelegationError::GranteeAlreadyVoted);
    }
    delegation::Entity::delete_by_id(id).exec(db).await?;
    info!(delegation_id = id, setting_id = existing.setting_id, "Deleted delegation");
    Ok(())
}

pub async fn list_for_setting<C: ConnectionTrait>(
    db: &C,
    setting_id: i64,
) -> Result<Vec<delegation::Model>, DbErr> {
    delegation::Entity::find()
        .filter(delegation::Column::SettingId.eq(setting_id))
        .order_by_asc(delegation::Column::Id)
        .all(db)
        .await
}

/// Delegations held by `grantee_id` in the settings governing `resource`.
pub async fn delegations_for<C: ConnectionTrait>(
    db: &C,
    resource: &GovernedResource,
    grantee_id: i64,
) -> Result<Vec<delegation::Model>, DbErr> {
    let setting_ids = resource.setting_ids();
    if setting_ids.is_empty() {
        return Ok(Vec::new());
    }
    delegation::Entity::find()
        .filter(delegation::Column::SettingId.is_in(setting_ids))
        .filter(delegation::Column::GranteeId.eq(grantee_id))
        .order_by_asc(delegation::Column::Id)
        .all(db)
        .await
}

/// Looks up a delegation the actor may vote through in this resource.
pub async fn usable_delegation<C: ConnectionTrait>(
    db: &C,
    resource: &GovernedResource,
    grantee_id: i64,
    delegation_id: i64,
) -> Result<Option<delegation::Model>, DbErr> {
    let setting_ids = resource.setting_ids();
    let found = delegation::Entity::find_by_id(delegation_id).one(db).await?;
    Ok(found.filter(|delegation| {
        delegation.grantee_id == grantee_id && setting_ids.contains(&delegation.setting_id)
    }))
}

/// Settings of `resource` paired with the delegations the grantee holds in each.
pub async fn grouped_for<C: ConnectionTrait>(
    db: &C,
    resource: &GovernedResource,
    grantee_id: i64,
) -> Result<Vec<(setting::Model, Vec<delegation::Model>)>, DbErr> {
    let settings = resolver::settings_for(db, resource).await?;
    let delegations = delegations_for(db, resource, grantee_id).await?;
    Ok(settings
        .into_iter()
        .map(|setting| {
            let held = delegations
                .iter()
                .filter(|delegation| delegation.setting_id == setting.id)
                .cloned()
                .collect();
            (setting, held)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::json;

    use crate::entities::setting::AuthorizationMethod;

    fn setting(max_grants: i16) -> setting::Model {
        setting::Model {
            id: 1,
            organization_id: 10,
            title: json!({"en": "Assembly"}),
            description: json!({}),
            max_grants,
            authorization_method: AuthorizationMethod::Email,
            active: true,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn user(id: i64, organization_id: i64) -> user::Model {
        user::Model {
            id,
            organization_id,
            email: format!("user{id}@example.org"),
            name: format!("User {id}"),
            deleted_at: None,
        }
    }

    fn edge(id: i64, granter_id: i64, grantee_id: i64) -> delegation::Model {
        delegation::Model {
            id,
            setting_id: 1,
            granter_id,
            grantee_id,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn count_row(count: i64) -> std::collections::BTreeMap<&'static str, sea_orm::Value> {
        maplit::btreemap! {
            "num_items" => sea_orm::Value::BigInt(Some(count))
        }
    }

    #[test]
    fn self_delegation_is_an_invalid_grantee() {
        let granter = user(1, 10);
        let result = check_delegation(
            &setting(2),
            Some(&granter),
            Some(&granter),
            ExistingGrants::default(),
        );
        assert!(matches!(result, Err(DelegationError::InvalidGrantee)));
    }

    #[test]
    fn organizations_must_match() {
        let outsider = user(1, 99);
        let member = user(2, 10);
        assert!(matches!(
            check_delegation(
                &setting(2),
                Some(&outsider),
                Some(&member),
                ExistingGrants::default()
            ),
            Err(DelegationError::InvalidGranter)
        ));
        let other_org_grantee = user(3, 99);
        assert!(matches!(
            check_delegation(
                &setting(2),
                Some(&member),
                Some(&other_org_grantee),
                ExistingGrants::default()
            ),
            Err(DelegationError::InvalidGrantee)
        ));
        assert!(matches!(
            check_delegation(&setting(2), None, Some(&member), ExistingGrants::default()),
            Err(DelegationError::InvalidGranter)
        ));
    }

    #[test]
    fn granter_delegates_once_per_setting() {
        let existing = ExistingGrants {
            by_granter: 1,
            to_grantee: 0,
        };
        let result =
            check_delegation(&setting(5), Some(&user(1, 10)), Some(&user(2, 10)), existing);
        assert!(matches!(result, Err(DelegationError::DuplicateGranter)));
    }

    #[test]
    fn grantee_cap_applies_per_grantee() {
        let full = ExistingGrants {
            by_granter: 0,
            to_grantee: 1,
        };
        let result = check_delegation(&setting(1), Some(&user(3, 10)), Some(&user(2, 10)), full);
        assert!(matches!(
            result,
            Err(DelegationError::GranteeCapExceeded { max_grants: 1 })
        ));

        let other_grantee = check_delegation(
            &setting(1),
            Some(&user(3, 10)),
            Some(&user(4, 10)),
            ExistingGrants::default(),
        );
        assert!(other_grantee.is_ok());
    }

    #[test]
    fn errors_map_to_fields() {
        assert_eq!(DelegationError::DuplicateGranter.field(), Some("granter_id"));
        assert_eq!(
            DelegationError::GranteeCapExceeded { max_grants: 1 }.field(),
            Some("grantee_id")
        );
        assert_eq!(DelegationError::GranteeAlreadyVoted.field(), None);
    }

    #[tokio::test]
    async fn create_persists_a_valid_edge() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[setting(2)]])
            .append_query_results([[user(1, 10)]])
            .append_query_results([[user(2, 10)]])
            .append_query_results([[count_row(0)]])
            .append_query_results([[count_row(1)]])
            .append_query_results([[edge(7, 1, 2)]])
            .into_connection();

        let created = create_delegation(&db, 1, 1, 2).await.unwrap();
        assert_eq!(created.id, 7);
        assert_eq!(created.grantee_id, 2);
    }

    #[tokio::test]
    async fn create_refuses_second_edge_for_capped_grantee() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[setting(1)]])
            .append_query_results([[user(3, 10)]])
            .append_query_results([[user(2, 10)]])
            .append_query_results([[count_row(0)]])
            .append_query_results([[count_row(1)]])
            .into_connection();

        let result = create_delegation(&db, 1, 3, 2).await;
        assert!(matches!(
            result,
            Err(DelegationError::GranteeCapExceeded { max_grants: 1 })
        ));
    }

    #[tokio::test]
    async fn delete_removes_unused_delegation() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[edge(7, 1, 2)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        assert!(delete_delegation(&db, 7).await.is_ok());
    }

    #[tokio::test]
    async fn usable_delegation_requires_governing_setting() {
        let resource = GovernedResource::Election {
            census_manifest: resolver::ACTION_DELEGATOR_CENSUS_MANIFEST.to_string(),
            census_settings: json!({"setting_id": 2}),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[edge(7, 1, 2)]])
            .into_connection();

        let found = usable_delegation(&db, &resource, 2, 7).await.unwrap();
        assert!(found.is_none());
    }
}
