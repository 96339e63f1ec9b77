//! Census model: settings, ponderations and participants.
//!
//! A setting is a bundle of governance rules for one or more elections. Its
//! participants form the census, and ponderations are the weight classes
//! assigned to them. Rows that others depend on are never cascaded away.

pub mod forms;
pub mod identity;

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::census::forms::{ParticipantForm, PonderationForm, SettingForm};
use crate::config::CensusConfig;
use crate::entities::{delegation, participant, ponderation, setting, user};
use crate::error::FieldErrors;

#[derive(Debug, Error)]
pub enum CensusError {
    #[error("setting {0} not found")]
    SettingNotFound(i64),
    #[error("ponderation {0} not found")]
    PonderationNotFound(i64),
    #[error("participant {0} not found")]
    ParticipantNotFound(i64),
    #[error("invalid fields: {0}")]
    Invalid(#[from] FieldErrors),
    #[error(
        "setting {id} still owns {} participants, {} ponderations and {} delegations",
        .dependents.participants,
        .dependents.ponderations,
        .dependents.delegations
    )]
    SettingInUse { id: i64, dependents: SettingDependents },
    #[error("ponderation {id} is assigned to {participants} participants")]
    PonderationInUse { id: i64, participants: u64 },
    #[error(transparent)]
    Database(#[from] DbErr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingDependents {
    pub participants: u64,
    pub ponderations: u64,
    pub delegations: u64,
}

impl SettingDependents {
    pub fn destroyable(&self) -> bool {
        self.participants == 0 && self.ponderations == 0 && self.delegations == 0
    }
}

pub(crate) fn fixed_now() -> DateTimeWithTimeZone {
    Utc::now().fixed_offset()
}

pub async fn find_setting<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<setting::Model, CensusError> {
    setting::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(CensusError::SettingNotFound(id))
}

pub async fn list_settings<C: ConnectionTrait>(
    db: &C,
    organization_id: i64,
) -> Result<Vec<setting::Model>, CensusError> {
    let settings = setting::Entity::find()
        .filter(setting::Column::OrganizationId.eq(organization_id))
        .order_by_desc(setting::Column::CreatedAt)
        .all(db)
        .await?;
    Ok(settings)
}

/// Creates a setting, optionally seeding it with the ponderations and
/// participants of another setting of the same organization.
pub async fn create_setting(
    db: &DatabaseConnection,
    organization_id: i64,
    form: SettingForm,
    copy_from_setting_id: Option<i64>,
) -> Result<setting::Model, CensusError> {
    form.check()?;

    let txn = db.begin().await?;
    let source = match copy_from_setting_id {
        Some(source_id) => {
            let source = find_setting(&txn, source_id).await?;
            if source.organization_id != organization_id {
                return Err(FieldErrors::single("copy_from_setting_id", "invalid").into());
            }
            Some(source)
        }
        None => None,
    };

    let now = fixed_now();
    let created = setting::ActiveModel {
        id: NotSet,
        organization_id: Set(organization_id),
        title: Set(form.title_json()),
        description: Set(form.description_json()),
        max_grants: Set(form.max_grants as i16),
        authorization_method: Set(form.authorization_method),
        active: Set(form.active),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    if let Some(source) = source {
        copy_census(&txn, source.id, created.id).await?;
    }

    txn.commit().await?;
    info!(
        setting_id = created.id,
        organization_id, "Created delegation setting"
    );
    Ok(created)
}

async fn copy_census<C: ConnectionTrait>(db: &C, from: i64, to: i64) -> Result<(), DbErr> {
    let now = fixed_now();
    let mut ponderation_ids = HashMap::new();

    let ponderations = ponderation::Entity::find()
        .filter(ponderation::Column::SettingId.eq(from))
        .order_by_asc(ponderation::Column::Id)
        .all(db)
        .await?;
    for source in ponderations {
        let copy = ponderation::ActiveModel {
            id: NotSet,
            setting_id: Set(to),
            name: Set(source.name),
            weight: Set(source.weight),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;
        ponderation_ids.insert(source.id, copy.id);
    }

    let participants = participant::Entity::find()
        .filter(participant::Column::SettingId.eq(from))
        .order_by_asc(participant::Column::Id)
        .all(db)
        .await?;
    let copied = participants.len();
    for source in participants {
        participant::ActiveModel {
            id: NotSet,
            setting_id: Set(to),
            email: Set(source.email),
            phone: Set(source.phone),
            user_id: Set(source.user_id),
            ponderation_id: Set(source
                .ponderation_id
                .and_then(|id| ponderation_ids.get(&id).copied())),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;
    }

    info!(
        from,
        to,
        ponderations = ponderation_ids.len(),
        participants = copied,
        "Copied census between settings"
    );
    Ok(())
}

pub async fn update_setting<C: ConnectionTrait>(
    db: &C,
    id: i64,
    form: SettingForm,
) -> Result<setting::Model, CensusError> {
    form.check()?;
    let mut active = find_setting(db, id).await?.into_active_model();
    active.title = Set(form.title_json());
    active.description = Set(form.description_json());
    active.max_grants = Set(form.max_grants as i16);
    active.authorization_method = Set(form.authorization_method);
    active.active = Set(form.active);
    active.updated_at = Set(fixed_now());
    let updated = active.update(db).await?;
    info!(setting_id = id, "Updated delegation setting");
    Ok(updated)
}

pub async fn setting_dependents<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<SettingDependents, DbErr> {
    let participants = participant::Entity::find()
        .filter(participant::Column::SettingId.eq(id))
        .count(db)
        .await?;
    let ponderations = ponderation::Entity::find()
        .filter(ponderation::Column::SettingId.eq(id))
        .count(db)
        .await?;
    let delegations = delegation::Entity::find()
        .filter(delegation::Column::SettingId.eq(id))
        .count(db)
        .await?;
    Ok(SettingDependents {
        participants,
        ponderations,
        delegations,
    })
}

/// Refuses to remove a setting that still owns census or delegation rows.
pub async fn destroy_setting<C: ConnectionTrait>(db: &C, id: i64) -> Result<(), CensusError> {
    find_setting(db, id).await?;
    let dependents = setting_dependents(db, id).await?;
    if !dependents.destroyable() {
        warn!(setting_id = id, ?dependents, "Refused to destroy setting");
        return Err(CensusError::SettingInUse { id, dependents });
    }
    setting::Entity::delete_by_id(id).exec(db).await?;
    info!(setting_id = id, "Destroyed delegation setting");
    Ok(())
}

pub async fn list_ponderations<C: ConnectionTrait>(
    db: &C,
    setting_id: i64,
) -> Result<Vec<ponderation::Model>, CensusError> {
    let ponderations = ponderation::Entity::find()
        .filter(ponderation::Column::SettingId.eq(setting_id))
        .order_by_asc(ponderation::Column::Name)
        .all(db)
        .await?;
    Ok(ponderations)
}

pub async fn create_ponderation<C: ConnectionTrait>(
    db: &C,
    setting_id: i64,
    form: PonderationForm,
) -> Result<ponderation::Model, CensusError> {
    form.check()?;
    find_setting(db, setting_id).await?;

    // Uniqueness is case-sensitive.
    let taken = ponderation::Entity::find()
        .filter(ponderation::Column::SettingId.eq(setting_id))
        .filter(ponderation::Column::Name.eq(form.name.clone()))
        .count(db)
        .await?;
    if taken > 0 {
        return Err(FieldErrors::single("name", "taken").into());
    }

    let now = fixed_now();
    let created = ponderation::ActiveModel {
        id: NotSet,
        setting_id: Set(setting_id),
        name: Set(form.name),
        weight: Set(form.weight),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    info!(
        setting_id,
        ponderation_id = created.id,
        weight = created.weight,
        "Created ponderation"
    );
    Ok(created)
}

pub async fn destroy_ponderation<C: ConnectionTrait>(
    db: &C,
    setting_id: i64,
    id: i64,
) -> Result<(), CensusError> {
    ponderation::Entity::find_by_id(id)
        .filter(ponderation::Column::SettingId.eq(setting_id))
        .one(db)
        .await?
        .ok_or(CensusError::PonderationNotFound(id))?;

    let participants = participant::Entity::find()
        .filter(participant::Column::PonderationId.eq(id))
        .count(db)
        .await?;
    if participants > 0 {
        warn!(ponderation_id = id, participants, "Refused to destroy ponderation");
        return Err(CensusError::PonderationInUse { id, participants });
    }

    ponderation::Entity::delete_by_id(id).exec(db).await?;
    info!(setting_id, ponderation_id = id, "Destroyed ponderation");
    Ok(())
}

pub async fn list_participants<C: ConnectionTrait>(
    db: &C,
    setting_id: i64,
) -> Result<Vec<participant::Model>, CensusError> {
    let participants = participant::Entity::find()
        .filter(participant::Column::SettingId.eq(setting_id))
        .order_by_asc(participant::Column::Id)
        .all(db)
        .await?;
    Ok(participants)
}

pub async fn create_participant<C: ConnectionTrait>(
    db: &C,
    census: &CensusConfig,
    setting_id: i64,
    form: ParticipantForm,
) -> Result<participant::Model, CensusError> {
    let setting = find_setting(db, setting_id).await?;
    let form = form.normalized();
    let phone_pattern = census
        .phone_regex()
        .map_err(|err| DbErr::Custom(err.to_string()))?;

    let mut errors = form.check_for(setting.authorization_method, &phone_pattern);
    if let Some(ponderation_id) = form.ponderation_id {
        let owned = ponderation::Entity::find_by_id(ponderation_id)
            .filter(ponderation::Column::SettingId.eq(setting_id))
            .count(db)
            .await?;
        if owned == 0 {
            errors.add("ponderation_id", "invalid");
        }
    }
    errors.into_result()?;

    let now = fixed_now();
    let created = participant::ActiveModel {
        id: NotSet,
        setting_id: Set(setting_id),
        email: Set(form.email),
        phone: Set(form.phone),
        user_id: Set(form.user_id),
        ponderation_id: Set(form.ponderation_id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    info!(setting_id, participant_id = created.id, "Created participant");
    Ok(created)
}

pub async fn destroy_participant<C: ConnectionTrait>(
    db: &C,
    setting_id: i64,
    id: i64,
) -> Result<(), CensusError> {
    let result = participant::Entity::delete_many()
        .filter(participant::Column::Id.eq(id))
        .filter(participant::Column::SettingId.eq(setting_id))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(CensusError::ParticipantNotFound(id));
    }
    info!(setting_id, participant_id = id, "Destroyed participant");
    Ok(())
}

/// Users bound to the setting's census plus every grantee holding one of its delegations.
pub async fn eligible_voters<C: ConnectionTrait>(
    db: &C,
    setting_id: i64,
) -> Result<Vec<user::Model>, CensusError> {
    let mut user_ids: Vec<i64> = participant::Entity::find()
        .filter(participant::Column::SettingId.eq(setting_id))
        .filter(participant::Column::UserId.is_not_null())
        .all(db)
        .await?
        .into_iter()
        .filter_map(|participant| participant.user_id)
        .collect();
    user_ids.extend(
        delegation::Entity::find()
            .filter(delegation::Column::SettingId.eq(setting_id))
            .all(db)
            .await?
            .into_iter()
            .map(|delegation| delegation.grantee_id),
    );
    user_ids.sort_unstable();
    user_ids.dedup();
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }

    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .filter(user::Column::DeletedAt.is_null())
        .order_by_asc(user::Column::Id)
        .all(db)
        .await?;
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::json;

    #[test]
    fn settings_are_linked_to_elections_only_through_census_configuration() {
        use sea_orm::{IdenStatic, Iterable};

        let columns: Vec<String> = setting::Column::iter().map(|column| column.as_str().to_owned()).collect();
        assert_eq!(
            columns,
            [
                "id",
                "organization_id",
                "title",
                "description",
                "max_grants",
                "authorization_method",
                "active",
                "created_at",
                "updated_at",
            ]
        );
    }

    fn sample_setting(id: i64) -> setting::Model {
        setting::Model {
            id,
            organization_id: 1,
            title: json!({"en": "General assembly"}),
            description: json!({}),
            max_grants: 2,
            authorization_method: setting::AuthorizationMethod::Email,
            active: true,
            created_at: fixed_now(),
            updated_at: fixed_now(),
        }
    }

    fn count_row(count: i64) -> std::collections::BTreeMap<&'static str, sea_orm::Value> {
        maplit::btreemap! {
            "num_items" => sea_orm::Value::BigInt(Some(count))
        }
    }

    #[test]
    fn dependents_block_destruction() {
        assert!(SettingDependents::default().destroyable());
        let busy = SettingDependents {
            participants: 0,
            ponderations: 1,
            delegations: 0,
        };
        assert!(!busy.destroyable());
    }

    #[tokio::test]
    async fn destroy_setting_refuses_with_dependents() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sample_setting(7)]])
            .append_query_results([[count_row(3)]])
            .append_query_results([[count_row(0)]])
            .append_query_results([[count_row(1)]])
            .into_connection();

        let err = destroy_setting(&db, 7).await.unwrap_err();
        match err {
            CensusError::SettingInUse { id, dependents } => {
                assert_eq!(id, 7);
                assert_eq!(dependents.participants, 3);
                assert_eq!(dependents.delegations, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn destroy_empty_setting_succeeds() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sample_setting(7)]])
            .append_query_results([[count_row(0)]])
            .append_query_results([[count_row(0)]])
            .append_query_results([[count_row(0)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        assert!(destroy_setting(&db, 7).await.is_ok());
    }

    #[tokio::test]
    async fn eligible_voters_include_grantees() {
        let now = fixed_now();
        let bound = participant::Model {
            id: 1,
            setting_id: 7,
            email: None,
            phone: None,
            user_id: Some(3),
            ponderation_id: None,
            created_at: now,
            updated_at: now,
        };
        let edge = delegation::Model {
            id: 1,
            setting_id: 7,
            granter_id: 3,
            grantee_id: 4,
            created_at: now,
            updated_at: now,
        };
        let voter = |id| user::Model {
            id,
            organization_id: 1,
            email: format!("user{id}@example.org"),
            name: format!("User {id}"),
            deleted_at: None,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[bound]])
            .append_query_results([[edge]])
            .append_query_results([[voter(3), voter(4)]])
            .into_connection();

        let voters = eligible_voters(&db, 7).await.unwrap();
        let ids: Vec<i64> = voters.iter().map(|user| user.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn missing_setting_is_reported() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<setting::Model>::new()])
            .into_connection();

        assert!(matches!(
            find_setting(&db, 99).await,
            Err(CensusError::SettingNotFound(99))
        ));
    }

    #[tokio::test]
    async fn duplicate_ponderation_name_is_a_field_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sample_setting(7)]])
            .append_query_results([[count_row(1)]])
            .into_connection();

        let form = PonderationForm {
            name: "Owners".to_string(),
            weight: 3.0,
        };
        match create_ponderation(&db, 7, form).await {
            Err(CensusError::Invalid(errors)) => assert_eq!(errors.codes("name"), ["taken"]),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn participant_with_foreign_ponderation_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sample_setting(7)]])
            .append_query_results([[count_row(0)]])
            .into_connection();

        let form = ParticipantForm {
            email: Some("member@example.org".to_string()),
            ponderation_id: Some(55),
            ..ParticipantForm::default()
        };
        match create_participant(&db, &CensusConfig::default(), 7, form).await {
            Err(CensusError::Invalid(errors)) => {
                assert_eq!(errors.codes("ponderation_id"), ["invalid"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
