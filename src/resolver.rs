//! Decides which census settings govern a resource.
//!
//! Nothing is persisted between a setting and the elections it governs, so
//! every lookup goes back to the election's live census configuration.

use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde_json::Value;
use tracing::debug;

use crate::entities::{election, setting};

pub const INTERNAL_USERS_MANIFEST: &str = "internal_users";
pub const ACTION_DELEGATOR_CENSUS_MANIFEST: &str = "action_delegator_census";
pub const DELEGATIONS_VERIFIER: &str = "delegations_verifier";

/// A resource that may be governed by delegation settings.
#[derive(Debug, Clone, PartialEq)]
pub enum GovernedResource {
    Election {
        census_manifest: String,
        census_settings: Value,
    },
    Other,
}

impl GovernedResource {
    pub fn election(model: &election::Model) -> Self {
        Self::Election {
            census_manifest: model.census_manifest.clone(),
            census_settings: model.census_settings.clone(),
        }
    }

    pub fn setting_ids(&self) -> Vec<i64> {
        match self {
            Self::Election {
                census_manifest,
                census_settings,
            } => resolve_setting_ids(census_manifest, census_settings),
            Self::Other => Vec::new(),
        }
    }
}

/// Ordered, deduplicated setting ids named by a census configuration.
pub fn resolve_setting_ids(manifest: &str, census_settings: &Value) -> Vec<i64> {
    let reference = match manifest {
        ACTION_DELEGATOR_CENSUS_MANIFEST => census_settings.get("setting_id"),
        INTERNAL_USERS_MANIFEST => census_settings
            .pointer("/authorization_handlers/delegations_verifier/options/setting"),
        _ => None,
    };

    let mut ids = Vec::new();
    match reference {
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(id) = setting_id(item) {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }
        Some(item) => ids.extend(setting_id(item)),
        None => {}
    }
    ids
}

fn setting_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().filter(|id| *id > 0),
        Value::String(text) => text.trim().parse::<i64>().ok().filter(|id| *id > 0),
        _ => None,
    }
}

/// Loads the settings governing `resource`, in the order the configuration lists them.
pub async fn settings_for<C: ConnectionTrait>(
    db: &C,
    resource: &GovernedResource,
) -> Result<Vec<setting::Model>, DbErr> {
    let ids = resource.setting_ids();
    if ids.is_empty() {
        debug!(?resource, "No delegation settings resolved");
        return Ok(Vec::new());
    }

    let mut found = setting::Entity::find()
        .filter(setting::Column::Id.is_in(ids.clone()))
        .all(db)
        .await?;
    let mut ordered = Vec::with_capacity(found.len());
    for id in &ids {
        if let Some(position) = found.iter().position(|setting| setting.id == *id) {
            ordered.push(found.swap_remove(position));
        }
    }
    debug!(?ids, resolved = ordered.len(), "Resolved delegation settings");
    Ok(ordered)
}

/// Elections of the setting's organization whose census configuration resolves to it.
pub async fn authorized_resources<C: ConnectionTrait>(
    db: &C,
    setting: &setting::Model,
) -> Result<Vec<election::Model>, DbErr> {
    let elections = election::Entity::find()
        .filter(election::Column::OrganizationId.eq(setting.organization_id))
        .filter(
            election::Column::CensusManifest
                .is_in([INTERNAL_USERS_MANIFEST, ACTION_DELEGATOR_CENSUS_MANIFEST]),
        )
        .order_by_asc(election::Column::Id)
        .all(db)
        .await?;

    Ok(elections
        .into_iter()
        .filter(|election| {
            GovernedResource::election(election)
                .setting_ids()
                .contains(&setting.id)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use serde_json::json;

    use crate::entities::setting::AuthorizationMethod;

    fn internal(setting: Value) -> Value {
        json!({
            "authorization_handlers": {
                "delegations_verifier": { "options": { "setting": setting } }
            }
        })
    }

    fn setting(id: i64) -> setting::Model {
        setting::Model {
            id,
            organization_id: 1,
            title: json!({"en": "Assembly"}),
            description: json!({}),
            max_grants: 1,
            authorization_method: AuthorizationMethod::Both,
            active: true,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn action_delegator_census_reads_top_level_id() {
        let ids = resolve_setting_ids(ACTION_DELEGATOR_CENSUS_MANIFEST, &json!({"setting_id": 4}));
        assert_eq!(ids, vec![4]);
        let ids =
            resolve_setting_ids(ACTION_DELEGATOR_CENSUS_MANIFEST, &json!({"setting_id": "9"}));
        assert_eq!(ids, vec![9]);
    }

    #[test]
    fn internal_users_reads_handler_options() {
        assert_eq!(
            resolve_setting_ids(INTERNAL_USERS_MANIFEST, &internal(json!(3))),
            vec![3]
        );
        assert_eq!(
            resolve_setting_ids(INTERNAL_USERS_MANIFEST, &internal(json!([5, "2", 5, ""]))),
            vec![5, 2]
        );
    }

    #[test]
    fn blank_or_unknown_configuration_resolves_nothing() {
        assert!(resolve_setting_ids(INTERNAL_USERS_MANIFEST, &internal(json!(""))).is_empty());
        assert!(resolve_setting_ids(INTERNAL_USERS_MANIFEST, &internal(json!([]))).is_empty());
        assert!(resolve_setting_ids(INTERNAL_USERS_MANIFEST, &json!({})).is_empty());
        assert!(
            resolve_setting_ids(ACTION_DELEGATOR_CENSUS_MANIFEST, &json!({"setting_id": null}))
                .is_empty()
        );
        assert!(resolve_setting_ids("token_csv", &json!({"setting_id": 1})).is_empty());
        assert!(GovernedResource::Other.setting_ids().is_empty());
    }

    #[tokio::test]
    async fn settings_keep_configuration_order() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![setting(2), setting(5)]])
            .into_connection();
        let resource = GovernedResource::Election {
            census_manifest: INTERNAL_USERS_MANIFEST.to_string(),
            census_settings: internal(json!([5, 2, 8])),
        };

        let resolved = settings_for(&db, &resource).await.unwrap();
        let ids: Vec<i64> = resolved.iter().map(|setting| setting.id).collect();
        assert_eq!(ids, vec![5, 2]);
    }

    #[tokio::test]
    async fn unresolved_resource_skips_the_database() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        assert!(
            settings_for(&db, &GovernedResource::Other)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
