use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::census::SettingDependents;
use crate::census::forms::SettingForm;
use crate::entities::setting::AuthorizationMethod;
use crate::entities::{delegation, participant, ponderation, setting, user};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSettingRequest {
    #[serde(flatten)]
    pub setting: SettingForm,
    pub copy_from_setting_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingView {
    pub id: i64,
    pub organization_id: i64,
    pub title: Value,
    pub description: Value,
    pub max_grants: i16,
    pub authorization_method: AuthorizationMethod,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<setting::Model> for SettingView {
    fn from(model: setting::Model) -> Self {
        Self {
            id: model.id,
            organization_id: model.organization_id,
            title: model.title,
            description: model.description,
            max_grants: model.max_grants,
            authorization_method: model.authorization_method,
            active: model.active,
            created_at: model.created_at.timestamp(),
            updated_at: model.updated_at.timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDetailView {
    #[serde(flatten)]
    pub setting: SettingView,
    pub participants_count: u64,
    pub ponderations_count: u64,
    pub delegations_count: u64,
    pub destroyable: bool,
    pub authorized_resources: Vec<ResourceView>,
}

impl SettingDetailView {
    pub fn new(
        setting: setting::Model,
        dependents: SettingDependents,
        authorized_resources: Vec<ResourceView>,
    ) -> Self {
        Self {
            setting: setting.into(),
            participants_count: dependents.participants,
            ponderations_count: dependents.ponderations,
            delegations_count: dependents.delegations,
            destroyable: dependents.destroyable(),
            authorized_resources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceView {
    pub id: i64,
    pub title: String,
    pub census_manifest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PonderationView {
    pub id: i64,
    pub setting_id: i64,
    pub name: String,
    pub weight: f64,
    pub created_at: i64,
}

impl From<ponderation::Model> for PonderationView {
    fn from(model: ponderation::Model) -> Self {
        Self {
            id: model.id,
            setting_id: model.setting_id,
            name: model.name,
            weight: model.weight,
            created_at: model.created_at.timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: i64,
    pub setting_id: i64,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub user_id: Option<i64>,
    pub ponderation_id: Option<i64>,
    pub created_at: i64,
}

impl From<participant::Model> for ParticipantView {
    fn from(model: participant::Model) -> Self {
        Self {
            id: model.id,
            setting_id: model.setting_id,
            email: model.email,
            phone: model.phone,
            user_id: model.user_id,
            ponderation_id: model.ponderation_id,
            created_at: model.created_at.timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CreateDelegationRequest {
    pub granter_id: i64,
    pub grantee_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationView {
    pub id: i64,
    pub setting_id: i64,
    pub granter_id: i64,
    pub grantee_id: i64,
    pub created_at: i64,
}

impl From<delegation::Model> for DelegationView {
    fn from(model: delegation::Model) -> Self {
        Self {
            id: model.id,
            setting_id: model.setting_id,
            granter_id: model.granter_id,
            grantee_id: model.grantee_id,
            created_at: model.created_at.timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterView {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<user::Model> for VoterView {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
        }
    }
}
