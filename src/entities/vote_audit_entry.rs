use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const EVENT_CREATE: &str = "create";
pub const EVENT_DESTROY: &str = "destroy";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote_audit_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub vote_id: i64,
    pub question_id: i64,
    pub event: String,
    pub voter_uid: String,
    /// User who physically submitted the ballot
    pub actor_id: Option<i64>,
    pub delegation_id: Option<i64>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
