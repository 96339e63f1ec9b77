use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "elections")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub organization_id: i64,
    pub title: Json,
    pub census_manifest: String,
    pub census_settings: Json,
    pub published_at: Option<DateTimeWithTimeZone>,
    pub start_at: Option<DateTimeWithTimeZone>,
    pub end_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn ongoing_at(&self, now: DateTimeWithTimeZone) -> bool {
        self.start_at.is_some_and(|start| start <= now) && now < self.end_at
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::election_question::Entity")]
    ElectionQuestion,
}

impl Related<super::election_question::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ElectionQuestion.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
