use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "election_questions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub election_id: i64,
    pub body: Json,
    pub position: i32,
    pub published_results_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    pub fn results_published(&self) -> bool {
        self.published_results_at.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::election::Entity",
        from = "Column::ElectionId",
        to = "super::election::Column::Id"
    )]
    Election,
    #[sea_orm(has_many = "super::response_option::Entity")]
    ResponseOption,
}

impl Related<super::election::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Election.def()
    }
}

impl Related<super::response_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResponseOption.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
