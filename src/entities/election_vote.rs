use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "election_votes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub question_id: i64,
    pub response_option_id: i64,
    pub voter_uid: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::response_option::Entity",
        from = "Column::ResponseOptionId",
        to = "super::response_option::Column::Id"
    )]
    ResponseOption,
}

impl Related<super::response_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResponseOption.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
