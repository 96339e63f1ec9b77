use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "election_response_options")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub question_id: i64,
    pub body: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::election_question::Entity",
        from = "Column::QuestionId",
        to = "super::election_question::Column::Id"
    )]
    ElectionQuestion,
    #[sea_orm(has_many = "super::election_vote::Entity")]
    ElectionVote,
}

impl Related<super::election_question::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ElectionQuestion.def()
    }
}

impl Related<super::election_vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ElectionVote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
