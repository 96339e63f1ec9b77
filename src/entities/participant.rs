use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delegation_participants")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub setting_id: i64,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Bound once the census member registers or logs in
    pub user_id: Option<i64>,
    /// Absent means an effective weight of 1.0
    pub ponderation_id: Option<i64>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::setting::Entity",
        from = "Column::SettingId",
        to = "super::setting::Column::Id"
    )]
    Setting,
    #[sea_orm(
        belongs_to = "super::ponderation::Entity",
        from = "Column::PonderationId",
        to = "super::ponderation::Column::Id"
    )]
    Ponderation,
}

impl Related<super::setting::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Setting.def()
    }
}

impl Related<super::ponderation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ponderation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
