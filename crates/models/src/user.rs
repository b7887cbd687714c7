use sea_orm::{entity::prelude::*, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors;
use crate::role;

pub const STATUS_ACTIVE: &str = "active";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "directus_users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: String,
    pub role: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Role,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self { Relation::Role => Entity::belongs_to(role::Entity).from(Column::Role).to(role::Column::Id).into() }
    }
}

impl Related<role::Entity> for Entity {
    fn to() -> RelationDef { Relation::Role.def() }
}

impl ActiveModelBehavior for ActiveModel {}

pub async fn create<C: ConnectionTrait>(db: &C, email: &str, role: Option<&str>) -> Result<Model, errors::ModelError> {
    if !email.contains('@') { return Err(errors::ModelError::Validation("invalid email".into())); }
    let am = ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        email: Set(Some(email.to_string())),
        first_name: Set(None),
        last_name: Set(None),
        status: Set(STATUS_ACTIVE.into()),
        role: Set(role.map(str::to_string)),
    };
    Ok(am.insert(db).await?)
}
