use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One change record per mutated item. `data` is the item after the write,
/// `delta` the payload that was applied; both are JSON text.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "directus_revisions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub action: String,
    pub collection: String,
    pub item: String,
    pub data: Option<String>,
    pub delta: Option<String>,
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef { panic!("no relations defined here") }
}

impl ActiveModelBehavior for ActiveModel {}
