//! Paper entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "papers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Upstream feed name, e.g. "arxiv" or "openreview"
    #[sea_orm(column_type = "Text")]
    pub source: String,

    /// Identifier assigned by the upstream feed
    #[sea_orm(column_type = "Text")]
    pub source_id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub abstract_text: String,

    /// Author names as a JSONB array
    #[sea_orm(column_type = "JsonBinary")]
    pub authors: Json,

    /// Subject categories as a JSONB array
    #[sea_orm(column_type = "JsonBinary")]
    pub categories: Json,

    #[sea_orm(column_type = "Text", nullable)]
    pub pdf_url: Option<String>,

    pub published_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::article::Entity")]
    Articles,
}

impl Related<super::article::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Articles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
