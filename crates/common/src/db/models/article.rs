//! Article entity
//!
//! Articles are keyed by a slug derived from the source paper key, so
//! re-ingesting the same paper never creates a second article.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Article lifecycle status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Draft,
    Published,
}

impl From<String> for ArticleStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "published" => ArticleStatus::Published,
            _ => ArticleStatus::Draft,
        }
    }
}

impl From<ArticleStatus> for String {
    fn from(status: ArticleStatus) -> Self {
        match status {
            ArticleStatus::Draft => "draft".to_string(),
            ArticleStatus::Published => "published".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "articles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub paper_id: Uuid,

    /// Unique, a pure function of (source, source_id)
    #[sea_orm(column_type = "Text", unique)]
    pub slug: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// One-sentence summary used as the article description
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Generated markdown body
    #[sea_orm(column_type = "Text", nullable)]
    pub body: Option<String>,

    /// Asset-store key of the generated cover image
    #[sea_orm(column_type = "Text", nullable)]
    pub cover_key: Option<String>,

    pub published_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the article status as an enum
    pub fn article_status(&self) -> ArticleStatus {
        ArticleStatus::from(self.status.clone())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::paper::Entity",
        from = "Column::PaperId",
        to = "super::paper::Column::Id"
    )]
    Paper,
}

impl Related<super::paper::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Paper.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(ArticleStatus::from("published".to_string()), ArticleStatus::Published);
        assert_eq!(ArticleStatus::from("draft".to_string()), ArticleStatus::Draft);
        assert_eq!(String::from(ArticleStatus::Published), "published");
    }

    #[test]
    fn test_unknown_status_defaults_to_draft() {
        assert_eq!(ArticleStatus::from("bogus".to_string()), ArticleStatus::Draft);
    }
}
