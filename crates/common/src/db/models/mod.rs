//! SeaORM entity models

pub mod article;
pub mod paper;
pub mod pipeline_job;
pub mod rate_limit_entry;

pub use article::{
    ActiveModel as ArticleActiveModel, ArticleStatus, Column as ArticleColumn,
    Entity as ArticleEntity, Model as Article,
};
pub use paper::{
    ActiveModel as PaperActiveModel, Column as PaperColumn, Entity as PaperEntity, Model as Paper,
};
pub use pipeline_job::{
    ActiveModel as PipelineJobActiveModel, Column as PipelineJobColumn,
    Entity as PipelineJobEntity, JobStatus, Model as PipelineJob,
};
pub use rate_limit_entry::{
    ActiveModel as RateLimitEntryActiveModel, Column as RateLimitEntryColumn,
    Entity as RateLimitEntryEntity, Model as RateLimitEntry,
};
