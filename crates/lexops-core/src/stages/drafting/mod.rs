//! Drafting stages: issue planning, template selection, the two drafting
//! paths and the bilingual quality check.

mod draft;
mod plan;
mod qa;
mod template;

pub use draft::{align, DraftPrimaryStage, DraftSecondaryStage, GenerateCompanionStage};
pub use plan::PlanIssuesStage;
pub use qa::{review, QualityCheckStage};
pub use template::{find_template, SelectTemplateStage, TemplateSpec, TEMPLATES};
