//! Intake stages: raw files in, manifest, segments, case snapshot and risk
//! scores out.

mod collect;
mod extract;
mod normalize;
mod risk;
mod structure;

pub use collect::{parse_whatsapp, CollectStage, SOURCE_TYPES};
pub use extract::{ExtractTextStage, ExtractedPage, NoOcrExtractor, SharedExtractor, TextExtractor};
pub use normalize::NormalizeTextStage;
pub use risk::{score as score_risk, ScoreRiskStage};
pub use structure::StructureFactsStage;
