use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde names reuse the `as_str` strings so JSON and the store never
/// disagree on casing.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(MaterialStatus {
    Uploaded => "uploaded",
    Processing => "processing",
    Ready => "ready",
    Failed => "failed",
    NeedsReview => "needs_review",
});

str_enum!(Stringency {
    Generous => "generous",
    Standard => "standard",
    Strict => "strict",
});

/// Pass/fail matrix outcome. `G` (godkänd-style pass) when every mandatory
/// criterion is met, `U` otherwise.
str_enum!(PassFail {
    G => "G",
    U => "U",
});

/// Which path produced the final grading decision.
str_enum!(DecisionSource {
    ModelsAb => "MODELS_AB",
    Adjudicator => "ADJUDICATOR",
    HumanRequired => "HUMAN_REQUIRED",
});

/// Why a submission was escalated beyond the two primary models.
str_enum!(ReviewTrigger {
    None => "NONE",
    Disagreement => "DISAGREEMENT",
    HighDifficulty => "HIGH_DIFFICULTY",
    ModelFailure => "MODEL_FAILURE",
});

/// Teacher-facing error code stored on a Material that left the happy path.
str_enum!(MaterialErrorCode {
    TokenLimit => "TOKEN_LIMIT",
    ExtractionEmpty => "EXTRACTION_EMPTY",
    ExtractionFailed => "EXTRACTION_FAILED",
    EmbeddingFailed => "EMBEDDING_FAILED",
    IndexingFailed => "INDEXING_FAILED",
});
