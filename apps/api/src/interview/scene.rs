use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Interview domain. Decides the interviewer persona and what answers are
/// judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneType {
    It,
    Language,
    Cert,
}

impl SceneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneType::It => "it",
            SceneType::Language => "language",
            SceneType::Cert => "cert",
        }
    }

    pub fn persona(&self) -> &'static str {
        match self {
            SceneType::It => {
                "You are a senior technical interviewer at a software company. \
                 You probe for depth: fundamentals, system design, trade-offs and \
                 real project experience."
            }
            SceneType::Language => {
                "You are a patient speaking coach running an oral language exam. \
                 You check fluency, vocabulary, grammar and how naturally the \
                 candidate expresses ideas."
            }
            SceneType::Cert => {
                "You are an examiner for a professional certification. You check \
                 that the candidate knows the syllabus precisely and can apply it \
                 to practical scenarios."
            }
        }
    }

    /// Topic used when neither the request nor the knowledge base names one.
    pub fn default_topic(&self) -> &'static str {
        match self {
            SceneType::It => "software engineering",
            SceneType::Language => "everyday conversation",
            SceneType::Cert => "certification exam preparation",
        }
    }

    /// What a single answer is scored on.
    pub fn evaluation_focus(&self) -> &'static str {
        match self {
            SceneType::It => "technical accuracy, depth and clarity of reasoning",
            SceneType::Language => "fluency, grammar, vocabulary and pronunciation cues",
            SceneType::Cert => "correctness against the syllabus and practical application",
        }
    }
}

impl fmt::Display for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SceneType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "it" => Ok(SceneType::It),
            "language" => Ok(SceneType::Language),
            "cert" => Ok(SceneType::Cert),
            other => Err(AppError::Validation(format!(
                "unknown interview scene '{other}' (expected it, language or cert)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scene_is_case_insensitive() {
        assert_eq!("IT".parse::<SceneType>().unwrap(), SceneType::It);
        assert_eq!(" language ".parse::<SceneType>().unwrap(), SceneType::Language);
        assert_eq!("cert".parse::<SceneType>().unwrap(), SceneType::Cert);
    }

    #[test]
    fn test_unknown_scene_is_validation_error() {
        assert!(matches!(
            "medicine".parse::<SceneType>(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_scene_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SceneType::Language).unwrap(), "\"language\"");
    }
}
