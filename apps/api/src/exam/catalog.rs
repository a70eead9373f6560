use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    ShortAnswer,
    Design,
    Scenario,
    Calculation,
    CaseAnalysis,
    TeachingDesign,
    Essay,
}

impl QuestionType {
    /// Wording used in generation prompts.
    pub fn label(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple-choice question",
            QuestionType::ShortAnswer => "short-answer question",
            QuestionType::Design => "design question",
            QuestionType::Scenario => "scenario question",
            QuestionType::Calculation => "calculation question",
            QuestionType::CaseAnalysis => "case analysis question",
            QuestionType::TeachingDesign => "teaching design task",
            QuestionType::Essay => "essay question",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExamType {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub question_types: &'static [QuestionType],
}

impl ExamType {
    pub fn supports(&self, question_type: QuestionType) -> bool {
        self.question_types.contains(&question_type)
    }
}

pub static CATALOG: [ExamType; 5] = [
    ExamType {
        key: "soft_exam",
        name: "Software Designer",
        description: "National computer technology and software professional qualification exam",
        question_types: &[
            QuestionType::MultipleChoice,
            QuestionType::ShortAnswer,
            QuestionType::Design,
        ],
    },
    ExamType {
        key: "pmp",
        name: "PMP",
        description: "Project Management Professional certification",
        question_types: &[QuestionType::MultipleChoice, QuestionType::Scenario],
    },
    ExamType {
        key: "cpa",
        name: "Certified Public Accountant",
        description: "CPA qualification exam",
        question_types: &[
            QuestionType::MultipleChoice,
            QuestionType::Calculation,
            QuestionType::CaseAnalysis,
        ],
    },
    ExamType {
        key: "teacher",
        name: "Teacher Qualification",
        description: "Primary and secondary school teacher qualification exam",
        question_types: &[
            QuestionType::MultipleChoice,
            QuestionType::ShortAnswer,
            QuestionType::TeachingDesign,
        ],
    },
    ExamType {
        key: "law",
        name: "Legal Professional Qualification",
        description: "National unified legal professional qualification exam",
        question_types: &[
            QuestionType::MultipleChoice,
            QuestionType::CaseAnalysis,
            QuestionType::Essay,
        ],
    },
];

pub fn find_exam(key: &str) -> Result<&'static ExamType, AppError> {
    CATALOG
        .iter()
        .find(|e| e.key == key)
        .ok_or_else(|| AppError::Validation(format!("unsupported exam type '{key}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_exam() {
        let pmp = find_exam("pmp").unwrap();
        assert!(pmp.supports(QuestionType::Scenario));
        assert!(!pmp.supports(QuestionType::Essay));
        assert!(matches!(find_exam("driving"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_every_exam_offers_multiple_choice() {
        assert!(CATALOG.iter().all(|e| e.supports(QuestionType::MultipleChoice)));
    }

    #[test]
    fn test_question_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&QuestionType::CaseAnalysis).unwrap(),
            "\"case_analysis\""
        );
        let parsed: QuestionType = serde_json::from_str("\"teaching_design\"").unwrap();
        assert_eq!(parsed, QuestionType::TeachingDesign);
    }
}
