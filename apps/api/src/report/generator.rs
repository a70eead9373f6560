//! Interview reports built from a transcript and the interviewer's written
//! feedback. Everything here is pure except [`user_summary`].

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::agent::TurnEvaluation;
use crate::interview::session::{Speaker, Turn};
use crate::llm_client::parse::round2;
use crate::models::interview::InterviewRow;

const MINUTES_PER_TURN: u32 = 2;
/// Turn scores (0–5) below this count as weak answers.
const LOW_TURN_SCORE: f64 = 3.0;
/// Interview averages below this feed the weak points of a user summary.
const LOW_INTERVIEW_SCORE: f64 = 3.5;
const SUMMARY_WINDOW: i64 = 5;
const MAX_SUMMARY_WEAK_POINTS: usize = 3;

const NO_CONCLUSION: &str = "No conclusion was given.";
const NO_SUGGESTIONS: &str = "No improvement suggestions were given.";

const OVERALL_LABELS: &[&str] = &["overall evaluation", "总体评价"];
const STRENGTH_LABELS: &[&str] = &["candidate strengths", "strengths", "候选人优势", "优势"];
const WEAKNESS_LABELS: &[&str] = &["candidate weaknesses", "weaknesses", "候选人劣势", "劣势"];
const SUGGESTION_LABELS: &[&str] = &["improvement suggestions", "改进建议"];
const SCORE_LABELS: &[&str] = &["interview score", "面试评分"];
const CONCLUSION_LABELS: &[&str] = &["final conclusion", "最终结论"];

/// Weak-point keywords and the topics recommended for them.
const TOPIC_TABLE: &[(&[&str], &[&str])] = &[
    (
        &["system design", "系统设计"],
        &["Distributed system design", "Microservice architecture"],
    ),
    (
        &["advanced concept", "高级概念"],
        &["Design patterns", "Algorithm optimization"],
    ),
    (
        &["code optimization", "optimiz", "代码优化"],
        &["Performance tuning", "Code refactoring"],
    ),
    (
        &["fundamental", "basic", "基础"],
        &["Core fundamentals review", "Key concept consolidation"],
    ),
    (
        &["algorithm", "算法"],
        &["Data structures and algorithms", "Complexity analysis"],
    ),
    (
        &["communication", "沟通", "表达"],
        &["Structured answering", "Technical communication"],
    ),
];

static SCORE_RES: OnceLock<[Regex; 3]> = OnceLock::new();
static NUMBERED_RE: OnceLock<Regex> = OnceLock::new();

/// Input to report generation: one finished interview.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterviewData {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub transcript: Vec<Turn>,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub evaluations: Vec<TurnEvaluation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSection {
    pub weak_points: Vec<String>,
    pub recommended_topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub role: String,
    pub topic: String,
    pub duration_minutes: u32,
    pub question_count: usize,
    pub answer_count: usize,
    pub transcript: Vec<Turn>,
    pub feedback: String,
    /// 0–100, as written in the feedback; 0 when absent.
    pub score: u32,
    pub conclusion: String,
    pub improvement_suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical: Option<TechnicalSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub interview_count: usize,
    pub avg_score: f64,
    pub weak_points: Vec<String>,
    pub progress_tracking: String,
    pub recommended_topics: Vec<String>,
}

impl UserSummary {
    fn empty() -> Self {
        Self {
            interview_count: 0,
            avg_score: 0.0,
            weak_points: vec!["No interview records".to_string()],
            progress_tracking: "No interview records".to_string(),
            recommended_topics: vec!["Start with a mock interview".to_string()],
        }
    }
}

pub fn generate_interview_report(data: &InterviewData) -> InterviewReport {
    let turns = data.transcript.len();
    let duration_minutes = if turns >= 2 {
        turns as u32 * MINUTES_PER_TURN
    } else {
        0
    };
    let question_count = data
        .transcript
        .iter()
        .filter(|t| t.speaker == Speaker::Interviewer)
        .count();

    let conclusion = section_lines(&data.feedback, CONCLUSION_LABELS)
        .filter(|lines| !lines.is_empty())
        .map(|lines| lines.join("\n"))
        .unwrap_or_else(|| NO_CONCLUSION.to_string());

    InterviewReport {
        report_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        role: data.role.clone(),
        topic: data.topic.clone(),
        duration_minutes,
        question_count,
        answer_count: turns - question_count,
        transcript: data.transcript.clone(),
        feedback: data.feedback.clone(),
        score: extract_score(&data.feedback),
        conclusion,
        improvement_suggestions: extract_improvement_suggestions(&data.feedback),
        technical: None,
    }
}

/// The interview report plus weak points and recommended study topics.
pub fn generate_technical_report(data: &InterviewData) -> InterviewReport {
    let mut report = generate_interview_report(data);
    let weak_points = identify_weak_points(data);
    let recommended_topics = recommend_study_topics(&weak_points);
    report.technical = Some(TechnicalSection {
        weak_points,
        recommended_topics,
    });
    report
}

/// Score written as `Interview score: N`, `Score: N/100` or `面试评分 N`,
/// capped at 100.
pub fn extract_score(feedback: &str) -> u32 {
    let res = SCORE_RES.get_or_init(|| {
        [
            Regex::new(r"(?i)interview\s+score\s*[:：]?\s*\**\s*(\d+)").unwrap(),
            Regex::new(r"(?i)score\s*[:：]?\s*\**\s*(\d+)\s*/\s*100").unwrap(),
            Regex::new(r"面试评分\s*[:：]?\s*(\d+)").unwrap(),
        ]
    });
    res.iter()
        .find_map(|re| re.captures(feedback)?.get(1)?.as_str().parse::<u32>().ok())
        .map(|s| s.min(100))
        .unwrap_or(0)
}

pub fn extract_improvement_suggestions(feedback: &str) -> Vec<String> {
    let suggestions: Vec<String> = section_lines(feedback, SUGGESTION_LABELS)
        .unwrap_or_default()
        .into_iter()
        .map(|l| strip_list_marker(&l).to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if suggestions.is_empty() {
        vec![NO_SUGGESTIONS.to_string()]
    } else {
        suggestions
    }
}

/// Lines of the feedback's weaknesses section; otherwise the comments on
/// low-scoring answers.
pub fn identify_weak_points(data: &InterviewData) -> Vec<String> {
    let from_feedback: Vec<String> = section_lines(&data.feedback, WEAKNESS_LABELS)
        .unwrap_or_default()
        .into_iter()
        .map(|l| strip_list_marker(&l).to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if !from_feedback.is_empty() {
        return from_feedback;
    }
    data.evaluations
        .iter()
        .filter(|e| e.score < LOW_TURN_SCORE && !e.comment.is_empty())
        .map(|e| e.comment.clone())
        .collect()
}

/// Topics for every keyword found in `weak_points`, deduplicated and sorted.
pub fn recommend_study_topics(weak_points: &[String]) -> Vec<String> {
    let mut topics = BTreeSet::new();
    for point in weak_points {
        let point = point.to_lowercase();
        for (keywords, recommended) in TOPIC_TABLE {
            if keywords.iter().any(|k| point.contains(k)) {
                topics.extend(recommended.iter().map(|t| t.to_string()));
            }
        }
    }
    topics.into_iter().collect()
}

/// Summary over the user's last five interviews in `domain`.
pub async fn user_summary(pool: &PgPool, user_id: &str, domain: &str) -> Result<UserSummary, AppError> {
    let rows = sqlx::query_as::<_, InterviewRow>(
        "SELECT id, user_id, kb_id, domain, score, feedback, transcript, created_at
         FROM interviews
         WHERE user_id = $1 AND domain = $2
         ORDER BY created_at DESC
         LIMIT $3",
    )
    .bind(user_id)
    .bind(domain)
    .bind(SUMMARY_WINDOW)
    .fetch_all(pool)
    .await?;

    let records: Vec<(f64, String)> = rows.into_iter().map(|r| (r.score, r.feedback)).collect();
    Ok(summarize(&records))
}

/// `records` are (average score, feedback) pairs, newest first.
pub fn summarize(records: &[(f64, String)]) -> UserSummary {
    if records.is_empty() {
        return UserSummary::empty();
    }

    let avg_score = records.iter().map(|(s, _)| s).sum::<f64>() / records.len() as f64;

    let mut weak_points: Vec<String> = records
        .iter()
        .filter(|(score, _)| *score < LOW_INTERVIEW_SCORE)
        .take(MAX_SUMMARY_WEAK_POINTS)
        .filter_map(|(_, feedback)| {
            section_lines(feedback, WEAKNESS_LABELS)?
                .into_iter()
                .map(|l| strip_list_marker(&l).to_string())
                .find(|l| !l.is_empty())
        })
        .collect();
    let recommended_topics = recommend_study_topics(&weak_points);
    if weak_points.is_empty() {
        weak_points.push("No clear weak points identified".to_string());
    }

    let progress_tracking = match records {
        [latest, previous, ..] if latest.0 > previous.0 => {
            format!("Average score {avg_score:.2}, up on the previous interview")
        }
        [latest, previous, ..] if latest.0 < previous.0 => {
            format!("Average score {avg_score:.2}, down on the previous interview")
        }
        [_, _, ..] => format!("Average score {avg_score:.2}, level with the previous interview"),
        _ => format!("Average score {avg_score:.2}, first interview"),
    };

    UserSummary {
        interview_count: records.len(),
        avg_score: round2(avg_score),
        weak_points,
        progress_tracking,
        recommended_topics,
    }
}

pub fn render_markdown(report: &InterviewReport) -> String {
    let mut md = format!(
        "# Interview Report\n\n\
         ## Overview\n\
         - Report ID: {}\n\
         - Generated: {}\n\
         - Role: {}\n\
         - Topic: {}\n\
         - Duration: {} minutes\n\
         - Exchanges: {} questions, {} answers\n\
         - Score: {}/100\n\n\
         ## Feedback\n{}\n\n\
         ## Conclusion\n{}\n\n\
         ## Transcript\n",
        report.report_id,
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.role,
        report.topic,
        report.duration_minutes,
        report.question_count,
        report.answer_count,
        report.score,
        report.feedback,
        report.conclusion,
    );

    for (i, turn) in report.transcript.iter().enumerate() {
        let who = match turn.speaker {
            Speaker::Interviewer => "Interviewer",
            Speaker::Candidate => "Candidate",
        };
        md.push_str(&format!("\n### {who} ({})\n{}\n", i + 1, turn.content));
    }

    push_list(&mut md, "Improvement Suggestions", &report.improvement_suggestions);
    if let Some(technical) = &report.technical {
        push_list(&mut md, "Weak Points", &technical.weak_points);
        push_list(&mut md, "Recommended Topics", &technical.recommended_topics);
    }
    md
}

fn push_list(md: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    md.push_str(&format!("\n## {heading}\n"));
    for item in items {
        md.push_str(&format!("- {item}\n"));
    }
}

fn all_section_labels() -> impl Iterator<Item = &'static str> {
    [
        OVERALL_LABELS,
        STRENGTH_LABELS,
        WEAKNESS_LABELS,
        SUGGESTION_LABELS,
        SCORE_LABELS,
        CONCLUSION_LABELS,
    ]
    .into_iter()
    .flatten()
    .copied()
}

/// If `line` is a section heading (optionally numbered or markdown) for one
/// of `labels`, returns whatever follows the heading on the same line.
fn heading_rest<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    let numbered = NUMBERED_RE.get_or_init(|| Regex::new(r"^\d+\s*[.)、]\s*").unwrap());
    let line = line.trim().trim_start_matches(['#', '*', ' ']);
    let line = match numbered.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    };
    let line = line.trim_start_matches(['*', ' ']);

    labels.iter().find_map(|label| {
        let head = line.get(..label.len())?;
        if !head.eq_ignore_ascii_case(label) {
            return None;
        }
        let rest = &line[label.len()..];
        if rest.chars().next().is_some_and(|c| c.is_alphanumeric()) {
            return None;
        }
        Some(rest.trim_start_matches(['*', ':', '：', ' ']).trim())
    })
}

/// Non-empty lines of the section headed by one of `labels`, up to the next
/// known heading. `None` when the section is absent.
fn section_lines(feedback: &str, labels: &[&str]) -> Option<Vec<String>> {
    let mut lines = feedback.lines();
    let first = lines.by_ref().find_map(|l| heading_rest(l, labels))?;

    let mut out = Vec::new();
    if !first.is_empty() {
        out.push(first.to_string());
    }
    for line in lines {
        if all_section_labels().any(|label| heading_rest(line, &[label]).is_some()) {
            break;
        }
        let line = line.trim();
        if !line.is_empty() {
            out.push(line.to_string());
        }
    }
    Some(out)
}

fn strip_list_marker(line: &str) -> &str {
    let numbered = NUMBERED_RE.get_or_init(|| Regex::new(r"^\d+\s*[.)、]\s*").unwrap());
    let line = line.trim().trim_start_matches(['-', '•', '*', ' ']);
    match numbered.find(line) {
        Some(m) => line[m.end()..].trim(),
        None => line.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEEDBACK: &str = "\
1. Overall evaluation
Solid fundamentals, shaky on scale.
2. Strengths
- Clear explanations
3. Weaknesses
- System design needs work
- Limited code optimization experience
4. Improvement suggestions
- Practise designing a URL shortener
- Profile before optimizing
5. Interview score: 72
6. Final conclusion
Recommended for a second round.";

    fn data() -> InterviewData {
        InterviewData {
            role: "it".into(),
            topic: "backend".into(),
            transcript: vec![
                Turn::interviewer("Q1"),
                Turn::candidate("A1"),
                Turn::interviewer("Q2"),
            ],
            feedback: FEEDBACK.into(),
            evaluations: vec![],
        }
    }

    #[test]
    fn test_interview_report_counts_and_sections() {
        let report = generate_interview_report(&data());
        assert_eq!(report.duration_minutes, 6);
        assert_eq!(report.question_count, 2);
        assert_eq!(report.answer_count, 1);
        assert_eq!(report.score, 72);
        assert_eq!(report.conclusion, "Recommended for a second round.");
        assert_eq!(
            report.improvement_suggestions,
            vec!["Practise designing a URL shortener", "Profile before optimizing"]
        );
        assert!(report.technical.is_none());
    }

    #[test]
    fn test_single_turn_has_no_duration() {
        let mut d = data();
        d.transcript.truncate(1);
        assert_eq!(generate_interview_report(&d).duration_minutes, 0);
    }

    #[test]
    fn test_score_patterns() {
        assert_eq!(extract_score("Interview score: 85"), 85);
        assert_eq!(extract_score("**Interview Score:** 64"), 64);
        assert_eq!(extract_score("Overall score: 90/100"), 90);
        assert_eq!(extract_score("面试评分：78"), 78);
        assert_eq!(extract_score("Interview score: 450"), 100);
        assert_eq!(extract_score("no score here"), 0);
    }

    #[test]
    fn test_fallbacks_without_sections() {
        let d = InterviewData {
            feedback: "Good job overall.".into(),
            ..Default::default()
        };
        let report = generate_interview_report(&d);
        assert_eq!(report.conclusion, NO_CONCLUSION);
        assert_eq!(report.improvement_suggestions, vec![NO_SUGGESTIONS]);
        assert_eq!(report.score, 0);
    }

    #[test]
    fn test_inline_heading_content() {
        let feedback = "Final conclusion: Hire.\nImprovement suggestions: read more";
        let report = generate_interview_report(&InterviewData {
            feedback: feedback.into(),
            ..Default::default()
        });
        assert_eq!(report.conclusion, "Hire.");
        assert_eq!(report.improvement_suggestions, vec!["read more"]);
    }

    #[test]
    fn test_technical_report_weak_points_and_topics() {
        let report = generate_technical_report(&data());
        let technical = report.technical.unwrap();
        assert_eq!(
            technical.weak_points,
            vec!["System design needs work", "Limited code optimization experience"]
        );
        assert_eq!(
            technical.recommended_topics,
            vec![
                "Code refactoring",
                "Distributed system design",
                "Microservice architecture",
                "Performance tuning",
            ]
        );
    }

    #[test]
    fn test_weak_points_fall_back_to_low_scoring_turns() {
        let d = InterviewData {
            feedback: "Fine.".into(),
            evaluations: vec![
                TurnEvaluation {
                    score: 2.0,
                    follow_up: String::new(),
                    comment: "Weak on algorithm complexity".into(),
                },
                TurnEvaluation {
                    score: 4.5,
                    follow_up: String::new(),
                    comment: "Great".into(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(identify_weak_points(&d), vec!["Weak on algorithm complexity"]);
    }

    #[test]
    fn test_recommend_topics_dedups_across_points() {
        let topics = recommend_study_topics(&[
            "basic syntax".to_string(),
            "Fundamentals of networking".to_string(),
            "基础概念".to_string(),
        ]);
        assert_eq!(topics, vec!["Core fundamentals review", "Key concept consolidation"]);
        assert!(recommend_study_topics(&["nothing matches".to_string()]).is_empty());
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize(&[]), UserSummary::empty());
    }

    #[test]
    fn test_summarize_progress_and_weak_points() {
        let records = vec![
            (4.0, "Weaknesses: none".to_string()),
            (3.0, "3. Weaknesses\n- Communication under pressure\n4. Improvement suggestions\n- x".to_string()),
        ];
        let summary = summarize(&records);
        assert_eq!(summary.interview_count, 2);
        assert_eq!(summary.avg_score, 3.5);
        assert_eq!(summary.weak_points, vec!["Communication under pressure"]);
        assert!(summary.progress_tracking.contains("up on the previous"));
        assert_eq!(
            summary.recommended_topics,
            vec!["Structured answering", "Technical communication"]
        );
    }

    #[test]
    fn test_summarize_progress_down_and_level() {
        let down = summarize(&[(2.5, String::new()), (4.0, String::new())]);
        assert!(down.progress_tracking.ends_with("down on the previous interview"));

        let level = summarize(&[(3.0, String::new()), (3.0, String::new())]);
        assert!(level.progress_tracking.ends_with("level with the previous interview"));
    }

    #[test]
    fn test_summarize_first_interview() {
        let summary = summarize(&[(4.2, String::new())]);
        assert!(summary.progress_tracking.ends_with("first interview"));
        assert_eq!(summary.weak_points, vec!["No clear weak points identified"]);
    }

    #[test]
    fn test_render_markdown_includes_sections() {
        let md = render_markdown(&generate_technical_report(&data()));
        assert!(md.starts_with("# Interview Report"));
        assert!(md.contains("- Score: 72/100"));
        assert!(md.contains("### Candidate (2)\nA1"));
        assert!(md.contains("## Weak Points\n- System design needs work"));
        assert!(md.contains("## Recommended Topics"));
    }
}
