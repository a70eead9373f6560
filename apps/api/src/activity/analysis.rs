//! Pure aggregations over activity records.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::activity::tracker::ActivityRecord;

const TOP_AREAS: usize = 5;
/// Relative change (percent) beyond which the activity trend is not "stable".
const TREND_THRESHOLD_PCT: f64 = 10.0;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivityStats {
    pub total_activities: usize,
    pub type_counts: BTreeMap<String, usize>,
    pub total_time_spent: f64,
    pub total_questions: u64,
    pub first_activity: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub activities: usize,
    pub time_spent: f64,
    pub questions: u64,
    pub avg_score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrendSummary {
    pub avg_daily_activities: f64,
    pub avg_daily_time: f64,
    pub avg_daily_questions: f64,
    pub activity_trend: ActivityTrend,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressTrend {
    pub days: i64,
    pub trend_data: Vec<DailyStats>,
    pub summary: Option<TrendSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AreaCount {
    pub area: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WeakAreaAnalysis {
    pub top_weak_areas: Vec<AreaCount>,
    pub top_strong_areas: Vec<AreaCount>,
    pub improvement_priority: Vec<String>,
}

fn number(data: &Value, key: &str) -> Option<f64> {
    data.get(key).and_then(Value::as_f64)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn activity_stats(records: &[ActivityRecord]) -> ActivityStats {
    let mut type_counts = BTreeMap::new();
    let mut total_time_spent = 0.0;
    let mut total_questions = 0u64;

    for r in records {
        *type_counts.entry(r.activity_type.to_string()).or_insert(0) += 1;
        total_time_spent += number(&r.data, "time_spent").unwrap_or(0.0);
        total_questions += r.data.get("question_count").and_then(Value::as_u64).unwrap_or(0);
    }

    ActivityStats {
        total_activities: records.len(),
        type_counts,
        total_time_spent,
        total_questions,
        first_activity: records.iter().map(|r| r.timestamp).min(),
        last_activity: records.iter().map(|r| r.timestamp).max(),
    }
}

/// Per-day statistics for the last `days` days up to `today`, oldest first.
pub fn progress_trend(records: &[ActivityRecord], days: i64, today: NaiveDate) -> ProgressTrend {
    struct Day {
        activities: usize,
        time_spent: f64,
        questions: u64,
        scores: Vec<f64>,
    }

    let mut by_day: BTreeMap<NaiveDate, Day> = BTreeMap::new();
    for r in records {
        let date = r.timestamp.date_naive();
        if (today - date).num_days() > days {
            continue;
        }
        let day = by_day.entry(date).or_insert(Day {
            activities: 0,
            time_spent: 0.0,
            questions: 0,
            scores: Vec::new(),
        });
        day.activities += 1;
        day.time_spent += number(&r.data, "time_spent").unwrap_or(0.0);
        day.questions += r.data.get("question_count").and_then(Value::as_u64).unwrap_or(0);
        if let Some(score) = number(&r.data, "score") {
            day.scores.push(score);
        }
    }

    let trend_data: Vec<DailyStats> = by_day
        .into_iter()
        .map(|(date, d)| DailyStats {
            date,
            activities: d.activities,
            time_spent: d.time_spent,
            questions: d.questions,
            avg_score: if d.scores.is_empty() {
                0.0
            } else {
                d.scores.iter().sum::<f64>() / d.scores.len() as f64
            },
        })
        .collect();

    let summary = summarize(&trend_data, today);
    ProgressTrend {
        days,
        trend_data,
        summary,
    }
}

fn summarize(trend: &[DailyStats], today: NaiveDate) -> Option<TrendSummary> {
    if trend.is_empty() {
        return None;
    }
    let n = trend.len() as f64;
    let avg = |f: fn(&DailyStats) -> f64| round1(trend.iter().map(f).sum::<f64>() / n);

    let window = |from: i64, to: i64| -> usize {
        trend
            .iter()
            .filter(|d| {
                let age = (today - d.date).num_days();
                (from..=to).contains(&age)
            })
            .map(|d| d.activities)
            .sum()
    };
    let recent = window(0, 6);
    let previous = window(7, 13);

    Some(TrendSummary {
        avg_daily_activities: avg(|d| d.activities as f64),
        avg_daily_time: avg(|d| d.time_spent),
        avg_daily_questions: avg(|d| d.questions as f64),
        activity_trend: classify_trend(recent, previous),
    })
}

fn classify_trend(recent: usize, previous: usize) -> ActivityTrend {
    if previous == 0 {
        return ActivityTrend::Stable;
    }
    let change = (recent as f64 - previous as f64) / previous as f64 * 100.0;
    if change > TREND_THRESHOLD_PCT {
        ActivityTrend::Increasing
    } else if change < -TREND_THRESHOLD_PCT {
        ActivityTrend::Decreasing
    } else {
        ActivityTrend::Stable
    }
}

pub fn weak_areas(records: &[ActivityRecord]) -> WeakAreaAnalysis {
    let top_weak_areas = top_areas(records, "weak_areas");
    let top_strong_areas = top_areas(records, "strong_areas");
    let improvement_priority = top_weak_areas
        .iter()
        .filter(|w| !top_strong_areas.iter().any(|s| s.area == w.area))
        .map(|w| w.area.clone())
        .collect();

    WeakAreaAnalysis {
        top_weak_areas,
        top_strong_areas,
        improvement_priority,
    }
}

fn top_areas(records: &[ActivityRecord], key: &str) -> Vec<AreaCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in records {
        if let Some(areas) = r.data.get(key).and_then(Value::as_array) {
            for area in areas.iter().filter_map(Value::as_str) {
                *counts.entry(area).or_insert(0) += 1;
            }
        }
    }
    let mut sorted: Vec<AreaCount> = counts
        .into_iter()
        .map(|(area, count)| AreaCount {
            area: area.to_string(),
            count,
        })
        .collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.area.cmp(&b.area)));
    sorted.truncate(TOP_AREAS);
    sorted
}
