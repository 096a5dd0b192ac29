//! Plan prompt construction and parsing of the model's JSON answer.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use sprintify_core::models::{
    CreateMilestoneInput, CreateSprintInput, CreateTaskInput, Priority, SprintStatus,
    MILESTONE_TITLE_MAX_CHARS, SPRINT_TITLE_MAX_CHARS, TASK_TITLE_MAX_CHARS,
};

use super::GeminiError;

pub const MAX_PLAN_TASKS: usize = 20;
pub const MAX_PLAN_MILESTONES: usize = 10;
pub const MAX_DURATION_DAYS: u32 = 90;
const MAX_TITLE_CHARS: usize = SPRINT_TITLE_MAX_CHARS;

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub goal: String,
    pub duration_days: u32,
    pub context: Option<String>,
    pub start_date: NaiveDate,
}

impl PlanRequest {
    /// Last day of the sprint, inclusive.
    pub fn end_date(&self) -> NaiveDate {
        offset_date(self.start_date, self.duration_days)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: NaiveDate,
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedMilestone {
    pub title: String,
    pub description: Option<String>,
    pub target_date: NaiveDate,
    pub criteria: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedPlan {
    pub title: String,
    pub description: Option<String>,
    pub goal: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub tasks: Vec<PlannedTask>,
    pub milestones: Vec<PlannedMilestone>,
}

impl GeneratedPlan {
    /// Turn the plan into a draft sprint named `title`.
    pub fn into_sprint_input(self, title: String) -> CreateSprintInput {
        CreateSprintInput {
            title,
            description: self.description,
            goal: Some(self.goal),
            status: Some(SprintStatus::Draft),
            start_date: self.start_date,
            end_date: self.end_date,
            ai_generated: true,
            tasks: self
                .tasks
                .into_iter()
                .map(|t| CreateTaskInput {
                    description: t.description,
                    priority: Some(t.priority),
                    due_date: Some(t.due_date),
                    estimated_hours: t.estimated_hours,
                    ..CreateTaskInput::titled(t.title)
                })
                .collect(),
            milestones: self
                .milestones
                .into_iter()
                .map(|m| CreateMilestoneInput {
                    title: m.title,
                    description: m.description,
                    target_date: Some(m.target_date),
                    criteria: m.criteria,
                })
                .collect(),
        }
    }
}

pub fn build_plan_prompt(goal: &str, duration_days: u32, context: Option<&str>) -> String {
    let mut prompt = format!(
        "You are a productivity coach. Break the following goal into a {duration_days}-day sprint.\n\
         Goal: {goal}\n"
    );
    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("Background: {context}\n"));
    }
    prompt.push_str(&format!(
        "\nRespond with JSON only, using this shape:\n\
         {{\n  \"title\": string (at most {MAX_TITLE_CHARS} characters),\n  \
         \"description\": string,\n  \
         \"tasks\": [{{\"title\": string, \"description\": string, \"priority\": \"low\" | \"medium\" | \"high\", \
         \"day\": integer 1-{duration_days}, \"estimated_hours\": number}}],\n  \
         \"milestones\": [{{\"title\": string, \"description\": string, \"day\": integer 1-{duration_days}, \
         \"criteria\": [string]}}]\n}}\n\
         Use at most {MAX_PLAN_TASKS} tasks and {MAX_PLAN_MILESTONES} milestones. \
         Order tasks by the day they should be finished.\n"
    ));
    prompt
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tasks: Vec<RawTask>,
    #[serde(default)]
    milestones: Vec<RawMilestone>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    day: Option<f64>,
    estimated_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawMilestone {
    title: Option<String>,
    description: Option<String>,
    day: Option<f64>,
    #[serde(default)]
    criteria: Vec<String>,
}

/// Parse the model output for `request`. Accepts bare JSON, JSON wrapped in
/// a markdown fence, or JSON surrounded by prose.
pub fn parse_plan(text: &str, request: &PlanRequest) -> Result<GeneratedPlan, GeminiError> {
    let json = extract_json(text)
        .ok_or_else(|| GeminiError::InvalidResponse("no JSON object in AI response".into()))?;
    let raw: RawPlan = serde_json::from_str(json)
        .map_err(|e| GeminiError::InvalidResponse(format!("malformed plan: {e}")))?;

    let title = clean(raw.title)
        .map(|t| truncate(&t, MAX_TITLE_CHARS))
        .ok_or_else(|| GeminiError::InvalidResponse("plan has no title".into()))?;

    let days = request.duration_days.max(1);
    let tasks: Vec<PlannedTask> = raw
        .tasks
        .into_iter()
        .filter_map(|t| {
            let title = truncate(&clean(t.title)?, TASK_TITLE_MAX_CHARS);
            Some(PlannedTask {
                title,
                description: clean(t.description),
                priority: t
                    .priority
                    .as_deref()
                    .and_then(|p| Priority::from_str(&p.trim().to_lowercase()))
                    .unwrap_or(Priority::Medium),
                due_date: offset_date(request.start_date, clamp_day(t.day, days)),
                estimated_hours: t.estimated_hours.filter(|h| h.is_finite() && *h > 0.0),
            })
        })
        .take(MAX_PLAN_TASKS)
        .collect();
    if tasks.is_empty() {
        return Err(GeminiError::InvalidResponse("plan has no tasks".into()));
    }

    let milestones = raw
        .milestones
        .into_iter()
        .filter_map(|m| {
            let title = truncate(&clean(m.title)?, MILESTONE_TITLE_MAX_CHARS);
            Some(PlannedMilestone {
                title,
                description: clean(m.description),
                target_date: offset_date(request.start_date, clamp_day(m.day, days)),
                criteria: m
                    .criteria
                    .into_iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect(),
            })
        })
        .take(MAX_PLAN_MILESTONES)
        .collect();

    Ok(GeneratedPlan {
        title,
        description: clean(raw.description),
        goal: request.goal.trim().to_string(),
        start_date: request.start_date,
        end_date: request.end_date(),
        tasks,
        milestones,
    })
}

fn extract_json(text: &str) -> Option<&str> {
    let text = text.trim();
    let body = match text.find("```") {
        Some(open) => {
            let after = &text[open + 3..];
            // Skip the info string ("json") on the fence line.
            let after = after.find('\n').map_or(after, |nl| &after[nl + 1..]);
            after.find("```").map_or(after, |close| &after[..close])
        }
        None => text,
    };
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

fn clamp_day(day: Option<f64>, days: u32) -> u32 {
    match day {
        Some(d) if d.is_finite() => (d.round().max(1.0) as u32).min(days),
        _ => days,
    }
}

/// Date of day `day` (1-based) of a sprint starting on `start`.
fn offset_date(start: NaiveDate, day: u32) -> NaiveDate {
    start
        .checked_add_days(Days::new(u64::from(day.saturating_sub(1))))
        .unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(days: u32) -> PlanRequest {
        PlanRequest {
            goal: "Run a 10k".into(),
            duration_days: days,
            context: None,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        }
    }

    #[test]
    fn parses_fenced_json() {
        let text = "Here you go:\n```json\n{\"title\": \"10k prep\", \"tasks\": [{\"title\": \"Easy run\", \"priority\": \"HIGH\", \"day\": 3}]}\n```\nGood luck!";
        let plan = parse_plan(text, &request(14)).unwrap();
        assert_eq!(plan.title, "10k prep");
        assert_eq!(plan.tasks[0].priority, Priority::High);
        assert_eq!(plan.tasks[0].due_date, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        assert_eq!(plan.end_date, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
    }

    #[test]
    fn clamps_days_and_counts() {
        let tasks: Vec<String> = (0..30)
            .map(|i| format!("{{\"title\": \"Task {i}\", \"day\": {}}}", i * 10))
            .collect();
        let text = format!("{{\"title\": \"Big\", \"tasks\": [{}]}}", tasks.join(","));
        let plan = parse_plan(&text, &request(7)).unwrap();
        assert_eq!(plan.tasks.len(), MAX_PLAN_TASKS);
        assert_eq!(plan.tasks[0].due_date, plan.start_date);
        assert_eq!(plan.tasks[5].due_date, plan.end_date);
    }

    #[test]
    fn rejects_plans_without_tasks() {
        let err = parse_plan(r#"{"title": "Empty", "tasks": [{"title": "  "}]}"#, &request(7));
        assert!(matches!(err, Err(GeminiError::InvalidResponse(_))));
        assert!(parse_plan("no json here", &request(7)).is_err());
        assert!(parse_plan(r#"{"tasks": [{"title": "x"}]}"#, &request(7)).is_err());
    }

    #[test]
    fn cuts_long_titles_to_storable_length() {
        let long = "x".repeat(250);
        let text = format!(
            r#"{{"title": "{long}", "tasks": [{{"title": "{long}"}}], "milestones": [{{"title": "{long}"}}]}}"#
        );
        let plan = parse_plan(&text, &request(7)).unwrap();
        assert_eq!(plan.title.chars().count(), SPRINT_TITLE_MAX_CHARS);
        assert_eq!(plan.tasks[0].title.chars().count(), TASK_TITLE_MAX_CHARS);
        assert_eq!(plan.milestones[0].title.chars().count(), MILESTONE_TITLE_MAX_CHARS);

        let input = plan.into_sprint_input("Long".into());
        assert!(sprintify_core::db::validate_new_sprint(&input).is_ok());
    }

    #[test]
    fn prompt_mentions_goal_and_context() {
        let prompt = build_plan_prompt("Learn Rust", 30, Some("two hours a day"));
        assert!(prompt.contains("Learn Rust"));
        assert!(prompt.contains("30-day"));
        assert!(prompt.contains("two hours a day"));
    }
}
