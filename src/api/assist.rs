//! AI-assisted authoring endpoints: each is a prompt template plus one
//! gateway call, with a deterministic fallback when no credential is
//! configured. Gateway failures here surface as a generic 500; only the
//! solver chat endpoint swallows errors.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use uuid::Uuid;

use crate::api::{api_error, api_error_detail, store_error, ApiError, Envelope};
use crate::llm::gateway;
use crate::models::Record;
use crate::state::AppState;

const SIMILAR_LIMIT: usize = 5;
const ASSIST_MAX_TOKENS: u32 = 1024;

/// Keywords that suggest a stated "root cause" is really a symptom.
const SYMPTOM_KEYWORDS: [&str; 7] = [
    "error",
    "failed",
    "slow",
    "down",
    "not working",
    "timeout",
    "crash",
];

async fn complete_or_unavailable(
    state: &AppState,
    system_prompt: &str,
    user_prompt: &str,
    message: &'static str,
) -> Result<String, ApiError> {
    gateway::complete(
        &state.http_client,
        &state.config.llm,
        system_prompt,
        user_prompt,
        ASSIST_MAX_TOKENS,
    )
    .await
    .map_err(|e| {
        tracing::error!("LLM gateway call failed: {e:#}");
        api_error_detail(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            "AI service temporarily unavailable",
        )
    })
}

// ─── Similarity ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SimilarityRequest {
    pub title: Option<String>,
    pub symptoms: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SimilarityData {
    #[serde(rename = "similarRCAs")]
    pub similar_rcas: Vec<Record>,
    #[serde(rename = "aiSuggestion")]
    pub ai_suggestion: String,
    pub source: &'static str,
}

/// POST /api/ai/similarity - Match existing records against a draft issue
/// and, when the gateway is configured, ask the model to judge similarity.
pub async fn similarity(
    State(state): State<AppState>,
    Json(req): Json<SimilarityRequest>,
) -> Result<Json<Envelope<SimilarityData>>, ApiError> {
    let title = req.title.as_deref().unwrap_or("").trim();
    let symptoms = req.symptoms.as_deref().unwrap_or("").trim();
    if title.is_empty() && symptoms.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Please provide title or symptoms to find similar RCAs",
        ));
    }

    let terms: Vec<String> = format!("{title} {symptoms}")
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let records = state.store.all();
    let similar = find_similar_records(&records, &terms, SIMILAR_LIMIT);

    if !state.config.llm.is_configured() {
        return Ok(Envelope::data(SimilarityData {
            similar_rcas: similar,
            ai_suggestion: "AI suggestions unavailable. Configure LLM_API_KEY to enable AI features."
                .to_string(),
            source: "database",
        }));
    }

    let system_prompt = "You are an IT incident analyst assistant. Your job is to help identify \
                         similar past issues and suggest solutions based on historical data. \
                         Be concise and practical.";
    let user_prompt = build_similarity_prompt(title, symptoms, &similar);

    let suggestion = complete_or_unavailable(
        &state,
        system_prompt,
        &user_prompt,
        "Failed to find similar RCAs",
    )
    .await?;

    Ok(Envelope::data(SimilarityData {
        similar_rcas: similar,
        ai_suggestion: suggestion,
        source: "ai-enhanced",
    }))
}

/// OR-match records whose title or symptoms contain any of the given terms
/// (case-insensitive).
fn find_similar_records(records: &[Record], terms: &[String], limit: usize) -> Vec<Record> {
    let needles: Vec<String> = terms
        .iter()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if needles.is_empty() {
        return Vec::new();
    }

    records
        .iter()
        .filter(|r| {
            let title = r.title.to_lowercase();
            let symptoms = r.symptoms.to_lowercase();
            needles
                .iter()
                .any(|n| title.contains(n) || symptoms.contains(n))
        })
        .take(limit)
        .cloned()
        .collect()
}

fn build_similarity_prompt(title: &str, symptoms: &str, similar: &[Record]) -> String {
    let context = if similar.is_empty() {
        "No existing RCAs found in the database.".to_string()
    } else {
        similar
            .iter()
            .map(|r| {
                format!(
                    "Title: {}\nCategory: {}\nSymptoms: {}\nRoot Cause: {}\nSolution: {}",
                    r.title, r.category, r.symptoms, r.root_cause, r.solution
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n")
    };

    format!(
        "A user is reporting a new issue:\n\
         Title: {}\n\
         Symptoms: {}\n\n\
         Here are potentially similar past RCAs from our database:\n\
         {context}\n\n\
         Please analyze and provide:\n\
         1. Are any of the existing RCAs similar to this new issue? (Yes/No and brief explanation)\n\
         2. If similar issues exist, what was the likely root cause?\n\
         3. What solution would you suggest based on past incidents?\n\
         4. Any additional investigation steps recommended?\n\n\
         Keep your response brief and actionable.",
        if title.is_empty() { "Not provided" } else { title },
        if symptoms.is_empty() { "Not provided" } else { symptoms },
    )
}

// ─── Field assistance ────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AssistRequest {
    pub field: Option<String>,
    pub value: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistData {
    pub original_value: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    pub source: &'static str,
}

/// POST /api/ai/assist - Critique/improve a single draft field.
pub async fn assist(
    State(state): State<AppState>,
    Json(req): Json<AssistRequest>,
) -> Result<Json<Envelope<AssistData>>, ApiError> {
    let field = req.field.as_deref().unwrap_or("").trim().to_string();
    let value = req.value.as_deref().unwrap_or("").trim().to_string();
    if field.is_empty() || value.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Please provide field name and value for assistance",
        ));
    }

    if !state.config.llm.is_configured() {
        return Ok(Envelope::data(AssistData {
            original_value: value.clone(),
            suggestion: default_field_tip(&field).to_string(),
            field: None,
            improved: Some(value),
            warnings: Some(Vec::new()),
            source: "default",
        }));
    }

    let system_prompt = "You are an expert IT incident analyst helping users write better Root \
                         Cause Analysis (RCA) documents. Provide practical, concise suggestions. \
                         Do not use markdown formatting.";
    let user_prompt = build_field_prompt(&field, &value, req.context.as_deref());

    let suggestion =
        complete_or_unavailable(&state, system_prompt, &user_prompt, "Failed to get AI assistance")
            .await?;

    Ok(Envelope::data(AssistData {
        original_value: value,
        suggestion,
        field: Some(field),
        improved: None,
        warnings: None,
        source: "ai-enhanced",
    }))
}

/// Canned per-field guidance used when no credential is configured.
fn default_field_tip(field: &str) -> &'static str {
    match field {
        "title" => "Consider making the title more specific. Include the affected system and impact.",
        "symptoms" => "List observable symptoms: error messages, performance metrics, user reports.",
        "rootCause" => "Identify the underlying technical reason. Ask \"why\" 5 times to dig deeper.",
        "solution" => "Document step-by-step resolution. Include commands, configurations, or code changes.",
        "prevention" => "Consider monitoring, alerts, or process changes to prevent recurrence.",
        _ => "Provide clear, specific details.",
    }
}

fn build_field_prompt(field: &str, value: &str, context: Option<&str>) -> String {
    let context = context.filter(|c| !c.trim().is_empty());
    match field {
        "title" => format!(
            "The user entered this issue title: \"{value}\"\n\n\
             Please:\n\
             1. Suggest a clearer, more specific title if needed\n\
             2. Identify if important details are missing (affected system, impact, timeframe)\n\
             3. Keep suggestions brief"
        ),
        "symptoms" => format!(
            "The user described these symptoms: \"{value}\"\n\n\
             Context: {}\n\n\
             Please:\n\
             1. Identify if symptoms are clear and measurable\n\
             2. Suggest additional symptoms to document\n\
             3. Distinguish symptoms from root causes if confused",
            context.unwrap_or("None provided")
        ),
        "rootCause" => format!(
            "The user identified this root cause: \"{value}\"\n\n\
             Symptoms were: {}\n\n\
             Please:\n\
             1. Check if this is truly a root cause or just another symptom\n\
             2. Suggest ways to verify this root cause\n\
             3. If it looks like a symptom, suggest what the actual root cause might be\n\
             4. Warn if the root cause seems incomplete",
            context.unwrap_or("Not provided")
        ),
        "solution" => format!(
            "The user documented this solution: \"{value}\"\n\n\
             Root cause was: {}\n\n\
             Please:\n\
             1. Check if the solution addresses the root cause\n\
             2. Suggest any missing steps\n\
             3. Recommend verification steps",
            context.unwrap_or("Not provided")
        ),
        "prevention" => format!(
            "The user suggested this prevention: \"{value}\"\n\n\
             Root cause was: {}\n\n\
             Please:\n\
             1. Evaluate if prevention is practical\n\
             2. Suggest additional preventive measures\n\
             3. Recommend monitoring or alerts",
            context.unwrap_or("Not provided")
        ),
        _ => format!("Help improve this RCA field ({field}): \"{value}\""),
    }
}

// ─── Root cause validation ───────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub root_cause: Option<String>,
    pub symptoms: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateData {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    pub source: &'static str,
}

/// POST /api/ai/validate-rootcause - Classify a stated root cause as a
/// true root cause, a symptom in disguise, or unclear.
pub async fn validate_root_cause(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<Envelope<ValidateData>>, ApiError> {
    let root_cause = req.root_cause.as_deref().unwrap_or("").trim().to_string();
    if root_cause.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Please provide root cause to validate",
        ));
    }

    if !state.config.llm.is_configured() {
        let likely_symptom = is_likely_symptom(&root_cause);
        return Ok(Envelope::data(ValidateData {
            is_valid: !likely_symptom,
            confidence: Some("low"),
            feedback: Some(
                if likely_symptom {
                    "This might be a symptom rather than a root cause. Try asking \"why did this happen?\" to dig deeper."
                } else {
                    "This looks like it could be a valid root cause."
                }
                .to_string(),
            ),
            analysis: None,
            source: "heuristic",
        }));
    }

    let system_prompt = "You are an IT incident analysis expert. Determine if a stated \"root \
                         cause\" is actually a root cause or if it's really just a symptom. Be \
                         direct and concise.";
    let user_prompt = format!(
        "Stated Root Cause: \"{root_cause}\"\n\
         Related Symptoms: \"{}\"\n\n\
         Analyze:\n\
         1. Is this truly a ROOT CAUSE (the underlying reason) or is it actually a SYMPTOM (an observable effect)?\n\
         2. Confidence level (High/Medium/Low)\n\
         3. If it's a symptom, suggest what the actual root cause might be\n\
         4. Provide a one-line recommendation\n\n\
         Format your response as:\n\
         VERDICT: [Root Cause / Symptom / Unclear]\n\
         CONFIDENCE: [High/Medium/Low]\n\
         REASONING: [Brief explanation]\n\
         SUGGESTION: [What to do next]",
        req.symptoms.as_deref().unwrap_or("Not provided"),
    );

    let analysis = complete_or_unavailable(
        &state,
        system_prompt,
        &user_prompt,
        "Failed to validate root cause",
    )
    .await?;

    let is_symptom = verdict_is_symptom(&analysis);
    Ok(Envelope::data(ValidateData {
        is_valid: !is_symptom,
        confidence: None,
        feedback: None,
        analysis: Some(analysis),
        source: "ai-enhanced",
    }))
}

fn is_likely_symptom(root_cause: &str) -> bool {
    let lower = root_cause.to_lowercase();
    SYMPTOM_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn verdict_is_symptom(analysis: &str) -> bool {
    let lower = analysis.to_lowercase();
    lower.contains("verdict: symptom") || lower.contains("verdict:symptom")
}

// ─── Summary ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeRequest {
    pub rca_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SummaryData {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rca: Option<Record>,
    pub source: &'static str,
}

/// POST /api/ai/summarize - Stakeholder-facing summary of one record.
pub async fn summarize(
    State(state): State<AppState>,
    Json(req): Json<SummarizeRequest>,
) -> Result<Json<Envelope<SummaryData>>, ApiError> {
    let Some(rca_id) = req.rca_id else {
        return Err(api_error(StatusCode::BAD_REQUEST, "rcaId is required"));
    };

    let record = state
        .store
        .get(rca_id)
        .map_err(|e| store_error(e, "Failed to generate summary"))?;

    if !state.config.llm.is_configured() {
        return Ok(Envelope::data(SummaryData {
            summary: basic_summary(&record),
            rca: None,
            source: "basic",
        }));
    }

    let system_prompt = "You are a technical writer. Create concise, professional incident \
                         summaries suitable for stakeholder communication.";
    let user_prompt = build_summary_prompt(&record);

    let summary =
        complete_or_unavailable(&state, system_prompt, &user_prompt, "Failed to generate summary")
            .await?;

    Ok(Envelope::data(SummaryData {
        summary,
        rca: Some(record),
        source: "ai-enhanced",
    }))
}

fn basic_summary(record: &Record) -> String {
    format!(
        "Issue: {}\nCategory: {}\nRoot Cause: {}\nResolution: {}",
        record.title, record.category, record.root_cause, record.solution
    )
}

fn build_summary_prompt(record: &Record) -> String {
    let mut prompt = String::from("Create a brief executive summary for this incident:\n\n");
    let _ = write!(
        prompt,
        "Title: {}\nCategory: {}\nSeverity: {}\nSymptoms: {}\nRoot Cause: {}\nSolution: {}\nPrevention: {}\n\n\
         Provide a 3-4 sentence summary suitable for a status update or incident report.",
        record.title,
        record.category,
        record.severity,
        record.symptoms,
        record.root_cause,
        record.solution,
        record.prevention,
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordInput;

    fn record(title: &str, symptoms: &str) -> Record {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::RecordStore::open(dir.path().join("db.json")).unwrap();
        store.create(
            RecordInput {
                title: title.into(),
                category: "Database".into(),
                symptoms: symptoms.into(),
                root_cause: "connection leak".into(),
                solution: "release connections".into(),
                ..RecordInput::default()
            }
            .validate()
            .unwrap(),
        )
    }

    // ─── Similarity matching ─────────────────────────────

    #[test]
    fn test_find_similar_matches_title_or_symptoms() {
        let records = vec![
            record("DB timeout", "pool exhausted"),
            record("SSL expiry", "handshake failures"),
        ];
        let terms = vec!["timeout".to_string()];
        let hits = find_similar_records(&records, &terms, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "DB timeout");
    }

    #[test]
    fn test_find_similar_caps_at_limit() {
        let records: Vec<Record> = (0..8).map(|i| record(&format!("timeout {i}"), "x")).collect();
        let terms = vec!["timeout".to_string()];
        assert_eq!(find_similar_records(&records, &terms, 5).len(), 5);
    }

    #[test]
    fn test_find_similar_empty_terms() {
        let records = vec![record("A", "B")];
        assert!(find_similar_records(&records, &[], 5).is_empty());
    }

    // ─── Prompt builders ─────────────────────────────────

    #[test]
    fn test_similarity_prompt_includes_context() {
        let records = vec![record("DB timeout", "pool exhausted")];
        let prompt = build_similarity_prompt("new issue", "slow queries", &records);
        assert!(prompt.contains("Title: DB timeout"));
        assert!(prompt.contains("new issue"));
    }

    #[test]
    fn test_similarity_prompt_without_matches() {
        let prompt = build_similarity_prompt("new issue", "", &[]);
        assert!(prompt.contains("No existing RCAs found"));
        assert!(prompt.contains("Symptoms: Not provided"));
    }

    #[test]
    fn test_field_prompt_root_cause_includes_symptoms() {
        let prompt = build_field_prompt("rootCause", "network blip", Some("users timed out"));
        assert!(prompt.contains("network blip"));
        assert!(prompt.contains("users timed out"));
    }

    #[test]
    fn test_field_prompt_unknown_field() {
        let prompt = build_field_prompt("impact", "everything", None);
        assert!(prompt.contains("impact"));
    }

    // ─── Heuristics ──────────────────────────────────────

    #[test]
    fn test_symptom_keyword_detection() {
        assert!(is_likely_symptom("The server was down"));
        assert!(is_likely_symptom("API not working properly"));
        assert!(!is_likely_symptom("Misconfigured connection pool size"));
    }

    #[test]
    fn test_verdict_parsing() {
        assert!(verdict_is_symptom("VERDICT: Symptom\nCONFIDENCE: High"));
        assert!(verdict_is_symptom("verdict:symptom"));
        assert!(!verdict_is_symptom("VERDICT: Root Cause"));
    }

    #[test]
    fn test_default_tips_cover_all_fields() {
        for field in ["title", "symptoms", "rootCause", "solution", "prevention"] {
            assert!(!default_field_tip(field).is_empty());
        }
        assert_eq!(default_field_tip("bogus"), "Provide clear, specific details.");
    }

    #[test]
    fn test_basic_summary_concatenates_fields() {
        let r = record("DB timeout", "pool exhausted");
        let summary = basic_summary(&r);
        assert!(summary.contains("Issue: DB timeout"));
        assert!(summary.contains("Root Cause: connection leak"));
    }
}
