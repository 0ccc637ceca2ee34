//! Problem solver endpoints: rank past incidents against a new problem
//! description, drive a multi-turn diagnostic chat, and turn solved
//! problems back into records.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::api::{api_error, store_error, ApiError, Envelope};
use crate::llm::confidence::{classify_confidence, Confidence};
use crate::llm::gateway;
use crate::models::{Category, ChatMessage, Record, RecordInput};
use crate::search;
use crate::state::AppState;

const SOLVER_SEARCH_LIMIT: usize = 10;
const CHAT_CONTEXT_LIMIT: usize = 3;
const SOLVER_MAX_TOKENS: u32 = 2048;
const CHAT_MAX_TOKENS: u32 = 1024;

/// Indexed search over a problem description with keyword fallback: the
/// fallback tier splits the problem into words longer than 3 characters
/// and OR-matches them across the searchable fields.
fn solver_search(state: &AppState, records: &[Record], problem: &str, limit: usize) -> Vec<Record> {
    if let Some(index) = state.index.as_deref() {
        match index.search(problem, limit) {
            Ok(hits) => {
                return hits
                    .into_iter()
                    .filter_map(|(id, _)| records.iter().find(|r| r.id == id).cloned())
                    .collect();
            }
            Err(e) => {
                tracing::warn!("Solver index search failed, using keyword fallback: {e:#}");
            }
        }
    }
    search::keyword_fallback(records, &search::search_terms(problem), limit)
}

// ─── Search ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverSearchRequest {
    pub problem: Option<String>,
    pub category: Option<String>,
    pub additional_details: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverSearchData {
    #[serde(rename = "matchedRCAs")]
    pub matched_rcas: Vec<Record>,
    pub total_matches: usize,
    pub ai_analysis: String,
    pub confidence: Confidence,
    pub searched_problem: String,
}

/// POST /api/solver/search - Rank past incidents against a new problem.
pub async fn search_solutions(
    State(state): State<AppState>,
    Json(req): Json<SolverSearchRequest>,
) -> Result<Json<Envelope<SolverSearchData>>, ApiError> {
    let problem = req.problem.as_deref().unwrap_or("").trim().to_string();
    if problem.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Please describe your problem",
        ));
    }

    let records = state.store.all();
    let mut matched = solver_search(&state, &records, &problem, SOLVER_SEARCH_LIMIT);

    // Category widening: merge in the 5 most recent records of the chosen
    // category, deduplicated by id.
    if let Some(category) = req.category.as_deref().filter(|c| !c.is_empty() && *c != "All") {
        if let Ok(category) = Category::from_str(category) {
            for record in state.store.recent(Some(category), 5) {
                if !matched.iter().any(|m| m.id == record.id) {
                    matched.push(record);
                }
            }
        }
    }

    let llm_ready = state.config.llm.is_configured();
    let mut confidence = Confidence::Low;

    let analysis = if !matched.is_empty() {
        let llm_analysis = if llm_ready {
            let system_prompt =
                "You are an expert IT support assistant. Your job is to help users solve \
                 technical problems by analyzing past incident records (RCAs) and providing \
                 actionable guidance.\n\n\
                 Be practical, specific, and helpful. Format your response as structured \
                 guidance that a user can follow step-by-step.";
            let user_prompt = build_ranking_prompt(
                &problem,
                req.additional_details.as_deref(),
                req.category.as_deref(),
                &matched[..matched.len().min(5)],
            );
            gateway::complete(
                &state.http_client,
                &state.config.llm,
                system_prompt,
                &user_prompt,
                SOLVER_MAX_TOKENS,
            )
            .await
            .map_err(|e| tracing::warn!("Solver analysis call failed: {e:#}"))
            .ok()
        } else {
            None
        };

        match llm_analysis {
            Some(text) => {
                confidence = classify_confidence(&text);
                text
            }
            None => {
                // Keyword matching found something; summarize the best hit
                confidence = Confidence::Medium;
                best_match_summary(&matched[0], matched.len())
            }
        }
    } else {
        let general = if llm_ready {
            let user_prompt = build_general_guidance_prompt(
                &problem,
                req.additional_details.as_deref(),
                req.category.as_deref(),
            );
            gateway::complete(
                &state.http_client,
                &state.config.llm,
                "You are a helpful IT support assistant providing general troubleshooting guidance.",
                &user_prompt,
                SOLVER_MAX_TOKENS,
            )
            .await
            .map_err(|e| tracing::warn!("General guidance call failed: {e:#}"))
            .ok()
        } else {
            None
        };
        general.unwrap_or_else(|| NO_MATCH_CHECKLIST.to_string())
    };

    let total_matches = matched.len();
    matched.truncate(5);

    Ok(Envelope::data(SolverSearchData {
        matched_rcas: matched,
        total_matches,
        ai_analysis: analysis,
        confidence,
        searched_problem: problem,
    }))
}

fn build_ranking_prompt(
    problem: &str,
    details: Option<&str>,
    category: Option<&str>,
    candidates: &[Record],
) -> String {
    let mut context = String::new();
    for (idx, r) in candidates.iter().enumerate() {
        if idx > 0 {
            context.push_str("\n---\n");
        }
        let _ = write!(
            context,
            "RCA #{}:\n- Title: {}\n- Category: {}\n- Symptoms: {}\n- Root Cause: {}\n- Solution: {}\n- Prevention: {}\n",
            idx + 1,
            r.title,
            r.category,
            r.symptoms,
            r.root_cause,
            r.solution,
            if r.prevention.is_empty() { "Not specified" } else { &r.prevention },
        );
    }

    let mut prompt = format!("A user is experiencing this problem:\n\"{problem}\"\n");
    if let Some(details) = details.filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(prompt, "Additional details: {details}");
    }
    if let Some(category) = category.filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(prompt, "Category: {category}");
    }
    let _ = write!(
        prompt,
        "\nHere are similar past incidents from our knowledge base:\n{context}\n\
         Please analyze and provide:\n\
         1. MATCH ASSESSMENT: How closely do the past RCAs match this problem? (High/Medium/Low confidence)\n\
         2. LIKELY ROOT CAUSE: Based on patterns, what's the most likely cause?\n\
         3. RECOMMENDED SOLUTION: Step-by-step solution based on past fixes\n\
         4. TROUBLESHOOTING STEPS: If the main solution doesn't work, what else to try\n\
         5. QUESTIONS TO ASK: What additional info would help diagnose this better?\n\n\
         Format your response clearly with these sections."
    );
    prompt
}

fn build_general_guidance_prompt(
    problem: &str,
    details: Option<&str>,
    category: Option<&str>,
) -> String {
    let mut prompt = format!("A user is experiencing this technical problem: \"{problem}\"\n");
    if let Some(details) = details.filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(prompt, "Additional details: {details}");
    }
    if let Some(category) = category.filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(prompt, "Category: {category}");
    }
    prompt.push_str(
        "\nWe don't have any similar past incidents in our database. Please provide:\n\
         1. General troubleshooting steps for this type of issue\n\
         2. Common causes for such problems\n\
         3. What information would help diagnose this\n\
         4. Recommendation to document this as a new RCA once solved\n\n\
         Keep it practical and actionable.",
    );
    prompt
}

fn best_match_summary(best: &Record, total: usize) -> String {
    let mut summary = format!(
        "Based on keyword matching, we found {total} potentially related issue(s).\n\n\
         **Most Similar Issue:** {}\n\n\
         **Symptoms from past incident:**\n{}\n\n\
         **Root Cause was:**\n{}\n\n\
         **Solution that worked:**\n{}\n",
        best.title, best.symptoms, best.root_cause, best.solution
    );
    if !best.prevention.is_empty() {
        let _ = write!(summary, "\n**Prevention tips:** {}\n", best.prevention);
    }
    summary.push_str(
        "\nPlease review if this matches your situation. If not, try providing more details about your problem.",
    );
    summary
}

const NO_MATCH_CHECKLIST: &str = "No similar issues found in our knowledge base. This might be a new type of problem.\n\n\
**Recommendations:**\n\
1. Check system logs for error messages\n\
2. Verify recent changes (deployments, configs, updates)\n\
3. Check resource utilization (CPU, memory, disk, network)\n\
4. Try restarting the affected service/component\n\
5. Document your findings for future reference\n\n\
Once you solve this issue, please create an RCA to help others who face similar problems!";

// ─── Guided help ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideRequest {
    pub rca_id: Option<Uuid>,
    pub user_problem: Option<String>,
    pub user_context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GuideData {
    pub rca: Record,
    pub guidance: String,
}

/// POST /api/solver/guide - Adapt a past record's solution to the user's
/// current problem.
pub async fn guide(
    State(state): State<AppState>,
    Json(req): Json<GuideRequest>,
) -> Result<Json<Envelope<GuideData>>, ApiError> {
    let Some(rca_id) = req.rca_id else {
        return Err(api_error(StatusCode::BAD_REQUEST, "rcaId is required"));
    };

    let record = state
        .store
        .get(rca_id)
        .map_err(|e| store_error(e, "Failed to get guided help"))?;

    let guidance = if state.config.llm.is_configured() {
        let system_prompt = "You are a helpful IT support guide. Based on a past incident record, \
                             help the user solve their current problem with clear, step-by-step \
                             instructions.";
        let user_prompt = build_guide_prompt(
            &record,
            req.user_problem.as_deref().unwrap_or(""),
            req.user_context.as_deref(),
        );
        gateway::complete(
            &state.http_client,
            &state.config.llm,
            system_prompt,
            &user_prompt,
            SOLVER_MAX_TOKENS,
        )
        .await
        .map_err(|e| tracing::warn!("Guide call failed: {e:#}"))
        .ok()
    } else {
        None
    };

    let guidance = guidance.unwrap_or_else(|| template_guide(&record));

    Ok(Envelope::data(GuideData {
        rca: record,
        guidance,
    }))
}

fn build_guide_prompt(record: &Record, user_problem: &str, user_context: Option<&str>) -> String {
    let mut prompt = format!("The user's current problem: \"{user_problem}\"\n");
    if let Some(ctx) = user_context.filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(prompt, "Additional context: {ctx}");
    }
    let _ = write!(
        prompt,
        "\nThis past incident seems relevant:\n\
         - Title: {}\n\
         - Category: {}\n\
         - Past Symptoms: {}\n\
         - Root Cause: {}\n\
         - Solution Applied: {}\n\
         - Prevention: {}\n\n\
         Please provide:\n\
         1. How to verify if this is the same issue (diagnostic steps)\n\
         2. Step-by-step solution adapted to the user's context\n\
         3. How to verify the fix worked\n\
         4. What to do if this doesn't solve it\n\
         5. Preventive measures to avoid recurrence\n\n\
         Be specific and actionable.",
        record.title,
        record.category,
        record.symptoms,
        record.root_cause,
        record.solution,
        if record.prevention.is_empty() { "Not documented" } else { &record.prevention },
    );
    prompt
}

/// Fallback guide synthesized from the record's own fields.
fn template_guide(record: &Record) -> String {
    format!(
        "**Guided Solution Based on Past Incident**\n\n\
         **Step 1: Verify the Problem**\n\
         Compare your symptoms with the past incident:\n\
         - Past symptoms: {}\n\n\
         **Step 2: Apply the Solution**\n{}\n\n\
         **Step 3: Verify the Fix**\n\
         - Test the affected functionality\n\
         - Monitor for recurrence\n\
         - Check logs for any remaining errors\n\n\
         **Step 4: If Not Resolved**\n\
         - The root cause might be different\n\
         - Document what you tried\n\
         - Consider creating a new RCA\n\n\
         **Prevention:**\n{}",
        record.symptoms,
        record.solution,
        if record.prevention.is_empty() {
            "Document preventive measures once resolved"
        } else {
            &record.prevention
        },
    )
}

// ─── Chat ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatData {
    pub response: String,
    #[serde(rename = "relevantRCAs")]
    pub relevant_rcas: Vec<Record>,
    pub source: &'static str,
}

fn greeting_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(hi|hello|hey|good morning|good afternoon|good evening|howdy|greetings)")
            .unwrap()
    })
}

/// Broader small-talk test used to decide whether a message is worth a
/// knowledge-base context search.
fn small_talk_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(hi|hello|hey|good morning|good afternoon|good evening|howdy|greetings|thanks|thank you|ok|okay|yes|no|bye|goodbye)",
        )
        .unwrap()
    })
}

const FALLBACK_GREETING: &str = "Hello! 👋 I'm your RCA Assistant. I'm here to help you troubleshoot technical issues.\n\n\
Unfortunately, AI features are not configured yet. But you can still:\n\
• Search for solutions using Quick Search mode\n\
• Browse the Knowledge Base for past incidents\n\
• Create new RCAs to document issues\n\n\
How can I help you today?";

fn fallback_default(last_user_message: &str) -> String {
    format!(
        "I understand you're saying: \"{last_user_message}\"\n\n\
         To help you better, I need the AI features to be enabled. Please configure the LLM_API_KEY in the environment.\n\n\
         In the meantime, try using Quick Search mode to find solutions!"
    )
}

/// POST /api/solver/chat - Conversational diagnosis.
///
/// This endpoint never returns a non-200 on gateway failure: errors are
/// converted to an apologetic assistant-style message so the chat UI never
/// shows a raw error.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Envelope<ChatData>>, ApiError> {
    let last_user_message = req
        .messages
        .iter()
        .filter(|m| m.role == "user")
        .next_back()
        .map(|m| m.content.trim().to_string())
        .unwrap_or_default();

    if last_user_message.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Please send a message"));
    }

    if !state.config.llm.is_configured() {
        let response = if greeting_re().is_match(&last_user_message) {
            FALLBACK_GREETING.to_string()
        } else {
            fallback_default(&last_user_message)
        };
        return Ok(Envelope::data(ChatData {
            response,
            relevant_rcas: Vec::new(),
            source: "fallback",
        }));
    }

    // Context search only for substantive messages
    let relevant_rcas = if !small_talk_re().is_match(&last_user_message)
        && last_user_message.len() > 5
    {
        let records = state.store.all();
        solver_search(&state, &records, &last_user_message, CHAT_CONTEXT_LIMIT)
    } else {
        Vec::new()
    };

    let system_prompt = build_chat_system_prompt(&relevant_rcas);
    let conversation = normalize_conversation(&req.messages, &last_user_message);

    match gateway::complete_with_history(
        &state.http_client,
        &state.config.llm,
        &system_prompt,
        &conversation,
        CHAT_MAX_TOKENS,
    )
    .await
    {
        Ok(response) => Ok(Envelope::data(ChatData {
            response,
            relevant_rcas,
            source: "ai",
        })),
        Err(e) => {
            tracing::error!("Chat gateway call failed: {e:#}");
            Ok(Envelope::data(ChatData {
                response: apologetic_error_message(&e),
                relevant_rcas: Vec::new(),
                source: "error",
            }))
        }
    }
}

fn build_chat_system_prompt(relevant: &[Record]) -> String {
    let rca_context = if relevant.is_empty() {
        String::new()
    } else {
        let list = relevant
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let cause: String = r.root_cause.chars().take(100).collect();
                format!("{}. \"{}\" - Root cause: {cause}...", i + 1, r.title)
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "\n\nKnowledge Base Context: I found these relevant past incidents in our knowledge base that might help:\n{list}"
        )
    };

    format!(
        "You are a friendly and helpful IT Support Assistant chatbot. Your name is \"RCA Bot\".\n\n\
         Your personality:\n\
         - Friendly and conversational (use casual language, emojis occasionally)\n\
         - Patient and understanding\n\
         - Knowledgeable about IT issues\n\
         - Helpful in diagnosing problems step by step\n\n\
         Your capabilities:\n\
         - Help users troubleshoot technical problems\n\
         - Guide them through diagnostic steps\n\
         - Suggest solutions based on past incidents\n\
         - Help document new issues as RCAs\n\n\
         How to behave:\n\
         - For greetings (hi, hello, etc.): Respond warmly and ask how you can help\n\
         - For technical problems: Ask clarifying questions, then provide step-by-step guidance\n\
         - For thanks/goodbye: Respond politely\n\
         - Always be encouraging and supportive{rca_context}\n\n\
         Remember: You're having a natural conversation. Don't be robotic. Be helpful like a friendly colleague who knows about IT issues."
    )
}

/// Normalize a conversation for the provider's alternation constraint.
///
/// Preconditions: `messages` may contain arbitrary roles in any order;
/// `last_user_message` is the trimmed content of the final user turn and
/// is non-empty.
///
/// Postconditions: the result is non-empty, starts with a user turn,
/// strictly alternates user/assistant, and ends with a user turn.
/// Consecutive same-role turns, assistant turns with no preceding user
/// turn, and assistant turns flagged `isError` (the apologetic texts this
/// server emitted after a gateway failure) are dropped.
pub fn normalize_conversation(
    messages: &[ChatMessage],
    last_user_message: &str,
) -> Vec<ChatMessage> {
    let mut normalized: Vec<ChatMessage> = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role.as_str() {
            "user" => {
                if normalized.last().is_some_and(|m| m.role == "user") {
                    continue;
                }
                normalized.push(msg.clone());
            }
            "assistant" => {
                if msg.is_error == Some(true) {
                    continue;
                }
                if normalized.last().is_some_and(|m| m.role == "user") {
                    normalized.push(msg.clone());
                }
            }
            _ => {}
        }
    }

    if normalized.last().is_none_or(|m| m.role != "user") {
        normalized.push(ChatMessage {
            role: "user".to_string(),
            content: last_user_message.to_string(),
            is_error: None,
        });
    }

    normalized
}

/// Pick a user-facing apology based on what went wrong, with the raw error
/// appended as fine print.
fn apologetic_error_message(error: &anyhow::Error) -> String {
    let detail = format!("{error:#}");
    let lower = detail.to_lowercase();

    let message = if lower.contains("api key") || lower.contains("api-key") {
        "Oops! My AI brain is not connected properly. Please check the API key configuration."
    } else if lower.contains("rate limit") || lower.contains("rate_limit") {
        "I'm a bit overwhelmed right now. Please wait a moment and try again."
    } else if lower.contains("401") {
        "My API key seems to be invalid. Please check the configuration."
    } else {
        "Sorry, I encountered an error. Please try again!"
    };

    format!("{message}\n\n_Error details: {detail}_")
}

// ─── Feedback ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub rca_id: Option<Uuid>,
    pub helpful: Option<bool>,
    pub problem_description: Option<String>,
    pub actual_solution: Option<String>,
    #[serde(rename = "createNewRCA")]
    pub create_new_rca: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackData {
    pub feedback_recorded: bool,
    #[serde(rename = "newRCA", skip_serializing_if = "Option::is_none")]
    pub new_rca: Option<Record>,
}

/// Partial record shape the model is asked to return as strict JSON.
/// Every field is optional; parsed values are merged over the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuredDraft {
    title: Option<String>,
    category: Option<String>,
    symptoms: Option<String>,
    root_cause: Option<String>,
    solution: Option<String>,
    prevention: Option<String>,
    severity: Option<String>,
    tags: Option<Vec<String>>,
}

/// POST /api/solver/feedback - Acknowledge helpfulness and optionally turn
/// a solved problem into a new record.
pub async fn feedback(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> Result<(StatusCode, Json<Envelope<FeedbackData>>), ApiError> {
    // Helpfulness is acknowledged but not persisted; there is no scoring
    // mechanism to attach it to yet.
    if let (Some(rca_id), Some(true)) = (req.rca_id, req.helpful) {
        tracing::info!("RCA {rca_id} was marked as helpful");
    }

    let problem = req
        .problem_description
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_string();
    let solution = req.actual_solution.as_deref().unwrap_or("").trim().to_string();

    if req.create_new_rca == Some(true) && !problem.is_empty() && !solution.is_empty() {
        let defaults = feedback_defaults(&problem, &solution);
        let validated_defaults = defaults
            .validate()
            .map_err(|e| store_error(e, "Failed to submit feedback"))?;

        let validated = match structure_with_llm(&state, &problem, &solution).await {
            Some(draft) => merge_draft(defaults, draft)
                .validate()
                .unwrap_or(validated_defaults),
            None => validated_defaults,
        };

        let record = state.store.create(validated);
        if let Some(index) = &state.index {
            if let Err(e) = index.add(&record) {
                tracing::warn!("Failed to index record {}: {e:#}", record.id);
            }
        }

        return Ok((
            StatusCode::CREATED,
            Envelope::with_message(
                "Thank you for your feedback! A new RCA has been created.",
                FeedbackData {
                    feedback_recorded: true,
                    new_rca: Some(record),
                },
            ),
        ));
    }

    Ok((
        StatusCode::OK,
        Envelope::with_message(
            "Thank you for your feedback!",
            FeedbackData {
                feedback_recorded: true,
                new_rca: None,
            },
        ),
    ))
}

fn feedback_defaults(problem: &str, solution: &str) -> RecordInput {
    RecordInput {
        title: problem.chars().take(100).collect(),
        category: "Other".to_string(),
        symptoms: problem.to_string(),
        root_cause: "To be determined".to_string(),
        solution: solution.to_string(),
        prevention: Some(String::new()),
        severity: Some("Medium".to_string()),
        status: Some("Resolved".to_string()),
        tags: Some(vec!["auto-generated".to_string(), "from-solver".to_string()]),
        created_by: Some("Problem Solver".to_string()),
    }
}

/// Ask the gateway to structure the problem/solution pair as strict JSON.
/// Returns None when the gateway is unconfigured, the call fails, or the
/// reply contains no parseable object; callers then keep the defaults.
async fn structure_with_llm(
    state: &AppState,
    problem: &str,
    solution: &str,
) -> Option<StructuredDraft> {
    if !state.config.llm.is_configured() {
        return None;
    }

    let user_prompt = format!(
        "Based on this problem and solution, create a structured RCA:\n\n\
         Problem: {problem}\n\
         Solution: {solution}\n\n\
         Provide a JSON response with:\n\
         {{\n\
           \"title\": \"concise title\",\n\
           \"category\": \"one of: Server, Database, Network, App, Security, Other\",\n\
           \"symptoms\": \"observable symptoms\",\n\
           \"rootCause\": \"underlying cause\",\n\
           \"solution\": \"step-by-step solution\",\n\
           \"prevention\": \"how to prevent recurrence\",\n\
           \"severity\": \"Low, Medium, High, or Critical\",\n\
           \"tags\": [\"relevant\", \"tags\"]\n\
         }}"
    );

    let reply = gateway::complete(
        &state.http_client,
        &state.config.llm,
        "You are a technical writer creating structured incident reports. Return only valid JSON.",
        &user_prompt,
        SOLVER_MAX_TOKENS,
    )
    .await
    .map_err(|e| tracing::warn!("Feedback structuring call failed: {e:#}"))
    .ok()?;

    let block = extract_json_block(&reply)?;
    match serde_json::from_str::<StructuredDraft>(block) {
        Ok(draft) => Some(draft),
        Err(e) => {
            tracing::warn!("Could not parse structured RCA from model reply: {e}");
            None
        }
    }
}

/// Extract the first `{...}` block from a free-text reply.
fn extract_json_block(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Merge parsed fields over the defaults. Status and author stay forced to
/// "Resolved" / "Problem Solver" no matter what the model says.
fn merge_draft(defaults: RecordInput, draft: StructuredDraft) -> RecordInput {
    RecordInput {
        title: draft.title.filter(|s| !s.trim().is_empty()).unwrap_or(defaults.title),
        category: draft
            .category
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.category),
        symptoms: draft
            .symptoms
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.symptoms),
        root_cause: draft
            .root_cause
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.root_cause),
        solution: draft
            .solution
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.solution),
        prevention: draft.prevention.or(defaults.prevention),
        severity: draft.severity.filter(|s| !s.trim().is_empty()).or(defaults.severity),
        tags: draft.tags.or(defaults.tags),
        status: defaults.status,
        created_by: defaults.created_by,
    }
}

// ─── Suggestions ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestItem {
    pub id: Uuid,
    pub title: String,
    pub preview: String,
    pub category: Category,
}

/// GET /api/solver/suggest - Autocomplete over titles and symptoms.
pub async fn suggest(
    State(state): State<AppState>,
    Query(query): Query<SuggestQuery>,
) -> Json<Envelope<Vec<SuggestItem>>> {
    let q = query.q.as_deref().unwrap_or("").trim().to_lowercase();
    if q.chars().count() < 3 {
        return Envelope::data(Vec::new());
    }

    let items = state
        .store
        .all()
        .into_iter()
        .filter(|r| {
            r.title.to_lowercase().contains(&q) || r.symptoms.to_lowercase().contains(&q)
        })
        .take(5)
        .map(|r| SuggestItem {
            id: r.id,
            title: r.title,
            preview: format!("{}...", r.symptoms.chars().take(100).collect::<String>()),
            category: r.category,
        })
        .collect();

    Envelope::data(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.into(),
            content: content.into(),
            is_error: None,
        }
    }

    // ─── Conversation normalization ──────────────────────

    #[test]
    fn test_normalize_alternating_conversation_unchanged() {
        let messages = vec![msg("user", "a"), msg("assistant", "b"), msg("user", "c")];
        let result = normalize_conversation(&messages, "c");
        assert_eq!(result, messages);
    }

    #[test]
    fn test_normalize_drops_consecutive_user_turns() {
        let messages = vec![msg("user", "a"), msg("user", "b")];
        let result = normalize_conversation(&messages, "b");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].content, "a");
    }

    #[test]
    fn test_normalize_drops_leading_assistant_turn() {
        let messages = vec![msg("assistant", "welcome"), msg("user", "help")];
        let result = normalize_conversation(&messages, "help");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].role, "user");
    }

    #[test]
    fn test_normalize_drops_unknown_roles() {
        let messages = vec![msg("system", "hack"), msg("user", "hi")];
        let result = normalize_conversation(&messages, "hi");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].role, "user");
    }

    #[test]
    fn test_normalize_drops_error_flagged_assistant_turns() {
        let mut apology = msg("assistant", "Sorry, I encountered an error. Please try again!");
        apology.is_error = Some(true);
        let messages = vec![
            msg("user", "help"),
            msg("assistant", "sure, what's wrong?"),
            msg("user", "db is slow"),
            apology,
        ];
        let result = normalize_conversation(&messages, "db is slow");
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|m| !m.content.contains("error")));
        assert_eq!(result.last().unwrap().content, "db is slow");
    }

    #[test]
    fn test_chat_message_never_serializes_error_flag() {
        let mut turn = msg("assistant", "oops");
        turn.is_error = Some(true);
        let json = serde_json::to_value(&turn).unwrap();
        assert!(json.get("isError").is_none());

        let back: ChatMessage =
            serde_json::from_str(r#"{"role":"assistant","content":"oops","isError":true}"#)
                .unwrap();
        assert_eq!(back.is_error, Some(true));
    }

    #[test]
    fn test_normalize_ensures_trailing_user_turn() {
        let messages = vec![msg("user", "a"), msg("assistant", "b")];
        let result = normalize_conversation(&messages, "a");
        assert_eq!(result.last().unwrap().role, "user");
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_normalize_empty_input_yields_last_message() {
        let result = normalize_conversation(&[], "help me");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].content, "help me");
    }

    // ─── Greeting detection ──────────────────────────────

    #[test]
    fn test_greeting_matches() {
        assert!(greeting_re().is_match("Hello!"));
        assert!(greeting_re().is_match("hey there"));
        assert!(greeting_re().is_match("Good morning"));
        assert!(!greeting_re().is_match("my server is on fire"));
    }

    #[test]
    fn test_small_talk_includes_thanks_and_goodbye() {
        assert!(small_talk_re().is_match("thanks a lot"));
        assert!(small_talk_re().is_match("OK"));
        assert!(small_talk_re().is_match("goodbye"));
        assert!(!small_talk_re().is_match("database is slow"));
    }

    // ─── Error message selection ─────────────────────────

    #[test]
    fn test_apology_for_api_key_problems() {
        let err = anyhow::anyhow!("Anthropic API returned 403: invalid API key");
        let message = apologetic_error_message(&err);
        assert!(message.contains("AI brain is not connected"));
        assert!(message.contains("Error details"));
    }

    #[test]
    fn test_apology_for_rate_limits() {
        let err = anyhow::anyhow!("Anthropic API returned 429: rate limit exceeded");
        let message = apologetic_error_message(&err);
        assert!(message.contains("overwhelmed"));
    }

    #[test]
    fn test_apology_generic() {
        let err = anyhow::anyhow!("connection reset by peer");
        let message = apologetic_error_message(&err);
        assert!(message.starts_with("Sorry, I encountered an error"));
    }

    // ─── Feedback structuring ────────────────────────────

    #[test]
    fn test_extract_json_block() {
        let reply = "Here you go:\n{\"title\": \"T\"}\nHope that helps!";
        assert_eq!(extract_json_block(reply), Some("{\"title\": \"T\"}"));
    }

    #[test]
    fn test_extract_json_block_none_without_braces() {
        assert!(extract_json_block("no json here").is_none());
    }

    #[test]
    fn test_feedback_defaults_shape() {
        let defaults = feedback_defaults("disk full on /var", "rotated logs");
        let validated = defaults.validate().unwrap();
        assert_eq!(validated.category.to_string(), "Other");
        assert_eq!(validated.root_cause, "To be determined");
        assert_eq!(validated.severity.to_string(), "Medium");
        assert!(validated.tags.contains(&"auto-generated".to_string()));
        assert_eq!(validated.created_by, "Problem Solver");
    }

    #[test]
    fn test_feedback_defaults_truncate_title() {
        let long = "x".repeat(300);
        let defaults = feedback_defaults(&long, "fix");
        assert_eq!(defaults.title.chars().count(), 100);
    }

    #[test]
    fn test_merge_draft_overrides_selected_fields() {
        let defaults = feedback_defaults("problem text", "solution text");
        let draft = StructuredDraft {
            title: Some("Disk exhaustion on log volume".into()),
            category: Some("Server".into()),
            root_cause: Some("unbounded log growth".into()),
            ..StructuredDraft::default()
        };
        let merged = merge_draft(defaults, draft);
        assert_eq!(merged.title, "Disk exhaustion on log volume");
        assert_eq!(merged.category, "Server");
        assert_eq!(merged.root_cause, "unbounded log growth");
        // Untouched fields keep the defaults
        assert_eq!(merged.symptoms, "problem text");
        assert_eq!(merged.status.as_deref(), Some("Resolved"));
        assert_eq!(merged.created_by.as_deref(), Some("Problem Solver"));
    }

    #[test]
    fn test_merge_draft_ignores_empty_strings() {
        let defaults = feedback_defaults("problem text", "solution text");
        let draft = StructuredDraft {
            title: Some("  ".into()),
            ..StructuredDraft::default()
        };
        let merged = merge_draft(defaults, draft);
        assert_eq!(merged.title, "problem text");
    }

    #[test]
    fn test_unparseable_merge_falls_back_to_defaults_on_validation() {
        // A draft with an out-of-enum category fails validation; the
        // feedback flow then persists the plain defaults.
        let defaults = feedback_defaults("problem text", "solution text");
        let draft = StructuredDraft {
            category: Some("Mainframe".into()),
            ..StructuredDraft::default()
        };
        assert!(merge_draft(defaults, draft).validate().is_err());
    }

    // ─── Prompt builders ─────────────────────────────────

    #[test]
    fn test_ranking_prompt_numbers_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::RecordStore::open(dir.path().join("db.json")).unwrap();
        let a = store.create(
            RecordInput {
                title: "A".into(),
                category: "Server".into(),
                symptoms: "s".into(),
                root_cause: "c".into(),
                solution: "f".into(),
                ..RecordInput::default()
            }
            .validate()
            .unwrap(),
        );
        let prompt = build_ranking_prompt("my problem", None, Some("Server"), &[a]);
        assert!(prompt.contains("RCA #1:"));
        assert!(prompt.contains("MATCH ASSESSMENT"));
        assert!(prompt.contains("\"my problem\""));
        assert!(prompt.contains("Prevention: Not specified"));
    }

    #[test]
    fn test_best_match_summary_mentions_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::RecordStore::open(dir.path().join("db.json")).unwrap();
        let best = store.create(
            RecordInput {
                title: "Redis failover".into(),
                category: "Database".into(),
                symptoms: "sessions lost".into(),
                root_cause: "quorum".into(),
                solution: "fix sentinel".into(),
                ..RecordInput::default()
            }
            .validate()
            .unwrap(),
        );
        let summary = best_match_summary(&best, 4);
        assert!(summary.contains("4 potentially related"));
        assert!(summary.contains("Redis failover"));
    }
}
