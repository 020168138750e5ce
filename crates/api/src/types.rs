use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl User {
    /// Builds the local user record from a signin/signup payload, falling back
    /// to what the user typed when the backend omits fields.
    pub fn from_payload(payload: Option<&AuthUserPayload>, fallback_name: &str, email: &str) -> Self {
        let id = payload
            .and_then(|p| p.id.as_ref())
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "temp-id".to_string());

        let full_name = payload
            .map(|p| {
                format!(
                    "{} {}",
                    p.first_name.as_deref().unwrap_or(""),
                    p.last_name.as_deref().unwrap_or("")
                )
                .trim()
                .to_string()
            })
            .unwrap_or_default();
        let name = if full_name.is_empty() {
            fallback_name.to_string()
        } else {
            full_name
        };

        let email = payload
            .and_then(|p| p.email.clone())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| email.to_string());

        Self { id, name, email }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthUserPayload {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthTokens {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<AuthUserPayload>,
}

#[derive(Debug, Clone)]
pub struct SignupForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub company: String,
}

/// The backend has no separate username field in the UI; it is derived from
/// the email's local part.
pub fn username_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

impl SignupForm {
    pub fn username(&self) -> String {
        username_from_email(&self.email)
    }

    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("username", self.username()),
            ("first_name", self.first_name.clone()),
            ("last_name", self.last_name.clone()),
            ("email", self.email.clone()),
            ("password1", self.password.clone()),
            ("password2", self.password.clone()),
            ("company_name", self.company.clone()),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    #[serde(default)]
    pub authorization_url: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionReport {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    #[serde(default)]
    pub connected_accounts: u32,
    #[serde(default)]
    pub active_campaigns: u32,
    #[serde(default)]
    pub monthly_spend: f64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRequest {
    pub sync_type: &'static str,
    pub weeks_back: u32,
}

impl SyncRequest {
    pub fn weekly(weeks_back: u32) -> Self {
        Self {
            sync_type: "google_ads_api",
            weeks_back,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub response: Option<ChatResponse>,
    #[serde(default)]
    pub intent: Option<ChatIntent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatIntent {
    pub action: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default)]
    pub requires_auth: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Rag,
    Direct,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagMetadata {
    #[serde(default)]
    pub context_used: bool,
    #[serde(default)]
    pub context_sources: Option<Vec<String>>,
    #[serde(default)]
    pub selection_reason: String,
}

/// Either the plain chat response or its RAG-enhanced form; both carry blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default, deserialize_with = "lenient_blocks")]
    pub blocks: Vec<ChatBlock>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub response_type: Option<ResponseType>,
    #[serde(default)]
    pub rag_metadata: Option<RagMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    #[serde(default)]
    pub response: ChatResponse,
    #[serde(default)]
    pub intent: Option<ChatIntent>,
    #[serde(default)]
    pub rag_enhanced_response: Option<ChatResponse>,
}

impl ChatReply {
    /// The RAG-enhanced response wins when the backend sent one.
    pub fn effective_response(&self) -> &ChatResponse {
        self.rag_enhanced_response
            .as_ref()
            .filter(|r| !r.blocks.is_empty())
            .unwrap_or(&self.response)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatActionItem {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStyle {
    Dotted,
    Numbered,
    #[default]
    Bulleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Pie,
    #[default]
    Bar,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub label: String,
    #[serde(default)]
    pub data: Vec<f64>,
    #[serde(default, rename = "backgroundColor")]
    pub background_color: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBlock {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub account: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Decodes each block on its own; a block that does not match its kind's
/// shape becomes `Unknown` instead of failing the whole reply.
fn lenient_blocks<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ChatBlock>, D::Error> {
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|value| {
            serde_json::from_value(value).unwrap_or_else(|e| {
                debug!("Skipping malformed chat block: {e}");
                ChatBlock::Unknown
            })
        })
        .collect())
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatBlock {
    Text {
        #[serde(default)]
        content: String,
        #[serde(default)]
        style: Option<String>,
    },
    Table {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default)]
        rows: Vec<Vec<Value>>,
        #[serde(default)]
        sortable: bool,
    },
    List {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        items: Vec<String>,
        #[serde(default, alias = "listStyle")]
        style: ListStyle,
    },
    Actions {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        items: Vec<ChatActionItem>,
    },
    Chart {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        chart_type: ChartType,
        #[serde(default)]
        labels: Vec<String>,
        #[serde(default)]
        datasets: Vec<Dataset>,
        #[serde(default)]
        options: Option<Value>,
    },
    Metric {
        #[serde(default)]
        title: Option<String>,
        #[serde(default, deserialize_with = "string_or_number")]
        value: String,
        #[serde(default)]
        change: Option<String>,
        #[serde(default)]
        trend: Trend,
    },
    Image {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        content: String,
    },
    DigDeeper {
        #[serde(default, deserialize_with = "null_as_default")]
        title: String,
        #[serde(default, deserialize_with = "null_as_default")]
        description: String,
        action_id: String,
        #[serde(default)]
        current_depth: u32,
        #[serde(default)]
        max_depth: u32,
    },
    BudgetOptimizations(AnalysisBlock),
    CampaignConsistencyAnalysis(AnalysisBlock),
    SitelinkAnalysis(AnalysisBlock),
    LandingPageAnalysis(AnalysisBlock),
    DuplicateKeywordAnalysis(AnalysisBlock),
    KeywordTrendsAnalysis(AnalysisBlock),
    AuctionInsightsAnalysis(AnalysisBlock),
    SearchTermAnalysis(AnalysisBlock),
    AdsShowingTimeAnalysis(AnalysisBlock),
    DevicePerformanceDetailedAnalysis(AnalysisBlock),
    LocationPerformanceAnalysis(AnalysisBlock),
    LandingPageMobileAnalysis(AnalysisBlock),
    TcpaOptimizations(AnalysisBlock),
    BudgetAllocationOptimizations(AnalysisBlock),
    NegativeKeywordSuggestions(AnalysisBlock),
    #[serde(alias = "rag_enhanced")]
    RagEnhancedResponse {
        #[serde(default)]
        response_type: Option<ResponseType>,
        #[serde(default, deserialize_with = "lenient_blocks")]
        blocks: Vec<ChatBlock>,
        #[serde(default)]
        rag_metadata: Option<RagMetadata>,
    },
    #[serde(other)]
    Unknown,
}

impl ChatBlock {
    /// Heading used when an analysis block arrives without its own title.
    pub fn analysis_heading(&self) -> Option<&'static str> {
        let heading = match self {
            ChatBlock::BudgetOptimizations(_) => "Budget Optimization Recommendations",
            ChatBlock::CampaignConsistencyAnalysis(_) => "Campaign Consistency Analysis",
            ChatBlock::SitelinkAnalysis(_) => "Sitelink Analysis",
            ChatBlock::LandingPageAnalysis(_) => "Landing Page Analysis",
            ChatBlock::DuplicateKeywordAnalysis(_) => "Duplicate Keyword Analysis",
            ChatBlock::KeywordTrendsAnalysis(_) => "Keyword Trends Analysis",
            ChatBlock::AuctionInsightsAnalysis(_) => "Auction Insights Analysis",
            ChatBlock::SearchTermAnalysis(_) => "Search Term Analysis",
            ChatBlock::AdsShowingTimeAnalysis(_) => "Ads Showing Time Analysis",
            ChatBlock::DevicePerformanceDetailedAnalysis(_) => "Device Performance Analysis",
            ChatBlock::LocationPerformanceAnalysis(_) => "Location Performance Analysis",
            ChatBlock::LandingPageMobileAnalysis(_) => "Landing Page Mobile Analysis",
            ChatBlock::TcpaOptimizations(_) => "Target CPA Optimizations",
            ChatBlock::BudgetAllocationOptimizations(_) => "Budget Allocation Optimizations",
            ChatBlock::NegativeKeywordSuggestions(_) => "Negative Keyword Suggestions",
            ChatBlock::Text { .. }
            | ChatBlock::Table { .. }
            | ChatBlock::List { .. }
            | ChatBlock::Actions { .. }
            | ChatBlock::Chart { .. }
            | ChatBlock::Metric { .. }
            | ChatBlock::Image { .. }
            | ChatBlock::DigDeeper { .. }
            | ChatBlock::RagEnhancedResponse { .. }
            | ChatBlock::Unknown => return None,
        };
        Some(heading)
    }

    pub fn analysis(&self) -> Option<&AnalysisBlock> {
        match self {
            ChatBlock::BudgetOptimizations(a)
            | ChatBlock::CampaignConsistencyAnalysis(a)
            | ChatBlock::SitelinkAnalysis(a)
            | ChatBlock::LandingPageAnalysis(a)
            | ChatBlock::DuplicateKeywordAnalysis(a)
            | ChatBlock::KeywordTrendsAnalysis(a)
            | ChatBlock::AuctionInsightsAnalysis(a)
            | ChatBlock::SearchTermAnalysis(a)
            | ChatBlock::AdsShowingTimeAnalysis(a)
            | ChatBlock::DevicePerformanceDetailedAnalysis(a)
            | ChatBlock::LocationPerformanceAnalysis(a)
            | ChatBlock::LandingPageMobileAnalysis(a)
            | ChatBlock::TcpaOptimizations(a)
            | ChatBlock::BudgetAllocationOptimizations(a)
            | ChatBlock::NegativeKeywordSuggestions(a) => Some(a),
            _ => None,
        }
    }
}

/// Unwraps the backend's `{success, message?, errors?}` envelope and decodes
/// the remaining body as `T`.
pub fn unwrap_envelope<T: DeserializeOwned>(data: Value, fallback: &str) -> ApiResult<T> {
    if !envelope_ok(&data) {
        return Err(ApiError::Backend(envelope_error(&data, fallback)));
    }
    serde_json::from_value(data).map_err(|e| ApiError::Malformed(format!("{fallback}: {e}")))
}

pub fn envelope_ok(data: &Value) -> bool {
    data.get("success").and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Field errors take precedence over the generic message, joined in key order.
pub fn envelope_error(data: &Value, fallback: &str) -> String {
    if let Some(errors) = data.get("errors").and_then(|e| e.as_object()) {
        let mut keys: Vec<&String> = errors.keys().collect();
        keys.sort();
        let messages: Vec<String> = keys
            .into_iter()
            .flat_map(|k| match &errors[k] {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|i| i.as_str().map(String::from))
                    .collect::<Vec<_>>(),
                Value::String(s) => vec![s.clone()],
                _ => Vec::new(),
            })
            .collect();
        if !messages.is_empty() {
            return messages.join(", ");
        }
    }
    data.get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(String::from)
        .unwrap_or_else(|| fallback.to_string())
}
