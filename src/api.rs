use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::assistant::{compose_prompt, respond, Assistant};
use crate::classifier::{ClassifyError, RuleClassifier, RuleUnion};
use crate::engine::compute;
use crate::import::{extract_sheet_id, import_workbook, ImportError};
use crate::storage::Gateway;
use crate::types::{
    CalculatedLevels, DataSource, LogicRule, NeuralRule, RuleBase, RuleDirection, RuleUnit,
    SessionData,
};

/// Shared application state
pub struct AppState {
    pub gateway: Gateway,
    pub assistant: Arc<dyn Assistant>,
    pub classifier: Arc<dyn RuleClassifier>,
    /// Serializes read-modify-write cycles on stored records
    write_lock: Mutex<()>,
}

impl AppState {
    pub fn new(gateway: Gateway, assistant: Arc<dyn Assistant>, classifier: Arc<dyn RuleClassifier>) -> Self {
        Self {
            gateway,
            assistant,
            classifier,
            write_lock: Mutex::new(()),
        }
    }

    /// Levels for the currently stored session and rules
    pub fn current_levels(&self) -> CalculatedLevels {
        compute(&self.gateway.load_session_data(), &self.gateway.load_rules())
    }
}

/// Error body: `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<ClassifyError> for ApiError {
    fn from(e: ClassifyError) -> Self {
        match e {
            ClassifyError::EmptyInput => ApiError::BadRequest(e.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

/// Body for creating a rule; the server assigns the id
#[derive(Debug, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub base: RuleBase,
    pub value: f64,
    #[serde(default)]
    pub unit: RuleUnit,
    #[serde(default)]
    pub direction: RuleDirection,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub ohlc_csv: Option<String>,
    pub zones_csv: Option<String>,
    #[serde(default = "default_import_source")]
    pub source: DataSource,
    pub sheet_url: Option<String>,
}

fn default_import_source() -> DataSource {
    DataSource::Excel
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
}

/// Rule created from free text
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ClassifyResponse {
    Zone { rule: NeuralRule },
    Logic { rule: LogicRule },
}

/// All routes under `/api`
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/levels", get(get_levels))
        .route("/api/session", get(get_session).put(put_session))
        .route("/api/import", post(post_import))
        .route("/api/rules", get(get_rules).put(put_rules).post(create_rule))
        .route("/api/rules/{id}", axum::routing::delete(delete_rule))
        .route("/api/rules/{id}/toggle", post(toggle_rule))
        .route("/api/logic", get(get_logic).put(put_logic))
        .route("/api/instruction", get(get_instruction).put(put_instruction))
        .route("/api/chat", post(chat))
        .route("/api/classify", post(classify))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// GET /api/levels - Levels for the stored session and rules
pub async fn get_levels(State(state): State<Arc<AppState>>) -> Json<CalculatedLevels> {
    Json(state.current_levels())
}

/// GET /api/session
pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionData> {
    Json(state.gateway.load_session_data())
}

/// PUT /api/session - Replace session data, returns the recomputed levels
pub async fn put_session(
    State(state): State<Arc<AppState>>,
    Json(data): Json<SessionData>,
) -> Json<CalculatedLevels> {
    let _guard = state.write_lock.lock().await;
    state.gateway.save_session_data(&data);
    Json(compute(&data, &state.gateway.load_rules()))
}

/// POST /api/import - Apply OHLC / Zones CSV exports to the stored session
pub async fn post_import(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<CalculatedLevels>, ApiError> {
    let _guard = state.write_lock.lock().await;
    let base = state.gateway.load_session_data();

    let mut data = import_workbook(
        req.ohlc_csv.as_deref().map(str::as_bytes),
        req.zones_csv.as_deref().map(str::as_bytes),
        &base,
        req.source,
    )?;

    if let Some(url) = req.sheet_url.as_deref() {
        data.google_sheet_id = extract_sheet_id(url)
            .ok_or_else(|| ApiError::BadRequest(format!("Not a sheet URL: {}", url)))?;
    }

    state.gateway.save_session_data(&data);
    Ok(Json(compute(&data, &state.gateway.load_rules())))
}

/// GET /api/rules
pub async fn get_rules(State(state): State<Arc<AppState>>) -> Json<Vec<NeuralRule>> {
    Json(state.gateway.load_rules())
}

/// PUT /api/rules - Replace the whole rule list
pub async fn put_rules(
    State(state): State<Arc<AppState>>,
    Json(rules): Json<Vec<NeuralRule>>,
) -> Json<Vec<NeuralRule>> {
    let _guard = state.write_lock.lock().await;
    state.gateway.save_rules(&rules);
    Json(rules)
}

/// POST /api/rules - Create an active rule with a fresh id
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<RuleDraft>,
) -> Result<(StatusCode, Json<NeuralRule>), ApiError> {
    if draft.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Rule name is required".to_string()));
    }
    if !draft.value.is_finite() {
        return Err(ApiError::BadRequest("Rule value must be a finite number".to_string()));
    }

    let rule = NeuralRule::new(
        draft.name.trim(),
        draft.base,
        draft.value,
        draft.unit,
        draft.direction,
        draft.color.unwrap_or_else(|| "#000".to_string()),
    );

    let _guard = state.write_lock.lock().await;
    let mut rules = state.gateway.load_rules();
    rules.push(rule.clone());
    state.gateway.save_rules(&rules);

    info!("Created rule {} ({})", rule.name, rule.id);
    Ok((StatusCode::CREATED, Json(rule)))
}

/// POST /api/rules/{id}/toggle - Flip the active flag
pub async fn toggle_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NeuralRule>, ApiError> {
    let _guard = state.write_lock.lock().await;
    let mut rules = state.gateway.load_rules();

    let rule = rules
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| ApiError::NotFound(format!("No rule with id {}", id)))?;
    rule.is_active = !rule.is_active;
    let toggled = rule.clone();

    state.gateway.save_rules(&rules);
    Ok(Json(toggled))
}

/// DELETE /api/rules/{id}
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let _guard = state.write_lock.lock().await;
    let mut rules = state.gateway.load_rules();

    let before = rules.len();
    rules.retain(|r| r.id != id);
    if rules.len() == before {
        return Err(ApiError::NotFound(format!("No rule with id {}", id)));
    }

    state.gateway.save_rules(&rules);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/logic
pub async fn get_logic(State(state): State<Arc<AppState>>) -> Json<Vec<LogicRule>> {
    Json(state.gateway.load_logic_rules())
}

/// PUT /api/logic
pub async fn put_logic(
    State(state): State<Arc<AppState>>,
    Json(rules): Json<Vec<LogicRule>>,
) -> Json<Vec<LogicRule>> {
    let _guard = state.write_lock.lock().await;
    state.gateway.save_logic_rules(&rules);
    Json(rules)
}

/// GET /api/instruction - Raw persona text
pub async fn get_instruction(State(state): State<Arc<AppState>>) -> String {
    state.gateway.load_instruction_text()
}

/// PUT /api/instruction - Raw text body
pub async fn put_instruction(State(state): State<Arc<AppState>>, body: String) -> StatusCode {
    state.gateway.save_instruction_text(&body);
    StatusCode::NO_CONTENT
}

/// POST /api/chat - Ask the assistant with the current levels as context
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message is empty".to_string()));
    }

    let levels = state.current_levels();
    let prompt = compose_prompt(
        &levels,
        &state.gateway.load_instruction_text(),
        &state.gateway.load_logic_rules(),
        &req.message,
    );

    let reply = respond(state.assistant.as_ref(), &prompt).await;
    Ok(Json(ChatResponse { reply }))
}

/// POST /api/classify - Turn free text into a stored rule
pub async fn classify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let rule = state.classifier.classify(&req.text).await.map_err(|e| {
        warn!("Classification failed: {}", e);
        ApiError::from(e)
    })?;

    let _guard = state.write_lock.lock().await;
    let response = match rule {
        RuleUnion::Neural(rule) => {
            let mut rules = state.gateway.load_rules();
            rules.push(rule.clone());
            state.gateway.save_rules(&rules);
            ClassifyResponse::Zone { rule }
        }
        RuleUnion::Logic(rule) => {
            let mut rules = state.gateway.load_logic_rules();
            rules.push(rule.clone());
            state.gateway.save_logic_rules(&rules);
            ClassifyResponse::Logic { rule }
        }
    };

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::OfflineAssistant;
    use crate::classifier::AssistantClassifier;
    use crate::storage::MemoryStore;
    use crate::types::Bias;
    use anyhow::Result;
    use async_trait::async_trait;

    struct Echo(&'static str);

    #[async_trait]
    impl Assistant for Echo {
        async fn generate(&self, _prompt_context: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn state_with(reply: &'static str) -> Arc<AppState> {
        let gateway = Gateway::new(Arc::new(MemoryStore::new()));
        Arc::new(AppState::new(
            gateway,
            Arc::new(Echo(reply)),
            Arc::new(AssistantClassifier::new(Echo(reply))),
        ))
    }

    fn draft(name: &str, value: f64) -> RuleDraft {
        RuleDraft {
            name: name.to_string(),
            base: RuleBase::Pivot1,
            value,
            unit: RuleUnit::Points,
            direction: RuleDirection::Add,
            color: None,
        }
    }

    #[tokio::test]
    async fn test_levels_from_defaults() {
        let state = state_with("");
        let Json(levels) = get_levels(State(state)).await;
        assert_eq!(levels.bias, Bias::Buy);
        assert_eq!(levels.all_zones_sorted.len(), 8);
    }

    #[tokio::test]
    async fn test_rule_lifecycle() {
        let state = state_with("");

        let (status, Json(rule)) = create_rule(State(state.clone()), Json(draft("P1 +100", 100.0)))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(get_levels(State(state.clone())).await.0.neural_zones.len(), 1);

        let Json(toggled) = toggle_rule(State(state.clone()), Path(rule.id.clone())).await.unwrap();
        assert!(!toggled.is_active);
        // Soft-deleted: still stored, no longer in the levels
        assert_eq!(get_rules(State(state.clone())).await.0.len(), 1);
        assert!(get_levels(State(state.clone())).await.0.neural_zones.is_empty());

        let status = delete_rule(State(state.clone()), Path(rule.id.clone())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(get_rules(State(state.clone())).await.0.is_empty());

        assert!(matches!(
            delete_rule(State(state.clone()), Path(rule.id)).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rule_validation() {
        let state = state_with("");
        assert!(matches!(
            create_rule(State(state.clone()), Json(draft("  ", 1.0))).await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            create_rule(State(state), Json(draft("x", f64::INFINITY))).await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_put_session_recomputes() {
        let state = state_with("");
        let mut data = SessionData::default();
        data.session2 = data.session1;

        let Json(levels) = put_session(State(state.clone()), Json(data.clone())).await;
        assert_eq!(levels.bias, Bias::Neutral);
        assert_eq!(get_session(State(state)).await.0, data);
    }

    #[tokio::test]
    async fn test_import_applies_atomically() {
        let state = state_with("");
        let good = ImportRequest {
            ohlc_csv: Some("Session,Open,High,Low,Close\n2,1,110,90,100\n".to_string()),
            zones_csv: Some("Level,Label\n150,Far\n".to_string()),
            source: DataSource::Excel,
            sheet_url: None,
        };
        let Json(levels) = post_import(State(state.clone()), Json(good)).await.unwrap();
        assert_eq!(levels.pivot2, 100.0);
        assert_eq!(levels.neural_zones.len(), 1);

        let bad = ImportRequest {
            ohlc_csv: Some("Session,Open,High,Low,Close\n1,1,oops,1,1\n".to_string()),
            zones_csv: None,
            source: DataSource::Excel,
            sheet_url: None,
        };
        assert!(matches!(post_import(State(state.clone()), Json(bad)).await, Err(ApiError::BadRequest(_))));
        // Stored snapshot untouched by the failed import
        assert_eq!(get_session(State(state)).await.0.session2.high, 110.0);
    }

    #[tokio::test]
    async fn test_import_records_sheet_id() {
        let state = state_with("");
        let req = ImportRequest {
            ohlc_csv: None,
            zones_csv: Some("Level\n1\n".to_string()),
            source: DataSource::GoogleSheet,
            sheet_url: Some("https://docs.google.com/spreadsheets/d/sheet42/edit".to_string()),
        };
        let Json(levels) = post_import(State(state.clone()), Json(req)).await.unwrap();
        // Sheet source does not feed imported zones to the engine
        assert!(levels.neural_zones.is_empty());

        let data = get_session(State(state)).await.0;
        assert_eq!(data.google_sheet_id, "sheet42");
        assert_eq!(data.data_source, DataSource::GoogleSheet);
    }

    #[tokio::test]
    async fn test_chat_falls_back_when_offline() {
        let gateway = Gateway::new(Arc::new(MemoryStore::new()));
        let state = Arc::new(AppState::new(
            gateway,
            Arc::new(OfflineAssistant),
            Arc::new(AssistantClassifier::new(OfflineAssistant)),
        ));

        let Json(resp) = chat(State(state.clone()), Json(ChatRequest { message: "hi".to_string() }))
            .await
            .unwrap();
        assert_eq!(resp.reply, crate::assistant::FAILURE_REPLY);

        assert!(matches!(
            classify(State(state), Json(ClassifyRequest { text: "x".to_string() })).await,
            Err(ApiError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn test_classify_persists_rule() {
        let state = state_with(r#"{"type":"ZONE","zoneData":{"name":"Shelf","value":25,"unit":"points","direction":"subtract"}}"#);

        let Json(resp) = classify(State(state.clone()), Json(ClassifyRequest { text: "25 below p2".to_string() }))
            .await
            .unwrap();
        let ClassifyResponse::Zone { rule } = resp else {
            panic!("expected a zone rule");
        };

        let stored = get_rules(State(state.clone())).await.0;
        assert_eq!(stored, vec![rule]);
        let levels = get_levels(State(state)).await.0;
        assert_eq!(levels.neural_zones[0].level, levels.pivot2 - 25.0);
    }

    #[tokio::test]
    async fn test_instruction_roundtrip() {
        let state = state_with("");
        assert_eq!(put_instruction(State(state.clone()), "calm".to_string()).await, StatusCode::NO_CONTENT);
        assert_eq!(get_instruction(State(state)).await, "calm");
    }

    #[test]
    fn test_classify_response_shape() {
        let json = serde_json::to_value(ClassifyResponse::Logic {
            rule: LogicRule::new("x"),
        })
        .unwrap();
        assert_eq!(json["type"], "LOGIC");
        assert_eq!(json["rule"]["content"], "x");
    }
}
