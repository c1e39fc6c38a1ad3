use crate::core::MatchDecisionService;
use crate::models::{BatchPreviewRequest, ErrorResponse, EvaluateRequest, HealthResponse, RuleSet, ValidateRulesResponse};
use crate::services::{RuleSetStore, RuleStoreError};
use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use validator::Validate;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: MatchDecisionService,
    pub rules: Arc<RuleSetStore>,
    pub oracle_enabled: bool,
    pub batch_concurrency: usize,
    pub max_batch_pairs: usize,
}

/// Configure all match-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/rules", web::put().to(put_rule_set))
        .route("/rules/validate", web::post().to(validate_rule_set))
        .route("/rules/{id}", web::get().to(get_rule_set))
        .route("/matches/evaluate", web::post().to(evaluate))
        .route("/matches/preview-batch", web::post().to(preview_batch));
}

fn error_response(status: StatusCode, error: &str, message: String) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message,
        status_code: status.as_u16(),
    })
}

fn store_error_response(err: RuleStoreError) -> HttpResponse {
    match err {
        RuleStoreError::NotFound(id) => {
            error_response(StatusCode::NOT_FOUND, "Rule set not found", format!("No active rule set '{}'", id))
        }
        RuleStoreError::Invalid(e) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, "Invalid rule set", e.to_string())
        }
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Rule store error", other.to_string()),
    }
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let rule_sets = state.rules.len().await;
    let status = if rule_sets > 0 { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        oracle_enabled: state.oracle_enabled,
        rule_sets,
        timestamp: chrono::Utc::now(),
    })
}

/// Dry-run validation of a rule set
///
/// POST /api/v1/rules/validate
async fn validate_rule_set(state: web::Data<AppState>, req: web::Json<RuleSet>) -> impl Responder {
    let rule_set = req.into_inner();
    let rule_set_id = rule_set.id.clone();

    let errors = match state.service.validator().validate(rule_set) {
        Ok(_) => vec![],
        Err(e) => e.issues.iter().map(ToString::to_string).collect(),
    };

    HttpResponse::Ok().json(ValidateRulesResponse {
        rule_set_id,
        valid: errors.is_empty(),
        errors,
    })
}

/// Validate and activate a rule set
///
/// PUT /api/v1/rules
async fn put_rule_set(state: web::Data<AppState>, req: web::Json<RuleSet>) -> impl Responder {
    match state.rules.upsert(req.into_inner()).await {
        Ok(validated) => HttpResponse::Ok().json(validated.rule_set()),
        Err(e) => {
            tracing::info!("Rejected rule set update: {}", e);
            store_error_response(e)
        }
    }
}

/// GET /api/v1/rules/{id}
async fn get_rule_set(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.rules.get(&path.into_inner()).await {
        Ok(validated) => HttpResponse::Ok().json(validated.rule_set()),
        Err(e) => store_error_response(e),
    }
}

/// Evaluate a single pro/client pair
///
/// POST /api/v1/matches/evaluate
///
/// Request body:
/// ```json
/// {
///   "pro": {"id": "pro-1", "fields": {"city": "Austin", "state": "TX"}},
///   "client": {"id": "client-1", "fields": {"city": "Austin", "state": "TX"}},
///   "rule_set_id": "default",
///   "mode": "preview",
///   "min_score": 30
/// }
/// ```
async fn evaluate(state: web::Data<AppState>, req: web::Json<EvaluateRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for evaluate request: {:?}", errors);
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors.to_string());
    }

    let req = req.into_inner();
    let rule_set = match state.rules.resolve(req.rule_set_id.as_deref()).await {
        Ok(rule_set) => rule_set,
        Err(e) => return store_error_response(e),
    };

    let decision = state
        .service
        .evaluate_with_threshold(&req.pro, &req.client, &rule_set, req.mode, req.min_score.unwrap_or(0))
        .await;

    HttpResponse::Ok().json(decision)
}

/// Preview every pro against every client
///
/// POST /api/v1/matches/preview-batch
async fn preview_batch(state: web::Data<AppState>, req: web::Json<BatchPreviewRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for preview-batch request: {:?}", errors);
        return error_response(StatusCode::BAD_REQUEST, "Validation failed", errors.to_string());
    }

    let req = req.into_inner();
    let pairs = req.pros.len() * req.clients.len();
    if pairs > state.max_batch_pairs {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Batch too large",
            format!("{} pairs requested, limit is {}", pairs, state.max_batch_pairs),
        );
    }

    let rule_set = match state.rules.resolve(req.rule_set_id.as_deref()).await {
        Ok(rule_set) => rule_set,
        Err(e) => return store_error_response(e),
    };

    let concurrency = req.concurrency.unwrap_or(state.batch_concurrency);
    let batch = state
        .service
        .preview_batch(&req.pros, &req.clients, &rule_set, concurrency, &CancellationToken::new())
        .await;

    HttpResponse::Ok().json(batch)
}
