use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use agent_match::config::{Settings, SinkKind};
use agent_match::core::{
    FieldComparator, LayeredMatchEvaluator, MatchDecisionService, MatchSink, RuleSetValidator, SemanticTextScorer,
};
use agent_match::routes::{self, matches::AppState};
use agent_match::services::{CachedOracle, HttpSimilarityOracle, LoggingSink, RuleSetStore, WebhookSink};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

fn io_error(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

/// Wire the scorer: HTTP oracle behind a cache when enabled, substring fallback otherwise
fn build_semantic_scorer(settings: &Settings) -> std::io::Result<SemanticTextScorer> {
    let cap = settings.scoring.substring_cap;

    if !settings.oracle.enabled {
        info!("Similarity oracle disabled, free-text fields use the substring heuristic");
        return Ok(SemanticTextScorer::fallback_only(cap));
    }
    if settings.oracle.endpoint.is_empty() {
        warn!("Similarity oracle enabled without an endpoint, using the substring heuristic");
        return Ok(SemanticTextScorer::fallback_only(cap));
    }

    let timeout = Duration::from_millis(settings.oracle.timeout_ms);
    let http = HttpSimilarityOracle::new(settings.oracle.endpoint.clone(), settings.oracle.api_key.clone(), timeout)
        .map_err(|e| io_error(format!("Failed to build oracle client: {}", e)))?;
    let cached = CachedOracle::new(Arc::new(http), settings.oracle.cache_size, settings.oracle.cache_ttl_secs);

    info!(
        "Similarity oracle at {} (timeout {}ms, cache {} entries)",
        settings.oracle.endpoint, settings.oracle.timeout_ms, settings.oracle.cache_size
    );
    Ok(SemanticTextScorer::new(Arc::new(cached), timeout, cap))
}

fn build_sink(settings: &Settings) -> std::io::Result<Arc<dyn MatchSink>> {
    match (settings.sink.kind, &settings.sink.webhook_url) {
        (SinkKind::Webhook, Some(url)) => {
            let sink = WebhookSink::new(url.clone(), Duration::from_secs(settings.sink.timeout_secs))
                .map_err(|e| io_error(format!("Failed to build webhook sink: {}", e)))?;
            info!("Match intents are delivered to {}", url);
            Ok(Arc::new(sink))
        }
        (SinkKind::Webhook, None) => Err(io_error("sink.kind = webhook requires sink.webhook_url".to_string())),
        (SinkKind::Log, _) => {
            info!("Match intents are logged only");
            Ok(Arc::new(LoggingSink))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Load configuration before logging so the configured level applies
    let settings = Settings::load();

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
        settings
            .as_ref()
            .map(|s| s.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    });
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| {
        settings
            .as_ref()
            .map(|s| s.logging.format.clone())
            .unwrap_or_else(|_| "json".to_string())
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }

    info!("Starting agent-match scoring service...");

    let settings = settings.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        io_error(format!("Configuration error: {}", e))
    })?;

    info!("Configuration loaded successfully");

    // Rule sets
    let validator = RuleSetValidator::new(settings.scoring.clone());
    let rules = Arc::new(RuleSetStore::new(validator.clone(), settings.matching.default_rule_set.clone()));

    if let Some(path) = &settings.matching.rules_path {
        rules.load_file(path).await.map_err(|e| {
            error!("Failed to load rule sets from {}: {}", path, e);
            io_error(format!("Rule set error: {}", e))
        })?;
    } else {
        warn!("No matching.rules_path configured; rule sets must be PUT before evaluating");
    }

    // Engine
    let semantic = build_semantic_scorer(&settings)?;
    let oracle_enabled = semantic.has_oracle();
    let evaluator = LayeredMatchEvaluator::new(FieldComparator::new(settings.scoring.clone()), semantic);
    let service = MatchDecisionService::new(evaluator, validator, build_sink(&settings)?);

    let app_state = AppState {
        service,
        rules,
        oracle_enabled,
        batch_concurrency: settings.matching.batch_concurrency,
        max_batch_pairs: settings.matching.max_batch_pairs,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
