// HTTP surface for the scoring engine
pub mod matches;

pub use matches::AppState;

use actix_web::web;

/// API version prefix shared by every endpoint
pub const API_PREFIX: &str = "/api/v1";

/// Mount health, rule set and match endpoints under [`API_PREFIX`]
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope(API_PREFIX).configure(matches::configure));
}
