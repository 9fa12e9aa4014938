//! CORS configuration driven by `cors_origins`.

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use crate::config::ServerConfig;

/// Build the CORS layer from configuration. A `*` origin (development only;
/// config validation rejects it in production) opens the API to any origin.
pub fn create_cors_layer(server: &ServerConfig) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if server.cors_origins.iter().any(|o| o == "*") {
        debug!("CORS: allowing any origin");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    debug!(?origins, "CORS: restricting to configured origins");
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
}
