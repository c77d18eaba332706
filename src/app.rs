use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::{AppConfig, StorageBackend};
use crate::state::AppState;
use crate::{auth, content};

fn cors(config: &AppConfig) -> CorsLayer {
    let Some(origin) = config.allowed_origin.as_deref() else {
        return CorsLayer::permissive();
    };
    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        Err(e) => {
            tracing::error!(origin, error = %e, "FRONTEND_BASE_URL is not a valid origin; cross-origin requests disabled");
            CorsLayer::new().allow_methods(Any)
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let config = state.config.clone();

    let mut app = Router::new()
        .nest(
            "/admin",
            Router::new()
                .merge(auth::router())
                .merge(content::router()),
        )
        .route("/health", get(|| async { "ok" }));

    if let StorageBackend::Local = config.storage.backend {
        app = app.nest_service(
            &config.storage.url_prefix,
            ServeDir::new(&config.storage.root),
        );
    }

    app.with_state(state)
        .layer(DefaultBodyLimit::max(config.storage.max_upload_bytes))
        .layer(cors(&config))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
        .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
