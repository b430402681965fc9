//! HTTP front end
//!
//! Serves the live stream, the small control API used by the player page
//! and the page itself from the public directory.

pub mod handlers;
pub mod messages;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::pipeline::Radio;

pub use messages::{Message, MessageLog};

/// Shared state of the handlers
pub struct AppState {
    pub radio: Radio,
    pub messages: Mutex<MessageLog>,
}

/// HTTP server for one station
pub struct RadioServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl RadioServer {
    pub fn new(config: ServerConfig, radio: Radio) -> Self {
        Self {
            config,
            state: Arc::new(AppState {
                radio,
                messages: Mutex::new(MessageLog::new()),
            }),
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
            .allow_headers(Any);

        Router::new()
            .route("/stream", get(handlers::stream))
            .route("/info", get(handlers::get_info))
            .route("/next", post(handlers::next_track))
            .route("/voice", post(handlers::trigger_voice))
            .route("/messages", get(handlers::get_messages))
            .route("/tracks", get(handlers::get_tracks))
            .fallback_service(ServeDir::new(&self.config.public_dir))
            .layer(cors)
            .with_state(self.state.clone())
    }

    fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.bind_address, self.config.http_port)
            .parse()
            .map_err(|e| {
                Error::Config(format!(
                    "invalid bind address {}: {}",
                    self.config.bind_address, e
                ))
            })
    }

    /// Serve until the listener fails
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `signal` resolves
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.addr()?;
        let router = self.router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server running on http://{}", addr);
        tracing::info!("Serving static files from {}", self.config.public_dir.display());

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;
        Ok(())
    }

    /// Start the server in a background task
    pub fn start_background(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let result = self.serve().await;
            if let Err(e) = &result {
                tracing::error!("Server error: {}", e);
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::library::{StaticLibrary, Track};
    use crate::process::ScriptedLauncher;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn server() -> RadioServer {
        let (launcher, _log) = ScriptedLauncher::new();
        let library = StaticLibrary::new(vec![Track::new("/music/first.mp3")]);
        let radio = Radio::start(&AppConfig::default(), Arc::new(launcher), Arc::new(library));
        RadioServer::new(ServerConfig::default(), radio)
    }

    async fn json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_stream_headers() {
        let server = server();
        let response = server
            .router()
            .oneshot(Request::get("/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-store");
        assert_eq!(headers[header::EXPIRES], "Mon, 26 Jul 1997 05:00:00 GMT");
        assert_eq!(server.state.radio.listeners(), 1);

        drop(response);
        assert_eq!(server.state.radio.listeners(), 0);
    }

    #[tokio::test]
    async fn test_info_reports_listeners() {
        let server = server();
        let _listener = server.state.radio.subscribe();

        let response = server
            .router()
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let info = json(response).await;
        assert_eq!(info["listeners"], 1);
        assert!(info.get("currentTrack").is_some());
        assert_eq!(info["voiceActive"], false);
    }

    #[tokio::test]
    async fn test_empty_voice_message_rejected() {
        let server = server();
        let response = server
            .router()
            .oneshot(
                Request::post("/voice")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"message":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(server.state.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_voice_logged_as_message() {
        let server = server();
        let response = server
            .router()
            .oneshot(
                Request::post("/voice")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"message":"hello"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = server
            .router()
            .oneshot(Request::get("/messages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json(response).await;
        let messages = body["data"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["content"], "hello");
        assert_eq!(messages[1]["host"], "Ollie");
    }

    #[tokio::test]
    async fn test_tracks_listed() {
        let server = server();
        let response = server
            .router()
            .oneshot(Request::get("/tracks").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = json(response).await;
        assert_eq!(body["data"][0]["name"], "first.mp3");
    }

    #[tokio::test]
    async fn test_next_accepted() {
        let server = server();
        let response = server
            .router()
            .oneshot(Request::post("/next").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_invalid_bind_address() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        let mut server = server();
        server.config.bind_address = "not an address".to_string();
        assert!(matches!(server.addr(), Err(Error::Config(_))));
    }
}
