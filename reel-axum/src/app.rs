use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use reel_blob::MediaAdapter;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::stream::stream_router;
use crate::upload::upload_router;
use crate::MediaState;

const REQUEST_ID: &str = "x-request-id";

/// Router with the media routes mounted, plus the state behind it.
#[derive(Clone)]
pub struct AxumApp {
    pub state: MediaState,
    pub router: Router<()>,
}

impl AxumApp {
    /// Routes open to any origin.
    pub fn new(state: MediaState) -> Self {
        Self::with_origins(state, &[])
    }

    /// Routes answering CORS requests from `origins` only. An empty list or
    /// a `*` entry allows any origin.
    pub fn with_origins(state: MediaState, origins: &[String]) -> Self {
        let router = Router::new()
            .nest("/stream", stream_router())
            .nest("/upload", upload_router())
            .route("/health", get(|| async { "ok" }))
            .with_state(state.clone());

        Self {
            state,
            router: with_layers(router, cors_layer(origins)),
        }
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening");
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

/// Browser players on other origins need the range headers exposed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([
            CONTENT_RANGE,
            ACCEPT_RANGES,
            CONTENT_LENGTH,
            HeaderName::from_static(REQUEST_ID),
        ]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

fn with_layers(router: Router<()>, cors: CorsLayer) -> Router<()> {
    let request_id = HeaderName::from_static(REQUEST_ID);
    router
        .layer(cors)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

/// Build the app for `media` with default policies and limits.
pub fn axum(media: MediaAdapter) -> AxumApp {
    AxumApp::new(MediaState::new(media))
}
