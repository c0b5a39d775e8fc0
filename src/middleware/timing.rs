use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::metrics::RequestMeta;
use crate::AppState;

/// Long-lived SSE connections would skew every latency figure.
const UNTRACKED_PATHS: &[&str] = &["/api/performance/stream"];

/// Wraps every request: captures a context before the handler runs and
/// hands the finalized outcome to the collector afterwards.
///
/// Adds two response headers:
///
///   X-Response-Time: handler wall time in milliseconds
///   Server-Timing: same value in the standard Server-Timing format
pub async fn observe_request(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let raw_path = req.uri().path().to_owned();
    if UNTRACKED_PATHS.contains(&raw_path.as_str()) {
        return next.run(req).await;
    }

    let method = req.method().as_str().to_owned();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or(raw_path);
    let client_ip = client_ip(req.headers(), req.extensions().get::<ConnectInfo<SocketAddr>>());
    let user_agent = req
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let ctx = state.metrics.begin_request();
    let mut response = next.run(req).await;
    let status = response.status().as_u16();

    tracing::debug!(status, method = %method, path = %path, "request");

    let recorded = state.metrics.end_request(
        ctx,
        RequestMeta {
            method,
            path,
            status_code: status,
            client_ip,
            user_agent,
        },
    );

    // ── Inject response headers ─────────────────────────────────
    if let Some(ms) = recorded {
        if let Ok(val) = format!("{ms:.2}ms").parse() {
            response.headers_mut().insert("x-response-time", val);
        }
        if let Ok(val) = format!("total;dur={ms:.3}").parse() {
            response.headers_mut().insert("server-timing", val);
        }
    }

    response
}

/// First X-Forwarded-For hop, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000)));
        assert_eq!(
            client_ip(&headers, Some(&peer)).as_deref(),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn falls_back_to_peer_address() {
        let peer = ConnectInfo(SocketAddr::from(([192, 168, 1, 9], 4000)));
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(&peer)).as_deref(),
            Some("192.168.1.9")
        );
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
