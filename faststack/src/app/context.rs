//! Publishing the current request in the container context.

use crate::ioc::{APP_CONTAINER_KEY, REQUEST_CONTEXT_KEY};
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Request, State};
use axum::http::header::{AsHeaderName, CONNECTION, UPGRADE, USER_AGENT};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Uri, Version};
use axum::middleware::Next;
use axum::response::Response;
use faststack_di::container::ContainerPtr;
use faststack_di::context::ContainerContext;
use std::future::Future;
use tracing::debug;

/// Kind of the connection which started the current request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    Http,
    WebSocket,
}

/// Snapshot of the current request head, available to dependencies through the request context.
#[derive(Clone, Debug)]
pub struct HttpConnection {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    kind: ConnectionKind,
}

impl HttpConnection {
    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(&parts.method, &parts.uri, parts.version, &parts.headers)
    }

    fn from_request(request: &Request) -> Self {
        Self::new(
            request.method(),
            request.uri(),
            request.version(),
            request.headers(),
        )
    }

    fn new(method: &Method, uri: &Uri, version: Version, headers: &HeaderMap) -> Self {
        Self {
            method: method.clone(),
            uri: uri.clone(),
            version,
            headers: headers.clone(),
            kind: if is_websocket_upgrade(headers) {
                ConnectionKind::WebSocket
            } else {
                ConnectionKind::Http
            },
        }
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Returns a header value, if present and valid ASCII.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header(USER_AGENT)
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let has_token = |name, token: &str| {
        headers.get_all(name).iter().any(|value| {
            value.to_str().is_ok_and(|value| {
                value
                    .split(',')
                    .any(|part| part.trim().eq_ignore_ascii_case(token))
            })
        })
    };

    has_token(UPGRADE, "websocket") && has_token(CONNECTION, "upgrade")
}

/// Middleware running the rest of the request inside a new container context, with the current
/// [HttpConnection] published under [REQUEST_CONTEXT_KEY] and the application container under
/// [APP_CONTAINER_KEY]. Meant for [from_fn_with_state](axum::middleware::from_fn_with_state).
pub async fn publish_request_context(
    State(container): State<ContainerPtr>,
    request: Request,
    next: Next,
) -> Response {
    let connection = HttpConnection::from_request(&request);

    debug!(
        method = %connection.method(),
        uri = %connection.uri(),
        kind = ?connection.kind(),
        "Publishing request context."
    );

    ContainerContext::new()
        .with_item(REQUEST_CONTEXT_KEY, connection)
        .with_item(APP_CONTAINER_KEY, container)
        .scope(next.run(request))
        .await
}

/// Finishes a WebSocket upgrade, running the socket callback inside the current request context.
/// Context resources of the request stay alive until the callback completes.
pub fn upgrade_in_context<F, Fut>(upgrade: WebSocketUpgrade, callback: F) -> Response
where
    F: FnOnce(WebSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let context = ContainerContext::capture();
    upgrade.on_upgrade(move |socket| context.scope(callback(socket)))
}

#[cfg(test)]
mod tests {
    use crate::app::context::{ConnectionKind, HttpConnection};
    use axum::http::Request;

    fn connection(request: Request<()>) -> HttpConnection {
        let (parts, _) = request.into_parts();
        HttpConnection::from_parts(&parts)
    }

    #[test]
    fn should_detect_plain_requests() {
        let connection = connection(
            Request::get("/items?page=2")
                .header("user-agent", "test-agent")
                .body(())
                .unwrap(),
        );

        assert_eq!(connection.kind(), ConnectionKind::Http);
        assert_eq!(connection.user_agent(), Some("test-agent"));
        assert_eq!(connection.uri().query(), Some("page=2"));
    }

    #[test]
    fn should_detect_websocket_upgrades() {
        let connection = connection(
            Request::get("/ws")
                .header("connection", "keep-alive, Upgrade")
                .header("upgrade", "WebSocket")
                .body(())
                .unwrap(),
        );

        assert_eq!(connection.kind(), ConnectionKind::WebSocket);
        assert_eq!(connection.user_agent(), None);
    }
}
