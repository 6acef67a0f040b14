//! Embedded development server with live reload support

use std::{path::Path, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tower_http::services::ServeDir;

/// Path of the SSE endpoint pages subscribe to.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Live reload message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadMessage {
    /// Full page reload.
    Reload,
    /// Re-fetch stylesheets without reloading the page.
    CssReload,
}

impl ReloadMessage {
    /// SSE payload understood by [`LIVERELOAD_SCRIPT`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reload => "reload",
            Self::CssReload => "css-reload",
        }
    }
}

/// Server state containing the reload broadcaster.
#[derive(Debug, Clone)]
pub struct ServerState {
    reload_tx: broadcast::Sender<ReloadMessage>,
}

impl ServerState {
    /// Create a new server state.
    #[must_use]
    pub fn new() -> Self {
        let (reload_tx, _) = broadcast::channel(16);
        Self { reload_tx }
    }

    /// Subscribe to reload notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.reload_tx.subscribe()
    }

    /// Send a message to all connected clients. Returns how many received it.
    pub fn notify(&self, message: ReloadMessage) -> usize {
        let receivers = self.reload_tx.send(message).unwrap_or(0);
        tracing::debug!(message = message.as_str(), receivers, "Sent live reload");
        receivers
    }

    /// Ask clients to reload the page.
    pub fn notify_reload(&self) -> usize {
        self.notify(ReloadMessage::Reload)
    }

    /// Ask clients to re-fetch stylesheets only.
    pub fn notify_css_reload(&self) -> usize {
        self.notify(ReloadMessage::CssReload)
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the development server router.
pub fn create_router(output_dir: &Path, state: Arc<ServerState>) -> Router {
    Router::new()
        .route(LIVERELOAD_PATH, get(livereload_handler))
        .fallback_service(ServeDir::new(output_dir))
        .with_state(state)
}

/// Server-Sent Events handler for live reload.
async fn livereload_handler(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let stream = BroadcastStream::new(state.subscribe()).filter_map(|msg| {
        // Lagged receivers just miss a reload.
        msg.ok().map(|msg| Ok(Event::default().data(msg.as_str())))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// Add [`LIVERELOAD_SCRIPT`] to a page, before `</body>` or at the end.
///
/// Returns `None` when the page already carries it.
#[must_use]
pub fn inject_livereload(html: &str) -> Option<String> {
    if html.contains(LIVERELOAD_PATH) {
        return None;
    }

    Some(match html.rfind("</body>") {
        Some(pos) => format!("{}{LIVERELOAD_SCRIPT}{}", &html[..pos], &html[pos..]),
        None => format!("{html}{LIVERELOAD_SCRIPT}"),
    })
}

/// JavaScript snippet to inject for live reload.
pub const LIVERELOAD_SCRIPT: &str = r#"
<script>
(function() {
    const source = new EventSource('/__livereload');
    source.onmessage = function(event) {
        if (event.data === 'reload') {
            window.location.reload();
        } else if (event.data === 'css-reload') {
            document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {
                const href = link.href.split('?')[0];
                link.href = href + '?v=' + Date.now();
            });
        }
    };
    source.onerror = function() {
        console.log('[livereload] Connection lost, retrying...');
    };
})();
</script>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_before_body_close() {
        let html = inject_livereload("<html><body><p>x</p></body></html>").unwrap();
        assert!(html.starts_with("<html><body><p>x</p>\n<script>"));
        assert!(html.ends_with("</script>\n</body></html>"));
    }

    #[test]
    fn test_inject_appends_without_body() {
        let html = inject_livereload("<p>x</p>").unwrap();
        assert!(html.starts_with("<p>x</p>"));
        assert!(html.contains("EventSource('/__livereload')"));
    }

    #[test]
    fn test_inject_is_idempotent() {
        let once = inject_livereload("<body></body>").unwrap();
        assert!(inject_livereload(&once).is_none());
    }

    #[test]
    fn test_notify_reaches_subscribers() {
        let state = ServerState::new();
        assert_eq!(state.notify_reload(), 0);

        let mut rx = state.subscribe();
        assert_eq!(state.notify_css_reload(), 1);
        assert_eq!(rx.try_recv().unwrap(), ReloadMessage::CssReload);
        assert_eq!(ReloadMessage::Reload.as_str(), "reload");
    }
}
