//! Like widget: binds like controls, sends toggle requests and patches the
//! page with the answer.
//!
//! The hosting application calls [`LikeWidget::init`] with the controls found
//! on the page and forwards clicks to [`LikeWidget::click`]. Requests are
//! best effort: one per click, no retry, and the last response to arrive
//! decides what the page shows.

pub mod dom;
pub mod transport;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
    entities::like::LikeResponse,
    utils::cookies::{CSRF_COOKIE, cookie_value},
};

pub const LIKE_CONTROL_CLASS: &str = "like-button";
pub const POST_ID_ATTRIBUTE: &str = "data-post-id";
pub const LIKED_GLYPH: &str = "\u{2665}";
pub const NOT_LIKED_GLYPH: &str = "\u{2661}";

/// Id of the element showing the like count of a post.
pub fn count_element_id(post_id: &str) -> String {
    format!("likes-count-{}", post_id)
}

/// Id given to the like control of a post.
pub fn control_element_id(post_id: &str) -> String {
    format!("like-button-{}", post_id)
}

pub fn toggle_path(post_id: &str) -> String {
    format!("/posts/{}/like/", post_id)
}

pub fn glyph(liked: bool) -> &'static str {
    if liked { LIKED_GLYPH } else { NOT_LIKED_GLYPH }
}

/// A clickable like control as found on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeControl {
    pub element_id: String,
    /// Value of the `data-post-id` attribute.
    pub post_id: String,
}

/// The page the widget patches.
pub trait Document: Send + Sync {
    /// Raw `Cookie` string visible to scripts.
    fn cookie(&self) -> String;

    /// Replaces the text of an element; false when no element has that id.
    fn set_text(&self, element_id: &str, text: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleRequest {
    /// Path of the toggle endpoint for the post.
    pub path: String,
    pub csrf_token: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WidgetError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("unreadable response: {0}")]
    Parse(String),
}

/// Sends one toggle request and reads the JSON answer, whatever its status.
pub trait Transport: Send + Sync {
    fn toggle(
        &self,
        request: ToggleRequest,
    ) -> impl Future<Output = Result<LikeResponse, WidgetError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The element has no handler bound.
    Unbound,
    Updated {
        total_likes: i64,
        liked: bool,
        /// False when the page has no count element for the post.
        count_shown: bool,
    },
    /// The server answered with an `error` field.
    Rejected(String),
    /// Transport or parse failure.
    Failed(WidgetError),
}

#[derive(Debug)]
struct Binding {
    handler_id: u64,
    post_id: String,
}

pub struct LikeWidget<D, T> {
    document: Arc<D>,
    transport: Arc<T>,
    bindings: Mutex<HashMap<String, Binding>>,
    next_handler: AtomicU64,
}

impl<D: Document, T: Transport> LikeWidget<D, T> {
    pub fn new(document: Arc<D>, transport: Arc<T>) -> Self {
        Self {
            document,
            transport,
            bindings: Mutex::new(HashMap::new()),
            next_handler: AtomicU64::new(1),
        }
    }

    /// Binds one handler per control, dropping whatever was bound to it
    /// before, so running it again after a partial page update is harmless.
    pub fn init(&self, controls: impl IntoIterator<Item = LikeControl>) -> usize {
        let mut bindings = self.lock();
        let mut bound = 0;
        for control in controls {
            bindings.remove(&control.element_id);
            let handler_id = self.next_handler.fetch_add(1, Ordering::Relaxed);
            bindings.insert(
                control.element_id,
                Binding {
                    handler_id,
                    post_id: control.post_id,
                },
            );
            bound += 1;
        }
        debug!("Like widget bound {} controls", bound);
        bound
    }

    pub fn bound_controls(&self) -> usize {
        self.lock().len()
    }

    /// Handler currently bound to an element, if any.
    pub fn handler_of(&self, element_id: &str) -> Option<u64> {
        self.lock().get(element_id).map(|b| b.handler_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Binding>> {
        self.bindings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs the click handler of `element_id`.
    ///
    /// Errors never reach the caller as panics or `Err`: server errors are
    /// logged as warnings, transport problems as errors, and the page is left
    /// untouched in both cases.
    pub async fn click(&self, element_id: &str) -> ClickOutcome {
        let Some(post_id) = self.lock().get(element_id).map(|b| b.post_id.clone()) else {
            return ClickOutcome::Unbound;
        };

        let request = ToggleRequest {
            path: toggle_path(&post_id),
            csrf_token: cookie_value(&self.document.cookie(), CSRF_COOKIE),
        };

        let response = match self.transport.toggle(request).await {
            Ok(response) => response,
            Err(err) => {
                error!("Like request for post {} failed: {}", post_id, err);
                return ClickOutcome::Failed(err);
            }
        };

        if let Some(message) = response.error {
            warn!("Like for post {} rejected: {}", post_id, message);
            return ClickOutcome::Rejected(message);
        }

        let (Some(total_likes), Some(liked)) = (response.total_likes, response.liked) else {
            let err = WidgetError::Parse("missing total_likes or liked".to_string());
            error!("Like response for post {} unusable: {}", post_id, err);
            return ClickOutcome::Failed(err);
        };

        let count_shown = self
            .document
            .set_text(&count_element_id(&post_id), &total_likes.to_string());
        self.document.set_text(element_id, glyph(liked));

        ClickOutcome::Updated {
            total_likes,
            liked,
            count_shown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::dom::MemoryDocument;
    use super::*;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::time::Duration;
    use tracing_subscriber::fmt::MakeWriter;

    /// Answers requests from a script, optionally after a delay.
    #[derive(Default)]
    struct ScriptedTransport {
        answers: Mutex<VecDeque<(Duration, Result<LikeResponse, WidgetError>)>>,
        sent: Mutex<Vec<ToggleRequest>>,
    }

    impl ScriptedTransport {
        fn answer(self, delay_ms: u64, answer: Result<LikeResponse, WidgetError>) -> Self {
            self.answers
                .lock()
                .unwrap()
                .push_back((Duration::from_millis(delay_ms), answer));
            self
        }

        fn sent(&self) -> Vec<ToggleRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        async fn toggle(&self, request: ToggleRequest) -> Result<LikeResponse, WidgetError> {
            self.sent.lock().unwrap().push(request);
            let next = self.answers.lock().unwrap().pop_front();
            let (delay, answer) = next.unwrap_or((
                Duration::ZERO,
                Err(WidgetError::Transport("no scripted answer".into())),
            ));
            tokio::time::sleep(delay).await;
            answer
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (buffer, guard)
    }

    fn page() -> Arc<MemoryDocument> {
        let doc = MemoryDocument::new("sessionid=s; csrftoken=tok123");
        doc.insert(&control_element_id("42"), NOT_LIKED_GLYPH);
        doc.insert(&count_element_id("42"), "4");
        doc.insert(&control_element_id("7"), NOT_LIKED_GLYPH);
        doc.insert(&count_element_id("7"), "0");
        doc.insert("title", "Hello");
        Arc::new(doc)
    }

    fn controls() -> Vec<LikeControl> {
        ["42", "7"]
            .into_iter()
            .map(|id| LikeControl {
                element_id: control_element_id(id),
                post_id: id.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn one_click_sends_one_request_for_that_post() {
        let transport = Arc::new(
            ScriptedTransport::default().answer(0, Ok(LikeResponse::toggled(5, true))),
        );
        let widget = LikeWidget::new(page(), transport.clone());
        widget.init(controls());

        widget.click(&control_element_id("42")).await;

        assert_eq!(
            transport.sent(),
            vec![ToggleRequest {
                path: "/posts/42/like/".to_string(),
                csrf_token: "tok123".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn repeated_init_keeps_one_handler_per_control() {
        let transport = Arc::new(
            ScriptedTransport::default().answer(0, Ok(LikeResponse::toggled(5, true))),
        );
        let widget = LikeWidget::new(page(), transport.clone());

        assert_eq!(widget.init(controls()), 2);
        let first = widget.handler_of(&control_element_id("42"));
        assert_eq!(widget.init(controls()), 2);

        assert_eq!(widget.bound_controls(), 2);
        assert_ne!(widget.handler_of(&control_element_id("42")), first);

        widget.click(&control_element_id("42")).await;
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn success_updates_count_and_glyph() {
        let doc = page();
        let transport = Arc::new(
            ScriptedTransport::default().answer(0, Ok(LikeResponse::toggled(5, true))),
        );
        let widget = LikeWidget::new(doc.clone(), transport);
        widget.init(controls());

        let outcome = widget.click(&control_element_id("42")).await;

        assert_eq!(
            outcome,
            ClickOutcome::Updated {
                total_likes: 5,
                liked: true,
                count_shown: true
            }
        );
        assert_eq!(doc.text(&count_element_id("42")).as_deref(), Some("5"));
        assert_eq!(doc.text(&control_element_id("42")).as_deref(), Some(LIKED_GLYPH));
        assert_eq!(doc.text(&count_element_id("7")).as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn unlike_switches_back_to_empty_glyph() {
        let doc = page();
        doc.insert(&control_element_id("42"), LIKED_GLYPH);
        let transport = Arc::new(
            ScriptedTransport::default().answer(0, Ok(LikeResponse::toggled(3, false))),
        );
        let widget = LikeWidget::new(doc.clone(), transport);
        widget.init(controls());

        widget.click(&control_element_id("42")).await;

        assert_eq!(doc.text(&control_element_id("42")).as_deref(), Some(NOT_LIKED_GLYPH));
        assert_eq!(doc.text(&count_element_id("42")).as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn server_error_is_logged_and_page_untouched() {
        let (logs, _guard) = capture_logs();
        let doc = page();
        let before = doc.snapshot();
        let transport = Arc::new(
            ScriptedTransport::default().answer(0, Ok(LikeResponse::error("not authenticated"))),
        );
        let widget = LikeWidget::new(doc.clone(), transport);
        widget.init(controls());

        let outcome = widget.click(&control_element_id("42")).await;

        assert_eq!(outcome, ClickOutcome::Rejected("not authenticated".to_string()));
        assert_eq!(doc.snapshot(), before);
        assert!(logs.contents().contains("not authenticated"));
    }

    #[tokio::test]
    async fn missing_count_element_is_skipped_quietly() {
        let doc = Arc::new(MemoryDocument::new("csrftoken=t"));
        doc.insert(&control_element_id("42"), NOT_LIKED_GLYPH);
        doc.insert("other", "untouched");
        let transport = Arc::new(
            ScriptedTransport::default().answer(0, Ok(LikeResponse::toggled(5, true))),
        );
        let widget = LikeWidget::new(doc.clone(), transport);
        widget.init(controls());

        let outcome = widget.click(&control_element_id("42")).await;

        assert_eq!(
            outcome,
            ClickOutcome::Updated {
                total_likes: 5,
                liked: true,
                count_shown: false
            }
        );
        assert_eq!(doc.text("other").as_deref(), Some("untouched"));
        assert_eq!(doc.text(&count_element_id("42")), None);
    }

    #[tokio::test]
    async fn transport_failure_is_logged_and_page_untouched() {
        let (logs, _guard) = capture_logs();
        let doc = page();
        let before = doc.snapshot();
        let transport = Arc::new(ScriptedTransport::default().answer(
            0,
            Err(WidgetError::Transport("network unreachable".into())),
        ));
        let widget = LikeWidget::new(doc.clone(), transport.clone());
        widget.init(controls());

        let outcome = widget.click(&control_element_id("42")).await;

        assert!(matches!(outcome, ClickOutcome::Failed(WidgetError::Transport(_))));
        assert_eq!(doc.snapshot(), before);
        assert!(logs.contents().contains("network unreachable"));
        // no retry
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn missing_csrf_cookie_sends_empty_token() {
        let doc = Arc::new(MemoryDocument::new("sessionid=s"));
        let transport = Arc::new(
            ScriptedTransport::default().answer(0, Ok(LikeResponse::toggled(1, true))),
        );
        let widget = LikeWidget::new(doc, transport.clone());
        widget.init(controls());

        widget.click(&control_element_id("7")).await;
        assert_eq!(transport.sent()[0].csrf_token, "");
    }

    #[tokio::test]
    async fn unbound_elements_send_nothing() {
        let transport = Arc::new(ScriptedTransport::default());
        let widget = LikeWidget::new(page(), transport.clone());

        assert_eq!(widget.click("title").await, ClickOutcome::Unbound);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn last_response_to_arrive_wins() {
        let doc = page();
        let transport = Arc::new(
            ScriptedTransport::default()
                .answer(50, Ok(LikeResponse::toggled(5, true)))
                .answer(10, Ok(LikeResponse::toggled(4, false))),
        );
        let widget = LikeWidget::new(doc.clone(), transport.clone());
        widget.init(controls());

        let id = control_element_id("42");
        tokio::join!(widget.click(&id), widget.click(&id));

        assert_eq!(transport.sent().len(), 2);
        assert_eq!(doc.text(&count_element_id("42")).as_deref(), Some("5"));
        assert_eq!(doc.text(&id).as_deref(), Some(LIKED_GLYPH));
    }
}
