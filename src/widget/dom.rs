use std::collections::BTreeMap;
use std::sync::{LazyLock, RwLock};

use regex::Regex;

use super::{Document, LIKE_CONTROL_CLASS, LikeControl, POST_ID_ATTRIBUTE};

static ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([a-zA-Z][a-zA-Z0-9]*)(\s[^>]*)?>([^<]*)").expect("static regex")
});
static ATTRIBUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)="([^"]*)""#).expect("static regex"));

/// Text of every element carrying an `id`, with the like controls found in
/// the markup. Enough of a page to drive the widget outside a browser.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    cookie: String,
    elements: RwLock<BTreeMap<String, String>>,
    controls: Vec<LikeControl>,
}

impl MemoryDocument {
    pub fn new(cookie: &str) -> Self {
        Self {
            cookie: cookie.to_string(),
            ..Self::default()
        }
    }

    /// Reads elements with an `id` and their leading text from markup.
    pub fn from_html(cookie: &str, html: &str) -> Self {
        let mut elements = BTreeMap::new();
        let mut controls = Vec::new();

        for caps in ELEMENT_RE.captures_iter(html) {
            let attrs: BTreeMap<&str, &str> = caps
                .get(2)
                .map(|m| {
                    ATTRIBUTE_RE
                        .captures_iter(m.as_str())
                        .filter_map(|a| Some((a.get(1)?.as_str(), a.get(2)?.as_str())))
                        .collect()
                })
                .unwrap_or_default();

            let Some(id) = attrs.get("id") else {
                continue;
            };
            let text = caps.get(3).map(|m| m.as_str().trim()).unwrap_or_default();
            elements.insert(id.to_string(), text.to_string());

            let is_control = attrs
                .get("class")
                .is_some_and(|c| c.split_whitespace().any(|c| c == LIKE_CONTROL_CLASS));
            if let (true, Some(post_id)) = (is_control, attrs.get(POST_ID_ATTRIBUTE)) {
                controls.push(LikeControl {
                    element_id: id.to_string(),
                    post_id: post_id.to_string(),
                });
            }
        }

        Self {
            cookie: cookie.to_string(),
            elements: RwLock::new(elements),
            controls,
        }
    }

    /// Like controls present when the markup was read, in document order.
    pub fn like_controls(&self) -> Vec<LikeControl> {
        self.controls.clone()
    }

    pub fn insert(&self, element_id: &str, text: &str) {
        self.write()
            .insert(element_id.to_string(), text.to_string());
    }

    pub fn text(&self, element_id: &str) -> Option<String> {
        self.read().get(element_id).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.elements.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.elements.write().unwrap_or_else(|p| p.into_inner())
    }
}

impl Document for MemoryDocument {
    fn cookie(&self) -> String {
        self.cookie.clone()
    }

    fn set_text(&self, element_id: &str, text: &str) -> bool {
        match self.write().get_mut(element_id) {
            Some(slot) => {
                *slot = text.to_string();
                true
            }
            None => false,
        }
    }
}
