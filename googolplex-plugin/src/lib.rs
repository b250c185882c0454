use serde::{Deserialize, Serialize};

/// Name of the symbol every responder library exports.
pub const INIT_SYMBOL: &[u8] = b"_googolplex_init";

/// Signature of the exported constructor. The daemon takes ownership of the
/// returned box.
#[allow(improper_ctypes_definitions)]
pub type ResponderInit = unsafe extern "C" fn() -> *mut dyn Responder;

/// Display information about a responder. The daemon passes it through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub badge_text: String,
    pub badge_color: String,
}

impl Metadata {
    pub fn new(
        name: impl Into<String>,
        badge_text: impl Into<String>,
        badge_color: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            badge_text: badge_text.into(),
            badge_color: badge_color.into(),
        }
    }
}

/// A titled entry shown below a responder's main body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    pub title: String,
    pub description: String,
}

/// The answer a responder produces for a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponderResult {
    pub title: String,
    /// Markup rendered verbatim by the front end.
    pub body_markup: String,
    pub badges: Vec<String>,
    pub items: Vec<ResultItem>,
}

impl ResponderResult {
    pub fn new(title: impl Into<String>, body_markup: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body_markup: body_markup.into(),
            ..Self::default()
        }
    }

    pub fn with_badge(mut self, badge: impl Into<String>) -> Self {
        self.badges.push(badge.into());
        self
    }

    pub fn with_item(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.items.push(ResultItem {
            title: title.into(),
            description: description.into(),
        });
        self
    }
}

/// How willing a responder is to answer a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    Confidence(f64),
    Claim(bool),
    Invalid,
}

impl Score {
    /// Folds the score into the number the dispatcher compares.
    pub fn value(self) -> f64 {
        match self {
            Score::Confidence(v) if v.is_finite() => v,
            Score::Confidence(_) => 0.0,
            Score::Claim(true) => 1.0,
            Score::Claim(false) => 0.0,
            Score::Invalid => 0.0,
        }
    }
}

impl From<f64> for Score {
    fn from(value: f64) -> Self {
        Score::Confidence(value)
    }
}

impl From<bool> for Score {
    fn from(value: bool) -> Self {
        Score::Claim(value)
    }
}

impl From<Option<f64>> for Score {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Score::Invalid, Score::Confidence)
    }
}

/// Escapes text for inclusion in `body_markup`.
pub fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

pub trait Responder: Send + Sync {
    /// Returns display metadata. Must not panic.
    fn describe(&self) -> Metadata;

    /// Scores an already normalized (trimmed, lowercased) query.
    fn score(&self, query: &str) -> Score;

    /// Produces the answer for the original query. Failures should be turned
    /// into an error-flavored result, the daemon does not catch them.
    fn render(&self, query: &str) -> ResponderResult;
}
