use googolplex_plugin::{Metadata, ResponderResult, escape_markup};
use serde::{Deserialize, Serialize};
use zbus::zvariant::Type;

use crate::search::SearchOutcome;

const BRAND: &str = "GoogolPlex";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[zvariant(signature = "s")]
pub enum AnswerKind {
    Empty,
    Responder,
    Search,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct AnswerItem {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct AnswerHit {
    pub position: u32,
    pub title: String,
    pub url: String,
    pub content: String,
    pub engine: String,
    pub domain: String,
}

/// What a front end renders for one query, whichever path produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct Answer {
    pub kind: AnswerKind,
    pub query: String,
    pub title: String,
    pub body_markup: String,
    pub badge_text: String,
    pub badge_color: String,
    pub badges: Vec<String>,
    pub items: Vec<AnswerItem>,
    pub hits: Vec<AnswerHit>,
    pub total_results: u64,
    pub engines: Vec<String>,
}

impl Answer {
    fn base(kind: AnswerKind, query: &str, title: String, body_markup: String) -> Self {
        Self {
            kind,
            query: query.to_string(),
            title,
            body_markup,
            badge_text: String::new(),
            badge_color: String::new(),
            badges: Vec::new(),
            items: Vec::new(),
            hits: Vec::new(),
            total_results: 0,
            engines: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        let mut answer = Self::base(
            AnswerKind::Empty,
            "",
            BRAND.to_string(),
            "<p>Ask me something ...</p>".to_string(),
        );
        answer.badge_text = "SMART ASSISTANT".to_string();
        answer.badge_color = "var(--glass-medium)".to_string();
        answer
    }

    pub fn from_responder(query: &str, metadata: &Metadata, result: ResponderResult) -> Self {
        let mut answer = Self::base(AnswerKind::Responder, query, result.title, result.body_markup);
        answer.badge_text = metadata.badge_text.clone();
        answer.badge_color = metadata.badge_color.clone();
        answer.badges = result.badges;
        answer.items = result
            .items
            .into_iter()
            .map(|item| AnswerItem {
                title: item.title,
                description: item.description,
            })
            .collect();
        answer
    }

    /// A responder claimed the query but could not produce an answer.
    pub fn responder_failure(query: &str, responder: &str, error: &str) -> Self {
        let mut answer = Self::base(
            AnswerKind::Error,
            query,
            format!("{responder} could not answer \"{query}\""),
            format!(
                "<div class=\"error-message\"><h4>Responder failed</h4><p>{}</p></div>",
                escape_markup(error)
            ),
        );
        answer.badge_text = "ERROR".to_string();
        answer.badge_color = "var(--glass-stronger)".to_string();
        answer.badges = vec![responder.to_string()];
        answer
    }

    pub fn from_search(outcome: SearchOutcome) -> Self {
        let query = escape_markup(&outcome.query);
        if !outcome.success {
            let error = outcome.error.unwrap_or_default();
            let mut answer = Self::base(
                AnswerKind::Error,
                &outcome.query,
                format!("Search error for \"{}\"", outcome.query),
                format!(
                    "<div class=\"error-message\"><h4>Web search failed</h4><p>{}</p></div>",
                    escape_markup(&error)
                ),
            );
            answer.badge_text = "ERROR".to_string();
            answer.badge_color = "var(--glass-stronger)".to_string();
            return answer;
        }

        let mut answer = Self::base(
            AnswerKind::Search,
            &outcome.query,
            format!("Search results for \"{}\"", outcome.query),
            format!(
                "<p>Found <strong>{} results</strong> for {query}</p>",
                outcome.total_results
            ),
        );
        answer.badge_text = "SEARCH".to_string();
        answer.badge_color = "var(--glass-medium)".to_string();
        answer.total_results = outcome.total_results as u64;
        answer.engines = outcome.engines;
        answer.hits = outcome
            .results
            .into_iter()
            .map(|hit| AnswerHit {
                position: u32::try_from(hit.position).unwrap_or(u32::MAX),
                title: hit.title,
                url: hit.url,
                content: hit.content,
                engine: hit.engine,
                domain: hit.domain,
            })
            .collect();
        answer
    }
}
