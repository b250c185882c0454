use std::time::Duration;

use googolplex_plugin::{Metadata, Responder, ResponderResult, Score, escape_markup};
use reqwest::StatusCode;
use serde::Deserialize;

const TRIGGERS: &[&str] = &["wiki", "wikipedia", "wer ist", "was ist", "who is", "what is"];
const LEADS: &[&str] = &["wikipedia ", "wiki ", "wer ist ", "was ist ", "who is ", "what is "];
const USER_AGENT: &str = "googolplex-wiki/0.1";
const TIMEOUT: Duration = Duration::from_secs(6);
const DEFAULT_LANG: &str = "de";

#[derive(Debug, Default, Deserialize)]
struct Summary {
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
    #[serde(default)]
    thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentUrls {
    #[serde(default)]
    desktop: Option<PageUrl>,
}

#[derive(Debug, Default, Deserialize)]
struct PageUrl {
    #[serde(default)]
    page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnail {
    #[serde(default)]
    source: Option<String>,
}

/// Looks up the summary of an encyclopedia article.
struct WikipediaResponder {
    default_lang: String,
}

/// Strips the trigger phrase and trailing punctuation.
fn extract_term(query: &str) -> &str {
    let query = query.trim();
    let lower = query.to_lowercase();
    let term = LEADS
        .iter()
        .find(|lead| lower.starts_with(*lead))
        .and_then(|lead| query.get(lead.len()..))
        .unwrap_or(query);
    term.trim_matches(|c: char| c == ' ' || c == '?' || c == '!')
}

impl WikipediaResponder {
    /// Reads the fallback language from `GOOGOLPLEX_WIKI_LANG`.
    fn new() -> Self {
        Self::with_default_lang(std::env::var("GOOGOLPLEX_WIKI_LANG").ok())
    }

    /// Accepts a bare language code such as `en` or `fr`; anything else
    /// falls back to German.
    fn with_default_lang(lang: Option<String>) -> Self {
        let default_lang = lang
            .map(|lang| lang.trim().to_ascii_lowercase())
            .filter(|lang| (2..=3).contains(&lang.len()) && lang.bytes().all(|b| b.is_ascii_lowercase()))
            .unwrap_or_else(|| DEFAULT_LANG.to_string());
        Self { default_lang }
    }

    fn guess_lang(&self, query: &str) -> &str {
        let lower = format!(" {}", query.to_lowercase());
        if [" wer ist", " was ist", "de:", "dewiki"].iter().any(|hint| lower.contains(hint))
            || lower.chars().any(|c| "äöüß".contains(c))
        {
            return "de";
        }
        if [" who is", " what is", "en:", "enwiki"].iter().any(|hint| lower.contains(hint)) {
            return "en";
        }
        &self.default_lang
    }

    fn fetch(&self, lang: &str, term: &str) -> Result<(Summary, String), String> {
        let slug = urlencoding::encode(&term.replace(' ', "_")).into_owned();
        let url = format!("https://{lang}.wikipedia.org/api/rest_v1/page/summary/{slug}");
        let fallback_page = format!("https://{lang}.wikipedia.org/wiki/{slug}");

        let client = reqwest::blocking::Client::builder()
            .timeout(TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| err.to_string())?;
        let response = client.get(&url).send().map_err(|err| err.to_string())?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err("Not found".to_string());
        }
        let response = response.error_for_status().map_err(|err| err.to_string())?;
        let summary = response.json::<Summary>().map_err(|err| err.to_string())?;
        Ok((summary, fallback_page))
    }
}

fn summary_markup(summary: Summary, fallback_page: String, lang: &str) -> String {
    let extract = summary.extract.unwrap_or_else(|| {
        if lang == "de" {
            "Keine Zusammenfassung gefunden.".to_string()
        } else {
            "No summary available.".to_string()
        }
    });
    let page = summary
        .content_urls
        .and_then(|urls| urls.desktop)
        .and_then(|desktop| desktop.page)
        .unwrap_or(fallback_page);

    let mut markup = format!("<p>{}</p>", escape_markup(&extract));
    if let Some(thumb) = summary.thumbnail.and_then(|thumb| thumb.source) {
        markup = format!(
            "<div class=\"wiki-summary\"><img src=\"{}\"/>{markup}</div>",
            escape_markup(&thumb)
        );
    }
    markup.push_str(&format!(
        "<p><a href=\"{}\" target=\"_blank\">Open on Wikipedia</a></p>",
        escape_markup(&page)
    ));
    markup
}

impl Responder for WikipediaResponder {
    fn describe(&self) -> Metadata {
        Metadata::new("Wikipedia", "WIKI", "rgba(33,150,243,0.28)")
    }

    fn score(&self, query: &str) -> Score {
        Score::Claim(TRIGGERS.iter().any(|trigger| query.contains(trigger)))
    }

    fn render(&self, query: &str) -> ResponderResult {
        let term = extract_term(query);
        let lang = self.guess_lang(query);
        let title = format!("Wikipedia: {term}");

        match self.fetch(lang, term) {
            Ok((summary, fallback_page)) => {
                ResponderResult::new(title, summary_markup(summary, fallback_page, lang))
                    .with_badge(lang.to_uppercase())
            }
            Err(err) => ResponderResult::new(title, format!("<p>Error: {}</p>", escape_markup(&err)))
                .with_badge("Error"),
        }
    }
}

#[allow(improper_ctypes_definitions)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _googolplex_init() -> *mut dyn Responder {
    Box::into_raw(Box::new(WikipediaResponder::new()))
}
