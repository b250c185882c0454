use std::net::UdpSocket;

use googolplex_plugin::{Metadata, Responder, ResponderResult, Score, escape_markup};

const TRIGGER_WORDS: &[&str] = &[
    "iphone", "ios", "setup", "siri", "shortcut", "shortcuts", "install", "configure", "plex",
];
const DEFAULT_PORT: u16 = 8000;
const SHORTCUT_URL: &str = "https://www.icloud.com/shortcuts/dd6415bd2c9a46eaa22706966ef2f131";

/// Explains how to hook a phone up to this server.
struct SetupResponder {
    port: u16,
}

impl SetupResponder {
    fn new() -> Self {
        let port = std::env::var("GOOGOLPLEX_PUBLIC_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Self { port }
    }

    fn server_url(&self) -> String {
        format!("http://{}:{}", local_ip(), self.port)
    }
}

/// Address of the interface that routes to the internet. No packet is sent.
fn local_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

fn claims(query: &str) -> bool {
    let query = query.to_lowercase();
    TRIGGER_WORDS.iter().any(|word| query.contains(word))
}

impl Responder for SetupResponder {
    fn describe(&self) -> Metadata {
        Metadata::new("iPhone Setup", "iOS SETUP", "rgba(0, 122, 255, 0.8)")
    }

    fn score(&self, query: &str) -> Score {
        Score::Claim(claims(query))
    }

    fn render(&self, _query: &str) -> ResponderResult {
        let url = escape_markup(&self.server_url());
        let search_url = format!("{url}/search?q=");
        let body = format!(
            "<h2>iPhone Setup</h2>\
             <p>Connect your iPhone to GoogolPlex.</p>\
             <h3>Voice control</h3>\
             <p><a href=\"{SHORTCUT_URL}\">Install the Plex shortcut</a>, then say \"Hey Siri, Plex\".</p>\
             <h3>Safari search engine</h3>\
             <p>Use <code>{search_url}%s</code> as a custom search URL.</p>\
             <p>Server: <code>{url}</code></p>"
        );

        ResponderResult::new("iPhone Setup", body)
            .with_badge("iOS SETUP")
            .with_item("1. Install shortcut", "Open the shortcut link on your iPhone and add it")
            .with_item("2. Allow network access", format!("The shortcut talks to {url}"))
            .with_item("3. Ask", "Say \"Hey Siri, Plex\" followed by your question")
    }
}

#[allow(improper_ctypes_definitions)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _googolplex_init() -> *mut dyn Responder {
    Box::into_raw(Box::new(SetupResponder::new()))
}
