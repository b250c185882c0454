use anyhow::{Result, bail};
use clap::Parser;
use googolplex_daemon::{Answer, AnswerKind, ResponderInfo};
use zbus::{Connection, proxy};

#[proxy(
    interface = "org.googolplex.Engine1",
    default_service = "org.googolplex.Engine",
    default_path = "/org/googolplex/Engine1"
)]
trait Engine {
    async fn ask(&self, query: &str) -> zbus::Result<Answer>;
    async fn web_search(&self, query: &str) -> zbus::Result<Answer>;
    async fn responders(&self) -> zbus::Result<Vec<ResponderInfo>>;
    async fn reload(&self) -> zbus::Result<u32>;
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Skip the responders and search the web directly
    #[arg(long)]
    web: bool,

    /// List the loaded responders
    #[arg(long)]
    list: bool,

    /// Reload responders from disk
    #[arg(long)]
    reload: bool,

    /// The query
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let connection = Connection::session().await?;
    let proxy = EngineProxy::new(&connection).await?;

    if args.reload {
        let count = proxy.reload().await?;
        println!("Reloaded {count} responders");
    }

    if args.list {
        let responders = proxy.responders().await?;
        if responders.is_empty() {
            println!("No responders loaded");
        }
        for info in responders {
            println!("- {} [{}] ({})", info.name, info.badge_text, info.identity);
        }
    }

    let query = args.query.join(" ");
    if query.trim().is_empty() {
        if args.list || args.reload {
            return Ok(());
        }
        bail!("no query given");
    }

    let answer = if args.web {
        proxy.web_search(&query).await?
    } else {
        proxy.ask(&query).await?
    };
    print_answer(&answer);

    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{} [{}]", answer.title, answer.badge_text);
    println!("{}", answer.body_markup);
    if !answer.badges.is_empty() {
        println!("{}", answer.badges.join(" · "));
    }
    for item in &answer.items {
        println!("* {}: {}", item.title, item.description);
    }

    if answer.kind == AnswerKind::Search {
        if answer.hits.is_empty() {
            println!("No results found for '{}'", answer.query);
        }
        for hit in &answer.hits {
            println!("{}. {} ({})", hit.position, hit.title, hit.domain);
            println!("   {}", hit.url);
            if !hit.content.is_empty() {
                println!("   {}", hit.content);
            }
        }
        if !answer.engines.is_empty() {
            println!("engines: {}", answer.engines.join(", "));
        }
    }
}
