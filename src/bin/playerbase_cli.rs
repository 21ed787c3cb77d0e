use anyhow::{bail, Context, Result};
use playerbase::config::DatabaseConfig;
use playerbase::database::{Dispatcher, Priority};
use playerbase::Database;
use uuid::Uuid;

const USAGE: &str = "Usage: playerbase_cli [--conf FILE] <command>
Commands:
  status                   connectivity, directory size, latest news
  lookup <name>            resolve a player name to uuid
  seen <uuid>              first/last seen for a player
  news [text]              show latest news, or publish <text> as system news
  priority <id> <level>    set report priority (low|normal|high|urgent)";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file = "conf/database.yaml".to_string();
    let mut command: Vec<String> = Vec::new();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("{}", USAGE);
                return Ok(());
            }
            "--conf" => {
                if i + 1 < args.len() {
                    i += 1;
                    conf_file = args[i].clone();
                } else {
                    bail!("--conf requires a FILE argument");
                }
            }
            other => command.push(other.to_string()),
        }
        i += 1;
    }

    if command.is_empty() {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = DatabaseConfig::from_file(&conf_file)
        .with_context(|| format!("Cannot load config: {}", conf_file))?;

    let db = Database::open(&config, Dispatcher::current()).await;
    if !db.is_enabled() {
        bail!("database layer is disabled (host={}:{} db={})", config.host, config.port, config.database);
    }

    match command[0].as_str() {
        "status" => {
            println!("players known: {}", db.directory().len());
            match db.latest_news() {
                Some(n) => println!("latest news #{} ({}): {}", n.id, n.created_at, n.content),
                None => println!("latest news: none"),
            }
        }
        "lookup" => {
            let name = command.get(1).context("lookup requires a name")?;
            match db.directory().uuid_of(name) {
                Some(uuid) => {
                    let chat = db.directory().chat_account_of(uuid).unwrap_or(0);
                    println!("{} -> {} (chat account {})", name, uuid, chat);
                }
                None => println!("{} not found", name),
            }
        }
        "seen" => {
            let raw = command.get(1).context("seen requires a uuid")?;
            let uuid = Uuid::parse_str(raw).with_context(|| format!("bad uuid: {}", raw))?;
            match db.players().fetch(uuid).await? {
                Some(p) => println!("{}: first seen {}, last seen {}", p.name, p.first_seen, p.last_seen),
                None => println!("{} has never joined", uuid),
            }
        }
        "news" => {
            if command.len() > 1 {
                let text = command[1..].join(" ");
                db.news().publish(None, &text).await?;
                println!("published");
            } else {
                match db.news().latest().await? {
                    Some(n) => println!("#{} ({}): {}", n.id, n.created_at, n.content),
                    None => println!("no news"),
                }
            }
        }
        "priority" => {
            let id: i64 = command
                .get(1)
                .context("priority requires a report id")?
                .parse()
                .context("report id must be a number")?;
            let level: Priority = command.get(2).context("priority requires a level")?.parse()?;
            db.reports().touch(id, level).await?;
            println!("report {} set to {}", id, level);
        }
        other => bail!("unknown command: {}\n{}", other, USAGE),
    }

    Ok(())
}
