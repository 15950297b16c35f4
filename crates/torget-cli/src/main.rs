use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use torget_backend::{Backend, BackendClient, BackendConfig, BackendError};
use torget_sync::{ConversationStore, Inbox, ReadMarker, RealtimeBridge};
use torget_types::api::JobFilter;
use torget_types::models::Message;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "torget=info".into()),
        )
        .init();

    // Config
    let url = std::env::var("TORGET_BACKEND_URL").context("TORGET_BACKEND_URL not set")?;
    let anon_key = std::env::var("TORGET_ANON_KEY").context("TORGET_ANON_KEY not set")?;
    let email = std::env::var("TORGET_EMAIL").context("TORGET_EMAIL not set")?;
    let password = std::env::var("TORGET_PASSWORD").context("TORGET_PASSWORD not set")?;

    let client = BackendClient::new(BackendConfig { url, anon_key });
    let session = client.sign_in(&email, &password).await?;
    let user = session.user_id;

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("inbox") => inbox_cmd(&client, user).await,
        Some("chat") => {
            let peer: Uuid = args
                .next()
                .context("usage: torget chat <peer-id>")?
                .parse()
                .context("peer id must be a uuid")?;
            chat_cmd(client, user, peer).await
        }
        Some("jobs") => jobs_cmd(&client, args.next()).await,
        _ => {
            eprintln!("usage: torget <inbox | chat <peer-id> | jobs [search]>");
            Ok(())
        }
    }
}

/// List conversations, newest activity first, with unread counts.
async fn inbox_cmd(client: &BackendClient, user: Uuid) -> anyhow::Result<()> {
    let backend: Arc<dyn Backend> = Arc::new(client.clone());
    let inbox = Inbox::new(backend, user);
    inbox.refresh().await?;

    let threads = inbox.threads().await;
    if threads.is_empty() {
        println!("no conversations yet");
        return Ok(());
    }

    for thread in threads {
        let name = peer_name(client, thread.peer).await;
        let marker = if thread.unread > 0 {
            format!(" [{} unread]", thread.unread)
        } else {
            String::new()
        };
        println!(
            "{}  {}{}\n    {}",
            thread.latest.created_at.format("%Y-%m-%d %H:%M"),
            name,
            marker,
            preview(&thread.latest),
        );
    }
    println!("\ntotal unread: {}", inbox.unread_total().await);
    Ok(())
}

/// Live conversation: print history, tail pushed changes, send lines typed
/// on stdin. Ctrl-D leaves.
async fn chat_cmd(client: BackendClient, user: Uuid, peer: Uuid) -> anyhow::Result<()> {
    let name = peer_name(&client, peer).await;
    let backend: Arc<dyn Backend> = Arc::new(client);
    let read_marker = ReadMarker::new(backend.clone());
    let store = ConversationStore::new(backend, read_marker.clone(), user, peer);

    store.load().await?;
    let history = store.snapshot().await;
    println!("-- {} ({} messages) --", name, history.len());
    for m in &history {
        print_message(m, user);
    }

    let bridge = RealtimeBridge::open(store.clone(), read_marker).await?;
    let mut updates = store.updates();
    let mut rendered = store.len().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match store.send(&line, None).await {
                    Ok(_) => {}
                    Err(BackendError::Validation(reason)) => eprintln!("not sent: {reason}"),
                    Err(err) => eprintln!("send failed: {err}"),
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = store.snapshot().await;
                if snapshot.len() < rendered {
                    // A deletion rewrote history; repaint from scratch.
                    println!("-- conversation updated --");
                    for m in &snapshot {
                        print_message(m, user);
                    }
                } else {
                    for m in &snapshot[rendered..] {
                        print_message(m, user);
                    }
                }
                rendered = snapshot.len();
            }
        }
    }

    bridge.close();
    Ok(())
}

/// List open jobs, optionally filtered by a search term.
async fn jobs_cmd(client: &BackendClient, search: Option<String>) -> anyhow::Result<()> {
    let filter = JobFilter { search, ..Default::default() };
    let jobs = client.jobs(&filter).await?;
    if jobs.is_empty() {
        bail!("no open jobs matched");
    }
    for job in jobs {
        println!(
            "{}  {:<40} {:>8} kr  {}",
            job.created_at.format("%Y-%m-%d"),
            job.title,
            job.price / 100,
            job.location,
        );
    }
    Ok(())
}

async fn peer_name(client: &BackendClient, peer: Uuid) -> String {
    match client.profile(peer).await {
        Ok(profile) => profile.name,
        Err(BackendError::NotFound(_)) => peer.to_string(),
        Err(err) => {
            tracing::warn!("profile lookup failed: {err}");
            peer.to_string()
        }
    }
}

fn print_message(m: &Message, user: Uuid) {
    let direction = if m.sender_id == user { ">" } else { "<" };
    let attachment = if m.image_url.is_some() { " [image]" } else { "" };
    println!(
        "{} {} {}{}",
        m.created_at.format("%H:%M"),
        direction,
        m.content,
        attachment,
    );
}

fn preview(m: &Message) -> String {
    let text = if m.content.is_empty() && m.image_url.is_some() {
        "[image]"
    } else {
        &m.content
    };
    let mut preview: String = text.chars().take(60).collect();
    if text.chars().count() > 60 {
        preview.push('…');
    }
    preview
}
