use std::collections::HashMap;

use uuid::Uuid;

use torget_types::models::Message;

/// Count of unread messages `peer` has sent to `user`.
///
/// Pure function over the message set; recomputed on every state change,
/// which is fine at per-session message volumes.
pub fn unread_count_for(messages: &[Message], user: Uuid, peer: Uuid) -> usize {
    messages
        .iter()
        .filter(|m| m.receiver_id == user && !m.read && m.sender_id == peer)
        .count()
}

/// Total unread messages addressed to `user`, across all peers.
pub fn unread_total(messages: &[Message], user: Uuid) -> usize {
    messages
        .iter()
        .filter(|m| m.receiver_id == user && !m.read)
        .count()
}

/// One inbox row: the latest message exchanged with a peer plus the
/// number of unread messages from them.
#[derive(Debug, Clone)]
pub struct Thread {
    pub peer: Uuid,
    pub latest: Message,
    pub unread: usize,
}

/// Group `user`'s messages by conversation peer and order the result by
/// latest activity, newest first. Messages not involving `user` are
/// skipped.
pub fn threads(messages: &[Message], user: Uuid) -> Vec<Thread> {
    let mut latest: HashMap<Uuid, &Message> = HashMap::new();
    for m in messages {
        let Some(peer) = m.peer_of(user) else { continue };
        match latest.get(&peer) {
            Some(current) if current.created_at >= m.created_at => {}
            _ => {
                latest.insert(peer, m);
            }
        }
    }

    let mut threads: Vec<Thread> = latest
        .into_iter()
        .map(|(peer, m)| Thread {
            peer,
            latest: m.clone(),
            unread: unread_count_for(messages, user, peer),
        })
        .collect();
    threads.sort_by(|a, b| b.latest.created_at.cmp(&a.latest.created_at));
    threads
}
