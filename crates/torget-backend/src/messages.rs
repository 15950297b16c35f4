use std::future::Future;

use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use torget_types::api::MessageDraft;
use torget_types::models::Message;

use crate::error::Result;
use crate::rest::Filter;
use crate::BackendClient;

impl BackendClient {
    /// Full ascending history between two participants, in either
    /// direction.
    pub async fn conversation(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        let clauses = format!(
            "and(sender_id.eq.{a},receiver_id.eq.{b}),and(sender_id.eq.{b},receiver_id.eq.{a})"
        );
        let filter = Filter::new().or(&clauses).order("created_at.asc");
        self.select("messages", &filter).await
    }

    /// Every message touching `user`, newest first.
    pub async fn inbox(&self, user: Uuid) -> Result<Vec<Message>> {
        let clauses = format!("sender_id.eq.{user},receiver_id.eq.{user}");
        let filter = Filter::new().or(&clauses).order("created_at.desc");
        self.select("messages", &filter).await
    }

    /// Insert through the server-side procedure that enforces sender
    /// identity. A row-level security rejection is retried exactly once,
    /// after a forced session refresh; any other failure propagates.
    pub async fn send_message(&self, draft: &MessageDraft) -> Result<Message> {
        let args = json!({
            "p_sender": draft.sender_id,
            "p_receiver": draft.receiver_id,
            "p_content": draft.content,
            "p_image_url": draft.image_url,
        });
        send_with_retry(
            || self.rpc("send_message", &args),
            || async {
                debug!("send rejected by row policy, refreshing session");
                self.refresh().await.map(|_| ())
            },
        )
        .await
    }

    /// One-way read transition, false -> true.
    pub async fn mark_read(&self, id: Uuid) -> Result<()> {
        self.update("messages", &Filter::new().eq("id", id), &json!({ "read": true }))
            .await
    }

    /// Delete an own sent message. Row policy stops everything else.
    pub async fn delete_message(&self, id: Uuid) -> Result<()> {
        self.delete("messages", &Filter::new().eq("id", id)).await
    }
}

/// Run `attempt`; on a row-level security rejection run `reauth` and retry
/// `attempt` exactly once. This is the single automatic retry in the whole
/// client.
async fn send_with_retry<T, A, AF, R, RF>(attempt: A, reauth: R) -> Result<T>
where
    A: Fn() -> AF,
    AF: Future<Output = Result<T>>,
    R: FnOnce() -> RF,
    RF: Future<Output = Result<()>>,
{
    match attempt().await {
        Err(err) if err.is_rls_rejection() => {
            reauth().await?;
            attempt().await
        }
        other => other,
    }
}
