use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{BackendError, Result};
use crate::BackendClient;

/// Declarative filter predicates for the row API, rendered as query
/// parameters. Predicates combine with AND; use [`Filter::or`] for a
/// disjunction over sub-clauses.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    params: Vec<(String, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`
    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.params
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    /// Case-insensitive substring match on `column`.
    pub fn ilike(mut self, column: &str, needle: &str) -> Self {
        self.params
            .push((column.to_string(), format!("ilike.*{needle}*")));
        self
    }

    /// Disjunction over raw sub-clauses, e.g.
    /// `sender_id.eq.<a>,receiver_id.eq.<a>`.
    pub fn or(mut self, clauses: &str) -> Self {
        self.params.push(("or".to_string(), format!("({clauses})")));
        self
    }

    /// Result ordering, e.g. `created_at.desc`.
    pub fn order(mut self, spec: &str) -> Self {
        self.params.push(("order".to_string(), spec.to_string()));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.params.push(("limit".to_string(), n.to_string()));
        self
    }

    pub(crate) fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Error body shape the row API uses for rejections.
#[derive(Debug, Default, serde::Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl BackendClient {
    /// Fetch all rows matching `filter`.
    pub async fn select<T: DeserializeOwned>(&self, table: &str, filter: &Filter) -> Result<Vec<T>> {
        let req = self
            .http
            .get(self.endpoint(&format!("rest/v1/{table}")))
            .query(&[("select", "*")])
            .query(filter.params());
        let resp = check(self.authed(req).await?.send().await?).await?;
        Ok(resp.json().await?)
    }

    /// Fetch exactly one row; `what` names the entity for the not-found
    /// error ("profile", "job").
    pub async fn select_single<T: DeserializeOwned>(
        &self,
        table: &str,
        filter: &Filter,
        what: &'static str,
    ) -> Result<T> {
        let req = self
            .http
            .get(self.endpoint(&format!("rest/v1/{table}")))
            .query(&[("select", "*")])
            .query(filter.params())
            .header("Accept", "application/vnd.pgrst.object+json");
        let resp = self.authed(req).await?.send().await?;
        if resp.status() == StatusCode::NOT_ACCEPTABLE || resp.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(what));
        }
        Ok(check(resp).await?.json().await?)
    }

    /// Insert one row and return the stored representation.
    pub async fn insert<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<T> {
        let req = self
            .http
            .post(self.endpoint(&format!("rest/v1/{table}")))
            .header("Prefer", "return=representation")
            .header("Accept", "application/vnd.pgrst.object+json")
            .json(body);
        let resp = check(self.authed(req).await?.send().await?).await?;
        Ok(resp.json().await?)
    }

    /// Update all rows matching `filter`.
    pub async fn update<B: Serialize + ?Sized>(
        &self,
        table: &str,
        filter: &Filter,
        body: &B,
    ) -> Result<()> {
        let req = self
            .http
            .patch(self.endpoint(&format!("rest/v1/{table}")))
            .query(filter.params())
            .json(body);
        check(self.authed(req).await?.send().await?).await?;
        Ok(())
    }

    /// Delete all rows matching `filter`.
    pub async fn delete(&self, table: &str, filter: &Filter) -> Result<()> {
        let req = self
            .http
            .delete(self.endpoint(&format!("rest/v1/{table}")))
            .query(filter.params());
        check(self.authed(req).await?.send().await?).await?;
        Ok(())
    }

    /// Call a server-side procedure and decode its result.
    pub async fn rpc<T: DeserializeOwned>(&self, function: &str, args: &Value) -> Result<T> {
        let req = self
            .http
            .post(self.endpoint(&format!("rest/v1/rpc/{function}")))
            .json(args);
        let resp = check(self.authed(req).await?.send().await?).await?;
        Ok(resp.json().await?)
    }

    /// Attach the anon key and the bearer token (session token when signed
    /// in, anon key otherwise) to an outgoing request.
    async fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let session = self.ensure_session().await?;
        let bearer = session
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.config.anon_key.clone());
        Ok(req
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {bearer}")))
    }
}

/// Map a non-success status to the error taxonomy. Authorization failures
/// keep the backend's error code so callers can recognize the row-level
/// security rejection.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: ErrorBody = resp.json().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(BackendError::Unauthorized { code: body.code });
    }
    Err(BackendError::Protocol(format!(
        "HTTP {status}: {}",
        body.message.unwrap_or_default()
    )))
}
