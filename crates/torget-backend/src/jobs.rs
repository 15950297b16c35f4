use serde_json::json;
use uuid::Uuid;

use torget_types::api::{JobDraft, JobFilter, JobPatch, ProfilePatch};
use torget_types::models::{Job, Profile};

use crate::error::Result;
use crate::rest::Filter;
use crate::BackendClient;

/// Jobs the user is on either side of.
#[derive(Debug, Clone)]
pub struct MyJobs {
    pub posted: Vec<Job>,
    pub assigned: Vec<Job>,
}

impl BackendClient {
    /// Open listings, optionally narrowed by category, free-text search
    /// over title and description, and location. Newest first.
    pub async fn jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let mut f = Filter::new().eq("status", "open");
        if let Some(category) = filter.category.as_deref() {
            if category != "all" {
                f = f.eq("category", category);
            }
        }
        if let Some(search) = filter.search.as_deref() {
            f = f.or(&format!(
                "title.ilike.*{search}*,description.ilike.*{search}*"
            ));
        }
        if let Some(location) = filter.location.as_deref() {
            f = f.ilike("location", location);
        }
        self.select("jobs", &f.order("created_at.desc")).await
    }

    pub async fn job(&self, id: Uuid) -> Result<Job> {
        self.select_single("jobs", &Filter::new().eq("id", id), "job")
            .await
    }

    /// Listings the user posted and listings assigned to them, both
    /// newest first.
    pub async fn my_jobs(&self, user: Uuid) -> Result<MyJobs> {
        let posted = self
            .select(
                "jobs",
                &Filter::new().eq("created_by", user).order("created_at.desc"),
            )
            .await?;
        let assigned = self
            .select(
                "jobs",
                &Filter::new().eq("assigned_to", user).order("created_at.desc"),
            )
            .await?;
        Ok(MyJobs { posted, assigned })
    }

    /// Create a listing. New listings always start out open.
    pub async fn create_job(&self, draft: &JobDraft) -> Result<Job> {
        let mut body = serde_json::to_value(draft)
            .map_err(|e| crate::BackendError::Protocol(e.to_string()))?;
        body["status"] = json!("open");
        self.insert("jobs", &body).await
    }

    /// Partial update: status transition and/or assignment.
    pub async fn update_job(&self, id: Uuid, patch: &JobPatch) -> Result<()> {
        self.update("jobs", &Filter::new().eq("id", id), patch).await
    }

    // -- Profiles --

    pub async fn profile(&self, id: Uuid) -> Result<Profile> {
        self.select_single("profiles", &Filter::new().eq("id", id), "profile")
            .await
    }

    pub async fn update_profile(&self, id: Uuid, patch: &ProfilePatch) -> Result<()> {
        self.update("profiles", &Filter::new().eq("id", id), patch)
            .await
    }
}
