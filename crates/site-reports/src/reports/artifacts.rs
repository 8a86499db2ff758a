//! Contracts for the photo, milestone, and session collaborators.
//!
//! Reports never own artifact content; they only hold ids and look the
//! artifacts up through these providers when building or rendering.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{MilestoneId, PhotoId, ProjectId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    pub project_id: ProjectId,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Completed,
}

impl MilestoneStatus {
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            Self::Pending => "#9E9E9E",
            Self::InProgress => "#F5A623",
            Self::Completed => "#2E7D32",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub project_id: ProjectId,
    pub title: String,
    pub status: MilestoneStatus,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// Failure reported by an upstream artifact store.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PhotoProvider: Send + Sync {
    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<Photo>, ArtifactError>;
    async fn get(&self, id: &PhotoId) -> Result<Option<Photo>, ArtifactError>;
}

#[async_trait]
pub trait MilestoneProvider: Send + Sync {
    async fn list_by_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<Milestone>, ArtifactError>;
    async fn get(&self, id: &MilestoneId) -> Result<Option<Milestone>, ArtifactError>;
}

/// Supplies the user recorded as `generated_by`.
pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

/// Session provider pinned to a single user, used by the CLI and service.
/// A blank user id means nobody is signed in.
#[derive(Debug, Clone)]
pub struct FixedSession(pub UserId);

impl SessionProvider for FixedSession {
    fn current_user(&self) -> Option<UserId> {
        if self.0.as_str().trim().is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}
