use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded,
    Deleted,
    Expired,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Deleted => "deleted",
            UploadStatus::Expired => "expired",
        }
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(UploadStatus::Uploaded),
            "deleted" => Ok(UploadStatus::Deleted),
            "expired" => Ok(UploadStatus::Expired),
            _ => Err(anyhow::anyhow!("Invalid upload status: {}", s)),
        }
    }
}

/// A submitted media file. The binary payload is stored with the record but read separately.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: Uuid,
    pub filename: String,
    pub size: i64,
    pub mime: String,
    pub status: UploadStatus,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Upload {
    pub fn funding(&self) -> UploadFunding {
        UploadFunding::from_metadata(&self.metadata)
    }
}

#[derive(Debug, Clone)]
pub struct NewUpload {
    pub filename: String,
    pub size: i64,
    pub mime: String,
    pub metadata: serde_json::Value,
}

/// How an upload was paid for, as recorded in its metadata at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFunding {
    Tokens { user_id: Uuid },
    Demo { user_id: Uuid },
    Unfunded,
}

impl UploadFunding {
    pub fn to_metadata(&self) -> serde_json::Value {
        match self {
            UploadFunding::Tokens { user_id } => {
                serde_json::json!({ "userId": user_id, "funding": "tokens" })
            }
            UploadFunding::Demo { user_id } => {
                serde_json::json!({ "userId": user_id, "funding": "demo" })
            }
            UploadFunding::Unfunded => serde_json::json!({}),
        }
    }

    pub fn from_metadata(metadata: &serde_json::Value) -> Self {
        let user_id = metadata
            .get("userId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        match (metadata.get("funding").and_then(|v| v.as_str()), user_id) {
            (Some("tokens"), Some(user_id)) => UploadFunding::Tokens { user_id },
            (Some("demo"), Some(user_id)) => UploadFunding::Demo { user_id },
            _ => UploadFunding::Unfunded,
        }
    }

    /// Whether this upload was prepaid by `user_id`.
    pub fn is_prepaid_by(&self, user_id: Uuid) -> bool {
        match self {
            UploadFunding::Tokens { user_id: owner } | UploadFunding::Demo { user_id: owner } => {
                *owner == user_id
            }
            UploadFunding::Unfunded => false,
        }
    }
}
