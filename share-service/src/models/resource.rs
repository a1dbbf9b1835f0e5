//! Resource scope and access-level codes.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What kind of resource a grant covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[default]
    Project,
    File,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Project => "project",
            ResourceType::File => "file",
        }
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(ResourceType::Project),
            "file" => Ok(ResourceType::File),
            other => Err(format!("unknown resource type: {other}")),
        }
    }
}

/// Access level of a shared resource. `TokenRequired` resources gate every
/// visit through the token/device/OTP pipeline; `Open` resources are viewable
/// by anyone holding the link path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    Open,
    TokenRequired,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Open => "open",
            AccessLevel::TokenRequired => "token_required",
        }
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AccessLevel::Open),
            "token_required" => Ok(AccessLevel::TokenRequired),
            other => Err(format!("unknown access level: {other}")),
        }
    }
}

/// The (type, id) pair an invitation covers within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceScope {
    pub resource_type: ResourceType,
    pub resource_id: String,
}

impl ResourceScope {
    /// Project-wide scope: the resource id defaults to the project id.
    pub fn project(project_id: &str) -> Self {
        Self {
            resource_type: ResourceType::Project,
            resource_id: project_id.to_string(),
        }
    }

    /// Whether a grant with this scope covers the requested resource.
    /// A project-scope grant covers the project and everything in it;
    /// a file-scope grant covers only that file.
    pub fn covers(&self, requested: &ResourceScope) -> bool {
        match self.resource_type {
            ResourceType::Project => true,
            ResourceType::File => {
                requested.resource_type == ResourceType::File
                    && requested.resource_id == self.resource_id
            }
        }
    }
}
