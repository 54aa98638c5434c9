use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Registered claims every family shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredClaims {
    pub issuer: String,
    pub subject: Option<String>,
    pub audience: Vec<String>,
    pub expiry: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
}

/// GitHub Actions OIDC claims. Every field is optional; new ones the runtime
/// adds later are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubClaims {
    pub repository: Option<String>,
    pub repository_id: Option<String>,
    pub repository_owner: Option<String>,
    pub repository_owner_id: Option<String>,
    pub repository_visibility: Option<String>,
    pub actor: Option<String>,
    pub actor_id: Option<String>,
    pub workflow: Option<String>,
    pub workflow_ref: Option<String>,
    pub workflow_sha: Option<String>,
    pub job_workflow_ref: Option<String>,
    pub job_workflow_sha: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub ref_type: Option<String>,
    pub ref_protected: Option<String>,
    pub sha: Option<String>,
    pub environment: Option<String>,
    pub event_name: Option<String>,
    pub head_ref: Option<String>,
    pub base_ref: Option<String>,
    pub run_id: Option<String>,
    pub run_number: Option<String>,
    pub run_attempt: Option<String>,
    pub runner_environment: Option<String>,
}

/// Details AWS attaches under the `https://sts.amazonaws.com/` claim of
/// outbound web identity tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwsIdentityContext {
    pub aws_account: Option<String>,
    pub source_region: Option<String>,
    pub org_id: Option<String>,
    pub ou_path: Option<Vec<String>>,
    pub principal_id: Option<String>,
    pub principal_tags: Option<Map<String, Value>>,
    pub request_tags: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwsClaims {
    #[serde(rename = "https://sts.amazonaws.com/")]
    pub identity: Option<AwsIdentityContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "family", content = "claims", rename_all = "snake_case")]
pub enum CustomClaims {
    Github(GitHubClaims),
    Aws(AwsClaims),
    /// Every non-registered claim, verbatim.
    Oidc(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claims {
    pub registered: RegisteredClaims,
    pub custom: CustomClaims,
}

impl Claims {
    pub fn issuer(&self) -> &str {
        &self.registered.issuer
    }

    pub fn subject(&self) -> Option<&str> {
        self.registered.subject.as_deref()
    }

    pub fn github(&self) -> Option<&GitHubClaims> {
        match &self.custom {
            CustomClaims::Github(claims) => Some(claims),
            _ => None,
        }
    }

    pub fn aws(&self) -> Option<&AwsClaims> {
        match &self.custom {
            CustomClaims::Aws(claims) => Some(claims),
            _ => None,
        }
    }
}

pub const REGISTERED_CLAIM_NAMES: [&str; 7] = ["iss", "sub", "aud", "exp", "nbf", "iat", "jti"];

/// `aud` may be a single string or an array of strings.
pub fn audience_set(value: Option<&Value>) -> Result<Vec<String>, String> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(aud)) => Ok(vec![aud.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| "aud array holds a non-string".to_owned())
            })
            .collect(),
        Some(_) => Err("aud is neither a string nor an array".to_owned()),
    }
}
