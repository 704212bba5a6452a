//! Backend access checks consulted when listing modules for the admin area.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// Whether members of `group_id` may administer the module `slug`.
    async fn has_admin_access(&self, group_id: u32, slug: &str) -> Result<bool>;
}

/// Grants every group access to every module.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessPolicy for AllowAll {
    async fn has_admin_access(&self, _group_id: u32, _slug: &str) -> Result<bool> {
        Ok(true)
    }
}

/// One admin group that may manage everything, plus explicit per-group grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAccessPolicy {
    #[serde(default)]
    pub admin_group: Option<u32>,
    #[serde(default)]
    pub grants: HashMap<u32, HashSet<String>>,
}

impl GroupAccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admin_group(mut self, group_id: u32) -> Self {
        self.admin_group = Some(group_id);
        self
    }

    pub fn grant(mut self, group_id: u32, slug: impl Into<String>) -> Self {
        self.grants.entry(group_id).or_default().insert(slug.into());
        self
    }

    pub fn allows(&self, group_id: u32, slug: &str) -> bool {
        if self.admin_group == Some(group_id) {
            return true;
        }

        self.grants
            .get(&group_id)
            .is_some_and(|slugs| slugs.contains(slug))
    }
}

#[async_trait]
impl AccessPolicy for GroupAccessPolicy {
    async fn has_admin_access(&self, group_id: u32, slug: &str) -> Result<bool> {
        Ok(self.allows(group_id, slug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_group_policy() {
        let policy = GroupAccessPolicy::new()
            .with_admin_group(1)
            .grant(2, "blog")
            .grant(2, "comments");

        assert!(policy.has_admin_access(1, "users").await.unwrap());
        assert!(policy.has_admin_access(2, "blog").await.unwrap());
        assert!(!policy.has_admin_access(2, "users").await.unwrap());
        assert!(!policy.has_admin_access(3, "blog").await.unwrap());
    }

    #[tokio::test]
    async fn test_allow_all() {
        assert!(AllowAll.has_admin_access(42, "anything").await.unwrap());
    }

    #[test]
    fn test_policy_from_json() {
        let policy: GroupAccessPolicy =
            serde_json::from_str(r#"{"admin_group": 1, "grants": {"2": ["blog"]}}"#).unwrap();
        assert!(policy.allows(2, "blog"));
        assert!(policy.allows(1, "pages"));
    }
}
