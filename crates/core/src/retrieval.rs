//! Retrieval match types shared between the RAG crate and the pipeline

use serde::{Deserialize, Serialize};

/// Role value that matches every caller role filter
pub const WILDCARD_ROLE: &str = "all";

/// One candidate knowledge/instruction snippet for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionMatch {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub instruction_type: Option<String>,
    #[serde(default = "default_role_access")]
    pub role_access: String,
    /// Similarity in [0,1]. Fallback matches carry a fixed default score,
    /// never 0 masquerading as a genuine rank.
    pub similarity: f32,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
}

fn default_role_access() -> String {
    WILDCARD_ROLE.to_string()
}

impl InstructionMatch {
    /// Whether this snippet is visible to the given caller role filter.
    /// A `None`/"all" filter is a no-op; a snippet with wildcard role
    /// access matches every filter.
    pub fn matches_role(&self, role_filter: Option<&str>) -> bool {
        match role_filter {
            None => true,
            Some(filter) if filter.eq_ignore_ascii_case(WILDCARD_ROLE) => true,
            Some(filter) => {
                self.role_access.eq_ignore_ascii_case(WILDCARD_ROLE)
                    || self.role_access.eq_ignore_ascii_case(filter)
            }
        }
    }

    /// Whether this snippet passes the given category filter
    pub fn matches_category(&self, category_filter: Option<&str>) -> bool {
        match (category_filter, &self.instruction_type) {
            (None, _) => true,
            (Some(filter), Some(category)) => category.eq_ignore_ascii_case(filter),
            (Some(_), None) => false,
        }
    }
}

/// Caller-supplied retrieval options
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    /// Role visibility for the vector search and post-hoc filter
    pub user_role: Option<String>,
    /// Optional category/type filter applied post-hoc
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(role: &str, category: Option<&str>) -> InstructionMatch {
        InstructionMatch {
            title: "t".into(),
            content: "c".into(),
            instruction_type: category.map(String::from),
            role_access: role.into(),
            similarity: 0.9,
            url: None,
            priority: None,
        }
    }

    #[test]
    fn test_no_role_filter_is_noop() {
        assert!(snippet("manager", None).matches_role(None));
        assert!(snippet("manager", None).matches_role(Some("all")));
    }

    #[test]
    fn test_wildcard_role_matches_every_filter() {
        assert!(snippet("all", None).matches_role(Some("manager")));
        assert!(snippet("all", None).matches_role(Some("operator")));
    }

    #[test]
    fn test_specific_role_must_match() {
        assert!(snippet("manager", None).matches_role(Some("manager")));
        assert!(!snippet("manager", None).matches_role(Some("operator")));
    }

    #[test]
    fn test_category_filter() {
        assert!(snippet("all", Some("sop")).matches_category(Some("sop")));
        assert!(!snippet("all", Some("sop")).matches_category(Some("policy")));
        assert!(!snippet("all", None).matches_category(Some("policy")));
        assert!(snippet("all", None).matches_category(None));
    }
}
