//! Canonical tree names.
//!
//! Submitters label the same repository with different tree names. The trees
//! file maps repository URLs to the name the dashboard uses:
//!
//! ```yaml
//! trees:
//!   mainline:
//!     url: "https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git"
//! ```

use crate::error::{ConfigError, SubmissionError};
use crate::submission::{ObjectKind, Submission};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

pub const DEFAULT_TREES_FILE: &str = "/app/trees.yml";

#[derive(Debug, Deserialize)]
struct TreesFile {
    #[serde(default)]
    trees: BTreeMap<String, TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    url: Option<String>,
}

/// Repository URL → canonical tree name. Read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeNameMap {
    by_url: HashMap<String, String>,
}

impl TreeNameMap {
    /// Load the map from a trees file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::TreesRead {
            path: path.to_path_buf(),
            source,
        })?;
        let map = Self::parse(&content).map_err(|message| ConfigError::TreesFormat {
            path: path.to_path_buf(),
            message,
        })?;
        info!(path = %path.display(), trees = map.len(), "Loaded tree names");
        Ok(map)
    }

    /// Parse trees YAML. Tree names are visited in sorted order, so on a
    /// duplicated URL the lexicographically first name wins.
    pub fn parse(content: &str) -> Result<Self, String> {
        let file: TreesFile = serde_yaml::from_str(content).map_err(|e| e.to_string())?;

        let mut by_url = HashMap::with_capacity(file.trees.len());
        for (name, entry) in file.trees {
            let url = entry
                .url
                .ok_or_else(|| format!("tree '{name}' has no url"))?;
            if let Some(existing) = by_url.get(&url) {
                warn!(%url, kept = %existing, ignored = %name, "Repository URL mapped twice");
                continue;
            }
            by_url.insert(url, name);
        }
        Ok(Self { by_url })
    }

    pub fn from_pairs<I, U, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (U, N)>,
        U: Into<String>,
        N: Into<String>,
    {
        Self {
            by_url: pairs
                .into_iter()
                .map(|(url, name)| (url.into(), name.into()))
                .collect(),
        }
    }

    pub fn tree_name(&self, url: &str) -> Option<&str> {
        self.by_url.get(url).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    /// Rewrite `tree_name` of every checkout whose repository URL is mapped.
    ///
    /// Returns how many checkouts changed. Idempotent.
    pub fn normalize(&self, submission: &mut Submission) -> Result<usize, SubmissionError> {
        let mut rewritten = 0;
        for checkout in submission.objects_mut(ObjectKind::Checkout)? {
            let Some(canonical) = checkout
                .get("git_repository_url")
                .and_then(Value::as_str)
                .and_then(|url| self.tree_name(url))
            else {
                continue;
            };
            if checkout.get("tree_name").and_then(Value::as_str) == Some(canonical) {
                continue;
            }
            let id = checkout.get("id").and_then(Value::as_str).unwrap_or("unknown");
            debug!(checkout = id, tree_name = canonical, "Standardizing tree name");
            checkout.insert("tree_name".to_string(), Value::String(canonical.to_string()));
            rewritten += 1;
        }
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LINUX: &str = "https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git";
    const NEXT: &str = "https://git.kernel.org/pub/scm/linux/kernel/git/next/linux-next.git";

    fn map() -> TreeNameMap {
        TreeNameMap::from_pairs([(LINUX, "mainline"), (NEXT, "next")])
    }

    #[test]
    fn test_parse_trees_yaml() {
        let yaml = format!(
            "trees:\n  mainline:\n    url: \"{LINUX}\"\n    branch: master\n  next:\n    url: \"{NEXT}\"\n"
        );
        let parsed = TreeNameMap::parse(&yaml).unwrap();
        assert_eq!(parsed, map());
    }

    #[test]
    fn test_parse_without_trees_key_is_empty() {
        assert!(TreeNameMap::parse("other: 1\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_requires_url() {
        let err = TreeNameMap::parse("trees:\n  broken:\n    branch: master\n").unwrap_err();
        assert!(err.contains("broken"));
    }

    #[test]
    fn test_duplicate_url_keeps_first_name() {
        let yaml = format!("trees:\n  zz:\n    url: \"{LINUX}\"\n  aa:\n    url: \"{LINUX}\"\n");
        let parsed = TreeNameMap::parse(&yaml).unwrap();
        assert_eq!(parsed.tree_name(LINUX), Some("aa"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = TreeNameMap::load(Path::new("/nonexistent/trees.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::TreesRead { .. }));
    }

    #[test]
    fn test_normalize_rewrites_only_matching_checkouts() {
        let mut submission = Submission::from_value(json!({
            "checkouts": [
                {"id": "lab:1", "git_repository_url": LINUX, "tree_name": "torvalds"},
                {"id": "lab:2", "git_repository_url": "https://example.com/other.git", "tree_name": "other"},
                {"id": "lab:3", "git_repository_url": NEXT},
                {"id": "lab:4", "git_repository_url": LINUX, "tree_name": "mainline"},
                {"id": "lab:5"}
            ]
        }))
        .unwrap();

        assert_eq!(map().normalize(&mut submission).unwrap(), 2);
        let doc = submission.into_value();
        assert_eq!(doc["checkouts"][0]["tree_name"], "mainline");
        assert_eq!(doc["checkouts"][1]["tree_name"], "other");
        assert_eq!(doc["checkouts"][2]["tree_name"], "next");
        assert_eq!(doc["checkouts"][3]["tree_name"], "mainline");
        assert!(doc["checkouts"][4].get("tree_name").is_none());
    }

    #[test]
    fn test_normalize_checkout_without_id() {
        let mut submission = Submission::from_value(json!({
            "checkouts": [{"git_repository_url": NEXT, "tree_name": "linux-next"}]
        }))
        .unwrap();

        assert_eq!(map().normalize(&mut submission).unwrap(), 1);
        assert_eq!(submission.into_value()["checkouts"][0]["tree_name"], "next");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut once = Submission::from_value(json!({
            "checkouts": [{"id": "lab:1", "git_repository_url": LINUX, "tree_name": "x"}],
            "builds": [{"id": "lab:b"}]
        }))
        .unwrap();
        map().normalize(&mut once).unwrap();
        let mut twice = once.clone();
        assert_eq!(map().normalize(&mut twice).unwrap(), 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_rejects_non_array_checkouts() {
        let mut submission = Submission::from_value(json!({"checkouts": {"id": "x"}})).unwrap();
        assert!(map().normalize(&mut submission).is_err());
    }
}
