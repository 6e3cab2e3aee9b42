// ABOUTME: Immutable Release value identifying one deployment attempt.
// ABOUTME: Named from a coarse UTC timestamp; enrichment produces new values.

use chrono::{DateTime, Utc};

/// One deployment attempt, materialized as a directory under
/// `<root>/releases/<name>`.
///
/// Whether a release is live is never stored here; it is derived from what
/// the current symlink points to (see `store::current_release`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub name: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub commit_hash: Option<String>,
    pub branch: Option<String>,
}

impl Release {
    /// Allocate a new release named from the current time.
    ///
    /// The name has one-second resolution, so two releases created within
    /// the same second collide. The naming convention is kept as-is for
    /// on-disk compatibility.
    pub fn create(deploy_root: &str) -> Self {
        Self::create_at(deploy_root, Utc::now())
    }

    pub fn create_at(deploy_root: &str, now: DateTime<Utc>) -> Self {
        let name = now.format("%Y%m%d%H%M%S").to_string();
        let path = format!("{}/releases/{}", deploy_root.trim_end_matches('/'), name);
        Self {
            name,
            path,
            created_at: now,
            commit_hash: None,
            branch: None,
        }
    }

    /// Reference an existing (or presumed) release by name.
    pub fn named(deploy_root: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: format!("{}/releases/{}", deploy_root.trim_end_matches('/'), name),
            created_at: Utc::now(),
            commit_hash: None,
            branch: None,
        }
    }

    pub fn with_commit_hash(self, commit_hash: impl Into<String>) -> Self {
        Self {
            commit_hash: Some(commit_hash.into()),
            ..self
        }
    }

    pub fn with_branch(self, branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn create_derives_name_from_timestamp() {
        let now = Utc.with_ymd_and_hms(2025, 1, 3, 12, 30, 45).unwrap();
        let release = Release::create_at("/var/www/app", now);

        assert_eq!(release.name, "20250103123045");
        assert_eq!(release.path, "/var/www/app/releases/20250103123045");
        assert!(release.commit_hash.is_none());
        assert!(release.branch.is_none());
    }

    #[test]
    fn create_trims_trailing_slash_in_root() {
        let now = Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap();
        let release = Release::create_at("/var/www/app/", now);

        assert_eq!(release.path, "/var/www/app/releases/20250103000000");
    }

    #[test]
    fn enrichment_produces_new_values() {
        let release = Release::create("/srv/app");
        let enriched = release
            .clone()
            .with_branch("main")
            .with_commit_hash("abc123");

        assert_eq!(enriched.name, release.name);
        assert_eq!(enriched.branch.as_deref(), Some("main"));
        assert_eq!(enriched.commit_hash.as_deref(), Some("abc123"));
        assert!(release.branch.is_none());
    }

    #[test]
    fn named_resolves_under_releases_dir() {
        let release = Release::named("/srv/app", "20240101000000");
        assert_eq!(release.path, "/srv/app/releases/20240101000000");
    }
}
