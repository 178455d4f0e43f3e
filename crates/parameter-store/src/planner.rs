//! # Path Planning
//!
//! Decides which paths of the remote hierarchy a resolution call looks up,
//! and which returned keys count as property-source roots.

use crate::parameter::PATH_SEPARATOR;
use std::fmt;

/// Name of the environment shared by every application
pub const DEFAULT_ENVIRONMENT_NAME: &str = "application";

/// Joins the common path and a profile name
const PROFILE_SEPARATOR: char = '_';

/// Where a lookup path sits in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKind {
    /// Configuration shared by every application
    Common,
    /// Configuration for one service identity
    Application,
    /// Common configuration overlaid for one active profile
    Profile(String),
}

/// A path in the remote hierarchy to query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPath {
    path: String,
    kind: PathKind,
}

impl LookupPath {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> &PathKind {
        &self.kind
    }

    /// The path as a prefix, always ending with the separator
    pub fn as_prefix(&self) -> String {
        with_trailing_separator(&self.path)
    }
}

impl fmt::Display for LookupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Ordered lookup paths for one resolution call
///
/// Order: common path, application path (when a service identity is
/// present), then one profile path per active profile in the order given.
/// Duplicate profiles are planned twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPlan {
    root: String,
    common_path: String,
    application_path: Option<String>,
    paths: Vec<LookupPath>,
}

impl PathPlan {
    pub fn new(root_hierarchy_path: &str, active_profiles: &[String], service_id: Option<&str>) -> Self {
        let root = normalize_root(root_hierarchy_path);
        let common_path = format!("{root}{DEFAULT_ENVIRONMENT_NAME}");
        let application_path = service_id.map(|service_id| format!("{root}{service_id}"));

        let mut paths = vec![LookupPath {
            path: common_path.clone(),
            kind: PathKind::Common,
        }];

        if let Some(path) = &application_path {
            paths.push(LookupPath {
                path: path.clone(),
                kind: PathKind::Application,
            });
        }

        paths.extend(active_profiles.iter().map(|profile| LookupPath {
            path: format!("{common_path}{PROFILE_SEPARATOR}{profile}"),
            kind: PathKind::Profile(profile.clone()),
        }));

        Self {
            root,
            common_path,
            application_path,
            paths,
        }
    }

    /// Root of the hierarchy, ending with the separator
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn common_path(&self) -> &str {
        &self.common_path
    }

    pub fn application_path(&self) -> Option<&str> {
        self.application_path.as_deref()
    }

    pub fn paths(&self) -> &[LookupPath] {
        &self.paths
    }

    /// Name segment of a returned key, if the key is a property-source root
    ///
    /// A key is a root when it lies under the common or the application path
    /// and, once the hierarchy root is stripped, has no further separator.
    /// Deeper keys are reached through hierarchy fetches instead.
    pub fn name_segment<'k>(&self, key: &'k str) -> Option<&'k str> {
        let relative = key.strip_prefix(PATH_SEPARATOR).unwrap_or(key);
        let root = &self.root[1..];

        let under_common = relative.starts_with(&self.common_path[1..]);
        let under_application = self
            .application_path
            .as_deref()
            .is_some_and(|path| relative.starts_with(&path[1..]));

        if !under_common && !under_application {
            return None;
        }

        relative
            .strip_prefix(root)
            .filter(|segment| !segment.is_empty() && !segment.contains(PATH_SEPARATOR))
    }
}

/// Ensure a leading and a trailing separator; an empty root becomes `/`
fn normalize_root(root_hierarchy_path: &str) -> String {
    let trimmed = root_hierarchy_path.trim();
    let rooted = if trimmed.starts_with(PATH_SEPARATOR) {
        trimmed.to_string()
    } else {
        format!("{PATH_SEPARATOR}{trimmed}")
    };
    with_trailing_separator(&rooted)
}

fn with_trailing_separator(path: &str) -> String {
    if path.ends_with(PATH_SEPARATOR) {
        path.to_string()
    } else {
        format!("{path}{PATH_SEPARATOR}")
    }
}

/// Ensure a key starts with the separator before it is used as a lookup path
pub(crate) fn with_leading_separator(key: &str) -> String {
    if key.starts_with(PATH_SEPARATOR) {
        key.to_string()
    } else {
        format!("{PATH_SEPARATOR}{key}")
    }
}
