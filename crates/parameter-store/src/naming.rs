//! # Property Source Naming
//!
//! Maps the name segment of a matched key to the property-source names it
//! contributes to.

use std::collections::BTreeSet;

/// Computes property-source names for a key segment
pub trait SourceNamingPolicy: Send + Sync {
    fn source_names(&self, key_segment: &str, active_profiles: &[String]) -> BTreeSet<String>;
}

/// Marks profile-specific sources, e.g. `application[prod]`
pub const PROFILE_MARKER_START: char = '[';
pub const PROFILE_MARKER_END: char = ']';

const PROFILE_SEPARATOR: char = '_';

/// Default naming: `name` stays `name`; `name_p1_p2` becomes `name[p1]`,
/// `name[p2]` when every listed profile is active, and nothing otherwise.
///
/// A profile-specific key replaces the bare name instead of adding to it.
/// Empty tokens are kept, except trailing ones: `application__prod` names
/// nothing (the empty profile is never active), `_prod` names `[prod]` and
/// `application_` names `application`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileSuffixNaming;

impl SourceNamingPolicy for ProfileSuffixNaming {
    fn source_names(&self, key_segment: &str, active_profiles: &[String]) -> BTreeSet<String> {
        let mut tokens: Vec<&str> = key_segment.split(PROFILE_SEPARATOR).collect();
        while tokens.last().is_some_and(|token| token.is_empty()) {
            tokens.pop();
        }

        let Some((base, profiles)) = tokens.split_first() else {
            return BTreeSet::new();
        };

        if profiles.is_empty() {
            return BTreeSet::from([base.to_string()]);
        }

        if !profiles
            .iter()
            .all(|profile| active_profiles.iter().any(|active| active == profile))
        {
            return BTreeSet::new();
        }

        profiles
            .iter()
            .map(|profile| profile_source_name(base, profile))
            .collect()
    }
}

/// `name[profile]`
pub fn profile_source_name(base: &str, profile: &str) -> String {
    format!("{base}{PROFILE_MARKER_START}{profile}{PROFILE_MARKER_END}")
}

/// Whether a source name carries a profile marker
pub fn is_profile_specific(name: &str) -> bool {
    name.ends_with(PROFILE_MARKER_END)
}
