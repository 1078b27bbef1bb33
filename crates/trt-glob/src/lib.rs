// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Compiled glob matching shared by the contract monitor's tool-name and
//! write-tool policy checks.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Result of evaluating a candidate against include/exclude glob rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// Candidate passes both include and exclude filters.
    Allowed,
    /// Candidate matched an exclude pattern.
    DeniedByExclude,
    /// Candidate did not match any include pattern (when includes are specified).
    DeniedByMissingInclude,
}

impl MatchDecision {
    /// Returns `true` only for [`MatchDecision::Allowed`].
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Compiled include/exclude glob pair, usable for tool-name patterns
/// (`"mcp__*__*"`) as readily as for path patterns.
///
/// Exclude patterns take precedence: a candidate matching an exclude glob is
/// denied even if it also matches an include glob. Empty pattern lists are
/// treated as "no constraint" (everything passes).
#[derive(Debug, Clone)]
pub struct IncludeExcludeGlobs {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl IncludeExcludeGlobs {
    /// Compile include and exclude pattern lists into a reusable matcher.
    pub fn new<I, E>(include: I, exclude: E) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    /// Evaluate a [`Path`] against the compiled glob rules.
    pub fn decide_path(&self, candidate: &Path) -> MatchDecision {
        if self
            .exclude
            .as_ref()
            .is_some_and(|set| set.is_match(candidate))
        {
            return MatchDecision::DeniedByExclude;
        }
        if self
            .include
            .as_ref()
            .is_some_and(|set| !set.is_match(candidate))
        {
            return MatchDecision::DeniedByMissingInclude;
        }
        MatchDecision::Allowed
    }

    /// Convenience wrapper around [`decide_path`](Self::decide_path) for
    /// string slices — tool names as readily as filesystem paths.
    pub fn decide_str(&self, candidate: &str) -> MatchDecision {
        self.decide_path(Path::new(candidate))
    }
}

/// Compile a list of glob patterns into a [`GlobSet`], returning `None` for
/// empty input.
pub fn build_globset<I>(patterns: I) -> Result<Option<GlobSet>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut b = GlobSetBuilder::new();
    let mut any = false;
    for p in patterns {
        let p = p.as_ref();
        any = true;
        b.add(Glob::new(p).with_context(|| format!("invalid glob: {p}"))?);
    }
    if !any {
        return Ok(None);
    }
    Ok(Some(b.build()?))
}

#[cfg(test)]
mod tests {
    use super::{IncludeExcludeGlobs, MatchDecision};

    #[test]
    fn allows_everything_without_patterns() {
        let rules = IncludeExcludeGlobs::new(Vec::<&str>::new(), Vec::<&str>::new())
            .expect("compile rules");
        assert_eq!(rules.decide_str("src/lib.rs"), MatchDecision::Allowed);
    }

    #[test]
    fn tool_name_wildcard_denies() {
        let rules = IncludeExcludeGlobs::new(Vec::<&str>::new(), vec!["mcp__*__*"])
            .expect("compile rules");
        assert_eq!(
            rules.decide_str("mcp__fs__write"),
            MatchDecision::DeniedByExclude
        );
        assert_eq!(rules.decide_str("fetch_ticket"), MatchDecision::Allowed);
    }

    #[test]
    fn exclude_patterns_take_precedence() {
        let rules = IncludeExcludeGlobs::new(vec!["src/**"], vec!["src/private/**"])
            .expect("compile include/exclude rules");
        assert_eq!(
            rules.decide_str("src/private/secrets.txt"),
            MatchDecision::DeniedByExclude
        );
    }

    #[test]
    fn invalid_pattern_returns_error() {
        let err = IncludeExcludeGlobs::new(vec!["["], Vec::<&str>::new())
            .expect_err("invalid glob should fail");
        assert!(err.to_string().contains("invalid glob"));
    }

    #[test]
    fn include_patterns_gate_matches() {
        let rules = IncludeExcludeGlobs::new(vec!["fetch_*", "store_*"], Vec::<&str>::new())
            .expect("compile rules");
        assert_eq!(rules.decide_str("fetch_ticket"), MatchDecision::Allowed);
        assert_eq!(
            rules.decide_str("unsafe_export"),
            MatchDecision::DeniedByMissingInclude
        );
    }
}
