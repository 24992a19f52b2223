//! Module paths the packager must never pick up while walking the graph.

use regex::Regex;
use rnws_shared::{Platform, Result, RnwsError};

/// One ignored path suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlacklistPattern {
    /// Matched verbatim; escaped before joining.
    Literal(String),
    /// Already a regular expression fragment.
    Pattern(String),
}

impl BlacklistPattern {
    fn to_fragment(&self) -> String {
        match self {
            Self::Literal(text) => regex::escape(text),
            Self::Pattern(pattern) => pattern.clone(),
        }
    }
}

/// Paths ignored for every platform.
const SHARED_PATTERNS: &[&str] = &[
    r"node_modules[/\\]react[/\\]dist[/\\].*",
    r"website[/\\]node_modules[/\\].*",
    r"heapCapture[/\\]bundle\.js",
];

const SHARED_LITERALS: &[&str] = &[
    "node_modules/react/lib/React.js",
    "node_modules/react/lib/ReactDOM.js",
    "downstream/core/invariant.js",
];

/// Suffixes hidden from a platform's graph: the other platforms' files.
fn platform_literals(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Ios => &[".web.js", ".android.js"],
        Platform::Android => &[".web.js", ".ios.js"],
    }
}

/// The packager's blacklist: shared ignores plus optional per-platform ignores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blacklist {
    platform: Option<Platform>,
    patterns: Vec<BlacklistPattern>,
}

impl Blacklist {
    /// Shared ignores only; no platform's files are excluded.
    pub fn all_platforms() -> Self {
        Self::build(None)
    }

    /// Shared ignores plus the other platforms' files.
    pub fn for_platform(platform: Platform) -> Self {
        Self::build(Some(platform))
    }

    fn build(platform: Option<Platform>) -> Self {
        let mut patterns: Vec<BlacklistPattern> = SHARED_PATTERNS
            .iter()
            .map(|p| BlacklistPattern::Pattern((*p).to_string()))
            .chain(
                SHARED_LITERALS
                    .iter()
                    .map(|l| BlacklistPattern::Literal((*l).to_string())),
            )
            .collect();

        if let Some(platform) = platform {
            patterns.extend(
                platform_literals(platform)
                    .iter()
                    .map(|l| BlacklistPattern::Literal((*l).to_string())),
            );
        }

        Self { platform, patterns }
    }

    /// Add project-specific ignores ahead of the built-in ones.
    pub fn with_additional(mut self, extra: impl IntoIterator<Item = BlacklistPattern>) -> Self {
        let mut patterns: Vec<_> = extra.into_iter().collect();
        patterns.append(&mut self.patterns);
        self.patterns = patterns;
        self
    }

    pub fn platform(&self) -> Option<Platform> {
        self.platform
    }

    pub fn patterns(&self) -> &[BlacklistPattern] {
        &self.patterns
    }

    /// Source of the combined expression, anchored at the end of the path.
    pub fn to_pattern_string(&self) -> String {
        let alternatives: Vec<String> = self.patterns.iter().map(|p| p.to_fragment()).collect();
        format!("({})$", alternatives.join("|"))
    }

    /// The combined expression. Fails only when an additional pattern is invalid.
    pub fn to_regex(&self) -> Result<Regex> {
        let source = self.to_pattern_string();
        Regex::new(&source)
            .map_err(|e| RnwsError::config(format!("invalid blacklist pattern: {e}")))
    }
}
