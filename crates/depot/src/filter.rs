//! View filters that narrow a stream to the paths a workspace needs
//!
//! Filters are stream-relative paths evaluated in order, last match wins:
//! - `...` matches any run of characters, including `/`
//! - `*` matches within one path component
//! - a leading `-` excludes the matched paths
//!
//! With no filters, or when the first filter is an exclusion, every path
//! starts out included. Otherwise every path starts out excluded.
//!
//! Filters compile to gitignore rules: includes become ignore patterns
//! and exclusions become whitelist (`!`) patterns, so the last matching
//! rule decides.

use crate::error::RemoteError;
use anyhow::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;

/// Compiled view filter
#[derive(Debug, Clone)]
pub struct ViewFilter {
    rules: Option<Gitignore>,
    include_by_default: bool,
    source: Vec<String>,
}

impl ViewFilter {
    /// A filter that includes everything
    pub fn all() -> Self {
        Self {
            rules: None,
            include_by_default: true,
            source: Vec::new(),
        }
    }

    pub fn new<S: AsRef<str>>(filters: &[S]) -> Result<Self> {
        let source: Vec<String> = filters.iter().map(|f| f.as_ref().trim().to_owned()).collect();
        let source: Vec<String> = source.into_iter().filter(|f| !f.is_empty()).collect();
        if source.is_empty() {
            return Ok(Self::all());
        }

        let include_by_default = source[0].starts_with('-');
        let mut builder = GitignoreBuilder::new("");
        for filter in &source {
            let (exclude, pattern) = match filter.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, filter.as_str()),
            };
            for glob in translate(pattern) {
                let line = if exclude { format!("!{glob}") } else { glob };
                builder
                    .add_line(None, &line)
                    .map_err(|err| RemoteError::BadFilter {
                        filter: filter.clone(),
                        reason: err.to_string(),
                    })?;
            }
        }
        let rules = builder.build().map_err(|err| RemoteError::BadFilter {
            filter: source.join(" "),
            reason: err.to_string(),
        })?;

        Ok(Self {
            rules: Some(rules),
            include_by_default,
            source,
        })
    }

    /// Whether a slash-separated, stream-relative file path is in the view
    pub fn includes(&self, path: &str) -> bool {
        let Some(rules) = &self.rules else {
            return self.include_by_default;
        };
        match rules.matched(path.trim_start_matches('/'), false) {
            Match::Ignore(_) => true,
            Match::Whitelist(_) => false,
            Match::None => self.include_by_default,
        }
    }

    /// The filters as given
    pub fn source(&self) -> &[String] {
        &self.source
    }
}

/// Turn one stream-relative filter into anchored gitignore globs
fn translate(pattern: &str) -> Vec<String> {
    let pattern = pattern.trim_start_matches('/');
    let components: Vec<&str> = pattern.split('/').collect();
    let last = components.len() - 1;

    let mut globs = vec![String::new()];
    for (idx, component) in components.iter().enumerate() {
        let pieces: Vec<String> = if *component == "..." {
            vec!["**".to_owned()]
        } else if component.starts_with("...") {
            // "....txt" matches at any depth below this point
            vec![format!("**/{}", component.replacen("...", "*", 1).replace("...", "*"))]
        } else if component.contains("...") {
            let glob = component.replace("...", "*");
            if idx == last {
                // Also match everything below a directory whose name matches
                vec![glob.clone(), format!("{glob}/**")]
            } else {
                vec![glob]
            }
        } else {
            vec![(*component).to_owned()]
        };

        globs = globs
            .iter()
            .flat_map(|prefix| {
                pieces.iter().map(move |piece| {
                    if prefix.is_empty() {
                        piece.clone()
                    } else {
                        format!("{prefix}/{piece}")
                    }
                })
            })
            .collect();
    }

    globs.into_iter().map(|glob| format!("/{glob}")).collect()
}
