//! Include/exclude glob filtering of workspace-relative document paths.
//!
//! A rule applies to a document when the document's path matches at least
//! one `include` glob and no `exclude` glob. Exclusion always wins.
//!
//! Paths are normalised to forward slashes before matching so that the same
//! rule works on every platform. Globs are compiled with a literal separator:
//! `*` stays inside one path segment, `**` spans any number of segments.
//!
//! Dotfiles are matched by default (`match_dotfiles = true`). When that is
//! turned off a path with a dot segment (`.github/ci.yml`, `src/.env`) only
//! matches a glob that itself names a dot segment, such as `.github/**`.

use std::borrow::Cow;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

pub const DEFAULT_INCLUDE: &str = "**/*";

#[derive(Debug, Clone)]
pub struct PathFilter {
    include: GlobList,
    exclude: GlobList,
    match_dotfiles: bool,
}

#[derive(Debug, Clone)]
struct GlobList {
    set: GlobSet,
    /// Per glob: does the pattern spell out a dot segment?
    explicit_dot: Vec<bool>,
}

/// A glob that failed to compile, with its position in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobError {
    pub field: &'static str,
    pub index: usize,
    pub message: String,
}

impl PathFilter {
    /// Compiles both glob lists, reporting every glob that fails.
    pub fn new<I, E>(include: I, exclude: E, match_dotfiles: bool) -> Result<Self, Vec<GlobError>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let include = GlobList::build("include", include);
        let exclude = GlobList::build("exclude", exclude);

        match (include, exclude) {
            (Ok(include), Ok(exclude)) => Ok(PathFilter {
                include,
                exclude,
                match_dotfiles,
            }),
            (include, exclude) => Err(include
                .err()
                .into_iter()
                .chain(exclude.err())
                .flatten()
                .collect()),
        }
    }

    /// Filter that accepts every path.
    pub fn match_all() -> Self {
        PathFilter::new([DEFAULT_INCLUDE], std::iter::empty::<&str>(), true)
            .unwrap_or_else(|_| unreachable!("default include glob is valid"))
    }

    pub fn is_eligible(&self, relative_path: &str) -> bool {
        let path = normalize_path(relative_path);
        let dotted = !self.match_dotfiles && has_dot_segment(&path);

        self.include.matches(&path, dotted) && !self.exclude.matches(&path, dotted)
    }
}

impl GlobList {
    fn build<P>(field: &'static str, patterns: P) -> Result<Self, Vec<GlobError>>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut explicit_dot = Vec::new();
        let mut errors = Vec::new();

        for (index, pattern) in patterns.into_iter().enumerate() {
            let pattern = normalize_path(pattern.as_ref()).into_owned();
            match GlobBuilder::new(&pattern).literal_separator(true).build() {
                Ok(glob) => {
                    builder.add(glob);
                    explicit_dot.push(has_dot_segment(&pattern));
                }
                Err(err) => errors.push(GlobError {
                    field,
                    index,
                    message: err.to_string(),
                }),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let set = builder.build().map_err(|err| {
            vec![GlobError {
                field,
                index: 0,
                message: err.to_string(),
            }]
        })?;

        Ok(GlobList { set, explicit_dot })
    }

    fn matches(&self, path: &str, dotted: bool) -> bool {
        if !dotted {
            return self.set.is_match(path);
        }
        self.set
            .matches(path)
            .into_iter()
            .any(|index| self.explicit_dot[index])
    }
}

/// Forward slashes only, no leading `./`.
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    let path = if path.contains('\\') {
        Cow::Owned(path.replace('\\', "/"))
    } else {
        Cow::Borrowed(path)
    };

    match path {
        Cow::Borrowed(p) => Cow::Borrowed(p.trim_start_matches("./")),
        Cow::Owned(p) => Cow::Owned(p.trim_start_matches("./").to_string()),
    }
}

fn has_dot_segment(path: &str) -> bool {
    path.split('/')
        .any(|segment| segment.starts_with('.') && segment != "." && segment != "..")
}
