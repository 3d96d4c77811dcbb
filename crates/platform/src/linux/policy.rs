//! file_contexts policy database
//!
//! Maps path regexes to the context a file at that path should carry. This
//! is what `matchpathcon` consults; it says nothing about the label a file
//! actually has on disk.

use std::path::{Path, PathBuf};

use regex::Regex;
use seclabel_errors::LabelError;

use crate::context::SecurityContext;
use crate::operations::FileKind;

const NO_CONTEXT: &str = "<<none>>";
const OPERATION: &str = "selabel_open";

#[derive(Debug)]
struct Spec {
    regex: Regex,
    kind: Option<FileKind>,
    context: Option<SecurityContext>,
}

/// A loaded file_contexts database
#[derive(Debug)]
pub struct FileContexts {
    /// Regex specs first, literal specs last; lookups scan backwards.
    specs: Vec<Spec>,
    local_subs: Vec<(String, String)>,
    dist_subs: Vec<(String, String)>,
    source: PathBuf,
}

impl FileContexts {
    /// Directory holding file_contexts for a policy type
    #[must_use]
    pub fn contexts_dir(selinux_root: &Path, policy_type: &str) -> PathBuf {
        selinux_root
            .join(policy_type)
            .join("contexts")
            .join("files")
    }

    /// Load `file_contexts` plus its `.homedirs`/`.local` companions and the
    /// substitution files from `dir`.
    ///
    /// # Errors
    ///
    /// Returns `ENOENT` if the main file is missing and `EINVAL` if any line
    /// is malformed.
    pub fn load(dir: &Path) -> Result<Self, LabelError> {
        let source = dir.join("file_contexts");
        let main = std::fs::read_to_string(&source).map_err(|e| LabelError::from_io(OPERATION, &e))?;

        let mut specs = Vec::new();
        parse_specs(&source, &main, &mut specs)?;

        for companion in ["file_contexts.homedirs", "file_contexts.local"] {
            let path = dir.join(companion);
            if let Some(contents) = read_optional(&path)? {
                parse_specs(&path, &contents, &mut specs)?;
            }
        }

        let local_subs = match read_optional(&dir.join("file_contexts.subs"))? {
            Some(contents) => parse_subs(&contents),
            None => Vec::new(),
        };
        let dist_subs = match read_optional(&dir.join("file_contexts.subs_dist"))? {
            Some(contents) => parse_subs(&contents),
            None => Vec::new(),
        };

        Ok(Self::from_parts(specs, local_subs, dist_subs, source))
    }

    /// Build a database from in-memory file_contexts text
    ///
    /// # Errors
    ///
    /// Returns `EINVAL` if any line is malformed.
    pub fn parse(contents: &str) -> Result<Self, LabelError> {
        let source = PathBuf::from("<memory>");
        let mut specs = Vec::new();
        parse_specs(&source, contents, &mut specs)?;
        Ok(Self::from_parts(specs, Vec::new(), Vec::new(), source))
    }

    fn from_parts(
        specs: Vec<(Spec, bool)>,
        local_subs: Vec<(String, String)>,
        dist_subs: Vec<(String, String)>,
        source: PathBuf,
    ) -> Self {
        // Stable partition: literal paths end up after every regex, so an
        // exact entry always beats a pattern.
        let (literal, regex): (Vec<_>, Vec<_>) = specs.into_iter().partition(|(_, lit)| *lit);
        let specs = regex
            .into_iter()
            .chain(literal)
            .map(|(spec, _)| spec)
            .collect();

        Self {
            specs,
            local_subs,
            dist_subs,
            source,
        }
    }

    /// Number of specs loaded
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Number of path substitutions loaded
    #[must_use]
    pub fn substitutions(&self) -> usize {
        self.local_subs.len() + self.dist_subs.len()
    }

    /// Path of the main file_contexts file
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Look up the context for `path`.
    ///
    /// The last matching spec wins. `kind == None` matches specs of any
    /// file type.
    ///
    /// # Errors
    ///
    /// Returns `ENOENT` if no spec matches.
    pub fn lookup(
        &self,
        path: &str,
        kind: Option<FileKind>,
    ) -> Result<Option<SecurityContext>, LabelError> {
        let key = self.substitute(&normalize(path));

        let spec = self
            .specs
            .iter()
            .rev()
            .filter(|spec| match (spec.kind, kind) {
                (Some(want), Some(have)) => want == have,
                _ => true,
            })
            .find(|spec| spec.regex.is_match(&key))
            .ok_or_else(|| LabelError::from_errno("matchpathcon", libc::ENOENT))?;

        Ok(spec.context.clone())
    }

    fn substitute(&self, path: &str) -> String {
        match apply_sub(&self.local_subs, path) {
            Some(local) => apply_sub(&self.dist_subs, &local).unwrap_or(local),
            None => apply_sub(&self.dist_subs, path).unwrap_or_else(|| path.to_string()),
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, LabelError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LabelError::from_io(OPERATION, &e)),
    }
}

fn invalid_line(source: &Path, line_no: usize, reason: impl std::fmt::Display) -> LabelError {
    LabelError::Os {
        operation: OPERATION.to_string(),
        code: libc::EINVAL,
        message: format!("{}:{line_no}: {reason}", source.display()),
    }
}

fn parse_specs(
    source: &Path,
    contents: &str,
    specs: &mut Vec<(Spec, bool)>,
) -> Result<(), LabelError> {
    for (index, line) in contents.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let (pattern, kind, context) = match fields.as_slice() {
            [pattern, context] => (*pattern, None, *context),
            [pattern, kind, context] => {
                let kind = FileKind::from_spec(kind)
                    .ok_or_else(|| invalid_line(source, line_no, format!("invalid file type {kind}")))?;
                (*pattern, Some(kind), *context)
            }
            _ => return Err(invalid_line(source, line_no, "expected 2 or 3 fields")),
        };

        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| invalid_line(source, line_no, e))?;
        let context = (context != NO_CONTEXT).then(|| SecurityContext::new(context));

        specs.push((
            Spec {
                regex,
                kind,
                context,
            },
            !has_meta_chars(pattern),
        ));
    }
    Ok(())
}

fn parse_subs(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let alias = fields.next()?;
            let target = fields.next()?;
            Some((alias.trim_end_matches('/').to_string(), target.to_string()))
        })
        .collect()
}

fn apply_sub(subs: &[(String, String)], path: &str) -> Option<String> {
    subs.iter().find_map(|(alias, target)| {
        let rest = path.strip_prefix(alias.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then(|| format!("{target}{rest}"))
    })
}

/// Collapse runs of `/`
fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        out.push(c);
    }
    out
}

fn has_meta_chars(pattern: &str) -> bool {
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '.' | '^' | '$' | '?' | '*' | '+' | '|' | '[' | '(' | '{' => return true,
            '\\' => {
                chars.next();
            }
            _ => {}
        }
    }
    false
}

/// `SELINUXTYPE=` from the subsystem config file
pub(crate) fn configured_policy_type(config_file: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(config_file).ok()?;
    contents.lines().find_map(|line| {
        let value = line.trim().strip_prefix("SELINUXTYPE=")?;
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}
