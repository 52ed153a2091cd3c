//! Version-control backend for the snapshot.
//!
//! Runs the `git` executable in the snapshot root and parses its textual
//! output. Any non-zero exit becomes `OfftracError::Process`.

use crate::error::{OfftracError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Captured output of one git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.code == 0
    }
}

/// Identity recorded on checkpoint commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for GitIdentity {
    fn default() -> Self {
        Self {
            name: "offtrac".to_string(),
            email: "offtrac@localhost".to_string(),
        }
    }
}

/// Git runner bound to one work tree.
#[derive(Debug, Clone)]
pub struct Git {
    program: String,
    root: PathBuf,
    identity: GitIdentity,
}

impl Git {
    #[must_use]
    pub fn new(program: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            root: root.into(),
            identity: GitIdentity::default(),
        }
    }

    #[must_use]
    pub fn with_identity(mut self, identity: GitIdentity) -> Self {
        self.identity = identity;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn describe(&self, args: &[&str]) -> String {
        let mut parts = vec![self.program.as_str()];
        parts.extend_from_slice(args);
        parts.join(" ")
    }

    /// Run git and capture its output regardless of exit status.
    ///
    /// # Errors
    ///
    /// Returns an I/O error only if the executable cannot be spawned.
    pub fn output(&self, args: &[&str]) -> Result<GitOutput> {
        debug!(root = %self.root.display(), command = %self.describe(args), "Running git");
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(&self.root)
            .env("LC_ALL", "C")
            .output()?;
        Ok(GitOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run git and fail on a non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns `OfftracError::Process` if git exits non-zero.
    pub fn run(&self, args: &[&str]) -> Result<GitOutput> {
        let output = self.output(args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(self.process_error(args, &output))
        }
    }

    fn process_error(&self, args: &[&str], output: &GitOutput) -> OfftracError {
        OfftracError::Process {
            command: self.describe(args),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        }
    }

    /// `git init`.
    ///
    /// # Errors
    ///
    /// Returns an error if git fails.
    pub fn init(&self) -> Result<()> {
        self.run(&["init", "--quiet"]).map(|_| ())
    }

    /// Whether the history has at least one commit.
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be spawned.
    pub fn has_head(&self) -> Result<bool> {
        Ok(self
            .output(&["rev-parse", "--verify", "--quiet", "HEAD"])?
            .success())
    }

    /// `git reset --hard HEAD`.
    ///
    /// # Errors
    ///
    /// Returns an error if git fails.
    pub fn reset_hard(&self) -> Result<()> {
        self.run(&["reset", "--hard", "--quiet", "HEAD"]).map(|_| ())
    }

    /// Untracked paths from `git status -s`.
    ///
    /// # Errors
    ///
    /// Returns an error if git fails.
    pub fn untracked(&self) -> Result<Vec<String>> {
        let output = self.run(&["status", "-s"])?;
        Ok(parse_untracked(&output.stdout))
    }

    /// `git add -A`.
    ///
    /// # Errors
    ///
    /// Returns an error if git fails.
    pub fn add_all(&self) -> Result<()> {
        self.run(&["add", "-A"]).map(|_| ())
    }

    /// `git commit -am <message>`.
    ///
    /// Returns `false` when there was nothing to commit.
    ///
    /// # Errors
    ///
    /// Returns an error for any other git failure.
    pub fn commit_all(&self, message: &str) -> Result<bool> {
        let user_name = format!("user.name={}", self.identity.name);
        let user_email = format!("user.email={}", self.identity.email);
        let args = [
            "-c",
            user_name.as_str(),
            "-c",
            user_email.as_str(),
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "-am",
            message,
        ];
        let output = self.output(&args)?;
        if output.success() {
            return Ok(true);
        }
        if is_nothing_to_commit(&output) {
            debug!("Nothing to commit");
            return Ok(false);
        }
        Err(self.process_error(&args, &output))
    }

    /// `git rev-parse HEAD`.
    ///
    /// # Errors
    ///
    /// Returns an error if git fails (for example, an empty history).
    pub fn rev_parse_head(&self) -> Result<String> {
        let output = self.run(&["rev-parse", "HEAD"])?;
        Ok(output.stdout.trim().to_string())
    }

    /// `git diff --name-status <since>...HEAD`, restricted to JSON documents.
    ///
    /// # Errors
    ///
    /// Returns an error if git fails (for example, an unknown revision).
    pub fn diff_name_status(&self, since: &str) -> Result<Vec<ChangedFile>> {
        let range = format!("{since}...HEAD");
        let output = self.run(&["diff", "--name-status", range.as_str()])?;
        Ok(parse_name_status(&output.stdout))
    }
}

fn is_nothing_to_commit(output: &GitOutput) -> bool {
    let text = format!("{}\n{}", output.stdout, output.stderr);
    text.contains("nothing to commit") || text.contains("nothing added to commit")
}

/// Paths reported as `?? <path>` by `git status -s`.
#[must_use]
pub fn parse_untracked(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.strip_prefix("?? "))
        .map(|path| unquote_git_path(path).to_string())
        .collect()
}

fn unquote_git_path(path: &str) -> &str {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path)
}

/// Single-letter change codes for one path, as reported by git.
///
/// Letters may combine; rename and copy codes carry a similarity score
/// (`R087`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMode(String);

impl ChangeMode {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn has(&self, letter: char) -> bool {
        self.0.chars().any(|c| c == letter)
    }

    #[must_use]
    pub fn is_added(&self) -> bool {
        self.has('A')
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.has('D')
    }

    #[must_use]
    pub fn is_renamed(&self) -> bool {
        self.has('R')
    }

    #[must_use]
    pub fn is_copied(&self) -> bool {
        self.has('C')
    }
}

/// One entry of a `--name-status` diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub mode: ChangeMode,
    /// Path at HEAD (the destination for renames and copies).
    pub path: String,
    /// Source path for renames and copies.
    pub previous: Option<String>,
}

/// Parse `git diff --name-status` output, keeping only `.json` paths.
#[must_use]
pub fn parse_name_status(stdout: &str) -> Vec<ChangedFile> {
    let mut results = Vec::new();
    for line in stdout.lines() {
        if !line.ends_with(".json") {
            continue;
        }
        let mut fields = line.split('\t');
        let Some(mode) = fields.next() else {
            continue;
        };
        let paths: Vec<&str> = fields.collect();
        let entry = match paths.as_slice() {
            [path] => ChangedFile {
                mode: ChangeMode::new(mode),
                path: unquote_git_path(path).to_string(),
                previous: None,
            },
            [from, to] => ChangedFile {
                mode: ChangeMode::new(mode),
                path: unquote_git_path(to).to_string(),
                previous: Some(unquote_git_path(from).to_string()),
            },
            _ => continue,
        };
        results.push(entry);
    }
    results
}
