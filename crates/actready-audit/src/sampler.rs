//! Repository sampler: shallow clone plus a bounded, deterministic walk of source files.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::error::ScanError;

const CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// Bounds on what one scan reads from a repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLimits {
    /// Hard cap on included files across the whole tree.
    pub max_files: usize,
    /// Lines kept from the head of each included file.
    pub max_lines: usize,
    /// The walk gives up after this many unreadable candidate files; 0 means no limit.
    pub max_skipped: usize,
    /// File-name extensions to include, without the leading dot.
    pub extensions: Vec<String>,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_files: 500,
            max_lines: 300,
            max_skipped: 2000,
            extensions: ["py", "js", "ts", "ipynb"].map(String::from).to_vec(),
        }
    }
}

/// Head of one source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSnippet {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    pub text: String,
}

/// Ordered sample of a repository's source files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeCorpus {
    snippets: Vec<SourceSnippet>,
    skipped: usize,
}

impl CodeCorpus {
    pub fn snippets(&self) -> &[SourceSnippet] {
        &self.snippets
    }

    pub fn files_included(&self) -> usize {
        self.snippets.len()
    }

    /// Candidate files that could not be read or decoded.
    pub fn files_skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Snippets prefixed with `# File: <path>` markers, separated by a blank line.
    pub fn render(&self) -> String {
        self.snippets
            .iter()
            .map(|s| format!("# File: {}\n{}", s.path, s.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Clone `url` into a scoped temporary directory and sample it.
///
/// The temporary directory is removed when this returns, on every path.
#[instrument(skip(limits), fields(max_files = limits.max_files, max_lines = limits.max_lines))]
pub async fn sample_repository(url: &str, limits: &ScanLimits) -> Result<CodeCorpus, ScanError> {
    let workspace = tempfile::Builder::new().prefix("actready-scan-").tempdir()?;
    let checkout = workspace.path().join("repo");

    clone_repository(url, &checkout).await?;

    let root = checkout.clone();
    let limits = limits.clone();
    let corpus = tokio::task::spawn_blocking(move || sample_tree(&root, &limits))
        .await
        .map_err(|e| ScanError::Internal(format!("sampling task failed: {e}")))?;

    info!(
        files = corpus.files_included(),
        skipped = corpus.files_skipped(),
        "repository sampled"
    );
    drop(workspace);
    Ok(corpus)
}

/// Shallow (depth 1) clone with terminal prompts disabled.
pub async fn clone_repository(url: &str, dest: &Path) -> Result<(), ScanError> {
    let clone_error = |reason: String| ScanError::Clone {
        url: url.to_string(),
        reason,
    };

    let child = tokio::process::Command::new("git")
        .args(["clone", "--depth", "1", "--quiet", "--"])
        .arg(url)
        .arg(dest)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(CLONE_TIMEOUT, child)
        .await
        .map_err(|_| clone_error(format!("timed out after {}s", CLONE_TIMEOUT.as_secs())))?
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => clone_error("git executable not found".into()),
            _ => clone_error(format!("failed to run git: {e}")),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = match stderr.trim() {
            "" => format!("git exited with {}", output.status),
            msg => msg.to_string(),
        };
        return Err(clone_error(reason));
    }

    debug!(dest = %dest.display(), "clone complete");
    Ok(())
}

/// Walk `root` in file-name order and collect the heads of matching files.
///
/// `.git` is never entered. Files that cannot be opened or are not UTF-8 are
/// skipped; the walk stops at `max_files` included or `max_skipped` skipped
/// (a `max_skipped` of 0 never stops it).
pub fn sample_tree(root: &Path, limits: &ScanLimits) -> CodeCorpus {
    let suffixes: Vec<String> = limits.extensions.iter().map(|e| format!(".{e}")).collect();
    let mut corpus = CodeCorpus::default();

    if limits.max_files == 0 {
        return corpus;
    }

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "walk error");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !suffixes.iter().any(|s| name.ends_with(s.as_str())) {
            continue;
        }

        match read_head(entry.path(), limits.max_lines) {
            Ok(text) => {
                corpus.snippets.push(SourceSnippet {
                    path: relative_path(root, entry.path()),
                    text,
                });
                if corpus.snippets.len() >= limits.max_files {
                    break;
                }
            }
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                corpus.skipped += 1;
                if limits.max_skipped != 0 && corpus.skipped >= limits.max_skipped {
                    debug!(skipped = corpus.skipped, "too many unreadable files, stopping walk");
                    break;
                }
            }
        }
    }

    corpus
}

/// First `max_lines` lines of a UTF-8 file, line endings preserved.
fn read_head(path: &Path, max_lines: usize) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut text = String::new();
    for _ in 0..max_lines {
        if reader.read_line(&mut text)? == 0 {
            break;
        }
    }
    Ok(text)
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[test]
    fn three_python_files_three_markers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.py", b"print('b')\n");
        write(dir.path(), "a.py", b"print('a')\n");
        write(dir.path(), "pkg/c.py", b"print('c')\n");
        write(dir.path(), "README.md", b"# readme\n");

        let corpus = sample_tree(dir.path(), &ScanLimits::default());
        let rendered = corpus.render();

        assert_eq!(corpus.files_included(), 3);
        assert_eq!(rendered.matches("# File: ").count(), 3);
        let paths: Vec<&str> = corpus.snippets().iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py", "pkg/c.py"]);
        assert_eq!(
            rendered,
            "# File: a.py\nprint('a')\n\n\n# File: b.py\nprint('b')\n\n\n# File: pkg/c.py\nprint('c')\n"
        );
    }

    #[test]
    fn git_directory_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".git/hooks/pre-commit.py", b"x = 1\n");
        write(dir.path(), "main.ts", b"export {}\n");

        let corpus = sample_tree(dir.path(), &ScanLimits::default());
        assert_eq!(corpus.files_included(), 1);
        assert_eq!(corpus.snippets()[0].path, "main.ts");
    }

    #[test]
    fn head_truncation_preserves_line_endings() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "crlf.js", b"one\r\ntwo\r\nthree\r\n");

        let limits = ScanLimits {
            max_lines: 2,
            ..ScanLimits::default()
        };
        let corpus = sample_tree(dir.path(), &limits);
        assert_eq!(corpus.snippets()[0].text, "one\r\ntwo\r\n");
    }

    #[test]
    fn non_utf8_files_skipped_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.py", &[0xff, 0xfe, b'\n']);
        write(dir.path(), "good.py", b"ok = True\n");

        let corpus = sample_tree(dir.path(), &ScanLimits::default());
        assert_eq!(corpus.files_included(), 1);
        assert_eq!(corpus.files_skipped(), 1);
        assert_eq!(corpus.snippets()[0].path, "good.py");
    }

    #[test]
    fn skip_cap_stops_walk() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("a{i}.py"), &[0xff]);
        }
        write(dir.path(), "z.py", b"late = 1\n");

        let limits = ScanLimits {
            max_skipped: 3,
            ..ScanLimits::default()
        };
        let corpus = sample_tree(dir.path(), &limits);
        assert_eq!(corpus.files_skipped(), 3);
        assert!(corpus.is_empty());
    }

    #[test]
    fn zero_skip_cap_means_unlimited() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("a{i}.py"), &[0xff]);
        }
        write(dir.path(), "z.py", b"late = 1\n");

        let limits = ScanLimits {
            max_skipped: 0,
            ..ScanLimits::default()
        };
        let corpus = sample_tree(dir.path(), &limits);
        assert_eq!(corpus.files_skipped(), 5);
        assert_eq!(corpus.files_included(), 1);
        assert_eq!(corpus.snippets()[0].path, "z.py");
    }

    #[test]
    fn extension_must_be_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.python", b"x\n");
        write(dir.path(), "script.pyc", b"x\n");
        write(dir.path(), "nb.ipynb", b"{}\n");

        let corpus = sample_tree(dir.path(), &ScanLimits::default());
        let paths: Vec<&str> = corpus.snippets().iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["nb.ipynb"]);
    }

    #[test]
    fn empty_tree_renders_empty() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = sample_tree(dir.path(), &ScanLimits::default());
        assert!(corpus.is_empty());
        assert_eq!(corpus.render(), "");
    }

    #[tokio::test]
    async fn nonexistent_repository_is_clone_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}/no-such-repo", dir.path().display());
        let err = sample_repository(&url, &ScanLimits::default()).await.unwrap_err();
        assert!(err.is_clone_error(), "unexpected error: {err}");
        assert!(err.to_string().contains("no-such-repo"));
    }

    #[tokio::test]
    async fn clones_and_samples_local_repository() {
        if !git_available() {
            return;
        }
        let origin = tempfile::tempdir().unwrap();
        write(origin.path(), "app.py", b"import torch\n");
        write(origin.path(), "web/index.js", b"console.log(1)\n");

        let git = |args: &[&str]| {
            let status = std::process::Command::new("git")
                .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
                .args(args)
                .current_dir(origin.path())
                .output()
                .unwrap()
                .status;
            assert!(status.success(), "git {args:?} failed");
        };
        git(&["init", "--quiet"]);
        git(&["add", "."]);
        git(&["commit", "--quiet", "-m", "init"]);

        let url = format!("file://{}", origin.path().display());
        let corpus = sample_repository(&url, &ScanLimits::default()).await.unwrap();
        let paths: Vec<&str> = corpus.snippets().iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["app.py", "web/index.js"]);
    }

    proptest! {
        #[test]
        fn caps_are_never_exceeded(
            file_lines in prop::collection::vec(0usize..20, 0..25),
            max_files in 1usize..10,
            max_lines in 1usize..8,
        ) {
            let dir = tempfile::tempdir().unwrap();
            for (i, lines) in file_lines.iter().enumerate() {
                let body: String = (0..*lines).map(|l| format!("line {l}\n")).collect();
                write(dir.path(), &format!("f{i:02}.py"), body.as_bytes());
            }
            let limits = ScanLimits { max_files, max_lines, ..ScanLimits::default() };
            let corpus = sample_tree(dir.path(), &limits);

            prop_assert!(corpus.files_included() <= max_files);
            prop_assert_eq!(corpus.files_included(), file_lines.len().min(max_files));
            for snippet in corpus.snippets() {
                prop_assert!(snippet.text.lines().count() <= max_lines);
            }
        }
    }
}
