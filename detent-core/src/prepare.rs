// Workflow Preparer
// Validates, instruments and writes a batch of workflow documents

use crate::error::PrepareError;
use crate::inject::{Injector, JobOverrides, TimeoutConfig};
use crate::manifest::{Manifest, ManifestHost};
use crate::sensitivity::SensitivityRules;
use crate::utils::{is_within, unique_file_name};
use crate::workflow::{Workflow, WorkflowParser};
use crate::CoreResult;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Default location of workflow documents, relative to the repository root.
pub const DEFAULT_WORKFLOWS_DIR: &str = ".github/workflows";

/// Documents larger than this are rejected.
pub const MAX_DOCUMENT_BYTES: u64 = 1024 * 1024;

/// Upper bound on documents instrumented at once.
pub const MAX_CONCURRENCY: usize = 10;

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub repo_root: PathBuf,
    /// Workflow directory, relative to `repo_root`
    pub workflows_dir: PathBuf,
    pub max_document_bytes: u64,
    pub concurrency: usize,
    pub overrides: JobOverrides,
    pub timeouts: TimeoutConfig,
    pub rules: SensitivityRules,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            workflows_dir: PathBuf::from(DEFAULT_WORKFLOWS_DIR),
            max_document_bytes: MAX_DOCUMENT_BYTES,
            concurrency: MAX_CONCURRENCY,
            overrides: JobOverrides::default(),
            timeouts: TimeoutConfig::default(),
            rules: SensitivityRules::default(),
        }
    }
}

impl PrepareOptions {
    pub fn with_repo_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repo_root = root.into();
        self
    }

    pub fn with_workflows_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workflows_dir = dir.into();
        self
    }

    pub fn with_max_document_bytes(mut self, limit: u64) -> Self {
        self.max_document_bytes = limit;
        self
    }

    pub fn with_overrides(mut self, overrides: JobOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// Instrumented documents in a private temporary directory.
///
/// The directory is removed when this value is dropped, unless it was kept.
#[derive(Debug)]
pub struct PreparedWorkflows {
    dir: TempDir,
    pub manifest: Manifest,
    /// Written files, sorted
    pub files: Vec<PathBuf>,
    pub host: Option<ManifestHost>,
}

impl PreparedWorkflows {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Keep the directory on disk and return its path.
    pub fn keep(self) -> PathBuf {
        self.dir.keep()
    }

    /// Remove the directory now, reporting any failure.
    pub fn cleanup(self) -> CoreResult<()> {
        Ok(self.dir.close()?)
    }
}

/// Orchestrates discovery, validation, manifest assignment and injection.
pub struct WorkflowPreparer {
    options: PrepareOptions,
}

impl WorkflowPreparer {
    pub fn new(options: PrepareOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PrepareOptions {
        &self.options
    }

    /// Workflow documents (`*.yml`, `*.yaml`) in the workflow directory,
    /// sorted by path.
    pub fn discover(&self) -> Result<Vec<PathBuf>, PrepareError> {
        let dir = self.options.repo_root.join(&self.options.workflows_dir);

        match fs::symlink_metadata(&dir) {
            Ok(meta) if meta.file_type().is_symlink() => return Err(PrepareError::Symlink(dir)),
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(PrepareError::MissingWorkflowDir(dir)),
        }

        let entries =
            fs::read_dir(&dir).map_err(|_| PrepareError::MissingWorkflowDir(dir.clone()))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yml") | Some("yaml")
                )
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(PrepareError::NoWorkflows(dir));
        }
        debug!(count = paths.len(), dir = %dir.display(), "discovered workflows");
        Ok(paths)
    }

    /// Read and parse one document after the safety checks.
    pub fn load(&self, path: &Path) -> Result<Workflow, PrepareError> {
        let unreadable = |source| PrepareError::Unreadable {
            path: path.to_path_buf(),
            source,
        };
        let meta = fs::symlink_metadata(path).map_err(unreadable)?;
        if meta.file_type().is_symlink() {
            return Err(PrepareError::Symlink(path.to_path_buf()));
        }
        if !is_within(&self.options.repo_root, path) {
            return Err(PrepareError::PathEscape(path.to_path_buf()));
        }
        if meta.len() > self.options.max_document_bytes {
            return Err(PrepareError::TooLarge {
                path: path.to_path_buf(),
                size: meta.len(),
                limit: self.options.max_document_bytes,
            });
        }

        let bytes = fs::read(path).map_err(unreadable)?;
        if WorkflowParser::looks_binary(&bytes) {
            return Err(PrepareError::Binary(path.to_path_buf()));
        }
        let text =
            String::from_utf8(bytes).map_err(|_| PrepareError::Binary(path.to_path_buf()))?;

        serde_yaml::from_str(&text).map_err(|source| PrepareError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load every document, failing on the first invalid one.
    pub fn load_all(&self, paths: &[PathBuf]) -> Result<Vec<(PathBuf, Workflow)>, PrepareError> {
        paths
            .iter()
            .map(|path| Ok((path.clone(), self.load(path)?)))
            .collect()
    }

    /// Manifest of the discovered documents, without writing anything.
    pub fn manifest(&self) -> CoreResult<Manifest> {
        let documents = self.load_all(&self.discover()?)?;
        Ok(Manifest::build(&documents, &self.options.rules))
    }

    /// Discover and prepare every document in the workflow directory.
    pub async fn prepare(&self) -> CoreResult<PreparedWorkflows> {
        let paths = self.discover()?;
        self.prepare_paths(&paths).await
    }

    /// Prepare an explicit list of documents.
    ///
    /// All documents are validated and the manifest is assigned before any
    /// output is written. Documents are then instrumented in parallel; the
    /// first failure aborts the rest and removes the output directory.
    pub async fn prepare_paths(&self, paths: &[PathBuf]) -> CoreResult<PreparedWorkflows> {
        let documents = self.load_all(paths)?;
        let manifest = Manifest::build(&documents, &self.options.rules);
        let host = ManifestHost::select(&documents, &self.options.overrides, &manifest);

        let dir = create_private_dir()?;
        let injector = Injector::new(
            Arc::new(self.options.overrides.clone()),
            self.options.timeouts,
            self.options.rules,
        );
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.clamp(1, MAX_CONCURRENCY)));
        let write_lock = Arc::new(Mutex::new(()));

        let mut taken = HashSet::new();
        let mut workers = JoinSet::new();

        for (path, mut workflow) in documents {
            let name = path
                .file_name()
                .map(Path::new)
                .unwrap_or_else(|| Path::new("workflow.yml"));
            let target = dir.path().join(unique_file_name(name, &mut taken));
            let host = host.clone().filter(|h| h.is_in(&path));
            let injector = injector.clone();
            let semaphore = Arc::clone(&semaphore);
            let write_lock = Arc::clone(&write_lock);

            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PrepareError::Worker(e.to_string()))?;

                injector.inject(&mut workflow, host.as_ref());
                let yaml = WorkflowParser::to_yaml(&workflow)?;

                let _guard = write_lock.lock().await;
                tokio::fs::write(&target, yaml).await?;
                debug!(source = %path.display(), target = %target.display(), "wrote instrumented workflow");
                CoreResult::Ok(target)
            });
        }

        let mut files = Vec::new();
        while let Some(joined) = workers.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(PrepareError::Worker(e.to_string()).into()),
            };
            match result {
                Ok(file) => files.push(file),
                Err(e) => {
                    workers.abort_all();
                    while workers.join_next().await.is_some() {}
                    // dropping `dir` removes everything written so far
                    return Err(e);
                }
            }
        }
        files.sort();

        info!(
            files = files.len(),
            jobs = manifest.jobs.len(),
            dir = %dir.path().display(),
            "workflows prepared"
        );

        Ok(PreparedWorkflows {
            dir,
            manifest,
            files,
            host,
        })
    }
}

fn create_private_dir() -> CoreResult<TempDir> {
    let dir = tempfile::Builder::new().prefix("detent-").tempdir()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700))?;
    }

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::inject::JobOverride;

    const CI: &str = r#"
name: CI
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - run: cargo build
  test:
    needs: build
    steps:
      - run: cargo test
"#;

    const RELEASE: &str = r#"
on:
  push:
    tags: ['v*']
jobs:
  publish:
    steps:
      - run: cargo publish
"#;

    fn repo(files: &[(&str, &str)]) -> TempDir {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join(DEFAULT_WORKFLOWS_DIR);
        fs::create_dir_all(&dir).unwrap();
        for (name, content) in files {
            fs::write(dir.join(name), content).unwrap();
        }
        temp
    }

    fn preparer(root: &Path) -> WorkflowPreparer {
        WorkflowPreparer::new(PrepareOptions::default().with_repo_root(root))
    }

    #[test]
    fn test_discover_sorted_yaml_only() {
        let temp = repo(&[("b.yaml", CI), ("a.yml", CI), ("notes.md", "# hi")]);
        let paths = preparer(temp.path()).discover().unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.yml", "b.yaml"]);
    }

    #[test]
    fn test_discover_errors() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            preparer(temp.path()).discover(),
            Err(PrepareError::MissingWorkflowDir(_))
        ));

        let temp = repo(&[("README.md", "")]);
        assert!(matches!(
            preparer(temp.path()).discover(),
            Err(PrepareError::NoWorkflows(_))
        ));
    }

    #[test]
    fn test_load_rejects_unsafe_documents() {
        let temp = repo(&[("bin.yml", "jobs:\0"), ("bad.yml", "jobs: [\n")]);
        let dir = temp.path().join(DEFAULT_WORKFLOWS_DIR);
        let preparer = preparer(temp.path());

        assert!(matches!(
            preparer.load(&dir.join("bin.yml")),
            Err(PrepareError::Binary(_))
        ));
        assert!(matches!(
            preparer.load(&dir.join("bad.yml")),
            Err(PrepareError::Malformed { .. })
        ));

        let outside = tempfile::tempdir().unwrap();
        let foreign = outside.path().join("ci.yml");
        fs::write(&foreign, CI).unwrap();
        assert!(matches!(
            preparer.load(&foreign),
            Err(PrepareError::PathEscape(_))
        ));
    }

    #[test]
    fn test_load_reports_unreadable_document() {
        let temp = repo(&[("ci.yml", CI)]);
        let missing = temp.path().join(DEFAULT_WORKFLOWS_DIR).join("gone.yml");

        let err = preparer(temp.path()).load(&missing).unwrap_err();
        assert!(matches!(&err, PrepareError::Unreadable { path, .. } if path == &missing));
        assert!(err.to_string().starts_with("failed to read workflow"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_load_rejects_oversized_document() {
        let temp = repo(&[("ci.yml", CI)]);
        let preparer = WorkflowPreparer::new(
            PrepareOptions::default()
                .with_repo_root(temp.path())
                .with_max_document_bytes(16),
        );
        let path = temp.path().join(DEFAULT_WORKFLOWS_DIR).join("ci.yml");
        assert!(matches!(
            preparer.load(&path),
            Err(PrepareError::TooLarge { limit: 16, .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_load_rejects_symlink() {
        let temp = repo(&[("ci.yml", CI)]);
        let dir = temp.path().join(DEFAULT_WORKFLOWS_DIR);
        std::os::unix::fs::symlink(dir.join("ci.yml"), dir.join("link.yml")).unwrap();

        assert!(matches!(
            preparer(temp.path()).load(&dir.join("link.yml")),
            Err(PrepareError::Symlink(_))
        ));
    }

    #[tokio::test]
    async fn test_prepare_writes_instrumented_documents() {
        let temp = repo(&[("ci.yml", CI), ("release.yml", RELEASE)]);
        let prepared = preparer(temp.path()).prepare().await.unwrap();

        let names: Vec<_> = prepared
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ci.yml", "release.yml"]);
        assert!(prepared.files.iter().all(|f| f.starts_with(prepared.path())));

        let ids: Vec<&str> = prepared.manifest.jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["build", "publish", "test"]);

        let host = prepared.host.as_ref().unwrap();
        assert_eq!(host.job_id, "build");

        let ci = WorkflowParser::from_file(prepared.path().join("ci.yml")).unwrap();
        let first = ci.jobs["build"].steps()[0].run.clone().unwrap();
        assert!(first.contains("::detent::manifest::v2::b64::"));

        let release = fs::read_to_string(prepared.path().join("release.yml")).unwrap();
        assert!(!release.contains("::detent::manifest"));
        assert!(release.contains("::detent::job-start::publish"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_directory_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = repo(&[("ci.yml", CI)]);
        let prepared = preparer(temp.path()).prepare().await.unwrap();
        let mode = fs::metadata(prepared.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn test_cleanup_removes_directory() {
        let temp = repo(&[("ci.yml", CI)]);
        let prepared = preparer(temp.path()).prepare().await.unwrap();
        let path = prepared.path().to_path_buf();
        assert!(path.exists());

        prepared.cleanup().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_invalid_document_fails_whole_batch() {
        let temp = repo(&[("ci.yml", CI), ("zz.yml", "not: [valid\n")]);
        let err = preparer(temp.path()).prepare().await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Prepare(PrepareError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_prepare_paths_disambiguates_names() {
        let temp = repo(&[]);
        let root = temp.path();
        fs::create_dir_all(root.join("one")).unwrap();
        fs::create_dir_all(root.join("two")).unwrap();
        fs::write(root.join("one/ci.yml"), CI).unwrap();
        fs::write(root.join("two/ci.yml"), RELEASE).unwrap();

        let prepared = preparer(root)
            .prepare_paths(&[root.join("one/ci.yml"), root.join("two/ci.yml")])
            .await
            .unwrap();
        assert_eq!(prepared.files.len(), 2);
        assert!(prepared.path().join("ci.yml").exists());
        assert!(prepared.path().join("ci-2.yml").exists());
    }

    #[tokio::test]
    async fn test_skip_override_moves_manifest_host() {
        let temp = repo(&[("ci.yml", CI)]);
        let mut overrides = JobOverrides::new();
        overrides.insert("build", JobOverride::Skip);

        let prepared = WorkflowPreparer::new(
            PrepareOptions::default()
                .with_repo_root(temp.path())
                .with_overrides(overrides),
        )
        .prepare()
        .await
        .unwrap();

        assert_eq!(prepared.host.as_ref().unwrap().job_id, "test");
    }

    #[test]
    fn test_manifest_without_writing() {
        let temp = repo(&[("ci.yml", CI)]);
        let manifest = preparer(temp.path()).manifest().unwrap();
        assert_eq!(manifest.jobs.len(), 2);
        assert_eq!(manifest.jobs[1].needs, vec!["build"]);
    }
}
