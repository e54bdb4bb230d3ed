//! Drives one compilation: locates files, converts them in parallel up
//! to the bounded permit pool (spec.md §5), then runs the strictly
//! serial linker/checker/back-translator/codegen tail. Concurrency here
//! mirrors the teacher's orchestrator: an `Arc<Semaphore>` gating
//! `tokio::spawn`ed tasks, joined with `futures::future::join_all`.

use crate::error::{IdlcError, Reporter};
use crate::model::Image;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Environment access is injected rather than read directly from
/// `std::env`, so tests can supply a fixed environment (spec.md §6: "an
/// injected `LookupEnv` hook is honored for testability").
pub type LookupEnv = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

fn default_lookup_env() -> LookupEnv {
    Arc::new(|key: &str| std::env::var(key).ok())
}

#[derive(Clone)]
pub struct CompileOptions {
    /// Root directories searched in order for `import` paths (spec.md
    /// §6): the first root containing a matching file wins. `IDLC_ROOT`,
    /// if set, is consulted last.
    pub roots: Vec<PathBuf>,
    /// Upper bound on in-flight per-file conversion tasks; defaults to
    /// `min(available_parallelism, configured_max)`.
    pub max_parallel_files: usize,
    pub lookup_env: LookupEnv,
}

impl std::fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOptions")
            .field("roots", &self.roots)
            .field("max_parallel_files", &self.max_parallel_files)
            .finish()
    }
}

impl CompileOptions {
    pub fn new(roots: Vec<PathBuf>, max_parallel_files: Option<usize>) -> Self {
        Self::with_lookup_env(roots, max_parallel_files, default_lookup_env())
    }

    pub fn with_lookup_env(roots: Vec<PathBuf>, max_parallel_files: Option<usize>, lookup_env: LookupEnv) -> Self {
        let cpu = num_cpus::get().max(1);
        let mut roots = roots;
        if let Some(extra) = lookup_env("IDLC_ROOT") {
            roots.push(PathBuf::from(extra));
        }
        Self {
            roots,
            max_parallel_files: max_parallel_files.unwrap_or(cpu).min(cpu.max(1)).max(1),
            lookup_env,
        }
    }
}

fn resolve_against_roots(roots: &[PathBuf], relative: &str) -> Option<PathBuf> {
    for root in roots {
        let candidate = root.join(relative);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    let bare = PathBuf::from(relative);
    bare.is_file().then_some(bare)
}

fn is_legacy_dialect(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("proto")
}

async fn read_and_convert_native(path: PathBuf, reporter: Arc<Reporter>) -> Option<crate::model::Module> {
    let uri = path.to_string_lossy().to_string();
    let source = match tokio::fs::read_to_string(&path).await {
        Ok(s) => s,
        Err(e) => {
            reporter.report(
                crate::error::DiagnosticCode::UnsupportedFileFormat,
                crate::span::Location::new(uri.clone(), crate::span::Span::file_start()),
                format!("could not read {}: {e}", path.display()),
            );
            return None;
        }
    };
    let ast = crate::parser::parse_source(&source, uri.clone(), &reporter);
    Some(crate::convert::native::convert_module(&ast, &uri, &reporter))
}

async fn read_and_convert_legacy(
    path: PathBuf,
    roots: Vec<PathBuf>,
    reporter: Arc<Reporter>,
) -> Option<crate::model::Module> {
    let uri = path.to_string_lossy().to_string();
    let path_clone = path.clone();
    let parsed = tokio::task::spawn_blocking(move || {
        crate::convert::legacy::parse_legacy_file(&path_clone, &roots)
    })
    .await
    .ok()?;
    match parsed {
        Ok(set) => {
            let fd = set.file.last()?;
            Some(crate::convert::legacy::convert_legacy_file(fd, &uri, &reporter))
        }
        Err(e) => {
            reporter.report(
                crate::error::DiagnosticCode::UnsupportedFileFormat,
                crate::span::Location::new(uri.clone(), crate::span::Span::file_start()),
                format!("legacy parse failed: {e}"),
            );
            None
        }
    }
}

/// Converts every input file to a `Module`, embarrassingly parallel
/// (spec.md §5): native-dialect files never look at each other before
/// linking, so each gets its own bounded task.
pub async fn load_and_convert(
    entry_files: &[String],
    options: &CompileOptions,
    reporter: Arc<Reporter>,
) -> Result<Image, IdlcError> {
    let semaphore = Arc::new(Semaphore::new(options.max_parallel_files));
    let mut tasks = Vec::new();

    for entry in entry_files {
        let Some(path) = resolve_against_roots(&options.roots, entry) else {
            return Err(IdlcError::FileNotFound { path: PathBuf::from(entry) });
        };
        let semaphore = Arc::clone(&semaphore);
        let reporter = Arc::clone(&reporter);
        let roots = options.roots.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            debug!(file = %path.display(), "converting");
            if is_legacy_dialect(&path) {
                read_and_convert_legacy(path, roots, reporter).await
            } else {
                read_and_convert_native(path, reporter).await
            }
        }));
    }

    let results = futures::future::join_all(tasks).await;
    let mut image = Image::new();
    for result in results {
        match result {
            Ok(Some(module)) => {
                image.modules.insert(module.uid, module);
            }
            Ok(None) => {}
            Err(join_err) => {
                return Err(IdlcError::Other(anyhow::anyhow!("file task panicked: {join_err}")));
            }
        }
    }
    info!(modules = image.modules.len(), "conversion complete");
    Ok(image)
}

/// The strictly serial tail: link, type-check, and (optionally)
/// back-translate. One thread, one pass, in this exact order (spec.md
/// §5).
pub fn link_and_check(image: &mut Image, reporter: &Reporter) {
    crate::linker::link(image, reporter);
    crate::typecheck::check(image, reporter);
}

/// Spawns an external code-generator plugin, writes the serialized
/// request to its stdin, and reads the response from its stdout
/// (spec.md §6). Plugin stderr is mirrored to this process's own.
pub async fn invoke_plugin(
    plugin_path: &str,
    request: &crate::wire::CodeGeneratorRequest,
) -> Result<crate::wire::CodeGeneratorResponse, IdlcError> {
    use prost::Message;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::process::Command;

    let mut child = Command::new(plugin_path)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| IdlcError::PluginSpawn { name: plugin_path.to_string(), source: e })?;

    let bytes = request.encode_to_vec();
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(&bytes)
            .await
            .map_err(|e| IdlcError::Io { path: PathBuf::from(plugin_path), source: e })?;
    }

    if let Some(mut stderr) = child.stderr.take() {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf).await;
        if !buf.is_empty() {
            warn!(plugin = plugin_path, "{buf}");
        }
    }

    let mut stdout_bytes = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout
            .read_to_end(&mut stdout_bytes)
            .await
            .map_err(|e| IdlcError::Io { path: PathBuf::from(plugin_path), source: e })?;
    }

    let status = child
        .wait()
        .await
        .map_err(|e| IdlcError::Io { path: PathBuf::from(plugin_path), source: e })?;
    if !status.success() {
        return Err(IdlcError::PluginFailed {
            name: plugin_path.to_string(),
            message: format!("exited with {status}"),
        });
    }

    crate::wire::CodeGeneratorResponse::decode(stdout_bytes.as_slice())
        .map_err(|_| IdlcError::PluginFailed {
            name: plugin_path.to_string(),
            message: "could not decode plugin response".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_and_links_a_single_native_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.mgdl");
        tokio::fs::write(&file, "syntax = \"mglot0\"\nmodule = @1\nstruct S { } @1")
            .await
            .unwrap();

        let options = CompileOptions::new(vec![dir.path().to_path_buf()], Some(2));
        let reporter = Arc::new(Reporter::new());
        let mut image = load_and_convert(
            &["m.mgdl".to_string()],
            &options,
            Arc::clone(&reporter),
        )
        .await
        .unwrap();
        link_and_check(&mut image, &reporter);
        assert!(reporter.is_empty());
        assert_eq!(image.modules.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_reported_as_not_found() {
        let options = CompileOptions::new(vec![], None);
        let reporter = Arc::new(Reporter::new());
        let result = load_and_convert(&["nope.mgdl".to_string()], &options, reporter).await;
        assert!(matches!(result, Err(IdlcError::FileNotFound { .. })));
    }
}
