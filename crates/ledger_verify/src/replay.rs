use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use ledger_core::{canonical_json_bytes, Digest, NodeManifest};
use ledger_store::{LedgerPaths, NodeRegistry, ObjectStore, StoreError};
use serde_json::json;

use crate::sandbox::SandboxSpec;

/// Conventional interpreter invocation when the manifest pins no runner.
const DEFAULT_RUNNER: &[&str] = &["python3"];

/// Child-poll interval for the timeout loop.
const WAIT_POLL: Duration = Duration::from_millis(20);

/// A completed replay execution. `matched` is the whole point: this
/// particular execution did (or did not) reproduce the claimed id.
/// Determinism is assumed, not enforced — a flaky transform shows up as
/// replay flakiness for operators to diagnose, never as a silent pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replayed {
    pub matched: bool,
    pub output_digest: Digest,
}

#[derive(Debug)]
pub enum ReplayError {
    /// Root/admission node: nothing to recompute.
    NoDerivation { id: Digest },
    /// Transform definition blob absent from the object store.
    MissingTransform { id: Digest, digest: Digest },
    /// Declared environment description absent from the object store.
    MissingEnvironment { id: Digest, digest: Digest },
    MissingParentObject { id: Digest, parent: Digest },
    /// Manifest unreadable or malformed; replay needs a trustworthy one.
    Manifest(StoreError),
    NonZeroExit {
        id: Digest,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    Timeout {
        id: Digest,
        limit: Duration,
        stdout: String,
        stderr: String,
    },
    OutputMissing {
        id: Digest,
        stdout: String,
        stderr: String,
    },
    Workspace { path: PathBuf, message: String },
    Spawn { program: String, message: String },
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::NoDerivation { id } => {
                write!(f, "node {} has no parents, nothing to replay", id)
            }
            ReplayError::MissingTransform { id, digest } => {
                write!(
                    f,
                    "missing transform definition {} for node {} (ingest with the transform bytes to make it replayable)",
                    digest, id
                )
            }
            ReplayError::MissingEnvironment { id, digest } => {
                write!(
                    f,
                    "missing environment description {} declared by node {} (store the lockfile/container recipe as a blob)",
                    digest, id
                )
            }
            ReplayError::MissingParentObject { id, parent } => {
                write!(f, "missing parent object {} for node {}", parent, id)
            }
            ReplayError::Manifest(err) => write!(f, "{}", err),
            ReplayError::NonZeroExit {
                id,
                code,
                stdout,
                stderr,
            } => {
                write!(f, "transform for {} failed (exit=", id)?;
                match code {
                    Some(code) => write!(f, "{})", code)?,
                    None => write!(f, "signal)")?,
                }
                write_captured(f, stdout, stderr)
            }
            ReplayError::Timeout {
                id,
                limit,
                stdout,
                stderr,
            } => {
                write!(
                    f,
                    "transform for {} exceeded the {}s replay timeout and was killed",
                    id,
                    limit.as_secs_f64()
                )?;
                write_captured(f, stdout, stderr)
            }
            ReplayError::OutputMissing { id, stdout, stderr } => {
                write!(f, "transform for {} produced no output file", id)?;
                write_captured(f, stdout, stderr)
            }
            ReplayError::Workspace { path, message } => {
                write!(f, "replay workspace error at {}: {}", path.display(), message)
            }
            ReplayError::Spawn { program, message } => {
                write!(f, "failed to spawn {}: {}", program, message)
            }
        }
    }
}

impl std::error::Error for ReplayError {}

/// Captured diagnostics are forwarded, never swallowed.
fn write_captured(f: &mut fmt::Formatter<'_>, stdout: &str, stderr: &str) -> fmt::Result {
    if !stdout.trim().is_empty() {
        write!(f, "\nstdout:\n{}", stdout.trim_end())?;
    }
    if !stderr.trim().is_empty() {
        write!(f, "\nstderr:\n{}", stderr.trim_end())?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Materialize into this directory instead of an ephemeral one. The
    /// directory is left in place afterwards (debugging aid).
    pub workdir: Option<PathBuf>,
    /// Keep the ephemeral workspace instead of cleaning it up.
    pub keep: bool,
    /// Kill the transform and fail the replay after this long.
    pub timeout: Option<Duration>,
}

/// Re-executes a node's declared derivation in a scoped workspace and
/// checks the produced bytes against the node id.
///
/// Argument contract (v0): the transform is invoked as
/// `<runner...> <transform> --parents-manifest <p> --parents-dir <d>
/// --params-path <pp> --out <o>` with the workspace as cwd. The subprocess
/// is untrusted; isolation comes from the injected [`SandboxSpec`].
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    registry: NodeRegistry,
    objects: ObjectStore,
    sandbox: SandboxSpec,
}

impl ReplayEngine {
    pub fn new(paths: LedgerPaths) -> Self {
        ReplayEngine {
            registry: NodeRegistry::new(paths.clone()),
            objects: ObjectStore::new(paths),
            sandbox: SandboxSpec::default(),
        }
    }

    pub fn with_sandbox(mut self, sandbox: SandboxSpec) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn replay(&self, id: &Digest) -> Result<Replayed, ReplayError> {
        self.replay_with(id, &ReplayOptions::default())
    }

    pub fn replay_with(
        &self,
        id: &Digest,
        options: &ReplayOptions,
    ) -> Result<Replayed, ReplayError> {
        let manifest = self.registry.get(id).map_err(ReplayError::Manifest)?;
        manifest.validate().map_err(|err| {
            ReplayError::Manifest(StoreError::CorruptManifest {
                id: *id,
                reason: err.to_string(),
            })
        })?;

        if manifest.parents.is_empty() {
            return Err(ReplayError::NoDerivation { id: *id });
        }

        let transform_digest = manifest.transform.digest;
        if !self.objects.contains(&transform_digest) {
            return Err(ReplayError::MissingTransform {
                id: *id,
                digest: transform_digest,
            });
        }
        if let Some(env_digest) = manifest.transform.env_digest {
            if !self.objects.contains(&env_digest) {
                return Err(ReplayError::MissingEnvironment {
                    id: *id,
                    digest: env_digest,
                });
            }
        }

        // Workspace: caller-provided (kept) or ephemeral. The TempDir guard
        // cleans up on every exit path, including errors and panics; `keep`
        // disarms it after a successful materialization decision.
        let mut tempdir = None;
        let workspace: PathBuf = match &options.workdir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|err| ReplayError::Workspace {
                    path: dir.clone(),
                    message: err.to_string(),
                })?;
                dir.clone()
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(&format!("ledger-replay-{}-", id.hex_prefix(8)))
                    .tempdir()
                    .map_err(|err| ReplayError::Workspace {
                        path: std::env::temp_dir(),
                        message: err.to_string(),
                    })?;
                let path = dir.path().to_path_buf();
                if options.keep {
                    // Disarm cleanup; the caller wants the evidence.
                    let _ = dir.keep();
                } else {
                    tempdir = Some(dir);
                }
                path
            }
        };
        let _cleanup = tempdir;

        self.run_in_workspace(id, &manifest, &workspace, options)
    }

    fn run_in_workspace(
        &self,
        id: &Digest,
        manifest: &NodeManifest,
        workspace: &Path,
        options: &ReplayOptions,
    ) -> Result<Replayed, ReplayError> {
        let ws_err = |path: &Path, err: std::io::Error| ReplayError::Workspace {
            path: path.to_path_buf(),
            message: err.to_string(),
        };

        // Ordered parent materialization: order is semantic, the index
        // prefix pins it on disk and in parents.json.
        let parents_dir = workspace.join("parents");
        fs::create_dir_all(&parents_dir).map_err(|err| ws_err(&parents_dir, err))?;

        let mut parent_entries = Vec::new();
        for (index, parent) in manifest.parents.iter().enumerate() {
            let bytes = match self.objects.get(parent) {
                Ok(bytes) => bytes,
                Err(StoreError::ObjectNotFound { digest }) => {
                    return Err(ReplayError::MissingParentObject {
                        id: *id,
                        parent: digest,
                    });
                }
                Err(err) => {
                    return Err(ReplayError::Workspace {
                        path: self.objects.object_path(parent),
                        message: err.to_string(),
                    });
                }
            };
            let file_name = format!("{:03}_{}.bin", index, parent);
            let dst = parents_dir.join(&file_name);
            fs::write(&dst, bytes).map_err(|err| ws_err(&dst, err))?;
            parent_entries.push(json!({
                "index": index,
                "id": parent.to_string(),
                "path": file_name,
            }));
        }

        let parents_manifest_path = workspace.join("parents.json");
        let mut parents_json = serde_json::to_string_pretty(&json!(parent_entries))
            .expect("parent entries serialize");
        parents_json.push('\n');
        fs::write(&parents_manifest_path, parents_json)
            .map_err(|err| ws_err(&parents_manifest_path, err))?;

        let params_path = workspace.join("params.json");
        let mut params_bytes = canonical_json_bytes(&manifest.transform.params);
        params_bytes.push(b'\n');
        fs::write(&params_path, params_bytes).map_err(|err| ws_err(&params_path, err))?;

        let transform_path = workspace.join(format!("transform_{}", manifest.transform.digest));
        let transform_bytes = self
            .objects
            .get(&manifest.transform.digest)
            .map_err(|_| ReplayError::MissingTransform {
                id: *id,
                digest: manifest.transform.digest,
            })?;
        fs::write(&transform_path, transform_bytes)
            .map_err(|err| ws_err(&transform_path, err))?;

        let out_path = workspace.join("out.bin");

        let mut argv: Vec<String> = match &manifest.transform.runner {
            Some(runner) => runner.clone(),
            None => DEFAULT_RUNNER.iter().map(|s| s.to_string()).collect(),
        };
        argv.push(transform_path.to_string_lossy().into_owned());
        for (flag, path) in [
            ("--parents-manifest", &parents_manifest_path),
            ("--parents-dir", &parents_dir),
            ("--params-path", &params_path),
            ("--out", &out_path),
        ] {
            argv.push(flag.to_string());
            argv.push(path.to_string_lossy().into_owned());
        }

        let mut cmd = self.sandbox.command(&argv);
        cmd.current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let program = cmd.get_program().to_string_lossy().into_owned();
        let mut child = cmd.spawn().map_err(|err| ReplayError::Spawn {
            program,
            message: err.to_string(),
        })?;

        // Drain pipes on threads so a chatty transform cannot deadlock the
        // timeout loop on a full pipe buffer.
        let stdout_reader = child.stdout.take().map(drain);
        let stderr_reader = child.stderr.take().map(drain);

        let deadline = options.timeout.map(|limit| Instant::now() + limit);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            let _ = child.kill();
                            let _ = child.wait();
                            break None;
                        }
                    }
                    std::thread::sleep(WAIT_POLL);
                }
                Err(err) => {
                    let _ = child.kill();
                    return Err(ReplayError::Spawn {
                        program: argv[0].clone(),
                        message: err.to_string(),
                    });
                }
            }
        };

        let stdout = collect(stdout_reader);
        let stderr = collect(stderr_reader);

        let status = match status {
            Some(status) => status,
            None => {
                return Err(ReplayError::Timeout {
                    id: *id,
                    limit: options.timeout.expect("timeout triggered"),
                    stdout,
                    stderr,
                });
            }
        };
        if !status.success() {
            return Err(ReplayError::NonZeroExit {
                id: *id,
                code: status.code(),
                stdout,
                stderr,
            });
        }

        let mut out_file = match File::open(&out_path) {
            Ok(file) => file,
            Err(_) => {
                return Err(ReplayError::OutputMissing {
                    id: *id,
                    stdout,
                    stderr,
                });
            }
        };
        let output_digest =
            Digest::of_reader(&mut out_file).map_err(|err| ws_err(&out_path, err))?;

        Ok(Replayed {
            matched: output_digest == *id,
            output_digest,
        })
    }
}

fn drain(mut stream: impl Read + Send + 'static) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> String {
    match handle {
        Some(handle) => String::from_utf8_lossy(&handle.join().unwrap_or_default()).into_owned(),
        None => String::new(),
    }
}
