//! Image Vault - Resize Transformers
//!
//! Pixel resizing is delegated to an external tool run as a subprocess.
//! ImageMagick and GraphicsMagick are interchangeable; they differ only in
//! how the command line is spelled.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::error::{VaultError, VaultResult};

/// How often a running tool is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Longest stderr excerpt carried in an error
const MAX_STDERR: usize = 512;

/// Bytes of stderr buffered; enough for `MAX_STDERR` multi-byte chars
const STDERR_BYTES: usize = MAX_STDERR * 4;

/// Resizes an image file on disk
pub trait ImageTransformer: Send + Sync {
    /// Human-readable tool name, used in errors and logs
    fn name(&self) -> &str;

    /// Resize `input` to fit `width`x`height`, writing the result to `output`.
    ///
    /// Blocks until the tool exits. Returns `output` on success.
    fn resize(&self, input: &Path, width: u32, height: u32, output: &Path) -> VaultResult<PathBuf>;
}

/// Selectable resize backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformerBackend {
    ImageMagick,
    GraphicsMagick,
}

/// Build the configured transformer. Called once at startup.
pub fn build_transformer(config: &ServiceConfig) -> Box<dyn ImageTransformer> {
    let timeout = config.transform_timeout();
    match config.transformer {
        TransformerBackend::ImageMagick => {
            let mut t = ImageMagickTransformer::new(timeout);
            if let Some(program) = &config.transformer_program {
                t = t.with_program(program);
            }
            Box::new(t)
        }
        TransformerBackend::GraphicsMagick => {
            let mut t = GraphicsMagickTransformer::new(timeout);
            if let Some(program) = &config.transformer_program {
                t = t.with_program(program);
            }
            Box::new(t)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// IMAGEMAGICK
// ═══════════════════════════════════════════════════════════════════════════

/// `magick <in> -resize WxH <out>`
#[derive(Debug, Clone)]
pub struct ImageMagickTransformer {
    program: PathBuf,
    timeout: Duration,
}

impl ImageMagickTransformer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("magick"),
            timeout,
        }
    }

    pub fn with_program<P: AsRef<Path>>(mut self, program: P) -> Self {
        self.program = program.as_ref().to_path_buf();
        self
    }

    fn args(input: &Path, width: u32, height: u32, output: &Path) -> Vec<OsString> {
        vec![
            input.as_os_str().to_owned(),
            "-resize".into(),
            geometry(width, height).into(),
            output.as_os_str().to_owned(),
        ]
    }
}

impl ImageTransformer for ImageMagickTransformer {
    fn name(&self) -> &str {
        "ImageMagick"
    }

    fn resize(&self, input: &Path, width: u32, height: u32, output: &Path) -> VaultResult<PathBuf> {
        check_target(width, height)?;
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(input, width, height, output));
        run_tool(self.name(), &mut cmd, self.timeout, output)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// GRAPHICSMAGICK
// ═══════════════════════════════════════════════════════════════════════════

/// `gm convert <in> -resize WxH <out>`
#[derive(Debug, Clone)]
pub struct GraphicsMagickTransformer {
    program: PathBuf,
    timeout: Duration,
}

impl GraphicsMagickTransformer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("gm"),
            timeout,
        }
    }

    pub fn with_program<P: AsRef<Path>>(mut self, program: P) -> Self {
        self.program = program.as_ref().to_path_buf();
        self
    }

    fn args(input: &Path, width: u32, height: u32, output: &Path) -> Vec<OsString> {
        vec![
            "convert".into(),
            input.as_os_str().to_owned(),
            "-resize".into(),
            geometry(width, height).into(),
            output.as_os_str().to_owned(),
        ]
    }
}

impl ImageTransformer for GraphicsMagickTransformer {
    fn name(&self) -> &str {
        "GraphicsMagick"
    }

    fn resize(&self, input: &Path, width: u32, height: u32, output: &Path) -> VaultResult<PathBuf> {
        check_target(width, height)?;
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(input, width, height, output));
        run_tool(self.name(), &mut cmd, self.timeout, output)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SUBPROCESS
// ═══════════════════════════════════════════════════════════════════════════

fn geometry(width: u32, height: u32) -> String {
    format!("{}x{}", width, height)
}

fn check_target(width: u32, height: u32) -> VaultResult<()> {
    if width == 0 || height == 0 {
        return Err(VaultError::InvalidTargetSize { width, height });
    }
    Ok(())
}

/// Read a pipe to EOF, keeping only the head.
///
/// The tool blocks once the pipe buffer fills, so the pipe is emptied while
/// the tool runs rather than after it exits.
fn drain<R: Read>(mut pipe: R) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let room = STDERR_BYTES.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    kept
}

/// Run the tool to completion or until `timeout`, then check its output.
fn run_tool(tool: &str, cmd: &mut Command, timeout: Duration, output: &Path) -> VaultResult<PathBuf> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| VaultError::Transform {
            tool: tool.to_string(),
            code: None,
            message: format!("failed to start: {}", e),
        })?;

    let stderr_reader = child.stderr.take().map(|pipe| thread::spawn(move || drain(pipe)));

    let deadline = Instant::now() + timeout;
    let status: ExitStatus = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            log::warn!("{} killed after {:?}", tool, timeout);
            return Err(VaultError::TransformTimeout {
                tool: tool.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stderr = stderr_reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default();

    if !status.success() {
        let message: String = String::from_utf8_lossy(&stderr)
            .trim()
            .chars()
            .take(MAX_STDERR)
            .collect();
        log::warn!("{} exited with {:?}: {}", tool, status.code(), message);
        return Err(VaultError::Transform {
            tool: tool.to_string(),
            code: status.code(),
            message,
        });
    }

    let written = std::fs::metadata(output).map(|m| m.len() > 0).unwrap_or(false);
    if !written {
        return Err(VaultError::Transform {
            tool: tool.to_string(),
            code: status.code(),
            message: format!("no output written to {}", output.display()),
        });
    }

    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn test_command_lines() {
        let input = Path::new("/work/in.jpg");
        let output = Path::new("/work/out.jpg");

        let lossy = |args: Vec<OsString>| -> Vec<String> {
            args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
        };

        let im = lossy(ImageMagickTransformer::args(input, 50, 40, output));
        assert_eq!(im, vec!["/work/in.jpg", "-resize", "50x40", "/work/out.jpg"]);

        let gm = lossy(GraphicsMagickTransformer::args(input, 50, 40, output));
        assert_eq!(
            gm,
            vec!["convert", "/work/in.jpg", "-resize", "50x40", "/work/out.jpg"]
        );
    }

    #[test]
    fn test_backend_selection() {
        let mut config = ServiceConfig::default();
        assert_eq!(build_transformer(&config).name(), "ImageMagick");

        config.transformer = TransformerBackend::GraphicsMagick;
        assert_eq!(build_transformer(&config).name(), "GraphicsMagick");
    }

    #[test]
    fn test_zero_target_rejected() {
        let t = ImageMagickTransformer::new(TIMEOUT).with_program("/definitely/not/here");
        let err = t
            .resize(Path::new("in"), 0, 10, Path::new("out"))
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidTargetSize { width: 0, height: 10 }));
    }

    #[test]
    fn test_missing_binary() {
        let dir = tempdir().unwrap();
        let t = GraphicsMagickTransformer::new(TIMEOUT).with_program(dir.path().join("no-gm"));
        let err = t
            .resize(&dir.path().join("in"), 10, 10, &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, VaultError::Transform { code: None, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_carries_code() {
        let dir = tempdir().unwrap();
        let t = ImageMagickTransformer::new(TIMEOUT).with_program("false");
        let err = t
            .resize(&dir.path().join("in"), 10, 10, &dir.path().join("out"))
            .unwrap_err();
        match err {
            VaultError::Transform { tool, code, .. } => {
                assert_eq!(tool, "ImageMagick");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    // `sh <in> -resize WxH <out>` runs the input file as a script with the
    // remaining arguments as $1..$3, which lets tests script the "tool".
    #[cfg(unix)]
    #[test]
    fn test_success_returns_output_path() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("tool.sh");
        std::fs::write(&script, "printf resized > \"$3\"\n").unwrap();
        let output = dir.path().join("out.jpg");

        let t = ImageMagickTransformer::new(TIMEOUT).with_program("sh");
        let result = t.resize(&script, 10, 10, &output).unwrap();

        assert_eq!(result, output);
        assert_eq!(std::fs::read(&output).unwrap(), b"resized");
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_zero_without_output_fails() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("tool.sh");
        std::fs::write(&script, "exit 0\n").unwrap();

        let t = ImageMagickTransformer::new(TIMEOUT).with_program("sh");
        let err = t
            .resize(&script, 10, 10, &dir.path().join("out.jpg"))
            .unwrap_err();
        assert!(matches!(err, VaultError::Transform { code: Some(0), .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_flood_still_reports_exit_code() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("tool.sh");
        std::fs::write(
            &script,
            "head -c 200000 /dev/zero | tr '\\0' x >&2\nexit 1\n",
        )
        .unwrap();

        let t = ImageMagickTransformer::new(Duration::from_secs(3)).with_program("sh");
        let err = t
            .resize(&script, 10, 10, &dir.path().join("out.jpg"))
            .unwrap_err();

        match err {
            VaultError::Transform { code, message, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(message.len(), MAX_STDERR);
                assert!(message.chars().all(|c| c == 'x'));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_stderr_kept() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("tool.sh");
        std::fs::write(&script, "printf 'bad \\377 input' >&2\nexit 2\n").unwrap();

        let t = ImageMagickTransformer::new(TIMEOUT).with_program("sh");
        let err = t
            .resize(&script, 10, 10, &dir.path().join("out.jpg"))
            .unwrap_err();

        match err {
            VaultError::Transform { code, message, .. } => {
                assert_eq!(code, Some(2));
                assert_eq!(message, "bad \u{FFFD} input");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_drain_keeps_head_only() {
        let data = vec![b'y'; STDERR_BYTES * 3];
        let kept = drain(&data[..]);
        assert_eq!(kept.len(), STDERR_BYTES);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_tool() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("tool.sh");
        std::fs::write(&script, "sleep 5\n").unwrap();

        let t = ImageMagickTransformer::new(Duration::from_millis(200)).with_program("sh");
        let started = Instant::now();
        let err = t
            .resize(&script, 10, 10, &dir.path().join("out.jpg"))
            .unwrap_err();

        assert!(matches!(err, VaultError::TransformTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
