use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use folio_core::{CompletionRequest, CompletionService};
use folio_render::{draw, export};
use tracing::{debug, info};

/// Environment variable telling the completion program what it was sent.
pub const REQUEST_KIND_ENV: &str = "FOLIO_REQUEST_KIND";
/// Environment variable pointing at the PNG crop of a region request.
pub const REGION_IMAGE_ENV: &str = "FOLIO_REGION_IMAGE";

/// Runs an external program per request: context on stdin, answer on stdout.
pub struct CommandCompletion {
    argv: Vec<String>,
    scratch_dir: PathBuf,
}

impl CommandCompletion {
    pub fn new(argv: Vec<String>, scratch_dir: PathBuf) -> Result<Self> {
        if argv.is_empty() {
            bail!("completion command is empty");
        }
        Ok(Self { argv, scratch_dir })
    }

    fn region_image_path(&self, request: &CompletionRequest) -> Result<Option<PathBuf>> {
        let CompletionRequest::Region {
            page_index, image, ..
        } = request
        else {
            return Ok(None);
        };
        std::fs::create_dir_all(&self.scratch_dir).with_context(|| {
            format!("failed to create {}", self.scratch_dir.display())
        })?;
        let path = self
            .scratch_dir
            .join(format!("region-p{}-{}.png", page_index + 1, std::process::id()));
        export::write_png(&draw::to_canvas(image)?, &path)?;
        Ok(Some(path))
    }
}

#[async_trait]
impl CompletionService for CommandCompletion {
    async fn ask(&self, request: CompletionRequest) -> Result<String> {
        let image_path = self.region_image_path(&request)?;
        let argv = self.argv.clone();
        let kind = request.kind();
        let context = request.context_text();
        info!(kind, program = %argv[0], "sending completion request");

        tokio::task::spawn_blocking(move || run_program(&argv, kind, &context, image_path))
            .await
            .map_err(|err| anyhow!("completion task failed: {err}"))?
    }
}

fn run_program(
    argv: &[String],
    kind: &str,
    context: &str,
    image_path: Option<PathBuf>,
) -> Result<String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("completion command is empty"))?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .env(REQUEST_KIND_ENV, kind)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(path) = &image_path {
        cmd.env(REGION_IMAGE_ENV, path);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to run completion command: {program}"))?;
    if let Some(mut stdin) = child.stdin.take() {
        if let Err(err) = write_context(&mut stdin, context) {
            drop(stdin);
            abandon(&mut child);
            return Err(err).context("failed to send completion context");
        }
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "completion command exited with {}: {}",
            output.status,
            stderr.trim()
        );
    }
    let answer = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!(chars = answer.len(), "completion answered");
    Ok(answer)
}

/// Programs may answer without reading their input, so a closed pipe is not an error.
fn write_context(stdin: &mut impl Write, context: &str) -> std::io::Result<()> {
    match stdin.write_all(context.as_bytes()) {
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn abandon(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(%err, "completion command already exited");
    }
    if let Err(err) = child.wait() {
        debug!(%err, "failed to reap completion command");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use folio_core::{RenderImage, SelectionRegion};
    use tempfile::tempdir;

    fn shell(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn quote_context_goes_through_stdin() {
        let dir = tempdir().unwrap();
        let service = CommandCompletion::new(
            shell("printf '%s: ' \"$FOLIO_REQUEST_KIND\"; cat"),
            dir.path().to_path_buf(),
        )
        .unwrap();

        let answer = service
            .ask(CompletionRequest::Quote {
                text: "entropy bound".into(),
            })
            .await
            .unwrap();

        assert_eq!(answer, "quote: entropy bound");
    }

    #[tokio::test]
    async fn region_requests_carry_a_png_crop() {
        let dir = tempdir().unwrap();
        let service = CommandCompletion::new(
            shell("test -s \"$FOLIO_REGION_IMAGE\" && cat"),
            dir.path().to_path_buf(),
        )
        .unwrap();

        let answer = service
            .ask(CompletionRequest::Region {
                page_index: 1,
                region: SelectionRegion {
                    x: 10.0,
                    y: 20.0,
                    width: 30.0,
                    height: 40.0,
                },
                image: RenderImage {
                    width: 2,
                    height: 2,
                    pixels: vec![128; 16],
                },
            })
            .await
            .unwrap();

        assert_eq!(answer, "page 2 region x=10 y=20 w=30 h=40");
    }

    #[tokio::test]
    async fn failing_program_reports_stderr() {
        let dir = tempdir().unwrap();
        let service =
            CommandCompletion::new(shell("echo quota exceeded >&2; exit 3"), dir.path().into())
                .unwrap();

        let err = service
            .ask(CompletionRequest::Quote { text: "x".into() })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("quota exceeded"));
    }

    struct FailingWriter(std::io::ErrorKind);

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(self.0.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn closed_pipe_is_tolerated_but_other_write_errors_are_not() {
        assert!(write_context(&mut FailingWriter(std::io::ErrorKind::BrokenPipe), "x").is_ok());
        let err = write_context(&mut FailingWriter(std::io::ErrorKind::PermissionDenied), "x")
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn abandoned_child_is_killed_and_reaped() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();

        abandon(&mut child);

        let status = child.try_wait().unwrap().expect("child was reaped");
        assert!(!status.success());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandCompletion::new(Vec::new(), PathBuf::from("/tmp")).is_err());
    }
}
