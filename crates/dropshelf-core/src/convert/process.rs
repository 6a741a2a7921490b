use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ConversionError;

#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Run an external tool with a hard time limit.
///
/// Each output stream keeps at most `max_output` bytes; the rest is drained and
/// discarded so the child never blocks on a full pipe.
pub async fn run_tool(
    program: &Path,
    args: &[&OsStr],
    limit: Duration,
    max_output: u64,
) -> Result<ToolOutput, ConversionError> {
    let tool = tool_name(program);
    debug!("Running {} {:?}", program.display(), args);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                ConversionError::ToolMissing { tool: tool.clone() }
            }
            _ => ConversionError::Io(e),
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let outcome = timeout(limit, async {
        let (stdout, stderr, status) = tokio::join!(
            read_capped(stdout, max_output),
            read_capped(stderr, max_output),
            child.wait()
        );
        Ok::<_, io::Error>(ToolOutput {
            status: status?,
            stdout: stdout?,
            stderr: stderr?,
        })
    })
    .await;

    match outcome {
        Ok(output) => Ok(output?),
        Err(_) => {
            let _ = child.kill().await;
            Err(ConversionError::Timeout {
                tool,
                secs: limit.as_secs(),
            })
        }
    }
}

async fn read_capped<R>(reader: Option<R>, max_output: u64) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };
    let mut buffer = Vec::new();
    (&mut reader).take(max_output).read_to_end(&mut buffer).await?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(buffer)
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .unwrap_or(program.as_os_str())
        .to_string_lossy()
        .into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_missing_program_is_tool_missing() {
        let err = run_tool(
            Path::new("/nonexistent/dropshelf-tool"),
            &[],
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConversionError::ToolMissing { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_timeout_kills_the_tool() {
        let sh = PathBuf::from("/bin/sh");
        let args = [OsStr::new("-c"), OsStr::new("sleep 10")];
        let err = run_tool(&sh, &args, Duration::from_millis(200), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::Timeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let sh = PathBuf::from("/bin/sh");
        let args = [
            OsStr::new("-c"),
            OsStr::new("i=0; while [ $i -lt 2000 ]; do echo 0123456789; i=$((i+1)); done; exit 3"),
        ];
        let output = run_tool(&sh, &args, Duration::from_secs(10), 100)
            .await
            .unwrap();
        assert_eq!(output.stdout.len(), 100);
        assert_eq!(output.status.code(), Some(3));
    }
}
