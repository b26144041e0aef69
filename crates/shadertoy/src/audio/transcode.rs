use std::io::{self, Chain, Cursor, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::AudioError;

/// Sample rate of the canonical transcoded stream.
pub const TRANSCODE_RATE: u32 = 22000;
/// The transcoder downmixes to mono.
pub const TRANSCODE_CHANNELS: u16 = 1;

const PREFETCH_BYTES: usize = 8192;

/// Signed 16-bit little-endian mono PCM piped out of an `ffmpeg` child.
///
/// The child is killed and reaped when the stream is dropped.
pub struct TranscodedStream {
    child: Child,
    reader: Chain<Cursor<Vec<u8>>, ChildStdout>,
    stderr: Option<JoinHandle<String>>,
}

impl TranscodedStream {
    pub fn spawn(path: &Path) -> Result<Self, AudioError> {
        Self::spawn_program("ffmpeg", path)
    }

    /// Like [`TranscodedStream::spawn`] with a different transcoder binary.
    ///
    /// The first read happens here so that an unreadable input fails
    /// construction instead of producing a silent stream.
    pub fn spawn_program(program: &str, path: &Path) -> Result<Self, AudioError> {
        let rate = TRANSCODE_RATE.to_string();
        let channels = TRANSCODE_CHANNELS.to_string();
        let mut child = Command::new(program)
            .args(["-loglevel", "error", "-i"])
            .arg(path)
            .args(["-f", "s16le", "-acodec", "pcm_s16le"])
            .args(["-ac", channels.as_str(), "-ar", rate.as_str(), "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AudioError::Spawn {
                program: program.to_string(),
                source,
            })?;
        debug!(program, path = %path.display(), pid = child.id(), "spawned audio transcoder");

        let stderr = match child.stderr.take() {
            Some(mut pipe) => {
                let spawned = thread::Builder::new()
                    .name("transcode-stderr".into())
                    .spawn(move || {
                        let mut text = String::new();
                        let _ = pipe.read_to_string(&mut text);
                        text
                    });
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        reap(&mut child);
                        return Err(err.into());
                    }
                }
            }
            None => None,
        };
        let Some(mut stdout) = child.stdout.take() else {
            reap(&mut child);
            return Err(AudioError::InvalidStream(
                "transcoder stdout was not captured".into(),
            ));
        };

        let prefetch = match prefetch(&mut stdout) {
            Ok(bytes) => bytes,
            Err(err) => {
                reap(&mut child);
                return Err(err.into());
            }
        };
        let exhausted = prefetch.is_empty();
        let mut stream = Self {
            child,
            reader: Cursor::new(prefetch).chain(stdout),
            stderr,
        };
        if exhausted {
            stream.fail_if_unsuccessful(program, path)?;
        }
        Ok(stream)
    }

    /// Waits for the child once its output is exhausted and turns a failing
    /// exit into [`AudioError::Transcode`].
    fn fail_if_unsuccessful(&mut self, program: &str, path: &Path) -> Result<(), AudioError> {
        let status = self.child.wait()?;
        if status.success() {
            return Ok(());
        }
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        Err(AudioError::Transcode {
            program: program.to_string(),
            path: PathBuf::from(path),
            status,
            stderr: stderr.trim().to_string(),
        })
    }

    fn shutdown(&mut self) {
        reap(&mut self.child);
        if let Some(handle) = self.stderr.take() {
            if let Ok(text) = handle.join() {
                let text = text.trim();
                if !text.is_empty() {
                    warn!(stderr = text, "audio transcoder reported errors");
                }
            }
        }
    }
}

impl Read for TranscodedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Drop for TranscodedStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn reap(child: &mut Child) {
    if let Ok(None) = child.try_wait() {
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// Reads until some bytes arrive or the pipe reaches end of file.
fn prefetch(stdout: &mut ChildStdout) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; PREFETCH_BYTES];
    loop {
        match stdout.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                return Ok(buf);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn missing_transcoder_is_a_spawn_error() {
        let err = TranscodedStream::spawn_program(
            "shadecast-no-such-transcoder",
            Path::new("track.mp3"),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AudioError::Spawn { .. }));
        assert!(err.to_string().contains("is it installed and on PATH?"));
    }

    #[cfg(unix)]
    pub(crate) fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn failing_transcoder_reports_status_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(
            dir.path(),
            "fake-ffmpeg",
            "echo 'track.mp3: Invalid data found when processing input' >&2\nexit 1",
        );

        let err = TranscodedStream::spawn_program(program.to_str().unwrap(), Path::new("track.mp3"))
            .err()
            .unwrap();
        match err {
            AudioError::Transcode { status, stderr, .. } => {
                assert_eq!(status.code(), Some(1));
                assert!(stderr.contains("Invalid data"), "{stderr}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn successful_transcoder_streams_its_output() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "fake-ffmpeg", r"printf '\001\000\002\000'");

        let mut stream =
            TranscodedStream::spawn_program(program.to_str().unwrap(), Path::new("track.mp3"))
                .unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, [1, 0, 2, 0]);
    }

    #[cfg(unix)]
    #[test]
    fn empty_successful_output_is_a_silent_stream() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "fake-ffmpeg", "exit 0");

        let mut stream =
            TranscodedStream::spawn_program(program.to_str().unwrap(), Path::new("track.mp3"))
                .unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert!(bytes.is_empty());
    }
}
