//! External index source backed by a `locate`-style program.
//!
//! The program is run with the configured arguments followed by the search
//! root with a trailing slash. Its standard output is buffered until the
//! process exits and then parsed as one path per line. Anything written to
//! standard error is passed to the query as a notice. The exit status is
//! not inspected: an index program that finds nothing commonly exits
//! non-zero, and that is still an empty, successful search.

use super::{EntrySource, SourceEvent};
use crate::cancel::CancellationToken;
use crate::error::SourceError;
use crate::query::IndexOptions;
use crate::types::CandidateEntry;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

const READ_CHUNK: usize = 8192;

/// Runs the index program for one query.
pub struct ExternalIndex {
    root: PathBuf,
    options: IndexOptions,
    child: Arc<Mutex<Option<Child>>>,
    token: CancellationToken,
}

impl ExternalIndex {
    pub fn new(root: &Path, options: IndexOptions) -> Self {
        ExternalIndex {
            root: root.to_path_buf(),
            options,
            child: Arc::new(Mutex::new(None)),
            token: CancellationToken::new(),
        }
    }

    /// The search root as passed to the program
    fn root_argument(&self) -> String {
        let root = self.root.to_string_lossy();
        format!("{}/", root.trim_end_matches('/'))
    }
}

impl EntrySource for ExternalIndex {
    fn start(
        &mut self,
        sink: Sender<SourceEvent>,
        token: CancellationToken,
    ) -> Result<(), SourceError> {
        self.token = token.clone();
        let program = self.options.program.clone();
        let root = self.root_argument();
        debug!(
            program = %program,
            args = ?self.options.args,
            root = %root,
            "Spawning index program"
        );

        let mut child = Command::new(&program)
            .args(&self.options.args)
            .arg(&root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SourceError::spawn(&program, &e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *self.child.lock() = Some(child);

        let notices = stderr.map(|mut stderr| {
            let sink = sink.clone();
            thread::spawn(move || {
                let mut chunk = [0u8; READ_CHUNK];
                loop {
                    match stderr.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let text = String::from_utf8_lossy(&chunk[..n]).trim().to_string();
                            if !text.is_empty() && sink.send(SourceEvent::Notice(text)).is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        });

        let child = Arc::clone(&self.child);
        thread::spawn(move || {
            let mut output = Vec::new();
            if let Some(mut stdout) = stdout {
                let mut chunk = [0u8; READ_CHUNK];
                loop {
                    if token.is_cancelled() {
                        break;
                    }
                    match stdout.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => output.extend_from_slice(&chunk[..n]),
                        Err(e) => {
                            warn!(program = %program, error = %e, "Reading index output failed");
                            break;
                        }
                    }
                }
            }

            let finished = child.lock().take();
            if let Some(mut finished) = finished {
                if token.is_cancelled() {
                    let _ = finished.kill();
                }
                match finished.wait() {
                    Ok(status) => debug!(
                        program = %program,
                        %status,
                        bytes = output.len(),
                        "Index program exited"
                    ),
                    Err(e) => {
                        warn!(program = %program, error = %e, "Waiting for index program failed")
                    }
                }
            }

            // Notices belong before the terminal event
            if let Some(notices) = notices {
                let _ = notices.join();
            }

            if token.is_cancelled() {
                let _ = sink.send(SourceEvent::Finished(Err(SourceError::Cancelled)));
                return;
            }

            let entries = parse_index_output(&output);
            if !entries.is_empty() && sink.send(SourceEvent::Entries(entries)).is_err() {
                return;
            }
            let _ = sink.send(SourceEvent::Finished(Ok(())));
        });

        Ok(())
    }

    fn kill(&mut self) {
        self.token.cancel();
        if let Some(child) = self.child.lock().as_mut() {
            let _ = child.kill();
        }
    }

    fn name(&self) -> &'static str {
        "locate"
    }
}

impl Drop for ExternalIndex {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Split index program output into entries, one per non-empty line.
pub fn parse_index_output(output: &[u8]) -> Vec<CandidateEntry> {
    String::from_utf8_lossy(output)
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(CandidateEntry::from_path)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    type Outcome = (Vec<CandidateEntry>, Vec<String>, Result<(), SourceError>);

    fn run(options: IndexOptions, root: &str) -> Outcome {
        let (tx, rx) = unbounded();
        let mut index = ExternalIndex::new(Path::new(root), options);
        index.start(tx, CancellationToken::new()).unwrap();

        let mut entries = Vec::new();
        let mut notices = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                SourceEvent::Entries(batch) => entries.extend(batch),
                SourceEvent::Notice(text) => notices.push(text),
                SourceEvent::Finished(status) => return (entries, notices, status),
            }
        }
    }

    fn shell(script: &str) -> IndexOptions {
        IndexOptions {
            program: "sh".to_string(),
            // `sh -c script name root/`: the root becomes $1
            args: vec!["-c".to_string(), script.to_string(), "index".to_string()],
        }
    }

    #[test]
    fn test_parse_output_keeps_order() {
        let entries = parse_index_output(b"/a/b.txt\n/a/c.txt\n");
        let paths: Vec<_> = entries.iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/a/b.txt"), PathBuf::from("/a/c.txt")]);
        assert_eq!(entries[0].name, "b.txt");
    }

    #[test]
    fn test_parse_output_skips_blank_lines() {
        let entries = parse_index_output(b"\n/x\r\n\n/y");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, PathBuf::from("/x"));
        assert_eq!(entries[1].path, PathBuf::from("/y"));
        assert!(parse_index_output(b"").is_empty());
    }

    #[test]
    fn test_root_gets_trailing_slash() {
        let index = ExternalIndex::new(Path::new("/home/ada"), IndexOptions::default());
        assert_eq!(index.root_argument(), "/home/ada/");
        let index = ExternalIndex::new(Path::new("/home/ada/"), IndexOptions::default());
        assert_eq!(index.root_argument(), "/home/ada/");
    }

    #[cfg(unix)]
    #[test]
    fn test_program_output_becomes_entries() {
        let script = shell("printf '%sone.txt\\n%stwo.txt\\n' \"$1\" \"$1\"");
        let (entries, _, status) = run(script, "/srv");
        assert_eq!(status, Ok(()));
        let paths: Vec<_> = entries.iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/srv/one.txt"), PathBuf::from("/srv/two.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_ignored_and_stderr_reported() {
        let (entries, notices, status) = run(shell("echo 'no database' >&2; exit 1"), "/srv");
        assert_eq!(status, Ok(()));
        assert!(entries.is_empty());
        assert_eq!(notices, vec!["no database".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_terminates_program() {
        let (tx, rx) = unbounded();
        let mut index = ExternalIndex::new(Path::new("/srv"), shell("exec sleep 30"));
        index.start(tx, CancellationToken::new()).unwrap();

        let killed_at = std::time::Instant::now();
        index.kill();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                SourceEvent::Finished(status) => {
                    assert_eq!(status, Err(SourceError::Cancelled));
                    break;
                }
                SourceEvent::Entries(batch) => panic!("unexpected entries: {:?}", batch),
                SourceEvent::Notice(_) => {}
            }
        }
        assert!(killed_at.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_program_fails_start() {
        let options = IndexOptions {
            program: "trawl-no-such-index-program".to_string(),
            args: Vec::new(),
        };
        let (tx, _rx) = unbounded();
        let mut index = ExternalIndex::new(Path::new("/"), options);
        let err = index.start(tx, CancellationToken::new()).unwrap_err();
        assert!(matches!(err, SourceError::Spawn { code: 2, .. }));
    }
}
