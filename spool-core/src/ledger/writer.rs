use crossbeam::channel::{self, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crate::error::{Result, SpoolError};
use crate::ledger::transcript::{TranscriptSink, append_log};

struct AppendRequest {
    transcript: PathBuf,
    log: PathBuf,
    reply: Sender<Result<()>>,
}

/// Single thread that owns every transcript append in this process.
/// Workers hand it a request and block until it is on disk.
pub struct LedgerWriter {
    tx: Option<Sender<AppendRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl LedgerWriter {
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = channel::unbounded::<AppendRequest>();
        let handle = std::thread::Builder::new()
            .name("spool-ledger".into())
            .spawn(move || serve(rx))?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Stop accepting appends and wait for the writer to drain.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.tx.take();
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                tracing::error!("ledger writer thread panicked");
            }
        }
    }
}

fn serve(rx: Receiver<AppendRequest>) {
    for req in rx {
        let res = append_log(&req.transcript, &req.log);
        match &res {
            Ok(n) => tracing::debug!(
                transcript = %req.transcript.display(),
                bytes = n,
                "appended log"
            ),
            Err(e) => tracing::error!(
                transcript = %req.transcript.display(),
                error = %e,
                "append failed"
            ),
        }
        // The requester may have gone away; nothing to do about it here
        let _ = req.reply.send(res.map(|_| ()));
    }
}

impl TranscriptSink for LedgerWriter {
    fn append(&self, transcript: &Path, log: &Path) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(SpoolError::LedgerClosed)?;
        let (reply, done) = channel::bounded(1);
        tx.send(AppendRequest {
            transcript: transcript.to_path_buf(),
            log: log.to_path_buf(),
            reply,
        })
        .map_err(|_| SpoolError::LedgerClosed)?;
        done.recv().map_err(|_| SpoolError::LedgerClosed)?
    }
}

impl Drop for LedgerWriter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::transcript::separator;
    use std::sync::Arc;

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let tmp = tempfile::tempdir().unwrap();
        let transcript = tmp.path().join("raw.htar");
        let writer = Arc::new(LedgerWriter::spawn().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let writer = Arc::clone(&writer);
                let transcript = transcript.clone();
                let log = tmp.path().join(format!("raw.{i}.out"));
                let body: String = (0..50).map(|l| format!("job {i} line {l}\n")).collect();
                std::fs::write(&log, body).unwrap();
                std::thread::spawn(move || writer.append(&transcript, &log).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let text = std::fs::read_to_string(&transcript).unwrap();
        let sep = separator();
        let blocks: Vec<&str> = text
            .split(&format!("{sep}\n"))
            .filter(|b| !b.is_empty())
            .collect();
        assert_eq!(blocks.len(), 8);
        for block in blocks {
            let first = block.lines().next().unwrap();
            let job = first.split_whitespace().nth(1).unwrap();
            assert!(block.lines().all(|l| l.starts_with(&format!("#job {job} "))));
            assert_eq!(block.lines().count(), 50);
        }
    }

    #[test]
    fn append_after_shutdown_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = LedgerWriter::spawn().unwrap();
        writer.close();
        let err = writer
            .append(&tmp.path().join("t"), &tmp.path().join("l"))
            .unwrap_err();
        assert!(matches!(err, SpoolError::LedgerClosed));
    }
}
