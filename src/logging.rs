use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Lines kept for slow `/api/logs` subscribers before they start lagging.
pub(crate) const LOG_BUFFER: usize = 500;

/// Writes every formatted log line to stdout and to a broadcast channel
/// that feeds the live log stream.
#[derive(Clone)]
pub(crate) struct LogMirror {
    pub sender: broadcast::Sender<String>,
    pub suppress_stdout: bool,
}

impl<'a> MakeWriter<'a> for LogMirror {
    type Writer = LogMirrorWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogMirrorWriter {
            sender: self.sender.clone(),
            suppress_stdout: self.suppress_stdout,
        }
    }
}

pub(crate) struct LogMirrorWriter {
    sender: broadcast::Sender<String>,
    suppress_stdout: bool,
}

impl std::io::Write for LogMirrorWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf).trim_end().to_string();
        let _ = self.sender.send(line); // no subscribers is fine
        if !self.suppress_stdout {
            std::io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_stdout {
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}

/// Installs the global INFO subscriber and returns the sender behind the
/// log mirror.
pub(crate) fn init_logging() -> broadcast::Sender<String> {
    let (log_tx, _) = broadcast::channel::<String>(LOG_BUFFER);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(LogMirror {
            sender: log_tx.clone(),
            suppress_stdout: false,
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    log_tx
}
