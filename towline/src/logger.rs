use {
    crate::prelude::*,
    chrono::Utc,
    knotline::Knot,
    std::{
        fs::File,
        io::{BufWriter, Write},
        path::Path,
        sync::Mutex,
    },
};

/// Timestamped test-artifact logger.
///
/// This is the record of what a test run did (commands queued, sent,
/// completed; scripts started and finished), written per script so runs
/// can be correlated offline. Diagnostics belong to `tracing`; this sink
/// is test output. Timestamps are microsecond UTC so latency can be read
/// straight off the log.
pub struct GeneralLogger {
    sink: Mutex<Box<dyn Write + Send>>,
    /// Flush after every line. Slower, but nothing is lost when a SUT
    /// takes the harness down with it.
    unbuffered: bool,
}

impl GeneralLogger {
    pub fn to_file<P>(path: P, unbuffered: bool) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = File::create(path.as_ref())?;
        Ok(Self::to_writer(
            Box::new(BufWriter::new(file)),
            unbuffered,
        ))
    }

    pub fn to_writer(sink: Box<dyn Write + Send>, unbuffered: bool) -> Self {
        Self {
            sink: Mutex::new(sink),
            unbuffered,
        }
    }

    /// Appends one timestamped line.
    pub fn log(&self, message: &str) {
        let mut sink = self.sink.lock().unwrap();
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.6f");
        if let Err(err) = writeln!(sink, "[{}] {}", stamp, message) {
            warn!("test log write failed: {}", err);
            return;
        }
        if self.unbuffered {
            let _ = sink.flush();
        }
    }

    pub fn log_knot(&self, message: &Knot) {
        self.log(&message.to_string());
    }

    pub fn flush(&self) {
        let _ = self.sink.lock().unwrap().flush();
    }
}

impl Drop for GeneralLogger {
    fn drop(&mut self) {
        self.flush();
    }
}
