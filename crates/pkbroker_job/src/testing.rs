//! Fixtures for unit tests: a job wired to a dispatcher on the test thread,
//! an event recorder and a log capture.

use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::event::{EventKind, JobEvent};
use crate::job::{Job, JobId};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
pub(crate) struct Recorder {
    events: Arc<Mutex<Vec<JobEvent>>>,
}

impl Recorder {
    pub(crate) fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }
}

pub(crate) struct TestJob {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) job: Job,
    pub(crate) recorder: Recorder,
}

impl TestJob {
    pub(crate) fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub(crate) fn with_config(config: EngineConfig) -> Self {
        let (dispatcher, bridge) = Dispatcher::new();
        let job = Job::new(JobId::new(1), bridge, Arc::new(config));
        Self {
            dispatcher,
            job,
            recorder: Recorder::default(),
        }
    }

    /// Record every event of `kinds`.
    pub(crate) fn listen(&self, kinds: &[EventKind]) {
        for kind in kinds {
            let recorder = self.recorder.clone();
            self.job.set_vfunc(*kind, move |_, event| {
                recorder.events.lock().unwrap().push(event.clone());
            });
        }
    }

    pub(crate) fn events(&self) -> Vec<JobEvent> {
        self.recorder.events()
    }
}

/// Collects formatted log lines emitted on the current thread.
#[derive(Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    pub(crate) fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }
}

pub(crate) struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}
