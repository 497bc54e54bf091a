#![allow(dead_code)]

use anyhow::{anyhow, Result};
use pkbroker_job::{Dispatcher, EventKind, Job, JobEvent, JobId};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

pub const BASH: &str = "bash;5.1;x86_64;main";

/// Records dispatched events across jobs, in dispatch order.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(JobId, JobEvent)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, job: &Job, kinds: &[EventKind]) {
        for kind in kinds {
            let events = Arc::clone(&self.events);
            job.set_vfunc(*kind, move |view, event| {
                events.lock().unwrap().push((view.id(), event.clone()));
            });
        }
    }

    pub fn attach_all(&self, job: &Job) {
        self.attach(job, &EventKind::ALL);
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn events_for(&self, id: JobId) -> Vec<JobEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(job, _)| *job == id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.kind() == kind)
            .count()
    }
}

/// Drive the dispatcher until `jobs` finished events were delivered, then
/// drain whatever else is queued.
pub async fn dispatch_until_finished(
    dispatcher: &mut Dispatcher,
    recorder: &Recorder,
    jobs: usize,
) -> Result<()> {
    timeout(Duration::from_secs(10), async {
        while recorder.count(EventKind::Finished) < jobs {
            if !dispatcher.dispatch_next().await {
                break;
            }
        }
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for {} finished events", jobs))?;
    dispatcher.dispatch_pending();
    Ok(())
}
