//! Moves events from whatever thread raised them to the one dispatch thread.
//!
//! Emission never blocks: a [`PostedTask`] is pushed onto one of two
//! unbounded channels and the emitter returns. The [`Dispatcher`] owns the
//! receiving ends and invokes handlers one task at a time, so handlers for a
//! job never run concurrently and always run on the thread that created the
//! dispatcher.
//!
//! `Finished` events travel on their own channel, which is only consulted
//! once the normal channel is empty. Everything a job posted before it
//! finished therefore reaches its handler first.

use crate::event::JobEvent;
use crate::job::{JobShared, JobView};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// An event waiting for the dispatch thread. Dropping it drops the payload
/// and the job reference.
pub(crate) struct PostedTask {
    pub(crate) job: Arc<JobShared>,
    pub(crate) event: JobEvent,
}

/// Sending half handed to every job.
#[derive(Clone)]
pub struct DispatchBridge {
    normal_tx: mpsc::UnboundedSender<PostedTask>,
    finished_tx: mpsc::UnboundedSender<PostedTask>,
    owner: ThreadId,
}

impl DispatchBridge {
    /// True when called on the thread that created the [`Dispatcher`].
    pub fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    pub(crate) fn post(&self, task: PostedTask) {
        let tx = match task.event {
            JobEvent::Finished(_) => &self.finished_tx,
            _ => &self.normal_tx,
        };
        if let Err(mpsc::error::SendError(task)) = tx.send(task) {
            warn!(
                "[Job {}] dispatcher is gone, dropping {} event",
                task.job.id,
                task.event.kind()
            );
        }
    }
}

/// Receiving half. Lives on the dispatch thread.
pub struct Dispatcher {
    normal_rx: mpsc::UnboundedReceiver<PostedTask>,
    finished_rx: mpsc::UnboundedReceiver<PostedTask>,
    /// Finished tasks pulled off their channel while the normal channel
    /// may still hold earlier events.
    parked: VecDeque<PostedTask>,
}

impl Dispatcher {
    /// Create the dispatcher and its bridge. The calling thread becomes the
    /// dispatch thread.
    ///
    /// The bridge is returned separately so the loop can notice when every
    /// sender is gone.
    pub fn new() -> (Self, DispatchBridge) {
        let (normal_tx, normal_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let bridge = DispatchBridge {
            normal_tx,
            finished_tx,
            owner: thread::current().id(),
        };
        (
            Self {
                normal_rx,
                finished_rx,
                parked: VecDeque::new(),
            },
            bridge,
        )
    }

    /// Run every task that is ready right now. Returns how many ran.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut count = 0;
        while let Some(task) = self.try_next() {
            run_task(task);
            count += 1;
        }
        count
    }

    /// Wait for the next task and run it. Returns `false` once every
    /// sender has been dropped and nothing is left.
    pub async fn dispatch_next(&mut self) -> bool {
        loop {
            if let Some(task) = self.try_next() {
                run_task(task);
                return true;
            }

            tokio::select! {
                biased;

                Some(task) = self.normal_rx.recv() => {
                    run_task(task);
                    return true;
                }

                Some(task) = self.finished_rx.recv() => {
                    // earlier events of the same job may have landed meanwhile
                    self.parked.push_back(task);
                }

                else => return false,
            }
        }
    }

    /// Main event loop - consumes self.
    ///
    /// Stops when `shutdown` fires (or its sender is dropped) or when every
    /// bridge is gone. Tasks already queued at shutdown are still delivered.
    pub async fn run(mut self, mut shutdown: mpsc::Receiver<()>) {
        info!("Dispatcher entering event loop...");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    let flushed = self.dispatch_pending();
                    info!("Shutdown signal received, flushed {} pending events", flushed);
                    break;
                }

                more = self.dispatch_next() => {
                    if !more {
                        info!("All job bridges dropped");
                        break;
                    }
                }
            }
        }

        info!("Dispatcher stopped");
    }

    fn try_next(&mut self) -> Option<PostedTask> {
        loop {
            if let Ok(task) = self.normal_rx.try_recv() {
                return Some(task);
            }
            if let Some(task) = self.parked.pop_front() {
                return Some(task);
            }
            match self.finished_rx.try_recv() {
                // re-check the normal channel before delivering it
                Ok(task) => self.parked.push_back(task),
                Err(_) => return None,
            }
        }
    }
}

fn run_task(task: PostedTask) {
    let PostedTask { job, event } = task;
    let kind = event.kind();

    // registration is re-read here: the handler may have been removed
    // after the task was posted
    let handler = job.lock_registry().handler(kind);
    match handler {
        Some(handler) => {
            debug!("[Job {}] dispatching {}", job.id, kind);
            let view = JobView::from_shared(Arc::clone(&job));
            handler(&view, &event);
        }
        None => warn!("[Job {}] no handler registered for posted {} event", job.id, kind),
    }
}
