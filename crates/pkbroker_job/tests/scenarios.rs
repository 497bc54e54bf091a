//! End-to-end job runs: a worker thread reporting through the bridge to a
//! dispatcher on the test thread.
//!
//! `#[tokio::test]` uses a current-thread runtime, so the test thread is the
//! dispatch thread.

mod common;

use anyhow::Result;
use common::{dispatch_until_finished, Recorder, BASH};
use pkbroker_job::{Dispatcher, EngineConfig, EventKind, Job, JobError, JobEvent, JobId};
use pkbroker_protocol::{ErrorCode, ErrorKind, Exit, Info, Package, Role, Status};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn new_job() -> (Dispatcher, Job) {
    let (dispatcher, bridge) = Dispatcher::new();
    let job = Job::new(JobId::new(1), bridge, Arc::new(EngineConfig::default()));
    (dispatcher, job)
}

#[tokio::test]
async fn test_search_job_event_order() -> Result<()> {
    let (mut dispatcher, job) = new_job();
    let recorder = Recorder::new();
    // handlers go in before set_role so the WAIT status is observed
    recorder.attach(
        &job,
        &[EventKind::StatusChanged, EventKind::Package, EventKind::Finished],
    );
    job.set_role(Role::SearchName);

    job.thread_create(|job, _| {
        job.set_status(Status::Query);
        job.package(Info::Available, BASH, "GNU Bourne shell");
    })?;
    dispatch_until_finished(&mut dispatcher, &recorder, 1).await?;

    assert_eq!(
        recorder.events(),
        vec![
            JobEvent::StatusChanged(Status::Wait),
            JobEvent::StatusChanged(Status::Query),
            JobEvent::Package(Package {
                info: Info::Available,
                package_id: BASH.to_string(),
                summary: "GNU Bourne shell".to_string(),
            }),
            JobEvent::StatusChanged(Status::Finished),
            JobEvent::Finished(Exit::Success),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_error_without_finish_is_finished_by_launcher() -> Result<()> {
    let (mut dispatcher, job) = new_job();
    let recorder = Recorder::new();
    recorder.attach(&job, &[EventKind::ErrorCode, EventKind::Finished]);
    job.set_role(Role::Resolve);

    job.thread_create(|job, _| {
        job.error_code(ErrorKind::PackageNotFound, "no such package");
    })?;
    dispatch_until_finished(&mut dispatcher, &recorder, 1).await?;

    assert_eq!(
        recorder.events(),
        vec![
            JobEvent::ErrorCode(ErrorCode {
                code: ErrorKind::PackageNotFound,
                details: "no such package".to_string(),
            }),
            JobEvent::Finished(Exit::Failed),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_cancellation_does_not_classify_exit() -> Result<()> {
    let (mut dispatcher, job) = new_job();
    let recorder = Recorder::new();
    recorder.attach(&job, &[EventKind::Finished, EventKind::ErrorCode]);
    job.set_role(Role::InstallPackages);

    let polls = Arc::new(AtomicUsize::new(0));
    let worker_polls = Arc::clone(&polls);
    job.thread_create(move |job, _| {
        let token = job.cancellable();
        while !token.is_cancelled() {
            worker_polls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
        }
    })?;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!job.view().is_finished());
    job.cancel();
    dispatch_until_finished(&mut dispatcher, &recorder, 1).await?;

    assert!(polls.load(Ordering::SeqCst) > 0);
    assert_eq!(recorder.events(), vec![JobEvent::Finished(Exit::Success)]);
    assert_eq!(job.view().exit(), Exit::Success);
    Ok(())
}

#[tokio::test]
async fn test_only_one_worker_per_job() -> Result<()> {
    let (mut dispatcher, job) = new_job();
    let recorder = Recorder::new();
    recorder.attach(&job, &[EventKind::Finished]);
    job.set_role(Role::RefreshCache);

    let runs = Arc::new(AtomicUsize::new(0));
    let first = Arc::clone(&runs);
    job.thread_create(move |_, _| {
        first.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
    })?;
    let second = Arc::clone(&runs);
    let refused = job.thread_create(move |_, _| {
        second.fetch_add(1, Ordering::SeqCst);
    });
    assert!(matches!(refused, Err(JobError::ThreadAlreadyRunning(_))));

    dispatch_until_finished(&mut dispatcher, &recorder, 1).await?;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.count(EventKind::Finished), 1);
    Ok(())
}

#[tokio::test]
async fn test_reset_allows_requeue() -> Result<()> {
    let (mut dispatcher, job) = new_job();
    let recorder = Recorder::new();
    recorder.attach(&job, &[EventKind::Finished]);
    job.set_role(Role::GetUpdates);
    job.set_parameters(serde_json::json!({"args": ["kernel"]}));

    job.thread_create(|job, _| job.error_code(ErrorKind::LockRequired, "database locked"))?;
    dispatch_until_finished(&mut dispatcher, &recorder, 1).await?;
    assert_eq!(recorder.events(), vec![JobEvent::Finished(Exit::Failed)]);

    // wait for the worker to fully exit before requeueing
    while job.view().is_worker_running() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    job.reset();
    assert!(!job.get_vfunc_enabled(EventKind::Finished));

    let second = Recorder::new();
    second.attach(&job, &[EventKind::Finished, EventKind::Package]);
    job.set_role(Role::GetUpdates);
    job.thread_create(|job, params| {
        assert_eq!(params["args"][0], "kernel");
        job.package(Info::Security, "kernel;6.9.2;x86_64;updates", "The Linux kernel");
    })?;
    dispatch_until_finished(&mut dispatcher, &second, 1).await?;

    assert_eq!(second.count(EventKind::Package), 1);
    assert_eq!(second.events().last(), Some(&JobEvent::Finished(Exit::Success)));
    Ok(())
}

#[tokio::test]
async fn test_two_jobs_keep_their_own_order() -> Result<()> {
    let (mut dispatcher, bridge) = Dispatcher::new();
    let config = Arc::new(EngineConfig::default());
    let a = Job::new(JobId::new(1), bridge.clone(), Arc::clone(&config));
    let b = Job::new(JobId::new(2), bridge, config);
    let recorder = Recorder::new();
    recorder.attach(&a, &[EventKind::Percentage, EventKind::Finished]);
    recorder.attach(&b, &[EventKind::Percentage, EventKind::Finished]);

    for job in [&a, &b] {
        job.set_role(Role::RefreshCache);
        job.thread_create(|job, _| {
            for pct in (0..=100).step_by(10) {
                job.set_percentage(pct);
            }
        })?;
    }
    dispatch_until_finished(&mut dispatcher, &recorder, 2).await?;

    for id in [a.id(), b.id()] {
        let events = recorder.events_for(id);
        let mut expected: Vec<JobEvent> =
            (0..=100).step_by(10).map(JobEvent::Percentage).collect();
        expected.push(JobEvent::Finished(Exit::Success));
        assert_eq!(events, expected, "job {}", id);
    }
    Ok(())
}

#[tokio::test]
async fn test_thread_create_off_dispatch_thread() -> Result<()> {
    let (_dispatcher, job) = new_job();
    let job = Arc::new(job);
    let remote = Arc::clone(&job);
    let result = std::thread::spawn(move || remote.thread_create(|_, _| {}).is_err())
        .join()
        .map_err(|_| anyhow::anyhow!("remote thread panicked"))?;
    assert!(result);
    assert!(!job.view().has_thread());
    Ok(())
}
