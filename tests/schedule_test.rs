//! Start-delay and expiration schedules against the live queue.

use std::sync::Arc;
use std::time::Duration;

use grid_core::channel::{ChannelDescriptor, SystemInformation};
use grid_core::config::DriverConfig;
use grid_core::job::{ClientBundle, JobSchedule, JobSla, JobStatus};
use grid_core::Driver;

fn delayed_bundle(name: &str, start: Option<Duration>, expire: Option<Duration>) -> ClientBundle {
    let sla = JobSla {
        start_schedule: start.map(JobSchedule::after),
        expiration_schedule: expire.map(JobSchedule::after),
        ..JobSla::default()
    };
    ClientBundle::new(name, 4).with_sla(sla)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_schedule_holds_the_job_until_it_elapses() {
    let driver = Driver::new(DriverConfig::default());
    let queue = driver.queue();
    let channel = ChannelDescriptor::new(SystemInformation::new());

    let job = queue
        .add_bundle(delayed_bundle("delayed", Some(Duration::from_millis(100)), None))
        .await
        .unwrap();
    assert!(job.is_pending());
    assert!(queue.select_job(&channel).await.is_none());
    assert!(queue.next_bundle(job.uuid(), 4).await.is_none());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!job.is_pending());
    assert!(queue.select_job(&channel).await.is_some());
    assert_eq!(queue.next_bundle(job.uuid(), 4).await.unwrap().task_count, 4);

    driver.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expiration_cancels_and_removes_the_job() {
    let driver = Driver::new(DriverConfig::default());
    let queue = driver.queue();

    let job = queue
        .add_bundle(delayed_bundle("doomed", None, Some(Duration::from_millis(100))))
        .await
        .unwrap();
    assert!(!job.is_expired());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(job.is_expired());
    assert_eq!(job.status(), JobStatus::Cancelled);
    assert!(queue.get_job(job.uuid()).await.is_none());

    driver.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removal_disarms_a_pending_expiration() {
    let driver = Driver::new(DriverConfig::default());
    let queue = driver.queue();

    let job = queue
        .add_bundle(delayed_bundle("reprieved", None, Some(Duration::from_millis(100))))
        .await
        .unwrap();
    queue.remove_job(job.uuid()).await.unwrap();
    assert_eq!(job.status(), JobStatus::Done);

    // Past the would-be deadline: the disarmed timer must not fire.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!job.is_expired());
    assert_eq!(job.status(), JobStatus::Done);

    driver.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn completion_before_the_start_delay_skips_the_flip() {
    let driver = Driver::new(DriverConfig::default());
    let queue = driver.queue();

    let job = queue
        .add_bundle(delayed_bundle("early-exit", Some(Duration::from_millis(100)), None))
        .await
        .unwrap();
    assert!(queue.cancel_job(job.uuid()).await);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(job.status(), JobStatus::Cancelled);
    // The start timer saw a finished job and left the pending flag alone.
    assert!(job.is_pending());

    driver.shutdown().await;
}
