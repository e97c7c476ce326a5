use anyhow::Result;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use backoffice_sync::clock::Clock;
use backoffice_sync::database::RecordStore;
use backoffice_sync::registry::EntityKind;
use backoffice_sync::scheduler::{next_run_after, RunTrigger, SchedulerError, SchedulerSettings};
use backoffice_sync::testing::{FlakyGateway, Harness, RecordingTransport};
use tokio::sync::broadcast;

#[tokio::test]
async fn run_all_visits_every_entity_in_order_with_delays() -> Result<()> {
    let harness = Harness::new();
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = harness.scheduler(transport.clone());

    let result = scheduler.run_all(RunTrigger::Manual).await?;

    assert_eq!(transport.calls(), EntityKind::ALL.to_vec());
    assert_eq!(result.trigger, RunTrigger::Manual);
    assert_eq!(result.entities.len(), EntityKind::ALL.len());
    assert_eq!(result.totals.succeeded as usize, EntityKind::ALL.len());
    assert_eq!(result.totals.imported as usize, EntityKind::ALL.len());

    let sleeps = harness.clock.sleeps();
    assert_eq!(sleeps.len(), EntityKind::ALL.len() - 1);
    assert!(sleeps.iter().all(|d| *d == Duration::from_secs(1)));
    assert!(result.duration_ms >= 1000 * (EntityKind::ALL.len() as u64 - 1));
    assert!(!scheduler.is_running());
    Ok(())
}

#[tokio::test]
async fn one_failing_entity_does_not_stop_the_run() -> Result<()> {
    let harness = Harness::new();
    let transport = Arc::new(RecordingTransport::new().fail_for(EntityKind::HomeVisit));
    let scheduler = harness.scheduler(transport.clone());

    let result = scheduler.run_all(RunTrigger::Scheduled).await?;

    assert_eq!(transport.calls().len(), EntityKind::ALL.len());
    assert_eq!(result.totals.failed, 1);
    assert_eq!(result.totals.succeeded as usize, EntityKind::ALL.len() - 1);

    let failed = result
        .entities
        .iter()
        .find(|e| e.entity == EntityKind::HomeVisit)
        .expect("home visits summarized");
    assert!(!failed.success);
    assert!(failed.error.as_deref().unwrap_or_default().contains("exploded"));

    let after = result
        .entities
        .iter()
        .position(|e| e.entity == EntityKind::HomeVisit)
        .map(|i| &result.entities[i + 1])
        .expect("entity after home visits");
    assert!(after.success);
    Ok(())
}

#[tokio::test]
async fn unknown_name_runs_nothing() -> Result<()> {
    let harness = Harness::new();
    let gateway = Arc::new(FlakyGateway::new(harness.sheets.clone()));
    let transport = harness.transport_over(harness.engine_over(gateway.clone()));
    let scheduler = harness.scheduler(transport);

    let err = scheduler.run_one("nonexistent").await.unwrap_err();
    assert!(matches!(err, SchedulerError::EntityNotFound(ref name) if name == "nonexistent"));
    assert_eq!(gateway.read_calls(), 0);
    assert_eq!(gateway.append_calls(), 0);
    assert_eq!(gateway.update_calls(), 0);
    for kind in EntityKind::ALL {
        assert_eq!(harness.store(*kind).count().await?, 0);
    }
    assert!(scheduler.status().await.last_run.is_none());
    Ok(())
}

#[tokio::test]
async fn spawned_loop_waits_for_the_hour_then_runs_everything() -> Result<()> {
    let harness = Harness::new();
    let transport = Arc::new(RecordingTransport::new());
    let settings = SchedulerSettings {
        enabled: true,
        ..Harness::settings()
    };
    let first_run = next_run_after(harness.clock.now(), settings.utc_offset);
    let until_first_run = (first_run - harness.clock.now()).to_std()?;
    let scheduler = harness.scheduler_with(transport.clone(), settings);

    // the hour wait plus one pause between each pair of entities
    harness.clock.park_after(EntityKind::ALL.len());
    let (shutdown, receiver) = broadcast::channel(1);
    let handle = scheduler.clone().spawn(receiver);

    harness.clock.wait_parked().await;
    shutdown.send(())?;
    handle.await?;

    let sleeps = harness.clock.sleeps();
    assert_eq!(sleeps[0], until_first_run);
    assert!(sleeps[1..].iter().all(|d| *d == Duration::from_secs(1)));
    assert_eq!(transport.calls(), EntityKind::ALL.to_vec());

    let status = scheduler.status().await;
    let last_run = status.last_run.expect("scheduled run recorded");
    assert_eq!(last_run.trigger, RunTrigger::Scheduled);
    assert_eq!(last_run.started_at, first_run);
    assert!(!status.running);
    Ok(())
}

#[tokio::test]
async fn run_one_resolves_display_names() -> Result<()> {
    let harness = Harness::new();
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = harness.scheduler(transport.clone());

    let report = scheduler.run_one("Asset Titles").await?;
    assert_eq!(report.entity, EntityKind::AssetTitle);
    assert_eq!(transport.calls(), vec![EntityKind::AssetTitle]);
    assert!(harness.clock.sleeps().is_empty());
    Ok(())
}

#[tokio::test]
async fn overlapping_runs_are_refused() -> Result<()> {
    let harness = Harness::new();
    let transport = Arc::new(RecordingTransport::held());
    let scheduler = harness.scheduler(transport.clone());

    let background = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_all(RunTrigger::Manual).await })
    };
    transport.wait_entered().await;
    assert!(scheduler.is_running());

    assert!(matches!(
        scheduler.run_all(RunTrigger::Manual).await,
        Err(SchedulerError::AlreadyRunning)
    ));
    assert!(matches!(
        scheduler.run_one("payroll").await,
        Err(SchedulerError::AlreadyRunning)
    ));
    assert!(scheduler.tick().await.is_none());

    transport.release();
    let result = background.await??;
    assert_eq!(result.entities.len(), EntityKind::ALL.len());
    assert_eq!(transport.calls().len(), EntityKind::ALL.len());
    assert!(!scheduler.is_running());
    Ok(())
}

#[tokio::test]
async fn status_reports_last_run_and_timezone() -> Result<()> {
    let harness = Harness::new();
    let scheduler = harness.scheduler(Arc::new(RecordingTransport::new()));

    let before = scheduler.status().await;
    assert!(before.last_run.is_none());
    assert_eq!(before.timezone, "UTC-05:00");
    assert_eq!(before.transport, "recording");
    assert_eq!(before.entity_delay_ms, 1000);
    assert_eq!(before.entities.len(), EntityKind::ALL.len());

    scheduler.run_all(RunTrigger::Manual).await?;
    let after = scheduler.status().await;
    let last = after.last_run.expect("last run recorded");
    assert_eq!(last.trigger, RunTrigger::Manual);
    assert_eq!(last.totals.entities as usize, EntityKind::ALL.len());
    Ok(())
}
