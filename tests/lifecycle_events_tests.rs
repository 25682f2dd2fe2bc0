use docmigrate::{
    EngineConfig, EventKind, LogLevel, MemoryDocumentHost, MigrateError, RunOutcome, StepOutcome,
    UpgradeEngine, UpgradeEvent, VersionId, VersionStep,
};
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn engine_with(config: EngineConfig) -> UpgradeEngine {
    UpgradeEngine::new(config, Arc::new(MemoryDocumentHost::new())).expect("engine builds")
}

fn ok_step(target: &str) -> VersionStep {
    VersionStep::new(target, |_ctx| async { Ok(StepOutcome::Done) }.boxed())
}

fn failing_step(target: &str, message: &str) -> VersionStep {
    let message = message.to_string();
    VersionStep::new(target, move |_ctx| {
        let message = message.clone();
        async move { Err(MigrateError::ExecutionError(message)) }.boxed()
    })
}

/// Renders an event into a compact line for order assertions.
fn render(event: &UpgradeEvent) -> String {
    match event {
        UpgradeEvent::RunStarted { pending_versions } => {
            let versions: Vec<_> = pending_versions.iter().map(VersionId::as_str).collect();
            format!("run-started {}", versions.join(","))
        }
        UpgradeEvent::StepStarted { target_version } => {
            format!("step-started {target_version}")
        }
        UpgradeEvent::StepEnded { target_version, logs } => {
            format!("step-ended {target_version} ({} logs)", logs.len())
        }
        UpgradeEvent::StepFailed { target_version, .. } => {
            format!("step-failed {target_version}")
        }
        UpgradeEvent::RunEnded {
            upgraded_to,
            had_failures,
        } => {
            let reached = upgraded_to
                .as_ref()
                .map(VersionId::as_str)
                .unwrap_or("none");
            format!("run-ended {reached} failures={had_failures}")
        }
    }
}

#[tokio::test]
async fn a_run_with_a_failure_emits_the_full_lifecycle_in_order() {
    let config = EngineConfig::new("1.2.0")
        .step(ok_step("1.1.0"))
        .step(failing_step("1.2.0", "cannot split pages"));
    let engine = engine_with(config);

    let lines = Arc::new(Mutex::new(Vec::new()));
    {
        let lines = lines.clone();
        engine.notifier().on_any(move |event| {
            lines.lock().unwrap().push(render(event));
        });
    }

    let report = engine.run_upgrades().await;
    assert_eq!(report.outcome, RunOutcome::PartiallyFailed);

    assert_eq!(
        *lines.lock().unwrap(),
        [
            "run-started 1.1.0,1.2.0",
            "step-started 1.1.0",
            "step-ended 1.1.0 (1 logs)",
            "step-started 1.2.0",
            "step-failed 1.2.0",
            "step-ended 1.2.0 (1 logs)",
            "run-ended 1.1.0 failures=true",
        ]
    );
}

#[tokio::test]
async fn step_ended_carries_the_logs_produced_during_that_step() {
    let config = EngineConfig::new("1.1.0").step(VersionStep::new("1.1.0", |ctx| {
        async move {
            ctx.add_log(LogLevel::Info, "moving styles into components");
            Ok(StepOutcome::Message("Styles migrated".to_string()))
        }
        .boxed()
    }));
    let engine = engine_with(config);

    let captured = Arc::new(Mutex::new(Vec::new()));
    {
        let captured = captured.clone();
        engine.notifier().on(EventKind::StepEnded, move |event| {
            if let UpgradeEvent::StepEnded { logs, .. } = event {
                captured.lock().unwrap().extend(logs.clone());
            }
        });
    }

    engine.run_upgrades().await;

    let captured = captured.lock().unwrap();
    let messages: Vec<_> = captured.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        ["moving styles into components", "Styles migrated"]
    );
}

#[tokio::test]
async fn a_failed_step_reports_exactly_its_error_entry() {
    let config = EngineConfig::new("1.1.0").step(VersionStep::new("1.1.0", |ctx| {
        async move {
            ctx.add_log(LogLevel::Info, "started rewriting");
            Err(MigrateError::ExecutionError("rewrite aborted".to_string()))
        }
        .boxed()
    }));
    let engine = engine_with(config);

    let captured = Arc::new(Mutex::new(Vec::new()));
    {
        let captured = captured.clone();
        engine.notifier().on(EventKind::StepEnded, move |event| {
            if let UpgradeEvent::StepEnded { logs, .. } = event {
                captured.lock().unwrap().extend(logs.clone());
            }
        });
    }

    engine.run_upgrades().await;

    // The context entry stays in the accumulated transcript, but the
    // step-ended payload carries just the error entry.
    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].level, LogLevel::Error);
    assert!(captured[0].message.contains("rewrite aborted"));
}

#[tokio::test]
async fn no_events_are_emitted_when_nothing_is_pending() {
    let engine = engine_with(EngineConfig::new("1.0.0"));
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = hits.clone();
        engine.notifier().on_any(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }

    let report = engine.run_upgrades().await;
    assert_eq!(report.outcome, RunOutcome::UpToDate);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn once_subscription_sees_a_single_run_start() {
    let config = EngineConfig::new("1.1.0").step(ok_step("1.1.0"));
    let engine = engine_with(config);

    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = hits.clone();
        engine.notifier().once(EventKind::RunStarted, move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }

    engine.run_upgrades().await;
    engine.retry_from_failed_step().await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
