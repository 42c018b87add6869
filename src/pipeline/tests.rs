//! Unit tests for phase ordering and `proceed` semantics.

use std::sync::{Arc, Mutex};

use rstest::{fixture, rstest};

use super::{Phase, Pipeline, PipelineError};
use crate::error::CallError;

const A: Phase = Phase::new("A");
const B: Phase = Phase::new("B");
const C: Phase = Phase::new("C");
const D: Phase = Phase::new("D");

type Log = Arc<Mutex<Vec<String>>>;

#[fixture]
fn log() -> Log { Arc::new(Mutex::new(Vec::new())) }

fn names<C: Send + Sync + 'static>(pipeline: &Pipeline<C>) -> Vec<&str> {
    pipeline.phases().map(Phase::name).collect()
}

fn push(log: &Log, entry: &str) { log.lock().expect("log lock").push(entry.to_string()); }

fn entries(log: &Log) -> Vec<String> { log.lock().expect("log lock").clone() }

#[rstest]
#[tokio::test]
async fn before_and_after_constraints_are_respected(log: Log) {
    let mut pipeline: Pipeline<()> = Pipeline::with_phases([B]).expect("phases");
    pipeline.insert_phase_before(&B, A).expect("insert A");
    pipeline.insert_phase_after(&B, C).expect("insert C");
    assert_eq!(names(&pipeline), ["A", "B", "C"]);

    for (phase, label) in [(C, "C"), (A, "A"), (B, "B")] {
        let log = Arc::clone(&log);
        pipeline
            .intercept(&phase, move |mut ctx| {
                let log = Arc::clone(&log);
                async move {
                    push(&log, label);
                    ctx.proceed().await
                }
            })
            .expect("intercept");
    }

    pipeline.execute(()).await.expect("execute");
    assert_eq!(entries(&log), ["A", "B", "C"]);
}

#[test]
fn repeated_after_inserts_keep_registration_order() {
    let mut pipeline: Pipeline<()> = Pipeline::with_phases([A, D]).expect("phases");
    pipeline.insert_phase_after(&A, B).expect("insert B");
    pipeline.insert_phase_after(&A, C).expect("insert C");
    assert_eq!(names(&pipeline), ["A", "B", "C", "D"]);
}

#[test]
fn repeated_before_inserts_keep_registration_order() {
    let mut pipeline: Pipeline<()> = Pipeline::with_phases([D]).expect("phases");
    pipeline.insert_phase_before(&D, A).expect("insert A");
    pipeline.insert_phase_before(&D, B).expect("insert B");
    assert_eq!(names(&pipeline), ["A", "B", "D"]);
}

#[rstest]
#[case::append(|p: &mut Pipeline<()>| p.add_phase(A))]
#[case::before(|p: &mut Pipeline<()>| p.insert_phase_before(&B, A))]
#[case::after(|p: &mut Pipeline<()>| p.insert_phase_after(&B, A))]
fn duplicate_phase_is_rejected(
    #[case] register: fn(&mut Pipeline<()>) -> Result<(), PipelineError>,
) {
    let mut pipeline: Pipeline<()> = Pipeline::with_phases([A, B]).expect("phases");
    assert_eq!(register(&mut pipeline), Err(PipelineError::DuplicatePhase(A)));
}

#[test]
fn unknown_reference_is_rejected() {
    let mut pipeline: Pipeline<()> = Pipeline::new();
    assert_eq!(
        pipeline.insert_phase_after(&A, B),
        Err(PipelineError::PhaseNotFound(A))
    );
    assert_eq!(
        pipeline.intercept(&C, |mut ctx| async move { ctx.proceed().await }),
        Err(PipelineError::PhaseNotFound(C))
    );
    assert!(pipeline.is_empty());
}

#[rstest]
#[tokio::test]
async fn interceptors_run_in_phase_then_registration_order(log: Log) {
    let mut pipeline: Pipeline<()> = Pipeline::with_phases([A, B]).expect("phases");
    for (phase, label) in [(B, "b1"), (A, "a1"), (B, "b2"), (A, "a2")] {
        let log = Arc::clone(&log);
        pipeline
            .intercept(&phase, move |mut ctx| {
                let log = Arc::clone(&log);
                async move {
                    push(&log, label);
                    ctx.proceed().await
                }
            })
            .expect("intercept");
    }
    assert_eq!(pipeline.interceptor_count(), 4);

    pipeline.execute(()).await.expect("execute");
    assert_eq!(entries(&log), ["a1", "a2", "b1", "b2"]);
}

#[rstest]
#[tokio::test]
async fn proceed_returns_after_downstream_completes(log: Log) {
    let mut pipeline: Pipeline<()> = Pipeline::with_phases([A, B]).expect("phases");
    let outer = Arc::clone(&log);
    pipeline
        .intercept(&A, move |mut ctx| {
            let log = Arc::clone(&outer);
            async move {
                push(&log, "enter");
                let result = ctx.proceed().await;
                push(&log, "exit");
                result
            }
        })
        .expect("intercept A");
    let inner = Arc::clone(&log);
    pipeline
        .intercept(&B, move |_ctx| {
            let log = Arc::clone(&inner);
            async move {
                tokio::task::yield_now().await;
                push(&log, "handler");
                Ok(())
            }
        })
        .expect("intercept B");

    pipeline.execute(()).await.expect("execute");
    assert_eq!(entries(&log), ["enter", "handler", "exit"]);
}

#[rstest]
#[tokio::test]
async fn short_circuit_skips_later_interceptors(log: Log) {
    let mut pipeline: Pipeline<()> = Pipeline::with_phases([A, B]).expect("phases");
    let first = Arc::clone(&log);
    pipeline
        .intercept(&A, move |_ctx| {
            let log = Arc::clone(&first);
            async move {
                push(&log, "gate");
                Ok(())
            }
        })
        .expect("intercept A");
    let second = Arc::clone(&log);
    pipeline
        .intercept(&B, move |_ctx| {
            let log = Arc::clone(&second);
            async move {
                push(&log, "unreachable");
                Ok(())
            }
        })
        .expect("intercept B");

    pipeline.execute(()).await.expect("execute");
    assert_eq!(entries(&log), ["gate"]);
}

#[rstest]
#[tokio::test]
async fn errors_propagate_through_enclosing_proceed(log: Log) {
    let mut pipeline: Pipeline<()> = Pipeline::with_phases([A, B]).expect("phases");
    let outer = Arc::clone(&log);
    pipeline
        .intercept(&A, move |mut ctx| {
            let log = Arc::clone(&outer);
            async move {
                let result = ctx.proceed().await;
                push(&log, if result.is_err() { "saw error" } else { "saw ok" });
                result
            }
        })
        .expect("intercept A");
    pipeline
        .intercept(&B, |_ctx| async {
            Err(CallError::handler(std::io::Error::other("boom")))
        })
        .expect("intercept B");

    let err = pipeline.execute(()).await.expect_err("pipeline must fail");
    assert!(err.to_string().contains("boom"));
    assert_eq!(entries(&log), ["saw error"]);
}

#[rstest]
#[tokio::test]
async fn second_proceed_is_a_no_op(log: Log) {
    let mut pipeline: Pipeline<()> = Pipeline::with_phases([A, B]).expect("phases");
    pipeline
        .intercept(&A, |mut ctx| async move {
            assert!(!ctx.has_proceeded());
            ctx.proceed().await?;
            assert!(ctx.has_proceeded());
            ctx.proceed().await
        })
        .expect("intercept A");
    let counter = Arc::clone(&log);
    pipeline
        .intercept(&B, move |_ctx| {
            let log = Arc::clone(&counter);
            async move {
                push(&log, "downstream");
                Ok(())
            }
        })
        .expect("intercept B");

    pipeline.execute(()).await.expect("execute");
    assert_eq!(entries(&log), ["downstream"]);
}

#[tokio::test]
async fn context_reports_phase_and_call() {
    let mut pipeline: Pipeline<String> = Pipeline::with_phases([A]).expect("phases");
    pipeline
        .intercept(&A, |ctx| async move {
            assert_eq!(ctx.phase(), &A);
            assert_eq!(ctx.call().as_str(), "subject");
            Ok(())
        })
        .expect("intercept");
    pipeline
        .execute(String::from("subject"))
        .await
        .expect("execute");
}

#[rstest]
#[tokio::test]
async fn chain_is_rebuilt_after_mutation(log: Log) {
    let mut pipeline: Pipeline<()> = Pipeline::with_phases([A]).expect("phases");
    pipeline.execute(()).await.expect("empty pipeline");

    let recorder = Arc::clone(&log);
    pipeline
        .intercept(&A, move |_ctx| {
            let log = Arc::clone(&recorder);
            async move {
                push(&log, "late");
                Ok(())
            }
        })
        .expect("intercept");
    pipeline.execute(()).await.expect("execute");
    assert_eq!(entries(&log), ["late"]);
}

struct Cleanup(Log);

impl Drop for Cleanup {
    fn drop(&mut self) { push(&self.0, "cleanup"); }
}

#[rstest]
#[tokio::test]
async fn cleanup_around_proceed_runs_once_when_the_call_is_cancelled(log: Log) {
    let mut pipeline: Pipeline<()> = Pipeline::with_phases([A, B]).expect("phases");
    let guarded = Arc::clone(&log);
    pipeline
        .intercept(&A, move |mut ctx| {
            let log = Arc::clone(&guarded);
            async move {
                let _cleanup = Cleanup(log);
                ctx.proceed().await
            }
        })
        .expect("intercept A");
    pipeline
        .intercept(&B, |_ctx| std::future::pending())
        .expect("intercept B");

    let outcome = tokio::time::timeout(std::time::Duration::from_millis(10), pipeline.execute(())).await;
    assert!(outcome.is_err(), "downstream never completes");
    assert_eq!(entries(&log), ["cleanup"]);
}
