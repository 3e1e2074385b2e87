//! Backend failure-path tests driven through the full scheduler.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use capq::{
    Actor, ActorRegistry, BackendKind, Capability, CapabilitySet, FnFactory, Scheduler,
    SchedulerConfig, SchedulerError, SchedulerTask, SpawnContext, TaskError, TaskOutcome,
};

fn one_shot_producer<P>(
    tasks: Vec<SchedulerTask<P>>,
) -> impl FnMut() -> Vec<SchedulerTask<P>> {
    let mut pending = Some(tasks);
    move || pending.take().unwrap_or_default()
}

#[tokio::test(flavor = "multi_thread")]
async fn construction_failure_aborts_the_run() {
    let cap = Capability::named([("cpu", 1)], "slot");
    let mut registry: ActorRegistry<u32, u32> = ActorRegistry::new();
    registry.register(
        CapabilitySet::new([cap.clone()]),
        FnFactory::new(|_ctx: &SpawnContext| {
            Err::<Box<dyn Actor<u32, u32>>, _>(anyhow::anyhow!("credentials expired"))
        }),
    );

    let mut scheduler = Scheduler::new(
        registry,
        [("cpu".to_string(), 2)].into(),
        SchedulerConfig {
            backend: BackendKind::Worker,
            ..SchedulerConfig::default()
        },
    )
    .unwrap();

    let tasks = vec![SchedulerTask::new(1, vec![cap.clone()])];
    let err = scheduler
        .process(one_shot_producer(tasks), |_batch: Vec<TaskOutcome<u32>>| {})
        .await
        .unwrap_err();

    match err {
        SchedulerError::ActorConstruction(source) => {
            assert!(source.to_string().contains("credentials expired"));
        }
        other => panic!("unexpected error: {other}"),
    }
    scheduler.join().await.unwrap();
}

struct Volatile;

impl Actor<u32, u32> for Volatile {
    fn consume(&mut self, argument: u32) -> anyhow::Result<u32> {
        if argument == 7 {
            panic!("hit the poison value");
        }
        Ok(argument * 2)
    }
}

async fn run_panic_containment(backend: BackendKind) {
    let cap = Capability::named([("cpu", 1)], "slot");
    let mut registry = ActorRegistry::new();
    registry.register(
        CapabilitySet::new([cap.clone()]),
        FnFactory::new(|_ctx: &SpawnContext| Ok(Box::new(Volatile) as Box<dyn Actor<_, _>>)),
    );

    let mut scheduler = Scheduler::new(
        registry,
        [("cpu".to_string(), 1)].into(),
        SchedulerConfig {
            backend,
            ..SchedulerConfig::default()
        },
    )
    .unwrap();

    let tasks: Vec<_> = [3u32, 7, 5]
        .into_iter()
        .map(|i| SchedulerTask::new(i, vec![cap.clone()]))
        .collect();

    let mut ok = Vec::new();
    let mut failed = Vec::new();
    scheduler
        .process(one_shot_producer(tasks), |batch: Vec<TaskOutcome<u32>>| {
            for outcome in batch {
                match outcome {
                    Ok(v) => ok.push(v),
                    Err(e) => failed.push(e),
                }
            }
        })
        .await
        .unwrap();
    scheduler.join().await.unwrap();

    // the panic became a per-task failure; the same actor served the rest
    ok.sort_unstable();
    assert_eq!(ok, vec![6, 10]);
    assert_eq!(failed.len(), 1);
    assert!(matches!(failed[0], TaskError::Consume { .. }));
    assert!(failed[0].message().contains("hit the poison value"));
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_panic_is_contained_and_service_continues() {
    run_panic_containment(BackendKind::Worker).await;
}

#[tokio::test]
async fn sync_panic_is_contained_and_service_continues() {
    run_panic_containment(BackendKind::Sync).await;
}

struct Remote;

impl Actor<String, String> for Remote {
    fn consume(&mut self, argument: String) -> anyhow::Result<String> {
        if argument == "bad" {
            anyhow::bail!("remote validation failed");
        }
        Ok(argument.to_uppercase())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cluster_failures_arrive_reclassified_as_consume_errors() {
    let cap = Capability::named([("cpu", 1)], "slot");
    let mut registry = ActorRegistry::new();
    registry.register(
        CapabilitySet::new([cap.clone()]),
        FnFactory::new(|_ctx: &SpawnContext| Ok(Box::new(Remote) as Box<dyn Actor<_, _>>)),
    );

    let mut scheduler = Scheduler::new(
        registry,
        [("cpu".to_string(), 2)].into(),
        SchedulerConfig {
            backend: BackendKind::Cluster,
            ..SchedulerConfig::default()
        },
    )
    .unwrap();

    let tasks = vec![
        SchedulerTask::new("good".to_string(), vec![cap.clone()]),
        SchedulerTask::new("bad".to_string(), vec![cap.clone()]),
    ];

    let mut ok = Vec::new();
    let mut failed = Vec::new();
    scheduler
        .process(one_shot_producer(tasks), |batch: Vec<TaskOutcome<String>>| {
            for outcome in batch {
                match outcome {
                    Ok(v) => ok.push(v),
                    Err(e) => failed.push(e),
                }
            }
        })
        .await
        .unwrap();
    scheduler.join().await.unwrap();

    assert_eq!(ok, vec!["GOOD".to_string()]);
    assert_eq!(failed.len(), 1);
    // the remote envelope was unwrapped before delivery
    match &failed[0] {
        TaskError::Consume { message, trace } => {
            assert!(message.contains("remote validation failed"));
            assert!(!trace.is_empty());
        }
        other => panic!("unexpected error shape: {other}"),
    }
}

struct Counting {
    consumed: Arc<AtomicU32>,
}

impl Actor<u32, u32> for Counting {
    fn consume(&mut self, argument: u32) -> anyhow::Result<u32> {
        self.consumed.fetch_add(1, Ordering::SeqCst);
        Ok(argument)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn join_is_idempotent_and_releases_workers() {
    let consumed = Arc::new(AtomicU32::new(0));

    let cap = Capability::named([("cpu", 1)], "slot");
    let mut registry = ActorRegistry::new();
    let counter = Arc::clone(&consumed);
    registry.register(
        CapabilitySet::new([cap.clone()]),
        FnFactory::new(move |_ctx: &SpawnContext| {
            Ok(Box::new(Counting {
                consumed: Arc::clone(&counter),
            }) as Box<dyn Actor<_, _>>)
        }),
    );

    let mut scheduler = Scheduler::new(
        registry,
        [("cpu".to_string(), 2)].into(),
        SchedulerConfig {
            backend: BackendKind::Worker,
            ..SchedulerConfig::default()
        },
    )
    .unwrap();

    let tasks: Vec<_> = (0..4u32)
        .map(|i| SchedulerTask::new(i, vec![cap.clone()]))
        .collect();
    scheduler
        .process(one_shot_producer(tasks), |_batch: Vec<TaskOutcome<u32>>| {})
        .await
        .unwrap();

    // the shared lock store keeps serving after join
    let locks = scheduler.lock_store();
    scheduler.join().await.unwrap();
    scheduler.join().await.unwrap();
    assert_eq!(consumed.load(Ordering::SeqCst), 4);
    assert!(scheduler.is_idle());
    let guard = locks.acquire("external-resource");
    drop(guard);
}
