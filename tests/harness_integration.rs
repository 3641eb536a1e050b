use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use callguard::{Envelope, Services, ServicesConfig, Task};

fn config(task_pool_size: usize) -> ServicesConfig {
    ServicesConfig {
        task_pool_size,
        ..ServicesConfig::default()
    }
}

#[derive(Debug)]
struct CreateUser {
    name: Option<String>,
}

fn require_name(request: &CreateUser) -> Result<(), String> {
    match request.name.as_deref() {
        Some(name) if !name.trim().is_empty() => Ok(()),
        _ => Err("name is required".to_owned()),
    }
}

#[tokio::test]
async fn run_sync_validates_then_runs_work() {
    let services = Services::start(ServicesConfig::default()).expect("services must start");

    let created = services.api().run_sync(
        Task::new(
            CreateUser {
                name: Some("Kit".to_owned()),
            },
            |request| Ok::<_, String>(format!("user:{}", request.name.unwrap_or_default())),
        )
        .validate(require_name),
    );
    assert_eq!(created.payload().map(String::as_str), Some("user:Kit"));

    let rejected = services.api().run_sync(
        Task::new(CreateUser { name: None }, |_| Ok::<_, String>("unreachable".to_owned()))
            .validate(require_name),
    );
    assert!(!rejected.is_success());
    assert_eq!(rejected.message(), Some("validation failed: name is required"));

    services.shutdown().await;
}

#[tokio::test]
async fn run_action_reports_side_effects_without_payload() {
    let services = Services::start(ServicesConfig::default()).expect("services must start");
    let log = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&log);
    let done = services.db().run_action(move || {
        sink.lock()
            .map(|mut entries| entries.push("deleted user 7"))
            .map_err(|_| "log poisoned".to_owned())
    });
    assert_eq!(done, Envelope::empty());
    assert_eq!(done.payload(), None);
    assert_eq!(
        *log.lock().expect("log mutex must not be poisoned"),
        vec!["deleted user 7"]
    );

    let failed = services
        .db()
        .run_action(|| Err::<(), _>("foreign key violation"));
    assert_eq!(
        failed.message(),
        Some("database operation failed: foreign key violation")
    );

    services.shutdown().await;
}

#[tokio::test]
async fn run_async_uses_async_vocabulary() {
    let services = Services::start(ServicesConfig::default()).expect("services must start");

    let greeting = services
        .background()
        .run_async(Task::new("John".to_owned(), |name| {
            Ok::<_, String>(format!("Hello, {name}!"))
        }))
        .await;
    assert_eq!(greeting.payload().map(String::as_str), Some("Hello, John!"));

    let failed = services
        .background()
        .run_async(Task::from_fn(|| Err::<u8, _>("queue unavailable")))
        .await;
    assert_eq!(failed.message(), Some("async task failed: queue unavailable"));

    services.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_tasks_beyond_pool_size_complete_without_exceeding_it() {
    let services = Services::start(config(3)).expect("services must start");
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let pending: Vec<_> = (0..20u32)
        .map(|index| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            services.background().run_async(Task::new(index, move |index| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(index * 2)
            }))
        })
        .collect();

    let mut results = Vec::new();
    for task in pending {
        let envelope = task.await;
        results.push(*envelope.payload().expect("task must succeed"));
    }

    assert_eq!(results, (0..20u32).map(|index| index * 2).collect::<Vec<_>>());
    assert!(peak.load(Ordering::SeqCst) <= 3);

    services.shutdown().await;
}

#[tokio::test]
async fn work_submitted_after_shutdown_fails_cleanly() {
    let services = Services::start(ServicesConfig::default()).expect("services must start");
    services.shutdown().await;

    let envelope = services
        .background()
        .run_async(Task::from_fn(|| Ok::<_, String>(1)))
        .await;

    assert_eq!(envelope.message(), Some("worker pool 'tasks' is shut down"));
}

#[tokio::test]
async fn run_or_default_keeps_partial_functionality() -> anyhow::Result<()> {
    let services = Services::start(ServicesConfig::default())?;

    let recommendations = services
        .api()
        .run_or_default(|| Err::<Vec<String>, _>("recommender offline"), Vec::new());

    assert!(recommendations.is_success());
    assert_eq!(recommendations.payload(), Some(&Vec::new()));

    services.shutdown().await;
    Ok(())
}
