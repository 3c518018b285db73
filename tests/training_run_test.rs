mod common;

use std::fs;
use std::sync::Arc;

use common::{data_sources, small_config, FakeProvider};
use portfolio_lab::error::ErrorKind;
use portfolio_lab::storage::{InMemoryResultRepository, ResultRepository};
use portfolio_lab::training::{
    self, EventSink, RunContext, RunEvent, RunPool, RunStatus, SummaryWriter, TrainingPackage,
};
use tempfile::tempdir;
use tokio::sync::mpsc::UnboundedReceiver;

fn drain(receiver: &mut UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_packages_run_end_to_end() {
    let dir = tempdir().unwrap();
    let package_dir = dir.path().join("train_package");
    let summary_path = dir.path().join("summary.csv");

    let config = small_config();
    training::add_packages(&package_dir, &config, 2, true).unwrap();
    let packages = training::load_packages(&package_dir).unwrap();
    assert_eq!(packages.len(), 2);

    let (_, store, selector) = data_sources(Arc::new(FakeProvider::standard()), true);
    let results = Arc::new(InMemoryResultRepository::new());
    let (events, mut receiver) = EventSink::channel();
    let context = RunContext {
        store,
        selector,
        results: results.clone(),
        summary: Some(Arc::new(SummaryWriter::new(&summary_path))),
        events,
    };

    let outcomes = RunPool::new(2)
        .run_all(packages, |package| training::execute(package, context.clone()))
        .await;

    assert_eq!(outcomes.len(), 2);
    for (position, outcome) in &outcomes {
        let result = outcome.as_ref().unwrap();
        assert_eq!(result.package_index, *position as i64 + 1);
        assert!(result.test_pv > 0.0);
        assert_eq!(result.backtest_test_history.0.len(), 36);
        assert!(results.get(&result.key).await.unwrap().is_some());
    }
    assert_eq!(results.len(), 2);

    let summary = fs::read_to_string(&summary_path).unwrap();
    assert_eq!(summary.lines().count(), 3);

    let events = drain(&mut receiver);
    for index in [1usize, 2] {
        let statuses: Vec<RunStatus> = events
            .iter()
            .filter(|e| e.package_index() == index)
            .map(RunEvent::status)
            .collect();
        assert_eq!(statuses.first(), Some(&RunStatus::Running));
        assert_eq!(statuses.last(), Some(&RunStatus::Completed));
        // 10 步，每 5 步評估一次
        let progress = events
            .iter()
            .filter(|e| matches!(e, RunEvent::Progress { package_index, .. } if *package_index == index))
            .count();
        assert_eq!(progress, 2);
    }
}

#[tokio::test]
async fn test_failed_run_reports_kind_and_saves_nothing() {
    let mut config = small_config();
    config.input.coin_number = 10;
    let package = TrainingPackage { index: 7, config };

    let (_, store, selector) = data_sources(Arc::new(FakeProvider::standard()), true);
    let results = Arc::new(InMemoryResultRepository::new());
    let (events, mut receiver) = EventSink::channel();
    let context = RunContext {
        store,
        selector,
        results: results.clone(),
        summary: None,
        events,
    };

    let err = training::execute(package, context).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientAssets);
    assert!(results.is_empty());

    let events = drain(&mut receiver);
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events.last(),
        Some(RunEvent::Failed { package_index: 7, kind: ErrorKind::InsufficientAssets, .. })
    ));
}
