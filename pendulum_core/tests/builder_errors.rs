use std::sync::Arc;

use crossbeam_channel as xch;
use pendulum_core::mocks::NullHistory;
use pendulum_core::{BuildError, DelayWindow, RuntimeCfg, SortingCfg, SortingService};
use pendulum_hardware::SimulatedLink;

#[test]
fn missing_link_is_reported() {
    let (_tx, rx) = xch::unbounded();
    let err = SortingService::builder()
        .with_events(rx)
        .with_history(Arc::new(NullHistory))
        .build()
        .unwrap_err();
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingLink) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn missing_events_and_history_are_reported() {
    let (tx, _rx) = xch::unbounded();
    let link = Arc::new(SimulatedLink::new("b", tx));
    let err = SortingService::builder()
        .with_link(link.clone())
        .with_history(Arc::new(NullHistory))
        .build()
        .unwrap_err();
    assert_eq!(err.downcast_ref::<BuildError>(), Some(&BuildError::MissingEvents));

    let (_tx2, rx2) = xch::unbounded();
    let err = SortingService::builder()
        .with_link(link)
        .with_events(rx2)
        .build()
        .unwrap_err();
    assert_eq!(err.downcast_ref::<BuildError>(), Some(&BuildError::MissingHistory));
}

#[test]
fn inverted_windows_and_zero_pool_are_rejected() {
    let build = |trigger: DelayWindow, sorting: SortingCfg, runtime: RuntimeCfg| {
        let (tx, rx) = xch::unbounded();
        SortingService::builder()
            .with_link(Arc::new(SimulatedLink::new("b", tx)))
            .with_events(rx)
            .with_history(Arc::new(NullHistory))
            .with_trigger_window(trigger)
            .with_sorting(sorting)
            .with_runtime(runtime)
            .build()
    };
    let ok = DelayWindow::new(100, 300);
    assert!(build(ok, SortingCfg::default(), RuntimeCfg::default()).is_ok());

    let err = build(DelayWindow::new(300, 100), SortingCfg::default(), RuntimeCfg::default())
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<BuildError>(), Some(BuildError::InvalidConfig(_))));

    let sorting = SortingCfg {
        window: DelayWindow::new(5000, 1000),
        ..SortingCfg::default()
    };
    assert!(build(ok, sorting, RuntimeCfg::default()).is_err());

    let runtime = RuntimeCfg {
        max_in_flight: 0,
        ..RuntimeCfg::default()
    };
    let err = build(ok, SortingCfg::default(), runtime).unwrap_err();
    assert!(format!("{err}").contains("max_in_flight"));
}
