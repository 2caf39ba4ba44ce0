use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use vpn_toggle::refresh::RefreshTrigger;
use vpn_toggle::types::Status;

mod common;
use common::fake_gateway::FakeGateway;
use common::Harness;

fn office_gateway() -> FakeGateway {
    FakeGateway::new()
        .with_service("CorpVPN", "VPN", Status::Connected)
        .with_service("Wi-Fi", "Wi-Fi", Status::Invalid)
        .with_service("Lab L2TP", "L2TP", Status::Disconnected)
        .with_service("Bluetooth PAN", "Bluetooth PAN", Status::Invalid)
}

#[tokio::test]
async fn discovery_lists_vpns_in_service_order_with_status() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);

    let snapshot = harness.refresher.request(RefreshTrigger::UiOpened).await;

    let names: Vec<&str> = snapshot.connections().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["CorpVPN", "Lab L2TP"]);
    assert_eq!(snapshot.status_of("CorpVPN"), Some(Status::Connected));
    assert_eq!(snapshot.status_of("Lab L2TP"), Some(Status::Disconnected));
    assert!(snapshot.any_active());

    // Only the kept services get a status read
    assert_eq!(FakeGateway::calls(&harness.gateway.status_calls), 2);
    assert_eq!(harness.registry.snapshot(), snapshot);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_discoveries_share_one_listing() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);
    harness.gateway.set_list_delay(Duration::from_millis(100));

    let (a, b) = tokio::join!(
        harness.refresher.request(RefreshTrigger::UiOpened),
        harness.refresher.request(RefreshTrigger::ExplicitReload)
    );

    assert_eq!(FakeGateway::calls(&harness.gateway.list_calls), 1);
    assert_eq!(a, b);
    assert_eq!(a.len(), 2);
}

#[tokio::test]
async fn discovery_after_completion_lists_again() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);

    harness.refresher.discover().await;
    harness.gateway.remove_service("Lab L2TP");
    let snapshot = harness.refresher.discover().await;

    assert_eq!(FakeGateway::calls(&harness.gateway.list_calls), 2);
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.get("Lab L2TP").is_none());
}

#[tokio::test]
async fn status_refresh_keeps_identity_and_order() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);
    harness.refresher.request(RefreshTrigger::UiOpened).await;

    // A service added on the OS side is not picked up by a status refresh
    harness.gateway.add_service("New VPN", "VPN", Status::Connected);
    harness.gateway.set_status("CorpVPN", Status::Disconnected);
    harness.gateway.set_status("Lab L2TP", Status::Connecting);

    let snapshot = harness.refresher.request(RefreshTrigger::NetworkChanged).await;

    let names: Vec<&str> = snapshot.connections().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["CorpVPN", "Lab L2TP"]);
    assert_eq!(snapshot.status_of("CorpVPN"), Some(Status::Disconnected));
    assert_eq!(snapshot.status_of("Lab L2TP"), Some(Status::Connecting));
    assert!(snapshot.any_active());
    assert_eq!(FakeGateway::calls(&harness.gateway.list_calls), 1);
}

#[tokio::test]
async fn status_refresh_with_empty_registry_is_noop() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);

    let snapshot = harness.refresher.request(RefreshTrigger::Hotkey).await;

    assert!(snapshot.is_empty());
    assert_eq!(FakeGateway::calls(&harness.gateway.list_calls), 0);
    assert_eq!(FakeGateway::calls(&harness.gateway.status_calls), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_status_refreshes_are_coalesced() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);
    harness.refresher.request(RefreshTrigger::UiOpened).await;
    let after_discovery = FakeGateway::calls(&harness.gateway.status_calls);

    harness.gateway.set_status_delay(Duration::from_millis(100));

    let refreshes = (0..5).map(|_| {
        let refresher = harness.refresher.clone();
        tokio::spawn(async move { refresher.request(RefreshTrigger::PostAction).await })
    });
    for handle in futures_util::future::join_all(refreshes).await {
        handle.unwrap();
    }

    // At most one running cycle plus one follow-up, two services each
    let cycles_calls = FakeGateway::calls(&harness.gateway.status_calls) - after_discovery;
    assert!(cycles_calls >= 2, "at least one cycle must run");
    assert!(cycles_calls <= 4, "expected coalescing, saw {} status calls", cycles_calls);
}

#[tokio::test]
async fn status_refresh_after_change_sees_latest_state() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);
    harness.refresher.request(RefreshTrigger::UiOpened).await;

    harness.gateway.set_status("CorpVPN", Status::Disconnected);
    let snapshot = harness.refresher.refresh_statuses().await;
    assert_eq!(snapshot.status_of("CorpVPN"), Some(Status::Disconnected));
    assert!(!snapshot.any_active());
}

#[tokio::test]
async fn subscribers_see_each_publish_in_order() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);
    let mut updates = harness.registry.subscribe();

    harness.refresher.request(RefreshTrigger::UiOpened).await;
    harness.gateway.set_status("CorpVPN", Status::Disconnected);
    harness.refresher.request(RefreshTrigger::NetworkChanged).await;

    let first = updates.recv().await.unwrap();
    let second = updates.recv().await.unwrap();
    assert!(first.generation() < second.generation());
    assert!(first.any_active());
    assert!(!second.any_active());
}

#[tokio::test]
async fn unchanged_status_refresh_does_not_publish() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);
    let discovered = harness.refresher.request(RefreshTrigger::UiOpened).await;

    let refreshed = harness.refresher.request(RefreshTrigger::NetworkChanged).await;
    assert_eq!(refreshed.generation(), discovered.generation());
}

#[tokio::test]
async fn launch_failure_yields_empty_list() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);
    harness.refresher.request(RefreshTrigger::UiOpened).await;

    harness.gateway.fail_launch.store(true, Ordering::SeqCst);
    let snapshot = harness.refresher.request(RefreshTrigger::ExplicitReload).await;

    assert!(snapshot.is_empty());
    assert!(!snapshot.any_active());
}

#[tokio::test]
async fn failing_listing_yields_empty_list() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);
    harness.gateway.fail_list.store(true, Ordering::SeqCst);

    let snapshot = harness.refresher.request(RefreshTrigger::UiOpened).await;
    assert!(snapshot.is_empty());
    assert_eq!(FakeGateway::calls(&harness.gateway.status_calls), 0);
}

#[tokio::test]
async fn unreadable_statuses_become_invalid() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);
    harness.gateway.fail_status.store(true, Ordering::SeqCst);

    let snapshot = harness.refresher.request(RefreshTrigger::UiOpened).await;

    assert_eq!(snapshot.len(), 2);
    assert!(snapshot
        .connections()
        .iter()
        .all(|c| c.status == Status::Invalid));
    assert!(!snapshot.any_active());
}

#[tokio::test]
async fn unrecognised_status_text_is_invalid() {
    let harness = Harness::new(
        FakeGateway::new().with_service("CorpVPN", "VPN", Status::Invalid),
        Duration::ZERO,
    );

    let snapshot = harness.refresher.request(RefreshTrigger::UiOpened).await;
    assert_eq!(snapshot.status_of("CorpVPN"), Some(Status::Invalid));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ui_open_and_network_change_in_same_tick_share_one_discovery() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);
    harness.gateway.set_list_delay(Duration::from_millis(100));

    // Reader polls the registry for the whole refresh
    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let registry = harness.registry.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut observed = Vec::new();
            while !stop.load(Ordering::SeqCst) {
                observed.push(registry.snapshot());
                tokio::task::yield_now().await;
            }
            observed
        })
    };

    let (opened, changed) = tokio::join!(
        harness.refresher.request(RefreshTrigger::UiOpened),
        harness.refresher.request(RefreshTrigger::NetworkChanged)
    );
    stop.store(true, Ordering::SeqCst);

    assert_eq!(FakeGateway::calls(&harness.gateway.list_calls), 1);
    // The status request was served by the discovery's reads
    assert_eq!(FakeGateway::calls(&harness.gateway.status_calls), 2);
    assert_eq!(opened, changed);

    let expected: Vec<(String, Status)> = vec![
        ("CorpVPN".to_string(), Status::Connected),
        ("Lab L2TP".to_string(), Status::Disconnected),
    ];
    for snapshot in reader.await.unwrap() {
        if snapshot.is_empty() {
            continue;
        }
        let seen: Vec<(String, Status)> = snapshot
            .connections()
            .iter()
            .map(|c| (c.name.clone(), c.status))
            .collect();
        assert_eq!(seen, expected, "reader saw a partially applied refresh");
    }
}

#[tokio::test]
async fn abandoned_discovery_still_completes() {
    let harness = Harness::new(office_gateway(), Duration::ZERO);
    harness.gateway.set_list_delay(Duration::from_millis(100));

    // Every caller gives up before the listing returns
    let abandoned = timeout(Duration::from_millis(20), harness.refresher.discover()).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.registry.snapshot().len(), 2);

    // Nothing is left in flight: the next discovery lists afresh
    harness.gateway.remove_service("Lab L2TP");
    let snapshot = harness.refresher.discover().await;
    assert_eq!(FakeGateway::calls(&harness.gateway.list_calls), 2);
    assert_eq!(snapshot.len(), 1);
}
