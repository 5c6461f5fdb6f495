//! Connection lifecycle integration tests

mod common;

use common::{settle, setup, Recorder};
use connly_client::{ConnectionState, ConnlyError};
use serde_json::json;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const PERIOD: Duration = Duration::from_secs(300);

/// Connect, say hello, get the server acknowledgement back
#[tokio::test(start_paused = true)]
async fn test_send_message_with_ack() {
    let (manager, connector) = setup();
    let connects = Recorder::new();
    manager.on_connect(connects.callback());

    manager.connect();
    let remote = connector.latest().unwrap();
    remote.connect();
    settle().await;

    assert_eq!(connects.calls(), vec![json!({ "isConnected": true })]);
    assert!(manager.is_connected());

    let acks = Recorder::new();
    let ack = acks.callback();
    assert_ok!(manager.send_message_with_ack("hello", ack));

    let emissions = remote.emissions();
    assert_eq!(emissions.len(), 1);
    assert_eq!(emissions[0].event, "connly_message");
    assert_eq!(emissions[0].payload, json!("hello"));
    assert!(emissions[0].wants_ack);

    assert!(remote.acknowledge("connly_message", json!("ok")));
    settle().await;
    assert_eq!(acks.calls(), vec![json!("ok")]);
    assert_eq!(manager.metrics().acks_received, 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_before_connect_is_rejected() {
    let (manager, connector) = setup();

    let err = assert_err!(manager.send_message("hello"));
    assert_eq!(
        err,
        ConnlyError::NotConnected {
            event: "connly_message"
        }
    );
    assert_err!(manager.set_status("online"));
    assert_err!(manager.send_reaction(json!({ "emoji": "+1" })));
    assert_err!(manager.send_read_receipt(json!({ "id": 1 })));
    assert_err!(manager.send_typing_status(json!({ "typing": true })));

    assert_eq!(connector.opened(), 0);
    assert_eq!(manager.metrics().dropped_not_connected, 5);
    assert_eq!(manager.metrics().emitted, 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_while_handle_is_pending_is_rejected() {
    let (manager, connector) = setup();
    manager.connect();
    settle().await;

    assert_err!(manager.send_message("too early"));
    assert!(connector.latest().unwrap().emissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_when_disconnected_is_noop() {
    let (manager, connector) = setup();
    let disconnects = Recorder::new();
    manager.on_disconnect(disconnects.callback());

    manager.disconnect();
    manager.disconnect();
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    manager.connect();
    manager.disconnect();
    manager.disconnect();
    settle().await;

    // never connected, so nothing to report
    assert_eq!(disconnects.count(), 0);
    assert_eq!(connector.open_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transport_disconnect_fires_once_and_stops_keepalive() {
    let (manager, connector) = setup();
    let disconnects = Recorder::new();
    manager.on_disconnect(disconnects.callback());

    manager.connect();
    let remote = connector.latest().unwrap();
    remote.connect();
    settle().await;

    remote.disconnect("transport close");
    settle().await;

    assert_eq!(disconnects.calls(), vec![json!({ "isConnected": false })]);
    assert!(!manager.is_connected());
    assert!(!manager.keepalive_running());

    tokio::time::sleep(PERIOD * 2).await;
    assert!(remote.emitted("connly_ping").is_empty());

    assert_err!(manager.send_message("lost"));
    assert!(remote.emitted("connly_message").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_client_disconnect_fires_once() {
    let (manager, connector) = setup();
    let disconnects = Recorder::new();
    manager.on_disconnect(disconnects.callback());

    manager.connect();
    let remote = connector.latest().unwrap();
    remote.connect();
    settle().await;

    manager.disconnect();
    assert_eq!(disconnects.count(), 1);
    assert!(remote.is_closed());

    // the transport's own close report is not delivered a second time
    settle().await;
    manager.disconnect();
    assert_eq!(disconnects.count(), 1);
    assert_eq!(manager.metrics().disconnects, 1);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_pings_every_period() {
    let (manager, connector) = setup();
    manager.connect();
    let remote = connector.latest().unwrap();
    remote.connect();
    settle().await;

    tokio::time::sleep(PERIOD - Duration::from_secs(1)).await;
    assert!(remote.emitted("connly_ping").is_empty());

    tokio::time::sleep(PERIOD + Duration::from_secs(2)).await;
    assert_eq!(
        remote.emitted("connly_ping"),
        vec![json!({ "status": "ping" }), json!({ "status": "ping" })]
    );
    assert_eq!(manager.metrics().keepalives_sent, 2);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_connect_keeps_one_handle_and_one_timer() {
    let (manager, connector) = setup();
    let connects = Recorder::new();
    let disconnects = Recorder::new();
    manager.on_connect(connects.callback());
    manager.on_disconnect(disconnects.callback());

    for _ in 0..5 {
        manager.connect();
        connector.latest().unwrap().connect();
        settle().await;
        assert_eq!(connector.open_handles(), 1);
    }

    assert_eq!(connector.opened(), 5);
    assert_eq!(connects.count(), 5);
    assert_eq!(disconnects.count(), 4);

    tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;
    for index in 0..4 {
        let old = connector.remote(index).unwrap();
        assert!(old.is_closed());
        assert!(old.emitted("connly_ping").is_empty());
    }
    assert_eq!(connector.latest().unwrap().emitted("connly_ping").len(), 1);
    assert_eq!(manager.metrics().keepalives_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_detaches_old_handle() {
    let (manager, connector) = setup();
    let connects = Recorder::new();
    let messages = Recorder::new();
    manager.on_connect(connects.callback());
    manager.on_message(messages.callback());

    manager.connect();
    let first = connector.latest().unwrap();
    first.connect();
    settle().await;
    assert_eq!(connects.count(), 1);

    manager.connect();
    let second = connector.latest().unwrap();
    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert!(!manager.is_connected());

    // late signals from the old handle go nowhere
    first.connect();
    first.deliver("connly_on_message", json!("stale"));
    settle().await;
    assert_eq!(connects.count(), 1);
    assert!(messages.calls().is_empty());
    assert!(!manager.is_connected());

    second.connect();
    second.deliver("connly_on_message", json!("fresh"));
    settle().await;
    assert_eq!(connects.count(), 2);
    assert_eq!(messages.calls(), vec![json!("fresh")]);
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_transport_reconnect_on_same_handle() {
    let (manager, connector) = setup();
    let connects = Recorder::new();
    manager.on_connect(connects.callback());

    manager.connect();
    let remote = connector.latest().unwrap();
    remote.connect();
    settle().await;

    remote.disconnect("ping timeout");
    settle().await;
    assert!(!manager.keepalive_running());

    remote.connect();
    settle().await;
    assert!(manager.is_connected());
    assert!(manager.keepalive_running());
    assert_eq!(connects.count(), 2);

    tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;
    assert_eq!(remote.emitted("connly_ping").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_connect_signal_replaces_timer() {
    let (manager, connector) = setup();
    manager.connect();
    let remote = connector.latest().unwrap();
    remote.connect();
    settle().await;

    tokio::time::sleep(PERIOD / 2).await;
    remote.connect();
    settle().await;

    // the first timer would have fired here
    tokio::time::sleep(PERIOD / 2 + Duration::from_secs(1)).await;
    assert!(remote.emitted("connly_ping").is_empty());

    tokio::time::sleep(PERIOD / 2).await;
    assert_eq!(remote.emitted("connly_ping").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_errors_do_not_change_state() {
    let (manager, connector) = setup();
    let errors = Recorder::new();
    manager.on_error(errors.callback());

    manager.connect();
    let remote = connector.latest().unwrap();
    remote.connect_error(json!("xhr poll error"));
    settle().await;
    assert!(!manager.is_connected());

    remote.connect();
    remote.error(json!({ "code": 500 }));
    settle().await;
    assert!(manager.is_connected());

    assert_eq!(
        errors.calls(),
        vec![json!("xhr poll error"), json!({ "code": 500 })]
    );
    assert_eq!(manager.metrics().errors, 2);
}

#[tokio::test(start_paused = true)]
async fn test_refused_handle_reports_error() {
    let (manager, connector) = setup();
    let errors = Recorder::new();
    manager.on_error(errors.callback());

    connector.refuse_next("invalid url");
    manager.connect();
    settle().await;

    assert_eq!(errors.count(), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(connector.opened(), 0);

    manager.connect();
    connector.latest().unwrap().connect();
    settle().await;
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_releases_pending_acks() {
    let (manager, connector) = setup();
    manager.connect();
    let remote = connector.latest().unwrap();
    remote.connect();
    settle().await;

    let acks = Recorder::new();
    assert_ok!(manager.send_message_with_ack("unanswered", acks.callback()));
    manager.disconnect();
    settle().await;

    assert!(!remote.acknowledge("connly_message", json!("late")));
    assert!(acks.calls().is_empty());
    assert_eq!(manager.metrics().acks_received, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_callbacks_follow_state_under_races() {
    let (manager, connector) = setup();
    let statuses = Recorder::new();
    manager.on_connect(statuses.callback());
    manager.on_disconnect(statuses.callback());

    for round in 0..200 {
        manager.connect();
        connector.latest().unwrap().connect();
        if round % 2 == 0 {
            tokio::task::yield_now().await;
        }
        manager.disconnect();

        // whatever won the race, the last report matches the state
        let calls = statuses.calls();
        if let Some(last) = calls.last() {
            assert_eq!(last, &json!({ "isConnected": false }), "round {round}");
        }
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    for pair in statuses.calls().chunks(2) {
        assert_eq!(
            pair,
            &[json!({ "isConnected": true }), json!({ "isConnected": false })][..]
        );
    }
}
