use mqtt_link::CommandRouter;
use tokio::sync::mpsc;
use types::WriteCommand;

#[tokio::test]
async fn command_topic_routes_to_write_queue() {
    let (tx, mut rx) = mpsc::channel(4);
    let router = CommandRouter::new("inverter", tx);

    assert!(router.route("inverter/number/charging/current_limit/set", "25.5"));
    let command = rx.try_recv().expect("queued");
    assert_eq!(
        command,
        WriteCommand {
            point: "charging/current_limit".to_string(),
            payload: "25.5".to_string(),
        }
    );
}

#[tokio::test]
async fn foreign_topics_are_ignored() {
    let (tx, mut rx) = mpsc::channel(4);
    let router = CommandRouter::new("inverter", tx);

    assert!(!router.route("other/number/charging/current_limit/set", "1"));
    assert!(!router.route("inverter/number/charging/current_limit/state", "1"));
    assert!(!router.route("inverter/set", "1"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn full_queue_drops_instead_of_blocking() {
    let (tx, mut rx) = mpsc::channel(1);
    let router = CommandRouter::new("inverter", tx);

    assert!(router.route("inverter/button/device/reset/set", "PRESS"));
    assert!(!router.route("inverter/button/device/reset/set", "PRESS"));

    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
}
