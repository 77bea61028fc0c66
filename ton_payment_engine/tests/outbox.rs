use log::*;
use serde_json::json;
use ton_payment_engine::{
    outbox::EventStatus,
    test_utils::{prepare_test_env, random_db_path},
    Outbox,
};

async fn new_outbox() -> Outbox {
    let url = random_db_path();
    prepare_test_env(&url).await;
    Outbox::new_with_url(&url, 5).await.expect("Error creating outbox")
}

#[tokio::test]
async fn keyed_publish_is_idempotent() {
    let outbox = new_outbox().await;
    let payload = json!({"orderId": "2c340a3e-91ee-4d67-9cd2-19a700ab12cd"});

    let first = outbox.publish("pay.intent.created", &payload, Some("order:1")).await.unwrap();
    let second = outbox.publish("pay.intent.created", &payload, Some("order:1")).await.unwrap();
    assert!(first.was_published());
    assert!(!second.was_published());

    let rows = outbox.events_for_topic("pay.intent.created").await.unwrap();
    assert_eq!(rows.len(), 1);
    info!("📬️ duplicate keyed publish collapsed to one row");

    // The same key on a different topic is a different message
    let other = outbox.publish("pay.payment.confirmed", &payload, Some("order:1")).await.unwrap();
    assert!(other.was_published());
}

#[tokio::test]
async fn unkeyed_publishes_never_collapse() {
    let outbox = new_outbox().await;
    let payload = json!({"n": 1});
    assert!(outbox.publish("pay.intent.create", &payload, None).await.unwrap().was_published());
    assert!(outbox.publish("pay.intent.create", &payload, Some("  ")).await.unwrap().was_published());
    let rows = outbox.events_for_topic("pay.intent.create").await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn concurrent_claimants_get_disjoint_rows() {
    let outbox = new_outbox().await;
    for i in 0..20 {
        outbox.publish("pay.intent.create", &json!({ "n": i }), None).await.unwrap();
    }

    let a = outbox.clone();
    let b = outbox.clone();
    let (claimed_a, claimed_b) = tokio::join!(
        async move { a.claim(&["pay.intent.create"], 10).await.unwrap() },
        async move { b.claim(&["pay.intent.create"], 10).await.unwrap() },
    );
    assert_eq!(claimed_a.len() + claimed_b.len(), 20);
    for row_a in &claimed_a {
        assert!(claimed_b.iter().all(|row_b| row_b.id != row_a.id), "row {} claimed twice", row_a.id);
    }

    // Everything is now Processing, so a third claim comes up empty
    let claimed_again = outbox.claim(&["pay.intent.create"], 10).await.unwrap();
    assert!(claimed_again.is_empty());
}

#[tokio::test]
async fn claim_honors_topic_filter_and_order() {
    let outbox = new_outbox().await;
    outbox.publish("pay.intent.create", &json!({"n": 1}), None).await.unwrap();
    outbox.publish("other.topic", &json!({"n": 2}), None).await.unwrap();
    outbox.publish("pay.intent.create", &json!({"n": 3}), None).await.unwrap();

    let rows = outbox.claim(&["pay.intent.create"], 0).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].id < rows[1].id);
    assert!(rows.iter().all(|r| r.topic == "pay.intent.create"));
    assert!(rows.iter().all(|r| r.tries == 1));
}

#[tokio::test]
async fn acked_rows_are_terminal() {
    let outbox = new_outbox().await;
    outbox.publish("pay.intent.create", &json!({"n": 1}), None).await.unwrap();
    let row = outbox.claim(&["pay.intent.create"], 1).await.unwrap().remove(0);
    outbox.ack(row.id).await.unwrap();

    let row = outbox.fetch_event(row.id).await.unwrap().unwrap();
    assert_eq!(row.status, EventStatus::Done);
    assert!(outbox.claim(&["pay.intent.create"], 1).await.unwrap().is_empty());

    // re-acking is a no-op
    outbox.ack(row.id).await.unwrap();
    let row = outbox.fetch_event(row.id).await.unwrap().unwrap();
    assert_eq!(row.status, EventStatus::Done);
}

#[tokio::test]
async fn failed_rows_become_reclaimable_after_backoff() {
    let outbox = new_outbox().await;
    outbox.publish("pay.intent.create", &json!({"n": 1}), None).await.unwrap();
    let row = outbox.claim(&["pay.intent.create"], 1).await.unwrap().remove(0);
    outbox.fail(row.id, "merchant address is not configured", chrono::Duration::milliseconds(200)).await.unwrap();

    let row = outbox.fetch_event(row.id).await.unwrap().unwrap();
    assert_eq!(row.status, EventStatus::Failed);
    assert_eq!(row.last_error.as_deref(), Some("merchant address is not configured"));

    // Invisible while the backoff is pending
    assert!(outbox.claim(&["pay.intent.create"], 1).await.unwrap().is_empty());
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    let reclaimed = outbox.claim(&["pay.intent.create"], 1).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, row.id);
    assert_eq!(reclaimed[0].tries, 2);
}

#[tokio::test]
async fn sweep_removes_only_done_rows() {
    let outbox = new_outbox().await;
    outbox.publish("pay.intent.create", &json!({"n": 1}), None).await.unwrap();
    outbox.publish("pay.intent.create", &json!({"n": 2}), None).await.unwrap();
    let row = outbox.claim(&["pay.intent.create"], 1).await.unwrap().remove(0);
    outbox.ack(row.id).await.unwrap();

    let removed = outbox.sweep_done(chrono::Duration::zero()).await.unwrap();
    assert_eq!(removed, 1);
    assert!(outbox.fetch_event(row.id).await.unwrap().is_none());
    assert_eq!(outbox.events_for_topic("pay.intent.create").await.unwrap().len(), 1);
}
