use std::{sync::Arc, time::Duration};

use log::*;
use serde_json::json;
use tokio::{runtime::Runtime, sync::watch};
use ton_payment_engine::{
    outbox::EventStatus,
    processor::{TOPIC_INTENT_CREATE, TOPIC_INTENT_CREATED},
    test_utils::{prepare_test_env, random_db_path},
    IntentProcessor,
    IntentStore,
    MemoryLedger,
    Outbox,
    PaymentMatcher,
};
use uuid::Uuid;

const NUM_INTENTS: u64 = 20;
const RATE: u64 = 100; // intent requests per second

#[test]
fn burst_intents() {
    info!("🚀️ Starting intent injection test");

    let sys = Runtime::new().unwrap();

    let delay = Duration::from_millis(1000 / RATE);

    sys.block_on(async move {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let outbox = Outbox::new_with_url(&url, 5).await.expect("Error creating outbox");
        let store = Arc::new(IntentStore::new("EQ_MERCHANT", chrono::Duration::minutes(20)));
        let processor =
            IntentProcessor::new(outbox.clone(), PaymentMatcher::new(MemoryLedger::default()), store, NUM_INTENTS as usize)
                .with_ticks(Duration::from_millis(20), Duration::from_millis(100));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(processor.run(shutdown_rx));

        let mut timer = tokio::time::interval(delay);
        info!("🚀️ Injecting {NUM_INTENTS} intent requests");
        for i in 0..NUM_INTENTS {
            timer.tick().await;
            let request = json!({"orderId": Uuid::new_v4().to_string(), "amountTon": format!("{}.0", i + 1)});
            if let Err(e) = outbox.publish(TOPIC_INTENT_CREATE, &request, None).await {
                panic!("Error publishing intent request {i}: {e}");
            }
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let rows = outbox.events_for_topic(TOPIC_INTENT_CREATE).await.expect("Error fetching events");
            if rows.len() == NUM_INTENTS as usize && rows.iter().all(|r| r.status == EventStatus::Done) {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "intent requests were not drained in time");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let created = outbox.events_for_topic(TOPIC_INTENT_CREATED).await.expect("Error fetching events");
        assert_eq!(created.len(), NUM_INTENTS as usize);

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    });
    info!("🚀️ test complete");
}
