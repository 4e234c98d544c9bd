// crates/publisher-store-redis/tests/redis_store.rs
// ============================================================================
// Module: Redis Store Integration Tests
// Description: Status, counter, lock, and stream adapters against real Redis.
// Purpose: Verify command semantics the in-memory backends only model.
// Dependencies: publisher-store-redis, publisher-core, testcontainers, tokio
// ============================================================================

//! ## Overview
//! Starts Redis in a container (or uses `PUBLISHER_TEST_REDIS_URL`) and drives
//! every adapter through its trait. Ignored by default because Docker is
//! required.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::env;
use std::time::Duration;

use publisher_core::EventType;
use publisher_core::Envelope;
use publisher_core::JobStatus;
use publisher_core::RequestId;
use publisher_core::interfaces::BrokerProducer;
use publisher_core::interfaces::BrokerSubscription;
use publisher_core::interfaces::CounterStore;
use publisher_core::interfaces::LockBackend;
use publisher_core::interfaces::StatusStore;
use publisher_store_redis::RedisCounterStore;
use publisher_store_redis::RedisLock;
use publisher_store_redis::RedisStatusStore;
use publisher_store_redis::RedisStreamBroker;
use publisher_store_redis::StreamSettings;
use publisher_store_redis::connect;
use redis::aio::MultiplexedConnection;
use serde_json::json;
use testcontainers::ContainerAsync;
use testcontainers::GenericImage;
use testcontainers::core::IntoContainerPort;
use testcontainers::core::WaitFor;
use testcontainers::runners::AsyncRunner;

// ============================================================================
// SECTION: Status Store
// ============================================================================

/// Tests seeding is set-if-absent and transitions are set-if-present.
#[tokio::test]
#[ignore = "requires docker"]
async fn status_writes_are_conditional() {
    let fixture = RedisFixture::start().await.unwrap();
    let store = RedisStatusStore::new(fixture.connection().await);
    let id = RequestId::generate();
    let ttl = Duration::from_secs(60);

    assert!(!store.set_if_present(&id, JobStatus::Processing).await.unwrap());
    assert!(store.get(&id).await.unwrap().is_none());

    assert!(store.set_if_absent(&id, JobStatus::Queued, ttl).await.unwrap());
    assert!(store.set_if_present(&id, JobStatus::Processing).await.unwrap());
    assert!(!store.set_if_absent(&id, JobStatus::Queued, ttl).await.unwrap());
    assert_eq!(store.get(&id).await.unwrap(), Some(JobStatus::Processing));
}

/// Tests transitions keep the TTL set when the job was seeded.
#[tokio::test]
#[ignore = "requires docker"]
async fn status_transition_keeps_ttl() {
    let fixture = RedisFixture::start().await.unwrap();
    let mut conn = fixture.connection().await;
    let store = RedisStatusStore::new(conn.clone());
    let id = RequestId::generate();

    store.set_if_absent(&id, JobStatus::Queued, Duration::from_secs(300)).await.unwrap();
    store.set_if_present(&id, JobStatus::Success).await.unwrap();

    let ttl: i64 = redis::cmd("TTL").arg(id.as_str()).query_async(&mut conn).await.unwrap();
    assert!(ttl > 0 && ttl <= 300, "ttl was {ttl}");
}

/// Tests unknown status strings surface as corrupt values.
#[tokio::test]
#[ignore = "requires docker"]
async fn unknown_status_is_corrupt() {
    let fixture = RedisFixture::start().await.unwrap();
    let mut conn = fixture.connection().await;
    let store = RedisStatusStore::new(conn.clone());
    let id = RequestId::generate();

    let _: () = redis::cmd("SET").arg(id.as_str()).arg("exploded").query_async(&mut conn).await.unwrap();

    let err = store.get(&id).await.unwrap_err();
    assert!(err.to_string().contains("exploded"));
}

/// Tests results are stored beside the status under the result key.
#[tokio::test]
#[ignore = "requires docker"]
async fn results_use_result_key() {
    let fixture = RedisFixture::start().await.unwrap();
    let mut conn = fixture.connection().await;
    let store = RedisStatusStore::new(conn.clone());
    let id = RequestId::generate();

    assert!(store.get_result(&id).await.unwrap().is_none());
    store.put_result(&id, r#"{"repo":"hub.example.com/pingcap/tidb"}"#, Duration::from_secs(60)).await.unwrap();

    let raw: String = redis::cmd("GET").arg(id.result_key()).query_async(&mut conn).await.unwrap();
    assert_eq!(raw, r#"{"repo":"hub.example.com/pingcap/tidb"}"#);
    assert_eq!(store.get_result(&id).await.unwrap().as_deref(), Some(raw.as_str()));
}

// ============================================================================
// SECTION: Counters
// ============================================================================

/// Tests increments are sequential and prefix deletion is literal.
#[tokio::test]
#[ignore = "requires docker"]
async fn counters_increment_and_reset_by_prefix() {
    let fixture = RedisFixture::start().await.unwrap();
    let counters = RedisCounterStore::new(fixture.connection().await);
    let prefix = format!("ratelimit:tiup:{}:", RequestId::generate());
    let first = format!("{prefix}tidb:linux:amd64");
    let second = format!("{prefix}tikv:linux:arm64");
    let lookalike = format!("{}*other", prefix.trim_end_matches(':'));

    assert_eq!(counters.increment(&first).await.unwrap(), 1);
    assert_eq!(counters.increment(&first).await.unwrap(), 2);
    assert_eq!(counters.increment(&second).await.unwrap(), 1);
    assert_eq!(counters.increment(&lookalike).await.unwrap(), 1);
    counters.expire(&first, Duration::from_secs(60)).await.unwrap();

    assert_eq!(counters.delete_prefix(&prefix).await.unwrap(), 2);
    assert_eq!(counters.increment(&first).await.unwrap(), 1);
    assert_eq!(counters.increment(&lookalike).await.unwrap(), 2);
}

// ============================================================================
// SECTION: Lock
// ============================================================================

/// Tests only the holder token releases the lock.
#[tokio::test]
#[ignore = "requires docker"]
async fn lock_release_requires_holder_token() {
    let fixture = RedisFixture::start().await.unwrap();
    let lock = RedisLock::new(fixture.connection().await);
    let name = format!("global/mutex/{}", RequestId::generate());
    let lease = Duration::from_secs(30);

    assert!(lock.try_acquire(&name, "holder", lease).await.unwrap());
    assert!(!lock.try_acquire(&name, "other", lease).await.unwrap());
    assert!(!lock.release(&name, "other").await.unwrap());
    assert!(lock.release(&name, "holder").await.unwrap());
    assert!(lock.try_acquire(&name, "other", lease).await.unwrap());
}

/// Tests an expired lease can be taken by another holder.
#[tokio::test]
#[ignore = "requires docker"]
async fn lock_lease_expires() {
    let fixture = RedisFixture::start().await.unwrap();
    let lock = RedisLock::new(fixture.connection().await);
    let name = format!("global/mutex/{}", RequestId::generate());

    assert!(lock.try_acquire(&name, "holder", Duration::from_millis(100)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(lock.try_acquire(&name, "other", Duration::from_secs(30)).await.unwrap());
    assert!(!lock.release(&name, "holder").await.unwrap());
}

// ============================================================================
// SECTION: Stream Broker
// ============================================================================

/// Tests a published batch is delivered in order through a consumer group.
#[tokio::test]
#[ignore = "requires docker"]
async fn stream_delivers_batch_in_order() {
    let fixture = RedisFixture::start().await.unwrap();
    let stream = format!("publish-jobs-{}", RequestId::generate());
    let broker = RedisStreamBroker::new(fixture.connection().await, stream.clone());
    let mut subscription =
        RedisStreamBroker::subscribe(fixture.connection().await, settings(&stream, "mirror-a", "w1"))
            .await
            .unwrap();
    let batch = vec![envelope("staging"), envelope("prod")];

    broker.publish_batch(&batch).await.unwrap();

    let first = subscription.receive().await.unwrap();
    let second = subscription.receive().await.unwrap();
    assert_eq!(first.envelope, batch[0]);
    assert_eq!(second.envelope, batch[1]);
    subscription.ack(&first).await.unwrap();
    subscription.nack(&second).await.unwrap();
}

/// Tests unacknowledged entries are replayed to a restarted consumer.
#[tokio::test]
#[ignore = "requires docker"]
async fn stream_replays_pending_entries() {
    let fixture = RedisFixture::start().await.unwrap();
    let stream = format!("publish-jobs-{}", RequestId::generate());
    let broker = RedisStreamBroker::new(fixture.connection().await, stream.clone());
    let job = envelope("staging");
    broker.publish_batch(std::slice::from_ref(&job)).await.unwrap();

    let mut crashed =
        RedisStreamBroker::subscribe(fixture.connection().await, settings(&stream, "mirror-a", "w1"))
            .await
            .unwrap();
    let first = crashed.receive().await.unwrap();
    drop(crashed);

    let mut restarted =
        RedisStreamBroker::subscribe(fixture.connection().await, settings(&stream, "mirror-a", "w1"))
            .await
            .unwrap();
    let replayed = restarted.receive().await.unwrap();
    assert_eq!(replayed.receipt, first.receipt);
    assert_eq!(replayed.envelope, job);
    restarted.ack(&replayed).await.unwrap();
}

/// Tests each consumer group sees every entry.
#[tokio::test]
#[ignore = "requires docker"]
async fn stream_groups_are_independent() {
    let fixture = RedisFixture::start().await.unwrap();
    let stream = format!("publish-jobs-{}", RequestId::generate());
    let broker = RedisStreamBroker::new(fixture.connection().await, stream.clone());
    let mut staging =
        RedisStreamBroker::subscribe(fixture.connection().await, settings(&stream, "mirror-staging", "w1"))
            .await
            .unwrap();
    let mut prod =
        RedisStreamBroker::subscribe(fixture.connection().await, settings(&stream, "mirror-prod", "w1"))
            .await
            .unwrap();
    let job = envelope("prod");
    broker.publish_batch(std::slice::from_ref(&job)).await.unwrap();

    let declined = staging.receive().await.unwrap();
    staging.nack(&declined).await.unwrap();
    let claimed = prod.receive().await.unwrap();
    assert_eq!(claimed.envelope.id, job.id);
}

/// Tests undecodable entries are skipped instead of stalling the consumer.
#[tokio::test]
#[ignore = "requires docker"]
async fn stream_skips_undecodable_entries() {
    let fixture = RedisFixture::start().await.unwrap();
    let stream = format!("publish-jobs-{}", RequestId::generate());
    let mut conn = fixture.connection().await;
    let broker = RedisStreamBroker::new(conn.clone(), stream.clone());
    let mut subscription =
        RedisStreamBroker::subscribe(fixture.connection().await, settings(&stream, "mirror-a", "w1"))
            .await
            .unwrap();
    let _: String = redis::cmd("XADD")
        .arg(&stream)
        .arg("*")
        .arg("data")
        .arg("not json")
        .query_async(&mut conn)
        .await
        .unwrap();
    let job = envelope("staging");
    broker.publish_batch(std::slice::from_ref(&job)).await.unwrap();

    let delivery = subscription.receive().await.unwrap();
    assert_eq!(delivery.envelope, job);
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Redis server for one test.
struct RedisFixture {
    /// Connection URL.
    url: String,
    /// Container kept alive for the fixture lifetime.
    _container: Option<ContainerAsync<GenericImage>>,
}

impl RedisFixture {
    /// Uses `PUBLISHER_TEST_REDIS_URL` or starts a Redis container.
    async fn start() -> Result<Self, String> {
        if let Ok(url) = env::var("PUBLISHER_TEST_REDIS_URL") {
            return Ok(Self {
                url,
                _container: None,
            });
        }
        ensure_docker_available()?;
        let container = GenericImage::new("redis", "7-alpine")
            .with_exposed_port(6379.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
            .start()
            .await
            .map_err(|err| format!("failed to start redis container: {err}"))?;
        let port = container
            .get_host_port_ipv4(6379.tcp())
            .await
            .map_err(|err| format!("failed to resolve redis port: {err}"))?;
        Ok(Self {
            url: format!("redis://127.0.0.1:{port}"),
            _container: Some(container),
        })
    }

    /// Opens a fresh multiplexed connection.
    async fn connection(&self) -> MultiplexedConnection {
        connect(&self.url).await.unwrap()
    }
}

/// Builds stream settings with a short blocking read.
fn settings(stream: &str, group: &str, consumer: &str) -> StreamSettings {
    StreamSettings {
        stream: stream.to_string(),
        group: group.to_string(),
        consumer: consumer.to_string(),
        block_ms: 200,
    }
}

/// Builds a mirror envelope routed to `subject`.
fn envelope(subject: &str) -> Envelope {
    Envelope::compose(
        EventType::TiupPublish,
        "publisher-tests",
        subject,
        &json!({"name": "tidb", "version": "v8.5.0"}),
    )
    .unwrap()
}

/// Fails fast when Docker is not reachable.
fn ensure_docker_available() -> Result<(), String> {
    let output = std::process::Command::new("docker")
        .arg("info")
        .output()
        .map_err(|err| format!("docker info failed: {err}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("docker info failed: {stderr}"));
    }
    Ok(())
}
