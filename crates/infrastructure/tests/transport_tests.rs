mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentbus_core::{
    AgentBusError, BrokerMessage, MessageCallback, Qos, Transport, TransportConfig, TransportMode,
};
use agentbus_infrastructure::{
    BrokerTransport, IpcEndpoint, LocalIpcTransport, TransportDeps, TransportFactory,
};
use common::MockBrokerClient;
use serde_json::{json, Value};

fn fast_config() -> TransportConfig {
    TransportConfig {
        ipc_poll_timeout_ms: 20,
        publish_timeout_ms: 200,
        subscribe_retry_base_ms: 1,
        ..TransportConfig::default()
    }
}

fn recording_callback(sink: Arc<Mutex<Vec<(String, Value)>>>) -> MessageCallback {
    MessageCallback::sync(move |ctx| {
        sink.lock()
            .unwrap()
            .push((ctx.topic.clone(), ctx.payload.clone()));
        Ok(())
    })
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_local_ipc_pair_delivers_across_endpoints() {
    let config = fast_config();
    let (agent, controller) = LocalIpcTransport::pair(&config);
    let received = Arc::new(Mutex::new(Vec::new()));

    assert!(
        controller
            .subscribe("agents/+/heartbeat", recording_callback(received.clone()))
            .await
    );
    assert!(agent.connect().await);
    assert!(controller.connect().await);

    assert!(agent.publish("agents/a1/heartbeat", &json!({"seq": 1})).await);
    assert!(agent.publish("agents/a1/other", &json!({"seq": 2})).await);

    assert!(wait_until(|| received.lock().unwrap().len() == 1).await);
    assert_eq!(
        received.lock().unwrap()[0],
        ("agents/a1/heartbeat".to_string(), json!({"seq": 1}))
    );
    assert!(wait_until(|| controller.metrics().messages_received == 2).await);

    assert!(agent.disconnect().await);
    assert!(controller.disconnect().await);
}

#[tokio::test]
async fn test_local_ipc_callback_failure_is_isolated() {
    let transport = LocalIpcTransport::loopback(&fast_config());
    let counter = Arc::new(AtomicUsize::new(0));

    transport
        .subscribe("t", MessageCallback::sync(|_ctx| Err(anyhow::anyhow!("nope"))))
        .await;
    let c = counter.clone();
    transport
        .subscribe(
            "t",
            MessageCallback::sync(move |_ctx| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .await;

    transport.connect().await;
    transport.publish("t", &json!("hello")).await;

    assert!(wait_until(|| counter.load(Ordering::SeqCst) == 1).await);
    assert!(wait_until(|| transport.metrics().callback_errors == 1).await);
    transport.disconnect().await;
}

#[tokio::test]
async fn test_local_ipc_disconnect_stops_listener() {
    let config = fast_config();
    let (a_end, b_end) = IpcEndpoint::pair(config.ipc_queue_capacity);
    let receiver = LocalIpcTransport::new(b_end, &config);
    let received = Arc::new(Mutex::new(Vec::new()));
    receiver.subscribe("x", recording_callback(received.clone())).await;

    receiver.connect().await;
    assert!(receiver.disconnect().await);
    assert!(!receiver.is_connected());

    a_end
        .send_queue
        .put(agentbus_core::TransferMessage::new("x", json!(1)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(received.lock().unwrap().is_empty());
    assert_eq!(receiver.pending_messages(), 1);
}

#[tokio::test]
async fn test_broker_transport_rejects_operations_before_connect() {
    let client = MockBrokerClient::new();
    let transport = BrokerTransport::new(client.clone(), &fast_config());

    assert!(!transport.publish("a/b", &json!({})).await);
    assert!(!transport.subscribe("a/b", MessageCallback::sync(|_| Ok(()))).await);
    assert!(!transport.unsubscribe("a/b").await);
    assert!(client.published.lock().unwrap().is_empty());
    assert!(client.subscribe_calls.lock().unwrap().is_empty());
    assert_eq!(transport.mode(), TransportMode::MqttBroker);
}

#[tokio::test]
async fn test_broker_transport_publishes_json() {
    let client = MockBrokerClient::new();
    let transport = BrokerTransport::new(client.clone(), &fast_config());
    assert!(transport.connect().await);

    assert!(transport.publish("cmd/run", &json!({"task": "build"})).await);
    assert!(transport.publish_with("cmd/run", &json!(1), Qos::ExactlyOnce, true).await);
    assert!(!transport.publish("cmd/#", &json!(1)).await);

    let published = client.published.lock().unwrap();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].0, "cmd/run");
    assert_eq!(
        serde_json::from_slice::<Value>(&published[0].1).unwrap(),
        json!({"task": "build"})
    );
    assert_eq!(published[1].2, Qos::ExactlyOnce);
    assert!(published[1].3);
}

#[tokio::test]
async fn test_broker_transport_pumps_inbound_messages() {
    let (client, inject) = MockBrokerClient::with_incoming();
    let transport = BrokerTransport::new(client.clone(), &fast_config());
    let received = Arc::new(Mutex::new(Vec::new()));

    assert!(transport.connect().await);
    assert!(
        transport
            .subscribe("fleet/#", recording_callback(received.clone()))
            .await
    );

    inject
        .send(BrokerMessage::json("fleet/a/pos", &json!([1, 2]), Qos::AtMostOnce, false).unwrap())
        .await
        .unwrap();
    inject
        .send(BrokerMessage::new("fleet/a/pos", b"garbage".to_vec(), Qos::AtMostOnce, false))
        .await
        .unwrap();

    assert!(wait_until(|| received.lock().unwrap().len() == 1).await);
    let registry = transport.registry();
    assert!(wait_until(|| registry.metrics().decode_errors == 1).await);

    assert!(transport.disconnect().await);
    assert_eq!(client.disconnects.load(Ordering::SeqCst), 1);

    // 重新连接后沿用同一入站流
    assert!(transport.connect().await);
    inject
        .send(BrokerMessage::json("fleet/b", &json!("hi"), Qos::AtMostOnce, false).unwrap())
        .await
        .unwrap();
    assert!(wait_until(|| received.lock().unwrap().len() == 2).await);
    transport.disconnect().await;
}

#[tokio::test]
async fn test_broker_transport_push_delivery_ignored_when_disconnected() {
    let client = MockBrokerClient::new();
    let transport = BrokerTransport::new(client, &fast_config());
    let message = BrokerMessage::json("a", &json!({}), Qos::AtMostOnce, false).unwrap();
    assert_eq!(transport.handle_message(message.clone()).await, 0);

    transport.connect().await;
    transport.subscribe("a", MessageCallback::sync(|_| Ok(()))).await;
    assert_eq!(transport.handle_message(message).await, 1);
}

#[tokio::test]
async fn test_broker_disconnect_waits_for_in_flight_push_delivery() {
    let client = MockBrokerClient::new();
    let transport = Arc::new(BrokerTransport::new(client, &fast_config()));
    let finished = Arc::new(AtomicUsize::new(0));

    assert!(transport.connect().await);
    let counter = finished.clone();
    assert!(
        transport
            .subscribe(
                "slow/topic",
                MessageCallback::from_async(move |_| {
                    let counter = counter.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<(), anyhow::Error>(())
                    }
                }),
            )
            .await
    );

    let message = BrokerMessage::json("slow/topic", &json!({}), Qos::AtMostOnce, false).unwrap();
    let pusher = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.handle_message(message).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(transport.disconnect().await);
    // 进行中的回调在disconnect返回前已经结束
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(pusher.await.unwrap(), 1);

    let late = BrokerMessage::json("slow/topic", &json!({}), Qos::AtMostOnce, false).unwrap();
    assert_eq!(transport.handle_message(late).await, 0);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    // 断开后注册表不再持有代理客户端
    let registry = transport.registry();
    assert!(!registry.subscribe("other/topic", None, Qos::AtMostOnce).await);
}

#[tokio::test]
async fn test_factory_selects_implementation_by_mode() {
    let local = TransportFactory::create(&fast_config(), TransportDeps::default()).unwrap();
    assert_eq!(local.mode(), TransportMode::LocalIpc);

    let client = MockBrokerClient::new();
    let broker = TransportFactory::create_from_mode_str(
        "MQTT_BROKER",
        &fast_config(),
        TransportDeps::with_broker_client(client),
    )
    .unwrap();
    assert_eq!(broker.mode(), TransportMode::MqttBroker);
    assert!(broker.connect().await);

    let unknown =
        TransportFactory::create_from_mode_str("zeromq", &fast_config(), TransportDeps::default());
    assert!(matches!(unknown, Err(AgentBusError::Configuration(_))));
}

#[tokio::test]
async fn test_factory_rejects_invalid_config() {
    let config = TransportConfig {
        ipc_queue_capacity: 0,
        ..TransportConfig::default()
    };
    assert!(TransportFactory::create(&config, TransportDeps::default()).is_err());
}
