//! Function invocation tests over the in-memory loopback transport.
//!
//! Exercises the whole request path: an invocation request arriving on the
//! wire, dispatch through the registry, handler execution and the correlated
//! result message going back out.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use voicewire::{
    BufferSink, ChannelPeer, ChannelTransport, ClientEvent, FunctionDescriptor, FunctionRegistry,
    ParamType, ServerEvent, Session, SessionOptions, SessionPhase, TransportEvent, handler_fn,
};

fn session_with(registry: FunctionRegistry) -> (Arc<Session>, ChannelPeer) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (transport, inbound, peer) = ChannelTransport::pair();
    let session = Session::new(
        SessionOptions::new("key1").with_instructions("assistant"),
        Arc::new(registry),
        Arc::new(BufferSink::new()),
        Arc::new(transport),
    );
    session.spawn(inbound);
    (session, peer)
}

async fn activate(session: &Arc<Session>, peer: &mut ChannelPeer, functions_loaded: u32) {
    session.start().await.expect("Should start");
    // Drain the start message
    peer.sent.recv().await.expect("Should see start message");
    for event in [
        ServerEvent::AuthSucceeded {
            credits_remaining: 100.0,
        },
        ServerEvent::SessionReady {
            cost_per_minute: 1.0,
            functions_loaded,
            message: "ready".to_string(),
        },
    ] {
        peer.inject
            .send(TransportEvent::Event(event))
            .await
            .expect("Should inject");
    }
    for _ in 0..200 {
        if session.phase() == SessionPhase::Active {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("Session never became active");
}

async fn request(peer: &ChannelPeer, call_id: &str, name: &str, arguments: Value) {
    peer.inject
        .send(TransportEvent::Event(ServerEvent::InvocationRequested {
            function_name: name.to_string(),
            arguments,
            call_id: call_id.to_string(),
        }))
        .await
        .expect("Should inject invocation request");
}

async fn next_result(peer: &mut ChannelPeer) -> (String, String, Value) {
    match tokio::time::timeout(Duration::from_secs(1), peer.sent.recv())
        .await
        .expect("Timed out waiting for invocation result")
        .expect("Outbound channel closed")
    {
        ClientEvent::InvocationResult {
            call_id,
            function_name,
            result,
        } => (call_id, function_name, result),
        other => panic!("Expected InvocationResult, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invocation_round_trip() {
    let mut registry = FunctionRegistry::new();
    registry.register(
        FunctionDescriptor::new("getWeather", "Fetch current weather").with_param(
            "city",
            ParamType::String,
            true,
            "City name",
        ),
        handler_fn(|args| async move {
            let city = args["city"].as_str().ok_or("missing city")?;
            Ok(json!({"city": city, "temp_c": 21}))
        }),
    );
    let (session, mut peer) = session_with(registry);
    activate(&session, &mut peer, 1).await;

    request(&peer, "call-1", "getWeather", json!({"city": "Paris"})).await;

    let (call_id, name, result) = next_result(&mut peer).await;
    assert_eq!(call_id, "call-1");
    assert_eq!(name, "getWeather");
    assert_eq!(result["status"], "success");
    assert_eq!(result["result"]["city"], "Paris");
    assert_eq!(session.outstanding_invocations(), 0);
}

#[tokio::test]
async fn test_unknown_function_gets_error_result() {
    let mut registry = FunctionRegistry::new();
    registry.register(
        FunctionDescriptor::new("getWeather", "Fetch current weather"),
        handler_fn(|_| async { Ok(Value::Null) }),
    );
    let (session, mut peer) = session_with(registry);
    activate(&session, &mut peer, 1).await;

    // No handler registered under this name
    request(&peer, "call-1", "getForecast", json!({"city": "Paris"})).await;

    let (call_id, name, result) = next_result(&mut peer).await;
    assert_eq!(call_id, "call-1");
    assert_eq!(name, "getForecast");
    assert_eq!(result["status"], "error");
    assert_eq!(result["available"], json!(["getWeather"]));

    // The session is unaffected
    assert_eq!(session.phase(), SessionPhase::Active);
}

#[tokio::test]
async fn test_failing_handler_does_not_stall_others() {
    let mut registry = FunctionRegistry::new();
    registry.register(
        FunctionDescriptor::new("broken", "Always fails"),
        handler_fn(|_| async { Err("backend unavailable".to_string()) }),
    );
    registry.register(
        FunctionDescriptor::new("healthy", "Always works"),
        handler_fn(|_| async { Ok(json!("ok")) }),
    );
    let (session, mut peer) = session_with(registry);
    activate(&session, &mut peer, 2).await;

    request(&peer, "call-a", "broken", json!({})).await;
    request(&peer, "call-b", "healthy", json!({})).await;

    let mut results = std::collections::HashMap::new();
    for _ in 0..2 {
        let (call_id, _, result) = next_result(&mut peer).await;
        results.insert(call_id, result);
    }

    assert_eq!(results["call-a"]["status"], "error");
    assert_eq!(results["call-a"]["error"], "backend unavailable");
    assert_eq!(results["call-b"]["status"], "success");
    assert_eq!(session.phase(), SessionPhase::Active);
}

#[tokio::test]
async fn test_slow_handler_completes_out_of_order() {
    let mut registry = FunctionRegistry::new();
    registry.register(
        FunctionDescriptor::new("slow", "Slow lookup"),
        handler_fn(|_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!("slow"))
        }),
    );
    registry.register(
        FunctionDescriptor::new("fast", "Fast lookup"),
        handler_fn(|_| async { Ok(json!("fast")) }),
    );
    let (session, mut peer) = session_with(registry);
    activate(&session, &mut peer, 2).await;

    request(&peer, "call-slow", "slow", json!({})).await;
    request(&peer, "call-fast", "fast", json!({})).await;

    let (first, ..) = next_result(&mut peer).await;
    let (second, ..) = next_result(&mut peer).await;
    assert_eq!(first, "call-fast");
    assert_eq!(second, "call-slow");
}

#[tokio::test]
async fn test_invocation_before_active_is_ignored() {
    let mut registry = FunctionRegistry::new();
    registry.register(
        FunctionDescriptor::new("getWeather", "Fetch current weather"),
        handler_fn(|_| async { Ok(Value::Null) }),
    );
    let (session, mut peer) = session_with(registry);

    // Still idle; the request is a protocol violation and produces nothing
    request(&peer, "call-1", "getWeather", json!({})).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(peer.sent.try_recv().is_err());
    assert_eq!(session.outstanding_invocations(), 0);
}

#[tokio::test]
async fn test_session_end_discards_in_flight_invocations() {
    let mut registry = FunctionRegistry::new();
    registry.register(
        FunctionDescriptor::new("slow", "Slow lookup"),
        handler_fn(|_| async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            Ok(json!("late"))
        }),
    );
    let (session, mut peer) = session_with(registry);
    activate(&session, &mut peer, 1).await;

    request(&peer, "call-1", "slow", json!({})).await;
    for _ in 0..200 {
        if session.outstanding_invocations() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    peer.inject
        .send(TransportEvent::Event(ServerEvent::SessionEnded {
            reason: "server shutdown".to_string(),
            total_credits_used: None,
            remaining_credits: None,
        }))
        .await
        .expect("Should inject");

    for _ in 0..200 {
        if session.phase() == SessionPhase::Idle {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(session.outstanding_invocations(), 0);

    // The handler finishes after teardown; its result never reaches the wire
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(peer.sent.try_recv().is_err());
}
