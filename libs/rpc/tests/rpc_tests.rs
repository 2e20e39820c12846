use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use wirecall_core::{Args, CallRequest, ErrorKind};
use wirecall_rpc::registry::BoxedMethod;
use wirecall_rpc::{
    call_once, Client, ClientConfig, Error, Listener, MethodRegistry, RpcService, ServerConfig,
    ServiceMethods, ShutdownHandle,
};

type CoreResult<T> = wirecall_core::Result<T>;

fn add(args: Args) -> CoreResult<i64> {
    Ok(args.get::<i64>(0, "a")? + args.get::<i64>(1, "b")?)
}

struct Greeter;

impl RpcService for Greeter {
    fn methods(self: Arc<Self>) -> Vec<BoxedMethod> {
        ServiceMethods::new(self)
            .method("greet", |_, args| {
                let name: String = args.get(0, "name")?;
                Ok::<_, wirecall_core::Error>(format!("hello {name}"))
            })
            .build()
    }
}

fn registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry.register("add", add).unwrap();
    registry.register("echo", |args: Args| args.get::<Value>(0, "x")).unwrap();
    registry
        .register("fail", |args: Args| -> CoreResult<()> {
            let message: String = args.get(0, "message")?;
            Err(wirecall_core::Error::Dispatch(message))
        })
        .unwrap();
    registry
        .register("big", |_| Ok::<_, wirecall_core::Error>("x".repeat(4096)))
        .unwrap();
    registry
        .register("explode", |_| -> CoreResult<()> { panic!("kaboom") })
        .unwrap();
    registry.register_instance(Greeter).unwrap();
    registry
}

fn local_config() -> ServerConfig {
    ServerConfig::default().with_host("127.0.0.1").with_port(0)
}

/// Helper to start a server on a free port
async fn start_with(
    registry: MethodRegistry,
    config: ServerConfig,
) -> (
    SocketAddr,
    ShutdownHandle,
    tokio::task::JoinHandle<wirecall_rpc::Result<()>>,
) {
    let listener = Listener::bind(registry, config).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = listener.shutdown_handle();
    let task = tokio::spawn(listener.accept_loop());
    (addr, handle, task)
}

async fn start() -> SocketAddr {
    start_with(registry(), local_config()).await.0
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_u32(payload.len() as u32).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.flush().await.unwrap();
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Value> {
    let len = stream.read_u32().await? as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(serde_json::from_slice(&buf).unwrap())
}

fn remote_kind(err: &Error) -> ErrorKind {
    err.remote()
        .unwrap_or_else(|| panic!("Expected remote error, got {:?}", err))
        .kind
}

#[tokio::test]
async fn add_two_numbers() {
    let addr = start().await;
    let mut client = Client::connect(addr).await.unwrap();

    let sum = client
        .call("add", vec![json!(2), json!(3)], Map::new())
        .await
        .unwrap();
    assert_eq!(sum, json!(5));
}

#[tokio::test]
async fn unknown_method_leaves_connection_usable() {
    let addr = start().await;
    let mut client = Client::connect(addr).await.unwrap();

    let err = client.call_with("missingMethod", ()).await.unwrap_err();
    assert_eq!(remote_kind(&err), ErrorKind::UnknownMethod);
    assert_eq!(err.remote().unwrap().message, "missingMethod");

    let sum: i64 = client.call_as("add", (1, 1)).await.unwrap();
    assert_eq!(sum, 2);
}

#[tokio::test]
async fn service_methods_are_callable() {
    let addr = start().await;
    let mut client = Client::connect(addr).await.unwrap();

    let greeting: String = client.call_as("greet", ["world"]).await.unwrap();
    assert_eq!(greeting, "hello world");
}

#[tokio::test]
async fn concurrent_clients_get_their_own_responses() {
    let addr = start().await;

    let a = tokio::spawn(async move {
        let mut client = Client::connect(addr).await.unwrap();
        client.call_as::<i64, _>("add", (10, 10)).await.unwrap()
    });
    let b = tokio::spawn(async move {
        let mut client = Client::connect(addr).await.unwrap();
        client.call_as::<i64, _>("add", (1, 2)).await.unwrap()
    });

    assert_eq!(a.await.unwrap(), 20);
    assert_eq!(b.await.unwrap(), 3);
}

#[tokio::test]
async fn many_clients_see_responses_in_order() {
    let addr = start().await;

    let tasks: Vec<_> = (0..8i64)
        .map(|id| {
            tokio::spawn(async move {
                let mut client = Client::connect(addr).await.unwrap();
                for step in 0..20i64 {
                    let sum: i64 = client.call_as("add", (id * 1000, step)).await.unwrap();
                    assert_eq!(sum, id * 1000 + step);
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn echo_returns_values_unchanged() {
    let addr = start().await;
    let mut client = Client::connect(addr).await.unwrap();

    let values = [
        json!(null),
        json!(true),
        json!(42),
        json!(-2.5),
        json!("text with \"quotes\""),
        json!([1, [2, [3]]]),
        json!({"a": {"b": null, "c": [false]}}),
    ];
    for value in values {
        let back = client
            .call("echo", vec![value.clone()], Map::new())
            .await
            .unwrap();
        assert_eq!(back, value);
    }
}

#[tokio::test]
async fn string_result_is_not_an_error() {
    let addr = start().await;
    let mut client = Client::connect(addr).await.unwrap();

    let ok = client.call_with("echo", ["boom"]).await.unwrap();
    assert_eq!(ok, json!("boom"));

    let err = client.call_with("fail", ["boom"]).await.unwrap_err();
    assert_eq!(remote_kind(&err), ErrorKind::Dispatch);
    assert_eq!(err.remote().unwrap().message, "boom");
}

#[tokio::test]
async fn keyword_arguments_bind_by_name() {
    let addr = start().await;
    let mut client = Client::connect(addr).await.unwrap();

    let sum = client.method("add").arg(2).kwarg("b", 40).send().await.unwrap();
    assert_eq!(sum, json!(42));

    let err = client
        .method("add")
        .arg(2)
        .kwarg("a", 40)
        .send()
        .await
        .unwrap_err();
    assert_eq!(remote_kind(&err), ErrorKind::Dispatch);
    assert!(err.remote().unwrap().message.contains("multiple values"));
}

#[tokio::test]
async fn latest_registration_is_served() {
    let mut registry = MethodRegistry::new();
    registry.register("version", |_| Ok::<_, wirecall_core::Error>(1)).unwrap();
    registry.register("version", |_| Ok::<_, wirecall_core::Error>(2)).unwrap();
    let (addr, _, _) = start_with(registry, local_config()).await;

    let mut client = Client::connect(addr).await.unwrap();
    let version: i64 = client.call_as("version", ()).await.unwrap();
    assert_eq!(version, 2);
}

#[tokio::test]
async fn panicking_method_is_reported() {
    let addr = start().await;
    let mut client = Client::connect(addr).await.unwrap();

    let err = client.call_with("explode", ()).await.unwrap_err();
    assert_eq!(remote_kind(&err), ErrorKind::Dispatch);
    assert!(err.remote().unwrap().message.contains("kaboom"));

    assert!(client.is_connected().await);
}

#[tokio::test]
async fn oversized_request_is_refused_before_sending() {
    let addr = start().await;
    let mut client = Client::connect(addr).await.unwrap();

    let err = client
        .call_with("echo", ["y".repeat(2048)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Transport(wirecall_fabric::Error::FrameTooLarge { .. })
    ));

    // Nothing went out, so the connection is still in step
    assert!(client.is_open());
    let sum: i64 = client.call_as("add", (2, 2)).await.unwrap();
    assert_eq!(sum, 4);
}

#[tokio::test]
async fn oversized_request_is_rejected_by_server() {
    let addr = start().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = serde_json::to_vec(&json!(["echo", ["z".repeat(2048)], {}])).unwrap();
    write_frame(&mut stream, &request).await;

    let response = read_frame(&mut stream).await.unwrap();
    assert_eq!(response["ok"], json!(false));
    assert_eq!(response["error"]["kind"], json!("frame_too_large"));

    // The connection is closed afterwards
    assert!(read_frame(&mut stream).await.is_err());
}

#[tokio::test]
async fn oversized_response_becomes_an_error() {
    let addr = start().await;
    let mut client = Client::connect(addr).await.unwrap();

    let err = client.call_with("big", ()).await.unwrap_err();
    assert_eq!(remote_kind(&err), ErrorKind::FrameTooLarge);

    let sum: i64 = client.call_as("add", (3, 4)).await.unwrap();
    assert_eq!(sum, 7);
}

#[tokio::test]
async fn malformed_request_keeps_connection_open() {
    let addr = start().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    write_frame(&mut stream, br#"["add", [1, 2]]"#).await;
    let response = read_frame(&mut stream).await.unwrap();
    assert_eq!(response["error"]["kind"], json!("malformed_request"));

    write_frame(&mut stream, br#"["add", [1, 2], {}]"#).await;
    let response = read_frame(&mut stream).await.unwrap();
    assert_eq!(response, json!({"ok": true, "value": 3}));
}

#[tokio::test]
async fn invalid_json_disconnects_without_reply() {
    let addr = start().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    write_frame(&mut stream, b"test").await;
    assert!(read_frame(&mut stream).await.is_err());

    // Other clients are unaffected
    let mut client = Client::connect(addr).await.unwrap();
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn abrupt_disconnect_does_not_affect_others() {
    let addr = start().await;
    let mut survivor = Client::connect(addr).await.unwrap();

    {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        // Half a length prefix, then gone
        stream.write_all(&[0, 0]).await.unwrap();
    }
    {
        let mut victim = Client::connect(addr).await.unwrap();
        victim.call_as::<i64, _>("add", (1, 1)).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;

    let sum: i64 = survivor.call_as("add", (5, 5)).await.unwrap();
    assert_eq!(sum, 10);
    let mut newcomer = Client::connect(addr).await.unwrap();
    assert!(newcomer.is_connected().await);
}

#[tokio::test]
async fn server_advertises_methods() {
    let addr = start().await;
    let mut client = Client::connect(addr).await.unwrap();

    let expected = vec!["add", "big", "echo", "explode", "fail", "greet"];
    assert_eq!(client.advertised_methods(), expected.as_slice());
    assert_eq!(client.methods().await.unwrap(), expected);
}

#[tokio::test]
async fn liveness_check_and_disconnect() {
    let addr = start().await;
    let mut client = Client::connect(addr).await.unwrap();

    assert!(client.is_connected().await);

    client.disconnect().await;
    client.disconnect().await;

    assert!(!client.is_open());
    assert!(!client.is_connected().await);
    assert!(matches!(
        client.call_with("add", (1, 2)).await,
        Err(Error::NotConnected)
    ));
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let err = Client::connect(addr).await.err().expect("connect should fail");
    assert!(matches!(
        err,
        Error::Transport(wirecall_fabric::Error::Connect { .. })
    ));
}

#[tokio::test]
async fn shutdown_stops_accepting_but_keeps_handlers() {
    let (addr, handle, task) = start_with(registry(), local_config()).await;
    let mut client = Client::connect(addr).await.unwrap();

    handle.shutdown();
    handle.shutdown();
    assert!(handle.is_shutdown());
    task.await.unwrap().unwrap();

    assert!(TcpStream::connect(addr).await.is_err());

    let sum: i64 = client.call_as("add", (20, 22)).await.unwrap();
    assert_eq!(sum, 42);
}

#[tokio::test]
async fn connections_beyond_limit_are_told_busy() {
    let config = local_config().with_max_connections(1);
    let (addr, _, _) = start_with(registry(), config).await;

    let mut first = Client::connect(addr).await.unwrap();

    let err = Client::connect(addr).await.err().expect("second client should be refused");
    assert_eq!(remote_kind(&err), ErrorKind::ServerBusy);

    first.disconnect().await;

    // The slot frees up once the first handler notices the disconnect
    let mut retries = 0;
    let mut second = loop {
        match Client::connect(addr).await {
            Ok(client) => break client,
            Err(_) if retries < 50 => {
                retries += 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("Slot never freed: {:?}", e),
        }
    };
    assert!(second.is_connected().await);
}

#[tokio::test]
async fn one_off_call() {
    let addr = start().await;
    let config = ClientConfig::default()
        .with_host("127.0.0.1")
        .with_port(addr.port());

    let request = CallRequest::new("add").with_args(vec![json!(7), json!(8)]);
    assert_eq!(call_once(&config, &request).await.unwrap(), json!(15));

    let request = CallRequest::new("nope");
    let err = call_once(&config, &request).await.unwrap_err();
    assert_eq!(remote_kind(&err), ErrorKind::UnknownMethod);
}

#[tokio::test]
async fn request_timeout_applies_to_calls() {
    // A server that accepts but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let config = ClientConfig::default()
        .with_host("127.0.0.1")
        .with_port(addr.port())
        .with_request_timeout(Duration::from_millis(100));

    let err = Client::connect_with(config).await.err().expect("should time out");
    assert!(matches!(
        err,
        Error::Transport(wirecall_fabric::Error::Timeout(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn slow_methods_on_separate_connections_overlap() {
    let mut registry = MethodRegistry::new();
    registry
        .register("slow", |_| {
            std::thread::sleep(Duration::from_millis(500));
            Ok::<_, wirecall_core::Error>("done")
        })
        .unwrap();
    let (addr, _, _) = start_with(registry, local_config()).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(Client::connect(addr).await.unwrap());
    }

    let started = std::time::Instant::now();
    let tasks: Vec<_> = clients
        .into_iter()
        .map(|mut client| {
            tokio::spawn(async move { client.call_as::<String, _>("slow", ()).await.unwrap() })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), "done");
    }

    // Serialized on the single worker this would take 1.5s
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_millis(1200), "took {:?}", elapsed);
}

#[tokio::test]
async fn busy_replies_are_capped() {
    let config = local_config()
        .with_max_connections(1)
        .with_max_busy_replies(1);
    let (addr, _, _) = start_with(registry(), config).await;

    let _first = Client::connect(addr).await.unwrap();

    // Takes the only busy-reply slot and holds it by staying connected
    let mut waiting = TcpStream::connect(addr).await.unwrap();
    let response = read_frame(&mut waiting).await.unwrap();
    assert_eq!(response["error"]["kind"], json!("server_busy"));

    // No slot left: closed without any reply
    let mut dropped = TcpStream::connect(addr).await.unwrap();
    assert!(read_frame(&mut dropped).await.is_err());
}
