//! Lifecycle supervisor integration tests
//!
//! Real listeners on loopback: bind, serve, drain and teardown across both
//! transports.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use campus_core::lifecycle::{
    Launcher, LifecycleEvent, Phase, StopOutcome, Supervisor, TerminationSignal, Transport,
    TransportKind,
};
use campus_core::service::grpc_health_routes;
use campus_core::{CampusError, ServiceConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

const TEST_HEALTH_SERVICE: &str = "campus.test.v1.Test";

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn http_router() -> Router {
    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "late"
            }),
        )
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

async fn accepts(addr: SocketAddr) -> bool {
    matches!(
        timeout(Duration::from_millis(500), TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

async fn health_client(addr: SocketAddr) -> HealthClient<Channel> {
    let channel = Channel::from_shared(format!("http://{}", addr))
        .unwrap()
        .connect()
        .await
        .unwrap();
    HealthClient::new(channel)
}

/// Park a request inside `/slow` so the HTTP drain cannot finish.
async fn stuck_request(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /slow HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    stream
}

async fn dual_supervisor(grace: Duration) -> Supervisor {
    Supervisor::new("lifecycle-test", grace)
        .launcher(Launcher::http(loopback(), http_router()))
        .launcher(Launcher::grpc(
            loopback(),
            grpc_health_routes(TEST_HEALTH_SERVICE).await,
        ))
}

/// Transport whose serve routine ends on its own.
struct BrokenTransport {
    fail: bool,
}

#[async_trait]
impl Transport for BrokenTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Grpc
    }

    async fn serve(
        self: Box<Self>,
        _listener: TcpListener,
        _shutdown: CancellationToken,
    ) -> campus_core::Result<()> {
        if self.fail {
            Err(CampusError::Serve {
                transport: TransportKind::Grpc,
                message: "connection reset".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn test_both_transports_serve_then_drain_on_request() {
    let running = dual_supervisor(Duration::from_secs(5)).await.start().await;
    assert_eq!(*running.phase().borrow(), Phase::Running);

    let http = running.local_addr(TransportKind::Http).unwrap();
    let grpc = running.local_addr(TransportKind::Grpc).unwrap();

    let response = http_get(http, "/ping").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("pong"));

    {
        let mut client = health_client(grpc).await;
        let reply = client
            .check(HealthCheckRequest {
                service: TEST_HEALTH_SERVICE.to_string(),
            })
            .await
            .unwrap()
            .into_inner();
        assert_eq!(reply.status, ServingStatus::Serving as i32);
    }

    let phase = running.phase();
    assert!(running.handle().trigger());

    let report = timeout(Duration::from_secs(10), running.wait())
        .await
        .expect("drain must finish within the grace period");

    assert_eq!(report.trigger, LifecycleEvent::ShutdownRequested);
    assert!(!report.is_failure());
    assert_eq!(report.transports.len(), 2);
    assert_eq!(
        report.transport(TransportKind::Http).unwrap().outcome,
        StopOutcome::Graceful
    );
    assert_eq!(
        report.transport(TransportKind::Grpc).unwrap().outcome,
        StopOutcome::Graceful
    );
    assert_eq!(*phase.borrow(), Phase::Exited);

    assert!(!accepts(http).await);
    assert!(!accepts(grpc).await);
}

#[tokio::test]
async fn test_http_bind_failure_tears_down_grpc() {
    let occupied = std::net::TcpListener::bind(loopback()).unwrap();
    let taken = occupied.local_addr().unwrap();

    let running = Supervisor::new("lifecycle-test", Duration::from_secs(5))
        .launcher(Launcher::http(taken, http_router()))
        .launcher(Launcher::grpc(
            loopback(),
            grpc_health_routes(TEST_HEALTH_SERVICE).await,
        ))
        .start()
        .await;

    assert_eq!(running.local_addr(TransportKind::Http), None);
    let grpc = running.local_addr(TransportKind::Grpc).unwrap();

    let report = timeout(Duration::from_secs(10), running.wait())
        .await
        .expect("bind failure must end the supervisor");

    assert!(report.is_failure());
    assert!(matches!(
        report.trigger,
        LifecycleEvent::BindFailed { transport: TransportKind::Http, address, .. } if address == taken
    ));
    assert_eq!(
        report.transport(TransportKind::Http).unwrap().outcome,
        StopOutcome::NotStarted
    );
    assert_eq!(
        report.transport(TransportKind::Grpc).unwrap().outcome,
        StopOutcome::Graceful
    );
    assert!(!accepts(grpc).await);
}

#[tokio::test]
async fn test_graceful_stop_is_bounded() {
    let running = dual_supervisor(Duration::from_millis(300)).await.start().await;
    let http = running.local_addr(TransportKind::Http).unwrap();

    let _stuck = stuck_request(http).await;

    running.handle().trigger();
    let report = timeout(Duration::from_secs(5), running.wait())
        .await
        .expect("forced abort must bound the drain");

    assert_eq!(
        report.transport(TransportKind::Http).unwrap().outcome,
        StopOutcome::Forced
    );
    assert!(!accepts(http).await);
}

#[tokio::test]
async fn test_second_signal_forces_stop() {
    let running = dual_supervisor(Duration::from_secs(30)).await.start().await;
    let http = running.local_addr(TransportKind::Http).unwrap();

    let _stuck = stuck_request(http).await;

    let events = running.events();
    events.emit(LifecycleEvent::Signal(TerminationSignal::Terminate));
    let forcer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        events.emit(LifecycleEvent::Signal(TerminationSignal::Interrupt));
    });

    let report = timeout(Duration::from_secs(5), running.wait())
        .await
        .expect("second signal must force the stop");
    forcer.await.unwrap();

    assert_eq!(
        report.trigger,
        LifecycleEvent::Signal(TerminationSignal::Terminate)
    );
    assert!(!report.is_failure());
    assert_eq!(
        report.transport(TransportKind::Http).unwrap().outcome,
        StopOutcome::Forced
    );
}

#[tokio::test]
async fn test_ports_refuse_while_draining() {
    let running = dual_supervisor(Duration::from_secs(2)).await.start().await;
    let http = running.local_addr(TransportKind::Http).unwrap();
    let grpc = running.local_addr(TransportKind::Grpc).unwrap();
    let phase = running.phase();

    // In-flight work on both transports keeps the drain open.
    let _stuck = stuck_request(http).await;
    let mut client = health_client(grpc).await;
    let _watch = client
        .watch(HealthCheckRequest {
            service: TEST_HEALTH_SERVICE.to_string(),
        })
        .await
        .unwrap()
        .into_inner();

    running.handle().trigger();
    let draining = tokio::spawn(running.wait());
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(*phase.borrow(), Phase::Draining);
    assert!(!accepts(http).await);
    assert!(!accepts(grpc).await);

    let report = timeout(Duration::from_secs(10), draining)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        report.transport(TransportKind::Http).unwrap().outcome,
        StopOutcome::Forced
    );
}

#[tokio::test]
async fn test_failure_drain_needs_two_signals_to_force() {
    let running = dual_supervisor(Duration::from_millis(800)).await.start().await;
    let http = running.local_addr(TransportKind::Http).unwrap();
    let _stuck = stuck_request(http).await;

    let events = running.events();
    events.emit(LifecycleEvent::ServeFailed {
        transport: TransportKind::Grpc,
        reason: "connection reset".to_string(),
    });
    events.emit(LifecycleEvent::Signal(TerminationSignal::Interrupt));

    let started = Instant::now();
    let report = timeout(Duration::from_secs(5), running.wait())
        .await
        .unwrap();

    // One signal after a failure trigger leaves the grace period intact.
    assert!(started.elapsed() >= Duration::from_millis(700));
    assert!(report.is_failure());
    assert_eq!(
        report.transport(TransportKind::Http).unwrap().outcome,
        StopOutcome::Forced
    );
}

#[tokio::test]
async fn test_repeated_trigger_is_harmless() {
    let running = dual_supervisor(Duration::from_secs(5)).await.start().await;
    let handle = running.handle();

    assert!(handle.trigger());
    handle.trigger();
    handle.trigger();

    let report = timeout(Duration::from_secs(10), running.wait())
        .await
        .unwrap();

    assert_eq!(report.trigger, LifecycleEvent::ShutdownRequested);
    assert_eq!(report.transports.len(), 2);
    // Supervisor is gone: the request is dropped instead of blocking.
    assert!(!handle.trigger());
}

#[tokio::test]
async fn test_serve_failure_triggers_shutdown() {
    let running = Supervisor::new("lifecycle-test", Duration::from_secs(5))
        .launcher(Launcher::http(loopback(), http_router()))
        .launcher(Launcher::new(loopback(), BrokenTransport { fail: true }))
        .start()
        .await;
    let http = running.local_addr(TransportKind::Http).unwrap();

    let report = timeout(Duration::from_secs(10), running.wait())
        .await
        .unwrap();

    assert!(report.is_failure());
    assert!(matches!(
        report.trigger,
        LifecycleEvent::ServeFailed { transport: TransportKind::Grpc, .. }
    ));
    assert_eq!(
        report.transport(TransportKind::Grpc).unwrap().outcome,
        StopOutcome::Exited
    );
    assert_eq!(
        report.transport(TransportKind::Http).unwrap().outcome,
        StopOutcome::Graceful
    );
    assert!(!accepts(http).await);
}

#[tokio::test]
async fn test_unexpected_clean_exit_is_a_failure() {
    let running = Supervisor::new("lifecycle-test", Duration::from_secs(5))
        .launcher(Launcher::new(loopback(), BrokenTransport { fail: false }))
        .start()
        .await;

    let report = timeout(Duration::from_secs(10), running.wait())
        .await
        .unwrap();

    assert_eq!(
        report.trigger,
        LifecycleEvent::ServeExited {
            transport: TransportKind::Grpc,
            after_shutdown: false,
        }
    );
    assert!(report.is_failure());
}

#[tokio::test]
async fn test_configured_ports_accept_then_stop() {
    let config = ServiceConfig::from_lookup("profiles-service", |name| match name {
        "BIND_HOST" => Some("127.0.0.1".to_string()),
        "HTTP_PORT" => Some("18080".to_string()),
        "GRPC_PORT" => Some("19090".to_string()),
        _ => None,
    })
    .unwrap();

    let running = Supervisor::from_config(&config)
        .launcher(Launcher::http(config.http_addr, http_router()))
        .launcher(Launcher::grpc(
            config.grpc_addr,
            grpc_health_routes(TEST_HEALTH_SERVICE).await,
        ))
        .start()
        .await;

    assert!(accepts(config.http_addr).await);
    assert!(accepts(config.grpc_addr).await);

    running.handle().trigger();
    timeout(Duration::from_secs(30), running.wait())
        .await
        .expect("both ports must stop within the shutdown timeout");

    assert!(!accepts(config.http_addr).await);
    assert!(!accepts(config.grpc_addr).await);
}
