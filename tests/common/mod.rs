//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use ws_proxy::lifecycle::{Service, ServiceError, ServiceRef, StopLatch};

/// What a mock service's `start` does.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Resolve `Ok` once `stop` has been called.
    BlockUntilStopped,
    /// Fail right away, like a listener that cannot bind.
    FailImmediately(&'static str),
    /// Return `Ok` right away.
    ReturnImmediately,
    /// Panic inside `start`.
    Panic,
    /// Never resolve, even after `stop`.
    Hang,
}

/// Service that records how it was driven.
pub struct MockService {
    name: &'static str,
    behaviour: Behaviour,
    stop_delay: Duration,
    stop_error: Option<&'static str>,
    stop_panics: bool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    stopped_at: Mutex<Option<Instant>>,
    latch: StopLatch,
}

impl MockService {
    pub fn new(name: &'static str, behaviour: Behaviour) -> Self {
        Self {
            name,
            behaviour,
            stop_delay: Duration::ZERO,
            stop_error: None,
            stop_panics: false,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            stopped_at: Mutex::new(None),
            latch: StopLatch::new(),
        }
    }

    pub fn blocking(name: &'static str) -> Arc<Self> {
        Arc::new(Self::new(name, Behaviour::BlockUntilStopped))
    }

    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn with_stop_error(mut self, message: &'static str) -> Self {
        self.stop_error = Some(message);
        self
    }

    pub fn with_stop_panic(mut self) -> Self {
        self.stop_panics = true;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// When the last `stop` call returned.
    pub fn stopped_at(&self) -> Option<Instant> {
        *self.stopped_at.lock().unwrap()
    }
}

impl Service for MockService {
    fn name(&self) -> &str {
        self.name
    }

    fn start(&self) -> BoxFuture<'_, Result<(), ServiceError>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        async move {
            match &self.behaviour {
                Behaviour::BlockUntilStopped => {
                    self.latch.wait().await;
                    Ok(())
                }
                Behaviour::FailImmediately(message) => Err(ServiceError::failed(*message)),
                Behaviour::ReturnImmediately => Ok(()),
                Behaviour::Panic => panic!("{} panicked in start", self.name),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }
        .boxed()
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), ServiceError>> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        async move {
            self.latch.trigger();
            if !self.stop_delay.is_zero() {
                tokio::time::sleep(self.stop_delay).await;
            }
            if self.stop_panics {
                panic!("{} panicked in stop", self.name);
            }
            *self.stopped_at.lock().unwrap() = Some(Instant::now());
            match self.stop_error {
                Some(message) => Err(ServiceError::failed(message)),
                None => Ok(()),
            }
        }
        .boxed()
    }
}

/// Upcast for `Registry::add_shared`.
pub fn as_ref(service: &Arc<MockService>) -> ServiceRef {
    Arc::clone(service) as ServiceRef
}

/// TCP server echoing everything back on every connection.
pub async fn start_echo_server(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        loop {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => {
                                    if socket.write_all(&buf[..n]).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Poll until something accepts TCP connections on `addr`.
pub async fn wait_for_listener(addr: SocketAddr) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("nothing listening on {addr}");
}
