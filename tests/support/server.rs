//! A minimal in-process HTTP/1.1 server for integration tests, adapted from
//! the teacher crate's own `tests/support/server.rs`: spawn a listener on a
//! dedicated thread/runtime so it doesn't contend with the test's own
//! runtime, and serve one `hyper::service::service_fn` per connection.

use std::{convert::Infallible, future::Future, net, sync::mpsc as std_mpsc, thread, time::Duration};

use corehttp::Body;
use tokio::{runtime, sync::oneshot};

pub struct Server {
    addr: net::SocketAddr,
    panic_rx: std_mpsc::Receiver<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Server {
    pub fn addr(&self) -> net::SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if !thread::panicking() {
            self.panic_rx.recv_timeout(Duration::from_secs(3)).expect("test server should not panic");
        }
    }
}

#[allow(unused)]
pub fn http<F, Fut>(func: F) -> Server
where
    F: Fn(http::Request<hyper::body::Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = http::Response<Body>> + Send + 'static,
{
    let infallible = move |req| {
        let fut = func(req);
        async move { Ok::<_, Infallible>(fut.await) }
    };

    let test_name = thread::current().name().unwrap_or("<unknown>").to_string();
    thread::spawn(move || {
        let rt = runtime::Builder::new_current_thread().enable_all().build().expect("new rt");
        let listener = rt.block_on(async { tokio::net::TcpListener::bind(&net::SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap() });
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let (panic_tx, panic_rx) = std_mpsc::channel();
        thread::Builder::new()
            .name(format!("test({test_name})-support-server"))
            .spawn(move || {
                rt.block_on(async move {
                    let builder = hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new());
                    loop {
                        tokio::select! {
                            _ = &mut shutdown_rx => break,
                            accepted = listener.accept() => {
                                let (io, _) = accepted.expect("accepted");
                                let func = infallible.clone();
                                let svc = hyper::service::service_fn(func);
                                let builder = builder.clone();
                                tokio::spawn(async move {
                                    let _ = builder.serve_connection(hyper_util::rt::TokioIo::new(io), svc).await;
                                });
                            }
                        }
                    }
                    let _ = panic_tx.send(());
                });
            })
            .expect("thread spawn");
        Server { addr, panic_rx, shutdown_tx: Some(shutdown_tx) }
    })
    .join()
    .unwrap()
}
