//! Server bootstrap with graceful shutdown.

use axum::Router;
use if_addrs::get_if_addrs;
use std::net::{IpAddr, SocketAddr};
use tokio::net::{TcpListener, ToSocketAddrs};

pub async fn serve<A: ToSocketAddrs>(addr: A, router: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    if let Ok(addr) = listener.local_addr() {
        log_listener_urls(addr);
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

fn log_listener_urls(addr: SocketAddr) {
    let port = addr.port();
    let ips: Vec<IpAddr> = if addr.ip().is_unspecified() {
        get_if_addrs()
            .into_iter()
            .flatten()
            .map(|interface| interface.ip())
            .filter(|ip| ip.is_ipv4() == addr.is_ipv4())
            .collect()
    } else {
        vec![addr.ip()]
    };

    for ip in ips {
        match ip {
            _ if ip.is_loopback() => tracing::info!("listening on http://localhost:{port}"),
            IpAddr::V4(_) => tracing::info!("listening on http://{ip}:{port}"),
            IpAddr::V6(_) => tracing::info!("listening on http://[{ip}]:{port}"),
        }
    }
}

pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
