//! Integration tests for the network shield
//!
//! These tests use wiremock servers on 127.0.0.1. Each test trusts exactly
//! the mock server's socket address and maps a test host name onto it with
//! a static resolver, so any redirect to another loopback port is still
//! classified and blocked.

mod fetch_tests;
mod shield_tests;

use network_shield::destination::StaticResolver;
use network_shield::DestinationRules;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::MockServer;

pub const TEST_HOST: &str = "careers.test";

pub fn loopback() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

/// Rules that trust only the given mock server
pub fn trusting(server: &MockServer) -> DestinationRules {
    DestinationRules::default().trust_endpoint(*server.address())
}

/// Resolver mapping the test host onto the mock server
pub fn resolver() -> StaticResolver {
    StaticResolver::new().with_host(TEST_HOST, [loopback()])
}

/// URL on the test host for `path`, using the mock server's port
pub fn url_for(server: &MockServer, path: &str) -> String {
    format!("http://{}:{}{}", TEST_HOST, server.address().port(), path)
}

/// Serves one canned HTTP/1.1 response on 127.0.0.1
///
/// For replies wiremock cannot produce: chunked bodies with no
/// `Content-Length`, or raw bytes in header values.
pub async fn serve_raw(response: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind((loopback(), 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        let _ = socket.write_all(response).await;
        let _ = socket.shutdown().await;
    });

    addr
}
