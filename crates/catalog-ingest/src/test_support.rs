//! Helpers shared by the crate's tests.

use std::io::Write;

use axum::Router;
use flate2::Compression;
use flate2::write::GzEncoder;

/// Serve `router` on an ephemeral local port and return its base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Gzip-compress `data`.
pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// `count` valid feed lines with codes `first..first + count`.
pub(crate) fn product_lines(first: u64, count: u64) -> String {
    (first..first + count)
        .map(|code| format!("{{\"code\":\"{code:013}\",\"product_name\":\"Product {code}\"}}\n"))
        .collect()
}
