//! Network reachability checks shared by socket-based adapters

use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::debug;

use super::{AdapterError, AdapterOperationResult};

/// Open a TCP connection to `host:port` within `timeout`
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, AdapterError> {
    let address = format!("{}:{}", host, port);
    debug!("Dialing {}", address);

    match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(AdapterError::ConnectionFailed(format!("{}: {}", address, e))),
        Err(_) => Err(AdapterError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Check plain TCP reachability and report latency
pub async fn tcp_reachable(host: &str, port: u16, timeout: Duration) -> AdapterOperationResult {
    let start = Instant::now();
    match connect(host, port, timeout).await {
        Ok(_) => AdapterOperationResult::success(format!("Connected to {}:{}", host, port))
            .with_detail("latencyMs", start.elapsed().as_millis()),
        Err(e) => AdapterOperationResult::failure(format!(
            "Cannot reach {}:{}: {}",
            host, port, e
        )),
    }
}

/// Read the greeting line a server sends on connect
pub async fn read_banner(host: &str, port: u16, timeout: Duration) -> Result<String, AdapterError> {
    let mut stream = connect(host, port, timeout).await?;
    let mut buf = vec![0u8; 512];

    let read = tokio::time::timeout(timeout, stream.read(&mut buf))
        .await
        .map_err(|_| AdapterError::Timeout(timeout.as_millis() as u64))??;

    let text = String::from_utf8_lossy(&buf[..read]);
    Ok(text.lines().next().unwrap_or_default().trim().to_string())
}

/// Connect to a server and check its banner starts with `expected`
pub async fn banner_matches(
    host: &str,
    port: u16,
    timeout: Duration,
    expected: &str,
) -> AdapterOperationResult {
    let start = Instant::now();
    match read_banner(host, port, timeout).await {
        Ok(banner) if banner.starts_with(expected) => {
            AdapterOperationResult::success(format!("{}:{} answered: {}", host, port, banner))
                .with_detail("latencyMs", start.elapsed().as_millis())
        }
        Ok(banner) => AdapterOperationResult::failure(format!(
            "Unexpected greeting from {}:{}: '{}'",
            host, port, banner
        )),
        Err(e) => AdapterOperationResult::failure(format!(
            "Cannot reach {}:{}: {}",
            host, port, e
        )),
    }
}

/// Split `host:port`, falling back to `default_port`
pub fn split_host_port(endpoint: &str, default_port: u16) -> Result<(String, u16), AdapterError> {
    let endpoint = endpoint.trim();
    match endpoint.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| AdapterError::InvalidProperty {
                property: "endpoint".to_string(),
                message: format!("invalid port in '{}'", endpoint),
            })?;
            Ok((host.to_string(), port))
        }
        _ if !endpoint.is_empty() => Ok((endpoint.to_string(), default_port)),
        _ => Err(AdapterError::InvalidProperty {
            property: "endpoint".to_string(),
            message: "empty endpoint".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("broker-1:9093", 9092).unwrap(),
            ("broker-1".to_string(), 9093)
        );
        assert_eq!(
            split_host_port("broker-1", 9092).unwrap(),
            ("broker-1".to_string(), 9092)
        );
        assert!(split_host_port("broker:notaport", 9092).is_err());
        assert!(split_host_port("", 9092).is_err());
    }

    #[tokio::test]
    async fn test_banner_check() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 ready\r\n").await.unwrap();
        });

        let result = banner_matches("127.0.0.1", port, Duration::from_secs(2), "220").await;
        assert!(result.success, "{}", result.message);
    }

    #[tokio::test]
    async fn test_unreachable_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = tcp_reachable("127.0.0.1", port, Duration::from_millis(500)).await;
        assert!(!result.success);
    }
}
