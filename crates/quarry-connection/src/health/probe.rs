//! Reachability and liveness probes used when opening and validating connections

use std::io;
use std::time::{Duration, Instant};

use quarry_core::{Connection, QuarryError, Result, Value};
use tokio::net::TcpStream;

/// Trivial statement whose single scalar result must be `1`
pub const LIVENESS_QUERY: &str = "SELECT 1";

/// Open and immediately drop a TCP connection to `address`.
///
/// Fails fast with [`QuarryError::Connectivity`] so an unreachable host is
/// reported without attempting the protocol handshake.
pub async fn probe_reachability(address: &str, timeout: Duration) -> Result<Duration> {
    let start = Instant::now();
    let outcome = tokio::time::timeout(timeout, TcpStream::connect(address)).await;
    let elapsed = start.elapsed();

    let source = match outcome {
        Ok(Ok(_stream)) => return Ok(elapsed),
        Ok(Err(e)) => e,
        Err(_) => io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no answer within {:?}", timeout),
        ),
    };

    tracing::debug!(%address, ?elapsed, error = %source, "reachability probe failed");
    Err(QuarryError::Connectivity {
        address: address.to_string(),
        elapsed,
        source,
    })
}

/// Run [`LIVENESS_QUERY`] and require exactly one row holding `1`
pub async fn check_liveness(conn: &dyn Connection) -> Result<Duration> {
    if conn.is_closed() {
        return Err(QuarryError::Liveness("connection is closed".into()));
    }

    let start = Instant::now();
    let result = conn
        .query(LIVENESS_QUERY)
        .await
        .map_err(|e| QuarryError::Liveness(format!("probe query failed: {}", e)))?;

    match (result.row_count(), result.scalar()) {
        (1, Some(value)) if value.as_i64() == Some(1) => Ok(start.elapsed()),
        (rows, value) => Err(QuarryError::Liveness(format!(
            "expected a single row holding 1, got {} row(s) starting with {}",
            rows,
            value.unwrap_or(&Value::Null)
        ))),
    }
}
