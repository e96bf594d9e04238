//! SQL Server connectivity.
//!
//! Connections are opened per call: the repository and the bulk loader
//! each dial their own short-lived connection, so no pool is kept. The
//! connection-test entry point classifies failures into the fixed set of
//! error classes callers present to operators.

pub mod bulk;
pub mod schema;

use std::time::Duration;
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::error::{EngineError, Result};

/// A live SQL Server session.
pub type SqlClient = Client<Compat<TcpStream>>;

/// Open a new connection from an ADO-style connection string.
pub async fn connect(connection_string: &str) -> std::result::Result<SqlClient, tiberius::error::Error> {
    let config = Config::from_ado_string(connection_string)?;
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Client::connect(config, tcp.compat_write()).await
}

/// Like [`connect`] but mapped into the engine error type.
pub(crate) async fn connect_engine(connection_string: &str) -> Result<SqlClient> {
    connect(connection_string)
        .await
        .map_err(|e| EngineError::database("connect", e))
}

/// Classified outcome of a connection test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorClass {
    SslTrustMismatch,
    HostUnresolved,
    NetworkUnreachable,
    AuthenticationFailed,
    DatabaseNotAccessible,
    ServerRefusedOrTimedOut,
    Timeout,
    Other,
}

impl ConnectionErrorClass {
    /// Human-readable explanation shown to operators.
    pub fn message(self) -> &'static str {
        match self {
            Self::SslTrustMismatch => {
                "The server certificate is not trusted (SSL/principal name mismatch)"
            }
            Self::HostUnresolved => "The server host name could not be resolved",
            Self::NetworkUnreachable => "The network path to the server is unreachable",
            Self::AuthenticationFailed => "Authentication failed for the given credentials",
            Self::DatabaseNotAccessible => "The database does not exist or is not accessible",
            Self::ServerRefusedOrTimedOut => {
                "The server refused the connection or did not respond"
            }
            Self::Timeout => "The connection attempt timed out",
            Self::Other => "The connection failed",
        }
    }
}

/// Result of [`test_connection`].
#[derive(Debug, Clone)]
pub struct ConnectionTestResult {
    pub ok: bool,
    pub error_class: Option<ConnectionErrorClass>,
    pub message: String,
    pub details: Option<String>,
}

impl ConnectionTestResult {
    fn success() -> Self {
        Self {
            ok: true,
            error_class: None,
            message: "Connection successful".to_string(),
            details: None,
        }
    }

    fn failure(class: ConnectionErrorClass, details: String) -> Self {
        Self {
            ok: false,
            error_class: Some(class),
            message: class.message().to_string(),
            details: Some(details),
        }
    }
}

/// Open a connection and run a round trip, classifying any failure.
pub async fn test_connection(connection_string: &str, timeout: Duration) -> ConnectionTestResult {
    let attempt = async {
        let mut client = connect(connection_string).await?;
        client.simple_query("SELECT 1").await?.into_row().await?;
        Ok::<_, tiberius::error::Error>(())
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(())) => {
            debug!("Connection test succeeded");
            ConnectionTestResult::success()
        }
        Ok(Err(e)) => ConnectionTestResult::failure(classify_error(&e), e.to_string()),
        Err(_) => ConnectionTestResult::failure(
            ConnectionErrorClass::Timeout,
            format!("No response within {} seconds", timeout.as_secs()),
        ),
    }
}

/// Map a driver error to its operator-facing class.
///
/// Server codes follow the documented mapping (2 host, 53 network,
/// 18456 login, 4060 database, 233/10060/10061 refused or timed out);
/// TLS and socket-level failures are classified from the transport.
fn classify_error(error: &tiberius::error::Error) -> ConnectionErrorClass {
    use tiberius::error::Error;

    let text = error.to_string();
    if is_ssl_trust_message(&text) {
        return ConnectionErrorClass::SslTrustMismatch;
    }

    match error {
        Error::Server(e) => match e.code() {
            2 => ConnectionErrorClass::HostUnresolved,
            53 => ConnectionErrorClass::NetworkUnreachable,
            18456 => ConnectionErrorClass::AuthenticationFailed,
            4060 => ConnectionErrorClass::DatabaseNotAccessible,
            233 | 10060 | 10061 => ConnectionErrorClass::ServerRefusedOrTimedOut,
            _ => ConnectionErrorClass::Other,
        },
        Error::Tls(_) => ConnectionErrorClass::SslTrustMismatch,
        Error::Io { kind, message } => match kind {
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::TimedOut => {
                ConnectionErrorClass::ServerRefusedOrTimedOut
            }
            _ if message.contains("lookup") || message.contains("resolve") => {
                ConnectionErrorClass::HostUnresolved
            }
            _ if message.contains("unreachable") => ConnectionErrorClass::NetworkUnreachable,
            _ => ConnectionErrorClass::Other,
        },
        Error::Routing { .. } => ConnectionErrorClass::NetworkUnreachable,
        _ => ConnectionErrorClass::Other,
    }
}

fn is_ssl_trust_message(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("ssl")
        || lower.contains("certificate")
        || lower.contains("principal name")
        || text.contains("-2146893022")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiberius::error::Error;

    #[test]
    fn test_io_error_classification() {
        let refused = Error::Io {
            kind: std::io::ErrorKind::ConnectionRefused,
            message: "connection refused".to_string(),
        };
        assert_eq!(
            classify_error(&refused),
            ConnectionErrorClass::ServerRefusedOrTimedOut
        );

        let dns = Error::Io {
            kind: std::io::ErrorKind::Other,
            message: "failed to lookup address information".to_string(),
        };
        assert_eq!(classify_error(&dns), ConnectionErrorClass::HostUnresolved);

        let unreachable = Error::Io {
            kind: std::io::ErrorKind::Other,
            message: "network is unreachable".to_string(),
        };
        assert_eq!(
            classify_error(&unreachable),
            ConnectionErrorClass::NetworkUnreachable
        );
    }

    #[test]
    fn test_tls_error_classification() {
        let tls = Error::Tls("handshake failed".to_string());
        assert_eq!(classify_error(&tls), ConnectionErrorClass::SslTrustMismatch);
    }

    #[test]
    fn test_ssl_substring_detection() {
        assert!(is_ssl_trust_message(
            "The certificate chain was issued by an authority that is not trusted"
        ));
        assert!(is_ssl_trust_message("error -2146893022 during handshake"));
        assert!(is_ssl_trust_message("The target principal name is incorrect"));
        assert!(!is_ssl_trust_message("login failed for user"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_classified() {
        // Nothing listens on this port; expect refused/timeout, never ok.
        let result = test_connection(
            "Server=127.0.0.1,1;Database=master;User Id=sa;Password=x;TrustServerCertificate=true",
            Duration::from_secs(2),
        )
        .await;
        assert!(!result.ok);
        assert!(result.error_class.is_some());
    }
}
