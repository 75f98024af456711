//! MySQL/MariaDB transport for the database probes, backed by `mysql_async`.

use std::time::Duration;

use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Row};
use tracing::debug;

use harbor_core::{Credentials, NodeAddress, THREAD_STATE_UNKNOWN};

use crate::database::{BoxFuture, DatabaseConnector, DatabaseSession, ReplicaThreads};
use crate::error::{ProbeError, ProbeResult};

pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Opens one unpooled connection per probe.
#[derive(Debug, Clone, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }
}

/// A single live connection; closed explicitly by the probe.
pub struct MySqlSession {
    conn: Conn,
}

impl DatabaseConnector for MySqlConnector {
    fn connect<'a>(
        &'a self,
        address: &'a NodeAddress,
        credentials: &'a Credentials,
        _timeout: Duration,
    ) -> BoxFuture<'a, ProbeResult<Box<dyn DatabaseSession>>> {
        Box::pin(async move {
            let (host, port) = split_host_port(address.as_str());
            let opts = OptsBuilder::default()
                .ip_or_hostname(host)
                .tcp_port(port)
                .user(Some(credentials.user.clone()))
                .pass(Some(credentials.password.clone()))
                .prefer_socket(false);

            debug!(%address, host, port, "opening mysql connection");
            let conn = Conn::new(opts).await?;
            Ok(Box::new(MySqlSession { conn }) as Box<dyn DatabaseSession>)
        })
    }
}

impl DatabaseSession for MySqlSession {
    fn status_value<'a>(&'a mut self, variable: &'a str) -> BoxFuture<'a, ProbeResult<Option<String>>> {
        Box::pin(async move {
            let query = format!("SHOW GLOBAL STATUS LIKE '{}'", variable.replace('\'', "''"));
            let row: Option<(String, String)> = self.conn.query_first(query).await?;
            Ok(row.map(|(_, value)| value))
        })
    }

    fn replica_threads(&mut self) -> BoxFuture<'_, ProbeResult<Option<ReplicaThreads>>> {
        Box::pin(async move {
            let row: Option<Row> = self.conn.query_first("SHOW SLAVE STATUS").await?;
            Ok(row.map(|row| ReplicaThreads {
                io_running: column_text(&row, "Slave_IO_Running"),
                sql_running: column_text(&row, "Slave_SQL_Running"),
            }))
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(e) = self.conn.disconnect().await {
                debug!(error = %e, "mysql disconnect failed");
            }
        })
    }
}

fn column_text(row: &Row, column: &str) -> String {
    row.get_opt::<String, _>(column)
        .and_then(Result::ok)
        .unwrap_or_else(|| THREAD_STATE_UNKNOWN.to_string())
}

/// Split `host[:port]`; a bare host (or bare IPv6 literal) gets the default port.
fn split_host_port(address: &str) -> (&str, u16) {
    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_MYSQL_PORT);
            return (host, port);
        }
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, port),
            Err(_) => (address, DEFAULT_MYSQL_PORT),
        },
        _ => (address, DEFAULT_MYSQL_PORT),
    }
}

impl From<mysql_async::Error> for ProbeError {
    fn from(e: mysql_async::Error) -> Self {
        match e {
            // ER_ACCESS_DENIED_ERROR
            mysql_async::Error::Server(server) if server.code == 1045 => ProbeError::Auth(server.message),
            mysql_async::Error::Server(server) => ProbeError::Query(server.message),
            mysql_async::Error::Io(io) => ProbeError::Connect(io.to_string()),
            mysql_async::Error::Driver(driver) => ProbeError::Connect(driver.to_string()),
            other => ProbeError::Query(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_bare_host() {
        assert_eq!(split_host_port("10.0.0.21"), ("10.0.0.21", 3306));
        assert_eq!(split_host_port("db1.internal"), ("db1.internal", 3306));
    }

    #[test]
    fn split_host_with_port() {
        assert_eq!(split_host_port("10.0.0.21:3307"), ("10.0.0.21", 3307));
    }

    #[test]
    fn split_ipv6() {
        assert_eq!(split_host_port("[fd00::21]:3307"), ("fd00::21", 3307));
        assert_eq!(split_host_port("[fd00::21]"), ("fd00::21", 3306));
        assert_eq!(split_host_port("fd00::21"), ("fd00::21", 3306));
    }

    #[test]
    fn split_non_numeric_port_keeps_address() {
        assert_eq!(split_host_port("db:mysql"), ("db:mysql", 3306));
    }

    #[tokio::test]
    async fn connect_to_closed_port_is_connect_error() {
        // Port 9 on localhost is almost never listening.
        let connector = MySqlConnector::new();
        let result = connector
            .connect(
                &"127.0.0.1:9".into(),
                &Credentials::parse("root:x"),
                Duration::from_secs(1),
            )
            .await;
        assert!(result.is_err());
    }
}
