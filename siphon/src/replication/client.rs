use std::io::BufReader;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use pg_escape::quote_literal;
use rustls::ClientConfig;
use secrecy::ExposeSecret;
use siphon_config::shared::SourceConfig;
use siphon_postgres::slots::WAL2JSON;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, Config, Connection, NoTls, SimpleQueryMessage, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, debug, error, info};

use crate::error::{ErrorKind, SiphonError, SiphonResult};
use crate::replication::source::{RawChange, SlotSource, SnapshotSource};
use crate::siphon_error;
use crate::types::{PgLsn, TableName};

/// Spawns a background task driving a Postgres connection until it terminates.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        match connection.await {
            Err(err) => error!("an error occurred during the postgres connection: {}", err),
            Ok(()) => info!("postgres connection terminated successfully"),
        }
    }
    .instrument(span);

    // The connection ends on its own once the owning `Client` is dropped.
    tokio::spawn(task);
}

/// Builds the wal2json option list shared by peek and confirm calls.
///
/// With no tables the plugin emits changes for every table.
fn wal2json_options(table_names: &[TableName]) -> String {
    let mut options = String::from("'pretty-print', '1'");
    if !table_names.is_empty() {
        let tables = table_names
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        options.push_str(", 'add-tables', ");
        options.push_str(&quote_literal(&tables));
    }

    options
}

/// Regular (non replication) connection to the source database, used for snapshots and for
/// the SQL level slot functions.
#[derive(Debug, Clone)]
pub struct PgSourceClient {
    client: Arc<Client>,
}

impl PgSourceClient {
    /// Connects to the source, using TLS when enabled in `source`.
    pub async fn connect(source: &SourceConfig) -> SiphonResult<Self> {
        let config: Config = source
            .connection_string
            .expose_secret()
            .parse()
            .map_err(|err: tokio_postgres::Error| {
                siphon_error!(
                    ErrorKind::ConfigError,
                    "Invalid source connection string",
                    err
                )
            })?;

        match source.tls.enabled {
            true => Self::connect_tls(config, &source.tls.trusted_root_certs).await,
            false => Self::connect_no_tls(config).await,
        }
    }

    async fn connect_no_tls(config: Config) -> SiphonResult<Self> {
        let (client, connection) = config.connect(NoTls).await?;
        spawn_postgres_connection::<NoTls>(connection);

        info!("successfully connected to postgres without tls");

        Ok(PgSourceClient {
            client: Arc::new(client),
        })
    }

    async fn connect_tls(config: Config, trusted_root_certs: &str) -> SiphonResult<Self> {
        let mut root_store = rustls::RootCertStore::empty();
        let mut root_certs_reader = BufReader::new(trusted_root_certs.as_bytes());
        for cert in rustls_pemfile::certs(&mut root_certs_reader) {
            let cert = cert?;
            root_store.add(cert)?;
        }

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let (client, connection) = config.connect(MakeRustlsConnect::new(tls_config)).await?;
        spawn_postgres_connection::<MakeRustlsConnect>(connection);

        info!("successfully connected to postgres with tls");

        Ok(PgSourceClient {
            client: Arc::new(client),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    async fn query_rows(&self, query: &str) -> SiphonResult<Vec<tokio_postgres::SimpleQueryRow>> {
        let rows = self
            .client
            .simple_query(query)
            .await?
            .into_iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .collect();

        Ok(rows)
    }
}

/// Reads a non null text column of a simple query row.
fn column_value(row: &tokio_postgres::SimpleQueryRow, column: &str) -> SiphonResult<String> {
    row.try_get(column)?.map(str::to_string).ok_or_else(|| {
        siphon_error!(
            ErrorKind::SourceSchemaError,
            "Unexpected null value returned by source",
            format!("Column '{column}' was null")
        )
    })
}

#[async_trait]
impl SnapshotSource for PgSourceClient {
    async fn copy_table(
        &self,
        table_name: &TableName,
    ) -> SiphonResult<BoxStream<'static, SiphonResult<Bytes>>> {
        let copy_query = format!("copy {} to stdout;", table_name.as_quoted_identifier());
        debug!(table = %table_name, "starting table copy");

        let stream = self.client.copy_out(copy_query.as_str()).await?;

        Ok(stream.map(|chunk| chunk.map_err(SiphonError::from)).boxed())
    }
}

#[async_trait]
impl SlotSource for PgSourceClient {
    async fn slot_exists(&self, slot_name: &str) -> SiphonResult<bool> {
        let query = format!(
            "select 1 from pg_replication_slots where slot_name = {};",
            quote_literal(slot_name)
        );

        Ok(!self.query_rows(&query).await?.is_empty())
    }

    async fn create_slot(&self, slot_name: &str) -> SiphonResult<()> {
        let query = format!(
            "select 'init' from pg_create_logical_replication_slot({}, {});",
            quote_literal(slot_name),
            quote_literal(WAL2JSON)
        );
        self.client.simple_query(&query).await?;

        Ok(())
    }

    async fn drop_slot(&self, slot_name: &str) -> SiphonResult<()> {
        info!(slot = slot_name, "deleting replication slot");
        let query = format!(
            "select pg_drop_replication_slot({});",
            quote_literal(slot_name)
        );
        self.client.simple_query(&query).await?;

        Ok(())
    }

    async fn peek_changes(
        &self,
        slot_name: &str,
        table_names: &[TableName],
    ) -> SiphonResult<Vec<RawChange>> {
        let query = format!(
            "select lsn::text as lsn, data from pg_logical_slot_peek_changes({}, null, null, {});",
            quote_literal(slot_name),
            wal2json_options(table_names)
        );

        self.query_rows(&query)
            .await?
            .iter()
            .map(|row| {
                Ok(RawChange {
                    lsn: column_value(row, "lsn")?,
                    data: column_value(row, "data")?,
                })
            })
            .collect()
    }

    async fn confirm_changes(
        &self,
        slot_name: &str,
        upto: PgLsn,
        table_names: &[TableName],
    ) -> SiphonResult<()> {
        let query = format!(
            "select count(*) from pg_logical_slot_get_changes({}, {}, null, {});",
            quote_literal(slot_name),
            quote_literal(&upto.to_string()),
            wal2json_options(table_names)
        );
        self.client.simple_query(&query).await?;

        Ok(())
    }

    async fn list_tables(&self) -> SiphonResult<Vec<TableName>> {
        let query = "select table_schema, table_name from information_schema.tables \
            where table_type = 'BASE TABLE' \
            and table_schema not in ('pg_catalog', 'information_schema') \
            order by table_schema, table_name;";

        self.query_rows(query)
            .await?
            .iter()
            .map(|row| {
                Ok(TableName::new(
                    column_value(row, "table_schema")?,
                    column_value(row, "table_name")?,
                ))
            })
            .collect()
    }
}
