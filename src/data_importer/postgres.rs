// PostgreSQL store backed by tokio-postgres and COPY FROM STDIN
use crate::data_importer::copy_format::encode_text_row;
use crate::data_importer::store::BulkStore;
use crate::error::Result;
use crate::types::{quote_ident, Column, TableRef};
use bytes::Bytes;
use futures_util::SinkExt;
use std::pin::Pin;
use std::time::Duration;
use tokio_postgres::{Client, CopyInSink, NoTls};
use tracing::{debug, error, info};

/// Connection settings for the target database
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub connection_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionConfig {
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .connect_timeout(self.connection_timeout)
            .application_name("pgfeed");
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        config
    }
}

/// [`BulkStore`] over a single PostgreSQL connection
pub struct PgStore {
    client: Client,
}

impl PgStore {
    /// Connect and spawn the connection driver task
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connecting to PostgreSQL"
        );
        let (client, connection) = config.to_pg_config().connect(NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Connection error: {}", e);
            }
        });

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn column_list(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

impl BulkStore for PgStore {
    type Channel = Pin<Box<CopyInSink<Bytes>>>;

    async fn ensure_schema(&mut self, schema: &str) -> Result<()> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema));
        debug!(sql = %sql, "Ensuring schema");
        self.client.batch_execute(&sql).await?;
        Ok(())
    }

    async fn create_relation(&mut self, table: &TableRef, columns: &[Column]) -> Result<()> {
        let definitions = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type.sql_name()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("CREATE TABLE IF NOT EXISTS {} ({})", table.quoted(), definitions);
        debug!(sql = %sql, "Creating relation");
        self.client.batch_execute(&sql).await?;
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn prepare_bulk_append(
        &mut self,
        table: &TableRef,
        columns: &[Column],
    ) -> Result<Self::Channel> {
        let sql = format!("COPY {} ({}) FROM STDIN", table.quoted(), column_list(columns));
        debug!(sql = %sql, "Preparing bulk append");
        let sink: CopyInSink<Bytes> = self.client.copy_in(sql.as_str()).await?;
        Ok(Box::pin(sink))
    }

    async fn append(&mut self, channel: &mut Self::Channel, values: &[Option<&str>]) -> Result<()> {
        // The sink only fails when the connection is gone, which ends the session
        channel.feed(encode_text_row(values)).await?;
        Ok(())
    }

    async fn finalize_bulk_append(&mut self, mut channel: Self::Channel) -> Result<u64> {
        let rows = channel.as_mut().finish().await?;
        Ok(rows)
    }

    async fn commit(&mut self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }
}
