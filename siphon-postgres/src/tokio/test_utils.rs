use ::tokio::runtime::Handle;
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

use crate::types::TableName;

/// Connection settings of the server the test databases are created on.
///
/// Read from `TESTS_DATABASE_HOST`, `TESTS_DATABASE_PORT`, `TESTS_DATABASE_USERNAME` and the
/// optional `TESTS_DATABASE_PASSWORD`.
#[derive(Debug, Clone)]
pub struct TestServerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
}

impl TestServerConfig {
    /// # Panics
    ///
    /// Panics when a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
            port: std::env::var("TESTS_DATABASE_PORT")
                .expect("TESTS_DATABASE_PORT must be set")
                .parse()
                .expect("TESTS_DATABASE_PORT must be a valid port number"),
            username: std::env::var("TESTS_DATABASE_USERNAME")
                .expect("TESTS_DATABASE_USERNAME must be set"),
            password: std::env::var("TESTS_DATABASE_PASSWORD").ok(),
        }
    }

    /// Builds a libpq key/value connection string for `database`.
    pub fn connection_string(&self, database: &str) -> String {
        let mut connection_string = format!(
            "host={} port={} user={} dbname={}",
            self.host, self.port, self.username, database
        );
        if let Some(password) = &self.password {
            connection_string.push_str(&format!(" password={password}"));
        }

        connection_string
    }
}

/// A uniquely named database, dropped together with all its connections when this value is
/// dropped.
pub struct PgDatabase {
    pub server: TestServerConfig,
    pub name: String,
    pub client: Client,
}

impl PgDatabase {
    /// Creates a fresh database named after a random uuid.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached or the database cannot be created.
    pub async fn new(server: TestServerConfig) -> Self {
        let name = Uuid::new_v4().to_string();

        let admin = connect(&server.connection_string("postgres")).await;
        admin
            .simple_query(&format!(r#"create database "{name}""#))
            .await
            .expect("Failed to create database");

        let client = connect(&server.connection_string(&name)).await;

        Self {
            server,
            name,
            client,
        }
    }

    /// Connection string pointing to this database.
    pub fn connection_string(&self) -> String {
        self.server.connection_string(&self.name)
    }

    /// Creates `table_name` with the given `(column, type)` pairs.
    pub async fn create_table(
        &self,
        table_name: &TableName,
        columns: &[(&str, &str)],
    ) -> Result<(), tokio_postgres::Error> {
        let columns = columns
            .iter()
            .map(|(name, typ)| format!("{name} {typ}"))
            .collect::<Vec<_>>()
            .join(", ");

        self.client
            .simple_query(&format!(
                "create table {} ({columns})",
                table_name.as_quoted_identifier()
            ))
            .await?;

        Ok(())
    }

    /// Runs `statements` as one simple query, used to seed rows.
    pub async fn run_sql(&self, statements: &str) -> Result<(), tokio_postgres::Error> {
        self.client.simple_query(statements).await?;

        Ok(())
    }
}

impl Drop for PgDatabase {
    fn drop(&mut self) {
        let connection_string = self.server.connection_string("postgres");
        let name = self.name.clone();

        // Requires a multi threaded runtime, which all database tests use.
        ::tokio::task::block_in_place(move || {
            Handle::current().block_on(async move {
                drop_database(&connection_string, &name).await;
            });
        });
    }
}

async fn connect(connection_string: &str) -> Client {
    let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
        .await
        .expect("Failed to connect to Postgres");
    ::tokio::spawn(async move {
        if let Err(err) = connection.await {
            eprintln!("test database connection error: {err}");
        }
    });

    client
}

/// Terminates remaining connections and drops the database, logging instead of panicking.
async fn drop_database(connection_string: &str, name: &str) {
    let client = match tokio_postgres::connect(connection_string, NoTls).await {
        Ok((client, connection)) => {
            ::tokio::spawn(connection);
            client
        }
        Err(err) => {
            eprintln!("warning: failed to connect to Postgres for cleanup: {err}");
            return;
        }
    };

    // Logical slots pin the database, so they go before the database itself. Each statement
    // runs on its own since `drop database` refuses to run inside a transaction block.
    let statements = [
        format!(
            "select pg_terminate_backend(pid) from pg_stat_activity \
             where datname = '{name}' and pid <> pg_backend_pid()"
        ),
        format!(
            "select pg_drop_replication_slot(slot_name) from pg_replication_slots \
             where database = '{name}'"
        ),
        format!(r#"drop database if exists "{name}""#),
    ];

    for statement in statements {
        if let Err(err) = client.simple_query(&statement).await {
            eprintln!("warning: failed to clean up database {name}: {err}");
        }
    }
}
