use anyhow::Result;
use clap::Parser;
use diesel::{Connection, PgConnection};
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use inventory_service::api;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(name = "inventory-service")]
struct Args {
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    #[arg(long, env = "DATABASE_HOST", default_value = "localhost")]
    database_host: String,

    #[arg(long, env = "DATABASE_PORT", default_value = "5432")]
    database_port: u16,

    #[arg(long, env = "DATABASE_USER", default_value = "postgres")]
    database_user: String,

    #[arg(long, env = "DATABASE_PASSWORD", default_value = "postgres")]
    database_password: String,

    #[arg(long, env = "DATABASE_NAME", default_value = "inventory_db")]
    database_name: String,

    #[arg(long, env = "SERVICE_NAME", default_value = "inventory-service")]
    service_name: String,

    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", default_value = "http://localhost:4318")]
    otlp_endpoint: String,
}

impl Args {
    fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database_user,
            self.database_password,
            self.database_host,
            self.database_port,
            self.database_name,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let database_url = args.database_url();

    // Run migrations first
    info!("Running database migrations...");
    let mut conn = connect_with_retry(&database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    info!("Migrations completed successfully");

    let config =
        diesel_async::pooled_connection::AsyncDieselConnectionManager::<AsyncPgConnection>::new(
            &database_url,
        );
    let pool = Pool::builder().max_size(10).build(config).await?;

    let state = api::AppState { pool };
    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    info!(
        "{} listening on port {} (trace endpoint {})",
        args.service_name, args.port, args.otlp_endpoint
    );
    axum::serve(listener, app).await?;

    Ok(())
}

fn connect_with_retry(database_url: &str) -> Result<PgConnection> {
    for attempt in 1..=30 {
        match PgConnection::establish(database_url) {
            Ok(conn) => {
                info!("Connected to database");
                return Ok(conn);
            }
            Err(e) => {
                info!("Waiting for database... ({}/30): {}", attempt, e);
                std::thread::sleep(std::time::Duration::from_secs(1));
            }
        }
    }
    anyhow::bail!("failed to connect to database after 30 attempts")
}
