use anyhow::Result;
use clap::Parser;
use diesel::{Connection, PgConnection};
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use order_service::api;
use order_service::dtm::{DtmClient, Orchestrator, Protocol, ServiceUrls};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(name = "order-service")]
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

    #[arg(long, env = "DATABASE_NAME", default_value = "orders_db")]
    database_name: String,

    #[arg(long, env = "DTM_SERVER", default_value = "http://localhost:36789/api/dtmsvr")]
    dtm_server: String,

    /// Coordination protocol driven by POST /api/orders.
    #[arg(long, env = "PROTOCOL", value_enum, default_value = "saga")]
    protocol: Protocol,

    #[arg(long, env = "ORDERS_SERVICE_URL", default_value = "http://localhost:8080")]
    orders_service_url: String,

    #[arg(long, env = "INVENTORY_SERVICE_URL", default_value = "http://localhost:8081")]
    inventory_service_url: String,

    #[arg(long, env = "PAYMENT_SERVICE_URL", default_value = "http://localhost:8082")]
    payment_service_url: String,

    #[arg(long, env = "SERVICE_NAME", default_value = "order-service")]
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

    let orchestrator = Orchestrator::new(
        DtmClient::new(args.dtm_server.clone()),
        ServiceUrls {
            orders: args.orders_service_url.clone(),
            inventory: args.inventory_service_url.clone(),
            payment: args.payment_service_url.clone(),
        },
    );

    let state = api::AppState {
        pool,
        protocol: args.protocol,
        orchestrator,
    };
    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    info!(
        "{} listening on port {} (protocol {:?}, dtm {}, trace endpoint {})",
        args.service_name, args.port, args.protocol, args.dtm_server, args.otlp_endpoint
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
