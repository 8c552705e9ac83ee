use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use sea_orm_migration::MigratorTrait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connections
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt).await.map_err(ServiceError::db_error)?;

    info!("Database connection pool established successfully");
    Ok(db_pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg = DbConfig {
        url: cfg.database_url.clone(),
        ..Default::default()
    };
    establish_connection_with_config(&db_cfg).await
}

/// Runs database migrations using the embedded migrator.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::db_error);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!("Database migrations completed successfully in {:?}", elapsed),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }
    result
}

/// Checks that the database connection is alive.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    pool.execute(Statement::from_string(
        pool.get_database_backend(),
        "SELECT 1".to_string(),
    ))
    .await
    .map(|_| ())
    .map_err(ServiceError::db_error)
}

fn is_transient(err: &DbErr) -> bool {
    matches!(
        err,
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) | DbErr::Exec(_)
    )
}

/// Runs `op` and retries it once if it fails with a transient store error
/// (lock timeout, connection loss). Repeated failure is surfaced as
/// `Unavailable`; the caller must not assume any partial state committed.
pub async fn retry_once<F, Fut, T>(op_name: &str, mut op: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(ServiceError::DatabaseError(ref db_err)) if is_transient(db_err) => {
            warn!(operation = op_name, error = %db_err, "Transient store failure, retrying once");
            op().await.map_err(|e| match e {
                ServiceError::DatabaseError(inner) if is_transient(&inner) => {
                    ServiceError::Unavailable(format!("{} failed after retry: {}", op_name, inner))
                }
                other => other,
            })
        }
        Err(other) => Err(other),
    }
}
