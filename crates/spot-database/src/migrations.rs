//! Versioned, transactional schema migrations for the control plane's
//! Postgres system of record: the database is the system of record, and
//! cross-component invariants are enforced via DB constraints plus
//! narrow transactions rather than application-level locking.

use anyhow::{Context, Result};
use sqlx::{Pool, Postgres, Row};
use tracing::{info, warn};

/// Migration struct containing SQL and metadata
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub name: String,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

/// Migration manager for handling database schema changes
pub struct MigrationManager {
    pool: Pool<Postgres>,
    migrations: Vec<Migration>,
}

impl MigrationManager {
    /// Create a new migration manager
    pub fn new(pool: Pool<Postgres>) -> Self {
        let migrations = get_all_migrations();
        Self { pool, migrations }
    }

    /// Initialize the migration system (create migration table)
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create schema_migrations table")?;

        info!("Migration system initialized");
        Ok(())
    }

    /// Get current schema version
    pub async fn get_current_version(&self) -> Result<u32> {
        let result =
            sqlx::query("SELECT COALESCE(MAX(version), 0) as version FROM schema_migrations")
                .fetch_one(&self.pool)
                .await
                .context("Failed to get current schema version")?;

        Ok(result.get::<i32, _>("version") as u32)
    }

    /// Run all pending migrations
    pub async fn migrate(&self) -> Result<()> {
        self.init().await?;

        let current_version = self.get_current_version().await?;
        info!("Current schema version: {}", current_version);

        let pending_migrations: Vec<_> = self
            .migrations
            .iter()
            .filter(|m| m.version > current_version)
            .collect();

        if pending_migrations.is_empty() {
            info!("No pending migrations");
            return Ok(());
        }

        info!("Running {} pending migrations", pending_migrations.len());

        for migration in pending_migrations {
            self.apply_migration(migration).await.with_context(|| {
                format!(
                    "Failed to apply migration {}: {}",
                    migration.version, migration.name
                )
            })?;
        }

        info!("All migrations completed successfully");
        Ok(())
    }

    /// Apply a single migration
    async fn apply_migration(&self, migration: &Migration) -> Result<()> {
        info!(
            "Applying migration {}: {}",
            migration.version, migration.name
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;

        sqlx::query(migration.up_sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute migration SQL for {}", migration.name))?;

        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
            .bind(migration.version as i32)
            .bind(&migration.name)
            .execute(&mut *tx)
            .await
            .context("Failed to record migration")?;

        tx.commit()
            .await
            .context("Failed to commit migration transaction")?;

        info!(
            "Successfully applied migration {}: {}",
            migration.version, migration.name
        );
        Ok(())
    }

    /// Rollback to a specific version
    pub async fn rollback_to(&self, target_version: u32) -> Result<()> {
        let current_version = self.get_current_version().await?;

        if target_version >= current_version {
            warn!(
                "Target version {} is not less than current version {}",
                target_version, current_version
            );
            return Ok(());
        }

        let rollback_migrations: Vec<_> = self
            .migrations
            .iter()
            .filter(|m| m.version > target_version && m.version <= current_version)
            .rev()
            .collect();

        info!(
            "Rolling back {} migrations to version {}",
            rollback_migrations.len(),
            target_version
        );

        for migration in rollback_migrations {
            self.rollback_migration(migration).await.with_context(|| {
                format!(
                    "Failed to rollback migration {}: {}",
                    migration.version, migration.name
                )
            })?;
        }

        info!("Rollback completed successfully");
        Ok(())
    }

    /// Rollback a single migration
    async fn rollback_migration(&self, migration: &Migration) -> Result<()> {
        info!(
            "Rolling back migration {}: {}",
            migration.version, migration.name
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start rollback transaction")?;

        sqlx::query(migration.down_sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute rollback SQL for {}", migration.name))?;

        sqlx::query("DELETE FROM schema_migrations WHERE version = $1")
            .bind(migration.version as i32)
            .execute(&mut *tx)
            .await
            .context("Failed to remove migration record")?;

        tx.commit()
            .await
            .context("Failed to commit rollback transaction")?;

        info!(
            "Successfully rolled back migration {}: {}",
            migration.version, migration.name
        );
        Ok(())
    }

    /// List all migrations and their status
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        self.init().await?;

        let applied_versions: Vec<u32> = sqlx::query("SELECT version FROM schema_migrations")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch applied migrations")?
            .into_iter()
            .map(|row| row.get::<i32, _>("version") as u32)
            .collect();

        let mut statuses = Vec::new();

        for migration in &self.migrations {
            let is_applied = applied_versions.contains(&migration.version);
            statuses.push(MigrationStatus {
                version: migration.version,
                name: migration.name.clone(),
                applied: is_applied,
            });
        }

        Ok(statuses)
    }
}

#[derive(Debug)]
pub struct MigrationStatus {
    pub version: u32,
    pub name: String,
    pub applied: bool,
}

/// Get all migrations in order
fn get_all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "initial_schema".to_string(),
            up_sql: MIGRATION_001_UP,
            down_sql: MIGRATION_001_DOWN,
        },
        Migration {
            version: 2,
            name: "pricing_and_risk".to_string(),
            up_sql: MIGRATION_002_UP,
            down_sql: MIGRATION_002_DOWN,
        },
        Migration {
            version: 3,
            name: "commands".to_string(),
            up_sql: MIGRATION_003_UP,
            down_sql: MIGRATION_003_DOWN,
        },
    ]
}

// Migration 001: tenants, accounts, instances, agents, replicas.
const MIGRATION_001_UP: &str = r#"
CREATE TYPE environment_type AS ENUM ('prod', 'lab');
CREATE TYPE lifecycle_type AS ENUM ('spot', 'on_demand');
CREATE TYPE pipeline_mode_type AS ENUM ('linear', 'cluster', 'kubernetes');
CREATE TYPE agent_status_type AS ENUM ('online', 'offline', 'switching', 'failover');
CREATE TYPE replica_status_type AS ENUM ('launching', 'syncing', 'ready', 'promoted', 'terminated', 'failed');
CREATE TYPE replica_kind_type AS ENUM ('manual', 'automatic_rebalance');

CREATE TABLE tenants (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE accounts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    cloud_account_id VARCHAR(64) NOT NULL,
    environment_type environment_type NOT NULL DEFAULT 'lab',
    assume_role_arn TEXT,
    external_id VARCHAR(128),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (tenant_id, cloud_account_id)
);

CREATE TABLE instances (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    cloud_instance_id VARCHAR(64) NOT NULL,
    instance_type VARCHAR(64) NOT NULL,
    availability_zone VARCHAR(32) NOT NULL,
    region VARCHAR(32) NOT NULL,
    lifecycle lifecycle_type NOT NULL DEFAULT 'spot',
    current_pool_id VARCHAR(128),
    pipeline_mode pipeline_mode_type NOT NULL DEFAULT 'linear',
    cluster VARCHAR(128),
    node_group VARCHAR(128),
    risk_model_id VARCHAR(64),
    shadow_mode BOOLEAN NOT NULL DEFAULT false,
    is_active BOOLEAN NOT NULL DEFAULT true,
    installed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (account_id, cloud_instance_id)
);
CREATE INDEX idx_instances_account ON instances(account_id);

CREATE TABLE agents (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    instance_id UUID NOT NULL REFERENCES instances(id) ON DELETE CASCADE,
    client_token VARCHAR(128) NOT NULL UNIQUE,
    last_heartbeat_at TIMESTAMPTZ,
    status agent_status_type NOT NULL DEFAULT 'offline',
    current_replica_id UUID,
    auto_switch_enabled BOOLEAN NOT NULL DEFAULT false,
    manual_replica_enabled BOOLEAN NOT NULL DEFAULT false,
    switching_threshold DOUBLE PRECISION NOT NULL DEFAULT 0.85,
    interruption_handled_count BIGINT NOT NULL DEFAULT 0
);
CREATE INDEX idx_agents_instance ON agents(instance_id);

CREATE TABLE replicas (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    parent_instance_id UUID NOT NULL REFERENCES instances(id) ON DELETE CASCADE,
    pool_id VARCHAR(128) NOT NULL,
    status replica_status_type NOT NULL DEFAULT 'launching',
    replica_type replica_kind_type NOT NULL,
    sync_progress DOUBLE PRECISION NOT NULL DEFAULT 0.0,
    hourly_cost DOUBLE PRECISION NOT NULL DEFAULT 0.0,
    created_by VARCHAR(64) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT true,
    promoted_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX idx_replicas_parent ON replicas(parent_instance_id);

ALTER TABLE agents ADD CONSTRAINT fk_agents_current_replica
    FOREIGN KEY (current_replica_id) REFERENCES replicas(id) ON DELETE SET NULL;
"#;

const MIGRATION_001_DOWN: &str = r#"
ALTER TABLE agents DROP CONSTRAINT fk_agents_current_replica;
DROP TABLE replicas;
DROP TABLE agents;
DROP TABLE instances;
DROP TABLE accounts;
DROP TABLE tenants;
DROP TYPE replica_kind_type;
DROP TYPE replica_status_type;
DROP TYPE agent_status_type;
DROP TYPE pipeline_mode_type;
DROP TYPE lifecycle_type;
DROP TYPE environment_type;
"#;

// Migration 002: pricing snapshots (raw + cleaned) and the risk event log.
const MIGRATION_002_UP: &str = r#"
CREATE TYPE price_source_type AS ENUM ('agent', 'scrape', 'interpolated');
CREATE TYPE risk_event_kind_type AS ENUM ('rebalance_notice', 'termination_notice');

CREATE TABLE pricing_snapshots_raw (
    id BIGSERIAL PRIMARY KEY,
    pool_id VARCHAR(128) NOT NULL,
    time_bucket TIMESTAMPTZ NOT NULL,
    spot_price DOUBLE PRECISION NOT NULL,
    on_demand_price DOUBLE PRECISION NOT NULL,
    confidence DOUBLE PRECISION NOT NULL,
    source price_source_type NOT NULL,
    received_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX idx_pricing_raw_pool_bucket ON pricing_snapshots_raw(pool_id, time_bucket);

CREATE TABLE pricing_snapshots (
    pool_id VARCHAR(128) NOT NULL,
    time_bucket TIMESTAMPTZ NOT NULL,
    spot_price DOUBLE PRECISION NOT NULL,
    on_demand_price DOUBLE PRECISION NOT NULL,
    confidence DOUBLE PRECISION NOT NULL,
    source price_source_type NOT NULL,
    PRIMARY KEY (pool_id, time_bucket)
);

CREATE TABLE risk_events (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    pool_id VARCHAR(128) NOT NULL,
    kind risk_event_kind_type NOT NULL,
    reported_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    expires_at TIMESTAMPTZ NOT NULL,
    source_tenant UUID,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb
);
CREATE INDEX idx_risk_events_pool_expires ON risk_events(pool_id, expires_at);
"#;

const MIGRATION_002_DOWN: &str = r#"
DROP TABLE risk_events;
DROP TABLE pricing_snapshots;
DROP TABLE pricing_snapshots_raw;
DROP TYPE risk_event_kind_type;
DROP TYPE price_source_type;
"#;

// Migration 003: agent command queue.
const MIGRATION_003_UP: &str = r#"
CREATE TYPE command_kind_type AS ENUM ('switch', 'shutdown', 'apply_config', 'create_replica', 'promote_replica');
CREATE TYPE command_status_type AS ENUM ('pending', 'picked_up', 'completed', 'failed', 'expired');

CREATE TABLE commands (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    agent_id UUID NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
    kind command_kind_type NOT NULL,
    payload JSONB NOT NULL DEFAULT '{}'::jsonb,
    status command_status_type NOT NULL DEFAULT 'pending',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    expires_at TIMESTAMPTZ NOT NULL,
    picked_up_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    result JSONB,
    error TEXT,
    CONSTRAINT chk_expires_after_created CHECK (expires_at > created_at)
);
CREATE INDEX idx_commands_agent_status ON commands(agent_id, status);
"#;

const MIGRATION_003_DOWN: &str = r#"
DROP TABLE commands;
DROP TYPE command_status_type;
DROP TYPE command_kind_type;
"#;
