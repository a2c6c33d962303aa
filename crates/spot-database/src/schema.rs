//! Table definitions referenced by [`crate::migrations`]. Kept as a
//! separate module purely for readability — the SQL itself lives in the
//! migration bodies; this module documents the resulting shape for
//! reviewers and for `spot-risk`/`spot-pricing`/`spot-replica` callers
//! reasoning about column names.

/// `accounts`: a cloud-account handle, owned by a tenant.
/// `environment_type` gates Global Risk Tracker writes — only `PROD`
/// interruptions poison a pool.
pub const ACCOUNTS_TABLE: &str = "accounts";

/// `instances`: a managed compute unit.
pub const INSTANCES_TABLE: &str = "instances";

/// `agents`: process identity bound to an instance.
pub const AGENTS_TABLE: &str = "agents";

/// `replicas`: standby instances driven by the replica coordinator.
pub const REPLICAS_TABLE: &str = "replicas";

/// `pricing_snapshots_raw` / `pricing_snapshots`: raw ingest vs. the
/// deduplicated, gap-filled cleaned store.
pub const PRICING_SNAPSHOTS_RAW_TABLE: &str = "pricing_snapshots_raw";
pub const PRICING_SNAPSHOTS_TABLE: &str = "pricing_snapshots";

/// `risk_events`: append-only pool-poisoning log.
pub const RISK_EVENTS_TABLE: &str = "risk_events";

/// `commands`: agent command queue.
pub const COMMANDS_TABLE: &str = "commands";
