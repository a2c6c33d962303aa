//! Pricing ingest and data-quality reconciliation.
//!
//! Every pricing report lands in the raw store unchanged; the cleaned
//! store keeps at most one row per `(pool, 5-min bucket)`, with
//! dedup-by-confidence and gap-fill interpolation applied by
//! [`reconcile::Reconciler`] on a per-pool tick.

pub mod memory;
pub mod postgres;
pub mod reconcile;
pub mod store;

pub use memory::InMemoryPricingRepository;
pub use postgres::PostgresPricingRepository;
pub use reconcile::Reconciler;
pub use store::PricingRepository;
