//! Provider abstractions: stateless, synchronously-callable
//! (well, `async`-callable) adapters the pipeline consults for prices,
//! hardware metadata, historical interrupt rates, and AWS signals, plus
//! the risk-model inference contract.

pub mod advisor;
pub mod metadata;
pub mod price;
pub mod risk_model;
pub mod signal;

pub use advisor::{SpotAdvisor, StaticSpotAdvisor};
pub use metadata::{InstanceMetadataProvider, StaticInstanceMetadataProvider};
pub use price::{PriceProvider, StaticPriceProvider};
pub use risk_model::{AlwaysSafeRiskModel, FamilyStressRiskModel, RiskModel};
pub use signal::{ImdsSignalProvider, Signal, SignalProvider};
