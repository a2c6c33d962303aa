pub mod actuator;
pub mod bin_packing;
pub mod global_risk_filter;
pub mod hardware_filter;
pub mod input;
pub mod reactive_override;
pub mod rightsizing;
pub mod risk_model_stage;
pub mod safety_gate;
pub mod spot_advisor_filter;
pub mod yield_ranking;

pub use actuator::{Actuator, ActuatorStage, LogActuator};
pub use bin_packing::BinPackingCalculator;
pub use global_risk_filter::GlobalRiskFilter;
pub use hardware_filter::HardwareFilter;
pub use input::{K8sInputAdapter, SingleInstanceInputAdapter};
pub use reactive_override::ReactiveOverride;
pub use rightsizing::RightsizingExpander;
pub use risk_model_stage::RiskModelStage;
pub use safety_gate::SafetyGate;
pub use spot_advisor_filter::SpotAdvisorFilter;
pub use yield_ranking::YieldRanker;
