//! The shared `Context` that flows through every stage and
//! the `Candidate` each stage enriches or discards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spot_providers::Signal;

/// Final decision a pipeline run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Stay,
    Switch,
    Drain,
    Evacuate,
    /// No stage has produced a decision yet; never returned from a
    /// completed pipeline run.
    Unknown,
}

impl Default for Verdict {
    fn default() -> Self {
        Verdict::Unknown
    }
}

/// Resource requirements for a K8s-mode request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub vcpu: f64,
    pub memory_gb: f64,
    pub architecture: String,
    /// Allows upsizing; rightsizing expander uses this as the anchor.
    pub min_vcpu: Option<f64>,
    pub max_vcpu: Option<f64>,
}

/// Normalized input to a pipeline run. `mode` selects which input
/// adapter runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InputRequest {
    /// "I am running `instance_type`@`availability_zone`. Am I safe?"
    Test {
        current_instance_type: String,
        current_availability_zone: String,
        current_instance_id: Option<String>,
    },
    /// "A workload needs these resources. Find the best pool."
    Kubernetes {
        resource_requirements: ResourceRequirements,
        region: String,
    },
}

impl InputRequest {
    pub fn region(&self) -> Option<&str> {
        match self {
            InputRequest::Test { .. } => None,
            InputRequest::Kubernetes { region, .. } => Some(region),
        }
    }
}

/// A spot-pool candidate under evaluation. Fields beyond the first four
/// are filled in as the candidate moves through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub instance_type: String,
    pub availability_zone: String,
    pub spot_price: f64,
    pub on_demand_price: f64,

    pub vcpu: Option<f64>,
    pub memory_gb: Option<f64>,
    pub architecture: Option<String>,

    pub historic_interrupt_rate: Option<f64>,
    pub crash_probability: Option<f64>,
    pub discount_depth: Option<f64>,
    pub waste_cost: Option<f64>,
    pub yield_score: Option<f64>,

    /// Set when this candidate was included only because rightsizing
    /// expanded the search above the requested vCPU.
    pub is_rightsized: bool,

    pub is_valid: bool,
    pub filtered_reason: Option<String>,
}

impl Candidate {
    pub fn new(
        instance_type: impl Into<String>,
        availability_zone: impl Into<String>,
        spot_price: f64,
        on_demand_price: f64,
    ) -> Self {
        let discount_depth = if on_demand_price > 0.0 {
            Some(1.0 - spot_price / on_demand_price)
        } else {
            Some(0.0)
        };

        Self {
            instance_type: instance_type.into(),
            availability_zone: availability_zone.into(),
            spot_price,
            on_demand_price,
            vcpu: None,
            memory_gb: None,
            architecture: None,
            historic_interrupt_rate: None,
            crash_probability: None,
            discount_depth,
            waste_cost: None,
            yield_score: None,
            is_rightsized: false,
            is_valid: true,
            filtered_reason: None,
        }
    }

    pub fn pool_key(&self) -> (String, String) {
        (self.instance_type.clone(), self.availability_zone.clone())
    }

    pub fn matches(&self, instance_type: &str, az: &str) -> bool {
        self.instance_type == instance_type && self.availability_zone == az
    }

    pub fn invalidate(&mut self, reason: impl Into<String>) {
        self.is_valid = false;
        self.filtered_reason = Some(reason.into());
    }
}

/// One entry in the pipeline's execution trace, kept for observability
/// and determinism: same inputs produce the same trace shape, though
/// timestamps will differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub stage: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// The mutable cart every stage receives, mutates, and passes along.
#[derive(Debug, Clone)]
pub struct Context {
    pub input: InputRequest,
    pub candidates: Vec<Candidate>,
    pub aws_signal: Signal,
    pub signal_checked_at: Option<DateTime<Utc>>,
    pub verdict: Verdict,
    pub selected: Option<Candidate>,
    pub reason: String,
    pub trace: Vec<TraceEntry>,
}

impl Context {
    pub fn new(input: InputRequest) -> Self {
        Self {
            input,
            candidates: Vec::new(),
            aws_signal: Signal::None,
            signal_checked_at: None,
            verdict: Verdict::Unknown,
            selected: None,
            reason: String::new(),
            trace: Vec::new(),
        }
    }

    pub fn log(&mut self, stage: &str, message: impl Into<String>) {
        self.trace.push(TraceEntry {
            stage: stage.to_string(),
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn valid_candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.is_valid)
    }

    pub fn valid_candidates_mut(&mut self) -> impl Iterator<Item = &mut Candidate> {
        self.candidates.iter_mut().filter(|c| c.is_valid)
    }

    pub fn valid_count(&self) -> usize {
        self.valid_candidates().count()
    }
}
