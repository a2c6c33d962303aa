//! Layer 4: yield ranking / TCO sorter. Computes TCO and
//! yield score, then sorts valid candidates by yield score descending.
//!
//! Tie-break when yield score is equal: lowest spot price first, then
//! lexicographic AZ. This keeps the sort stable and reproducible across
//! runs on frozen inputs.

use async_trait::async_trait;
use spot_core::Error;

use crate::context::Context;
use crate::stage::Stage;

pub struct YieldRanker;

#[async_trait]
impl Stage for YieldRanker {
    fn name(&self) -> &str {
        "TCOSorter"
    }

    async fn process(&self, ctx: &mut Context) -> Result<(), Error> {
        let max_tco = ctx
            .valid_candidates()
            .map(|c| c.spot_price + c.waste_cost.unwrap_or(0.0))
            .fold(0.0_f64, f64::max);

        for candidate in ctx.valid_candidates_mut() {
            let tco = candidate.spot_price + candidate.waste_cost.unwrap_or(0.0);
            let cost_efficiency = if max_tco > 0.0 { 1.0 - tco / max_tco } else { 0.0 };
            let safety = 1.0 - candidate.crash_probability.unwrap_or(0.5);
            candidate.yield_score = Some(100.0 * cost_efficiency * safety);
        }

        ctx.candidates.sort_by(|a, b| {
            let rank = |c: &crate::context::Candidate| -> Option<f64> {
                if c.is_valid {
                    c.yield_score
                } else {
                    None
                }
            };

            match (rank(a), rank(b)) {
                (Some(ya), Some(yb)) => yb
                    .partial_cmp(&ya)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        a.spot_price
                            .partial_cmp(&b.spot_price)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.availability_zone.cmp(&b.availability_zone)),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });

        let count = ctx.valid_count();
        ctx.log(self.name(), format!("ranked {count} valid candidates"));
        Ok(())
    }
}
