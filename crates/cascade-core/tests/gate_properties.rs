use cascade_core::gate::{AlignmentGate, GateMetric, GatePredicate, NOT_YET_EVALUATED};
use cascade_core::metrics::CounterUpdate;
use cascade_core::scoring::Bound;
use cascade_core::stage::{StageId, StageState};
use proptest::prelude::*;
use std::time::Duration;

fn record(state: &mut StageState, hit: bool) {
    state.metrics_mut().record_success(
        Duration::from_millis(1),
        "payload",
        "record",
        &CounterUpdate::new().count_if("warnings", hit),
    );
}

fn count_gate(threshold: f64) -> AlignmentGate {
    AlignmentGate::new("warned").require(GatePredicate::new(
        "warnings",
        GateMetric::Count("warnings".into()),
        Bound::AtLeast(threshold),
        "no warnings issued",
    ))
}

fn ratio_gate(threshold: f64) -> AlignmentGate {
    AlignmentGate::new("acknowledges uncertainty").require(GatePredicate::new(
        "warning_rate",
        GateMetric::Ratio("warnings".into()),
        Bound::AtLeast(threshold),
        "rarely warns",
    ))
}

proptest! {
    #[test]
    fn count_gates_never_unalign_once_met(
        hits in prop::collection::vec(any::<bool>(), 1..40),
        threshold in 1u32..5,
    ) {
        let gate = count_gate(threshold as f64);
        let mut state = StageState::new(StageId::new(5, "boundaries"));
        let mut aligned_before = false;
        for hit in hits {
            record(&mut state, hit);
            let report = gate.evaluate(&state);
            prop_assert!(!aligned_before || report.is_aligned);
            aligned_before = report.is_aligned;
        }
    }

    #[test]
    fn turning_a_miss_into_a_hit_never_hurts_a_ratio_gate(
        hits in prop::collection::vec(any::<bool>(), 1..40),
        flip in any::<prop::sample::Index>(),
        threshold in 0.0f64..1.0,
    ) {
        let gate = ratio_gate(threshold);
        let mut improved = hits.clone();
        let i = flip.index(improved.len());
        improved[i] = true;

        let mut base = StageState::new(StageId::new(2, "reasoning"));
        let mut better = StageState::new(StageId::new(2, "reasoning"));
        hits.iter().for_each(|h| record(&mut base, *h));
        improved.iter().for_each(|h| record(&mut better, *h));

        let base = gate.evaluate(&base);
        let better = gate.evaluate(&better);
        prop_assert!(better.ratios["warning_rate"] >= base.ratios["warning_rate"]);
        prop_assert!(!base.is_aligned || better.is_aligned);
    }
}

#[test]
fn failures_alone_leave_gate_unevaluated() {
    let mut state = StageState::new(StageId::new(5, "boundaries"));
    state
        .metrics_mut()
        .record_failure(Duration::from_millis(3), "payload", "rate limited");
    let report = count_gate(1.0).evaluate(&state);
    assert!(report.is_aligned);
    assert_eq!(report.status, NOT_YET_EVALUATED);
}
