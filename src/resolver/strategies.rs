use serde_json::{json, Map, Value};

use crate::conflict::Conflict;
use crate::resolution::ResolutionOutcome;
use crate::resolver::ResolveContext;

struct Tally<'a> {
    key: String,
    count: usize,
    first_worker: &'a str,
    first_payload: &'a Value,
}

/// Majority vote over canonical payloads.
///
/// Ties are broken in favor of the key encountered first in supply order.
/// Without a strict majority the confidence drops to the configured
/// escalation confidence and escalation is required.
#[must_use]
pub fn resolve_by_vote(conflict: &Conflict, ctx: &ResolveContext<'_>) -> ResolutionOutcome {
    let mut tallies: Vec<Tally<'_>> = Vec::new();
    for (worker_id, payload) in conflict.payloads() {
        let key = ctx.canonicalizer.canonical_key(payload);
        match tallies.iter_mut().find(|t| t.key == key) {
            Some(t) => t.count += 1,
            None => tallies.push(Tally {
                key,
                count: 1,
                first_worker: worker_id,
                first_payload: payload,
            }),
        }
    }

    let total: usize = tallies.iter().map(|t| t.count).sum();
    let votes: Map<String, Value> = tallies
        .iter()
        .map(|t| (t.key.clone(), Value::from(t.count)))
        .collect();

    // Strict `>` keeps the earliest key on equal counts.
    let mut best: Option<&Tally<'_>> = None;
    for t in &tallies {
        if best.map_or(true, |b| t.count > b.count) {
            best = Some(t);
        }
    }

    let Some(best) = best else {
        return ResolutionOutcome::escalation()
            .with_metadata("votes", votes)
            .with_metadata("total_votes", 0);
    };

    let majority = best.count * 2 > total;
    #[allow(clippy::cast_precision_loss)]
    let mut outcome = ResolutionOutcome::winner(
        best.first_worker,
        best.first_payload.clone(),
        best.count as f64 / total as f64,
    );
    if !majority {
        outcome.confidence = ctx.config.escalation_confidence;
        outcome.requires_escalation = true;
    }

    outcome
        .with_metadata("votes", votes)
        .with_metadata("total_votes", total)
        .with_metadata("winning_key", best.key.clone())
        .with_metadata("majority", majority)
}

/// Highest worker priority wins.
///
/// Workers missing from the priority map get the configured default. Equal
/// top priorities go to the worker supplied first. Confidence grows with the
/// gap between the winner and the runner-up, up to the configured cap; a lone
/// worker wins with full confidence.
#[must_use]
pub fn resolve_by_priority(conflict: &Conflict, ctx: &ResolveContext<'_>) -> ResolutionOutcome {
    let cfg = ctx.config;
    let priority_of = |worker_id: &str| {
        ctx.priorities
            .and_then(|p| p.get(worker_id))
            .copied()
            .unwrap_or(cfg.default_priority)
    };

    let mut ranked: Vec<(&str, &Value, i64)> = conflict
        .payloads()
        .map(|(worker_id, payload)| (worker_id, payload, priority_of(worker_id)))
        .collect();

    let used: Map<String, Value> = ranked
        .iter()
        .map(|(worker_id, _, priority)| ((*worker_id).to_string(), Value::from(*priority)))
        .collect();

    // Stable sort keeps supply order among equal priorities.
    ranked.sort_by(|a, b| b.2.cmp(&a.2));

    let Some(&(winner, payload, top)) = ranked.first() else {
        return ResolutionOutcome::escalation().with_metadata("priorities", used);
    };

    let confidence = match ranked.get(1) {
        None => 1.0,
        Some(&(_, _, second)) => {
            #[allow(clippy::cast_precision_loss)]
            let gap = top.saturating_sub(second) as f64;
            (cfg.priority_base_confidence + gap / cfg.priority_gap_divisor)
                .min(cfg.priority_confidence_cap)
        }
    };

    ResolutionOutcome::winner(winner, payload.clone(), confidence)
        .with_metadata("priorities", used)
        .with_metadata("winning_priority", top)
}

/// No automatic winner: the work must be redone by a different worker.
#[must_use]
pub fn re_evaluate(conflict: &Conflict) -> ResolutionOutcome {
    ResolutionOutcome::re_evaluation()
        .with_metadata("excluded_workers", json!(conflict.involved_workers()))
        .with_metadata("reason", "conflicting results require independent re-evaluation")
}
