//! Human-readable rendering of library types. JSON output just leans on
//! their existing `Serialize` impls; this module only covers the plain-text
//! path.

use medterm_core::{Candidate, CustomRule, MappingResult, StatsSnapshot};

pub fn print_mapping_result(result: &MappingResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("term: {}", result.term);
    if let Some(ctx) = &result.context {
        println!(
            "context: domain={} negated={} (confidence {:.2})",
            ctx.detected_domain, ctx.is_negated, ctx.negation_confidence
        );
        for m in &ctx.modifiers {
            println!("  modifier: {:?} {:?} (confidence {:.2})", m.modifier_type, m.text, m.confidence);
        }
    }
    if result.per_system.is_empty() {
        println!("(no candidates)");
    }
    let mut systems: Vec<_> = result.per_system.keys().copied().collect();
    systems.sort();
    for system in systems {
        let candidates = &result.per_system[&system];
        println!("{system}:");
        if candidates.is_empty() {
            println!("  (no candidates)");
            continue;
        }
        for c in candidates {
            print_candidate(c);
        }
    }
    if !result.applied_rules.is_empty() {
        println!("applied rules:");
        for r in &result.applied_rules {
            println!("  {} ({:?}, score {:.2})", r.rule_id, r.rule_type, r.match_score);
        }
    }
    println!("processing_time_ms: {:.2}", result.processing_time_ms);
    Ok(())
}

fn print_candidate(c: &Candidate) {
    println!(
        "  {:<12} {:<40} confidence={:.3} match={:?} sources={:?}",
        c.code, c.display, c.confidence, c.match_type, c.sources
    );
}

pub fn print_rules(rules: &[CustomRule], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rules)?);
        return Ok(());
    }
    if rules.is_empty() {
        println!("(no rules)");
        return Ok(());
    }
    for r in rules {
        println!(
            "{}  [{:?}/{:?}] {:?} -> {} {} ({})  active={}",
            r.rule_id, r.rule_type, r.priority, r.source_term, r.target.system, r.target.code, r.target.display, r.is_active
        );
    }
    Ok(())
}

pub fn print_stats(stats: &StatsSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }
    println!("terms_processed:        {}", stats.terms_processed);
    println!("cache_hit_rate:          {:.3}", stats.cache_hit_rate);
    println!("mean_processing_time_ms: {:.3}", stats.mean_processing_time_ms);
    if stats.degraded_systems.is_empty() {
        println!("degraded_systems:        none");
    } else {
        println!("degraded_systems:        {}", stats.degraded_systems.join(", "));
    }
    Ok(())
}
