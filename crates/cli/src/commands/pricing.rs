//! `hivecore pricing` / `hivecore estimate`: Model pricing and cost estimates.

use hivecore_config::HubConfig;
use hivecore_telemetry::{PriceSource, PricingTable};

/// List every model in the table, configured overrides included.
pub fn list(config: &HubConfig) -> Result<(), Box<dyn std::error::Error>> {
    let table = config.pricing_table();
    let models = table.models();

    println!("💰 Model Pricing (per 1K tokens)");
    println!("─────────────────────────────────────────────────────");
    println!("{:<40} {:>10} {:>10}", "Model", "Input", "Output");
    println!("{:<40} {:>10} {:>10}", "─────", "─────", "──────");

    for name in &models {
        if let Some(p) = table.get(name) {
            println!("{:<40} ${:>8.5} ${:>8.5}", name, p.input_per_1k, p.output_per_1k);
        }
    }

    println!();
    println!("  {} models with pricing data", models.len());
    if !config.pricing.is_empty() {
        println!("  {} overridden in config", config.pricing.len());
    }

    Ok(())
}

/// A priced call and how its model name was resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
    pub source: PriceSource,
    pub cost_usd: f64,
}

pub fn estimate_with(table: &PricingTable, model: &str, input: u64, output: u64) -> Estimate {
    let (pricing, source) = table.resolve_with_source(model);
    Estimate {
        input_per_1k: pricing.input_per_1k,
        output_per_1k: pricing.output_per_1k,
        source,
        cost_usd: pricing.cost(input, output),
    }
}

pub fn estimate(
    config: &HubConfig,
    model: &str,
    input: u64,
    output: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let e = estimate_with(&config.pricing_table(), model, input, output);

    println!("🧮 Cost Estimate");
    println!("─────────────────────────────────────");
    println!("  Model:          {model}");
    println!("  Matched by:     {}", e.source);
    println!("  Input price:    ${:.5} / 1K", e.input_per_1k);
    println!("  Output price:   ${:.5} / 1K", e.output_per_1k);
    println!("  Tokens:         {input} in / {output} out");
    println!("  Estimated cost: ${:.6}", e.cost_usd);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivecore_telemetry::calculate_cost;

    #[test]
    fn estimate_matches_cost_calculator() {
        let table = PricingTable::with_defaults();
        let e = estimate_with(&table, "gpt-4o-2024-08-06", 1200, 300);
        assert_eq!(e.source, PriceSource::Prefix);
        assert_eq!(e.cost_usd, calculate_cost(1200, 300, "gpt-4o-2024-08-06"));
    }

    #[test]
    fn unknown_model_uses_default_tier() {
        let e = estimate_with(&PricingTable::with_defaults(), "mystery-model", 1000, 1000);
        assert_eq!(e.source, PriceSource::Default);
        assert!(e.cost_usd > 0.0);
    }

    #[test]
    fn configured_override_wins() {
        let mut config = HubConfig::default();
        config.pricing.insert(
            "gpt-4o".into(),
            hivecore_config::PricingOverride {
                input_per_1k: 1.0,
                output_per_1k: 2.0,
            },
        );
        let e = estimate_with(&config.pricing_table(), "gpt-4o", 1000, 1000);
        assert_eq!(e.source, PriceSource::Exact);
        assert!((e.cost_usd - 3.0).abs() < 1e-12);
    }
}
