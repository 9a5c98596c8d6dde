use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use doc_triage::cli::{Args, Command};
use doc_triage::config::TriageConfig;
use doc_triage::search::engine::HybridEngine;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TRIAGE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let json = args.format == "json";

    let config = TriageConfig::load(args.config.as_deref())?;
    let engine = HybridEngine::new(config.resolve());
    let summary = engine.index()?;

    match args.command {
        Command::Index => {
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else if summary.reindexed {
                println!(
                    "Indexed {} documents ({} features)",
                    summary.documents, summary.vocabulary_size
                );
            } else {
                println!(
                    "Loaded {} documents from store ({} features)",
                    summary.documents, summary.vocabulary_size
                );
            }
        }
        Command::Classify {
            query,
            method,
            top,
            explain,
        } => {
            if let Some(n) = top {
                let matches = engine.top_matches(&query, n)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&matches)?);
                } else {
                    for (rank, m) in matches.iter().enumerate() {
                        println!(
                            "{}. {}/{} - {:.2}% ({})",
                            rank + 1,
                            m.service,
                            m.category,
                            m.confidence,
                            m.doc_path
                        );
                    }
                }
            } else {
                let result = engine.classify(&query, method.as_deref())?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    println!(
                        "{} ({:.2}%, {})",
                        result.doc_path, result.confidence, result.source
                    );
                    if let Some(warning) = &result.warning {
                        eprintln!("warning: {warning}");
                    }
                }
            }

            if explain {
                let explanation = engine.explain(&query)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&explanation)?);
                } else {
                    println!(
                        "  tf-idf {:.4} (weight {:.2}), bm25 {:.4} (weight {:.2}), fused {:.4}",
                        explanation.tfidf_normalized,
                        explanation.tfidf_weight,
                        explanation.bm25_normalized,
                        explanation.bm25_weight,
                        explanation.fused_score
                    );
                }
            }
        }
        Command::Teach { query, doc_path } => {
            let receipt = engine.teach(&query, &doc_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            } else {
                println!("{}", receipt.message);
            }
        }
        Command::Status => {
            let status = engine.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!(
                    "healthy: {} ({} documents, {} features)",
                    status.healthy, status.documents, status.vocabulary_size
                );
                println!(
                    "feedback: {} corrections, {} predictions, {:.1}% accuracy",
                    status.corrections_total,
                    status.predictions_total,
                    status.feedback.overall_accuracy * 100.0
                );
                println!(
                    "cache: {} hits / {} misses ({:.1}% hit rate)",
                    status.cache.hits, status.cache.misses, status.cache.hit_rate
                );
                if status.degraded_persistence {
                    println!("persistence: degraded (running from memory)");
                }
            }
        }
    }

    engine.flush();
    Ok(())
}
