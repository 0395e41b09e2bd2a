//! Ladder Simulation CLI Tool
//!
//! Interactive command-line tool for driving a full in-process ladder.
//!
//! Usage:
//!   cargo run --bin ladder-sim -- --help
//!   cargo run --bin ladder-sim enqueue --players "alice:1000,bob:1040"
//!   cargo run --bin ladder-sim enqueue --players "alice:1000,bob:1150" --watch 5
//!   cargo run --bin ladder-sim run-scenario --scenario "instant-pairing"
//!   cargo run --bin ladder-sim run-all-scenarios

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[path = "../../tests/ladder_sim.rs"]
mod ladder_sim;

use ladder_sim::{LadderSim, SimScenarios};

#[derive(Parser)]
#[command(name = "ladder-sim")]
#[command(about = "Interactive simulation tool for ranked-ladder matchmaking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register players and put them in the matchmaking queue
    Enqueue {
        /// Players as 'id:rating' pairs separated by commas
        #[arg(short, long)]
        players: String,
        /// How long to watch for pairings, in seconds
        #[arg(short, long, default_value = "10")]
        watch: u64,
    },
    /// Run a predefined simulation scenario
    RunScenario {
        /// Scenario name (instant-pairing, range-mismatch-accept,
        /// range-mismatch-decline, queue-timeout, full-result-flow)
        #[arg(short, long)]
        scenario: String,
    },
    /// Run all simulation scenarios
    RunAllScenarios,
    /// Show simulation statistics
    Stats,
}

fn parse_player_specs(specs: &str) -> Result<Vec<(String, i32)>> {
    let mut players = Vec::new();
    for spec in specs.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }
        let Some((id, rating)) = spec.split_once(':') else {
            return Err(anyhow::anyhow!(
                "Invalid player spec '{}'. Use 'id:rating' pairs separated by commas",
                spec
            ));
        };
        let rating: i32 = rating
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid rating in spec '{}'", spec))?;
        players.push((id.trim().to_string(), rating));
    }
    if players.is_empty() {
        return Err(anyhow::anyhow!("No player specs given"));
    }
    Ok(players)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut sim = match LadderSim::new() {
        Ok(sim) => {
            println!("✅ In-process ladder is up");
            sim
        }
        Err(e) => {
            eprintln!("❌ Failed to start the ladder: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Enqueue { players, watch } => {
            let specs = parse_player_specs(&players)?;
            for (id, rating) in &specs {
                let display_name = format!("Player {}", id);
                if let Err(e) = sim.register_at(id, &display_name, *rating) {
                    eprintln!("❌ Failed to register '{}': {}", id, e);
                    std::process::exit(1);
                }
            }
            for (id, _) in &specs {
                if let Err(e) = sim.enqueue_player(id).await {
                    eprintln!("❌ Failed to queue '{}': {}", id, e);
                    std::process::exit(1);
                }
            }

            println!(
                "💡 {} players are searching; watching for pairings",
                specs.len()
            );
            sim.monitor(Duration::from_secs(watch)).await?;

            let snapshot = sim.app().snapshot()?;
            println!(
                "🎮 Final state: {} active matches, {} still searching",
                snapshot.active_matches, snapshot.players_searching
            );
        }

        Commands::RunScenario { scenario } => {
            let config = match scenario.to_lowercase().as_str() {
                "instant-pairing" => SimScenarios::instant_pairing(),
                "range-mismatch-accept" => SimScenarios::range_mismatch_accept(),
                "range-mismatch-decline" => SimScenarios::range_mismatch_decline(),
                "queue-timeout" => SimScenarios::queue_timeout(),
                "full-result-flow" => SimScenarios::full_result_flow(),
                _ => {
                    eprintln!(
                        "❌ Unknown scenario '{}'. Available: instant-pairing, \
                         range-mismatch-accept, range-mismatch-decline, queue-timeout, \
                         full-result-flow",
                        scenario
                    );
                    std::process::exit(1);
                }
            };

            match sim.run_scenario(config).await {
                Ok(success) => {
                    if success {
                        println!("✅ Scenario completed successfully!");
                    } else {
                        println!("❌ Scenario failed or timed out.");
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("❌ Error running scenario: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::RunAllScenarios => {
            let mut passed = 0;
            let mut failed = 0;

            println!("🧪 Running all sim scenarios...\n");

            for config in SimScenarios::all() {
                let name = config.scenario_name.clone();
                print!("Running '{}' scenario... ", name);
                match sim.run_scenario(config).await {
                    Ok(success) => {
                        if success {
                            println!("✅ PASSED");
                            passed += 1;
                        } else {
                            println!("❌ FAILED (timeout)");
                            failed += 1;
                        }
                    }
                    Err(e) => {
                        println!("❌ FAILED ({})", e);
                        failed += 1;
                    }
                }

                // Small delay so background tasks settle between scenarios
                tokio::time::sleep(Duration::from_millis(200)).await;

                // Fresh ladder between scenarios
                sim.reset().await?;
            }

            println!("\n📊 Results: {} passed, {} failed", passed, failed);
            if failed > 0 {
                std::process::exit(1);
            }
        }

        Commands::Stats => {
            let stats = sim.stats();
            println!("📊 Simulation Statistics:");
            println!("  Players registered: {}", stats.players_registered);
            println!("  Enqueue requests: {}", stats.enqueue_requests);
            println!("  Failed requests: {}", stats.failed_requests);
            println!("  Scenarios run: {}", stats.scenarios_run);
            println!("  Scenarios passed: {}", stats.scenarios_passed);

            let snapshot = sim.app().snapshot()?;
            println!("  Active matches: {}", snapshot.active_matches);
            println!("  Players searching: {}", snapshot.players_searching);
        }
    }

    Ok(())
}
