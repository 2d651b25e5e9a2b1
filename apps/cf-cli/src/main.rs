use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cf_hydraulics::GateCoefficients;
use cf_network::{build_network, GateOperation, HydraulicNetwork, NetworkError};
use cf_project::{Project, ProjectError};
use cf_transition::{
    GradualTransitionController, TransitionConstraints, TransitionError, TransitionRequest,
    TransitionStrategy,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cf-cli")]
#[command(about = "CanalFlow CLI - canal gate hydraulics and transition planning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate project file syntax and structure
    Validate {
        /// Path to the project YAML or JSON file
        project_path: PathBuf,
    },
    /// Flow through one gate at the project's initial levels
    GateFlow {
        project_path: PathBuf,
        /// Gate key, e.g. reservoir->main_canal
        gate: String,
        /// Gate opening in metres
        opening: f64,
        /// Override the upstream water level (m)
        #[arg(long)]
        upstream_level: Option<f64>,
        /// Override the downstream water level (m)
        #[arg(long)]
        downstream_level: Option<f64>,
    },
    /// Opening needed for a target flow
    RequiredOpening {
        project_path: PathBuf,
        gate: String,
        /// Target flow in m³/s
        flow: f64,
    },
    /// Run one quasi-steady simulation step
    Simulate {
        project_path: PathBuf,
        /// Gate moves as GATE=OPENING, repeatable
        #[arg(long = "set", value_parser = parse_target)]
        operations: Vec<(String, f64)>,
    },
    /// Build a transition plan without executing it
    Plan(TransitionArgs),
    /// Plan and execute a transition in real time
    Execute {
        #[command(flatten)]
        transition: TransitionArgs,
        /// Monitoring interval in seconds (defaults to the project setting)
        #[arg(long)]
        interval: Option<f64>,
    },
}

#[derive(Args)]
struct TransitionArgs {
    project_path: PathBuf,
    /// Target openings as GATE=OPENING, repeatable
    #[arg(long = "target", value_parser = parse_target, required = true)]
    targets: Vec<(String, f64)>,
    /// Requested duration in seconds
    #[arg(long)]
    duration: Option<f64>,
    #[arg(long, default_value = "linear")]
    strategy: TransitionStrategy,
    /// Priority zones (defaults to the project setting)
    #[arg(long = "priority-zone")]
    priority_zones: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

type CliResult<T> = Result<T, CliError>;

fn parse_target(s: &str) -> Result<(String, f64), String> {
    let (gate, value) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected GATE=OPENING, got '{s}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid opening '{value}': {e}"))?;
    Ok((gate.trim().to_string(), value))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { project_path } => cmd_validate(&project_path),
        Commands::GateFlow {
            project_path,
            gate,
            opening,
            upstream_level,
            downstream_level,
        } => cmd_gate_flow(&project_path, &gate, opening, upstream_level, downstream_level),
        Commands::RequiredOpening {
            project_path,
            gate,
            flow,
        } => cmd_required_opening(&project_path, &gate, flow),
        Commands::Simulate {
            project_path,
            operations,
        } => cmd_simulate(&project_path, &operations),
        Commands::Plan(args) => cmd_plan(&args),
        Commands::Execute { transition, interval } => cmd_execute(&transition, interval).await,
    }
}

fn load(project_path: &Path) -> CliResult<(Project, HydraulicNetwork)> {
    let project = cf_project::load(project_path)?;
    let network = build_network(&project.network, GateCoefficients::default())?;
    Ok((project, network))
}

fn endpoints(network: &HydraulicNetwork, gate: &str) -> CliResult<(String, String)> {
    network
        .endpoints(gate)
        .ok_or_else(|| CliError::Usage(format!("unknown gate '{gate}'")))
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_validate(project_path: &Path) -> CliResult<()> {
    println!("Validating project: {}", project_path.display());
    let (project, network) = load(project_path)?;
    println!("✓ Project is valid: {}", project.name);
    println!(
        "  {} nodes, {} gates, source {}",
        network.node_levels().len(),
        network.gate_keys().count(),
        network.source_node()
    );
    Ok(())
}

fn cmd_gate_flow(
    project_path: &Path,
    gate: &str,
    opening: f64,
    upstream_level: Option<f64>,
    downstream_level: Option<f64>,
) -> CliResult<()> {
    let (_, mut network) = load(project_path)?;
    let (up, down) = endpoints(&network, gate)?;
    if let Some(level) = upstream_level {
        network.set_node_level(&up, level)?;
    }
    if let Some(level) = downstream_level {
        network.set_node_level(&down, level)?;
    }
    print_json(&network.calculate_gate_flow(&up, &down, opening))
}

fn cmd_required_opening(project_path: &Path, gate: &str, flow: f64) -> CliResult<()> {
    let (_, network) = load(project_path)?;
    let (up, down) = endpoints(&network, gate)?;
    print_json(&network.required_opening(&up, &down, flow))
}

fn cmd_simulate(project_path: &Path, operations: &[(String, f64)]) -> CliResult<()> {
    let (_, mut network) = load(project_path)?;
    let operations = operations
        .iter()
        .map(|(gate, opening)| {
            let (up, down) = endpoints(&network, gate)?;
            Ok(GateOperation::new(up, down, *opening))
        })
        .collect::<CliResult<Vec<_>>>()?;
    print_json(&network.simulate_gate_operation(&operations))
}

fn controller_for(args: &TransitionArgs) -> CliResult<(Project, GradualTransitionController, TransitionRequest)> {
    let (project, network) = load(&args.project_path)?;
    let constraints = TransitionConstraints::from(&project.controller);
    let controller = GradualTransitionController::new(network, constraints)?;

    let priority_zones = if args.priority_zones.is_empty() {
        project.controller.priority_zones.clone()
    } else {
        args.priority_zones.clone()
    };
    let request = TransitionRequest {
        gate_transitions: args.targets.iter().cloned().collect::<BTreeMap<_, _>>(),
        target_duration_s: args.duration,
        strategy: args.strategy,
        priority_zones,
    };
    Ok((project, controller, request))
}

fn cmd_plan(args: &TransitionArgs) -> CliResult<()> {
    let (_, controller, request) = controller_for(args)?;
    let plan = controller.create_transition_plan(&request)?;
    print_json(&plan)
}

async fn cmd_execute(args: &TransitionArgs, interval: Option<f64>) -> CliResult<()> {
    let (project, controller, request) = controller_for(args)?;
    let plan = controller.create_transition_plan(&request)?;
    let interval = interval.unwrap_or(project.controller.monitoring_interval_s);
    info!(
        plan = %plan.plan_id,
        duration_s = plan.total_duration_s,
        "executing in real time; Ctrl-C aborts without a report"
    );

    let result = controller.execute_transition_plan(plan, interval).await;
    print_json(&result)?;
    if result.completed {
        Ok(())
    } else {
        Err(CliError::Usage(format!("transition ended in phase {:?}", result.phase)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parsing() {
        assert_eq!(
            parse_target("reservoir->main_canal=0.8").unwrap(),
            ("reservoir->main_canal".to_string(), 0.8)
        );
        assert!(parse_target("reservoir->main_canal").is_err());
        assert!(parse_target("a->b=wide").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn plan_arguments_parse() {
        let cli = Cli::try_parse_from([
            "cf-cli",
            "plan",
            "demo.yaml",
            "--target",
            "a->b=0.5",
            "--strategy",
            "s-curve",
        ])
        .unwrap();
        match cli.command {
            Commands::Plan(args) => {
                assert_eq!(args.targets, vec![("a->b".to_string(), 0.5)]);
                assert_eq!(args.strategy, TransitionStrategy::SCurve);
            }
            _ => panic!("expected plan"),
        }
    }
}
