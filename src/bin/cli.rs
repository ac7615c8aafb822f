use clap::Parser;
use colored::Colorize;
use equilibrium_grid::prelude::*;
use itertools::Itertools;
use std::fs::File;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "equilibrium-grid")]
#[command(about = "Run a reversible reaction to equilibrium and sample it on a molecule grid")]
#[command(version)]
struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grid columns
    #[arg(long)]
    cols: Option<usize>,

    /// Grid rows
    #[arg(long)]
    rows: Option<usize>,

    /// Equilibrium constant K
    #[arg(short = 'k', long)]
    constant: Option<f64>,

    /// Stoichiometric coefficients as a,b,c,d
    #[arg(long, value_delimiter = ',')]
    coefficients: Option<Vec<i64>>,

    /// Seed for coordinate allocation
    #[arg(long)]
    seed: Option<u64>,

    /// Initial molecules of each species as a,b,c,d
    #[arg(short, long, value_delimiter = ',', default_values_t = [40, 40, 0, 0])]
    molecules: Vec<usize>,

    /// Start a second phase at equilibrium that adds this many of each product
    #[arg(long)]
    add_products: Option<usize>,

    /// Number of progress samples per phase
    #[arg(short, long, default_value_t = 11)]
    samples: usize,

    /// Print the replay log as JSON instead of the table
    #[arg(long)]
    replay_log: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<ReactionConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ReactionConfig::from_reader(File::open(path)?)?,
        None => ReactionConfig::default(),
    };

    if args.cols.is_some() || args.rows.is_some() {
        config.grid = GridSize::new(
            args.cols.unwrap_or(config.grid.cols()),
            args.rows.unwrap_or(config.grid.rows()),
        )?;
    }
    if let Some(k) = args.constant {
        config.equilibrium_constant = EquilibriumConstant::new(k)?;
    }
    if let Some(values) = &args.coefficients {
        let [a, b, c, d] = values[..] else {
            return Err(format!("expected 4 coefficients, got {}", values.len()).into());
        };
        config.coefficients = StoichiometricCoefficients::new(MoleculeValue::new(a, b, c, d))?;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args)?;
    let mut history = ReactionHistory::new(config)?;

    for (species, &count) in Species::ALL.iter().zip(&args.molecules) {
        let outcome = history.increment(*species, count);
        if outcome.was_clamped() {
            eprintln!(
                "{} only {} of {} {} fit on the grid",
                "Warning:".yellow().bold(),
                outcome.applied,
                outcome.requested,
                species
            );
        }
    }

    let equilibrium = history.current().components().window().equilibrium();
    history.set_progress(equilibrium);

    if let Some(count) = args.add_products {
        history.start_next_phase(Disturbance::AddProducts);
        for species in Species::on_side(Side::Product) {
            history.increment(species, count);
        }
        let equilibrium = history.current().components().window().equilibrium();
        history.set_progress(equilibrium);
    }

    if args.replay_log {
        println!("{}", history.replay_log().to_json()?);
        return Ok(());
    }

    for phase in history.phases() {
        print_phase(phase.id(), phase.components(), args.samples);
    }
    Ok(())
}

fn print_phase(id: PhaseId, components: &ReactionComponents, samples: usize) {
    let solution = components.solution();
    println!(
        "{} extent {:.5} ({:?}, {:?}), K = {}",
        format!("{id}:").bold(),
        solution.extent(),
        solution.direction(),
        solution.method(),
        components.constant().value()
    );

    let header = Species::ALL
        .iter()
        .map(|species| format!("{:>14}", format!("[{}] / n", species.symbol())))
        .join("");
    println!("{:>9}{}{:>12}", "progress".cyan(), header.cyan(), "Q".cyan());

    let window = components.window();
    let quotient = solution.reaction_quotient();
    let progress_values = match samples {
        0 => Vec::new(),
        1 => vec![window.start()],
        _ => (0..samples)
            .map(|i| window.start() + window.length() * i as f64 / (samples - 1) as f64)
            .collect(),
    };

    let rows = components.equations().eval_parallel(&progress_values);
    let quotients = quotient.sample_parallel(&progress_values);

    for ((progress, concentrations), q) in progress_values.iter().zip(rows).zip(quotients) {
        let cells = Species::ALL
            .iter()
            .map(|&species| {
                format!(
                    "{:>14}",
                    format!(
                        "{:.4} / {}",
                        concentrations[species],
                        components.count(species, *progress)
                    )
                )
            })
            .join("");
        let q = if components.is_at_equilibrium_at(*progress, 1e-3) {
            format!("{q:>12.5}").green()
        } else {
            format!("{q:>12.5}").normal()
        };
        println!("{progress:>9.3}{cells}{q}");
    }
    println!();
}
