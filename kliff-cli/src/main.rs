use std::{path::PathBuf, time::Instant};

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use kliff::{
    calculator::Calculator,
    config::{self, ConfigDescriptor, ConfigFit},
    configuration::Configuration,
    dataset::{extxyz, Dataset},
    descriptors::{Descriptor, Fingerprints, SymmetryFunction},
    loss::{Loss, NetworkLoss, ResidualWeights},
    minimize::{minimize, MinimizerSettings},
    models::{BuiltinModel, Model, NeuralNetwork},
    neighbor::NeighborList,
    parallel,
};
use rand::{rngs::StdRng, SeedableRng};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: KliffCommand,

    /// Log debug messages, unless RUST_LOG says otherwise
    #[arg(long, short, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum KliffCommand {
    /// Surround a periodic configuration with its padding atoms
    Padding {
        /// Extended XYZ file of the configuration
        #[arg(long, short)]
        input: PathBuf,
        /// Interaction range the padding atoms must cover
        #[arg(long, short)]
        cutoff: f64,
        /// Write contributing and padding atoms as a non-periodic configuration
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Compute symmetry function fingerprints of a dataset
    Descriptor {
        /// JSON file with the cutoffs and symmetry function families
        #[arg(long, short)]
        settings: PathBuf,
        /// Extended XYZ file or directory of them
        #[arg(long, short)]
        dataset: PathBuf,
        /// Where the fingerprints are saved
        #[arg(long, short, default_value = "fingerprints.json")]
        output: PathBuf,
        /// Also compute derivatives with respect to the atomic coordinates
        #[arg(long)]
        fit_forces: bool,
        /// Also compute derivatives with respect to the strain
        #[arg(long)]
        fit_stress: bool,
        /// Standardize the fingerprints with the dataset mean and stdev
        #[arg(long)]
        normalize: bool,
    },
    /// Print the parameters of a builtin model
    Model {
        /// One of the builtin model names, e.g. SW
        #[arg(long, short)]
        name: String,
        /// Species the parameters are defined for
        #[arg(long, short, default_value = "Si")]
        species: String,
    },
    /// Fit the parameters of a builtin model to a dataset
    Fit {
        /// JSON file with the model, fitted parameters, dataset and minimizer
        #[arg(long, short)]
        settings: PathBuf,
    },
    /// Train a neural network on precomputed fingerprints
    Train(TrainArgs),
}

fn init_logger(verbose: bool) {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn padding(input: PathBuf, cutoff: f64, output: Option<PathBuf>) -> anyhow::Result<()> {
    let config = extxyz::read(&input)?;
    let neighbors = NeighborList::new(&config, cutoff, false)?;

    println!("contributing atoms: {}", neighbors.num_contributing());
    println!("padding atoms: {}", neighbors.num_padding());
    let average = (0..neighbors.num_contributing())
        .map(|atom| neighbors.neighbors(atom).len())
        .sum::<usize>() as f64
        / neighbors.num_contributing().max(1) as f64;
    println!("average number of neighbors: {average:.3}");

    if let Some(output) = output {
        let padded = Configuration::new(
            *config.cell(),
            [false; 3],
            neighbors.species().to_vec(),
            neighbors.coords().to_vec(),
        )?;
        extxyz::write(&output, &padded)?;
        log::info!("padded configuration written to {}", output.display());
    }

    Ok(())
}

fn descriptor(
    settings: PathBuf,
    dataset: PathBuf,
    output: PathBuf,
    fit_forces: bool,
    fit_stress: bool,
    normalize: bool,
) -> anyhow::Result<()> {
    let settings: ConfigDescriptor = config::read(&settings)
        .with_context(|| format!("reading descriptor settings {}", settings.display()))?;
    let descriptor = SymmetryFunction::try_from(settings)?;
    let dataset = Dataset::read(&dataset)?;

    let start = Instant::now();
    let fingerprints =
        Fingerprints::generate(dataset.configs(), &descriptor, fit_forces, fit_stress, normalize)?;
    println!(
        "{} descriptors for {} configurations computed in {:0.2?}",
        descriptor.num_descriptors(),
        fingerprints.fingerprints.len(),
        start.elapsed()
    );

    fingerprints.save(&output)?;
    log::info!("fingerprints written to {}", output.display());
    Ok(())
}

fn fit(settings: PathBuf) -> anyhow::Result<()> {
    let settings: ConfigFit = config::read(&settings)
        .with_context(|| format!("reading fit settings {}", settings.display()))?;
    parallel::init_thread_pool(settings.nprocs);

    let model = settings.build_model()?;
    print!("{}", model.echo_fitting_params());
    if model.params().num_opt_params() == 0 {
        bail!("no parameter is marked for fitting");
    }

    let dataset = Dataset::read(&settings.dataset)?;
    if dataset.is_empty() {
        bail!("no configurations found in {}", settings.dataset.display());
    }

    let mut calculator = Calculator::new(model);
    calculator.create(
        dataset.configs(),
        settings.use_energy,
        settings.use_forces,
        settings.use_stress,
    )?;

    let x0 = calculator.get_opt_params();
    let mut loss = Loss::new(calculator, settings.residual);

    let start = Instant::now();
    let outcome = minimize(&mut loss, &x0, &settings.minimizer)?;
    println!(
        "minimization stopped after {} iterations and {:0.2?}: {}",
        outcome.iterations,
        start.elapsed(),
        outcome.stop
    );
    println!("final loss: {:.8e}", outcome.value);
    println!("gradient norm: {:.3e}", outcome.gradient_norm);

    let mut calculator = loss.into_calculator();
    calculator.update_opt_params(&outcome.x)?;
    let model = calculator.into_model();
    print!("{}", model.echo_fitting_params());

    model.params().save(&settings.output)?;
    log::info!("fitted parameters written to {}", settings.output.display());
    Ok(())
}

#[derive(clap::Args, Debug)]
struct TrainArgs {
    /// Fingerprints written by the descriptor command
    #[arg(long, short)]
    fingerprints: PathBuf,
    /// Widths of the hidden layers
    #[arg(long, value_delimiter = ',', default_value = "10,10")]
    hidden: Vec<usize>,
    /// Seed of the initial weights
    #[arg(long, default_value_t = 35)]
    seed: u64,
    /// Fit the forces too, needs fingerprints with coordinate derivatives
    #[arg(long)]
    use_forces: bool,
    /// Fit the stress too, needs fingerprints with strain derivatives
    #[arg(long)]
    use_stress: bool,
    #[arg(long, default_value_t = 100)]
    max_iterations: usize,
    /// Where the trained network is saved
    #[arg(long, short, default_value = "network.json")]
    output: PathBuf,
}

fn train(args: TrainArgs) -> anyhow::Result<()> {
    let fingerprints = Fingerprints::load(&args.fingerprints)
        .with_context(|| format!("reading fingerprints {}", args.fingerprints.display()))?;
    if fingerprints.fingerprints.is_empty() {
        bail!("no fingerprints in {}", args.fingerprints.display());
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let network = NeuralNetwork::new(fingerprints.num_descriptors, &args.hidden, &mut rng)?;
    log::info!(
        "network layers {:?} with {} weights and biases",
        network.layers(),
        network.params().num_opt_params()
    );

    let x0 = network.params().opt_params();
    let mut loss = NetworkLoss::new(
        network,
        &fingerprints,
        ResidualWeights::default(),
        true,
        args.use_forces,
        args.use_stress,
    )?;

    let settings = MinimizerSettings {
        max_iterations: args.max_iterations,
        ..MinimizerSettings::default()
    };
    let start = Instant::now();
    let outcome = minimize(&mut loss, &x0, &settings)?;
    println!(
        "training stopped after {} iterations and {:0.2?}: {}",
        outcome.iterations,
        start.elapsed(),
        outcome.stop
    );
    println!("final loss: {:.8e}", outcome.value);

    let mut network = loss.into_network();
    network.params_mut().update_opt_params(&outcome.x)?;
    network.save(&args.output)?;
    log::info!("trained network written to {}", args.output.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    init_logger(args.verbose);

    match args.command {
        KliffCommand::Padding {
            input,
            cutoff,
            output,
        } => padding(input, cutoff, output),
        KliffCommand::Descriptor {
            settings,
            dataset,
            output,
            fit_forces,
            fit_stress,
            normalize,
        } => descriptor(settings, dataset, output, fit_forces, fit_stress, normalize),
        KliffCommand::Model { name, species } => {
            let model = BuiltinModel::from_name(&name, &species)?;
            print!("{}", model.echo_model_params());
            Ok(())
        }
        KliffCommand::Fit { settings } => fit(settings),
        KliffCommand::Train(args) => train(args),
    }
}
