mod cli;
mod shutdown;

use cli::{CliConfig, CliError};
use nearmatch_core::{
    enumerate_sets, materialize, namespaced_output_dir, print_ranking, progress, run_tags,
    write_manifest, CancelToken, RunConfig, RunError, RunLabels, RunManifest, MANIFEST_FILE,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nearmatch=info,nearmatch_core=info".into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = CliConfig::from_env().unwrap_or_else(|err| match err {
        CliError::Help | CliError::Version => {
            println!("{}", err);
            std::process::exit(0);
        }
        _ => {
            eprintln!("{}", err);
            std::process::exit(2);
        }
    });

    let config = cli.resolve().unwrap_or_else(|err| {
        eprintln!("{}", err);
        std::process::exit(2);
    });

    let cancel = CancelToken::new();
    if let Err(error) = shutdown::install(cancel.clone()) {
        tracing::warn!(%error, "interrupts will not cancel the run cleanly");
    }

    if let Err(error) = run(&config, &cancel) {
        tracing::error!(%error, "run aborted");
        eprintln!("{}", error);
        std::process::exit(1);
    }
}

fn run(config: &RunConfig, cancel: &CancelToken) -> Result<(), RunError> {
    let sets = enumerate_sets(config)?;
    let candidate_root = config.candidate_root()?;
    let output_root = config.output_root()?;
    println!(
        "{} reference images in {}, {} candidate images in {}",
        sets.references.len(),
        config.reference_root.display(),
        sets.candidates.len(),
        candidate_root.display()
    );

    for (backend, model) in config.combinations() {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let progress_bar = progress::ranking_bar(sets.references.len(), &backend, &model);
        let summary = run_tags(config, &sets, &backend, &model, &progress_bar, cancel)?;
        progress_bar.finish_with_message("Ranking complete");

        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let output_dir = namespaced_output_dir(&output_root, &backend, &model);
        let copy_bar = progress::copy_bar(summary.ranked.len());
        let stats = materialize(&summary.ranked, &output_dir, &copy_bar)?;

        print_ranking(&summary);
        println!(
            "{} files copied to {} ({} failed)",
            stats.copied.len(),
            output_dir.display(),
            stats.failed
        );

        if config.manifest {
            let labels = RunLabels {
                reference_root: &config.reference_root,
                candidate_root,
                backend: &backend,
                model: &model,
                policy: config.selection,
                average: config.average,
            };
            let manifest = RunManifest::new(labels, &summary, &stats);
            let path = output_dir.join(MANIFEST_FILE);
            match write_manifest(&manifest, &path) {
                Ok(_) => println!("Manifest written to {}", path.display()),
                Err(error) => tracing::warn!(%error, "could not write manifest"),
            }
        }
    }
    Ok(())
}
