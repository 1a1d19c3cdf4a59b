use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use volume_reslice::{ImageReslice, config::Cli, volume_loader::VolumeLoader};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let volume = match VolumeLoader::load_from_directory(&cli.directory, cli.sort_by) {
        Ok(volume) => volume,
        Err(e) => {
            error!("Failed to load {}: {}", cli.directory.display(), e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        dimensions = ?volume.dimensions(),
        spacing = ?volume.spacing(),
        "loaded volume"
    );

    let mut reslice = ImageReslice::new();
    cli.apply_to(&mut reslice);
    reslice.set_reslice_axes_from_orientation(cli.orientation, volume.center());
    reslice.set_output_dimensionality(2);

    let slice = match reslice.execute(&volume) {
        Ok(slice) => slice,
        Err(e) => {
            error!("Reslice failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(image) = slice.slice_to_image(0, 0) else {
        error!("Resliced plane is empty");
        return ExitCode::FAILURE;
    };
    if let Err(e) = image.save(&cli.output) {
        error!("Failed to write {}: {}", cli.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!("wrote {}", cli.output.display());
    ExitCode::SUCCESS
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "volume_reslice=debug"
    } else {
        "volume_reslice=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
