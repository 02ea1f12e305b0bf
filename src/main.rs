use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context as _};
use clap::Parser;
use env_logger::Env;
use scene_tracer::{
    config_loader::ConfigFileLoader,
    gpu::{GpuDevice, HeadlessDevice},
    loader::AssetImporter,
    raytracing::ModelCatalog,
    vulkan::VulkanDevice,
};

/// Loads the configured models and uploads their triangles for ray tracing.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the config file. It is created if it does not exist.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Keep all resources in host memory instead of using a Vulkan device.
    #[arg(long)]
    headless: bool,

    /// Catalog index of the model to select, overrides the config.
    #[arg(long)]
    select: Option<usize>,

    /// Select every model of the catalog in turn.
    #[arg(long)]
    cycle: bool,
}

fn create_device(headless: bool) -> Arc<dyn GpuDevice> {
    if headless {
        return Arc::new(HeadlessDevice::new());
    }

    match VulkanDevice::new() {
        Ok(device) => Arc::new(device),
        Err(error) => {
            log::warn!("No usable Vulkan device ({}), running headless", error);
            Arc::new(HeadlessDevice::new())
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config_loader = ConfigFileLoader::new(&args.config);
    let config = config_loader
        .get_or_load_config()
        .with_context(|| format!("Could not load config {}", args.config.display()))?
        .clone();

    if config.models.is_empty() {
        bail!("The config {} lists no models", args.config.display());
    }

    let device = create_device(args.headless);
    let importer = AssetImporter::new(config.import);
    let mut catalog = ModelCatalog::load(&config.models, config.min_filter, &importer, &device)
        .context("Could not load models")?;

    let selections: Vec<usize> = if args.cycle {
        (0..catalog.models().len()).collect()
    } else {
        vec![args.select.unwrap_or(config.selected_model)]
    };

    for index in selections {
        catalog
            .select(index)
            .with_context(|| format!("Could not select model {}", index))?;

        if let (Some(entry), Some(model)) = (catalog.active_entry(), catalog.active()) {
            println!(
                "{}: {} meshes, {} vertices, {} triangles uploaded, {} textures",
                entry.name,
                model.meshes().len(),
                model.vertex_count(),
                catalog.store().triangle_count(),
                model.texture_cache().len()
            );
        }
    }

    log::info!("Built {} triangle buffers", catalog.rebuild_count());
    catalog.release_gpu_resources();
    Ok(())
}
