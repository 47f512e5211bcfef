use std::env;

use anyhow::{anyhow, Context, Result};
use log::info;

use crystal_lighter::{
    demo, shine_lights, DrawnPolygon, LighterConfig, ProgressMeter, Radiosity, RenderView, Transform,
    TransformManager, World,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let config = match &options.config {
        Some(path) => LighterConfig::load(path)?,
        None => LighterConfig::default(),
    };
    let mut world = demo::build(&options.demo, &config)?;

    println!(
        "Loaded demo '{}' with {} sectors, {} polygons ({} lightmapped), {} lights",
        options.demo,
        world.sectors().len(),
        world.polygons().len(),
        world.lightmapped_polygons().count(),
        world.lights().len()
    );

    let lit = shine_lights(&mut world);
    println!("Direct light reached {lit} polygon(s)");

    if options.radiosity && config.radiosity.enabled {
        let meter = ProgressMeter::new(config.radiosity.meter_total);
        let report = Radiosity::new(&mut world, &config.radiosity)
            .with_progress(meter)
            .run();
        println!(
            "Finished radiosity ({}) after {} iteration(s) over {} patch(es)",
            report.reason, report.iterations, report.patches
        );
        println!(
            "Ambient ({}, {}, {})",
            report.ambient.x, report.ambient.y, report.ambient.z
        );
    } else {
        println!("Radiosity skipped");
    }

    print_view(&world)?;

    if !options.summary_only {
        for poly in world.lightmapped_polygons() {
            let Some(lightmap) = poly.lightmap() else {
                continue;
            };
            let map = lightmap.static_map();
            let size = map.size().max(1) as f32;
            let mean = |channel: &[u8]| channel.iter().map(|&v| f32::from(v)).sum::<f32>() / size;
            println!(
                " - {} {}x{} mean=({:.1}, {:.1}, {:.1})",
                poly.name(),
                lightmap.width(),
                lightmap.height(),
                mean(map.red()),
                mean(map.green()),
                mean(map.blue())
            );
        }
    }
    Ok(())
}

/// Draws the world from the first light's position.
fn print_view(world: &World) -> Result<()> {
    let light = world
        .lights()
        .first()
        .context("demo has no light to look from")?;
    let mut drawn: Vec<DrawnPolygon> = Vec::new();
    let mut transforms = TransformManager::new();
    let view = RenderView::new(Transform::translation(light.position));
    let stats = world.draw(light.sector, view, &mut drawn, &mut transforms);
    info!("deepest camera frame stack: {}", transforms.deepest());
    println!(
        "Drew {} polygon(s) through {} portal(s), max depth {}",
        drawn.len(),
        stats.portals_drawn,
        stats.max_depth
    );
    Ok(())
}

struct CliOptions {
    config: Option<String>,
    demo: String,
    radiosity: bool,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let mut config = None;
        let mut demo_name = String::from("two-rooms");
        let mut radiosity = true;
        let mut summary_only = false;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--demo" => {
                    demo_name = args
                        .next()
                        .ok_or_else(|| anyhow!("--demo needs a name: {}", demo::DEMOS.join(", ")))?;
                }
                "--no-radiosity" => radiosity = false,
                "--summary-only" => summary_only = true,
                other if other.starts_with("--") => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --demo, --no-radiosity or --summary-only"
                    ));
                }
                path if config.is_none() => config = Some(path.to_string()),
                extra => {
                    return Err(anyhow!(
                        "Usage: crystal-lighter [config.xml] [--demo NAME] [--no-radiosity] [--summary-only] (unexpected {extra})"
                    ));
                }
            }
        }
        Ok(Self {
            config,
            demo: demo_name,
            radiosity,
            summary_only,
        })
    }
}
