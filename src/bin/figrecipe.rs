use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use figrecipe::{
    BBoxRecord, CpuEngine, DEFAULT_MSE_THRESHOLD, HitmapOpts, IdentityMap, Raster, ReplayOpts,
    assign_identities, bbox_map, compare_rasters, load_preview, load_recipe, reconstruct_with,
    recipe_info, validate_recipe,
};
use indexmap::IndexMap;

#[derive(Parser, Debug)]
#[command(name = "figrecipe", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize a recipe.
    Info(InfoArgs),
    /// Reconstruct a recipe and render it as a PNG.
    Reproduce(ReproduceArgs),
    /// Render the element hitmap of a recipe with its identity map.
    Hitmap(HitmapArgs),
    /// Compare two images pixel by pixel.
    Diff(DiffArgs),
    /// Check that a recipe reproduces its original image.
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Recipe document, image next to one, bundle directory or `.zip` bundle.
    recipe: PathBuf,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Parser, Debug)]
struct ReproduceArgs {
    /// Recipe to reconstruct.
    recipe: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Render what replays and report failing panels instead of aborting.
    #[arg(long, default_value_t = false)]
    partial: bool,

    /// Skip decoration records.
    #[arg(long, default_value_t = false)]
    skip_decorations: bool,
}

#[derive(Parser, Debug)]
struct HitmapArgs {
    /// Recipe to reconstruct.
    recipe: PathBuf,

    /// Output hitmap PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Output JSON with the identity map and pixel boxes.
    #[arg(long)]
    map: PathBuf,

    /// Leave text out of the hitmap.
    #[arg(long, default_value_t = false)]
    no_text: bool,
}

#[derive(Parser, Debug)]
struct DiffArgs {
    /// Reference image.
    a: PathBuf,

    /// Image to compare.
    b: PathBuf,

    /// Largest channel difference still counted as a match.
    #[arg(long, default_value_t = 0)]
    threshold: u8,

    /// Write the diff visualization here.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Exit with an error unless the images are pixel-identical.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Recipe to reconstruct.
    recipe: PathBuf,

    /// Original image. Defaults to the bundle preview, or the image given as the recipe, or a
    /// `.png` next to the document.
    #[arg(long)]
    original: Option<PathBuf>,

    /// Largest mean squared error that still passes.
    #[arg(long, default_value_t = DEFAULT_MSE_THRESHOLD)]
    threshold: f64,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Info(args) => cmd_info(args),
        Command::Reproduce(args) => cmd_reproduce(args),
        Command::Hitmap(args) => cmd_hitmap(args),
        Command::Diff(args) => cmd_diff(args),
        Command::Validate(args) => cmd_validate(args),
    }
}

fn cmd_info(args: InfoArgs) -> anyhow::Result<()> {
    let recipe = load_recipe(&args.recipe)?;
    let info = recipe_info(&recipe);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print!("{info}");
    }
    Ok(())
}

fn cmd_reproduce(args: ReproduceArgs) -> anyhow::Result<()> {
    let recipe = load_recipe(&args.recipe)?;
    let opts = ReplayOpts {
        partial: args.partial,
        skip_decorations: args.skip_decorations,
        ..ReplayOpts::default()
    };
    let mut rec = match reconstruct_with(&recipe, &CpuEngine, &opts) {
        Ok(rec) => rec,
        Err(figrecipe::RecipeError::Reconstruction(issues)) => {
            for issue in &issues {
                eprintln!("{issue}");
            }
            anyhow::bail!("reconstruction failed with {} issue(s)", issues.len());
        }
        Err(e) => return Err(e.into()),
    };
    for issue in &rec.issues {
        eprintln!("{issue}");
    }
    let raster = rec.figure.render()?;
    write_png(&raster, &args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_hitmap(args: HitmapArgs) -> anyhow::Result<()> {
    let recipe = load_recipe(&args.recipe)?;
    let mut figure = figrecipe::reconstruct(&recipe, &CpuEngine)?;
    let size = figure.canvas().native_size();
    let opts = HitmapOpts {
        include_text: !args.no_text,
    };
    let (map, raster) = assign_identities(&mut figure, size, &opts)?;
    let boxes = bbox_map(&figure, size);
    write_png(&raster, &args.out)?;

    let doc = HitmapDoc {
        width: size.width,
        height: size.height,
        identities: &map,
        bboxes: &boxes,
    };
    create_parent(&args.map)?;
    std::fs::write(&args.map, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("write identity map '{}'", args.map.display()))?;
    eprintln!(
        "wrote {} and {} ({} elements)",
        args.out.display(),
        args.map.display(),
        map.len()
    );
    Ok(())
}

#[derive(serde::Serialize)]
struct HitmapDoc<'a> {
    width: u32,
    height: u32,
    identities: &'a IdentityMap,
    bboxes: &'a IndexMap<String, BBoxRecord>,
}

fn cmd_diff(args: DiffArgs) -> anyhow::Result<()> {
    let a = Raster::load_png(&args.a)?;
    let b = Raster::load_png(&args.b)?;
    let (stats, vis) = compare_rasters(&a, &b, args.threshold)?;
    println!("{stats}");
    if let Some(out) = &args.out {
        write_png(&vis, out)?;
    }
    if args.strict && !stats.is_pixel_perfect {
        anyhow::bail!("images differ in {} pixel(s)", stats.mismatched);
    }
    Ok(())
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let recipe = load_recipe(&args.recipe)?;
    let original = original_image(&args)?;
    let result = validate_recipe(&recipe, &CpuEngine, &original, args.threshold)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{result}");
    }
    if !result.passed {
        anyhow::bail!("{}", result.message);
    }
    Ok(())
}

fn original_image(args: &ValidateArgs) -> anyhow::Result<Raster> {
    if let Some(path) = &args.original {
        return Ok(Raster::load_png(path)?);
    }
    if let Some(preview) = load_preview(&args.recipe)? {
        return Ok(preview);
    }
    let src = &args.recipe;
    let is_png = src
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"));
    let sibling = if is_png {
        src.clone()
    } else {
        src.with_extension("png")
    };
    if sibling.is_file() {
        return Ok(Raster::load_png(&sibling)?);
    }
    anyhow::bail!(
        "no original image found for '{}'; pass --original",
        src.display()
    )
}

fn write_png(raster: &Raster, path: &Path) -> anyhow::Result<()> {
    create_parent(path)?;
    raster.save_png(path)?;
    Ok(())
}

fn create_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}
