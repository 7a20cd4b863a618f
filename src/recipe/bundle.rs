//! Bundles: a directory (or `.zip` of one) holding a recipe document, its payloads and a
//! preview image.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::foundation::error::{RecipeError, RecipeResult};
use crate::recipe::io::{SaveOpts, has_extension, load_document, save_recipe};
use crate::recipe::model::Recipe;
use crate::render::backend::Raster;

/// Canonical document names inside a bundle, in preference order.
pub const CANONICAL_NAMES: [&str; 2] = ["recipe.yaml", "recipe.yml"];

/// Preview image file name inside a bundle.
pub const PREVIEW_NAME: &str = "preview.png";

/// Locate the document inside a bundle directory.
///
/// Resolution order: a canonical name at the root, then the only document at the root, then
/// the same two rules inside the only subdirectory.
pub fn resolve_bundle_dir(dir: &Path) -> RecipeResult<PathBuf> {
    if let Some(p) = resolve_in(dir)? {
        return Ok(p);
    }
    let subdirs = list(dir)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect::<Vec<_>>();
    if let [only] = subdirs.as_slice()
        && let Some(p) = resolve_in(only)?
    {
        return Ok(p);
    }
    Err(RecipeError::RecipeNotFound(format!(
        "no recipe document in bundle '{}'",
        dir.display()
    )))
}

fn resolve_in(dir: &Path) -> RecipeResult<Option<PathBuf>> {
    if let Some(p) = CANONICAL_NAMES
        .iter()
        .map(|n| dir.join(n))
        .find(|p| p.is_file())
    {
        return Ok(Some(p));
    }
    let docs = list(dir)?
        .into_iter()
        .filter(|p| p.is_file() && has_extension(p, &["yaml", "yml"]))
        .collect::<Vec<_>>();
    match docs.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(only.clone())),
        many => Err(RecipeError::AmbiguousRecipe(format!(
            "{} documents in '{}' and none is named recipe.yaml: {}",
            many.len(),
            dir.display(),
            many.iter()
                .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn list(dir: &Path) -> RecipeResult<Vec<PathBuf>> {
    let mut out = std::fs::read_dir(dir)
        .with_context(|| format!("read bundle directory '{}'", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    out.sort();
    Ok(out)
}

/// Load a bundle directory or `.zip` archive.
///
/// Archives are extracted to a temporary directory; their payloads are read into memory before
/// it is removed, so the returned recipe does not depend on the archive afterwards.
#[tracing::instrument]
pub fn load_bundle(source: &Path) -> RecipeResult<Recipe> {
    if source.is_dir() {
        let doc = resolve_bundle_dir(source)?;
        return load_document(&doc);
    }
    if !source.is_file() {
        return Err(RecipeError::RecipeNotFound(source.display().to_string()));
    }
    let file = File::open(source).with_context(|| format!("open bundle '{}'", source.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("read zip archive '{}'", source.display()))?;
    let tmp = tempfile::tempdir().context("create extraction directory")?;
    archive
        .extract(tmp.path())
        .with_context(|| format!("extract bundle '{}'", source.display()))?;

    let doc = resolve_bundle_dir(tmp.path())?;
    let mut recipe = load_document(&doc)?;
    let refs = recipe.external_refs().cloned().collect::<Vec<_>>();
    recipe.payloads.materialize(&refs);
    tracing::debug!(columns = refs.len(), "materialized zipped payloads");
    Ok(recipe)
}

/// Preview image stored in a bundle directory or `.zip` archive, next to its document.
///
/// `None` when `source` is not a bundle or holds no preview.
pub fn load_preview(source: &Path) -> RecipeResult<Option<Raster>> {
    if source.is_dir() {
        let doc = resolve_bundle_dir(source)?;
        let preview = doc
            .parent()
            .map(|d| d.join(PREVIEW_NAME))
            .filter(|p| p.is_file());
        return preview.map(|p| Raster::load_png(&p)).transpose();
    }
    if !has_extension(source, &["zip"]) {
        return Ok(None);
    }
    let file = File::open(source).with_context(|| format!("open bundle '{}'", source.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("read zip archive '{}'", source.display()))?;
    let entry = archive
        .file_names()
        .filter(|n| *n == PREVIEW_NAME || n.ends_with(&format!("/{PREVIEW_NAME}")))
        .min_by_key(|n| n.len())
        .map(str::to_owned);
    let Some(name) = entry else {
        return Ok(None);
    };
    let mut bytes = Vec::new();
    archive
        .by_name(&name)
        .with_context(|| format!("open '{name}' in '{}'", source.display()))?
        .read_to_end(&mut bytes)
        .with_context(|| format!("read '{name}' in '{}'", source.display()))?;
    Raster::from_png(&bytes).map(Some)
}

/// Write a bundle to `dest`: a directory, or a `.zip` archive when `dest` ends in `.zip`.
///
/// The document is always stored as `recipe.yaml`; `preview` is written as `preview.png`.
#[tracing::instrument(skip(recipe, preview), fields(recipe = %recipe.id))]
pub fn save_bundle(
    recipe: &Recipe,
    preview: Option<&Raster>,
    dest: &Path,
    opts: &SaveOpts,
) -> RecipeResult<PathBuf> {
    if !has_extension(dest, &["zip"]) {
        write_bundle_dir(recipe, preview, dest, opts)?;
        return Ok(dest.to_path_buf());
    }

    let tmp = tempfile::tempdir().context("create bundle staging directory")?;
    write_bundle_dir(recipe, preview, tmp.path(), opts)?;
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory '{}'", parent.display()))?;
    }
    let file = File::create(dest).with_context(|| format!("create '{}'", dest.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    let mut stack = vec![tmp.path().to_path_buf()];
    while let Some(dir) = stack.pop() {
        for path in list(&dir)? {
            let rel = path
                .strip_prefix(tmp.path())
                .context("bundle entry outside staging directory")?
                .to_string_lossy()
                .replace('\\', "/");
            if path.is_dir() {
                zip.add_directory(rel, options)
                    .context("write zip directory entry")?;
                stack.push(path);
            } else {
                let mut bytes = Vec::new();
                File::open(&path)
                    .and_then(|mut f| f.read_to_end(&mut bytes))
                    .with_context(|| format!("read '{}'", path.display()))?;
                zip.start_file(rel, options).context("write zip entry")?;
                zip.write_all(&bytes).context("write zip entry")?;
            }
        }
    }
    zip.finish().context("finish zip archive")?;
    Ok(dest.to_path_buf())
}

fn write_bundle_dir(
    recipe: &Recipe,
    preview: Option<&Raster>,
    dir: &Path,
    opts: &SaveOpts,
) -> RecipeResult<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create bundle directory '{}'", dir.display()))?;
    save_recipe(recipe, &dir.join(CANONICAL_NAMES[0]), opts)?;
    if let Some(raster) = preview {
        raster.save_png(&dir.join(PREVIEW_NAME))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/recipe/bundle.rs"]
mod tests;
