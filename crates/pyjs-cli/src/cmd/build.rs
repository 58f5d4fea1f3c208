//! `build` and `recipe` commands

use std::path::Path;

use anyhow::Result;
use pyjs_core::shell::require_tools;
use tracing::info;

use crate::StageArgs;

/// Run the requested stages of one target.
pub fn build(root: &Path, config: Option<&Path>, target: &str, stages: &StageArgs) -> Result<()> {
    let settings = super::load_settings(root, config, stages)?;
    let dry_run = settings.dry_run;
    let factory = super::factory(root, settings)?;
    let mut builder = factory.builder(target)?;

    if dry_run {
        return super::print_plan(&builder.dump(), &builder.plan());
    }

    require_tools(&builder.required_tools())?;
    factory.project().ensure_layout()?;
    builder.execute()?;
    info!("{target}: done");
    Ok(())
}

/// Run the requested stages of every builder in a recipe.
pub fn recipe(root: &Path, config: Option<&Path>, name: &str, stages: &StageArgs) -> Result<()> {
    let settings = super::load_settings(root, config, stages)?;
    let dry_run = settings.dry_run;
    let factory = super::factory(root, settings)?;
    let mut recipe = factory.recipe(name)?;

    if dry_run {
        let plan = recipe
            .builders()
            .first()
            .map(pyjs_core::Builder::plan)
            .unwrap_or_default();
        return super::print_plan(&recipe.dump(), &plan);
    }

    for builder in recipe.builders() {
        require_tools(&builder.required_tools())?;
    }
    factory.project().ensure_layout()?;
    recipe.execute()?;
    info!("recipe {name}: done");
    Ok(())
}
