pub mod app;
pub mod renderer;

use color_eyre::Result;

use crate::renderer::config::RenderConfig;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    app::run(RenderConfig::default())?;

    Ok(())
}
