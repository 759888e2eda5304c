use std::path::PathBuf;

/// Contains configuration options for the renderer like the resolution, vsync, and other settings
#[derive(Clone)]
pub struct RenderConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,

    /// Forces FIFO presentation even when MAILBOX is available.
    pub vsync: bool,

    /// Directory the build script writes compiled SPIR-V binaries into.
    pub shaders_dir: PathBuf,

    /// Image file uploaded as the base material map. A 1x1 white map is
    /// used when unset.
    pub material_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_title: "kiln".to_owned(),
            window_width: 1280,
            window_height: 720,
            vsync: false,
            shaders_dir: PathBuf::from("shaders-built"),
            material_path: None,
        }
    }
}
