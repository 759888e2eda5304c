//! Compiles the on-disk GLSL sources through the same frontend the build
//! script runs, so a shader edit the toolchain rejects fails here with a
//! readable error instead of only aborting the build.

use std::fs;
use std::path::Path;

use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;

const SPIRV_MAGIC: u32 = 0x0723_0203;

fn compile(path: &Path, stage: ShaderStage) -> Vec<u32> {
    let source = fs::read_to_string(path).unwrap();

    let mut frontend = Frontend::default();
    let module = frontend
        .parse(&Options::from(stage), &source)
        .unwrap_or_else(|err| panic!("{path:?} failed to parse: {err:?}"));

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let validation_info = validator
        .validate(&module)
        .unwrap_or_else(|err| panic!("{path:?} failed validation: {err:?}"));

    naga::back::spv::write_vec(
        &module,
        &validation_info,
        &naga::back::spv::Options::default(),
        None,
    )
    .unwrap_or_else(|err| panic!("{path:?} failed SPIR-V generation: {err:?}"))
}

#[test]
fn every_shipped_shader_compiles_to_spirv() {
    let shaders_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");

    let mut compiled = 0;
    for entry in fs::read_dir(shaders_dir).unwrap() {
        let path = entry.unwrap().path();
        let stage = match path.extension().and_then(|ext| ext.to_str()) {
            Some("vert") => ShaderStage::Vertex,
            Some("frag") => ShaderStage::Fragment,
            Some("comp") => ShaderStage::Compute,
            _ => continue,
        };

        let words = compile(&path, stage);
        assert_eq!(words[0], SPIRV_MAGIC, "{path:?} missing the SPIR-V magic");
        compiled += 1;
    }

    assert_eq!(compiled, 2, "expected the mesh vertex and fragment stages");
}
