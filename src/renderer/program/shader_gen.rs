//! Shader Source Generation
//!
//! Program source is produced from `minijinja` templates embedded with
//! `rust-embed`. Each shading model has a fragment template
//! (`<model>.frag.glsl`); all models share `mesh.vert.glsl`. Templates include
//! chunks from `shaders/chunks/`.
//!
//! Template syntax:
//!
//! | construct  | delimiter          |
//! |------------|--------------------|
//! | statements | `{$ ... $}` or a `$$` line prefix |
//! | values     | `{{ ... }}`        |
//!
//! The braces of the shading language stay untouched this way.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, Error, ErrorKind};
use rust_embed::RustEmbed;
use serde::Serialize;

use crate::errors::Result;
use crate::renderer::program::key::ProgramKey;

static SHADER_ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(RustEmbed)]
#[folder = "src/renderer/shaders"]
struct ShaderAssets;

#[cfg(all(debug_assertions, not(target_arch = "wasm32")))]
const SHADER_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/src/renderer/shaders");
const VERTEX_TEMPLATE: &str = "mesh.vert";

pub fn get_env() -> &'static Environment<'static> {
    SHADER_ENV.get_or_init(|| {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()
            .expect("static shader syntax is valid");

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);

        env.set_loader(shader_loader);
        env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

        env
    })
}

fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = if std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("glsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.glsl"))
    };

    // Hot reload from the source tree in debug builds.
    #[cfg(all(debug_assertions, not(target_arch = "wasm32")))]
    {
        let path = std::path::Path::new(SHADER_DIR).join(filename.as_ref());
        if path.exists() {
            return std::fs::read_to_string(&path).map(Some).map_err(|e| {
                Error::new(
                    ErrorKind::TemplateNotFound,
                    format!("failed to read {}: {e}", path.display()),
                )
            });
        }
    }

    if let Some(file) = ShaderAssets::get(&filename)
        && let Ok(source) = std::str::from_utf8(file.data.as_ref())
    {
        return Ok(Some(source.to_string()));
    }

    Ok(None)
}

#[derive(Serialize)]
struct ShaderContext<'a> {
    #[serde(flatten)]
    defines: BTreeMap<String, String>,
    custom_defines: &'a [(String, String)],
    stage: &'static str,
}

/// Generated vertex and fragment source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    pub vertex: String,
    pub fragment: String,
}

pub struct ShaderGenerator;

impl ShaderGenerator {
    /// Renders both stages for `key`. `custom_defines` are emitted verbatim
    /// as `#define` lines after the version header.
    pub fn generate(key: &ProgramKey, custom_defines: &[(String, String)]) -> Result<ProgramSource> {
        let env = get_env();
        let defines = key.template_defines();

        let vertex = env.get_template(VERTEX_TEMPLATE)?.render(ShaderContext {
            defines: defines.clone(),
            custom_defines,
            stage: "vertex",
        })?;

        let fragment_name = format!("{}.frag", key.model.name());
        let fragment = env.get_template(&fragment_name)?.render(ShaderContext {
            defines,
            custom_defines,
            stage: "fragment",
        })?;

        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "generated program '{}'\n--- vertex ---\n{}\n--- fragment ---\n{}",
                key.model.name(),
                collapse_blank_lines(&vertex),
                collapse_blank_lines(&fragment)
            );
        }

        Ok(ProgramSource { vertex, fragment })
    }
}

fn collapse_blank_lines(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_newline = false;
    for c in s.chars() {
        if c == '\n' {
            if !last_was_newline {
                result.push('\n');
                last_was_newline = true;
            }
        } else {
            result.push(c);
            last_was_newline = false;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::clipping::ClippingCounts;
    use crate::renderer::lights::LightCounts;
    use crate::renderer::program::key::{FogKind, OutputTarget, SceneInputs};
    use crate::resources::geometry::GeometryFeatures;
    use crate::resources::material::{MaterialFeatures, ShadingModel, Side};

    fn key(model: ShadingModel, lights: LightCounts) -> ProgramKey {
        ProgramKey::new(
            model,
            MaterialFeatures::TONE_MAPPED,
            Side::Front,
            GeometryFeatures::HAS_NORMAL,
            ClippingCounts::default(),
            &SceneInputs {
                lights,
                shadow_map: None,
                fog: FogKind::None,
                output: OutputTarget::LINEAR,
            },
            false,
            0,
        )
    }

    #[test]
    fn every_model_renders() {
        for model in ShadingModel::ALL {
            let source = ShaderGenerator::generate(&key(model, LightCounts::default()), &[])
                .unwrap_or_else(|e| panic!("{}: {e}", model.name()));
            assert!(source.vertex.contains("uniform mat4 modelMatrix;"));
            assert!(source.fragment.contains("out vec4 fragColor;"));
        }
    }

    #[test]
    fn light_arrays_follow_counts() {
        let lights = LightCounts {
            directional: 2,
            ..LightCounts::default()
        };
        let source = ShaderGenerator::generate(&key(ShadingModel::Standard, lights), &[]).unwrap();
        assert!(source.fragment.contains("uniform float directionalLights[12];"));
        assert!(!source.fragment.contains("pointLights"));
    }

    #[test]
    fn custom_defines_are_emitted() {
        let defines = vec![("WAVES".to_string(), "3".to_string())];
        let source =
            ShaderGenerator::generate(&key(ShadingModel::Basic, LightCounts::default()), &defines)
                .unwrap();
        assert!(source.vertex.contains("#define WAVES 3"));
        assert!(source.fragment.contains("#define WAVES 3"));
    }

    #[cfg(all(debug_assertions, not(target_arch = "wasm32")))]
    #[test]
    fn hot_reload_dir_is_anchored_at_the_crate() {
        let dir = std::path::Path::new(SHADER_DIR);
        assert!(dir.is_absolute());
        assert!(dir.join("mesh.vert.glsl").exists());
    }
}
