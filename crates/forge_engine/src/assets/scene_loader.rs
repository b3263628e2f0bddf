//! Scene description loader
//!
//! Parses the line-oriented scene text format in a single pass: the first
//! line is a version integer, every following non-blank line starts with a
//! directive keyword. The loader keeps exactly one entity context open at a
//! time (model, actor or skeleton) and flushes it into its owning store on
//! every context switch and at end of input.
//!
//! A small lexer/parser split keeps malformed input testable: [`Tokens`]
//! turns a line into words with typed `expect_*` accessors, the loader
//! consumes them per directive. Unknown directives are fatal; most
//! wrong-context or unresolved-name situations degrade with a warning, as
//! the renderer tolerates actors without a model.

use std::path::{Path, PathBuf};

use nalgebra::Matrix4;
use thiserror::Error;

use crate::assets::catalog::{AssetCatalog, Bone, ModelFlags, StageError, StagedGeometry};
use crate::assets::model_format::{self, ModelFormatError, VertexKind};
use crate::assets::{AssetSource, AssetStore, DirSource};
use crate::foundation::memory::{Arena, MemoryPool, PoolError};
use crate::scene::{Actor, Scene, SceneFull};

/// Scene loading errors. Every variant aborts the load; recoverable
/// conditions are logged and counted in [`LoadReport::warnings`] instead.
#[derive(Debug, Error)]
pub enum SceneError {
    /// Scene file could not be read
    #[error("failed to read scene file '{path}': {source}")]
    Io {
        /// Scene file path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A directive's arguments were malformed
    #[error("line {line}: {message}")]
    Directive {
        /// 1-based line number
        line: usize,
        /// What was expected
        message: String,
    },

    /// A line started with an unrecognized keyword
    #[error("line {line}: unknown directive '{word}'")]
    UnknownDirective {
        /// 1-based line number
        line: usize,
        /// The offending keyword
        word: String,
    },

    /// A `PATH` model file could not be read
    #[error("line {line}: failed to read model file '{path}': {source}")]
    ModelIo {
        /// 1-based line number of the `PATH` directive
        line: usize,
        /// Model file path as written in the scene
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A `PATH` model file was malformed
    #[error("line {line}: model file '{path}': {source}")]
    ModelFormat {
        /// 1-based line number of the `PATH` directive
        line: usize,
        /// Model file path as written in the scene
        path: String,
        /// Decode failure
        #[source]
        source: ModelFormatError,
    },

    /// Memory pool exhausted while staging
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Model registry full
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Scene actor capacity exceeded
    #[error(transparent)]
    SceneFull(#[from] SceneFull),
}

/// Summary of a completed load.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Version integer from the first line; recorded, not validated
    pub version: i32,
    /// Models staged and registered
    pub models: usize,
    /// Models dropped for lacking a `PATH`
    pub dropped_models: usize,
    /// Actors appended to the scene
    pub actors: usize,
    /// Skeletons registered
    pub skeletons: usize,
    /// Recoverable diagnostics emitted
    pub warnings: usize,
}

/// Word lexer over one directive line.
struct Tokens<'a> {
    line: usize,
    words: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(line: usize, text: &'a str) -> Self {
        Self {
            line,
            words: text.split_whitespace(),
        }
    }

    fn next_word(&mut self) -> Option<&'a str> {
        self.words.next()
    }

    fn expect_word(&mut self, what: &str) -> Result<&'a str, SceneError> {
        self.next_word().ok_or_else(|| SceneError::Directive {
            line: self.line,
            message: format!("expected {what}"),
        })
    }

    fn expect_f32(&mut self, what: &str) -> Result<f32, SceneError> {
        let word = self.expect_word(what)?;
        word.parse().map_err(|_| SceneError::Directive {
            line: self.line,
            message: format!("invalid {what} '{word}'"),
        })
    }

    fn expect_i32(&mut self, what: &str) -> Result<i32, SceneError> {
        let word = self.expect_word(what)?;
        word.parse().map_err(|_| SceneError::Directive {
            line: self.line,
            message: format!("invalid {what} '{word}'"),
        })
    }

    fn expect_vec3(&mut self, what: &str) -> Result<[f32; 3], SceneError> {
        Ok([
            self.expect_f32(what)?,
            self.expect_f32(what)?,
            self.expect_f32(what)?,
        ])
    }
}

/// Model block being parsed.
#[derive(Debug)]
struct ModelContext {
    name: String,
    flags: ModelFlags,
    skeleton_name: Option<String>,
    geometry: Option<StagedGeometry>,
}

/// Actor block being parsed.
#[derive(Debug)]
struct ActorContext {
    actor: Actor,
}

/// Skeleton block being parsed.
#[derive(Debug)]
struct SkeletonContext {
    name: String,
    bones: Vec<Bone>,
}

/// The single in-progress entity. Exactly one context is live at a time;
/// switching directives flushes the previous one.
#[derive(Debug)]
enum ParseContext {
    Idle,
    Model(ModelContext),
    Actor(ActorContext),
    Skeleton(SkeletonContext),
}

struct Loader<'a> {
    source: &'a dyn AssetSource,
    pool: &'a mut MemoryPool,
    scratch: &'a mut Arena,
    catalog: &'a mut AssetCatalog,
    scene: &'a mut Scene,
    ctx: ParseContext,
    report: LoadReport,
}

/// Load a scene description from `text`, staging model files through
/// `source` into `store` and appending actors to `scene`.
pub fn load_scene(
    text: &str,
    source: &dyn AssetSource,
    store: &mut AssetStore,
    scene: &mut Scene,
) -> Result<LoadReport, SceneError> {
    let AssetStore {
        pool,
        scratch,
        catalog,
    } = store;
    let loader = Loader {
        source,
        pool,
        scratch,
        catalog,
        scene,
        ctx: ParseContext::Idle,
        report: LoadReport::default(),
    };
    loader.run(text)
}

/// Load a scene description file, resolving model paths relative to its
/// directory. A missing scene file is fatal.
pub fn load_scene_file(
    path: &Path,
    store: &mut AssetStore,
    scene: &mut Scene,
) -> Result<LoadReport, SceneError> {
    let text = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("parsing scene '{}'", path.display());
    let root = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    load_scene(&text, &DirSource::new(root), store, scene)
}

impl Loader<'_> {
    fn run(mut self, text: &str) -> Result<LoadReport, SceneError> {
        let mut lines = text.lines().enumerate();

        if let Some((_, first)) = lines.next() {
            match first.trim().parse::<i32>() {
                Ok(version) => self.report.version = version,
                Err(_) => self.warn(format!("malformed version line '{}'", first.trim())),
            }
        }

        for (index, raw) in lines {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut tokens = Tokens::new(line, trimmed);
            let Some(keyword) = tokens.next_word() else {
                continue;
            };
            self.directive(keyword, &mut tokens)?;
        }

        self.flush()?;
        debug_assert_eq!(self.scratch.scope_depth(), 0);
        Ok(self.report)
    }

    fn directive(&mut self, keyword: &str, tokens: &mut Tokens<'_>) -> Result<(), SceneError> {
        match keyword {
            "MODEL" => {
                self.flush()?;
                let name = tokens.expect_word("model name")?;
                self.ctx = ParseContext::Model(ModelContext {
                    name: name.to_string(),
                    flags: ModelFlags::empty(),
                    skeleton_name: None,
                    geometry: None,
                });
            }
            "ACTOR" => {
                self.flush()?;
                let name = tokens.expect_word("model name")?;
                let model = self.catalog.find_model(name);
                if model.is_none() {
                    self.warn(format!(
                        "line {}: actor references unknown model '{name}'",
                        tokens.line
                    ));
                }
                self.ctx = ParseContext::Actor(ActorContext {
                    actor: Actor {
                        model,
                        ..Actor::default()
                    },
                });
            }
            "SKELETON" => {
                self.flush()?;
                let name = tokens.expect_word("skeleton name")?;
                self.ctx = ParseContext::Skeleton(SkeletonContext {
                    name: name.to_string(),
                    bones: Vec::new(),
                });
            }
            "PATH" => self.path_directive(tokens)?,
            "POSITION" => {
                let value = tokens.expect_vec3("position component")?;
                if let ParseContext::Actor(a) = &mut self.ctx {
                    a.actor.position = value;
                } else {
                    self.warn(format!("line {}: POSITION outside ACTOR", tokens.line));
                }
            }
            "ROTATION" => {
                let value = tokens.expect_vec3("rotation component")?;
                if let ParseContext::Actor(a) = &mut self.ctx {
                    a.actor.rotation = value;
                } else {
                    self.warn(format!("line {}: ROTATION outside ACTOR", tokens.line));
                }
            }
            "SCALE" => {
                let value = tokens.expect_vec3("scale component")?;
                if let ParseContext::Actor(a) = &mut self.ctx {
                    a.actor.scale = value;
                } else {
                    self.warn(format!("line {}: SCALE outside ACTOR", tokens.line));
                }
            }
            "MATERIAL" => {
                let value = tokens.expect_i32("material id")?;
                if let ParseContext::Actor(a) = &mut self.ctx {
                    if value >= 0 {
                        a.actor.material = value as u32;
                    } else {
                        self.warn(format!(
                            "line {}: ignoring negative material id {value}",
                            tokens.line
                        ));
                    }
                } else {
                    self.warn(format!("line {}: MATERIAL outside ACTOR", tokens.line));
                }
            }
            "BONE" => {
                let name = tokens.expect_word("bone name")?;
                let mut values = [0.0f32; 16];
                for value in &mut values {
                    *value = tokens.expect_f32("bone matrix value")?;
                }
                if let ParseContext::Skeleton(s) = &mut self.ctx {
                    s.bones.push(Bone {
                        name: name.to_string(),
                        transform: Matrix4::from_column_slice(&values),
                    });
                } else {
                    self.warn(format!("line {}: BONE outside SKELETON", tokens.line));
                }
            }
            "USE_SKELETON" => {
                let name = tokens.expect_word("skeleton name")?;
                if let ParseContext::Model(m) = &mut self.ctx {
                    if m.geometry.is_some() {
                        // Too late: geometry was already decoded at the
                        // static stride. Ignore rather than mislabel it.
                        log::warn!(
                            "line {}: USE_SKELETON after PATH, model '{}' stays static",
                            tokens.line,
                            m.name
                        );
                        self.report.warnings += 1;
                    } else {
                        m.flags |= ModelFlags::SKINNED;
                        m.skeleton_name = Some(name.to_string());
                    }
                } else {
                    self.warn(format!("line {}: USE_SKELETON outside MODEL", tokens.line));
                }
            }
            other => {
                return Err(SceneError::UnknownDirective {
                    line: tokens.line,
                    word: other.to_string(),
                })
            }
        }
        Ok(())
    }

    fn path_directive(&mut self, tokens: &mut Tokens<'_>) -> Result<(), SceneError> {
        let path = tokens.expect_word("model file path")?;
        let kind = match &self.ctx {
            ParseContext::Model(m) => {
                if m.geometry.is_some() {
                    self.warn(format!(
                        "line {}: duplicate PATH, keeping earlier geometry",
                        tokens.line
                    ));
                    return Ok(());
                }
                m.flags.vertex_kind()
            }
            _ => {
                self.warn(format!("line {}: PATH outside MODEL", tokens.line));
                return Ok(());
            }
        };

        let raw = self
            .source
            .read(Path::new(path))
            .map_err(|source| SceneError::ModelIo {
                line: tokens.line,
                path: path.to_string(),
                source,
            })?;

        // Raw file bytes are transient: stage them in a scratch scope that
        // closes before the next directive.
        self.scratch.start_scope();
        let outcome = self.decode_and_stage(&raw, kind, tokens.line, path);
        self.scratch.end_scope(self.pool);
        let geometry = outcome?;

        if let ParseContext::Model(m) = &mut self.ctx {
            m.geometry = Some(geometry);
        }
        Ok(())
    }

    fn decode_and_stage(
        &mut self,
        raw: &[u8],
        kind: VertexKind,
        line: usize,
        path: &str,
    ) -> Result<StagedGeometry, SceneError> {
        let slot = self.scratch.push_bytes(self.pool, raw)?;
        let data = model_format::decode(self.scratch.bytes(slot), kind).map_err(|source| {
            SceneError::ModelFormat {
                line,
                path: path.to_string(),
                source,
            }
        })?;
        self.catalog
            .stage_geometry(self.pool, &data)
            .map_err(Into::into)
    }

    /// Flush the live context into its owning store.
    fn flush(&mut self) -> Result<(), SceneError> {
        match std::mem::replace(&mut self.ctx, ParseContext::Idle) {
            ParseContext::Idle => {}
            ParseContext::Model(m) => {
                let Some(geometry) = m.geometry else {
                    self.warn(format!("model '{}' has no PATH directive, dropping", m.name));
                    self.report.dropped_models += 1;
                    return Ok(());
                };
                let mut skeleton = None;
                if let Some(skeleton_name) = &m.skeleton_name {
                    skeleton = self.catalog.find_skeleton(skeleton_name);
                    if skeleton.is_none() {
                        self.warn(format!(
                            "model '{}' uses unknown skeleton '{skeleton_name}'",
                            m.name
                        ));
                    }
                }
                self.catalog
                    .register_model(&m.name, geometry, m.flags, skeleton)?;
                self.report.models += 1;
            }
            ParseContext::Actor(a) => {
                self.scene.add(a.actor)?;
                self.report.actors += 1;
            }
            ParseContext::Skeleton(s) => {
                self.catalog.register_skeleton(&s.name, s.bones);
                self.report.skeletons += 1;
            }
        }
        Ok(())
    }

    fn warn(&mut self, message: String) {
        log::warn!("{message}");
        self.report.warnings += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::model_format::test_support::{encode, triangle};
    use crate::assets::model_format::RiggedVertex;
    use crate::assets::MemorySource;
    use approx::assert_relative_eq;

    fn setup() -> (AssetStore, Scene, MemorySource) {
        let store = AssetStore::default();
        let scene = Scene::with_capacity(16);
        let mut source = MemorySource::new();
        let (vertices, indices) = triangle();
        source.insert("cube.mod", encode(&vertices, &indices));
        (store, scene, source)
    }

    fn rigged_bytes() -> Vec<u8> {
        let vertices = vec![RiggedVertex {
            position: [0.0, 0.0, 0.0],
            normal: [0.0, 1.0, 0.0],
            bones: [0, 0, 0],
            weights: [1.0, 0.0, 0.0],
        }];
        encode(&vertices, &[0, 0, 0])
    }

    #[test]
    fn test_single_actor_round_trip() {
        let (mut store, mut scene, source) = setup();
        let text = "1\nMODEL cube\nPATH cube.mod\nACTOR cube\nPOSITION 1 2 3\nSCALE 2 2 2\n";

        let report = load_scene(text, &source, &mut store, &mut scene).unwrap();
        assert_eq!(report.version, 1);
        assert_eq!(report.models, 1);
        assert_eq!(report.actors, 1);
        assert_eq!(report.warnings, 0);

        assert_eq!(scene.len(), 1);
        let actor = &scene.actors()[0];
        assert_eq!(actor.position, [1.0, 2.0, 3.0]);
        assert_eq!(actor.scale, [2.0, 2.0, 2.0]);
        assert_eq!(actor.rotation, [0.0, 0.0, 0.0]);

        let key = actor.model.expect("actor should reference the cube");
        assert_eq!(store.catalog.find_model("cube"), Some(key));
        let model = store.catalog.model(key).unwrap();
        assert_eq!(model.vertex_offset, 0);
        assert_eq!(model.index_offset, 0);
        assert_eq!(model.index_count, 3);
        assert!(!model.flags.contains(ModelFlags::SKINNED));
    }

    #[test]
    fn test_unknown_model_reference_is_non_fatal() {
        let (mut store, mut scene, source) = setup();
        let text = "1\nACTOR unknown_model\nPOSITION 5 0 0\n";

        let report = load_scene(text, &source, &mut store, &mut scene).unwrap();
        assert_eq!(report.actors, 1);
        assert_eq!(report.warnings, 1);
        assert!(scene.actors()[0].model.is_none());
        assert_eq!(scene.actors()[0].position, [5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_scale_defaults_to_one() {
        let (mut store, mut scene, source) = setup();
        let text = "1\nMODEL cube\nPATH cube.mod\nACTOR cube\nPOSITION 1 2 3\n";

        load_scene(text, &source, &mut store, &mut scene).unwrap();
        assert_eq!(scene.actors()[0].scale, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_model_without_path_is_dropped() {
        let (mut store, mut scene, source) = setup();
        let text = "1\nMODEL ghost\nMODEL cube\nPATH cube.mod\n";

        let report = load_scene(text, &source, &mut store, &mut scene).unwrap();
        assert_eq!(report.models, 1);
        assert_eq!(report.dropped_models, 1);
        assert_eq!(report.warnings, 1);
        assert!(store.catalog.find_model("ghost").is_none());
        assert!(store.catalog.find_model("cube").is_some());
    }

    #[test]
    fn test_unknown_directive_is_fatal() {
        let (mut store, mut scene, source) = setup();
        let text = "1\nMODEL cube\nPATH cube.mod\nFROBNICATE yes\n";

        match load_scene(text, &source, &mut store, &mut scene) {
            Err(SceneError::UnknownDirective { line, word }) => {
                assert_eq!(line, 4);
                assert_eq!(word, "FROBNICATE");
            }
            other => panic!("expected unknown-directive error, got {other:?}"),
        }
    }

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        let (mut store, mut scene, source) = setup();
        let text = "1\n# a cube\n\nMODEL cube\nPATH cube.mod\n\n# done\nACTOR cube\n";

        let report = load_scene(text, &source, &mut store, &mut scene).unwrap();
        assert_eq!(report.models, 1);
        assert_eq!(report.actors, 1);
        assert_eq!(report.warnings, 0);
    }

    #[test]
    fn test_material_directive() {
        let (mut store, mut scene, source) = setup();
        let text = "1\nACTOR cube\nMATERIAL 7\nACTOR cube\nMATERIAL -3\n";

        let report = load_scene(text, &source, &mut store, &mut scene).unwrap();
        assert_eq!(scene.actors()[0].material, 7);
        assert_eq!(scene.actors()[1].material, 0); // negative id ignored
        assert!(report.warnings >= 1);
    }

    #[test]
    fn test_malformed_float_is_fatal() {
        let (mut store, mut scene, source) = setup();
        let text = "1\nACTOR cube\nPOSITION 1 two 3\n";

        match load_scene(text, &source, &mut store, &mut scene) {
            Err(SceneError::Directive { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected directive error, got {other:?}"),
        }
    }

    #[test]
    fn test_skeleton_block() {
        let (mut store, mut scene, source) = setup();
        let identity = "1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1";
        let text = format!("1\nSKELETON biped\nBONE root {identity}\nBONE spine {identity}\n");

        let report = load_scene(&text, &source, &mut store, &mut scene).unwrap();
        assert_eq!(report.skeletons, 1);

        let key = store.catalog.find_skeleton("biped").unwrap();
        let skeleton = store.catalog.skeleton(key).unwrap();
        assert_eq!(skeleton.bones.len(), 2);
        assert_eq!(skeleton.bones[0].name, "root");
        assert_relative_eq!(skeleton.bones[0].transform, Matrix4::identity());
    }

    #[test]
    fn test_skinned_model_uses_skinned_arenas() {
        let (mut store, mut scene, mut source) = setup();
        source.insert("hero.mod", rigged_bytes());
        let identity = "1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1";
        let text = format!(
            "1\nSKELETON biped\nBONE root {identity}\n\
             MODEL hero\nUSE_SKELETON biped\nPATH hero.mod\nACTOR hero\n"
        );

        let report = load_scene(&text, &source, &mut store, &mut scene).unwrap();
        assert_eq!(report.warnings, 0);

        let key = store.catalog.find_model("hero").unwrap();
        let model = store.catalog.model(key).unwrap();
        assert!(model.flags.contains(ModelFlags::SKINNED));
        assert!(model.skeleton.is_some());
        assert_eq!(store.catalog.vertex_count(VertexKind::Skinned), 1);
        assert_eq!(store.catalog.vertex_count(VertexKind::Static), 0);
    }

    #[test]
    fn test_missing_model_file_is_fatal() {
        let (mut store, mut scene, source) = setup();
        let text = "1\nMODEL cube\nPATH nope.mod\n";

        match load_scene(text, &source, &mut store, &mut scene) {
            Err(SceneError::ModelIo { line, path, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(path, "nope.mod");
            }
            other => panic!("expected model IO error, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_model_file_is_fatal() {
        let (mut store, mut scene, mut source) = setup();
        let (vertices, indices) = triangle();
        let mut bytes = encode(&vertices, &indices);
        bytes.truncate(10);
        source.insert("broken.mod", bytes);
        let text = "1\nMODEL broken\nPATH broken.mod\n";

        assert!(matches!(
            load_scene(text, &source, &mut store, &mut scene),
            Err(SceneError::ModelFormat { .. })
        ));
    }

    #[test]
    fn test_scene_capacity_overflow_is_fatal() {
        let (mut store, _, source) = setup();
        let mut scene = Scene::with_capacity(1);
        let text = "1\nACTOR cube\nACTOR cube\n";

        assert!(matches!(
            load_scene(text, &source, &mut store, &mut scene),
            Err(SceneError::SceneFull(_))
        ));
    }

    #[test]
    fn test_wrong_context_directives_warn_and_continue() {
        let (mut store, mut scene, source) = setup();
        let text = "1\nPOSITION 1 2 3\nMODEL cube\nMATERIAL 2\nPATH cube.mod\n";

        let report = load_scene(text, &source, &mut store, &mut scene).unwrap();
        assert_eq!(report.models, 1);
        assert_eq!(report.warnings, 2);
    }

    #[test]
    fn test_malformed_version_warns_and_records_zero() {
        let (mut store, mut scene, source) = setup();
        let text = "banana\nACTOR cube\n";

        let report = load_scene(text, &source, &mut store, &mut scene).unwrap();
        assert_eq!(report.version, 0);
        assert!(report.warnings >= 1);
    }

    #[test]
    fn test_scratch_arena_is_drained_after_load() {
        let (mut store, mut scene, source) = setup();
        let text = "1\nMODEL cube\nPATH cube.mod\n";

        load_scene(text, &source, &mut store, &mut scene).unwrap();
        assert_eq!(store.scratch.scope_depth(), 0);
        assert_eq!(store.scratch.used_bytes(), 0);
    }

    #[test]
    fn test_offsets_accumulate_across_models() {
        let (mut store, mut scene, mut source) = setup();
        let (vertices, indices) = triangle();
        source.insert("cube2.mod", encode(&vertices, &indices));
        let text = "1\nMODEL a\nPATH cube.mod\nMODEL b\nPATH cube2.mod\n";

        load_scene(text, &source, &mut store, &mut scene).unwrap();
        let b = store.catalog.model(store.catalog.find_model("b").unwrap()).unwrap();
        assert_eq!(b.vertex_offset, 3);
        assert_eq!(b.index_offset, 3);
    }

    #[test]
    fn test_load_scene_file_missing_is_fatal() {
        let mut store = AssetStore::default();
        let mut scene = Scene::with_capacity(4);
        assert!(matches!(
            load_scene_file(Path::new("/nonexistent/scene.txt"), &mut store, &mut scene),
            Err(SceneError::Io { .. })
        ));
    }
}
