//! Scene probe: loads a scene description and reports what the renderer
//! would receive — registered models, staged byte ranges and the draw queue
//! for one frame. Useful for checking exported scenes without a GPU.

use std::path::Path;
use std::process::ExitCode;

use forge_engine::prelude::*;

fn main() -> ExitCode {
    logging::init();

    let mut args = std::env::args().skip(1);
    let Some(scene_path) = args.next() else {
        eprintln!("usage: scene_probe <scene-file> [config.toml]");
        return ExitCode::FAILURE;
    };

    let config = match args.next() {
        Some(path) => match EngineConfig::load_from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                log::error!("failed to load config '{path}': {err}");
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    let mut store = AssetStore::new(&config);
    let mut scene = Scene::with_capacity(config.scene.max_actors);

    let report = match load_scene_file(Path::new(&scene_path), &mut store, &mut scene) {
        Ok(report) => report,
        Err(err) => {
            log::error!("scene load failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "scene v{}: {} models ({} dropped), {} actors, {} skeletons, {} warnings",
        report.version,
        report.models,
        report.dropped_models,
        report.actors,
        report.skeletons,
        report.warnings
    );
    for kind in [VertexKind::Static, VertexKind::Skinned] {
        let vertex_bytes: usize = store.catalog.vertex_chunks(kind).map(<[u8]>::len).sum();
        let index_bytes: usize = store.catalog.index_chunks(kind).map(<[u8]>::len).sum();
        log::info!(
            "{kind:?} geometry: {} vertices / {vertex_bytes} B, {} indices / {index_bytes} B",
            store.catalog.vertex_count(kind),
            store.catalog.index_count(kind)
        );
    }

    let mut queue = RenderQueue::new();
    queue.begin_frame();
    match build_draw_commands(&scene, &store.catalog, &mut queue) {
        Ok(queued) => log::info!("frame would submit {queued} draws"),
        Err(err) => {
            log::error!("{err}");
            return ExitCode::FAILURE;
        }
    }
    for command in queue.commands() {
        log::debug!("{command:?}");
    }
    queue.end_frame();

    ExitCode::SUCCESS
}
