use std::sync::Arc;

use anyhow::{Context, Result};
use campus_grid::grid::GridContext;
use campus_grid::media::HeaderProbe;
use campus_grid::{AppPaths, Library};
use tracing::{info, warn};

/// Window width used to report grid shape at launch.
const LAUNCH_WINDOW_WIDTH: i32 = 1280;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("campus_grid=info".parse()?),
        )
        .init();

    let paths = AppPaths::from_project_dirs()?;
    let library = Library::open(paths, Arc::new(HeaderProbe))
        .context("Failed to open the catalog")?;

    let stats = library.store().get_stats()?;
    info!(
        campuses = stats.campus_count,
        images = stats.image_count,
        videos = stats.video_count,
        db_size_bytes = stats.db_size_bytes,
        "Catalog ready at {:?}",
        library.paths().data_dir()
    );

    for campus in library.list_campuses()? {
        let session =
            match library.open_grid(campus.id, LAUNCH_WINDOW_WIDTH, GridContext::default()) {
                Ok(session) => session,
                Err(e) => {
                    warn!(campus_id = campus.id, "Could not load grid: {}", e);
                    continue;
                }
            };

        let cells = session.cells();
        let occupied = cells.iter().filter(|c| c.record_id().is_some()).count();
        info!(
            id = campus.id,
            name = %campus.name,
            kind = %campus.kind,
            columns = session.columns(),
            rows = session.state().rows(),
            occupied,
            free_image_slots = session.state().empty_positions().len(),
            displaced = session.state().collisions().len(),
            "Campus grid"
        );
    }

    Ok(())
}
