//! Animated GIF assembly from saved policy snapshots

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use gif::{Encoder, Frame, Repeat};

use crate::error::DiagnosticsError;

/// Delay between frames in centiseconds
pub const FRAME_DELAY: u16 = 20;

/// PNG frames in `dir` named `<prefix>_*.png`, sorted by file name
pub fn frame_paths(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, DiagnosticsError> {
    let stem = format!("{prefix}_");
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(&stem) && name.ends_with(".png"));
        if matches {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Combine the frames of one run into `<dir>/<prefix>.gif`
///
/// Frames are played in file-name order and the animation loops forever.
/// Returns `None` when there are no frames.
pub fn make_gif(
    dir: &Path,
    prefix: &str,
    delete_images_after: bool,
) -> Result<Option<PathBuf>, DiagnosticsError> {
    let paths = frame_paths(dir, prefix)?;
    let Some(first) = paths.first() else {
        return Ok(None);
    };

    let (width, height) = image::image_dimensions(first)?;
    let (Ok(gif_width), Ok(gif_height)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(DiagnosticsError::TooLarge { width, height });
    };

    let gif_path = dir.join(format!("{prefix}.gif"));
    let writer = BufWriter::new(File::create(&gif_path)?);
    let mut encoder = Encoder::new(writer, gif_width, gif_height, &[])?;
    encoder.set_repeat(Repeat::Infinite)?;

    for path in &paths {
        let mut rgba = image::open(path)?.to_rgba8();
        if rgba.dimensions() != (width, height) {
            return Err(DiagnosticsError::FrameSize {
                path: path.clone(),
                expected: (width, height),
                got: rgba.dimensions(),
            });
        }
        let mut frame = Frame::from_rgba_speed(gif_width, gif_height, &mut rgba, 10);
        frame.delay = FRAME_DELAY;
        encoder.write_frame(&frame)?;
    }
    encoder.into_inner()?;

    if delete_images_after {
        for path in &paths {
            std::fs::remove_file(path)?;
        }
    }

    tracing::info!(frames = paths.len(), path = ?gif_path, "Wrote policy animation");
    Ok(Some(gif_path))
}
