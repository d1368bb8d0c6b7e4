//! The human-in-the-loop challenge seam.
//!
//! Mid-login, jAccount requires an image CAPTCHA.  The state machine only
//! needs a function from image bytes to a solution string; who provides it
//! (a CLI prompt, a UI callback, a pluggable solver service) is up to the
//! embedding binary.  Implementations may block indefinitely — the session
//! manager invokes them through `spawn_blocking`, never on the request path.

use std::path::Path;

pub trait ChallengeSolver: Send + Sync {
    /// Produce the text shown in the challenge image.
    ///
    /// `cached_at` is the path the image was written to, for channels that
    /// point a human at a file instead of rendering bytes.
    fn solve(&self, image: &[u8], cached_at: &Path) -> anyhow::Result<String>;
}

/// Solver for contexts with no interactive channel (the HTTP server).
/// Always fails; login is expected to happen out-of-band via the CLI.
pub struct NoInteractiveChannel;

impl ChallengeSolver for NoInteractiveChannel {
    fn solve(&self, _image: &[u8], _cached_at: &Path) -> anyhow::Result<String> {
        anyhow::bail!("no interactive challenge channel; run `campusgate login`")
    }
}
