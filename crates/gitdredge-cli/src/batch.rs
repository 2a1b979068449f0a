use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use url::Url;

use gitdredge_dump::expand_input;

/// Read a batch file: one URL or bare domain per line. Bare domains expand
/// to both scheme variants; invalid lines are counted and logged, never
/// fatal.
pub(crate) fn read_batch(path: &Path) -> Result<Vec<Url>> {
    let text = fs_err::read_to_string(path)
        .with_context(|| format!("failed to read batch file {}", path.display()))?;

    let mut urls = Vec::new();
    let (mut with_scheme, mut without_scheme, mut invalid) = (0usize, 0usize, 0usize);
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match expand_input(line) {
            Ok(expanded) => {
                if line.contains("://") {
                    with_scheme += 1;
                } else {
                    without_scheme += 1;
                }
                debug!("queued <{line}>");
                urls.extend(expanded);
            }
            Err(err) => {
                invalid += 1;
                warn!("invalid url [{line}]: {err}");
            }
        }
    }

    info!(
        "batch file <{}>: {invalid} invalid | {with_scheme} / {without_scheme} valid with/without scheme | {} in summary",
        path.display(),
        with_scheme + without_scheme + invalid,
    );
    Ok(urls)
}
