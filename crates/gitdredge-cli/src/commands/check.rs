use std::fmt::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use gitdredge_client::FetchClient;
use gitdredge_dump::{expand_input, normalize_base, probe};

use crate::batch;
use crate::commands::{ExitStatus, PROBE_THREADS};
use crate::printer::Printer;

/// Probe one URL (or every URL in a batch file) for an exposed repository.
/// Hits go to stdout so the output can be piped into `fetch --file`.
pub(crate) async fn check(
    url: Option<&str>,
    file: Option<&Path>,
    timeout: u64,
    cancel: &CancellationToken,
    mut printer: Printer,
) -> Result<ExitStatus> {
    let targets: Vec<Url> = match (url, file) {
        (Some(url), None) => expand_input(url)?,
        (None, Some(file)) => batch::read_batch(file)?,
        _ => unreachable!("clap enforces exactly one of url and --file"),
    };

    let client = FetchClient::builder()
        .connect_timeout(Duration::from_secs(timeout))
        .build();

    let results: Vec<Option<(Url, usize)>> = futures::stream::iter(targets)
        .map(|url| {
            let client = client.clone();
            let cancel = cancel.clone();
            async move {
                let base = normalize_base(&url);
                match probe(&client, &cancel, &base).await {
                    Ok(report) => Some((report.base, report.entries)),
                    Err(err) => {
                        warn!("{err}");
                        None
                    }
                }
            }
        })
        .buffer_unordered(PROBE_THREADS)
        .collect()
        .await;

    let mut failures = 0;
    for result in &results {
        match result {
            Some((base, entries)) => writeln!(printer, "{base}\tOK, files: {entries}")?,
            None => failures += 1,
        }
    }

    Ok(if failures == 0 {
        ExitStatus::Success
    } else {
        ExitStatus::Failure
    })
}
