use std::fmt::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use rustc_hash::FxHashSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use gitdredge_client::FetchClient;
use gitdredge_dump::{normalize_base, parse_url_or_domain, DumpSettings, Repo};

use crate::batch;
use crate::commands::{ExitStatus, REPO_THREADS};
use crate::printer::Printer;

/// Dump one repository, or a batch of them with a small pool of repo
/// workers. Per-path errors never abort a crawl, but any recorded error
/// makes the exit status non-zero.
pub(crate) async fn fetch(
    url: Option<&str>,
    file: Option<&Path>,
    timeout: u64,
    update: bool,
    cancel: &CancellationToken,
    mut printer: Printer,
) -> Result<ExitStatus> {
    let targets: Vec<Url> = match (url, file) {
        (Some(url), None) => vec![parse_url_or_domain(url)?],
        (None, Some(file)) => batch::read_batch(file)?,
        _ => unreachable!("clap enforces exactly one of url and --file"),
    };

    // The same repository can be listed twice (or reached via both schemes);
    // each base is dumped at most once.
    let mut seen = FxHashSet::default();
    let targets: Vec<Url> = targets
        .into_iter()
        .map(|url| normalize_base(&url))
        .filter(|base| seen.insert(base.clone()))
        .collect();

    let settings = DumpSettings {
        timeout,
        update,
        ..DumpSettings::default()
    };
    info!(
        "downloading into [{}], timeout {} seconds{}",
        settings.download_dir.display(),
        settings.timeout,
        if settings.update {
            ", updating existing dumps"
        } else {
            ""
        },
    );

    let client = FetchClient::builder()
        .connect_timeout(Duration::from_secs(timeout))
        .build();
    let workers = if targets.len() > 1 { REPO_THREADS } else { 1 };

    let results: Vec<_> = futures::stream::iter(targets)
        .map(|base| {
            let settings = settings.clone();
            let client = client.clone();
            let cancel = cancel.clone();
            async move { Repo::new(settings, client, cancel, &base)?.run().await }
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    let mut recorded = 0;
    for result in results {
        match result {
            Ok(report) => {
                recorded += report.errors.len();
                writeln!(
                    printer,
                    "{} -> {} ({} fetched, {} saved, {} errors)",
                    report.base,
                    report.dir.display(),
                    report.fetched,
                    report.saved,
                    report.errors.len(),
                )?;
            }
            Err(err) => {
                recorded += 1;
                warn!("{err}");
            }
        }
    }

    Ok(if recorded == 0 {
        ExitStatus::Success
    } else {
        ExitStatus::Failure
    })
}
