use tokio_util::sync::CancellationToken;
use url::Url;

use gitdredge_client::FetchClient;
use gitdredge_index::Index;

use crate::error::DumpError;
use crate::paths::PATH_INDEX;
use crate::urls::item_url;

/// What a successful probe learned about a remote repository.
#[derive(Debug)]
pub struct ProbeReport {
    pub base: Url,
    /// Files tracked by the remote index.
    pub entries: usize,
}

/// Fetch `<base>/index` and decide whether a dumpable repository lives
/// there. `base` must already be normalized to end in `/.git`.
pub async fn probe(
    client: &FetchClient,
    cancel: &CancellationToken,
    base: &Url,
) -> Result<ProbeReport, DumpError> {
    let url = item_url(base, PATH_INDEX)?;
    let fetched = client.get(url, cancel).await?;
    if fetched.status.as_u16() != 200 || !gitdredge_index::is_index(&fetched.body) {
        return Err(DumpError::NotARepository(base.clone()));
    }
    let index = Index::decode(&fetched.body)?;
    Ok(ProbeReport {
        base: base.clone(),
        entries: index.entries.len(),
    })
}
