use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An invalid URL was provided.
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    /// A generic request error happened while making a request. Refer to the
    /// error message for more details.
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// A generic request middleware error happened while making a request.
    /// Refer to the error message for more details.
    #[error(transparent)]
    Middleware(#[from] reqwest_middleware::Error),

    /// The response body exceeded the per-request size cap, either by its
    /// declared `Content-Length` or during the streamed read.
    #[error("response body is {size} bytes, over the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    /// The request was interrupted by the process-wide cancellation token.
    #[error("the fetch was canceled")]
    Canceled,
}
