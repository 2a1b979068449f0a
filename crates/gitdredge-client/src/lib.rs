pub use client::{FetchClient, FetchClientBuilder, Fetched, MAX_BODY_BYTES};
pub use error::Error;

mod client;
mod error;
mod useragent;
