//! Paged retrieval of the remote activity log.

mod transport;
mod windowed;

pub use transport::{log_page_url, parse_page, HttpTransport, Transport};
pub use windowed::{plan_windows, FetchOptions, TimeWindow, WindowedFetcher};
