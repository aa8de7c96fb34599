//! HTTP transport to the storefront backend

mod api;
mod http_client;
mod upload;

pub use api::{Ack, ApiClient, Body};
pub use http_client::backend_client;
pub use upload::Upload;
