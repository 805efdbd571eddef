//! Cloud client: configuration, HTTP transport with the packet timeout
//! ladder, file-service calls and the [`CloudClient`] facade that drives
//! uploads from the host's update loop.

pub mod client;
pub mod config;
pub mod error;
pub mod file_service;
pub mod http;

pub use client::CloudClient;
pub use config::{ClientConfig, UploadConfig};
pub use error::ClientError;
pub use file_service::FileService;
pub use http::HttpTransport;
