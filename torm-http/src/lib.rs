//! HTTP transport for torm.
//!
//! This crate provides a `reqwest`-based implementation of the `Transport` trait, speaking the
//! ToonStore server's JSON API.
//!
//! To use this transport, keep the default `http` feature enabled in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! torm = { version = "x.y.z", features = ["http"] }
//! ```
//!
//! # Configuration
//!
//! The builder takes a base URL (default `http://localhost:3001`), a per-request timeout
//! (default 5 seconds) and a user agent. [`HttpTransportBuilder::from_env`] reads the first two
//! from `TORM_URL` and `TORM_TIMEOUT_SECS`.
//!
//! # Example
//!
//! ```ignore
//! use torm::{http::HttpTransport, transport::TransportBuilder, client::TormClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = HttpTransport::builder().base_url("http://localhost:3001").build().await?;
//!     let client = TormClient::new(transport);
//!     println!("{:?}", client.health().await?);
//!
//!     Ok(())
//! }
//! ```

pub mod transport;
mod wire;

pub use transport::{HttpTransport, HttpTransportBuilder};
