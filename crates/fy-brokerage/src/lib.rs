//! # fy-brokerage
//!
//! The Fyers brokerage adapter as the host sees it: the [`Brokerage`] facade,
//! the connection supervisor that keeps both broker channels alive, and the
//! chunked history downloader.

pub mod brokerage;
pub mod history;
pub mod supervisor;

pub use brokerage::{Brokerage, FyersBrokerage};
pub use history::{DataType, HistoryDownloader, HistoryRequest};
pub use supervisor::{ConnectionSupervisor, SupervisedChannel, backoff_delay};
