//! # ashledger
//! Vulkanのinstance / deviceの作成を簡単にするための薄いレイヤー。
//!
//! 要求されたlayer / extensionを溜めて、作成時に実際に使えるものだけに絞り込み、
//! 作成したハンドルと有効になったものをRegistryに記録する。
//! 記録したハンドルは依存関係の順に破棄する。
//! 途中の出来事はすべてSeverity付きの診断メッセージとして流れる。

mod accumulator;
pub use accumulator::*;
mod capability;
pub use capability::*;
mod config;
pub use config::*;
mod diagnostic;
pub use diagnostic::*;
mod error;
pub use error::*;
mod handle;
pub use handle::*;
pub mod list;
mod native;
pub use native::*;
mod oracle;
pub use oracle::*;
mod registry;
pub use registry::*;
mod resolver;
pub use resolver::*;
mod session;
pub use session::*;
pub mod utils;
