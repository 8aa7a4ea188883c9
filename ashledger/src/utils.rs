//! # Utility functions and structs
//! Sessionの上に組み立てた、あると便利なセットアップ用の関数たち。

mod setup;
pub use setup::*;
