//! ライブラリ全体で使うエラー型を定義する。
//!
//! 各バリアントは固定のコードと名前を持ち、Diagnostic Channelへ流すときの
//! Severityもここで決まる。

use ash::vk;
use thiserror::Error;

use crate::{HandleKey, Severity};

/// ashledgerの操作が返すエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// 必須の引数(名前やハンドル)が空だった
    #[error("required argument `{0}` was empty or null")]
    NullArgument(&'static str),

    /// 要求したlayer / extensionが見つからなかった
    #[error("`{0}` was not found")]
    NotFound(String),

    /// 同じハンドルがすでにRegistryに登録されている
    #[error("{0} is already registered")]
    AlreadyRegistered(HandleKey),

    /// Registryを通して作られていないハンドルが渡された
    #[error("{0} was not created through this registry")]
    InvalidObject(HandleKey),

    /// native APIが失敗を返した
    #[error("native call `{call}` failed: {result}")]
    NativeCallFailed {
        call: &'static str,
        result: vk::Result,
    },

    /// リストやRegistryの拡張に失敗した
    #[error("memory exhausted while growing internal storage")]
    MemoryExhausted,

    /// 初期化されていない(もしくはteardown済みの)Sessionで作成系の操作をした
    #[error("session is not initialized")]
    NotInitialized,

    /// ハンドルで有効になっていないextensionを前提とする操作をした
    #[error("extension `{0}` is not enabled")]
    ExtensionNotEnabled(String),
}

impl Error {
    /// 診断メッセージに載せる数値コード
    ///
    /// 0x03はnativeのdebug messengerから中継したメッセージ用に予約している。
    pub fn code(&self) -> u32 {
        match self {
            Self::NullArgument(_) => 0x01,
            Self::NotInitialized => 0x02,
            Self::InvalidObject(_) => 0x04,
            Self::NativeCallFailed { .. } => 0x05,
            Self::AlreadyRegistered(_) => 0x06,
            Self::NotFound(_) => 0x07,
            Self::ExtensionNotEnabled(_) => 0x08,
            Self::MemoryExhausted => 0x10,
        }
    }

    /// 診断メッセージに載せる名前
    pub fn name(&self) -> &'static str {
        match self {
            Self::NullArgument(_) => "ERR_NULL_ARGUMENT",
            Self::NotFound(_) => "ERR_NOT_FOUND",
            Self::AlreadyRegistered(_) => "ERR_ALREADY_REGISTERED",
            Self::InvalidObject(_) => "ERR_INVALID_OBJECT",
            Self::NativeCallFailed { .. } => "ERR_NATIVE_CALL_FAILED",
            Self::MemoryExhausted => "FERR_MEMORY_ERROR",
            Self::NotInitialized => "ERR_NOT_INIT",
            Self::ExtensionNotEnabled(_) => "ERR_EXT_NOT_ENABLED",
        }
    }

    /// このエラーを報告するときのSeverity
    pub fn severity(&self) -> Severity {
        match self {
            Self::NotFound(_) => Severity::Warning,
            Self::MemoryExhausted => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// エラーの種類ごとの短い説明
    pub fn describe(&self) -> &'static str {
        match self {
            Self::NullArgument(_) => "function received an empty argument in place of a required one",
            Self::NotFound(_) => "requested layer or extension could not be validated",
            Self::AlreadyRegistered(_) => "handle is already managed by this registry",
            Self::InvalidObject(_) => "invalid object or not created through this library",
            Self::NativeCallFailed { .. } => "native API call returned a failure status",
            Self::MemoryExhausted => "native memory error",
            Self::NotInitialized => "initialize the session before calling this function",
            Self::ExtensionNotEnabled(_) => "required extension was not enabled on the handle",
        }
    }
}

/// ashledgerの標準のResult型
pub type Result<T, E = Error> = std::result::Result<T, E>;
