//! Sessionの設定値。

use ash::vk;
use std::ffi::CString;

use crate::{FatalPolicy, SeverityFlags};

/// ライブラリ全体の動作を切り替えるフラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryFlag {
    /// instance作成時にdebug messengerを自動で作成する
    CreateInstanceDebugMessengers,
}
impl LibraryFlag {
    const fn bit(self) -> u32 {
        match self {
            Self::CreateInstanceDebugMessengers => 0x01,
        }
    }
}

/// `LibraryFlag`の集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LibraryFlags(u32);
impl LibraryFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, flag: LibraryFlag) -> Self {
        self.set(flag, true);
        self
    }

    pub fn set(&mut self, flag: LibraryFlag, value: bool) {
        if value {
            self.0 |= flag.bit();
        } else {
            self.0 &= !flag.bit();
        }
    }

    pub fn get(&self, flag: LibraryFlag) -> bool {
        self.0 & flag.bit() != 0
    }
}

/// instance作成時に渡すアプリケーションの情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationInfo {
    pub name: CString,
    pub version: u32,
    pub engine_name: CString,
    pub engine_version: u32,
    pub api_version: u32,
}
impl Default for ApplicationInfo {
    fn default() -> Self {
        Self {
            name: CString::default(),
            version: 0,
            engine_name: CString::default(),
            engine_version: 0,
            api_version: vk::API_VERSION_1_0,
        }
    }
}

/// nativeのdebug messengerが受け取るメッセージの種類
///
/// デフォルトは何も受け取らない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugMessageFilter {
    pub severities: vk::DebugUtilsMessageSeverityFlagsEXT,
    pub types: vk::DebugUtilsMessageTypeFlagsEXT,
}
impl DebugMessageFilter {
    /// WARNINGとERRORを全種類受け取る
    pub fn warnings_and_errors() -> Self {
        Self {
            severities: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            types: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
        }
    }
}

/// Session作成時の設定
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// 最初に有効になっているSeverity(デフォルトは空)
    pub severity_mask: SeverityFlags,
    pub fatal_policy: FatalPolicy,
    pub flags: LibraryFlags,
    pub application: ApplicationInfo,
    pub instance_debug_messages: DebugMessageFilter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_toggle() {
        let mut flags = LibraryFlags::empty();
        assert!(!flags.get(LibraryFlag::CreateInstanceDebugMessengers));
        flags.set(LibraryFlag::CreateInstanceDebugMessengers, true);
        assert!(flags.get(LibraryFlag::CreateInstanceDebugMessengers));
        flags.set(LibraryFlag::CreateInstanceDebugMessengers, false);
        assert_eq!(flags, LibraryFlags::empty());
    }

    #[test]
    fn default_config_is_silent() {
        let config = SessionConfig::default();
        assert!(config.severity_mask.is_empty());
        assert_eq!(config.fatal_policy, FatalPolicy::Terminate);
        assert!(config.instance_debug_messages.severities.is_empty());
    }
}
