//! Registryのキーとして使うハンドルの識別子を定義する。

use ash::vk::{self, Handle};
use std::fmt;

/// Registryが管理するリソースの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Instance,
    Device,
    DebugMessenger,
}

/// 種類と生のハンドル値の組
///
/// 種類が違えば同じ値でも別のキーとして扱う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleKey {
    kind: ResourceKind,
    raw: u64,
}
impl HandleKey {
    pub const fn new(kind: ResourceKind, raw: u64) -> Self {
        Self { kind, raw }
    }

    pub fn of<H: Tracked>(handle: H) -> Self {
        Self::new(H::KIND, handle.as_raw())
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn is_null(&self) -> bool {
        self.raw == 0
    }

    /// `H`の種類のキーであれば、そのハンドルに戻す
    pub fn to_handle<H: Tracked>(&self) -> Option<H> {
        (self.kind == H::KIND).then(|| H::from_raw(self.raw))
    }
}
impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:x})", self.kind, self.raw)
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for ash::vk::Instance {}
    impl Sealed for ash::vk::Device {}
    impl Sealed for ash::vk::DebugUtilsMessengerEXT {}
}

/// Registryで追跡できるハンドルの型
pub trait Tracked: Handle + Copy + sealed::Sealed {
    const KIND: ResourceKind;
}
impl Tracked for vk::Instance {
    const KIND: ResourceKind = ResourceKind::Instance;
}
impl Tracked for vk::Device {
    const KIND: ResourceKind = ResourceKind::Device;
}
impl Tracked for vk::DebugUtilsMessengerEXT {
    const KIND: ResourceKind = ResourceKind::DebugMessenger;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_carry_their_kind() {
        let instance = HandleKey::of(vk::Instance::from_raw(7));
        let device = HandleKey::of(vk::Device::from_raw(7));
        assert_ne!(instance, device);
        assert_eq!(instance.to_handle::<vk::Instance>(), Some(vk::Instance::from_raw(7)));
        assert_eq!(instance.to_handle::<vk::Device>(), None);
        assert!(HandleKey::of(vk::Instance::null()).is_null());
    }
}
