//! layer / extensionが利用可能かをnative APIに問い合わせる。
//!
//! 結果はキャッシュしない。毎回native APIを呼ぶ。

use ash::{prelude::VkResult, vk};

use crate::{CapabilityName, DiagnosticChannel, Error, Native};

/// 利用可能かどうかの問い合わせ口
pub struct Oracle<'a, N: Native> {
    native: &'a N,
    diagnostics: &'a DiagnosticChannel,
}
impl<'a, N: Native> Oracle<'a, N> {
    pub fn new(native: &'a N, diagnostics: &'a DiagnosticChannel) -> Self {
        Self {
            native,
            diagnostics,
        }
    }

    pub fn diagnostics(&self) -> &'a DiagnosticChannel {
        self.diagnostics
    }

    pub fn is_layer_available(&self, name: &str) -> bool {
        let Some(name) = self.validate(name) else {
            return false;
        };
        self.contains("vkEnumerateInstanceLayerProperties", self.native.enumerate_layers(), &name)
    }

    /// `provider`が`None`なら実装本体(と暗黙のlayer)が提供するかを調べる
    pub fn is_extension_available(&self, name: &str, provider: Option<&str>) -> bool {
        let Some(name) = self.validate(name) else {
            return false;
        };
        let provider = match provider.map(|p| self.validate(p)) {
            Some(None) => return false,
            Some(Some(provider)) => Some(provider),
            None => None,
        };
        self.is_extension_name_available(&name, provider.as_ref())
    }

    pub fn is_device_extension_available(
        &self,
        physical_device: vk::PhysicalDevice,
        name: &str,
        provider: Option<&str>,
    ) -> bool {
        let Some(name) = self.validate(name) else {
            return false;
        };
        let provider = match provider.map(|p| self.validate(p)) {
            Some(None) => return false,
            Some(Some(provider)) => Some(provider),
            None => None,
        };
        self.is_device_extension_name_available(physical_device, &name, provider.as_ref())
    }

    pub(crate) fn is_extension_name_available(
        &self,
        name: &CapabilityName,
        provider: Option<&CapabilityName>,
    ) -> bool {
        self.contains(
            "vkEnumerateInstanceExtensionProperties",
            self.native.enumerate_extensions(provider),
            name,
        )
    }

    pub(crate) fn is_device_extension_name_available(
        &self,
        physical_device: vk::PhysicalDevice,
        name: &CapabilityName,
        provider: Option<&CapabilityName>,
    ) -> bool {
        self.contains(
            "vkEnumerateDeviceExtensionProperties",
            self.native
                .enumerate_device_extensions(physical_device, provider),
            name,
        )
    }

    fn validate(&self, name: &str) -> Option<CapabilityName> {
        CapabilityName::new(name)
            .map_err(|error| self.diagnostics.raise(error))
            .ok()
    }

    fn contains(
        &self,
        call: &'static str,
        available: VkResult<Vec<CapabilityName>>,
        name: &CapabilityName,
    ) -> bool {
        match available {
            Ok(available) => available.contains(name),
            Err(result) => {
                self.diagnostics
                    .raise(Error::NativeCallFailed { call, result });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{native::mock::MockNative, FatalPolicy, Severity, SeverityFlags};
    use std::{cell::RefCell, rc::Rc};

    fn channel() -> (DiagnosticChannel, Rc<RefCell<Vec<(Severity, u32)>>>) {
        let channel = DiagnosticChannel::new(SeverityFlags::ALL, FatalPolicy::Propagate);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        channel.set_sink(
            Some(Box::new(move |d, _| {
                log.borrow_mut().push((d.severity(), d.code()))
            })),
            None,
        );
        (channel, seen)
    }

    #[test]
    fn core_and_layer_provided_extensions() {
        let native = MockNative::new()
            .with_layer("VK_LAYER_test", &["VK_EXT_layered"])
            .with_core_extensions(&["VK_KHR_surface"]);
        let (channel, seen) = channel();
        let oracle = Oracle::new(&native, &channel);

        assert!(oracle.is_layer_available("VK_LAYER_test"));
        assert!(!oracle.is_layer_available("VK_LAYER_missing"));
        assert!(oracle.is_extension_available("VK_KHR_surface", None));
        assert!(!oracle.is_extension_available("VK_EXT_layered", None));
        assert!(oracle.is_extension_available("VK_EXT_layered", Some("VK_LAYER_test")));
        assert!(!oracle.is_extension_available("VK_KHR_surface", Some("VK_LAYER_test")));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn failed_queries_report_and_return_false() {
        let mut native = MockNative::new().with_layer("VK_LAYER_test", &[]);
        native.fail_queries = true;
        let (channel, seen) = channel();
        let oracle = Oracle::new(&native, &channel);

        assert!(!oracle.is_layer_available("VK_LAYER_test"));
        assert_eq!(seen.borrow().as_slice(), &[(Severity::Error, 0x05)]);
    }

    #[test]
    fn null_names_report_and_return_false() {
        let native = MockNative::new();
        let (channel, seen) = channel();
        let oracle = Oracle::new(&native, &channel);

        assert!(!oracle.is_layer_available(""));
        assert!(!oracle.is_extension_available("", None));
        assert!(!oracle.is_extension_available("VK_KHR_surface", Some("")));
        assert_eq!(
            seen.borrow().as_slice(),
            &[
                (Severity::Error, 0x01),
                (Severity::Error, 0x01),
                (Severity::Error, 0x01)
            ]
        );
    }
}
