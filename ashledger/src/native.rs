//! native APIとの境界。
//!
//! Sessionはこのtraitを通してしかVulkanを呼ばない。

use ash::{prelude::VkResult, vk};

use crate::{ApplicationInfo, CapabilityName, DebugMessageFilter, DiagnosticChannel};

mod ash_native;
pub use ash_native::*;
#[cfg(test)]
pub(crate) mod mock;

/// debug messengerの作成に必要な情報
///
/// 中継先の`channel`はmessengerが破棄されるまで生きている必要がある。
#[derive(Clone, Copy)]
pub struct MessengerDesc<'a> {
    pub filter: DebugMessageFilter,
    pub channel: &'a DiagnosticChannel,
}

/// instanceの作成に必要な情報
#[derive(Clone, Copy)]
pub struct InstanceDesc<'a> {
    pub application: &'a ApplicationInfo,
    pub layers: &'a [CapabilityName],
    pub extensions: &'a [CapabilityName],
    /// 指定するとinstanceの作成と破棄の間のメッセージも中継する
    pub chained_messenger: Option<MessengerDesc<'a>>,
}

/// logical deviceの作成に必要な情報のうち、extension以外のもの
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceDesc<'a> {
    pub queue_create_infos: &'a [vk::DeviceQueueCreateInfo],
    pub enabled_features: Option<&'a vk::PhysicalDeviceFeatures>,
}

/// 動的にロードしたdebug messengerの破棄関数
pub type MessengerDestroyer = Box<dyn Fn(vk::Instance, vk::DebugUtilsMessengerEXT)>;

/// native APIの呼び出し口
pub trait Native {
    /// 利用可能なinstance layerの一覧
    fn enumerate_layers(&self) -> VkResult<Vec<CapabilityName>>;

    /// 利用可能なinstance extensionの一覧
    ///
    /// `provider`が`None`なら実装本体と暗黙のlayerが提供するもの、
    /// `Some`ならそのlayerが提供するもの。
    fn enumerate_extensions(
        &self,
        provider: Option<&CapabilityName>,
    ) -> VkResult<Vec<CapabilityName>>;

    /// physical deviceが提供するdevice extensionの一覧
    fn enumerate_device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
        provider: Option<&CapabilityName>,
    ) -> VkResult<Vec<CapabilityName>>;

    fn create_instance(&mut self, desc: &InstanceDesc<'_>) -> VkResult<vk::Instance>;

    fn destroy_instance(&mut self, instance: vk::Instance);

    fn create_device(
        &mut self,
        instance: vk::Instance,
        physical_device: vk::PhysicalDevice,
        desc: &DeviceDesc<'_>,
        extensions: &[CapabilityName],
    ) -> VkResult<vk::Device>;

    fn destroy_device(&mut self, device: vk::Device);

    fn create_debug_messenger(
        &mut self,
        instance: vk::Instance,
        desc: &MessengerDesc<'_>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT>;

    /// 生きている`instance`から`vkDestroyDebugUtilsMessengerEXT`をロードする
    fn load_messenger_destroyer(&self, instance: vk::Instance) -> Option<MessengerDestroyer>;

    fn enumerate_physical_devices(
        &mut self,
        instance: vk::Instance,
    ) -> VkResult<Vec<vk::PhysicalDevice>>;

    fn enumerate_queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>>;

    fn physical_device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceProperties>;
}
