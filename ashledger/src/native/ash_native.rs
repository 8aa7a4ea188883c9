//! ashを使った`Native`の実装。

use anyhow::Result;
use ash::{extensions::ext::DebugUtils, prelude::VkResult, vk};
use std::{
    collections::HashMap,
    ffi::c_void,
    os::raw::c_char,
    ptr,
};

use super::{DeviceDesc, InstanceDesc, MessengerDesc, MessengerDestroyer, Native};
use crate::{capability::as_ptrs, diagnostic::native_debug_relay, CapabilityName};

const DESTROY_MESSENGER_NAME: &[u8] = b"vkDestroyDebugUtilsMessengerEXT\0";

fn messenger_create_info(desc: &MessengerDesc<'_>) -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .flags(vk::DebugUtilsMessengerCreateFlagsEXT::empty())
        .message_severity(desc.filter.severities)
        .message_type(desc.filter.types)
        .pfn_user_callback(Some(native_debug_relay))
        .user_data(desc.channel as *const _ as *mut c_void)
        .build()
}

fn names(properties: impl IntoIterator<Item = [c_char; vk::MAX_EXTENSION_NAME_SIZE]>) -> Vec<CapabilityName> {
    properties
        .into_iter()
        .filter_map(|raw| CapabilityName::from_fixed(&raw))
        .collect()
}

/// Vulkanのローダーを直接呼ぶ`Native`
///
/// 作成したinstance / deviceの関数テーブルはハンドルごとに保持する。
pub struct AshNative {
    entry: ash::Entry,
    instances: HashMap<vk::Instance, ash::Instance>,
    devices: HashMap<vk::Device, ash::Device>,
    // physical deviceがどのinstanceから列挙されたか
    physical_devices: HashMap<vk::PhysicalDevice, vk::Instance>,
}
impl AshNative {
    /// Vulkanのローダーをロードする
    pub fn load() -> Result<Self> {
        let entry = unsafe { ash::Entry::load()? };
        Ok(Self {
            entry,
            instances: HashMap::new(),
            devices: HashMap::new(),
            physical_devices: HashMap::new(),
        })
    }

    /// 作成済みinstanceのash::Instance
    pub fn instance(&self, instance: vk::Instance) -> Option<&ash::Instance> {
        self.instances.get(&instance)
    }

    /// 作成済みdeviceのash::Device
    pub fn device(&self, device: vk::Device) -> Option<&ash::Device> {
        self.devices.get(&device)
    }

    fn owner_of(&self, physical_device: vk::PhysicalDevice) -> VkResult<&ash::Instance> {
        self.physical_devices
            .get(&physical_device)
            .and_then(|instance| self.instances.get(instance))
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }
}

impl Native for AshNative {
    fn enumerate_layers(&self) -> VkResult<Vec<CapabilityName>> {
        let layers = self.entry.enumerate_instance_layer_properties()?;
        Ok(names(layers.into_iter().map(|l| l.layer_name)))
    }

    fn enumerate_extensions(
        &self,
        provider: Option<&CapabilityName>,
    ) -> VkResult<Vec<CapabilityName>> {
        let extensions = self
            .entry
            .enumerate_instance_extension_properties(provider.map(CapabilityName::as_c_str))?;
        Ok(names(extensions.into_iter().map(|e| e.extension_name)))
    }

    fn enumerate_device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
        provider: Option<&CapabilityName>,
    ) -> VkResult<Vec<CapabilityName>> {
        let instance = self.owner_of(physical_device)?;
        let layer_name = provider.map_or(ptr::null(), CapabilityName::as_ptr);
        let enumerate = instance.fp_v1_0().enumerate_device_extension_properties;

        // ashのラッパーはlayer名を受け取らないので関数ポインタを直接呼ぶ
        let properties = loop {
            let mut count = 0;
            unsafe { enumerate(physical_device, layer_name, &mut count, ptr::null_mut()) }
                .result()?;
            let mut properties = Vec::with_capacity(count as usize);
            let result = unsafe {
                enumerate(
                    physical_device,
                    layer_name,
                    &mut count,
                    properties.as_mut_ptr(),
                )
            };
            if result != vk::Result::INCOMPLETE {
                result.result()?;
                unsafe { properties.set_len(count as usize) };
                break properties;
            }
        };
        Ok(names(properties.into_iter().map(|e: vk::ExtensionProperties| e.extension_name)))
    }

    fn create_instance(&mut self, desc: &InstanceDesc<'_>) -> VkResult<vk::Instance> {
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&desc.application.name)
            .application_version(desc.application.version)
            .engine_name(&desc.application.engine_name)
            .engine_version(desc.application.engine_version)
            .api_version(desc.application.api_version);
        let layer_names = as_ptrs(desc.layers);
        let extension_names = as_ptrs(desc.extensions);
        let mut debug_utils_messenger_create_info =
            desc.chained_messenger.as_ref().map(messenger_create_info);

        let instance_create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);
        let instance_create_info = match debug_utils_messenger_create_info.as_mut() {
            Some(info) => instance_create_info.push_next(info),
            None => instance_create_info,
        };
        let instance = unsafe { self.entry.create_instance(&instance_create_info, None)? };
        let handle = instance.handle();
        tracing::debug!(?handle, "vkCreateInstance");
        self.instances.insert(handle, instance);
        Ok(handle)
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        if let Some(loaded) = self.instances.remove(&instance) {
            self.physical_devices.retain(|_, owner| *owner != instance);
            unsafe { loaded.destroy_instance(None) };
            tracing::debug!(handle = ?instance, "vkDestroyInstance");
        }
    }

    fn create_device(
        &mut self,
        instance: vk::Instance,
        physical_device: vk::PhysicalDevice,
        desc: &DeviceDesc<'_>,
        extensions: &[CapabilityName],
    ) -> VkResult<vk::Device> {
        let loaded = self
            .instances
            .get(&instance)
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        let extension_names = as_ptrs(extensions);
        let device_create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(desc.queue_create_infos)
            .enabled_extension_names(&extension_names);
        let device_create_info = match desc.enabled_features {
            Some(features) => device_create_info.enabled_features(features),
            None => device_create_info,
        };
        let device = unsafe { loaded.create_device(physical_device, &device_create_info, None)? };
        let handle = device.handle();
        tracing::debug!(?handle, "vkCreateDevice");
        self.devices.insert(handle, device);
        Ok(handle)
    }

    fn destroy_device(&mut self, device: vk::Device) {
        if let Some(loaded) = self.devices.remove(&device) {
            unsafe {
                // 破棄前に全ての処理の完了を待つ
                let _ = loaded.device_wait_idle();
                loaded.destroy_device(None);
            }
            tracing::debug!(handle = ?device, "vkDestroyDevice");
        }
    }

    fn create_debug_messenger(
        &mut self,
        instance: vk::Instance,
        desc: &MessengerDesc<'_>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        let loaded = self
            .instances
            .get(&instance)
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        let debug_utils_loader = DebugUtils::new(&self.entry, loaded);
        let create_info = messenger_create_info(desc);
        let messenger =
            unsafe { debug_utils_loader.create_debug_utils_messenger(&create_info, None)? };
        tracing::debug!(?messenger, "vkCreateDebugUtilsMessengerEXT");
        Ok(messenger)
    }

    fn load_messenger_destroyer(&self, instance: vk::Instance) -> Option<MessengerDestroyer> {
        if !self.instances.contains_key(&instance) {
            return None;
        }
        let function = unsafe {
            self.entry
                .get_instance_proc_addr(instance, DESTROY_MESSENGER_NAME.as_ptr() as *const c_char)
        }?;
        let destroy: vk::PFN_vkDestroyDebugUtilsMessengerEXT =
            unsafe { std::mem::transmute(function) };
        Some(Box::new(move |instance, messenger| {
            unsafe { destroy(instance, messenger, ptr::null()) };
            tracing::debug!(?messenger, "vkDestroyDebugUtilsMessengerEXT");
        }))
    }

    fn enumerate_physical_devices(
        &mut self,
        instance: vk::Instance,
    ) -> VkResult<Vec<vk::PhysicalDevice>> {
        let loaded = self
            .instances
            .get(&instance)
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        let physical_devices = unsafe { loaded.enumerate_physical_devices()? };
        for physical_device in physical_devices.iter() {
            self.physical_devices.insert(*physical_device, instance);
        }
        Ok(physical_devices)
    }

    fn enumerate_queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>> {
        let instance = self.owner_of(physical_device)?;
        Ok(unsafe { instance.get_physical_device_queue_family_properties(physical_device) })
    }

    fn physical_device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceProperties> {
        let instance = self.owner_of(physical_device)?;
        Ok(unsafe { instance.get_physical_device_properties(physical_device) })
    }
}
