//! テスト用の`Native`。GPUがなくても動く。

use ash::{
    prelude::VkResult,
    vk::{self, Handle},
};
use std::{cell::RefCell, collections::HashMap, rc::Rc};

use super::{DeviceDesc, InstanceDesc, MessengerDesc, MessengerDestroyer, Native};
use crate::CapabilityName;

/// MockNativeが受けた呼び出しの記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NativeCall {
    CreateInstance {
        layers: Vec<String>,
        extensions: Vec<String>,
        chained_messenger: bool,
    },
    DestroyInstance(u64),
    CreateDevice {
        extensions: Vec<String>,
    },
    DestroyDevice(u64),
    CreateMessenger(u64),
    DestroyMessenger(u64),
    LoadMessengerDestroyer(u64),
}

const FIRST_HANDLE: u64 = 0x100;

pub(crate) type CallLog = Rc<RefCell<Vec<NativeCall>>>;

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn to_names(names: &[String]) -> Vec<CapabilityName> {
    names
        .iter()
        .filter_map(|n| CapabilityName::new(n).ok())
        .collect()
}

fn strings(names: &[CapabilityName]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[derive(Default)]
pub(crate) struct MockNative {
    layers: Vec<String>,
    core_extensions: Vec<String>,
    layer_extensions: HashMap<String, Vec<String>>,
    device_core_extensions: Vec<String>,
    device_layer_extensions: HashMap<String, Vec<String>>,
    physical_devices: Vec<u64>,
    queue_families: Vec<vk::QueueFamilyProperties>,
    pub fail_queries: bool,
    pub fail_create: Option<vk::Result>,
    pub without_messenger_destroyer: bool,
    // 最初のハンドルを返し続ける
    pub repeat_handles: bool,
    next_handle: u64,
    log: CallLog,
}
impl MockNative {
    pub fn new() -> Self {
        Self {
            next_handle: FIRST_HANDLE,
            ..Default::default()
        }
    }

    pub fn with_layer(mut self, layer: &str, extensions: &[&str]) -> Self {
        self.layers.push(layer.to_string());
        self.layer_extensions
            .insert(layer.to_string(), owned(extensions));
        self
    }

    pub fn with_core_extensions(mut self, extensions: &[&str]) -> Self {
        self.core_extensions.extend(owned(extensions));
        self
    }

    pub fn with_device_core_extensions(mut self, extensions: &[&str]) -> Self {
        self.device_core_extensions.extend(owned(extensions));
        self
    }

    pub fn with_device_layer_extensions(mut self, layer: &str, extensions: &[&str]) -> Self {
        self.device_layer_extensions
            .insert(layer.to_string(), owned(extensions));
        self
    }

    pub fn with_physical_devices(mut self, raw: &[u64]) -> Self {
        self.physical_devices.extend_from_slice(raw);
        self
    }

    pub fn with_queue_families(mut self, flags: &[vk::QueueFlags]) -> Self {
        self.queue_families.extend(flags.iter().map(|&queue_flags| {
            vk::QueueFamilyProperties {
                queue_flags,
                queue_count: 1,
                ..Default::default()
            }
        }));
        self
    }

    pub fn log(&self) -> CallLog {
        Rc::clone(&self.log)
    }

    fn record(&self, call: NativeCall) {
        self.log.borrow_mut().push(call);
    }

    fn allocate(&mut self) -> u64 {
        if !self.repeat_handles || self.next_handle == FIRST_HANDLE {
            self.next_handle += 1;
        }
        self.next_handle
    }

    fn query<T>(&self, f: impl FnOnce() -> T) -> VkResult<T> {
        if self.fail_queries {
            Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        } else {
            Ok(f())
        }
    }
}

impl Native for MockNative {
    fn enumerate_layers(&self) -> VkResult<Vec<CapabilityName>> {
        self.query(|| to_names(&self.layers))
    }

    fn enumerate_extensions(
        &self,
        provider: Option<&CapabilityName>,
    ) -> VkResult<Vec<CapabilityName>> {
        self.query(|| match provider {
            None => to_names(&self.core_extensions),
            Some(layer) => self
                .layer_extensions
                .get(&layer.to_string())
                .map(|e| to_names(e))
                .unwrap_or_default(),
        })
    }

    fn enumerate_device_extensions(
        &self,
        _physical_device: vk::PhysicalDevice,
        provider: Option<&CapabilityName>,
    ) -> VkResult<Vec<CapabilityName>> {
        self.query(|| match provider {
            None => to_names(&self.device_core_extensions),
            Some(layer) => self
                .device_layer_extensions
                .get(&layer.to_string())
                .map(|e| to_names(e))
                .unwrap_or_default(),
        })
    }

    fn create_instance(&mut self, desc: &InstanceDesc<'_>) -> VkResult<vk::Instance> {
        self.record(NativeCall::CreateInstance {
            layers: strings(desc.layers),
            extensions: strings(desc.extensions),
            chained_messenger: desc.chained_messenger.is_some(),
        });
        if let Some(result) = self.fail_create {
            return Err(result);
        }
        Ok(vk::Instance::from_raw(self.allocate()))
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        self.record(NativeCall::DestroyInstance(instance.as_raw()));
    }

    fn create_device(
        &mut self,
        _instance: vk::Instance,
        _physical_device: vk::PhysicalDevice,
        _desc: &DeviceDesc<'_>,
        extensions: &[CapabilityName],
    ) -> VkResult<vk::Device> {
        self.record(NativeCall::CreateDevice {
            extensions: strings(extensions),
        });
        if let Some(result) = self.fail_create {
            return Err(result);
        }
        Ok(vk::Device::from_raw(self.allocate()))
    }

    fn destroy_device(&mut self, device: vk::Device) {
        self.record(NativeCall::DestroyDevice(device.as_raw()));
    }

    fn create_debug_messenger(
        &mut self,
        _instance: vk::Instance,
        _desc: &MessengerDesc<'_>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        if let Some(result) = self.fail_create {
            return Err(result);
        }
        let raw = self.allocate();
        self.record(NativeCall::CreateMessenger(raw));
        Ok(vk::DebugUtilsMessengerEXT::from_raw(raw))
    }

    fn load_messenger_destroyer(&self, instance: vk::Instance) -> Option<MessengerDestroyer> {
        self.record(NativeCall::LoadMessengerDestroyer(instance.as_raw()));
        if self.without_messenger_destroyer {
            return None;
        }
        let log = Rc::clone(&self.log);
        Some(Box::new(move |_, messenger| {
            log.borrow_mut()
                .push(NativeCall::DestroyMessenger(messenger.as_raw()));
        }))
    }

    fn enumerate_physical_devices(
        &mut self,
        _instance: vk::Instance,
    ) -> VkResult<Vec<vk::PhysicalDevice>> {
        self.query(|| {
            self.physical_devices
                .iter()
                .map(|&raw| vk::PhysicalDevice::from_raw(raw))
                .collect()
        })
    }

    fn enumerate_queue_families(
        &self,
        _physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>> {
        self.query(|| self.queue_families.clone())
    }

    fn physical_device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::PhysicalDeviceProperties> {
        self.query(|| vk::PhysicalDeviceProperties {
            device_id: physical_device.as_raw() as u32,
            ..Default::default()
        })
    }
}
