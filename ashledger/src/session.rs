//! Session: 診断の設定、フラグ、要求リスト、Registryをまとめた状態。
//!
//! グローバルな状態は持たず、すべての操作はSessionを通して行う。
//! 内部でロックは取らないので、複数スレッドから使う場合は呼び出し側で直列化すること。

use ash::{extensions::ext::DebugUtils, vk};
use std::{any::Any, rc::Rc};

use crate::{
    resolve_device_extensions, resolve_extensions, Accumulator, ApplicationInfo, AshNative,
    CapabilityName, DebugMessageFilter, DeviceDesc, DiagnosticChannel, Error, FatalPolicy,
    HandleKey, InstanceDesc, LibraryFlag, LibraryFlags, MessengerDesc, Native, Oracle, Registry,
    ResourceKind, Result, SessionConfig, SeverityFlags, SinkFn, Tracked,
};

/// 実際のVulkanローダーを使うSession
pub type VulkanSession = Session<AshNative>;

fn is_debug_utils(name: &CapabilityName) -> bool {
    name.as_c_str() == DebugUtils::name()
}

/// ライブラリの状態
pub struct Session<N: Native> {
    native: N,
    // debug messengerのuser dataとして渡すのでアドレスを固定しておく
    diagnostics: Rc<DiagnosticChannel>,
    accumulator: Accumulator,
    registry: Registry,
    flags: LibraryFlags,
    application: ApplicationInfo,
    instance_debug_messages: DebugMessageFilter,
    initialized: bool,
}
impl<N: Native> Session<N> {
    /// 初期状態のSessionを作る
    ///
    /// 診断メッセージはすべて無効、sinkはデフォルト、要求リストとRegistryは空。
    pub fn new(native: N) -> Self {
        Self::with_config(native, SessionConfig::default())
    }

    pub fn with_config(native: N, config: SessionConfig) -> Self {
        let SessionConfig {
            severity_mask,
            fatal_policy,
            flags,
            application,
            instance_debug_messages,
        } = config;
        tracing::debug!(?flags, ?severity_mask, "session initialized");
        Self {
            native,
            diagnostics: Rc::new(DiagnosticChannel::new(severity_mask, fatal_policy)),
            accumulator: Accumulator::new(),
            registry: Registry::new(),
            flags,
            application,
            instance_debug_messages,
            initialized: true,
        }
    }

    /// teardown後のSessionを再び使えるようにする
    pub fn initialize(&mut self) {
        if !self.initialized {
            self.initialized = true;
            tracing::debug!("session reinitialized");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 登録されたリソースをすべて破棄し、Sessionを初期状態に戻す
    ///
    /// 何度呼んでもよい。`FatalPolicy`だけは引き継がれる。
    pub fn teardown(&mut self) {
        let destroyed = self
            .registry
            .destroy_all(&mut self.native, &self.diagnostics);
        self.accumulator.free();
        self.diagnostics.set_sink(None, None);
        self.diagnostics.set_severity_mask(SeverityFlags::empty());
        self.flags = LibraryFlags::empty();
        self.application = ApplicationInfo::default();
        self.instance_debug_messages = DebugMessageFilter::default();
        if self.initialized {
            tracing::debug!(destroyed, remaining = self.registry.len(), "session torn down");
        }
        self.initialized = false;
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn diagnostics(&self) -> &DiagnosticChannel {
        &self.diagnostics
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    // 診断 / フラグ

    /// sinkとユーザーコンテキストを組で差し替える。`None`でデフォルトのsinkに戻る。
    ///
    /// sinkの中から呼ぶと差し替えは行われず、`false`を返す。
    pub fn set_diagnostic_sink(
        &self,
        sink: Option<SinkFn>,
        user_context: Option<Box<dyn Any>>,
    ) -> bool {
        self.diagnostics.set_sink(sink, user_context)
    }

    pub fn diagnostic_sink_is_default(&self) -> bool {
        self.diagnostics.sink_is_default()
    }

    pub fn with_user_context<R>(&self, f: impl FnOnce(Option<&dyn Any>) -> R) -> R {
        self.diagnostics.with_user_context(f)
    }

    /// Severityマスクを上書きする
    pub fn set_severity_mask(&self, mask: SeverityFlags) {
        self.diagnostics.set_severity_mask(mask);
    }

    pub fn severity_mask(&self) -> SeverityFlags {
        self.diagnostics.severity_mask()
    }

    pub fn set_fatal_policy(&self, policy: FatalPolicy) {
        self.diagnostics.set_fatal_policy(policy);
    }

    pub fn set_flag(&mut self, flag: LibraryFlag, value: bool) {
        self.flags.set(flag, value);
    }

    pub fn flag(&self, flag: LibraryFlag) -> bool {
        self.flags.get(flag)
    }

    /// 以降に作成するinstanceで使うアプリケーション情報を設定する
    pub fn define_application_info(&mut self, application: ApplicationInfo) {
        self.diagnostics.verbose(format_args!(
            "application info: {:?} v{}, engine {:?} v{}, api {}.{}.{}",
            application.name,
            application.version,
            application.engine_name,
            application.engine_version,
            vk::api_version_major(application.api_version),
            vk::api_version_minor(application.api_version),
            vk::api_version_patch(application.api_version),
        ));
        self.application = application;
    }

    /// 自動で作成するdebug messengerが受け取るメッセージを指定する
    ///
    /// フラグが立っていない、もしくは`VK_EXT_debug_utils`が要求されていない場合は
    /// WARNINGを出すが、指定自体は保存する。
    pub fn specify_instance_debug_messages(
        &mut self,
        severities: vk::DebugUtilsMessageSeverityFlagsEXT,
        types: vk::DebugUtilsMessageTypeFlagsEXT,
    ) {
        if !self.flags.get(LibraryFlag::CreateInstanceDebugMessengers) {
            self.diagnostics.warning(format_args!(
                "instance debug messages specified while automatic debug messengers are disabled"
            ));
        } else if !self.accumulator.extensions().iter().any(is_debug_utils) {
            self.diagnostics.warning(format_args!(
                "instance debug messages specified but {:?} has not been requested",
                DebugUtils::name()
            ));
        }
        self.instance_debug_messages = DebugMessageFilter { severities, types };
    }

    // 要求

    pub fn request_layer(&mut self, name: &str) -> Result<()> {
        let oracle = Oracle::new(&self.native, &self.diagnostics);
        self.accumulator.request_layer(&oracle, name)
    }

    pub fn request_extension(&mut self, name: &str) -> Result<()> {
        self.accumulator.request_extension(&self.diagnostics, name)
    }

    pub fn request_device_extension(&mut self, name: &str) -> Result<()> {
        self.accumulator
            .request_device_extension(&self.diagnostics, name)
    }

    pub fn is_layer_requested(&self, name: &str) -> bool {
        self.accumulator.is_layer_requested(name)
    }

    pub fn is_extension_requested(&self, name: &str) -> bool {
        self.accumulator.is_extension_requested(name)
    }

    /// 要求済みのinstance extensionを解決し、取り除いた数を返す
    ///
    /// `create_instance`の最初でも呼ばれる。
    pub fn resolve_extensions(&mut self) -> usize {
        let oracle = Oracle::new(&self.native, &self.diagnostics);
        resolve_extensions(&mut self.accumulator, &oracle)
    }

    // 利用可能かの確認

    pub fn is_layer_available(&self, name: &str) -> bool {
        Oracle::new(&self.native, &self.diagnostics).is_layer_available(name)
    }

    pub fn is_extension_available(&self, name: &str, provider: Option<&str>) -> bool {
        Oracle::new(&self.native, &self.diagnostics).is_extension_available(name, provider)
    }

    pub fn is_device_extension_available(
        &self,
        physical_device: vk::PhysicalDevice,
        name: &str,
        provider: Option<&str>,
    ) -> bool {
        Oracle::new(&self.native, &self.diagnostics).is_device_extension_available(
            physical_device,
            name,
            provider,
        )
    }

    // 作成 / 破棄

    /// 要求されたlayer / extensionでinstanceを作成する
    ///
    /// 要求リストは成否にかかわらず空になる。
    pub fn create_instance(&mut self) -> Result<vk::Instance> {
        self.ensure_initialized()?;
        self.resolve_extensions();
        let (layers, extensions) = self.accumulator.take_instance_lists();

        let debug_utils_enabled = extensions.iter().any(is_debug_utils);
        let auto_messenger = self.flags.get(LibraryFlag::CreateInstanceDebugMessengers);
        if auto_messenger && !debug_utils_enabled {
            self.diagnostics.warning(format_args!(
                "automatic debug messengers are enabled but {:?} is not enabled; no messenger will be created",
                DebugUtils::name()
            ));
        }
        let messenger_desc = (auto_messenger && debug_utils_enabled).then(|| MessengerDesc {
            filter: self.instance_debug_messages,
            channel: &self.diagnostics,
        });

        let instance = self
            .native
            .create_instance(&InstanceDesc {
                application: &self.application,
                layers: &layers,
                extensions: &extensions,
                chained_messenger: messenger_desc,
            })
            .map_err(|result| {
                self.diagnostics.raise(Error::NativeCallFailed {
                    call: "vkCreateInstance",
                    result,
                })
            })?;

        let (layer_count, extension_count) = (layers.len(), extensions.len());
        let key = HandleKey::of(instance);
        if let Err(error) = self.registry.register(key, layers, extensions, None) {
            self.native.destroy_instance(instance);
            return Err(self.diagnostics.raise(error));
        }
        self.diagnostics.notify(format_args!(
            "created instance with {layer_count} layer(s) and {extension_count} extension(s)"
        ));

        if let Some(desc) = messenger_desc {
            // 失敗してもinstanceは有効なので、エラーは診断メッセージだけで伝える
            let _ = Self::create_registered_messenger(
                &mut self.native,
                &mut self.registry,
                &self.diagnostics,
                instance,
                &desc,
            );
        }

        Ok(instance)
    }

    /// `instance`に依存するdebug messengerを作成する
    ///
    /// nativeのメッセージは`native-debug-relay`として診断チャネルに流れる。
    pub fn create_debug_messenger(
        &mut self,
        instance: vk::Instance,
        severities: vk::DebugUtilsMessageSeverityFlagsEXT,
        types: vk::DebugUtilsMessageTypeFlagsEXT,
    ) -> Result<vk::DebugUtilsMessengerEXT> {
        self.ensure_initialized()?;
        let key = HandleKey::of(instance);
        if key.is_null() {
            return Err(self.diagnostics.raise(Error::NullArgument("instance")));
        }
        let wrapper = self
            .registry
            .lookup(key)
            .map_err(|error| self.diagnostics.raise(error))?;
        if !wrapper.extensions().iter().any(is_debug_utils) {
            return Err(self.diagnostics.raise(Error::ExtensionNotEnabled(
                DebugUtils::name().to_string_lossy().into_owned(),
            )));
        }
        let desc = MessengerDesc {
            filter: DebugMessageFilter { severities, types },
            channel: &self.diagnostics,
        };
        Self::create_registered_messenger(
            &mut self.native,
            &mut self.registry,
            &self.diagnostics,
            instance,
            &desc,
        )
    }

    fn create_registered_messenger(
        native: &mut N,
        registry: &mut Registry,
        diagnostics: &DiagnosticChannel,
        instance: vk::Instance,
        desc: &MessengerDesc<'_>,
    ) -> Result<vk::DebugUtilsMessengerEXT> {
        let messenger = native
            .create_debug_messenger(instance, desc)
            .map_err(|result| {
                diagnostics.raise(Error::NativeCallFailed {
                    call: "vkCreateDebugUtilsMessengerEXT",
                    result,
                })
            })?;
        registry
            .register(
                HandleKey::of(messenger),
                Vec::new(),
                Vec::new(),
                Some(HandleKey::of(instance)),
            )
            .map_err(|error| diagnostics.raise(error))?;
        diagnostics.verbose(format_args!("created debug messenger for {:?}", instance));
        Ok(messenger)
    }

    /// 要求されたdevice extensionでlogical deviceを作成する
    ///
    /// device extensionはphysical device本体 → 登録済みinstanceのlayerの順で解決する。
    /// deviceは`instance`に依存するリソースとして登録される。
    pub fn create_device(
        &mut self,
        instance: vk::Instance,
        physical_device: vk::PhysicalDevice,
        desc: &DeviceDesc<'_>,
    ) -> Result<vk::Device> {
        self.ensure_initialized()?;
        let owner = HandleKey::of(instance);
        if owner.is_null() {
            return Err(self.diagnostics.raise(Error::NullArgument("instance")));
        }
        if physical_device == vk::PhysicalDevice::null() {
            return Err(self.diagnostics.raise(Error::NullArgument("physical_device")));
        }
        self.registry
            .lookup(owner)
            .map_err(|error| self.diagnostics.raise(error))?;

        let instance_layers = self
            .registry
            .iter_kind(ResourceKind::Instance)
            .flat_map(|wrapper| wrapper.layers().iter().cloned())
            .collect::<Vec<_>>();
        let oracle = Oracle::new(&self.native, &self.diagnostics);
        resolve_device_extensions(
            &mut self.accumulator,
            &oracle,
            physical_device,
            &instance_layers,
        );
        let extensions = self.accumulator.take_device_extensions();

        let device = self
            .native
            .create_device(instance, physical_device, desc, &extensions)
            .map_err(|result| {
                self.diagnostics.raise(Error::NativeCallFailed {
                    call: "vkCreateDevice",
                    result,
                })
            })?;
        let extension_count = extensions.len();
        if let Err(error) =
            self.registry
                .register(HandleKey::of(device), Vec::new(), extensions, Some(owner))
        {
            self.native.destroy_device(device);
            return Err(self.diagnostics.raise(error));
        }
        self.diagnostics.notify(format_args!(
            "created device with {extension_count} extension(s)"
        ));
        Ok(device)
    }

    /// ハンドルを、それに依存するリソースごと破棄する
    ///
    /// 破棄できなかったリソースは登録されたまま残り、teardownで再度破棄を試みる。
    pub fn destroy<H: Tracked>(&mut self, handle: H) -> Result<()> {
        self.registry
            .destroy(HandleKey::of(handle), &mut self.native)
            .map_err(|error| self.diagnostics.raise(error))
    }

    // 問い合わせ

    /// ハンドルで実際に有効になったlayer
    pub fn enabled_layers<H: Tracked>(&self, handle: H) -> Result<&[CapabilityName]> {
        self.registry
            .lookup(HandleKey::of(handle))
            .map(|wrapper| wrapper.layers())
            .map_err(|error| self.diagnostics.raise(error))
    }

    /// ハンドルで実際に有効になったextension
    pub fn enabled_extensions<H: Tracked>(&self, handle: H) -> Result<&[CapabilityName]> {
        self.registry
            .lookup(HandleKey::of(handle))
            .map(|wrapper| wrapper.extensions())
            .map_err(|error| self.diagnostics.raise(error))
    }

    pub fn is_layer_enabled<H: Tracked>(&self, handle: H, name: &str) -> bool {
        self.enabled_layers(handle)
            .map_or(false, |layers| layers.iter().any(|l| l == name))
    }

    pub fn is_extension_enabled<H: Tracked>(&self, handle: H, name: &str) -> bool {
        self.enabled_extensions(handle)
            .map_or(false, |extensions| extensions.iter().any(|e| e == name))
    }

    /// 登録済みinstanceのphysical deviceを列挙する
    pub fn enumerate_physical_devices(
        &mut self,
        instance: vk::Instance,
    ) -> Result<Vec<vk::PhysicalDevice>> {
        let key = HandleKey::of(instance);
        self.registry
            .lookup(key)
            .map_err(|error| self.diagnostics.raise(error))?;
        let physical_devices = self
            .native
            .enumerate_physical_devices(instance)
            .map_err(|result| {
                self.diagnostics.raise(Error::NativeCallFailed {
                    call: "vkEnumeratePhysicalDevices",
                    result,
                })
            })?;
        if physical_devices.is_empty() {
            self.diagnostics
                .warning(format_args!("{key} has no physical devices"));
        }
        Ok(physical_devices)
    }

    /// `is_suitable`を満たすphysical deviceだけを列挙する
    pub fn enumerate_suitable_physical_devices(
        &mut self,
        instance: vk::Instance,
        mut is_suitable: impl FnMut(&Self, vk::PhysicalDevice) -> bool,
    ) -> Result<Vec<vk::PhysicalDevice>> {
        let mut physical_devices = self.enumerate_physical_devices(instance)?;
        physical_devices.retain(|&physical_device| is_suitable(&*self, physical_device));
        Ok(physical_devices)
    }

    pub fn enumerate_queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::QueueFamilyProperties>> {
        self.native
            .enumerate_queue_families(physical_device)
            .map_err(|result| {
                self.diagnostics.raise(Error::NativeCallFailed {
                    call: "vkGetPhysicalDeviceQueueFamilyProperties",
                    result,
                })
            })
    }

    pub fn physical_device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::PhysicalDeviceProperties> {
        self.native
            .physical_device_properties(physical_device)
            .map_err(|result| {
                self.diagnostics.raise(Error::NativeCallFailed {
                    call: "vkGetPhysicalDeviceProperties",
                    result,
                })
            })
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(self.diagnostics.raise(Error::NotInitialized))
        }
    }
}
impl<N: Native> Drop for Session<N> {
    fn drop(&mut self) {
        self.teardown();
    }
}
