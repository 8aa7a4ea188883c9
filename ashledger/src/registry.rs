//! ライブラリを通して作成したハンドルと、実際に有効になったlayer / extensionの記録。
//!
//! 破棄は必ず「依存リソース → 所有者」の順で行う。

use ash::vk::{self, Handle};
use std::collections::HashMap;

use crate::{
    list, native::MessengerDestroyer, CapabilityList, CapabilityName, DiagnosticChannel, Error,
    HandleKey, Native, ResourceKind, Result,
};

/// 作成されたトップレベルのオブジェクト1つ分の記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceWrapper {
    key: HandleKey,
    layers: Box<[CapabilityName]>,
    extensions: Box<[CapabilityName]>,
    owner: Option<HandleKey>,
}
impl ResourceWrapper {
    pub fn key(&self) -> HandleKey {
        self.key
    }

    /// 実際に有効になったlayer
    pub fn layers(&self) -> &[CapabilityName] {
        &self.layers
    }

    /// 実際に有効になったextension
    pub fn extensions(&self) -> &[CapabilityName] {
        &self.extensions
    }

    /// 依存リソースであれば、その所有者
    pub fn owner(&self) -> Option<HandleKey> {
        self.owner
    }
}

// 依存リソースの破棄関数は所有者のinstanceから一度だけロードする
#[derive(Default)]
struct Destroyers {
    loaded: HashMap<HandleKey, Option<MessengerDestroyer>>,
}
impl Destroyers {
    fn get<N: Native>(&mut self, native: &N, owner: HandleKey) -> Option<&MessengerDestroyer> {
        self.loaded
            .entry(owner)
            .or_insert_with(|| {
                owner
                    .to_handle::<vk::Instance>()
                    .and_then(|instance| native.load_messenger_destroyer(instance))
            })
            .as_ref()
    }
}

/// ハンドルをキーにした`ResourceWrapper`のストア
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<HandleKey, ResourceWrapper>,
    // 登録順
    order: Vec<HandleKey>,
}
impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// ハンドルを登録する
    ///
    /// 同じハンドルがすでにあれば`Error::AlreadyRegistered`。
    /// 所有者は先に登録されていなくてもよい。
    pub fn register(
        &mut self,
        key: HandleKey,
        layers: CapabilityList,
        extensions: CapabilityList,
        owner: Option<HandleKey>,
    ) -> Result<()> {
        if key.is_null() {
            return Err(Error::NullArgument("handle"));
        }
        if self.entries.contains_key(&key) {
            return Err(Error::AlreadyRegistered(key));
        }
        self.entries
            .try_reserve(1)
            .map_err(|_| Error::MemoryExhausted)?;
        list::append(&mut self.order, key)?;
        self.entries.insert(
            key,
            ResourceWrapper {
                key,
                layers: layers.into_boxed_slice(),
                extensions: extensions.into_boxed_slice(),
                owner,
            },
        );
        tracing::debug!(%key, owner = ?owner, "registered");
        Ok(())
    }

    /// このRegistryで作成されたハンドルでなければ`Error::InvalidObject`
    pub fn lookup(&self, key: HandleKey) -> Result<&ResourceWrapper> {
        self.entries.get(&key).ok_or(Error::InvalidObject(key))
    }

    pub fn contains(&self, key: HandleKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 登録順に、指定した種類のリソースを列挙する
    pub fn iter_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceWrapper> {
        self.order
            .iter()
            .filter(move |key| key.kind() == kind)
            .filter_map(|key| self.entries.get(key))
    }

    /// `owner`に依存しているリソースのキー
    pub fn dependents_of(&self, owner: HandleKey) -> Vec<HandleKey> {
        let mut dependents = self
            .order
            .iter()
            .filter(|key| {
                self.entries
                    .get(*key)
                    .map_or(false, |entry| entry.owner == Some(owner))
            })
            .copied()
            .collect::<Vec<_>>();
        dependents.sort();
        list::dedup_adjacent(&mut dependents);
        dependents
    }

    /// 登録されているすべてのリソースを破棄する
    ///
    /// 1周目で依存リソースを、2周目で所有者を破棄する。
    /// 同じハンドルが複数回現れても破棄は1回だけ。
    /// 破棄できなかったリソース(とその所有者)は登録されたまま残る。
    /// 破棄した数を返す。
    pub fn destroy_all<N: Native>(
        &mut self,
        native: &mut N,
        diagnostics: &DiagnosticChannel,
    ) -> usize {
        let mut keys = std::mem::take(&mut self.order);
        keys.sort();
        list::dedup_adjacent(&mut keys);

        let mut destroyers = Destroyers::default();
        let mut destroyed = 0;

        tracing::debug!(count = keys.len(), "teardown: dependents");
        for &key in keys.iter() {
            let is_dependent = self
                .entries
                .get(&key)
                .map_or(false, |entry| entry.owner.is_some());
            if is_dependent {
                match self.destroy_entry(key, native, &mut destroyers) {
                    Ok(()) => destroyed += 1,
                    Err(error) => {
                        diagnostics.raise(error);
                    }
                }
            }
        }

        tracing::debug!("teardown: owners");
        for &key in keys.iter() {
            if !self.entries.contains_key(&key) {
                continue;
            }
            let remaining = self
                .entries
                .values()
                .filter(|entry| entry.owner == Some(key))
                .count();
            if remaining > 0 {
                diagnostics.warning(format_args!(
                    "{key} was not destroyed because {remaining} dependent resource(s) are still alive"
                ));
                continue;
            }
            match self.destroy_entry(key, native, &mut destroyers) {
                Ok(()) => destroyed += 1,
                Err(error) => {
                    diagnostics.raise(error);
                }
            }
        }

        self.order = keys
            .into_iter()
            .filter(|key| self.entries.contains_key(key))
            .collect();
        destroyed
    }

    /// 1つのハンドルを、それに依存するリソースごと破棄する
    ///
    /// 破棄に失敗したリソースは登録されたまま残り、最初の失敗を返す。
    /// 失敗は診断チャネルへは流さないので、呼び出し側で扱うこと。
    pub fn destroy<N: Native>(&mut self, key: HandleKey, native: &mut N) -> Result<()> {
        self.lookup(key)?;
        let mut destroyers = Destroyers::default();
        let result = self
            .dependents_of(key)
            .into_iter()
            .try_for_each(|dependent| self.destroy_entry(dependent, native, &mut destroyers))
            .and_then(|()| self.destroy_entry(key, native, &mut destroyers));
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
        result
    }

    // native側の破棄に成功したときだけエントリを取り除く
    fn destroy_entry<N: Native>(
        &mut self,
        key: HandleKey,
        native: &mut N,
        destroyers: &mut Destroyers,
    ) -> Result<()> {
        let entry = self.lookup(key)?;
        match key.kind() {
            ResourceKind::Instance => native.destroy_instance(vk::Instance::from_raw(key.raw())),
            ResourceKind::Device => native.destroy_device(vk::Device::from_raw(key.raw())),
            ResourceKind::DebugMessenger => {
                let owner = entry.owner;
                let destroy = match owner {
                    Some(owner) => destroyers.get(&*native, owner),
                    None => None,
                };
                match (owner, destroy) {
                    (Some(owner), Some(destroy)) => destroy(
                        vk::Instance::from_raw(owner.raw()),
                        vk::DebugUtilsMessengerEXT::from_raw(key.raw()),
                    ),
                    _ => {
                        return Err(Error::NativeCallFailed {
                            call: "vkGetInstanceProcAddr(vkDestroyDebugUtilsMessengerEXT)",
                            result: vk::Result::ERROR_EXTENSION_NOT_PRESENT,
                        })
                    }
                }
            }
        }
        self.entries.remove(&key);
        tracing::debug!(%key, "destroyed");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn push_duplicate_for_test(&mut self, key: HandleKey) {
        self.order.push(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        native::mock::{MockNative, NativeCall},
        FatalPolicy, Severity, SeverityFlags,
    };
    use std::{cell::RefCell, rc::Rc};

    const INSTANCE: HandleKey = HandleKey::new(ResourceKind::Instance, 0x10);
    const MESSENGER_A: HandleKey = HandleKey::new(ResourceKind::DebugMessenger, 0x20);
    const MESSENGER_B: HandleKey = HandleKey::new(ResourceKind::DebugMessenger, 0x21);
    const DEVICE: HandleKey = HandleKey::new(ResourceKind::Device, 0x30);

    fn recording_channel() -> (DiagnosticChannel, Rc<RefCell<Vec<Severity>>>) {
        let channel = DiagnosticChannel::new(SeverityFlags::ALL, FatalPolicy::Propagate);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        channel.set_sink(
            Some(Box::new(move |d, _| log.borrow_mut().push(d.severity()))),
            None,
        );
        (channel, seen)
    }

    fn names(list: &[&str]) -> CapabilityList {
        list.iter().map(|n| CapabilityName::new(n).unwrap()).collect()
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = Registry::new();
        registry
            .register(INSTANCE, names(&["VK_LAYER_a"]), Vec::new(), None)
            .unwrap();
        let result = registry.register(INSTANCE, Vec::new(), names(&["VK_EXT_b"]), None);

        assert_eq!(result, Err(Error::AlreadyRegistered(INSTANCE)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(INSTANCE).unwrap().layers(), &["VK_LAYER_a"]);
        assert!(registry.lookup(INSTANCE).unwrap().extensions().is_empty());
    }

    #[test]
    fn foreign_handles_are_invalid_objects() {
        let registry = Registry::new();
        assert_eq!(registry.lookup(DEVICE), Err(Error::InvalidObject(DEVICE)));
    }

    #[test]
    fn null_handles_are_rejected() {
        let mut registry = Registry::new();
        let null = HandleKey::new(ResourceKind::Instance, 0);
        assert_eq!(
            registry.register(null, Vec::new(), Vec::new(), None),
            Err(Error::NullArgument("handle"))
        );
    }

    #[test]
    fn dependents_are_destroyed_before_their_owner() {
        let mut native = MockNative::new();
        let log = native.log();
        let (channel, _) = recording_channel();
        let mut registry = Registry::new();

        // 所有者を最後に登録する
        registry
            .register(MESSENGER_A, Vec::new(), Vec::new(), Some(INSTANCE))
            .unwrap();
        registry
            .register(DEVICE, Vec::new(), Vec::new(), Some(INSTANCE))
            .unwrap();
        registry
            .register(MESSENGER_B, Vec::new(), Vec::new(), Some(INSTANCE))
            .unwrap();
        registry
            .register(INSTANCE, Vec::new(), Vec::new(), None)
            .unwrap();

        assert_eq!(registry.destroy_all(&mut native, &channel), 4);
        assert!(registry.is_empty());

        let log = log.borrow();
        let destroy_instance = log
            .iter()
            .position(|c| *c == NativeCall::DestroyInstance(INSTANCE.raw()))
            .unwrap();
        for dependent in [
            NativeCall::DestroyMessenger(MESSENGER_A.raw()),
            NativeCall::DestroyMessenger(MESSENGER_B.raw()),
            NativeCall::DestroyDevice(DEVICE.raw()),
            NativeCall::LoadMessengerDestroyer(INSTANCE.raw()),
        ] {
            let position = log.iter().position(|c| *c == dependent).unwrap();
            assert!(position < destroy_instance, "{dependent:?} after the owner");
        }
        let loads = log
            .iter()
            .filter(|c| matches!(c, NativeCall::LoadMessengerDestroyer(_)))
            .count();
        assert_eq!(loads, 1);
    }

    #[test]
    fn teardown_is_idempotent_with_duplicate_entries() {
        let mut native = MockNative::new();
        let log = native.log();
        let (channel, _) = recording_channel();
        let mut registry = Registry::new();
        registry
            .register(INSTANCE, Vec::new(), Vec::new(), None)
            .unwrap();
        registry
            .register(MESSENGER_A, Vec::new(), Vec::new(), Some(INSTANCE))
            .unwrap();
        registry.push_duplicate_for_test(INSTANCE);
        registry.push_duplicate_for_test(MESSENGER_A);
        registry.push_duplicate_for_test(INSTANCE);

        assert_eq!(registry.destroy_all(&mut native, &channel), 2);
        assert_eq!(registry.destroy_all(&mut native, &channel), 0);

        let log = log.borrow();
        let instance_destroys = log
            .iter()
            .filter(|c| **c == NativeCall::DestroyInstance(INSTANCE.raw()))
            .count();
        let messenger_destroys = log
            .iter()
            .filter(|c| **c == NativeCall::DestroyMessenger(MESSENGER_A.raw()))
            .count();
        assert_eq!(instance_destroys, 1);
        assert_eq!(messenger_destroys, 1);
    }

    #[test]
    fn owner_survives_when_destroyer_cannot_be_loaded() {
        let mut native = MockNative::new();
        native.without_messenger_destroyer = true;
        let log = native.log();
        let (channel, seen) = recording_channel();
        let mut registry = Registry::new();
        registry
            .register(INSTANCE, Vec::new(), Vec::new(), None)
            .unwrap();
        registry
            .register(MESSENGER_A, Vec::new(), Vec::new(), Some(INSTANCE))
            .unwrap();

        assert_eq!(registry.destroy_all(&mut native, &channel), 0);
        assert!(registry.contains(INSTANCE));
        assert!(registry.contains(MESSENGER_A));
        assert!(!log
            .borrow()
            .iter()
            .any(|c| matches!(c, NativeCall::DestroyInstance(_))));
        assert!(seen.borrow().contains(&Severity::Error));
    }

    #[test]
    fn failed_destroy_keeps_the_handle_for_teardown() {
        let mut native = MockNative::new();
        native.without_messenger_destroyer = true;
        let log = native.log();
        let (channel, seen) = recording_channel();
        let mut registry = Registry::new();
        registry
            .register(INSTANCE, Vec::new(), Vec::new(), None)
            .unwrap();
        registry
            .register(MESSENGER_A, Vec::new(), Vec::new(), Some(INSTANCE))
            .unwrap();

        assert!(matches!(
            registry.destroy(MESSENGER_A, &mut native),
            Err(Error::NativeCallFailed { .. })
        ));
        assert!(matches!(
            registry.destroy(INSTANCE, &mut native),
            Err(Error::NativeCallFailed { .. })
        ));
        assert!(registry.contains(MESSENGER_A));
        assert!(registry.contains(INSTANCE));
        assert_eq!(registry.iter_kind(ResourceKind::Instance).count(), 1);
        // 失敗の報告は呼び出し側に任せる
        assert!(seen.borrow().is_empty());

        native.without_messenger_destroyer = false;
        assert_eq!(registry.destroy_all(&mut native, &channel), 2);
        assert!(registry.is_empty());

        let log = log.borrow();
        let messenger = log
            .iter()
            .position(|c| *c == NativeCall::DestroyMessenger(MESSENGER_A.raw()))
            .unwrap();
        let instance = log
            .iter()
            .position(|c| *c == NativeCall::DestroyInstance(INSTANCE.raw()))
            .unwrap();
        assert!(messenger < instance);
    }

    #[test]
    fn destroying_one_handle_takes_its_dependents_first() {
        let mut native = MockNative::new();
        let log = native.log();
        let (channel, _) = recording_channel();
        let mut registry = Registry::new();
        let other = HandleKey::new(ResourceKind::Instance, 0x11);
        registry
            .register(INSTANCE, Vec::new(), Vec::new(), None)
            .unwrap();
        registry
            .register(other, Vec::new(), Vec::new(), None)
            .unwrap();
        registry
            .register(DEVICE, Vec::new(), Vec::new(), Some(INSTANCE))
            .unwrap();

        registry.destroy(INSTANCE, &mut native).unwrap();

        assert_eq!(
            log.borrow().as_slice(),
            &[
                NativeCall::DestroyDevice(DEVICE.raw()),
                NativeCall::DestroyInstance(INSTANCE.raw()),
            ]
        );
        assert!(registry.contains(other));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.destroy(INSTANCE, &mut native),
            Err(Error::InvalidObject(INSTANCE))
        );
    }
}
