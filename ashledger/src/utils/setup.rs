use anyhow::{Context, Result};
use ash::{extensions::ext::DebugUtils, vk};
use std::collections::BTreeSet;

use crate::{DebugMessageFilter, DeviceDesc, LibraryFlag, Native, Session};

#[cfg(feature = "validation")]
const ENABLE_VALIDATION_LAYERS: bool = true;
#[cfg(not(feature = "validation"))]
const ENABLE_VALIDATION_LAYERS: bool = false;

const VALIDATION: [&'static str; 1] = ["VK_LAYER_KHRONOS_validation"];

/// instance作成前に、デフォルトのlayer / extensionを要求する関数
///
/// `validation` featureが有効ならvalidation layerと`VK_EXT_debug_utils`を要求し、
/// WARNINGとERRORを中継するdebug messengerを自動作成するように設定する。
/// validation layerが見つからなくても失敗にはしない。
pub fn request_default_instance_capabilities<N: Native>(
    session: &mut Session<N>,
    extra_extensions: &[&str],
) -> Result<()> {
    for extension in extra_extensions {
        session
            .request_extension(extension)
            .with_context(|| format!("Failed to request {extension}"))?;
    }
    if !ENABLE_VALIDATION_LAYERS {
        return Ok(());
    }

    for layer in VALIDATION {
        // 無い環境ではWARNINGが出るだけ
        let _ = session.request_layer(layer);
    }
    let debug_utils = DebugUtils::name().to_string_lossy();
    session
        .request_extension(&debug_utils)
        .context("Failed to request VK_EXT_debug_utils")?;
    session.set_flag(LibraryFlag::CreateInstanceDebugMessengers, true);
    let filter = DebugMessageFilter::warnings_and_errors();
    session.specify_instance_debug_messages(filter.severities, filter.types);
    Ok(())
}

/// 各種Queueのindexを格納する構造体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueIndices {
    /// Graphics Queueのindex
    pub graphics_index: u32,
    /// Transfer Queueのindex
    pub transfer_index: u32,
    /// Compute Queueのindex
    pub compute_index: u32,
}

// 各種Queueのindexを探す
// graphicsとtransferはなるべく別のQueueFamilyから取る
fn find_queue_indices(queue_families: &[vk::QueueFamilyProperties]) -> Option<QueueIndices> {
    let mut graphics_index = None;
    let mut transfer_index = None;
    let mut compute_index = None;
    for (i, queue_family) in queue_families.iter().enumerate() {
        let i = i as u32;
        if queue_family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_index.is_none()
        {
            graphics_index = Some(i);
            continue;
        }
        if queue_family.queue_flags.contains(vk::QueueFlags::TRANSFER) && transfer_index.is_none()
        {
            transfer_index = Some(i);
            continue;
        }
        if queue_family.queue_flags.contains(vk::QueueFlags::COMPUTE) {
            compute_index = Some(i);
        }
    }

    // 専用のQueueFamilyが無ければgraphicsと共有する
    let graphics_index = graphics_index?;
    let graphics_family = queue_families[graphics_index as usize].queue_flags;
    // GRAPHICSを持つQueueFamilyは暗黙にTRANSFERも使える
    let transfer_index = transfer_index.unwrap_or(graphics_index);
    let compute_index = compute_index.or_else(|| {
        graphics_family
            .contains(vk::QueueFlags::COMPUTE)
            .then_some(graphics_index)
    })?;
    Some(QueueIndices {
        graphics_index,
        transfer_index,
        compute_index,
    })
}

/// 適当なphysical deviceを選択する関数
///
/// GraphicsとTransfer、Computeに対応したQueueFamilyがあり、
/// 必要なdevice拡張に対応しているphysical deviceを選ぶ。
pub fn select_physical_device<N: Native>(
    session: &mut Session<N>,
    instance: vk::Instance,
    required_device_extensions: &[&str],
) -> Result<vk::PhysicalDevice> {
    let physical_devices =
        session.enumerate_suitable_physical_devices(instance, |session, physical_device| {
            // QueueFamilyの各種Queue対応の確認
            let is_queue_family_supported = session
                .enumerate_queue_families(physical_device)
                .map_or(false, |queue_families| {
                    find_queue_indices(&queue_families).is_some()
                });

            // デバイス拡張の確認
            let is_device_extension_supported = required_device_extensions
                .iter()
                .all(|name| session.is_device_extension_available(physical_device, name, None));

            is_queue_family_supported && is_device_extension_supported
        })?;

    physical_devices
        .into_iter()
        .next()
        .context("No suitable physical device")
}

/// 各種Queueのindexを取得する関数
pub fn get_queue_indices<N: Native>(
    session: &Session<N>,
    physical_device: vk::PhysicalDevice,
) -> Result<QueueIndices> {
    let queue_families = session.enumerate_queue_families(physical_device)?;
    find_queue_indices(&queue_families).context("Required queue families are missing")
}

/// deviceを作成する関数
///
/// 使うQueueFamilyごとにQueueを1つ作成する。
/// device拡張は事前に`Session::request_device_extension`で要求しておくこと。
pub fn create_device<N: Native>(
    session: &mut Session<N>,
    instance: vk::Instance,
    physical_device: vk::PhysicalDevice,
    queue_indices: &QueueIndices,
) -> Result<vk::Device> {
    // queue create info
    let unique_queue_families = BTreeSet::from([
        queue_indices.graphics_index,
        queue_indices.transfer_index,
        queue_indices.compute_index,
    ]);
    let queue_priorities = [1.0_f32];
    let queue_create_infos = unique_queue_families
        .into_iter()
        .map(|queue_family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)
                .build()
        })
        .collect::<Vec<_>>();

    let device = session.create_device(
        instance,
        physical_device,
        &DeviceDesc {
            queue_create_infos: &queue_create_infos,
            enabled_features: None,
        },
    )?;
    Ok(device)
}
