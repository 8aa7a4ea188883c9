//! ashledger probe
//!
//! 実際のVulkanローダーに対してlayer / extensionを要求し、instanceとdeviceを作成して
//! 実際に有効になったものを表示する。

use anyhow::{Context, Result};
use ash::vk;
use ashledger::{
    tracing_sink, utils, ApplicationInfo, AshNative, Native, Session, SessionConfig,
    SeverityFlags, VulkanSession,
};
use std::ffi::{CStr, CString};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let native = AshNative::load().context("Failed to load the Vulkan loader")?;
    for layer in native.enumerate_layers()? {
        tracing::info!(%layer, "available layer");
    }
    for extension in native.enumerate_extensions(None)? {
        tracing::info!(%extension, "available instance extension");
    }

    let mut session: VulkanSession = Session::with_config(
        native,
        SessionConfig {
            severity_mask: SeverityFlags::NOTIFICATION
                | SeverityFlags::WARNING
                | SeverityFlags::ERROR
                | SeverityFlags::FATAL,
            application: ApplicationInfo {
                name: CString::new("ashledger probe")?,
                version: vk::make_api_version(0, 0, 1, 0),
                api_version: vk::API_VERSION_1_1,
                ..Default::default()
            },
            ..Default::default()
        },
    );
    session.set_diagnostic_sink(Some(tracing_sink()), None);

    utils::request_default_instance_capabilities(&mut session, &[])?;
    let instance = session.create_instance()?;
    for layer in session.enabled_layers(instance)? {
        tracing::info!(%layer, "enabled layer");
    }
    for extension in session.enabled_extensions(instance)? {
        tracing::info!(%extension, "enabled instance extension");
    }

    let physical_device = utils::select_physical_device(&mut session, instance, &[])?;
    let properties = session.physical_device_properties(physical_device)?;
    let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
    tracing::info!(?device_name, "selected physical device");

    let queue_indices = utils::get_queue_indices(&session, physical_device)?;
    tracing::info!(?queue_indices, "queue families");
    let device = utils::create_device(&mut session, instance, physical_device, &queue_indices)?;
    for extension in session.enabled_extensions(device)? {
        tracing::info!(%extension, "enabled device extension");
    }

    session.teardown();
    tracing::info!("session torn down");

    Ok(())
}
