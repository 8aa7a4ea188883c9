//! 要求されたextensionを、実装本体と要求済みlayerが提供するものだけに絞り込む。
//!
//! 解決は呼び出した時点のAccumulatorの状態に対して行う。extensionを要求した後、
//! それを提供するlayerを要求する前に解決が走ると、そのextensionは失われる。
//! 後からlayerを要求しても戻らない。

use ash::vk;

use crate::{list, Accumulator, CapabilityList, CapabilityName, DiagnosticChannel, Native, Oracle};

/// instance extensionの解決
///
/// 各extensionについて要求順に、実装本体 → 要求済みlayer(要求順)の順で
/// 提供元を探し、最初に見つかったところで採用する。
/// 見つからなければリストから取り除いてWARNINGを出す。取り除いた数を返す。
pub fn resolve_extensions<N: Native>(accumulator: &mut Accumulator, oracle: &Oracle<'_, N>) -> usize {
    let Accumulator {
        layers, extensions, ..
    } = accumulator;
    prune(extensions, oracle.diagnostics(), "instance", |extension| {
        if oracle.is_extension_name_available(extension, None) {
            return true;
        }
        match layers
            .iter()
            .find(|layer| oracle.is_extension_name_available(extension, Some(*layer)))
        {
            Some(layer) => {
                tracing::trace!(%extension, %layer, "extension provided by layer");
                true
            }
            None => false,
        }
    })
}

/// device extensionの解決
///
/// physical deviceの本体 → `instance_layers`の順で提供元を探す。
pub fn resolve_device_extensions<N: Native>(
    accumulator: &mut Accumulator,
    oracle: &Oracle<'_, N>,
    physical_device: vk::PhysicalDevice,
    instance_layers: &[CapabilityName],
) -> usize {
    prune(
        &mut accumulator.device_extensions,
        oracle.diagnostics(),
        "device",
        |extension| {
            oracle.is_device_extension_name_available(physical_device, extension, None)
                || instance_layers.iter().any(|layer| {
                    oracle.is_device_extension_name_available(
                        physical_device,
                        extension,
                        Some(layer),
                    )
                })
        },
    )
}

fn prune(
    extensions: &mut CapabilityList,
    diagnostics: &DiagnosticChannel,
    scope: &str,
    mut is_provided: impl FnMut(&CapabilityName) -> bool,
) -> usize {
    let mut removed = 0;
    let mut index = 0;
    while index < extensions.len() {
        if is_provided(&extensions[index]) {
            index += 1;
            continue;
        }
        if let Some(extension) = list::remove_at(extensions, index) {
            diagnostics.warning(format_args!(
                "{scope} extension {extension} is not provided by the implementation or any requested layer; removed"
            ));
            removed += 1;
        }
    }
    removed
}
