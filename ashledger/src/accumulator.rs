//! 作成前に要求されたlayer / extensionを溜めておくリスト。
//!
//! layerは要求した時点で存在を確認するが、extensionは確認しない。
//! extensionを提供するlayerが後から要求されることがあるため。

use crate::{
    list, CapabilityList, CapabilityName, DiagnosticChannel, Error, Native, Oracle, Result,
};

/// 要求されたlayer / extensionのリスト
#[derive(Debug, Default)]
pub struct Accumulator {
    pub(crate) layers: CapabilityList,
    pub(crate) extensions: CapabilityList,
    pub(crate) device_extensions: CapabilityList,
}
impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// instance layerを要求する
    ///
    /// 利用できないlayerはリストに追加せず、WARNINGを出して`Error::NotFound`を返す。
    pub fn request_layer<N: Native>(&mut self, oracle: &Oracle<'_, N>, name: &str) -> Result<()> {
        let diagnostics = oracle.diagnostics();
        let layer = CapabilityName::new(name).map_err(|e| diagnostics.raise(e))?;
        if !oracle.is_layer_available(name) {
            return Err(diagnostics.raise(Error::NotFound(name.to_string())));
        }
        append(diagnostics, &mut self.layers, layer)?;
        diagnostics.verbose(format_args!("requested layer {name}"));
        Ok(())
    }

    /// instance extensionを要求する
    ///
    /// ここでは利用可能かを確認しない。作成時の解決で確認される。
    pub fn request_extension(&mut self, diagnostics: &DiagnosticChannel, name: &str) -> Result<()> {
        let extension = CapabilityName::new(name).map_err(|e| diagnostics.raise(e))?;
        append(diagnostics, &mut self.extensions, extension)?;
        diagnostics.verbose(format_args!("requested instance extension {name}"));
        Ok(())
    }

    /// device extensionを要求する。instance extensionと同じく遅延評価。
    pub fn request_device_extension(
        &mut self,
        diagnostics: &DiagnosticChannel,
        name: &str,
    ) -> Result<()> {
        let extension = CapabilityName::new(name).map_err(|e| diagnostics.raise(e))?;
        append(diagnostics, &mut self.device_extensions, extension)?;
        diagnostics.verbose(format_args!("requested device extension {name}"));
        Ok(())
    }

    pub fn layers(&self) -> &[CapabilityName] {
        &self.layers
    }

    pub fn extensions(&self) -> &[CapabilityName] {
        &self.extensions
    }

    pub fn device_extensions(&self) -> &[CapabilityName] {
        &self.device_extensions
    }

    pub fn is_layer_requested(&self, name: &str) -> bool {
        self.layers.iter().any(|l| l == name)
    }

    pub fn is_extension_requested(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }

    pub fn is_device_extension_requested(&self, name: &str) -> bool {
        self.device_extensions.iter().any(|e| e == name)
    }

    /// instance用のリストを取り出して空にする
    pub(crate) fn take_instance_lists(&mut self) -> (CapabilityList, CapabilityList) {
        (
            std::mem::take(&mut self.layers),
            std::mem::take(&mut self.extensions),
        )
    }

    pub(crate) fn take_device_extensions(&mut self) -> CapabilityList {
        std::mem::take(&mut self.device_extensions)
    }

    /// すべてのリストを解放する
    pub fn free(&mut self) {
        list::free(&mut self.layers);
        list::free(&mut self.extensions);
        list::free(&mut self.device_extensions);
    }
}

fn append(
    diagnostics: &DiagnosticChannel,
    list: &mut CapabilityList,
    name: CapabilityName,
) -> Result<()> {
    list::append(list, name).map_err(|e| diagnostics.raise(e))
}
