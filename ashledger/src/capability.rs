//! layer / extensionの名前と、その名前のリストを定義する。

use std::{
    ffi::{CStr, CString},
    fmt,
    os::raw::c_char,
};

use crate::{Error, Result};

/// layerもしくはextensionの名前
///
/// 呼び出し側のバッファの寿命に依存しないように、常に自前のコピーを持つ。
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapabilityName(CString);
impl CapabilityName {
    /// 文字列から作成する
    ///
    /// 空文字列やNULを含む文字列は`Error::NullArgument`になる。
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::NullArgument("name"));
        }
        CString::new(name)
            .map(Self)
            .map_err(|_| Error::NullArgument("name"))
    }

    pub fn from_c_str(name: &CStr) -> Result<Self> {
        if name.to_bytes().is_empty() {
            return Err(Error::NullArgument("name"));
        }
        Ok(Self(name.to_owned()))
    }

    /// `vk::LayerProperties`などの固定長の名前フィールドから作成する
    pub(crate) fn from_fixed(raw: &[c_char]) -> Option<Self> {
        let bytes = raw
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect::<Vec<_>>();
        if bytes.is_empty() {
            return None;
        }
        CString::new(bytes).ok().map(Self)
    }

    pub fn as_c_str(&self) -> &CStr {
        &self.0
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.0.as_ptr()
    }
}
impl fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_string_lossy())
    }
}
impl fmt::Debug for CapabilityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
impl PartialEq<str> for CapabilityName {
    fn eq(&self, other: &str) -> bool {
        self.0.as_bytes() == other.as_bytes()
    }
}
impl PartialEq<&str> for CapabilityName {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_bytes() == other.as_bytes()
    }
}
impl TryFrom<&str> for CapabilityName {
    type Error = Error;
    fn try_from(name: &str) -> Result<Self> {
        Self::new(name)
    }
}

/// 要求順を保った名前のリスト
pub type CapabilityList = Vec<CapabilityName>;

/// native APIに渡すポインタの配列を作る
///
/// 返り値は`list`より長く生きてはいけない。
pub(crate) fn as_ptrs(list: &[CapabilityName]) -> Vec<*const c_char> {
    list.iter().map(CapabilityName::as_ptr).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_nul_names_are_null_arguments() {
        assert_eq!(CapabilityName::new(""), Err(Error::NullArgument("name")));
        assert_eq!(
            CapabilityName::new("VK_\0bad"),
            Err(Error::NullArgument("name"))
        );
        assert_eq!(
            CapabilityName::from_c_str(CStr::from_bytes_with_nul(b"\0").unwrap()),
            Err(Error::NullArgument("name"))
        );
    }

    #[test]
    fn fixed_fields_stop_at_the_first_nul() {
        let mut raw = [0 as c_char; 16];
        for (dst, src) in raw.iter_mut().zip(b"VK_KHR_x".iter()) {
            *dst = *src as c_char;
        }
        let name = CapabilityName::from_fixed(&raw).unwrap();
        assert_eq!(name, "VK_KHR_x");
        assert_eq!(name.to_string(), "VK_KHR_x");

        assert!(CapabilityName::from_fixed(&[0 as c_char; 4]).is_none());
    }

    #[test]
    fn pointers_follow_list_order() {
        let list = vec![
            CapabilityName::new("a").unwrap(),
            CapabilityName::new("b").unwrap(),
        ];
        let ptrs = as_ptrs(&list);
        assert_eq!(ptrs.len(), 2);
        let second = unsafe { CStr::from_ptr(ptrs[1]) };
        assert_eq!(second.to_bytes(), b"b");
    }
}
