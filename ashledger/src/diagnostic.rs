//! Severityで絞り込まれる診断メッセージの流し先(Diagnostic Channel)を定義する。
//!
//! マスクに含まれないSeverityのメッセージはフォーマットすらされない。
//! メッセージは`fmt::Arguments`のまま渡され、文字列になるのはsinkの中だけ。

use ash::vk;
use std::{
    any::Any,
    borrow::Cow,
    cell::{Cell, RefCell},
    ffi::CStr,
    fmt,
    io::{self, Write},
    ops::{BitAnd, BitOr, BitOrAssign},
};

use crate::Error;

/// nativeのdebug messengerから中継されたメッセージに付く名前
pub const NATIVE_DEBUG_RELAY: &str = "native-debug-relay";
/// nativeのdebug messengerから中継されたメッセージに付くコード
pub const NATIVE_DEBUG_RELAY_CODE: u32 = 0x03;

const PREFIX: &str = "[ashledger]";

/// 診断メッセージの重要度
///
/// `Verbose < Notification < Warning < Error < Fatal`の順で順序付けられる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Verbose,
    Notification,
    Warning,
    Error,
    Fatal,
}
impl Severity {
    /// このSeverityに対応するマスクのビット
    pub fn flag(self) -> SeverityFlags {
        match self {
            Self::Verbose => SeverityFlags::VERBOSE,
            Self::Notification => SeverityFlags::NOTIFICATION,
            Self::Warning => SeverityFlags::WARNING,
            Self::Error => SeverityFlags::ERROR,
            Self::Fatal => SeverityFlags::FATAL,
        }
    }

    fn from_native(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            Self::Error
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            Self::Warning
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            Self::Notification
        } else {
            Self::Verbose
        }
    }
}

/// 有効なSeverityの集合を表すビットマスク
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeverityFlags(u8);
impl SeverityFlags {
    pub const FATAL: Self = Self(0x01);
    pub const ERROR: Self = Self(0x02);
    pub const WARNING: Self = Self(0x04);
    pub const NOTIFICATION: Self = Self(0x08);
    pub const VERBOSE: Self = Self(0x10);
    pub const ALL: Self = Self(0xFF);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_raw(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn as_raw(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}
impl BitOr for SeverityFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
impl BitOrAssign for SeverityFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
impl BitAnd for SeverityFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// sinkに届く1件の診断メッセージ
#[derive(Debug, Clone, Copy)]
pub struct Diagnostic<'a> {
    severity: Severity,
    code: u32,
    name: &'a str,
    message: fmt::Arguments<'a>,
}
impl<'a> Diagnostic<'a> {
    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    /// フォーマット前のメッセージ
    pub fn message(&self) -> fmt::Arguments<'a> {
        self.message
    }
}

/// 診断メッセージを受け取るsinkの関数
///
/// 2番目の引数には`set_sink`で一緒に渡したユーザーコンテキストが入る。
pub type SinkFn = Box<dyn FnMut(&Diagnostic<'_>, Option<&dyn Any>)>;

/// FATALのメッセージを流した後の振る舞い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FatalPolicy {
    /// sinkへ渡した後にプロセスを終了する
    #[default]
    Terminate,
    /// 終了せず、呼び出し元にエラーとして返す
    Propagate,
}

// sinkとユーザーコンテキストは常に組で差し替える
struct SinkSlot {
    sink: Option<SinkFn>,
    user_context: Option<Box<dyn Any>>,
}

/// Severityマスクでゲートされた診断メッセージの流し先
///
/// 内部は`Cell`と`RefCell`なのでスレッドをまたいで共有できない。
/// 呼び出し側で直列化すること。
pub struct DiagnosticChannel {
    mask: Cell<SeverityFlags>,
    fatal_policy: Cell<FatalPolicy>,
    slot: RefCell<SinkSlot>,
}
impl DiagnosticChannel {
    pub fn new(mask: SeverityFlags, fatal_policy: FatalPolicy) -> Self {
        Self {
            mask: Cell::new(mask),
            fatal_policy: Cell::new(fatal_policy),
            slot: RefCell::new(SinkSlot {
                sink: None,
                user_context: None,
            }),
        }
    }

    pub fn severity_mask(&self) -> SeverityFlags {
        self.mask.get()
    }

    /// マスクを上書きする(既存のマスクとは合成しない)
    pub fn set_severity_mask(&self, mask: SeverityFlags) {
        self.mask.set(mask);
    }

    pub fn is_enabled(&self, severity: Severity) -> bool {
        self.mask.get().contains(severity.flag())
    }

    pub fn fatal_policy(&self) -> FatalPolicy {
        self.fatal_policy.get()
    }

    pub fn set_fatal_policy(&self, policy: FatalPolicy) {
        self.fatal_policy.set(policy);
    }

    /// sinkとユーザーコンテキストを差し替える。`None`ならデフォルトのsinkに戻る。
    ///
    /// sinkの実行中は差し替えられないので`false`を返す。
    pub fn set_sink(&self, sink: Option<SinkFn>, user_context: Option<Box<dyn Any>>) -> bool {
        match self.slot.try_borrow_mut() {
            Ok(mut slot) => {
                *slot = SinkSlot { sink, user_context };
                true
            }
            Err(_) => {
                tracing::warn!("diagnostic sink replaced from inside the sink; ignored");
                false
            }
        }
    }

    pub fn sink_is_default(&self) -> bool {
        self.slot
            .try_borrow()
            .map(|slot| slot.sink.is_none())
            .unwrap_or(false)
    }

    /// 現在のユーザーコンテキストを借りて`f`を呼ぶ
    pub fn with_user_context<R>(&self, f: impl FnOnce(Option<&dyn Any>) -> R) -> R {
        match self.slot.try_borrow() {
            Ok(slot) => f(slot.user_context.as_deref()),
            Err(_) => f(None),
        }
    }

    /// 診断メッセージを流す
    ///
    /// `severity`がマスクに含まれなければ何もしない。
    /// FATALは`FatalPolicy::Terminate`のときsinkへ渡した後にプロセスを終了する。
    pub fn emit(&self, severity: Severity, code: u32, name: &str, message: fmt::Arguments<'_>) {
        if self.is_enabled(severity) {
            let diagnostic = Diagnostic {
                severity,
                code,
                name,
                message,
            };
            match self.slot.try_borrow_mut() {
                Ok(mut slot) => {
                    let SinkSlot { sink, user_context } = &mut *slot;
                    match sink {
                        Some(sink) => sink(&diagnostic, user_context.as_deref()),
                        None => default_sink(&diagnostic),
                    }
                }
                // sinkの中から再入した場合
                Err(_) => tracing::trace!(code, name, "nested diagnostic dropped"),
            }
        }

        if severity == Severity::Fatal && self.fatal_policy.get() == FatalPolicy::Terminate {
            tracing::error!(code, name, "fatal diagnostic, terminating");
            std::process::exit(1);
        }
    }

    pub fn verbose(&self, message: fmt::Arguments<'_>) {
        self.emit(Severity::Verbose, 0, "", message);
    }

    pub fn notify(&self, message: fmt::Arguments<'_>) {
        self.emit(Severity::Notification, 0, "", message);
    }

    pub fn warning(&self, message: fmt::Arguments<'_>) {
        self.emit(Severity::Warning, 0, "", message);
    }

    /// エラーをそのSeverityで報告して、そのまま返す
    ///
    /// `return Err(channel.raise(Error::...))`の形で使う。
    pub fn raise(&self, error: Error) -> Error {
        self.emit(
            error.severity(),
            error.code(),
            error.name(),
            format_args!("{} ({})", error.describe(), error),
        );
        error
    }
}
impl Default for DiagnosticChannel {
    fn default() -> Self {
        Self::new(SeverityFlags::empty(), FatalPolicy::default())
    }
}
impl fmt::Debug for DiagnosticChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticChannel")
            .field("mask", &self.mask.get())
            .field("fatal_policy", &self.fatal_policy.get())
            .field("default_sink", &self.sink_is_default())
            .finish()
    }
}

/// デフォルトのsinkと同じ形式で1行書き出す
pub fn write_default(out: &mut dyn Write, diagnostic: &Diagnostic<'_>) -> io::Result<()> {
    // 中継メッセージは装飾しない
    if diagnostic.name == NATIVE_DEBUG_RELAY {
        return writeln!(out, "{PREFIX} ({NATIVE_DEBUG_RELAY}) {}", diagnostic.message);
    }
    match diagnostic.severity {
        Severity::Verbose | Severity::Notification => {
            writeln!(out, "{PREFIX} {}", diagnostic.message)
        }
        Severity::Warning => writeln!(out, "{PREFIX} (WARNING) {}", diagnostic.message),
        Severity::Error | Severity::Fatal => {
            let label = if diagnostic.severity == Severity::Fatal {
                "FATAL!"
            } else {
                "ERROR"
            };
            writeln!(
                out,
                "{PREFIX} ({label}) {} (code 0x{:02X}): \"{}\"",
                diagnostic.name, diagnostic.code, diagnostic.message
            )
        }
    }
}

fn default_sink(diagnostic: &Diagnostic<'_>) {
    let stderr = io::stderr();
    let _ = write_default(&mut stderr.lock(), diagnostic);
}

/// 診断メッセージを`tracing`のイベントとして流すsink
pub fn tracing_sink() -> SinkFn {
    Box::new(|diagnostic, _| {
        let code = diagnostic.code();
        let name = diagnostic.name();
        let message = diagnostic.message();
        match diagnostic.severity() {
            Severity::Verbose => tracing::trace!(code, name, "{}", message),
            Severity::Notification => tracing::info!(code, name, "{}", message),
            Severity::Warning => tracing::warn!(code, name, "{}", message),
            Severity::Error | Severity::Fatal => tracing::error!(code, name, "{}", message),
        }
    })
}

fn native_type_label(types: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "[VALIDATION]"
    } else if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "[PERFORMANCE]"
    } else {
        "[GENERAL]"
    }
}

/// nativeのdebug messengerから届いたメッセージをchannelへ中継する
pub fn relay_native_message(
    channel: &DiagnosticChannel,
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    message: &str,
) {
    channel.emit(
        Severity::from_native(severity),
        NATIVE_DEBUG_RELAY_CODE,
        NATIVE_DEBUG_RELAY,
        format_args!("{}{}", native_type_label(types), message),
    );
}

// debug utilsのコールバック関数
// p_user_dataには`Rc<DiagnosticChannel>`の中身へのポインタが入っている
pub(crate) unsafe extern "system" fn native_debug_relay(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_user_data.is_null() || p_callback_data.is_null() {
        return vk::FALSE;
    }
    let channel = &*(p_user_data as *const DiagnosticChannel);
    let p_message = (*p_callback_data).p_message;
    let message = if p_message.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(p_message).to_string_lossy()
    };
    relay_native_message(channel, message_severity, message_types, &message);

    vk::FALSE
}
