//! Forbidden-capability denylist.

/// Capability family a denylist pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityFamily {
    PersistentStorage,
    Network,
    Navigation,
    CrossContextMessaging,
    DynamicEvaluation,
    DynamicModuleLoading,
    DeviceSensors,
}

/// The fixed table of disallowed capability strings, in report order.
pub const DENYLIST: [(&str, CapabilityFamily); 22] = [
    ("localStorage", CapabilityFamily::PersistentStorage),
    ("sessionStorage", CapabilityFamily::PersistentStorage),
    ("indexedDB", CapabilityFamily::PersistentStorage),
    ("document.cookie", CapabilityFamily::PersistentStorage),
    ("fetch(", CapabilityFamily::Network),
    ("XMLHttpRequest", CapabilityFamily::Network),
    ("WebSocket", CapabilityFamily::Network),
    ("EventSource", CapabilityFamily::Network),
    ("navigator.sendBeacon", CapabilityFamily::Network),
    ("window.location", CapabilityFamily::Navigation),
    ("document.location", CapabilityFamily::Navigation),
    ("window.open(", CapabilityFamily::Navigation),
    ("history.pushState", CapabilityFamily::Navigation),
    ("postMessage", CapabilityFamily::CrossContextMessaging),
    ("window.parent", CapabilityFamily::CrossContextMessaging),
    ("BroadcastChannel", CapabilityFamily::CrossContextMessaging),
    ("eval(", CapabilityFamily::DynamicEvaluation),
    ("new Function(", CapabilityFamily::DynamicEvaluation),
    ("import(", CapabilityFamily::DynamicModuleLoading),
    ("importScripts(", CapabilityFamily::DynamicModuleLoading),
    ("navigator.geolocation", CapabilityFamily::DeviceSensors),
    ("navigator.mediaDevices", CapabilityFamily::DeviceSensors),
];

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Whether `pattern` occurs in `text` at an identifier boundary.
///
/// Patterns that start with an identifier character only match when the
/// preceding character is not one (`prefetch(` does not match `fetch(`).
pub fn occurs(text: &str, pattern: &str) -> bool {
    let needs_boundary = pattern.chars().next().is_some_and(is_ident_char);
    text.match_indices(pattern).any(|(idx, _)| {
        !needs_boundary || !text[..idx].chars().next_back().is_some_and(is_ident_char)
    })
}

/// Every denylist pattern present in `stripped`, each reported once, in
/// table order.
pub fn scan(stripped: &str) -> Vec<&'static str> {
    DENYLIST
        .iter()
        .filter(|(pattern, _)| occurs(stripped, pattern))
        .map(|(pattern, _)| *pattern)
        .collect()
}
