//! Structured logging with redaction of key material
//!
//! Entries render as `message | key=value ...` and go to the `log` facade
//! with the component name as target; the binary picks sink and level.
//!
//! Field values are redacted by field name, see [`FieldKind`].

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// How a field value is shown, decided from the field name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Seeds, WIFs, phrases: only the length is shown
    Secret,
    /// Addresses: `tb1qar...5mdq`
    Address,
    /// Txids and hashes: `1234567890...abcdef`
    Hash,
    Plain,
}

const SECRET_MARKERS: &[&str] = &["private", "secret", "seed", "mnemonic", "phrase", "wif", "password"];
const ADDRESS_MARKERS: &[&str] = &["address", "receiver", "sender"];
const HASH_MARKERS: &[&str] = &["txid", "hash"];

impl FieldKind {
    pub fn classify(key: &str) -> Self {
        let key = key.to_ascii_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| key.contains(m));
        // `seed_len` and friends describe a secret without revealing it
        if key.ends_with("_len") || key.ends_with("_count") {
            FieldKind::Plain
        } else if has(SECRET_MARKERS) {
            FieldKind::Secret
        } else if has(ADDRESS_MARKERS) {
            FieldKind::Address
        } else if has(HASH_MARKERS) {
            FieldKind::Hash
        } else {
            FieldKind::Plain
        }
    }

    pub fn apply(self, value: &str) -> String {
        let value = value.trim();
        if value.is_empty() {
            return "[EMPTY]".to_string();
        }
        match self {
            FieldKind::Secret if value.len() <= 4 => "[REDACTED]".to_string(),
            FieldKind::Secret => format!("[REDACTED:{}chars]", value.len()),
            FieldKind::Address => elide(value, 6, 4),
            FieldKind::Hash => elide(value, 10, 6),
            FieldKind::Plain => value.to_string(),
        }
    }
}

/// Keep `head` and `tail` chars of long ASCII values; short ones such as
/// account names pass through
fn elide(value: &str, head: usize, tail: usize) -> String {
    if value.len() <= head + tail + 3 || !value.is_ascii() {
        return value.to_string();
    }
    format!("{}...{}", &value[..head], &value[value.len() - tail..])
}

/// One structured log line
#[derive(Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub target: &'static str,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            target,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Attach a field, redacted according to its name
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        let shown = FieldKind::classify(key).apply(&value.to_string());
        self.fields.push((key, shown));
        self
    }

    pub fn render(&self) -> String {
        let mut out = self.message.clone();
        for (i, (key, value)) in self.fields.iter().enumerate() {
            out.push_str(if i == 0 { " | " } else { " " });
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    pub fn emit(self) {
        let level = log::Level::from(self.level);
        if log::log_enabled!(target: self.target, level) {
            log::log!(target: self.target, level, "{}", self.render());
        }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! log_at {
    ($level:ident, $target:expr, $msg:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::utils::logging::LogEntry::new($crate::utils::logging::LogLevel::$level, $target, $msg)
            $(.field(stringify!($key), &$value))*
            .emit()
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($args:tt)*) => { $crate::log_at!(Debug, $($args)*) };
}

#[macro_export]
macro_rules! log_info {
    ($($args:tt)*) => { $crate::log_at!(Info, $($args)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($args:tt)*) => { $crate::log_at!(Warn, $($args)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($args:tt)*) => { $crate::log_at!(Error, $($args)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(FieldKind::classify("wif"), FieldKind::Secret);
        assert_eq!(FieldKind::classify("private_key"), FieldKind::Secret);
        assert_eq!(FieldKind::classify("seed_len"), FieldKind::Plain);
        assert_eq!(FieldKind::classify("receiver_address"), FieldKind::Address);
        assert_eq!(FieldKind::classify("txid"), FieldKind::Hash);
        assert_eq!(FieldKind::classify("tx_id"), FieldKind::Plain);
        assert_eq!(FieldKind::classify("full_pubkey"), FieldKind::Plain);
    }

    #[test]
    fn test_redaction() {
        assert_eq!(FieldKind::Secret.apply(""), "[EMPTY]");
        assert_eq!(FieldKind::Secret.apply("abc"), "[REDACTED]");
        assert_eq!(
            FieldKind::Secret.apply("cVt4o7BGAig1UXywgGSmARhxMdzP5qvQsxKkSsc1XEkw3tDTQFpy"),
            "[REDACTED:52chars]"
        );
        assert_eq!(
            FieldKind::Address.apply("tb1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"),
            "tb1qar...5mdq"
        );
        assert_eq!(FieldKind::Address.apply("deposit"), "deposit");

        let hash = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        assert_eq!(FieldKind::Hash.apply(hash), "1234567890...abcdef");
    }

    #[test]
    fn test_render() {
        let entry = LogEntry::new(LogLevel::Info, "tx", "payment request queued")
            .field("amount", 100)
            .field("wif", "secret")
            .field("address", "tb1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq");
        assert_eq!(
            entry.render(),
            "payment request queued | amount=100 wif=[REDACTED:6chars] address=tb1qar...5mdq"
        );
        assert_eq!(LogEntry::new(LogLevel::Debug, "tx", "bare").render(), "bare");
    }
}
