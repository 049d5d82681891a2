//! Internationalized domain name conversion.

/// IDN conversion interface.
pub trait IdnNormalizer: Send + Sync {
    /// Convert a hostname to its ASCII (punycode) form.
    fn to_ascii(&self, hostname: &str) -> String;

    /// Convert an ASCII hostname to its display form.
    fn to_unicode(&self, hostname: &str) -> String;
}

/// IDN conversion backed by the `idna` crate (UTS #46).
///
/// Hostnames the converter rejects are returned lowercased and otherwise
/// unchanged, so a bad label never makes a rule or a query fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdnaNormalizer;

impl IdnaNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl IdnNormalizer for IdnaNormalizer {
    fn to_ascii(&self, hostname: &str) -> String {
        if hostname.is_ascii() {
            return hostname.to_ascii_lowercase();
        }
        match idna::domain_to_ascii(hostname) {
            Ok(ascii) => ascii,
            Err(e) => {
                tracing::debug!(hostname, error = ?e, "IDN to ASCII conversion failed");
                hostname.to_lowercase()
            }
        }
    }

    fn to_unicode(&self, hostname: &str) -> String {
        let (unicode, result) = idna::domain_to_unicode(hostname);
        if result.is_err() {
            return hostname.to_lowercase();
        }
        unicode
    }
}

/// Pass-through conversion that only lowercases.
#[derive(Debug, Clone, Copy, Default)]
pub struct NilIdnNormalizer;

impl IdnNormalizer for NilIdnNormalizer {
    fn to_ascii(&self, hostname: &str) -> String {
        hostname.to_lowercase()
    }

    fn to_unicode(&self, hostname: &str) -> String {
        hostname.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        let idn = IdnaNormalizer::new();
        assert_eq!(idn.to_ascii("Example.COM"), "example.com");
        assert_eq!(idn.to_ascii("*.example.com"), "*.example.com");
    }

    #[test]
    fn test_to_ascii_punycode() {
        let idn = IdnaNormalizer::new();
        assert_eq!(idn.to_ascii("中文.tw"), "xn--fiq228c.tw");
        assert_eq!(idn.to_ascii("bücher.de"), "xn--bcher-kva.de");
    }

    #[test]
    fn test_to_unicode_round_trip() {
        let idn = IdnaNormalizer::new();
        assert_eq!(idn.to_unicode("xn--bcher-kva.de"), "bücher.de");
        assert_eq!(idn.to_unicode(&idn.to_ascii("中文.tw")), "中文.tw");
    }

    #[test]
    fn test_nil_normalizer() {
        let idn = NilIdnNormalizer;
        assert_eq!(idn.to_ascii("A.B"), "a.b");
        assert_eq!(idn.to_unicode("A.B"), "a.b");
    }
}
