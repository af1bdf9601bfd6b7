//! Channel naming shared by both sides of the proxy.

/// Build the channel key addressing `method` on `service`.
///
/// Both sides compute this independently; there is no registry handshake, so
/// the derivation must stay stable across versions. Distinct method names on
/// the same service always yield distinct keys.
pub fn channel_for(service: &str, method: &str) -> String {
    format!("{service}.{method}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(channel_for("Foo", "bar"), "Foo.bar");
        assert_eq!(channel_for("Foo", "bar"), channel_for("Foo", "bar"));
    }

    #[test]
    fn distinct_methods_yield_distinct_keys() {
        assert_ne!(channel_for("Foo", "bar"), channel_for("Foo", "baz"));
        assert_ne!(channel_for("Foo", "bar"), channel_for("Bar", "bar"));
    }
}
