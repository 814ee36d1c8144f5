//! Request key extraction.

/// Derives the routing key from an inbound request.
///
/// Implementations must be pure: the same request always yields the same key.
pub trait KeyExtractor<R>: Send + Sync {
    /// Extract the key for `request`.
    fn extract(&self, request: &R) -> String;
}

impl<R, F> KeyExtractor<R> for F
where
    F: Fn(&R) -> String + Send + Sync,
{
    fn extract(&self, request: &R) -> String {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Request {
        room: &'static str,
    }

    #[test]
    fn test_closure_extractor() {
        let extractor = |r: &Request| r.room.to_string();
        assert_eq!(extractor.extract(&Request { room: "lobby" }), "lobby");
    }
}
