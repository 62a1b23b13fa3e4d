//! Stable, read-only context for request execution.

use lcore_types::InputIndex;

/// Provided to every advance handler: who signed the request and when, in
/// logical time. The sender is normalized to lowercase at the router edge;
/// every authorization comparison happens against this form.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The advance request's input index. The engine's clock.
    pub input_index: InputIndex,
    /// Lowercase hex address of the request sender.
    pub sender: String,
}

impl RequestContext {
    pub fn new(sender: &str, input_index: InputIndex) -> Self {
        Self {
            input_index,
            sender: normalize_address(sender),
        }
    }
}

/// Lowercases an address-like identifier for authorization comparisons.
pub fn normalize_address(address: &str) -> String {
    address.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_is_normalized() {
        let ctx = RequestContext::new("0xAAbbCCdd", 5);
        assert_eq!(ctx.sender, "0xaabbccdd");
        assert_eq!(ctx.input_index, 5);
    }
}
