//! Voucher payload encoding for L1 contract calls.
//!
//! The selector table is fixed: ERC-20 `transfer` and the rollup contract's
//! Ether withdrawal. Calldata is word-aligned ABI: the 4-byte selector
//! followed by 32-byte arguments (addresses left-padded, unsigned integers
//! big-endian right-aligned).

use anyhow::{anyhow, Context, Result};

/// `transfer(address,uint256)`
const ERC20_TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// `withdrawEther(address,uint256)`
const WITHDRAW_ETHER: [u8; 4] = [0x52, 0x2f, 0x68, 0x15];

/// A voucher ready for the host's `/voucher` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voucher {
    /// 20-byte destination contract, `0x`-prefixed hex.
    pub destination: String,
    /// ABI-encoded calldata, `0x`-prefixed hex.
    pub payload: String,
}

fn parse_address(address: &str) -> Result<[u8; 20]> {
    let stripped = address
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("address missing 0x prefix: {address}"))?;
    let bytes = hex::decode(stripped).context("address is not hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("address must be 20 bytes: {address}"))
}

fn address_word(address: [u8; 20]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&address);
    word
}

fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_call(selector: [u8; 4], words: &[[u8; 32]]) -> String {
    let mut calldata = Vec::with_capacity(4 + 32 * words.len());
    calldata.extend_from_slice(&selector);
    for word in words {
        calldata.extend_from_slice(word);
    }
    format!("0x{}", hex::encode(calldata))
}

/// An ERC-20 `transfer` executed by the rollup contract's token balance.
pub fn erc20_transfer(token: &str, receiver: &str, amount: u128) -> Result<Voucher> {
    let token = parse_address(token)?;
    let receiver = parse_address(receiver)?;
    Ok(Voucher {
        destination: format!("0x{}", hex::encode(token)),
        payload: encode_call(
            ERC20_TRANSFER,
            &[address_word(receiver), uint_word(amount)],
        ),
    })
}

/// An Ether withdrawal executed against the rollup contract itself.
pub fn ether_withdrawal(rollup_contract: &str, receiver: &str, amount_wei: u128) -> Result<Voucher> {
    let destination = parse_address(rollup_contract)?;
    let receiver = parse_address(receiver)?;
    Ok(Voucher {
        destination: format!("0x{}", hex::encode(destination)),
        payload: encode_call(
            WITHDRAW_ETHER,
            &[address_word(receiver), uint_word(amount_wei)],
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0x1111111111111111111111111111111111111111";
    const RECEIVER: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn erc20_transfer_calldata() {
        let voucher = erc20_transfer(TOKEN, RECEIVER, 1000).unwrap();
        assert_eq!(voucher.destination, TOKEN);
        let expected = format!(
            "0xa9059cbb{}{}",
            format!("{:0>64}", &RECEIVER[2..]),
            format!("{:0>64x}", 1000u128),
        );
        assert_eq!(voucher.payload, expected);
        // 4-byte selector + two words.
        assert_eq!(voucher.payload.len(), 2 + 8 + 64 + 64);
    }

    #[test]
    fn ether_withdrawal_targets_the_rollup_contract() {
        let dapp = "0x3333333333333333333333333333333333333333";
        let voucher = ether_withdrawal(dapp, RECEIVER, 5).unwrap();
        assert_eq!(voucher.destination, dapp);
        assert!(voucher.payload.starts_with("0x522f6815"));
    }

    #[test]
    fn addresses_are_validated() {
        assert!(erc20_transfer("1111", RECEIVER, 1).is_err());
        assert!(erc20_transfer("0x1111", RECEIVER, 1).is_err());
        assert!(erc20_transfer(TOKEN, "0xzz", 1).is_err());
    }
}
