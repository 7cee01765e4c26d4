//! Decimal ETH strings <-> integer wei.
//!
//! Amounts never pass through a float on their way to the ledger: user input is
//! parsed digit by digit into a fixed-point `U256` with 18 decimals, and input
//! with more precision than that is rejected instead of truncated.

use alloy_primitives::U256;

use crate::{errors::Error, Result};

pub const ETH_DECIMALS: usize = 18;

/// 10^18
pub const WEI_PER_ETH: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Platform fee taken by the ledger contract, in basis points (1%).
pub const FEE_BASIS_POINTS: u64 = 100;

pub fn parse_eth(input: &str) -> Result<U256> {
    let s = input.trim();
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(Error::InvalidAmount(format!("{input:?} is not a number")));
    }
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(Error::InvalidAmount(format!(
            "{input:?} is not a plain decimal number"
        )));
    }
    if frac_part.len() > ETH_DECIMALS {
        return Err(Error::InvalidAmount(format!(
            "{input:?} has more than {ETH_DECIMALS} decimal places"
        )));
    }

    let mut digits = String::with_capacity(int_part.len() + ETH_DECIMALS);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    digits.extend(std::iter::repeat('0').take(ETH_DECIMALS - frac_part.len()));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10)
        .map_err(|_| Error::InvalidAmount(format!("{input:?} is too large")))
}

pub fn parse_positive_eth(input: &str) -> Result<U256> {
    let wei = parse_eth(input)?;
    if wei.is_zero() {
        return Err(Error::InvalidAmount("amount must be greater than 0".to_string()));
    }
    Ok(wei)
}

/// Convert a numeric option (Discord delivers `f64`) into wei.
///
/// `f64`'s `Display` prints the shortest round-trip decimal and never uses
/// exponent notation, so `1e-8` arrives here as `"0.00000001"`.
pub fn eth_from_f64(value: f64) -> Result<U256> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::InvalidAmount(format!(
            "{value} is not a positive amount"
        )));
    }
    parse_positive_eth(&value.to_string())
}

pub fn format_eth(wei: U256) -> String {
    let int = wei / WEI_PER_ETH;
    let frac = format!("{:0>width$}", (wei % WEI_PER_ETH).to_string(), width = ETH_DECIMALS);
    let frac = frac.trim_end_matches('0');
    let frac = if frac.is_empty() { "0" } else { frac };
    format!("{int}.{frac}")
}

/// `(fee, net)` for display; the contract computes the authoritative split.
pub fn split_fee(amount: U256) -> (U256, U256) {
    let fee = amount * U256::from(FEE_BASIS_POINTS) / U256::from(10_000u64);
    (fee, amount - fee)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wei(v: u128) -> U256 {
        U256::from(v)
    }

    #[test]
    fn parses_plain_decimals() {
        assert_eq!(parse_eth("1").unwrap(), WEI_PER_ETH);
        assert_eq!(parse_eth("0.005").unwrap(), wei(5_000_000_000_000_000));
        assert_eq!(parse_eth(".5").unwrap(), wei(500_000_000_000_000_000));
        assert_eq!(parse_eth("0.000000000000000001").unwrap(), wei(1));
        assert_eq!(parse_eth("0").unwrap(), U256::ZERO);
    }

    #[test]
    fn rejects_excess_precision_instead_of_truncating() {
        let err = parse_eth("0.0000000000000000001").unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
    }

    #[test]
    fn rejects_non_decimal_forms() {
        for bad in ["", ".", "-1", "+1", "1e-8", "abc", "1.2.3", "1 000", "0x10"] {
            assert!(
                matches!(parse_eth(bad), Err(Error::InvalidAmount(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn zero_is_not_positive() {
        assert!(matches!(
            parse_positive_eth("0.000"),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn float_options_avoid_scientific_notation() {
        assert_eq!(eth_from_f64(1e-8).unwrap(), wei(10_000_000_000));
        assert_eq!(eth_from_f64(0.0015).unwrap(), wei(1_500_000_000_000_000));
        assert!(eth_from_f64(1e-20).is_err());
        assert!(eth_from_f64(-1.0).is_err());
        assert!(eth_from_f64(f64::NAN).is_err());
    }

    #[test]
    fn formats_like_a_wallet() {
        assert_eq!(format_eth(WEI_PER_ETH), "1.0");
        assert_eq!(format_eth(wei(5_000_000_000_000_000)), "0.005");
        assert_eq!(format_eth(U256::ZERO), "0.0");
        assert_eq!(format_eth(wei(1)), "0.000000000000000001");
    }

    #[test]
    fn exact_amounts_survive_encode_decode() {
        for s in ["0.0005", "0.0015", "0.005", "12.345678901234567891", "100.0"] {
            assert_eq!(format_eth(parse_eth(s).unwrap()), s);
        }
    }

    #[test]
    fn fee_is_one_percent() {
        let (fee, net) = split_fee(wei(5_000_000_000_000_000));
        assert_eq!(fee, wei(50_000_000_000_000));
        assert_eq!(net, wei(4_950_000_000_000_000));
    }
}
